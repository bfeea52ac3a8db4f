//! Admin handlers for server management.

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::IntoResponse;

use super::api_auth;
use crate::server::AppState;

/// POST /api/admin/v1/shutdown
///
/// Triggers a graceful server shutdown.
pub async fn shutdown(State(state): State<AppState>, request: Request<Body>) -> impl IntoResponse {
    let peer = api_auth::peer_addr(&request);
    if !api_auth::is_admin(state.admin_token.as_deref(), peer.as_ref(), request.headers()) {
        return (StatusCode::FORBIDDEN, "Admin access denied").into_response();
    }

    if let Some(tx) = state.shutdown_tx.lock().await.take() {
        let _ = tx.send(());
        (StatusCode::OK, "Shutdown initiated").into_response()
    } else {
        (StatusCode::CONFLICT, "Shutdown already in progress").into_response()
    }
}
