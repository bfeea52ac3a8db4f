use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use crate::server::AppState;

pub async fn livez() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

#[derive(Serialize)]
pub struct ReadyzResponse {
    pub status: String,
    pub mode: String,
}

pub async fn readyz(State(state): State<AppState>) -> Json<ReadyzResponse> {
    let cache = state.orchestrator.active_cache().await;
    Json(ReadyzResponse {
        status: "ok".to_string(),
        mode: super::native::mode_label(cache.is_active()).to_string(),
    })
}
