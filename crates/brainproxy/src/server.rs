use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tokio::sync::{Mutex, oneshot};
use tower::limit::ConcurrencyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use crate::chunking::Chunking;
use crate::handlers;
use crate::orchestrator::Orchestrator;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

// ============================================================================
// Application State
// ============================================================================

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub chunking: Chunking,
    /// Sampling temperature for the native adapter.
    pub temperature: f32,
    pub listen_addr: String,
    pub debug: bool,
    pub admin_token: Option<String>,
    pub api_token: Option<String>,
    pub keep_alive_interval_seconds: u64,
    pub max_connections: usize,
    pub shutdown_tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

// ============================================================================
// Server Setup
// ============================================================================

/// Create a shutdown channel pair.
///
/// Returns (sender for AppState, receiver for shutdown_signal).
pub fn shutdown_channel() -> (oneshot::Sender<()>, oneshot::Receiver<()>) {
    oneshot::channel()
}

pub fn build_app(state: AppState, request_timeout_seconds: u64) -> Router {
    let max_connections = state.max_connections;

    // SSE routes - no request timeout, the turn runs as long as it needs
    let streaming_routes = Router::new()
        .route("/v1/chat/completions", post(handlers::openai::chat_completions))
        .route("/v1beta/models/{*rest}", post(handlers::gemini_dispatch))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/chat", post(handlers::chat))
        .route("/reset", get(handlers::reset).post(handlers::reset))
        .route("/status", get(handlers::status))
        .route("/files", get(handlers::files))
        .route("/models", get(handlers::models))
        .route("/v1/models", get(handlers::openai::list_models))
        .with_state(state.clone())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_seconds),
        ));

    let proxy_routes = Router::new()
        .merge(streaming_routes)
        .merge(api_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            handlers::api_auth::require_api_token,
        ))
        .layer(ConcurrencyLimitLayer::new(max_connections));

    let admin_routes = Router::new()
        .route("/shutdown", post(handlers::shutdown))
        .with_state(state.clone());

    Router::new()
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .route("/version", get(handlers::version))
        .with_state(state)
        .merge(proxy_routes)
        .nest("/api/admin/v1", admin_routes)
}
