//! Bearer token checks for proxy and admin routes.
//!
//! - Token configured: requires `Authorization: Bearer <token>`
//! - No API token: proxy routes are open
//! - No admin token: admin routes accept loopback peers only

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sha2::{Digest, Sha256};

use crate::server::AppState;

/// Compare the bearer token against `expected` (constant-time via SHA-256).
pub fn bearer_matches(expected: &str, headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|provided| {
            let a = Sha256::digest(provided.as_bytes());
            let b = Sha256::digest(expected.as_bytes());
            a == b
        })
}

/// Admin authorization: token if configured, else a loopback peer.
pub fn is_admin(token: Option<&str>, peer: Option<&SocketAddr>, headers: &HeaderMap) -> bool {
    match token {
        Some(expected) => bearer_matches(expected, headers),
        None => peer.is_some_and(|addr| addr.ip().is_loopback()),
    }
}

/// Middleware guarding the proxy routes.
pub async fn require_api_token(
    State(state): State<AppState>,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let allowed = match state.api_token.as_deref() {
        Some(expected) => bearer_matches(expected, request.headers()),
        None => true,
    };
    if allowed {
        next.run(request).await
    } else {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

/// Peer address, when the server was started with connect info.
pub fn peer_addr<B>(request: &Request<B>) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}
