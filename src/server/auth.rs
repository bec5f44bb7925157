//! API key check and rate limiting middleware.
//!
//! The key check is layered outside the limiter: a rejected request is never
//! counted against anyone's window.

use super::error::HttpError;
use super::state::AppState;
use crate::ratelimit::Admission;
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;
use tracing::{debug, warn};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Reject `/api/*` calls without the configured key
pub async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(expected) = state.api_key.as_deref() {
        let provided = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        if provided != Some(expected) {
            warn!(path = %request.uri().path(), "Rejected request with missing or invalid API key");
            return HttpError::unauthorized().into_response();
        }
    }
    next.run(request).await
}

/// Admit the call through the shared limiter or answer 429
pub async fn enforce_rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let key = client_key(&request);
    match state.limiter.admit(&key).await {
        Admission::Allowed => next.run(request).await,
        Admission::Denied { retry_after } => {
            debug!(path = %request.uri().path(), "Rate limited {}", key);
            HttpError::rate_limited(retry_after).into_response()
        }
    }
}

/// Limiter key: the API key when sent, else the peer address
pub fn client_key(request: &Request) -> String {
    if let Some(key) = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        return key.to_string();
    }
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_client_key_prefers_api_key() {
        let mut request = Request::builder()
            .uri("/api/info")
            .header(API_KEY_HEADER, "secret123")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 4000))));
        assert_eq!(client_key(&request), "secret123");
    }

    #[test]
    fn test_client_key_falls_back_to_peer_ip() {
        let mut request = Request::builder().uri("/api/info").body(Body::empty()).unwrap();
        assert_eq!(client_key(&request), "unknown");

        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 4000))));
        assert_eq!(client_key(&request), "10.0.0.7");
    }
}
