//! HTTP service.
//!
//! `/health` is open. Everything under `/api` passes the API key check first
//! and the rate limiter second; `/api/rate-limit` exists only when a key is
//! configured.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod state;

pub use error::HttpError;
pub use state::AppState;

use crate::config::{AllowedOrigins, ServiceConfig};
use crate::error::MediaError;
use crate::ratelimit::AdmissionGate;
use axum::http::header::{CONTENT_DISPOSITION, RETRY_AFTER};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

const PURGE_INTERVAL: Duration = Duration::from_secs(60);

/// Routes and middleware over `state`, without CORS or tracing
pub fn router(state: AppState) -> Router {
    let mut api = Router::new()
        .route("/info", post(handlers::info))
        .route("/info/batch", post(handlers::info_batch))
        .route("/download", post(handlers::download))
        .route("/download/batch", post(handlers::download_batch));
    if state.auth_enabled() {
        api = api.route(
            "/rate-limit",
            get(handlers::rate_limit).put(handlers::update_rate_limit),
        );
    }

    // The last route_layer runs first
    let api = api
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::enforce_rate_limit))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_api_key));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/api", api)
        .with_state(state)
}

/// CORS layer for the configured origins
pub fn cors_layer(origins: &AllowedOrigins) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([
            CONTENT_DISPOSITION,
            RETRY_AFTER,
            HeaderName::from_static(handlers::TRANSPORT_TRUST_HEADER),
            HeaderName::from_static(handlers::BATCH_FAILED_HEADER),
        ]);

    match origins {
        AllowedOrigins::Any => layer.allow_origin(Any),
        AllowedOrigins::List(list) => {
            let allowed: Vec<HeaderValue> = list
                .iter()
                .filter_map(|origin| match origin.parse() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!("Ignoring invalid CORS origin {}", origin);
                        None
                    }
                })
                .collect();
            layer.allow_origin(allowed)
        }
    }
}

/// Bind and serve until Ctrl-C
pub async fn serve(config: ServiceConfig) -> Result<(), MediaError> {
    let state = AppState::from_config(&config);
    spawn_purger(state.limiter.clone());
    let app = router(state)
        .layer(cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(
        addr = %listener.local_addr()?,
        auth_enabled = config.api_key.is_some(),
        rate_backend = %config.rate_backend,
        limit = config.rate_limits.limit,
        period_secs = config.rate_limits.period.as_secs(),
        "Starting mediafetch service"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Service stopped");
    Ok(())
}

/// Drop idle limiter keys once a minute
fn spawn_purger(limiter: Arc<dyn AdmissionGate>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            limiter.purge_idle();
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_layer_accepts_both_forms() {
        let _ = cors_layer(&AllowedOrigins::Any);
        let _ = cors_layer(&AllowedOrigins::List(vec![
            "http://localhost:5173".to_string(),
            "not a header\n".to_string(),
        ]));
    }
}
