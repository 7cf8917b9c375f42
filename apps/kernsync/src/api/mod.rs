//! # kernsync HTTP API Module
//!
//! ## Endpoints
//!
//! - `POST /api/sync` - Run one sync pass now
//! - `GET /health` - Health check
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `KERNSYNC_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `KERNSYNC_RATE_LIMIT`: Requests per second (default: 20, 0 to disable)
//! - `KERNSYNC_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod handlers;
mod middleware;
mod types;

pub use auth::{API_KEY_ENV, get_api_key_from_env};
pub use handlers::{health_handler, sync_handler};
pub use middleware::{create_rate_limiter, get_rate_limit_from_env};
pub use types::{ErrorResponse, HealthResponse};

use crate::sync::SyncPass;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use kernsync_core::KernsyncError;
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    /// The pass run by `POST /api/sync`.
    pub pass: Arc<dyn SyncPass>,
}

impl AppState {
    /// Create app state around a sync pass.
    #[must_use]
    pub fn new(pass: Arc<dyn SyncPass>) -> Self {
        Self { pass }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build CORS layer from `KERNSYNC_CORS_ORIGINS`.
///
/// - `"*"`: all origins
/// - unset: localhost only
/// - otherwise: the listed origins
fn build_cors_layer() -> CorsLayer {
    match std::env::var("KERNSYNC_CORS_ORIGINS").ok().as_deref() {
        Some("*") => {
            tracing::warn!("CORS: Allowing ALL origins (KERNSYNC_CORS_ORIGINS=*)");
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| match s.trim().parse::<HeaderValue>() {
                    Ok(hv) => Some(hv),
                    Err(e) => {
                        tracing::warn!("CORS: Invalid origin '{}': {}", s.trim(), e);
                        None
                    }
                })
                .collect();
            if allowed.is_empty() {
                tracing::warn!("CORS: No valid origins in KERNSYNC_CORS_ORIGINS, defaulting to localhost only");
                build_localhost_cors()
            } else {
                restricted_cors(allowed)
            }
        }
        None => build_localhost_cors(),
    }
}

fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost:8888",
        "http://127.0.0.1:8888",
        "http://localhost:8090",
        "http://127.0.0.1:8090",
    ]
    .into_iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();
    restricted_cors(origins)
}

fn restricted_cors(origins: Vec<HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Rate Limiting (if enabled)
/// 4. Authentication (if configured)
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer();

    let rate_limit = get_rate_limit_from_env();
    let rate_limiter = if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    let has_auth = get_api_key_from_env().is_some();
    if has_auth {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED - POST /api/sync is publicly accessible. \
             Set {} to enable authentication.",
            API_KEY_ENV
        );
    }

    let mut router = Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/api/sync", post(handlers::sync_handler));

    if has_auth {
        router = router.layer(axum_middleware::from_fn(auth::api_key_auth_middleware));
    }

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(axum::extract::DefaultBodyLimit::max(64 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Serve the API on `addr` until `shutdown` resolves.
pub async fn run_server(
    addr: &str,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), KernsyncError> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| KernsyncError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("kernsync HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| KernsyncError::IoError(format!("Server error: {}", e)))
}
