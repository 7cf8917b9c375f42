//! # API Endpoint Handlers

use super::{
    AppState,
    types::{ErrorResponse, HealthResponse},
};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// SYNC HANDLER
// =============================================================================

/// Run one sync pass now.
///
/// `204 No Content` on success. A failed pass answers `500` with the error
/// message; it never takes the server down.
pub async fn sync_handler(State(state): State<AppState>) -> Response {
    match state.pass.sync_managers().await {
        Ok(report) => {
            tracing::debug!(trigger = "http", report = ?report, "Sync pass finished");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => {
            tracing::error!(trigger = "http", error = %e, "Sync pass failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::new(e.to_string())),
            )
                .into_response()
        }
    }
}
