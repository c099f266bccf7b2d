//! Health check endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use orrery_store::DocumentStore;
use serde::Serialize;

use crate::state::ServerState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
    /// The model served.
    pub model: String,
}

/// Health check handler.
///
/// Returns the current service status. This endpoint is public and
/// does not require authentication.
///
/// ```text
/// GET /health
///
/// Response: 200 OK
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "model": "model-6ba7b810-9dad-11d1-80b4-00c04fd430c8"
/// }
/// ```
pub async fn health<S>(State(state): State<Arc<ServerState<S>>>) -> impl IntoResponse
where
    S: DocumentStore + 'static,
{
    let response = HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        model: state.state.model_tag().to_string(),
    };

    (StatusCode::OK, Json(response))
}
