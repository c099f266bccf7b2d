//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use orrery_store::DocumentStore;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{caasoperator, health, upgradesteps};
use crate::state::ServerState;

/// Create the API router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Upgrade steps (machine agents and controller)
/// - `POST /v1/upgrade-steps/reset-kvm-machine-modification-status-idle`
/// - `POST /v2/upgrade-steps/reset-kvm-machine-modification-status-idle`
/// - `POST /v2/upgrade-steps/write-uniter-state`
///
/// ## CAAS operator (application and unit agents)
/// - `POST /v1/caas-operator/set-pod-spec`
pub fn create_router<S>(state: ServerState<S>) -> Router
where
    S: DocumentStore + 'static,
{
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = state.config.request_timeout();

    let state = Arc::new(state);

    Router::new()
        // Health (public)
        .route("/health", get(health::health::<S>))
        // Upgrade steps
        .route(
            "/v1/upgrade-steps/reset-kvm-machine-modification-status-idle",
            post(upgradesteps::reset_kvm_v1::<S>),
        )
        .route(
            "/v2/upgrade-steps/reset-kvm-machine-modification-status-idle",
            post(upgradesteps::reset_kvm_v2::<S>),
        )
        .route(
            "/v2/upgrade-steps/write-uniter-state",
            post(upgradesteps::write_uniter_state::<S>),
        )
        // CAAS operator
        .route(
            "/v1/caas-operator/set-pod-spec",
            post(caasoperator::set_pod_spec::<S>),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}
