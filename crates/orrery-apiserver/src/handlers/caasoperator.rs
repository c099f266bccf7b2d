//! CAAS operator endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use orrery_store::DocumentStore;

use crate::auth::Caller;
use crate::error::ApiError;
use crate::facades::{CaasOperatorFacade, CaasOperatorState};
use crate::params::{ErrorResults, SetPodSpecArgs};
use crate::state::ServerState;

/// `POST /v1/caas-operator/set-pod-spec`
///
/// # Errors
///
/// Returns `ApiError::Permission` if the caller is not an application or
/// unit agent. Per-item failures are reported in the results.
pub async fn set_pod_spec<S>(
    State(state): State<Arc<ServerState<S>>>,
    caller: Caller,
    Json(args): Json<SetPodSpecArgs>,
) -> Result<Json<ErrorResults>, ApiError>
where
    S: DocumentStore + 'static,
{
    let facade = CaasOperatorFacade::new(
        Arc::clone(&state.state) as Arc<dyn CaasOperatorState>,
        caller.authorizer(),
        Arc::clone(&state.leadership),
    )?;
    Ok(Json(facade.set_pod_spec(args)))
}
