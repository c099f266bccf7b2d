//! Upgrade-steps endpoints.
//!
//! Each version builds its facade for the caller and forwards the body.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use orrery_store::DocumentStore;

use crate::auth::Caller;
use crate::error::ApiError;
use crate::facades::{
    UpgradeStepsApi, UpgradeStepsFacadeV1, UpgradeStepsFacadeV2, UpgradeStepsState,
    UpgradeStepsV1, UpgradeStepsV2,
};
use crate::params::{self, ErrorResult, ErrorResults, SetUnitStateArgs};
use crate::state::ServerState;

fn shared_api<S>(state: &ServerState<S>, caller: &Caller) -> Result<Arc<UpgradeStepsApi>, ApiError>
where
    S: DocumentStore + 'static,
{
    UpgradeStepsApi::new(
        Arc::clone(&state.state) as Arc<dyn UpgradeStepsState>,
        caller.authorizer(),
    )
    .map(Arc::new)
}

/// `POST /v1/upgrade-steps/reset-kvm-machine-modification-status-idle`
///
/// # Errors
///
/// Returns an error if the caller may not use the facade or access the
/// machine.
pub async fn reset_kvm_v1<S>(
    State(state): State<Arc<ServerState<S>>>,
    caller: Caller,
    Json(arg): Json<params::Entity>,
) -> Result<Json<ErrorResult>, ApiError>
where
    S: DocumentStore + 'static,
{
    let facade = UpgradeStepsFacadeV1::new(shared_api(&state, &caller)?);
    let result = facade.reset_kvm_machine_modification_status_idle(arg).await?;
    Ok(Json(result))
}

/// `POST /v2/upgrade-steps/reset-kvm-machine-modification-status-idle`
///
/// # Errors
///
/// Returns an error if the caller may not use the facade or access the
/// machine.
pub async fn reset_kvm_v2<S>(
    State(state): State<Arc<ServerState<S>>>,
    caller: Caller,
    Json(arg): Json<params::Entity>,
) -> Result<Json<ErrorResult>, ApiError>
where
    S: DocumentStore + 'static,
{
    let facade = UpgradeStepsFacadeV2::new(shared_api(&state, &caller)?);
    let result = facade.reset_kvm_machine_modification_status_idle(arg).await?;
    Ok(Json(result))
}

/// `POST /v2/upgrade-steps/write-uniter-state`
///
/// # Errors
///
/// Returns an error if the caller may not use the facade, a tag is
/// malformed, or a unit cannot be found.
pub async fn write_uniter_state<S>(
    State(state): State<Arc<ServerState<S>>>,
    caller: Caller,
    Json(args): Json<SetUnitStateArgs>,
) -> Result<Json<ErrorResults>, ApiError>
where
    S: DocumentStore + 'static,
{
    let facade = UpgradeStepsFacadeV2::new(shared_api(&state, &caller)?);
    let results = facade.write_uniter_state(args).await?;
    Ok(Json(results))
}
