//! The upgrade-steps facade.
//!
//! Version 1 offers the KVM modification status reset. Version 2 adds
//! writing uniter state. Both versions are thin handles over one shared
//! [`UpgradeStepsApi`].

use std::sync::Arc;

use async_trait::async_trait;
use orrery_core::{ContainerType, Kind, MachineTag, Tag, UnitTag};
use orrery_state::{Entity, EntityFinder, Machine, Result as StateResult, State, Unit};
use orrery_store::DocumentStore;

use crate::auth::{auth_func_for_machine_agent, auth_func_for_tag_kind, AuthFunc, Authorizer};
use crate::error::ApiError;
use crate::params::{self, ErrorResult, ErrorResults, SetUnitStateArgs};

/// State access needed by the upgrade-steps facade.
pub trait UpgradeStepsState: EntityFinder + Send + Sync {
    /// Reset a KVM machine's modification status from error to idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the status is missing or the write fails.
    fn reset_modification_status_idle(&self, tag: &MachineTag) -> StateResult<()>;

    /// Persist a unit's uniter state.
    ///
    /// # Errors
    ///
    /// Returns an error if the unit is missing, not alive, or the write fails.
    fn set_unit_state(&self, tag: &UnitTag, uniter_state: &str) -> StateResult<()>;
}

impl<S: DocumentStore> UpgradeStepsState for State<S> {
    fn reset_modification_status_idle(&self, tag: &MachineTag) -> StateResult<()> {
        Self::reset_modification_status_idle(self, tag)
    }

    fn set_unit_state(&self, tag: &UnitTag, uniter_state: &str) -> StateResult<()> {
        Self::set_unit_state(self, tag, uniter_state)
    }
}

/// Version 1 of the upgrade-steps facade.
#[async_trait]
pub trait UpgradeStepsV1: Send + Sync {
    /// Set a KVM machine's modification status to idle if it is in error.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Permission` if the caller may not access the
    /// machine, or an error if the machine cannot be found.
    async fn reset_kvm_machine_modification_status_idle(
        &self,
        arg: params::Entity,
    ) -> Result<ErrorResult, ApiError>;
}

/// Version 2 of the upgrade-steps facade.
#[async_trait]
pub trait UpgradeStepsV2: UpgradeStepsV1 {
    /// Write the uniter state for each listed unit.
    ///
    /// # Errors
    ///
    /// Returns an error if a tag is malformed or a unit cannot be found.
    async fn write_uniter_state(&self, args: SetUnitStateArgs) -> Result<ErrorResults, ApiError>;
}

/// Shared implementation behind every facade version.
pub struct UpgradeStepsApi {
    state: Arc<dyn UpgradeStepsState>,
    authorizer: Arc<dyn Authorizer>,
    machine_auth: AuthFunc,
    unit_auth: AuthFunc,
}

impl UpgradeStepsApi {
    /// Create the shared facade core for `authorizer`.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Permission` unless the caller is a machine agent
    /// or the controller.
    pub fn new(
        state: Arc<dyn UpgradeStepsState>,
        authorizer: Arc<dyn Authorizer>,
    ) -> Result<Self, ApiError> {
        if !authorizer.auth_machine_agent() && !authorizer.auth_controller() {
            return Err(ApiError::Permission);
        }
        let machine_auth = auth_func_for_machine_agent(authorizer.as_ref());
        Ok(Self {
            state,
            authorizer,
            machine_auth,
            unit_auth: auth_func_for_tag_kind(Kind::Unit),
        })
    }

    /// The caller this facade was created for.
    #[must_use]
    pub fn authorizer(&self) -> &dyn Authorizer {
        self.authorizer.as_ref()
    }

    fn machine(&self, tag: &MachineTag) -> Result<Machine, ApiError> {
        let tag = Tag::Machine(tag.clone());
        if !(self.machine_auth)(&tag) {
            return Err(ApiError::Permission);
        }
        match self.state.find_entity(&tag)? {
            Entity::Machine(machine) => Ok(machine),
            _ => Err(ApiError::BadRequest(format!("{tag} is not a machine entity"))),
        }
    }

    fn unit(&self, tag: &UnitTag) -> Result<Unit, ApiError> {
        let tag = Tag::Unit(tag.clone());
        if !(self.unit_auth)(&tag) {
            tracing::error!(tag = %tag, "Unit access denied");
            return Err(ApiError::Permission);
        }
        match self.state.find_entity(&tag) {
            Ok(Entity::Unit(unit)) => Ok(unit),
            Ok(_) => Err(ApiError::BadRequest(format!("{tag} is not a unit entity"))),
            Err(err) => {
                tracing::error!(tag = %tag, error = %err, "Unable to find unit");
                Err(err.into())
            }
        }
    }

    fn reset_kvm_machine_modification_status_idle(
        &self,
        arg: &params::Entity,
    ) -> Result<ErrorResult, ApiError> {
        let tag: MachineTag = arg.tag.parse()?;
        let machine = self.machine(&tag)?;

        if machine.container_type != ContainerType::Kvm {
            return Ok(ErrorResult::default());
        }

        tracing::info!(machine = %tag.id(), "Resetting KVM modification status");
        Ok(ErrorResult::from_outcome(
            self.state.reset_modification_status_idle(&tag),
        ))
    }

    fn write_uniter_state(&self, args: &SetUnitStateArgs) -> Result<ErrorResults, ApiError> {
        let mut results = ErrorResults::with_len(args.args.len());

        for (slot, item) in results.results.iter_mut().zip(&args.args) {
            let tag: UnitTag = item.tag.parse()?;
            self.unit(&tag)?;

            let Some(uniter_state) = item.uniter_state.as_deref() else {
                tracing::warn!(unit = %tag.id(), "No uniter state provided");
                continue;
            };
            *slot = ErrorResult::from_outcome(self.state.set_unit_state(&tag, uniter_state));
        }

        Ok(results)
    }
}

/// Version 1 handle: the reset call only.
pub struct UpgradeStepsFacadeV1 {
    api: Arc<UpgradeStepsApi>,
}

impl UpgradeStepsFacadeV1 {
    /// Wrap the shared core.
    #[must_use]
    pub const fn new(api: Arc<UpgradeStepsApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl UpgradeStepsV1 for UpgradeStepsFacadeV1 {
    async fn reset_kvm_machine_modification_status_idle(
        &self,
        arg: params::Entity,
    ) -> Result<ErrorResult, ApiError> {
        self.api.reset_kvm_machine_modification_status_idle(&arg)
    }
}

/// Version 2 handle: the reset call plus uniter state writes.
pub struct UpgradeStepsFacadeV2 {
    api: Arc<UpgradeStepsApi>,
}

impl UpgradeStepsFacadeV2 {
    /// Wrap the shared core.
    #[must_use]
    pub const fn new(api: Arc<UpgradeStepsApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl UpgradeStepsV1 for UpgradeStepsFacadeV2 {
    async fn reset_kvm_machine_modification_status_idle(
        &self,
        arg: params::Entity,
    ) -> Result<ErrorResult, ApiError> {
        self.api.reset_kvm_machine_modification_status_idle(&arg)
    }
}

#[async_trait]
impl UpgradeStepsV2 for UpgradeStepsFacadeV2 {
    async fn write_uniter_state(&self, args: SetUnitStateArgs) -> Result<ErrorResults, ApiError> {
        self.api.write_uniter_state(&args)
    }
}
