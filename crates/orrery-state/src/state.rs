//! The model state handle.
//!
//! `State` ties a store to a model and a retry executor, and offers one
//! method per operation so callers never assemble batches themselves.

use std::sync::Arc;

use chrono::Duration;
use orrery_core::{ApplicationTag, ContainerType, Life, MachineTag, Status, Tag, UnitTag};
use orrery_store::{collections, DocumentStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::{
    read_pod_spec, AddApplicationOperation, PodSpec, SetApplicationLifeOperation,
    SetPodSpecOperation,
};
use crate::config::{
    read_settings, ConfigSet, ControllerAttributes, SaveModelConfigOperation,
};
use crate::entity::{
    read_application, read_machine, read_unit, Application, Charm, Entity, EntityFinder, Machine,
    StatusInfo, Unit,
};
use crate::error::{Result, StateError};
use crate::keys;
use crate::leadership::{
    read_lease, ClaimLeaseOperation, Lease, LeadershipGate, RevokeLeaseOperation, Token,
};
use crate::machine::{
    AddMachineOperation, ResetModificationStatusIdleOperation, SetMachineLifeOperation,
    SetMachineModificationStatusOperation,
};
use crate::txn::{Operation, RunnerConfig, TxnRunner};
use crate::unit::{read_uniter_state, AddUnitOperation, SetUnitStateOperation};

/// Configuration for a [`State`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateConfig {
    /// Retry executor settings.
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// Access to one model's state.
pub struct State<S: DocumentStore> {
    model_uuid: Uuid,
    runner: TxnRunner<S>,
    controller_attrs: ControllerAttributes,
}

impl<S: DocumentStore> State<S> {
    /// Create a state handle for model `model_uuid`.
    #[must_use]
    pub fn new(store: Arc<S>, model_uuid: Uuid, config: StateConfig) -> Self {
        Self {
            model_uuid,
            runner: TxnRunner::new(store, config.runner),
            controller_attrs: ControllerAttributes::default(),
        }
    }

    /// Create a state handle with default configuration.
    #[must_use]
    pub fn with_defaults(store: Arc<S>, model_uuid: Uuid) -> Self {
        Self::new(store, model_uuid, StateConfig::default())
    }

    /// Use a different set of controller-only attribute names.
    #[must_use]
    pub fn with_controller_attributes(mut self, attrs: ControllerAttributes) -> Self {
        self.controller_attrs = attrs;
        self
    }

    /// The model this state belongs to.
    #[must_use]
    pub const fn model_uuid(&self) -> Uuid {
        self.model_uuid
    }

    /// The model's tag.
    #[must_use]
    pub const fn model_tag(&self) -> Tag {
        Tag::Model(self.model_uuid)
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        self.runner.store()
    }

    /// Run an operation through the retry executor.
    ///
    /// # Errors
    ///
    /// Returns whatever the operation or executor returns.
    pub fn run(&self, op: &dyn Operation) -> Result<()> {
        self.runner.run(op)
    }

    /// Run an operation gated on `token`, if one is given.
    ///
    /// # Errors
    ///
    /// Returns `StateError::LeadershipLost` if the token is no longer valid,
    /// or whatever the operation or executor returns.
    pub fn run_with_leadership<O>(&self, op: O, token: Option<Arc<dyn Token>>) -> Result<()>
    where
        O: Operation + 'static,
    {
        self.runner.run(&LeadershipGate::wrap(op, token))
    }

    fn reader(&self) -> &dyn DocumentStore {
        self.runner.store().as_ref()
    }

    // =========================================================================
    // Machines
    // =========================================================================

    /// Add a machine.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Validation` if the machine already exists.
    pub fn add_machine(
        &self,
        tag: &MachineTag,
        container_type: ContainerType,
        series: &str,
    ) -> Result<()> {
        tracing::info!(machine = %tag.id(), container_type = %container_type, "Adding machine");
        self.run(&AddMachineOperation::new(tag.clone(), container_type, series))
    }

    /// Get a machine.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` if the machine does not exist.
    pub fn machine(&self, tag: &MachineTag) -> Result<Machine> {
        Ok(read_machine(self.reader(), tag)?.0)
    }

    /// Advance a machine's life.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Validation` if life would go backwards.
    pub fn set_machine_life(&self, tag: &MachineTag, life: Life) -> Result<()> {
        self.run(&SetMachineLifeOperation::new(tag.clone(), life))
    }

    /// Get a machine's modification status.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` if the status has never been set.
    pub fn machine_modification_status(&self, tag: &MachineTag) -> Result<StatusInfo> {
        let record = self
            .reader()
            .get(collections::STATUSES, &keys::machine_modification_status(tag.id()))?
            .ok_or_else(|| StateError::not_found("modification status", tag.id()))?;
        StatusInfo::from_record(&record)
    }

    /// Set a machine's modification status.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` if the machine does not exist.
    pub fn set_machine_modification_status(
        &self,
        tag: &MachineTag,
        status: Status,
        message: &str,
    ) -> Result<()> {
        self.run(&SetMachineModificationStatusOperation::new(
            tag.clone(),
            status,
            message,
        ))
    }

    /// Reset a KVM machine's modification status to idle if it is in error.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` if the machine or its status does not
    /// exist.
    pub fn reset_modification_status_idle(&self, tag: &MachineTag) -> Result<()> {
        self.run(&ResetModificationStatusIdleOperation::new(tag.clone()))
    }

    // =========================================================================
    // Applications
    // =========================================================================

    /// Add an application.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Validation` if the application already exists.
    pub fn add_application(&self, tag: &ApplicationTag, charm: Option<Charm>) -> Result<()> {
        tracing::info!(application = %tag.id(), "Adding application");
        self.run(&AddApplicationOperation::new(tag.clone(), charm))
    }

    /// Get an application.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` if the application does not exist.
    pub fn application(&self, tag: &ApplicationTag) -> Result<Application> {
        Ok(read_application(self.reader(), tag)?.0)
    }

    /// Advance an application's life.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Validation` if life would go backwards.
    pub fn set_application_life(&self, tag: &ApplicationTag, life: Life) -> Result<()> {
        self.run(&SetApplicationLifeOperation::new(tag.clone(), life))
    }

    /// Set an application's pod spec, optionally gated on leadership.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Validation` if the application is not alive or
    /// runs an operator charm, and `StateError::LeadershipLost` if `token`
    /// is no longer valid.
    pub fn set_pod_spec(
        &self,
        tag: &ApplicationTag,
        spec: Option<String>,
        token: Option<Arc<dyn Token>>,
    ) -> Result<()> {
        self.run_with_leadership(SetPodSpecOperation::new(tag.clone(), spec), token)
    }

    /// Get an application's pod spec.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` if no pod spec has been set.
    pub fn pod_spec(&self, tag: &ApplicationTag) -> Result<PodSpec> {
        read_pod_spec(self.reader(), tag)
    }

    // =========================================================================
    // Units
    // =========================================================================

    /// Add a unit to its application.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` if the application does not exist.
    pub fn add_unit(&self, tag: &UnitTag) -> Result<()> {
        tracing::info!(unit = %tag.id(), "Adding unit");
        self.run(&AddUnitOperation::new(tag.clone()))
    }

    /// Get a unit.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` if the unit does not exist.
    pub fn unit(&self, tag: &UnitTag) -> Result<Unit> {
        Ok(read_unit(self.reader(), tag)?.0)
    }

    /// Persist a unit's uniter state.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` if the unit does not exist, or
    /// `StateError::Validation` if it is not alive.
    pub fn set_unit_state(&self, tag: &UnitTag, uniter_state: &str) -> Result<()> {
        self.run(&SetUnitStateOperation::new(tag.clone(), uniter_state))
    }

    /// Get a unit's persisted uniter state.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn uniter_state(&self, tag: &UnitTag) -> Result<Option<String>> {
        read_uniter_state(self.reader(), tag)
    }

    // =========================================================================
    // Leadership
    // =========================================================================

    /// Claim or extend leadership of an application.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Validation` if another unit holds a live lease.
    pub fn claim_leadership(
        &self,
        application: &str,
        unit: &str,
        duration: Duration,
    ) -> Result<()> {
        self.run(&ClaimLeaseOperation::new(application, unit, duration))
    }

    /// Revoke leadership of an application.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn revoke_leadership(&self, application: &str) -> Result<()> {
        tracing::info!(application = %application, "Revoking leadership");
        self.run(&RevokeLeaseOperation::new(application))
    }

    /// Get the current leadership lease of an application.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub fn leadership_lease(&self, application: &str) -> Result<Option<Lease>> {
        read_lease(self.reader(), application)
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// The controller-only attribute names in use.
    #[must_use]
    pub const fn controller_attributes(&self) -> &ControllerAttributes {
        &self.controller_attrs
    }

    /// Get the controller configuration.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` if no configuration has been saved.
    pub fn controller_config(&self) -> Result<ConfigSet> {
        read_settings(self.reader(), collections::CONTROLLERS, keys::CONTROLLER_SETTINGS)
    }

    /// Get the model configuration.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` if no configuration has been saved.
    pub fn model_config(&self) -> Result<ConfigSet> {
        read_settings(self.reader(), collections::SETTINGS, keys::MODEL_SETTINGS)
    }

    /// Save a flat configuration set, splitting it between the controller
    /// and the model.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or contention persists.
    pub fn save_model_config(&self, incoming: ConfigSet) -> Result<()> {
        tracing::info!(
            model = %self.model_uuid,
            attributes = incoming.len(),
            "Saving model config"
        );
        self.run(&SaveModelConfigOperation::new(
            self.controller_attrs.clone(),
            incoming,
        ))
    }
}

impl<S: DocumentStore> EntityFinder for State<S> {
    fn find_entity(&self, tag: &Tag) -> Result<Entity> {
        match tag {
            Tag::Machine(t) => self.machine(t).map(Entity::Machine),
            Tag::Unit(t) => self.unit(t).map(Entity::Unit),
            Tag::Application(t) => self.application(t).map(Entity::Application),
            Tag::Model(_) | Tag::Controller(_) => Err(StateError::Validation(format!(
                "{tag} does not name a model entity"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orrery_store::MemoryStore;

    fn state() -> State<MemoryStore> {
        State::with_defaults(Arc::new(MemoryStore::new()), Uuid::new_v4())
    }

    #[test]
    fn find_entity_by_tag() {
        let st = state();
        let machine = MachineTag::new("0").unwrap();
        st.add_machine(&machine, ContainerType::None, "jammy").unwrap();
        let app = ApplicationTag::new("gitlab").unwrap();
        st.add_application(&app, None).unwrap();
        let unit = UnitTag::new("gitlab/0").unwrap();
        st.add_unit(&unit).unwrap();

        assert!(matches!(
            st.find_entity(&Tag::Machine(machine)).unwrap(),
            Entity::Machine(_)
        ));
        assert!(matches!(
            st.find_entity(&Tag::Application(app)).unwrap(),
            Entity::Application(_)
        ));
        let found = st.find_entity(&Tag::Unit(unit)).unwrap();
        assert_eq!(found.life(), Life::Alive);
    }

    #[test]
    fn find_missing_entity() {
        let st = state();
        let err = st
            .find_entity(&Tag::parse("machine-9").unwrap())
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn model_tag_is_not_an_entity() {
        let st = state();
        let err = st.find_entity(&st.model_tag()).unwrap_err();
        assert!(matches!(err, StateError::Validation(_)));
    }

    #[test]
    fn config_round_trip() {
        let st = state();
        let mut incoming = ConfigSet::new();
        incoming.insert("api-port".into(), 17070.into());
        incoming.insert("default-series".into(), "jammy".into());

        st.save_model_config(incoming).unwrap();

        assert_eq!(st.controller_config().unwrap().len(), 1);
        assert_eq!(
            st.model_config().unwrap().get("default-series"),
            Some(&serde_json::Value::from("jammy"))
        );
    }

    #[test]
    fn config_defaults_from_empty_json() {
        let config: StateConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.runner.max_retries, 3);
    }
}
