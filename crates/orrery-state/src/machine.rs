//! Machine operations.

use chrono::Utc;
use orrery_core::{ContainerType, Life, MachineTag, Status};
use orrery_store::{collections, doc, Assert, ConditionalWrite, DocumentStore, FieldUpdate};

use crate::entity::{read_machine, StatusInfo};
use crate::error::{Result, StateError};
use crate::keys;
use crate::txn::Operation;

/// Add a machine with an idle modification status.
#[derive(Debug, Clone)]
pub struct AddMachineOperation {
    tag: MachineTag,
    container_type: ContainerType,
    series: String,
}

impl AddMachineOperation {
    /// Add machine `tag`.
    #[must_use]
    pub fn new(tag: MachineTag, container_type: ContainerType, series: impl Into<String>) -> Self {
        Self {
            tag,
            container_type,
            series: series.into(),
        }
    }
}

impl Operation for AddMachineOperation {
    fn build(&self, store: &dyn DocumentStore, _attempt: u32) -> Result<Vec<ConditionalWrite>> {
        let id = self.tag.id();
        if store.get(collections::MACHINES, &keys::machine(id))?.is_some() {
            return Err(StateError::Validation(format!("machine {id} already exists")));
        }
        Ok(vec![
            ConditionalWrite::on(collections::MACHINES, keys::machine(id))
                .asserting(Assert::Missing)
                .insert(doc([
                    ("life", Life::Alive.as_str().into()),
                    ("container-type", self.container_type.as_str().into()),
                    ("series", self.series.clone().into()),
                ])),
            ConditionalWrite::on(collections::STATUSES, keys::machine_modification_status(id))
                .asserting(Assert::Missing)
                .insert(doc([
                    ("status", Status::Idle.as_str().into()),
                    ("updated", Utc::now().to_rfc3339().into()),
                ])),
        ])
    }
}

/// Advance a machine's life.
#[derive(Debug, Clone)]
pub struct SetMachineLifeOperation {
    tag: MachineTag,
    life: Life,
}

impl SetMachineLifeOperation {
    /// Set the life of machine `tag`.
    #[must_use]
    pub const fn new(tag: MachineTag, life: Life) -> Self {
        Self { tag, life }
    }
}

impl Operation for SetMachineLifeOperation {
    fn build(&self, store: &dyn DocumentStore, _attempt: u32) -> Result<Vec<ConditionalWrite>> {
        let (machine, record) = read_machine(store, &self.tag)?;
        if machine.life == self.life {
            return Ok(Vec::new());
        }
        if !machine.life.can_advance_to(self.life) {
            return Err(StateError::Validation(format!(
                "cannot set life of machine {} from {} to {}",
                self.tag.id(),
                machine.life,
                self.life
            )));
        }
        Ok(vec![ConditionalWrite::on(collections::MACHINES, record.id)
            .asserting(Assert::Revision(record.revision))
            .update(vec![FieldUpdate::set("life", self.life.as_str())])])
    }
}

/// Set a machine's modification status.
#[derive(Debug, Clone)]
pub struct SetMachineModificationStatusOperation {
    tag: MachineTag,
    status: Status,
    message: String,
}

impl SetMachineModificationStatusOperation {
    /// Set the modification status of machine `tag`.
    #[must_use]
    pub fn new(tag: MachineTag, status: Status, message: impl Into<String>) -> Self {
        Self {
            tag,
            status,
            message: message.into(),
        }
    }
}

impl Operation for SetMachineModificationStatusOperation {
    fn build(&self, store: &dyn DocumentStore, _attempt: u32) -> Result<Vec<ConditionalWrite>> {
        read_machine(store, &self.tag)?;
        let id = keys::machine_modification_status(self.tag.id());
        let now = Utc::now().to_rfc3339();

        let machine_exists =
            ConditionalWrite::on(collections::MACHINES, keys::machine(self.tag.id()))
                .asserting(Assert::Exists);

        let status = match store.get(collections::STATUSES, &id)? {
            Some(record) => {
                let message = if self.message.is_empty() {
                    FieldUpdate::unset("message")
                } else {
                    FieldUpdate::set("message", self.message.clone())
                };
                ConditionalWrite::on(collections::STATUSES, id)
                    .asserting(Assert::Revision(record.revision))
                    .update(vec![
                        FieldUpdate::set("status", self.status.as_str()),
                        message,
                        FieldUpdate::set("updated", now),
                    ])
            }
            None => {
                let mut fields = doc([
                    ("status", self.status.as_str().into()),
                    ("updated", now.into()),
                ]);
                if !self.message.is_empty() {
                    fields.insert("message".into(), self.message.clone().into());
                }
                ConditionalWrite::on(collections::STATUSES, id)
                    .asserting(Assert::Missing)
                    .insert(fields)
            }
        };

        Ok(vec![machine_exists, status])
    }
}

/// Reset a KVM machine's modification status from error to idle.
///
/// Machines that are not KVM containers, or whose status is anything other
/// than error, are left alone.
#[derive(Debug, Clone)]
pub struct ResetModificationStatusIdleOperation {
    tag: MachineTag,
}

impl ResetModificationStatusIdleOperation {
    /// Reset machine `tag`.
    #[must_use]
    pub const fn new(tag: MachineTag) -> Self {
        Self { tag }
    }
}

impl Operation for ResetModificationStatusIdleOperation {
    fn build(&self, store: &dyn DocumentStore, _attempt: u32) -> Result<Vec<ConditionalWrite>> {
        let (machine, record) = read_machine(store, &self.tag)?;
        if machine.container_type != ContainerType::Kvm {
            return Ok(Vec::new());
        }

        let status_id = keys::machine_modification_status(self.tag.id());
        let status_record = store
            .get(collections::STATUSES, &status_id)?
            .ok_or_else(|| StateError::not_found("modification status", self.tag.id()))?;
        if StatusInfo::from_record(&status_record)?.status != Status::Error {
            return Ok(Vec::new());
        }

        if machine.life != Life::Alive {
            return Err(StateError::Validation(format!(
                "machine {} not alive",
                self.tag.id()
            )));
        }

        Ok(vec![
            ConditionalWrite::on(collections::MACHINES, record.id)
                .asserting(Assert::field("life", Life::Alive.as_str())),
            ConditionalWrite::on(collections::STATUSES, status_id)
                .asserting(Assert::Revision(status_record.revision))
                .update(vec![
                    FieldUpdate::set("status", Status::Idle.as_str()),
                    FieldUpdate::unset("message"),
                    FieldUpdate::set("updated", Utc::now().to_rfc3339()),
                ]),
        ])
    }

    fn done(&self, result: Result<()>) -> Result<()> {
        if result.is_ok() {
            tracing::debug!(machine = %self.tag.id(), "Reconciled modification status");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::TxnRunner;
    use orrery_store::MemoryStore;
    use std::sync::Arc;

    fn setup(container_type: ContainerType) -> (TxnRunner<MemoryStore>, MachineTag) {
        let runner = TxnRunner::with_defaults(Arc::new(MemoryStore::new()));
        let tag = MachineTag::new("0/kvm/0").unwrap();
        runner
            .run(&AddMachineOperation::new(tag.clone(), container_type, "jammy"))
            .unwrap();
        (runner, tag)
    }

    fn status(runner: &TxnRunner<MemoryStore>, tag: &MachineTag) -> StatusInfo {
        let record = runner
            .store()
            .get(collections::STATUSES, &keys::machine_modification_status(tag.id()))
            .unwrap()
            .unwrap();
        StatusInfo::from_record(&record).unwrap()
    }

    #[test]
    fn add_machine_twice_fails() {
        let (runner, tag) = setup(ContainerType::None);
        let err = runner
            .run(&AddMachineOperation::new(tag, ContainerType::None, "jammy"))
            .unwrap_err();
        assert!(matches!(err, StateError::Validation(msg) if msg.contains("already exists")));
    }

    #[test]
    fn reset_kvm_in_error() {
        let (runner, tag) = setup(ContainerType::Kvm);
        runner
            .run(&SetMachineModificationStatusOperation::new(
                tag.clone(),
                Status::Error,
                "failed to start",
            ))
            .unwrap();
        assert_eq!(status(&runner, &tag).message, "failed to start");

        runner
            .run(&ResetModificationStatusIdleOperation::new(tag.clone()))
            .unwrap();

        let info = status(&runner, &tag);
        assert_eq!(info.status, Status::Idle);
        assert!(info.message.is_empty());
        assert!(info.updated.is_some());
    }

    #[test]
    fn reset_is_noop_for_non_kvm() {
        let (runner, tag) = setup(ContainerType::Lxd);
        runner
            .run(&SetMachineModificationStatusOperation::new(
                tag.clone(),
                Status::Error,
                "boom",
            ))
            .unwrap();
        let applies = runner.store().stats().applies;

        runner
            .run(&ResetModificationStatusIdleOperation::new(tag.clone()))
            .unwrap();

        assert_eq!(runner.store().stats().applies, applies);
        assert_eq!(status(&runner, &tag).status, Status::Error);
    }

    #[test]
    fn reset_is_noop_when_not_in_error() {
        let (runner, tag) = setup(ContainerType::Kvm);
        let applies = runner.store().stats().applies;

        runner
            .run(&ResetModificationStatusIdleOperation::new(tag.clone()))
            .unwrap();

        assert_eq!(runner.store().stats().applies, applies);
        assert_eq!(status(&runner, &tag).status, Status::Idle);
    }

    #[test]
    fn reset_missing_machine_is_not_found() {
        let runner = TxnRunner::with_defaults(Arc::new(MemoryStore::new()));
        let err = runner
            .run(&ResetModificationStatusIdleOperation::new(
                MachineTag::new("7").unwrap(),
            ))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn reset_refuses_dying_machine() {
        let (runner, tag) = setup(ContainerType::Kvm);
        runner
            .run(&SetMachineModificationStatusOperation::new(
                tag.clone(),
                Status::Error,
                "",
            ))
            .unwrap();
        runner
            .run(&SetMachineLifeOperation::new(tag.clone(), Life::Dying))
            .unwrap();

        let err = runner
            .run(&ResetModificationStatusIdleOperation::new(tag.clone()))
            .unwrap_err();
        assert!(matches!(err, StateError::Validation(_)));
        assert_eq!(status(&runner, &tag).status, Status::Error);
    }

    #[test]
    fn life_cannot_go_backwards() {
        let (runner, tag) = setup(ContainerType::None);
        runner
            .run(&SetMachineLifeOperation::new(tag.clone(), Life::Dead))
            .unwrap();
        let err = runner
            .run(&SetMachineLifeOperation::new(tag, Life::Alive))
            .unwrap_err();
        assert!(matches!(err, StateError::Validation(_)));
    }
}
