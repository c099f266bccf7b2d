//! Application operations, including pod spec updates for CAAS models.

use orrery_core::{ApplicationTag, Life};
use orrery_store::{collections, doc, Assert, ConditionalWrite, DocumentStore, FieldUpdate};
use serde::{Deserialize, Serialize};

use crate::entity::{read_application, Charm};
use crate::error::{Result, StateError};
use crate::keys;
use crate::txn::Operation;

/// The stored pod spec of an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSpec {
    /// The spec text.
    pub spec: String,
    /// Bumped on every write so watchers notice re-applied specs.
    pub upgrade_counter: i64,
}

/// Read an application's pod spec.
///
/// # Errors
///
/// Returns `StateError::NotFound` if no pod spec has been set.
pub fn read_pod_spec(store: &dyn DocumentStore, tag: &ApplicationTag) -> Result<PodSpec> {
    let record = store
        .get(collections::POD_SPECS, &keys::application(tag.id()))?
        .ok_or_else(|| StateError::not_found("pod spec", tag.id()))?;
    Ok(PodSpec {
        spec: record.get_str("spec").unwrap_or_default().to_string(),
        upgrade_counter: record.get_i64("upgrade-counter").unwrap_or_default(),
    })
}

/// Add an alive application.
#[derive(Debug, Clone)]
pub struct AddApplicationOperation {
    tag: ApplicationTag,
    charm: Option<Charm>,
}

impl AddApplicationOperation {
    /// Add application `tag` with optional charm metadata.
    #[must_use]
    pub const fn new(tag: ApplicationTag, charm: Option<Charm>) -> Self {
        Self { tag, charm }
    }
}

impl Operation for AddApplicationOperation {
    fn build(&self, store: &dyn DocumentStore, _attempt: u32) -> Result<Vec<ConditionalWrite>> {
        let id = keys::application(self.tag.id());
        if store.get(collections::APPLICATIONS, &id)?.is_some() {
            return Err(StateError::Validation(format!(
                "application {} already exists",
                self.tag.id()
            )));
        }

        let mut fields = doc([("life", Life::Alive.as_str().into())]);
        if let Some(charm) = &self.charm {
            let charm = serde_json::to_value(charm)
                .map_err(|e| StateError::Validation(format!("invalid charm: {e}")))?;
            fields.insert("charm".into(), charm);
        }

        Ok(vec![ConditionalWrite::on(collections::APPLICATIONS, id)
            .asserting(Assert::Missing)
            .insert(fields)])
    }
}

/// Advance an application's life.
#[derive(Debug, Clone)]
pub struct SetApplicationLifeOperation {
    tag: ApplicationTag,
    life: Life,
}

impl SetApplicationLifeOperation {
    /// Set the life of application `tag`.
    #[must_use]
    pub const fn new(tag: ApplicationTag, life: Life) -> Self {
        Self { tag, life }
    }
}

impl Operation for SetApplicationLifeOperation {
    fn build(&self, store: &dyn DocumentStore, _attempt: u32) -> Result<Vec<ConditionalWrite>> {
        let (app, record) = read_application(store, &self.tag)?;
        if app.life == self.life {
            return Ok(Vec::new());
        }
        if !app.life.can_advance_to(self.life) {
            return Err(StateError::Validation(format!(
                "cannot set life of application {} from {} to {}",
                self.tag.id(),
                app.life,
                self.life
            )));
        }
        Ok(vec![ConditionalWrite::on(collections::APPLICATIONS, record.id)
            .asserting(Assert::Revision(record.revision))
            .update(vec![FieldUpdate::set("life", self.life.as_str())])])
    }
}

/// Set (or re-apply) the pod spec of a CAAS application.
///
/// Every successful write bumps `upgrade-counter`. With no spec given, the
/// counter is bumped and the stored spec is left as it was.
#[derive(Debug, Clone)]
pub struct SetPodSpecOperation {
    tag: ApplicationTag,
    spec: Option<String>,
}

impl SetPodSpecOperation {
    /// Set the pod spec of application `tag`.
    #[must_use]
    pub const fn new(tag: ApplicationTag, spec: Option<String>) -> Self {
        Self { tag, spec }
    }
}

impl Operation for SetPodSpecOperation {
    fn build(&self, store: &dyn DocumentStore, _attempt: u32) -> Result<Vec<ConditionalWrite>> {
        let (app, record) = read_application(store, &self.tag)?;
        if app.life != Life::Alive {
            return Err(StateError::Validation(format!(
                "application {} not alive",
                self.tag.id()
            )));
        }
        // The charm may not be there yet while a migration is importing it.
        if app.is_operator() {
            return Err(StateError::Validation(
                "cannot set k8s spec on an operator charm".into(),
            ));
        }

        let alive = ConditionalWrite::on(collections::APPLICATIONS, record.id)
            .asserting(Assert::field("life", Life::Alive.as_str()));

        let id = keys::application(self.tag.id());
        let spec = match store.get(collections::POD_SPECS, &id)? {
            Some(existing) => {
                let assert = match existing.get("upgrade-counter") {
                    Some(counter) => Assert::field("upgrade-counter", counter.clone()),
                    None => Assert::Revision(existing.revision),
                };
                let mut updates = vec![FieldUpdate::inc("upgrade-counter", 1)];
                if let Some(spec) = &self.spec {
                    updates.push(FieldUpdate::set("spec", spec.clone()));
                }
                ConditionalWrite::on(collections::POD_SPECS, id)
                    .asserting(assert)
                    .update(updates)
            }
            None => ConditionalWrite::on(collections::POD_SPECS, id)
                .asserting(Assert::Missing)
                .insert(doc([
                    ("spec", self.spec.clone().unwrap_or_default().into()),
                    ("upgrade-counter", 0.into()),
                ])),
        };

        Ok(vec![alive, spec])
    }

    fn done(&self, result: Result<()>) -> Result<()> {
        match result {
            Ok(()) => {
                tracing::debug!(application = %self.tag.id(), "Set pod spec");
                Ok(())
            }
            Err(StateError::Validation(msg)) => {
                Err(StateError::Validation(format!("setting pod spec: {msg}")))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::TxnRunner;
    use orrery_core::DeploymentMode;
    use orrery_store::MemoryStore;
    use std::sync::Arc;

    fn setup(charm: Option<Charm>) -> (TxnRunner<MemoryStore>, ApplicationTag) {
        let runner = TxnRunner::with_defaults(Arc::new(MemoryStore::new()));
        let tag = ApplicationTag::new("gitlab").unwrap();
        runner
            .run(&AddApplicationOperation::new(tag.clone(), charm))
            .unwrap();
        (runner, tag)
    }

    fn pod_spec(runner: &TxnRunner<MemoryStore>, tag: &ApplicationTag) -> PodSpec {
        read_pod_spec(runner.store().as_ref(), tag).unwrap()
    }

    #[test]
    fn first_write_inserts_with_zero_counter() {
        let (runner, tag) = setup(None);
        runner
            .run(&SetPodSpecOperation::new(tag.clone(), Some("v1".into())))
            .unwrap();
        assert_eq!(
            pod_spec(&runner, &tag),
            PodSpec {
                spec: "v1".into(),
                upgrade_counter: 0
            }
        );
    }

    #[test]
    fn later_writes_bump_counter() {
        let (runner, tag) = setup(None);
        runner
            .run(&SetPodSpecOperation::new(tag.clone(), Some("v1".into())))
            .unwrap();
        runner
            .run(&SetPodSpecOperation::new(tag.clone(), Some("v2".into())))
            .unwrap();
        runner
            .run(&SetPodSpecOperation::new(tag.clone(), None))
            .unwrap();
        assert_eq!(
            pod_spec(&runner, &tag),
            PodSpec {
                spec: "v2".into(),
                upgrade_counter: 2
            }
        );
    }

    #[test]
    fn no_spec_on_first_write_stores_empty_spec() {
        let (runner, tag) = setup(None);
        runner
            .run(&SetPodSpecOperation::new(tag.clone(), None))
            .unwrap();
        assert_eq!(pod_spec(&runner, &tag).spec, "");
    }

    #[test]
    fn rejects_operator_charm() {
        let (runner, tag) = setup(Some(Charm {
            name: "gitlab".into(),
            deployment_mode: Some(DeploymentMode::Operator),
        }));
        let err = runner
            .run(&SetPodSpecOperation::new(tag.clone(), Some("v1".into())))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "setting pod spec: cannot set k8s spec on an operator charm"
        );
        assert!(read_pod_spec(runner.store().as_ref(), &tag)
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn workload_charm_is_allowed() {
        let (runner, tag) = setup(Some(Charm {
            name: "gitlab".into(),
            deployment_mode: Some(DeploymentMode::Workload),
        }));
        runner
            .run(&SetPodSpecOperation::new(tag, Some("v1".into())))
            .unwrap();
    }

    #[test]
    fn rejects_dying_application_after_one_read() {
        let (runner, tag) = setup(None);
        runner
            .run(&SetApplicationLifeOperation::new(tag.clone(), Life::Dying))
            .unwrap();
        let before = runner.store().stats();

        let err = runner
            .run(&SetPodSpecOperation::new(tag, Some("v1".into())))
            .unwrap_err();

        assert_eq!(err.to_string(), "setting pod spec: application gitlab not alive");
        let after = runner.store().stats();
        assert_eq!(after.reads - before.reads, 1);
        assert_eq!(after.applies, before.applies);
    }

    #[test]
    fn missing_application_is_not_found() {
        let runner = TxnRunner::with_defaults(Arc::new(MemoryStore::new()));
        let err = runner
            .run(&SetPodSpecOperation::new(
                ApplicationTag::new("nope").unwrap(),
                None,
            ))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn add_application_twice_fails() {
        let (runner, tag) = setup(None);
        let err = runner
            .run(&AddApplicationOperation::new(tag, None))
            .unwrap_err();
        assert!(matches!(err, StateError::Validation(_)));
    }
}
