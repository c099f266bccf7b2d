//! Controller and model configuration.
//!
//! Callers hand over one flat configuration set. A fixed list of attribute
//! names belongs to the controller; everything else belongs to the model.
//! The controller's share is only taken from the incoming set when the
//! controller has no settings yet. After that the stored controller
//! settings win, and controller attributes that were not set up front never
//! appear later.

use std::collections::{BTreeMap, BTreeSet};

use orrery_store::{
    collections, Assert, ConditionalWrite, Document, DocumentStore, FieldUpdate, Record,
};
use serde_json::Value;

use crate::error::{Result, StateError};
use crate::keys;
use crate::txn::Operation;

/// A flat attribute set.
pub type ConfigSet = BTreeMap<String, Value>;

const DEFAULT_CONTROLLER_ATTRIBUTES: &[&str] = &[
    "api-port",
    "autocert-dns-name",
    "autocert-url",
    "ca-cert",
    "controller-uuid",
    "identity-public-key",
    "identity-url",
    "set-numa-control-policy",
    "state-port",
    "db-snap-channel",
    "max-txn-log-size",
];

/// The names of controller-only attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerAttributes(BTreeSet<String>);

impl Default for ControllerAttributes {
    fn default() -> Self {
        Self::new(DEFAULT_CONTROLLER_ATTRIBUTES.iter().copied())
    }
}

impl ControllerAttributes {
    /// Build a set from attribute names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    /// Returns true if `name` is controller-only.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// Iterate over the attribute names.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// The controller settings that result from saving `incoming` when the
/// controller currently has `existing`.
///
/// With no existing settings the controller attributes are taken from
/// `incoming`; attributes it lacks are left out. Otherwise the existing
/// controller attributes are kept as they are.
#[must_use]
pub fn split_controller_config(
    attrs: &ControllerAttributes,
    existing: &ConfigSet,
    incoming: &ConfigSet,
) -> ConfigSet {
    let source = if existing.is_empty() { incoming } else { existing };
    attrs
        .iter()
        .filter_map(|name| source.get(name).map(|v| (name.to_string(), v.clone())))
        .collect()
}

/// The model settings in `incoming`: every attribute that is not
/// controller-only.
#[must_use]
pub fn split_model_config(attrs: &ControllerAttributes, incoming: &ConfigSet) -> ConfigSet {
    incoming
        .iter()
        .filter(|(name, _)| !attrs.contains(name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

/// Read a settings record as a config set.
///
/// # Errors
///
/// Returns `StateError::NotFound` if the record does not exist.
pub fn read_settings(store: &dyn DocumentStore, collection: &str, id: &str) -> Result<ConfigSet> {
    store
        .get(collection, id)?
        .map(|r| r.doc)
        .ok_or_else(|| StateError::not_found("settings", id))
}

/// Save a flat configuration set, splitting it between the controller and
/// the model in one batch.
#[derive(Debug, Clone)]
pub struct SaveModelConfigOperation {
    attrs: ControllerAttributes,
    incoming: ConfigSet,
}

impl SaveModelConfigOperation {
    /// Save `incoming`, using `attrs` as the controller-only names.
    #[must_use]
    pub const fn new(attrs: ControllerAttributes, incoming: ConfigSet) -> Self {
        Self { attrs, incoming }
    }
}

impl Operation for SaveModelConfigOperation {
    fn build(&self, store: &dyn DocumentStore, _attempt: u32) -> Result<Vec<ConditionalWrite>> {
        let controller = store.get(collections::CONTROLLERS, keys::CONTROLLER_SETTINGS)?;
        let existing = controller.as_ref().map(|r| r.doc.clone()).unwrap_or_default();
        let controller_cfg = split_controller_config(&self.attrs, &existing, &self.incoming);
        let model_cfg = split_model_config(&self.attrs, &self.incoming);

        let model = store.get(collections::SETTINGS, keys::MODEL_SETTINGS)?;

        let controller_updates = controller
            .as_ref()
            .map(|record| replace_fields(&record.doc, &controller_cfg));
        let model_updates = model
            .as_ref()
            .map(|record| replace_fields(&record.doc, &model_cfg));
        if controller_updates.as_ref().is_some_and(Vec::is_empty)
            && model_updates.as_ref().is_some_and(Vec::is_empty)
        {
            return Ok(Vec::new());
        }

        let controller_write = settings_write(
            ConditionalWrite::on(collections::CONTROLLERS, keys::CONTROLLER_SETTINGS),
            controller.as_ref(),
            controller_updates,
            controller_cfg,
        );
        let model_write = settings_write(
            ConditionalWrite::on(collections::SETTINGS, keys::MODEL_SETTINGS),
            model.as_ref(),
            model_updates,
            model_cfg,
        );

        Ok(vec![controller_write, model_write])
    }
}

/// Pin a settings record at the revision read, writing only what changed.
fn settings_write(
    write: ConditionalWrite,
    current: Option<&Record>,
    updates: Option<Vec<FieldUpdate>>,
    next: ConfigSet,
) -> ConditionalWrite {
    match (current, updates) {
        (Some(record), Some(updates)) if updates.is_empty() => {
            write.asserting(Assert::Revision(record.revision))
        }
        (Some(record), Some(updates)) => write
            .asserting(Assert::Revision(record.revision))
            .update(updates),
        _ => write.asserting(Assert::Missing).insert(next),
    }
}

/// Field updates that turn `current` into `next`.
fn replace_fields(current: &Document, next: &ConfigSet) -> Vec<FieldUpdate> {
    let unset = current
        .keys()
        .filter(|name| !next.contains_key(*name))
        .map(FieldUpdate::unset);
    let set = next
        .iter()
        .filter(|(name, value)| current.get(*name) != Some(*value))
        .map(|(name, value)| FieldUpdate::set(name.clone(), value.clone()));
    unset.chain(set).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::txn::TxnRunner;
    use orrery_store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn set(pairs: &[(&str, i64)]) -> ConfigSet {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), json!(v)))
            .collect()
    }

    fn ab() -> ControllerAttributes {
        ControllerAttributes::new(["A", "B"])
    }

    #[test]
    fn existing_controller_config_wins() {
        let existing = set(&[("A", 1)]);
        let incoming = set(&[("A", 2), ("B", 5), ("C", 9)]);

        assert_eq!(
            split_controller_config(&ab(), &existing, &incoming),
            set(&[("A", 1)])
        );
        assert_eq!(split_model_config(&ab(), &incoming), set(&[("C", 9)]));
    }

    #[test]
    fn empty_controller_config_is_seeded_from_incoming() {
        let incoming = set(&[("A", 2), ("B", 5), ("C", 9)]);

        assert_eq!(
            split_controller_config(&ab(), &ConfigSet::new(), &incoming),
            set(&[("A", 2), ("B", 5)])
        );
        assert_eq!(split_model_config(&ab(), &incoming), set(&[("C", 9)]));
    }

    #[test]
    fn missing_controller_attributes_are_omitted() {
        let incoming = set(&[("A", 2), ("C", 9)]);
        let controller = split_controller_config(&ab(), &ConfigSet::new(), &incoming);
        assert_eq!(controller, set(&[("A", 2)]));
        assert!(!controller.contains_key("B"));
    }

    #[test]
    fn splits_are_disjoint_and_cover_incoming_on_first_save() {
        let attrs = ControllerAttributes::default();
        let mut incoming = ConfigSet::new();
        incoming.insert("api-port".into(), json!(17070));
        incoming.insert("ca-cert".into(), json!("---"));
        incoming.insert("logging-config".into(), json!("<root>=INFO"));
        incoming.insert("default-series".into(), json!("jammy"));

        let controller = split_controller_config(&attrs, &ConfigSet::new(), &incoming);
        let model = split_model_config(&attrs, &incoming);

        assert!(controller.keys().all(|k| !model.contains_key(k)));
        let mut union: Vec<_> = controller.keys().chain(model.keys()).cloned().collect();
        union.sort();
        let expected: Vec<_> = incoming.keys().cloned().collect();
        assert_eq!(union, expected);
    }

    #[test]
    fn save_model_config_persists_both_halves() {
        let runner = TxnRunner::with_defaults(Arc::new(MemoryStore::new()));
        let store = Arc::clone(runner.store());

        runner
            .run(&SaveModelConfigOperation::new(
                ab(),
                set(&[("A", 2), ("B", 5), ("C", 9)]),
            ))
            .unwrap();
        assert_eq!(
            read_settings(store.as_ref(), collections::CONTROLLERS, keys::CONTROLLER_SETTINGS)
                .unwrap(),
            set(&[("A", 2), ("B", 5)])
        );

        runner
            .run(&SaveModelConfigOperation::new(
                ab(),
                set(&[("A", 7), ("D", 1)]),
            ))
            .unwrap();
        assert_eq!(
            read_settings(store.as_ref(), collections::CONTROLLERS, keys::CONTROLLER_SETTINGS)
                .unwrap(),
            set(&[("A", 2), ("B", 5)])
        );
        assert_eq!(
            read_settings(store.as_ref(), collections::SETTINGS, keys::MODEL_SETTINGS).unwrap(),
            set(&[("D", 1)])
        );
    }

    #[test]
    fn identical_resave_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let runner = TxnRunner::with_defaults(Arc::clone(&store));
        let save = SaveModelConfigOperation::new(ab(), set(&[("A", 1), ("C", 9)]));

        runner.run(&save).unwrap();
        let applies = store.stats().applies;
        let model_rev = store
            .get(collections::SETTINGS, keys::MODEL_SETTINGS)
            .unwrap()
            .unwrap()
            .revision;

        runner.run(&save).unwrap();

        assert_eq!(store.stats().applies, applies);
        let model = store
            .get(collections::SETTINGS, keys::MODEL_SETTINGS)
            .unwrap()
            .unwrap();
        assert_eq!(model.revision, model_rev);
        assert_eq!(model.doc, set(&[("C", 9)]));
    }

    #[test]
    fn model_change_leaves_controller_revision() {
        let store = Arc::new(MemoryStore::new());
        let runner = TxnRunner::with_defaults(Arc::clone(&store));
        runner
            .run(&SaveModelConfigOperation::new(ab(), set(&[("A", 1), ("C", 9)])))
            .unwrap();
        let controller_rev = |store: &MemoryStore| {
            store
                .get(collections::CONTROLLERS, keys::CONTROLLER_SETTINGS)
                .unwrap()
                .unwrap()
                .revision
        };
        let before = controller_rev(&store);

        runner
            .run(&SaveModelConfigOperation::new(ab(), set(&[("A", 1), ("C", 10)])))
            .unwrap();

        assert_eq!(controller_rev(&store), before);
        assert_eq!(
            read_settings(store.as_ref(), collections::SETTINGS, keys::MODEL_SETTINGS).unwrap(),
            set(&[("C", 10)])
        );
    }

    #[test]
    fn missing_settings_are_not_found() {
        let store = MemoryStore::new();
        assert!(
            read_settings(&store, collections::CONTROLLERS, keys::CONTROLLER_SETTINGS)
                .unwrap_err()
                .is_not_found()
        );
    }
}
