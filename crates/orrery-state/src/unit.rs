//! Unit operations.

use orrery_core::{Life, UnitTag};
use orrery_store::{collections, doc, Assert, ConditionalWrite, DocumentStore, FieldUpdate};

use crate::entity::{read_application, read_unit};
use crate::error::{Result, StateError};
use crate::keys;
use crate::txn::Operation;

/// Read the persisted uniter state of a unit, if any.
///
/// # Errors
///
/// Returns an error if the store fails.
pub fn read_uniter_state(store: &dyn DocumentStore, tag: &UnitTag) -> Result<Option<String>> {
    Ok(store
        .get(collections::UNIT_STATES, &keys::unit(tag.id()))?
        .and_then(|r| r.get_str("uniter-state").map(str::to_string)))
}

/// Add an alive unit to an alive application.
#[derive(Debug, Clone)]
pub struct AddUnitOperation {
    tag: UnitTag,
}

impl AddUnitOperation {
    /// Add unit `tag`.
    #[must_use]
    pub const fn new(tag: UnitTag) -> Self {
        Self { tag }
    }
}

impl Operation for AddUnitOperation {
    fn build(&self, store: &dyn DocumentStore, _attempt: u32) -> Result<Vec<ConditionalWrite>> {
        let app_tag = self.tag.application();
        let (app, app_record) = read_application(store, &app_tag)?;
        if app.life != Life::Alive {
            return Err(StateError::Validation(format!(
                "cannot add unit {}: application {} not alive",
                self.tag.id(),
                app_tag.id()
            )));
        }

        let id = keys::unit(self.tag.id());
        if store.get(collections::UNITS, &id)?.is_some() {
            return Err(StateError::Validation(format!(
                "unit {} already exists",
                self.tag.id()
            )));
        }

        Ok(vec![
            ConditionalWrite::on(collections::APPLICATIONS, app_record.id)
                .asserting(Assert::field("life", Life::Alive.as_str())),
            ConditionalWrite::on(collections::UNITS, id)
                .asserting(Assert::Missing)
                .insert(doc([
                    ("life", Life::Alive.as_str().into()),
                    ("application", app_tag.id().into()),
                ])),
        ])
    }
}

/// Persist the uniter state of an alive unit.
#[derive(Debug, Clone)]
pub struct SetUnitStateOperation {
    tag: UnitTag,
    uniter_state: String,
}

impl SetUnitStateOperation {
    /// Store `uniter_state` for unit `tag`.
    #[must_use]
    pub fn new(tag: UnitTag, uniter_state: impl Into<String>) -> Self {
        Self {
            tag,
            uniter_state: uniter_state.into(),
        }
    }
}

impl Operation for SetUnitStateOperation {
    fn build(&self, store: &dyn DocumentStore, _attempt: u32) -> Result<Vec<ConditionalWrite>> {
        let (unit, unit_record) = read_unit(store, &self.tag)?;
        if unit.life != Life::Alive {
            return Err(StateError::Validation(format!(
                "unit {} not alive",
                self.tag.id()
            )));
        }

        let alive = ConditionalWrite::on(collections::UNITS, unit_record.id)
            .asserting(Assert::field("life", Life::Alive.as_str()));

        let id = keys::unit(self.tag.id());
        let state = match store.get(collections::UNIT_STATES, &id)? {
            Some(existing)
                if existing.get_str("uniter-state") == Some(self.uniter_state.as_str()) =>
            {
                return Ok(Vec::new());
            }
            Some(existing) => ConditionalWrite::on(collections::UNIT_STATES, id)
                .asserting(Assert::Revision(existing.revision))
                .update(vec![FieldUpdate::set(
                    "uniter-state",
                    self.uniter_state.clone(),
                )]),
            None => ConditionalWrite::on(collections::UNIT_STATES, id)
                .asserting(Assert::Missing)
                .insert(doc([("uniter-state", self.uniter_state.clone().into())])),
        };

        Ok(vec![alive, state])
    }
}
