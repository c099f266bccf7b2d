//! Batch evaluation shared by every store implementation.
//!
//! [`evaluate`] turns a batch plus a view of the current state into either a
//! conflict or the final slot state of every record the batch mutates.
//! Implementations call it while holding whatever lock makes the view and the
//! subsequent write atomic.
//!
//! Semantics:
//!
//! 1. Every assertion is checked against the pre-batch state.
//! 2. Mutations are then applied in batch order against a working copy, so a
//!    later write observes earlier writes to the same record.
//! 3. `Insert` on a present record and `Update`/`Remove` on an absent one are
//!    conflicts.
//! 4. Each mutating write advances the record revision by one.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::types::{ConditionalWrite, Document, FieldUpdate, Mutation, StoredRecord};

/// Key of a record slot: `(collection, id)`.
pub type SlotKey = (String, String);

/// A record slot whose state changes when the batch is committed.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedWrite {
    /// Target collection.
    pub collection: String,
    /// Target record identifier.
    pub id: String,
    /// New slot state (a tombstone if the record was removed).
    pub record: StoredRecord,
}

/// Result of evaluating a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// An assertion or implicit existence check failed.
    Conflict,
    /// All checks passed; commit these writes atomically.
    Commit(Vec<StagedWrite>),
}

/// Evaluate `batch` against the state visible through `lookup`.
///
/// `lookup` is called at most once per distinct record in the batch.
///
/// # Errors
///
/// Returns an error if `lookup` fails or a write is malformed.
pub fn evaluate<F>(batch: &[ConditionalWrite], mut lookup: F) -> Result<Evaluation>
where
    F: FnMut(&str, &str) -> Result<Option<StoredRecord>>,
{
    let mut snapshot: HashMap<SlotKey, Option<StoredRecord>> = HashMap::new();
    for write in batch {
        let key = (write.collection.clone(), write.id.clone());
        if !snapshot.contains_key(&key) {
            let current = lookup(&write.collection, &write.id)?;
            snapshot.insert(key.clone(), current);
        }
        let current = snapshot.get(&key).and_then(Option::as_ref);
        if !write.assert.holds(current) {
            tracing::trace!(
                collection = %write.collection,
                id = %write.id,
                assert = ?write.assert,
                "Assertion failed"
            );
            return Ok(Evaluation::Conflict);
        }
    }

    let mut working = snapshot;
    let mut order: Vec<SlotKey> = Vec::new();

    for write in batch {
        let key = (write.collection.clone(), write.id.clone());
        let slot = working.get(&key).cloned().flatten();
        let previous_revision = slot.as_ref().map_or(0, |r| r.revision);
        let present_doc = slot.and_then(|r| r.doc);

        let next_doc = match (&write.mutation, present_doc) {
            (Mutation::Insert(doc), None) => Some(doc.clone()),
            (Mutation::Update(updates), Some(mut doc)) => {
                apply_updates(write, &mut doc, updates)?;
                Some(doc)
            }
            (Mutation::Remove, Some(_)) => None,
            (Mutation::None, _) => continue,
            _ => return Ok(Evaluation::Conflict),
        };

        working.insert(
            key.clone(),
            Some(StoredRecord {
                revision: previous_revision + 1,
                doc: next_doc,
            }),
        );
        if !order.contains(&key) {
            order.push(key);
        }
    }

    let staged = order
        .into_iter()
        .filter_map(|key| {
            let record = working.remove(&key).flatten()?;
            Some(StagedWrite {
                collection: key.0,
                id: key.1,
                record,
            })
        })
        .collect();

    Ok(Evaluation::Commit(staged))
}

fn apply_updates(
    write: &ConditionalWrite,
    doc: &mut Document,
    updates: &[FieldUpdate],
) -> Result<()> {
    for update in updates {
        match update {
            FieldUpdate::Set(name, value) => {
                doc.insert(name.clone(), value.clone());
            }
            FieldUpdate::Unset(name) => {
                doc.remove(name);
            }
            FieldUpdate::Inc(name, by) => {
                let current = match doc.get(name) {
                    None => 0,
                    Some(value) => value.as_i64().ok_or_else(|| StoreError::InvalidWrite {
                        collection: write.collection.clone(),
                        id: write.id.clone(),
                        reason: format!("cannot increment non-integer field {name:?}"),
                    })?,
                };
                let next = current.checked_add(*by).ok_or_else(|| StoreError::InvalidWrite {
                    collection: write.collection.clone(),
                    id: write.id.clone(),
                    reason: format!("increment of {name:?} overflows"),
                })?;
                doc.insert(name.clone(), Value::from(next));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{doc, Assert};

    fn state(entries: &[(&str, &str, StoredRecord)]) -> HashMap<SlotKey, StoredRecord> {
        entries
            .iter()
            .map(|(c, id, r)| ((c.to_string(), id.to_string()), r.clone()))
            .collect()
    }

    fn run(
        batch: &[ConditionalWrite],
        current: &HashMap<SlotKey, StoredRecord>,
    ) -> Result<Evaluation> {
        evaluate(batch, |c, id| {
            Ok(current.get(&(c.to_string(), id.to_string())).cloned())
        })
    }

    fn live(revision: u64, d: Document) -> StoredRecord {
        StoredRecord {
            revision,
            doc: Some(d),
        }
    }

    #[test]
    fn insert_into_empty_slot_starts_at_one() {
        let batch = vec![ConditionalWrite::on("podspecs", "a#app")
            .asserting(Assert::Missing)
            .insert(doc([("spec", "x".into())]))];
        let Evaluation::Commit(writes) = run(&batch, &HashMap::new()).unwrap() else {
            panic!("expected commit");
        };
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].record.revision, 1);
    }

    #[test]
    fn insert_after_remove_continues_revision() {
        let current = state(&[(
            "podspecs",
            "a#app",
            StoredRecord {
                revision: 5,
                doc: None,
            },
        )]);
        let batch = vec![ConditionalWrite::on("podspecs", "a#app")
            .asserting(Assert::Missing)
            .insert(Document::new())];
        let Evaluation::Commit(writes) = run(&batch, &current).unwrap() else {
            panic!("expected commit");
        };
        assert_eq!(writes[0].record.revision, 6);
    }

    #[test]
    fn failed_assertion_conflicts() {
        let current = state(&[("machines", "m#0", live(2, Document::new()))]);
        let batch = vec![ConditionalWrite::on("machines", "m#0")
            .asserting(Assert::Revision(1))
            .update(vec![FieldUpdate::set("life", "dying")])];
        assert_eq!(run(&batch, &current).unwrap(), Evaluation::Conflict);
    }

    #[test]
    fn conflict_on_any_entry_rejects_whole_batch() {
        let current = state(&[("machines", "m#0", live(1, Document::new()))]);
        let batch = vec![
            ConditionalWrite::on("machines", "m#0")
                .asserting(Assert::Revision(1))
                .update(vec![FieldUpdate::set("life", "dying")]),
            ConditionalWrite::on("units", "u#app/0").asserting(Assert::Exists),
        ];
        assert_eq!(run(&batch, &current).unwrap(), Evaluation::Conflict);
    }

    #[test]
    fn implicit_existence_checks() {
        let current = state(&[("machines", "m#0", live(1, Document::new()))]);
        let insert_existing =
            vec![ConditionalWrite::on("machines", "m#0").insert(Document::new())];
        assert_eq!(run(&insert_existing, &current).unwrap(), Evaluation::Conflict);

        let update_missing = vec![ConditionalWrite::on("machines", "m#1")
            .update(vec![FieldUpdate::set("life", "dead")])];
        assert_eq!(run(&update_missing, &current).unwrap(), Evaluation::Conflict);

        let remove_missing = vec![ConditionalWrite::on("machines", "m#1").remove()];
        assert_eq!(run(&remove_missing, &current).unwrap(), Evaluation::Conflict);
    }

    #[test]
    fn assert_only_write_does_not_stage() {
        let current = state(&[(
            "applications",
            "a#app",
            live(3, doc([("life", "alive".into())])),
        )]);
        let batch = vec![
            ConditionalWrite::on("applications", "a#app").asserting(Assert::field("life", "alive")),
            ConditionalWrite::on("podspecs", "a#app")
                .asserting(Assert::Missing)
                .insert(Document::new()),
        ];
        let Evaluation::Commit(writes) = run(&batch, &current).unwrap() else {
            panic!("expected commit");
        };
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].collection, "podspecs");
    }

    #[test]
    fn updates_apply_in_order_within_batch() {
        let current = state(&[(
            "podspecs",
            "a#app",
            live(1, doc([("upgrade-counter", 0.into())])),
        )]);
        let bump = ConditionalWrite::on("podspecs", "a#app")
            .update(vec![FieldUpdate::inc("upgrade-counter", 1)]);
        let batch = vec![bump.clone(), bump];
        let Evaluation::Commit(writes) = run(&batch, &current).unwrap() else {
            panic!("expected commit");
        };
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].record.revision, 3);
        let d = writes[0].record.doc.as_ref().unwrap();
        assert_eq!(d.get("upgrade-counter"), Some(&Value::from(2)));
    }

    #[test]
    fn set_unset_and_remove() {
        let current = state(&[(
            "statuses",
            "m#0#modification",
            live(1, doc([("status", "error".into()), ("message", "boom".into())])),
        )]);
        let batch = vec![ConditionalWrite::on("statuses", "m#0#modification").update(vec![
            FieldUpdate::set("status", "idle"),
            FieldUpdate::unset("message"),
        ])];
        let Evaluation::Commit(writes) = run(&batch, &current).unwrap() else {
            panic!("expected commit");
        };
        let d = writes[0].record.doc.as_ref().unwrap();
        assert_eq!(d.get("status"), Some(&Value::from("idle")));
        assert!(d.get("message").is_none());

        let batch = vec![ConditionalWrite::on("statuses", "m#0#modification").remove()];
        let Evaluation::Commit(writes) = run(&batch, &current).unwrap() else {
            panic!("expected commit");
        };
        assert_eq!(writes[0].record.revision, 2);
        assert!(writes[0].record.doc.is_none());
    }

    #[test]
    fn increment_non_integer_is_invalid() {
        let current = state(&[(
            "podspecs",
            "a#app",
            live(1, doc([("upgrade-counter", "three".into())])),
        )]);
        let batch = vec![ConditionalWrite::on("podspecs", "a#app")
            .update(vec![FieldUpdate::inc("upgrade-counter", 1)])];
        assert!(matches!(
            run(&batch, &current),
            Err(StoreError::InvalidWrite { .. })
        ));
    }

    #[test]
    fn lookup_called_once_per_record() {
        let mut calls = 0;
        let batch = vec![
            ConditionalWrite::on("c", "x").asserting(Assert::Missing),
            ConditionalWrite::on("c", "x").insert(Document::new()),
        ];
        let result = evaluate(&batch, |_, _| {
            calls += 1;
            Ok(None)
        })
        .unwrap();
        assert!(matches!(result, Evaluation::Commit(_)));
        assert_eq!(calls, 1);
    }
}
