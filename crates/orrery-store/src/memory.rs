//! In-memory storage implementation.
//!
//! `MemoryStore` keeps every collection in a single `RwLock`ed map. `apply`
//! holds the write lock across evaluation and commit, which gives the same
//! all-or-nothing guarantee as the persistent store. It is the default
//! backend for tests and for embedding the state layer without a data
//! directory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::Result;
#[cfg(any(test, feature = "test-utils"))]
use crate::error::StoreError;
use crate::txn::{self, Evaluation};
use crate::types::{ApplyOutcome, ConditionalWrite, Record, StoredRecord};
use crate::DocumentStore;

type Collection = HashMap<String, StoredRecord>;

/// Counters describing how a store has been used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of `get` calls.
    pub reads: u64,
    /// Number of `apply` calls.
    pub applies: u64,
    /// Number of `apply` calls that committed.
    pub applied: u64,
    /// Number of `apply` calls that reported a conflict.
    pub conflicts: u64,
}

/// In-memory document store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
    reads: AtomicU64,
    applies: AtomicU64,
    applied: AtomicU64,
    conflicts: AtomicU64,
    #[cfg(any(test, feature = "test-utils"))]
    fail_next_apply: parking_lot::Mutex<Option<StoreError>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the usage counters.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            reads: self.reads.load(Ordering::SeqCst),
            applies: self.applies.load(Ordering::SeqCst),
            applied: self.applied.load(Ordering::SeqCst),
            conflicts: self.conflicts.load(Ordering::SeqCst),
        }
    }

    /// Make the next `apply` fail with `err` without touching any record.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn fail_next_apply(&self, err: StoreError) {
        *self.fail_next_apply.lock() = Some(err);
    }
}

impl DocumentStore for MemoryStore {
    fn get(&self, collection: &str, id: &str) -> Result<Option<Record>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .and_then(|c| c.get(id))
            .cloned()
            .and_then(|slot| slot.into_record(collection, id)))
    }

    fn list(&self, collection: &str) -> Result<Vec<Record>> {
        let collections = self.collections.read();
        let mut records: Vec<Record> = collections
            .get(collection)
            .map(|c| {
                c.iter()
                    .filter_map(|(id, slot)| slot.clone().into_record(collection, id))
                    .collect()
            })
            .unwrap_or_default();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    fn apply(&self, batch: &[ConditionalWrite]) -> Result<ApplyOutcome> {
        self.applies.fetch_add(1, Ordering::SeqCst);

        #[cfg(any(test, feature = "test-utils"))]
        if let Some(err) = self.fail_next_apply.lock().take() {
            return Err(err);
        }

        let mut collections = self.collections.write();
        let evaluation = txn::evaluate(batch, |collection, id| {
            Ok(collections
                .get(collection)
                .and_then(|c| c.get(id))
                .cloned())
        })?;

        match evaluation {
            Evaluation::Conflict => {
                self.conflicts.fetch_add(1, Ordering::SeqCst);
                Ok(ApplyOutcome::Conflict)
            }
            Evaluation::Commit(writes) => {
                for write in writes {
                    collections
                        .entry(write.collection)
                        .or_default()
                        .insert(write.id, write.record);
                }
                self.applied.fetch_add(1, Ordering::SeqCst);
                Ok(ApplyOutcome::Applied)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{doc, Assert, FieldUpdate};

    fn insert_machine(store: &MemoryStore, id: &str) {
        let outcome = store
            .apply(&[ConditionalWrite::on("machines", id)
                .asserting(Assert::Missing)
                .insert(doc([("life", "alive".into())]))])
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied);
    }

    #[test]
    fn insert_and_get() {
        let store = MemoryStore::new();
        insert_machine(&store, "m#0");

        let record = store.get("machines", "m#0").unwrap().unwrap();
        assert_eq!(record.revision, 1);
        assert_eq!(record.get_str("life"), Some("alive"));
        assert!(store.get("machines", "m#1").unwrap().is_none());
    }

    #[test]
    fn conflict_leaves_state_untouched() {
        let store = MemoryStore::new();
        insert_machine(&store, "m#0");

        let outcome = store
            .apply(&[
                ConditionalWrite::on("machines", "m#0")
                    .asserting(Assert::Revision(1))
                    .update(vec![FieldUpdate::set("life", "dying")]),
                ConditionalWrite::on("machines", "m#1").asserting(Assert::Exists),
            ])
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Conflict);

        let record = store.get("machines", "m#0").unwrap().unwrap();
        assert_eq!(record.revision, 1);
        assert_eq!(record.get_str("life"), Some("alive"));
        assert_eq!(store.stats().conflicts, 1);
    }

    #[test]
    fn removed_records_are_hidden_and_keep_revision() {
        let store = MemoryStore::new();
        insert_machine(&store, "m#0");
        store
            .apply(&[ConditionalWrite::on("machines", "m#0").remove()])
            .unwrap();
        assert!(store.get("machines", "m#0").unwrap().is_none());
        assert!(store.list("machines").unwrap().is_empty());

        insert_machine(&store, "m#0");
        assert_eq!(store.get("machines", "m#0").unwrap().unwrap().revision, 3);
    }

    #[test]
    fn list_is_sorted_by_id() {
        let store = MemoryStore::new();
        insert_machine(&store, "m#2");
        insert_machine(&store, "m#0");
        insert_machine(&store, "m#1");
        let ids: Vec<String> = store
            .list("machines")
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["m#0", "m#1", "m#2"]);
    }

    #[test]
    fn injected_failure_is_fatal_and_one_shot() {
        let store = MemoryStore::new();
        store.fail_next_apply(StoreError::Database("connection reset".into()));
        let batch = [ConditionalWrite::on("machines", "m#0").insert(crate::Document::new())];
        assert!(matches!(
            store.apply(&batch),
            Err(StoreError::Database(_))
        ));
        assert_eq!(store.apply(&batch).unwrap(), ApplyOutcome::Applied);
    }
}
