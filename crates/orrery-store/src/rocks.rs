//! `RocksDB` storage implementation.
//!
//! Each collection is a column family keyed by record id. Values are
//! CBOR-encoded [`StoredRecord`]s, tombstones included, so revisions keep
//! increasing across remove/insert cycles.
//!
//! `RocksDB` has no native assert-then-write, so `apply` serializes commits
//! through a process-wide lock: evaluation reads the current values, and the
//! resulting `WriteBatch` is written before the lock is released. Reads do
//! not take the lock.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};

use crate::error::{Result, StoreError};
use crate::schema::all_collections;
use crate::txn::{self, Evaluation};
use crate::types::{ApplyOutcome, ConditionalWrite, Record, StoredRecord};
use crate::DocumentStore;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    commit: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_collections()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            commit: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Read the raw slot for a record, tombstones included.
    fn slot(&self, collection: &str, id: &str) -> Result<Option<StoredRecord>> {
        let cf = self.cf(collection)?;
        self.db
            .get_cf(&cf, id.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}

impl DocumentStore for RocksStore {
    fn get(&self, collection: &str, id: &str) -> Result<Option<Record>> {
        Ok(self
            .slot(collection, id)?
            .and_then(|slot| slot.into_record(collection, id)))
    }

    fn list(&self, collection: &str) -> Result<Vec<Record>> {
        let cf = self.cf(collection)?;

        let mut records = Vec::new();
        let iter = self.db.iterator_cf(&cf, IteratorMode::Start);

        for item in iter {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            let id = String::from_utf8(key.to_vec())
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            let slot: StoredRecord = Self::deserialize(&value)?;
            if let Some(record) = slot.into_record(collection, &id) {
                records.push(record);
            }
        }

        Ok(records)
    }

    fn apply(&self, batch: &[ConditionalWrite]) -> Result<ApplyOutcome> {
        let _guard = self.commit.lock();

        let writes = match txn::evaluate(batch, |collection, id| self.slot(collection, id))? {
            Evaluation::Conflict => return Ok(ApplyOutcome::Conflict),
            Evaluation::Commit(writes) => writes,
        };

        let mut wb = WriteBatch::default();
        for write in &writes {
            let cf = self.cf(&write.collection)?;
            let value = Self::serialize(&write.record)?;
            wb.put_cf(&cf, write.id.as_bytes(), &value);
        }

        self.db
            .write(wb)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::trace!(writes = writes.len(), "Committed batch");

        Ok(ApplyOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::collections;
    use crate::types::{doc, Assert, FieldUpdate};
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn record_crud() {
        let (store, _dir) = create_test_store();

        // Create
        let outcome = store
            .apply(&[ConditionalWrite::on(collections::POD_SPECS, "a#gitlab")
                .asserting(Assert::Missing)
                .insert(doc([("spec", "v1".into()), ("upgrade-counter", 0.into())]))])
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied);

        // Read
        let record = store.get(collections::POD_SPECS, "a#gitlab").unwrap().unwrap();
        assert_eq!(record.revision, 1);
        assert_eq!(record.get_str("spec"), Some("v1"));

        // Update
        let outcome = store
            .apply(&[ConditionalWrite::on(collections::POD_SPECS, "a#gitlab")
                .asserting(Assert::Revision(1))
                .update(vec![
                    FieldUpdate::set("spec", "v2"),
                    FieldUpdate::inc("upgrade-counter", 1),
                ])])
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Applied);
        let record = store.get(collections::POD_SPECS, "a#gitlab").unwrap().unwrap();
        assert_eq!(record.revision, 2);
        assert_eq!(record.get_i64("upgrade-counter"), Some(1));

        // Delete
        store
            .apply(&[ConditionalWrite::on(collections::POD_SPECS, "a#gitlab").remove()])
            .unwrap();
        assert!(store.get(collections::POD_SPECS, "a#gitlab").unwrap().is_none());
    }

    #[test]
    fn stale_revision_conflicts() {
        let (store, _dir) = create_test_store();
        store
            .apply(&[ConditionalWrite::on(collections::MACHINES, "m#0")
                .insert(doc([("life", "alive".into())]))])
            .unwrap();

        let stale = [ConditionalWrite::on(collections::MACHINES, "m#0")
            .asserting(Assert::Revision(1))
            .update(vec![FieldUpdate::set("life", "dying")])];
        assert_eq!(store.apply(&stale).unwrap(), ApplyOutcome::Applied);
        assert_eq!(store.apply(&stale).unwrap(), ApplyOutcome::Conflict);
    }

    #[test]
    fn multi_collection_batch_is_atomic() {
        let (store, _dir) = create_test_store();
        let outcome = store
            .apply(&[
                ConditionalWrite::on(collections::UNITS, "u#app/0")
                    .insert(doc([("life", "alive".into())])),
                ConditionalWrite::on(collections::UNIT_STATES, "u#app/0")
                    .asserting(Assert::Exists)
                    .update(vec![FieldUpdate::set("uniter-state", "x")]),
            ])
            .unwrap();
        assert_eq!(outcome, ApplyOutcome::Conflict);
        assert!(store.get(collections::UNITS, "u#app/0").unwrap().is_none());
    }

    #[test]
    fn list_skips_tombstones() {
        let (store, _dir) = create_test_store();
        for id in ["m#0", "m#1"] {
            store
                .apply(&[ConditionalWrite::on(collections::MACHINES, id)
                    .insert(doc([("life", "alive".into())]))])
                .unwrap();
        }
        store
            .apply(&[ConditionalWrite::on(collections::MACHINES, "m#0").remove()])
            .unwrap();

        let records = store.list(collections::MACHINES).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "m#1");
    }

    #[test]
    fn unknown_collection_is_fatal() {
        let (store, _dir) = create_test_store();
        let result = store.apply(&[ConditionalWrite::on("nope", "x").asserting(Assert::Missing)]);
        assert!(matches!(result, Err(StoreError::Database(_))));
    }

    #[test]
    fn reopen_preserves_revisions() {
        let dir = TempDir::new().unwrap();
        {
            let store = RocksStore::open(dir.path()).unwrap();
            store
                .apply(&[ConditionalWrite::on(collections::LEASES, "application-leadership#app")
                    .insert(doc([("holder", "app/0".into())]))])
                .unwrap();
        }
        let store = RocksStore::open(dir.path()).unwrap();
        let record = store
            .get(collections::LEASES, "application-leadership#app")
            .unwrap()
            .unwrap();
        assert_eq!(record.revision, 1);
        assert_eq!(record.get_str("holder"), Some("app/0"));
    }
}
