//! Transactional document store for orrery.
//!
//! Records live in named collections and carry a revision counter. The only
//! way to change anything is [`DocumentStore::apply`], which takes a batch of
//! [`ConditionalWrite`]s and either commits every mutation or none of them.
//!
//! # Architecture
//!
//! - [`MemoryStore`]: in-process maps behind a single lock
//! - [`RocksStore`]: one `RocksDB` column family per collection, CBOR values
//!
//! Both share the evaluation rules in [`txn`].
//!
//! # Example
//!
//! ```
//! use orrery_store::{doc, ApplyOutcome, Assert, ConditionalWrite, DocumentStore, MemoryStore};
//!
//! let store = MemoryStore::new();
//! let create = [ConditionalWrite::on("machines", "m#0")
//!     .asserting(Assert::Missing)
//!     .insert(doc([("life", "alive".into())]))];
//!
//! assert_eq!(store.apply(&create).unwrap(), ApplyOutcome::Applied);
//! assert_eq!(store.apply(&create).unwrap(), ApplyOutcome::Conflict);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod rocks;
pub mod schema;
pub mod txn;
pub mod types;

use std::sync::Arc;

pub use error::{Result, StoreError};
pub use memory::{MemoryStore, StoreStats};
pub use rocks::RocksStore;
pub use schema::collections;
pub use types::{
    doc, ApplyOutcome, Assert, ConditionalWrite, Document, FieldUpdate, Mutation, Record,
    StoredRecord,
};

/// The storage trait every backend implements.
///
/// Reads observe committed state only. An `Err` from any method means the
/// store itself is unusable for this request; an assertion failure is not
/// an error and is reported as [`ApplyOutcome::Conflict`].
pub trait DocumentStore: Send + Sync {
    /// Get a present record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get(&self, collection: &str, id: &str) -> Result<Option<Record>>;

    /// List every present record in a collection, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list(&self, collection: &str) -> Result<Vec<Record>>;

    /// Atomically check every assertion in `batch` and, if all hold, apply
    /// every mutation.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot evaluate or persist the batch.
    fn apply(&self, batch: &[ConditionalWrite]) -> Result<ApplyOutcome>;
}

impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    fn get(&self, collection: &str, id: &str) -> Result<Option<Record>> {
        (**self).get(collection, id)
    }

    fn list(&self, collection: &str) -> Result<Vec<Record>> {
        (**self).list(collection)
    }

    fn apply(&self, batch: &[ConditionalWrite]) -> Result<ApplyOutcome> {
        (**self).apply(batch)
    }
}
