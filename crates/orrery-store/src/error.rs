//! Error types for the storage layer.

use thiserror::Error;

/// A result type using `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur during storage operations.
///
/// A failed assertion is not an error: it is reported as
/// [`ApplyOutcome::Conflict`](crate::ApplyOutcome::Conflict). Everything here
/// is fatal to the batch that produced it.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The requested record was not found.
    #[error("record not found")]
    NotFound,

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A batch entry cannot be applied as written (e.g. incrementing a
    /// non-integer field).
    #[error("invalid write on {collection}/{id}: {reason}")]
    InvalidWrite {
        /// Collection of the offending write.
        collection: String,
        /// Record identifier of the offending write.
        id: String,
        /// What was wrong with it.
        reason: String,
    },
}
