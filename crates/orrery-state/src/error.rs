//! Error types for the state layer.
//!
//! Only a storage conflict is ever retried, and the retry loop never lets
//! one escape: once the retry budget is spent it becomes
//! [`StateError::ExcessiveContention`].

use orrery_core::CoreError;
use orrery_store::StoreError;
use thiserror::Error;

/// A result type using `StateError`.
pub type Result<T> = std::result::Result<T, StateError>;

/// Errors that can occur in state operations.
#[derive(Debug, Clone, Error)]
pub enum StateError {
    /// The operation's preconditions do not hold.
    #[error("{0}")]
    Validation(String),

    /// The requested entity was not found.
    #[error("{kind} {id:?} not found")]
    NotFound {
        /// The kind of entity.
        kind: &'static str,
        /// The entity identifier.
        id: String,
    },

    /// Every attempt conflicted with a concurrent writer.
    #[error("state changing too quickly; giving up after {attempts} attempts")]
    ExcessiveContention {
        /// Number of batches submitted.
        attempts: u32,
    },

    /// The caller is no longer the leader for the entity.
    #[error("leadership of {entity} lost: {reason}")]
    LeadershipLost {
        /// The entity whose leadership was required.
        entity: String,
        /// Why the lease is no longer valid.
        reason: String,
    },

    /// The caller abandoned the operation between attempts.
    #[error("operation aborted")]
    Aborted,

    /// A stored record does not have the expected shape.
    #[error("corrupt record {collection}/{id}: {reason}")]
    Corrupt {
        /// Collection holding the record.
        collection: String,
        /// Record identifier.
        id: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Tag or enumerated value error.
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl StateError {
    /// Create a `NotFound` error.
    #[must_use]
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Returns true if a caller could reasonably submit the same request
    /// again later.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self, Self::ExcessiveContention { .. })
    }

    /// Returns true if this is a `NotFound` error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_contention_is_retriable() {
        assert!(StateError::ExcessiveContention { attempts: 4 }.is_retriable());
        assert!(!StateError::Validation("nope".into()).is_retriable());
        assert!(!StateError::LeadershipLost {
            entity: "gitlab".into(),
            reason: "expired".into()
        }
        .is_retriable());
        assert!(!StateError::Store(StoreError::Database("down".into())).is_retriable());
    }

    #[test]
    fn messages() {
        assert_eq!(
            StateError::not_found("machine", "0").to_string(),
            "machine \"0\" not found"
        );
        assert_eq!(
            StateError::Validation("application gitlab not alive".into()).to_string(),
            "application gitlab not alive"
        );
    }
}
