//! Common error types for orrery.
//!
//! This module provides shared error types that are used across multiple crates.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout the orrery system.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// A tag string could not be parsed.
    #[error("{0:?} is not a valid tag")]
    InvalidTag(String),

    /// A tag parsed correctly but names a different kind of entity.
    #[error("{tag:?} is not a valid {expected} tag")]
    WrongKind {
        /// The offending tag string.
        tag: String,
        /// The kind that was expected.
        expected: &'static str,
    },

    /// An entity identifier is malformed.
    #[error("{id:?} is not a valid {kind} id")]
    InvalidId {
        /// The kind of entity.
        kind: &'static str,
        /// The offending identifier.
        id: String,
    },

    /// A value could not be parsed into one of the enumerated types.
    #[error("unknown {kind} {value:?}")]
    UnknownValue {
        /// The enumerated type being parsed.
        kind: &'static str,
        /// The offending value.
        value: String,
    },
}
