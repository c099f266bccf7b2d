//! Wire types for facade calls.
//!
//! Bulk calls take a list of items and return one [`ErrorResult`] per item,
//! in order. An item that succeeds leaves its `error` empty.

use serde::{Deserialize, Serialize};

use crate::error::ServerError;

/// A single entity, named by its tag string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Tag of the entity (e.g. `machine-0-kvm-1`).
    pub tag: String,
}

/// The outcome of one item in a call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResult {
    /// The error, if the item failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ServerError>,
}

impl ErrorResult {
    /// A result carrying `error`.
    #[must_use]
    pub fn failed(error: impl Into<ServerError>) -> Self {
        Self {
            error: Some(error.into()),
        }
    }

    /// Collapse a per-item outcome into a result slot.
    #[must_use]
    pub fn from_outcome<E: Into<ServerError>>(outcome: Result<(), E>) -> Self {
        match outcome {
            Ok(()) => Self::default(),
            Err(err) => Self::failed(err),
        }
    }
}

/// One result per item of a bulk call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResults {
    /// Results, in request order.
    pub results: Vec<ErrorResult>,
}

impl ErrorResults {
    /// `n` empty result slots.
    #[must_use]
    pub fn with_len(n: usize) -> Self {
        Self {
            results: vec![ErrorResult::default(); n],
        }
    }
}

/// Uniter state for one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetUnitStateArg {
    /// Unit tag (e.g. `unit-gitlab-0`).
    pub tag: String,
    /// Serialized uniter state. Items without one are skipped.
    #[serde(rename = "uniter-state", default, skip_serializing_if = "Option::is_none")]
    pub uniter_state: Option<String>,
}

/// Arguments to `WriteUniterState`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetUnitStateArgs {
    /// Units to update.
    pub args: Vec<SetUnitStateArg>,
}

/// A pod spec for one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodSpecArg {
    /// Application tag (e.g. `application-gitlab`).
    pub tag: String,
    /// The pod spec. Absent to only bump the upgrade counter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<String>,
}

/// Arguments to `SetPodSpec`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetPodSpecArgs {
    /// Applications to update.
    pub specs: Vec<PodSpecArg>,
}
