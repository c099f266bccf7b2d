//! Operations and the retry executor.
//!
//! An [`Operation`] never writes. Each call to [`Operation::build`] reads the
//! records it cares about and proposes a batch of conditional writes whose
//! assertions pin down exactly what it observed. [`TxnRunner`] submits the
//! batch; if a concurrent writer got there first the store reports a
//! conflict and the operation is asked to build again from fresh reads.
//!
//! ```text
//!   attempt = 0
//!   loop:
//!     batch = op.build(store, attempt)?     validation error: stop
//!     batch empty                           nothing to do: stop, Ok
//!     store.apply(batch)?                   storage error: stop
//!       Applied                             stop, Ok
//!       Conflict, attempt < max_retries     attempt += 1
//!       Conflict, attempt >= max_retries    stop, ExcessiveContention
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use orrery_store::{ApplyOutcome, ConditionalWrite, DocumentStore};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StateError};

/// A unit of work that proposes a batch of conditional writes.
///
/// Implementations hold only the request (entity and desired value). Every
/// record an operation asserts on must be read inside `build`; nothing read
/// in an earlier attempt may be reused.
pub trait Operation: Send + Sync {
    /// Build the batch for this attempt.
    ///
    /// Returning an empty batch means there is nothing to do.
    ///
    /// # Errors
    ///
    /// Any error returned here is terminal; the executor does not retry it.
    fn build(&self, store: &dyn DocumentStore, attempt: u32) -> Result<Vec<ConditionalWrite>>;

    /// Called exactly once with the executor's terminal result.
    ///
    /// # Errors
    ///
    /// Returns `result`'s error, possibly translated.
    fn done(&self, result: Result<()>) -> Result<()> {
        result
    }
}

impl<O: Operation + ?Sized> Operation for Box<O> {
    fn build(&self, store: &dyn DocumentStore, attempt: u32) -> Result<Vec<ConditionalWrite>> {
        (**self).build(store, attempt)
    }

    fn done(&self, result: Result<()>) -> Result<()> {
        (**self).done(result)
    }
}

/// Configuration for the retry executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Number of rebuilds permitted after the first attempt conflicts.
    #[serde(default = "RunnerConfig::default_max_retries")]
    pub max_retries: u32,
    /// Milliseconds a run may take before it is abandoned between attempts.
    /// `None` means no limit.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            max_retries: Self::default_max_retries(),
            timeout_ms: None,
        }
    }
}

impl RunnerConfig {
    const fn default_max_retries() -> u32 {
        3
    }

    /// The deadline for a run starting now, if a timeout is set.
    #[must_use]
    pub fn deadline_from_now(&self) -> Option<Instant> {
        self.timeout_ms
            .and_then(|ms| Instant::now().checked_add(Duration::from_millis(ms)))
    }
}

/// Executes operations against a store, rebuilding on conflict.
pub struct TxnRunner<S: DocumentStore> {
    store: Arc<S>,
    config: RunnerConfig,
}

impl<S: DocumentStore> TxnRunner<S> {
    /// Create a new runner.
    #[must_use]
    pub const fn new(store: Arc<S>, config: RunnerConfig) -> Self {
        Self { store, config }
    }

    /// Create a runner with default configuration.
    #[must_use]
    pub fn with_defaults(store: Arc<S>) -> Self {
        Self::new(store, RunnerConfig::default())
    }

    /// Get the underlying store.
    #[must_use]
    pub const fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Get the runner configuration.
    #[must_use]
    pub const fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run `op` until it commits, fails, or runs out of retries.
    ///
    /// With `timeout_ms` configured the run is bounded as by
    /// [`run_until`](Self::run_until).
    ///
    /// # Errors
    ///
    /// Returns the operation's build error, a storage error,
    /// `StateError::ExcessiveContention` or `StateError::Aborted`, as
    /// translated by `op.done`.
    pub fn run(&self, op: &dyn Operation) -> Result<()> {
        op.done(self.attempts(op, self.config.deadline_from_now()))
    }

    /// Like [`run`](Self::run), but give up before starting an attempt once
    /// `deadline` has passed.
    ///
    /// # Errors
    ///
    /// As for `run`, plus `StateError::Aborted` when the deadline passes.
    pub fn run_until(&self, op: &dyn Operation, deadline: Instant) -> Result<()> {
        op.done(self.attempts(op, Some(deadline)))
    }

    fn attempts(&self, op: &dyn Operation, deadline: Option<Instant>) -> Result<()> {
        let store: &dyn DocumentStore = self.store.as_ref();
        let mut attempt = 0;

        loop {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::debug!(attempt, "Deadline passed, aborting");
                return Err(StateError::Aborted);
            }

            let batch = op.build(store, attempt)?;
            if batch.is_empty() {
                tracing::debug!(attempt, "Nothing to do");
                return Ok(());
            }

            tracing::debug!(attempt, writes = batch.len(), "Submitting batch");
            match store.apply(&batch)? {
                ApplyOutcome::Applied => return Ok(()),
                ApplyOutcome::Conflict if attempt >= self.config.max_retries => {
                    tracing::warn!(
                        attempts = attempt + 1,
                        "Giving up after repeated conflicts"
                    );
                    return Err(StateError::ExcessiveContention {
                        attempts: attempt + 1,
                    });
                }
                ApplyOutcome::Conflict => {
                    tracing::debug!(attempt, "Conflict, rebuilding");
                    attempt += 1;
                }
            }
        }
    }
}
