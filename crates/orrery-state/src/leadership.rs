//! Leadership leases and the gate that ties writes to them.
//!
//! A [`Token`] is the caller's claim to be leader of some entity. Wrapping an
//! operation in a [`LeadershipGate`] makes every attempt check the token
//! first and append the token's own assertions to the batch, so a lease that
//! changes hands between the check and the commit turns into a conflict. On
//! the rebuild the check runs again and reports the loss.
//!
//! Leases live in the `leases` collection under
//! `application-leadership#<application>` with two fields: `holder` (a unit
//! name) and `expiry` (RFC3339).

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use orrery_store::{collections, doc, Assert, ConditionalWrite, DocumentStore, FieldUpdate, Record};

use crate::error::{Result, StateError};
use crate::keys;
use crate::txn::Operation;

/// Proof of leadership that can be revalidated on every attempt.
pub trait Token: Send + Sync {
    /// Check that leadership is still held.
    ///
    /// Returns the writes to append to the batch so the store rejects it if
    /// leadership changes before commit. A token with nothing to assert
    /// returns an empty list.
    ///
    /// # Errors
    ///
    /// Returns `StateError::LeadershipLost` if leadership is not held.
    fn check(&self, store: &dyn DocumentStore, attempt: u32) -> Result<Vec<ConditionalWrite>>;
}

/// External view of lease validity.
pub trait LeaseChecker: Send + Sync {
    /// Returns true if the caller currently holds the lease for `entity`.
    fn is_valid(&self, entity: &str) -> bool;
}

/// Hands out leadership tokens.
pub trait LeadershipChecker: Send + Sync {
    /// Return a token asserting that `unit` leads `application`.
    fn leadership_check(&self, application: &str, unit: &str) -> Arc<dyn Token>;
}

/// Wraps an operation so that its writes only land while a token is valid.
pub struct LeadershipGate<O> {
    inner: O,
    token: Arc<dyn Token>,
}

impl<O: Operation> LeadershipGate<O> {
    /// Gate `inner` on `token`.
    pub fn new(inner: O, token: Arc<dyn Token>) -> Self {
        Self { inner, token }
    }

    /// Gate `op` on `token` if one is given; otherwise return `op` as is.
    pub fn wrap(op: O, token: Option<Arc<dyn Token>>) -> Box<dyn Operation>
    where
        O: 'static,
    {
        match token {
            Some(token) => Box::new(Self::new(op, token)),
            None => Box::new(op),
        }
    }
}

impl<O: Operation> Operation for LeadershipGate<O> {
    fn build(&self, store: &dyn DocumentStore, attempt: u32) -> Result<Vec<ConditionalWrite>> {
        let checks = self.token.check(store, attempt)?;
        let mut batch = self.inner.build(store, attempt)?;
        if !batch.is_empty() {
            batch.extend(checks);
        }
        Ok(batch)
    }

    fn done(&self, result: Result<()>) -> Result<()> {
        self.inner.done(result)
    }
}

/// A decoded lease record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    /// Unit holding the lease.
    pub holder: String,
    /// When the lease lapses.
    pub expiry: DateTime<Utc>,
    /// Revision of the lease record.
    pub revision: u64,
}

impl Lease {
    fn from_record(record: &Record) -> Result<Self> {
        let corrupt = |reason: String| StateError::Corrupt {
            collection: record.collection.clone(),
            id: record.id.clone(),
            reason,
        };
        let holder = record
            .get_str("holder")
            .ok_or_else(|| corrupt("missing holder".into()))?
            .to_string();
        let expiry = record
            .get_str("expiry")
            .ok_or_else(|| corrupt("missing expiry".into()))
            .and_then(|s| {
                DateTime::parse_from_rfc3339(s).map_err(|e| corrupt(format!("bad expiry: {e}")))
            })?
            .with_timezone(&Utc);
        Ok(Self {
            holder,
            expiry,
            revision: record.revision,
        })
    }

    /// Returns true if the lease is still in force at `now`.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expiry > now
    }
}

/// Read the leadership lease for an application, if any.
///
/// # Errors
///
/// Returns an error if the store fails or the record is malformed.
pub fn read_lease(store: &dyn DocumentStore, application: &str) -> Result<Option<Lease>> {
    store
        .get(collections::LEASES, &keys::application_leadership(application))?
        .map(|r| Lease::from_record(&r))
        .transpose()
}

/// Token backed by a lease record in the store.
///
/// The check asserts the lease record's revision, so a claim or revoke that
/// lands between the check and the commit makes the gated batch conflict.
/// Expiry is only enforced at check time: a lease that lapses after the
/// check, with nobody claiming it, does not stop the commit.
#[derive(Debug, Clone)]
pub struct LeaseToken {
    application: String,
    holder: String,
}

impl LeaseToken {
    /// Token for `holder` leading `application`.
    #[must_use]
    pub fn new(application: impl Into<String>, holder: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            holder: holder.into(),
        }
    }

    fn lost(&self, reason: impl Into<String>) -> StateError {
        StateError::LeadershipLost {
            entity: self.application.clone(),
            reason: reason.into(),
        }
    }
}

impl Token for LeaseToken {
    fn check(&self, store: &dyn DocumentStore, attempt: u32) -> Result<Vec<ConditionalWrite>> {
        let Some(lease) = read_lease(store, &self.application)? else {
            return Err(self.lost(format!("{} is not the leader", self.holder)));
        };
        if lease.holder != self.holder {
            return Err(self.lost(format!(
                "{} is not the leader; {} is",
                self.holder, lease.holder
            )));
        }
        if !lease.is_live(Utc::now()) {
            return Err(self.lost(format!("lease held by {} has expired", self.holder)));
        }
        tracing::trace!(
            application = %self.application,
            holder = %self.holder,
            attempt,
            "Leadership confirmed"
        );
        Ok(vec![ConditionalWrite::on(
            collections::LEASES,
            keys::application_leadership(&self.application),
        )
        .asserting(Assert::Revision(lease.revision))])
    }
}

/// Token backed by an external [`LeaseChecker`].
///
/// The check cannot be expressed as a store assertion, so it only guards the
/// moment before each submission.
pub struct CheckerToken {
    checker: Arc<dyn LeaseChecker>,
    entity: String,
}

impl CheckerToken {
    /// Token checking `entity` through `checker`.
    #[must_use]
    pub fn new(checker: Arc<dyn LeaseChecker>, entity: impl Into<String>) -> Self {
        Self {
            checker,
            entity: entity.into(),
        }
    }
}

impl Token for CheckerToken {
    fn check(&self, _store: &dyn DocumentStore, _attempt: u32) -> Result<Vec<ConditionalWrite>> {
        if self.checker.is_valid(&self.entity) {
            Ok(Vec::new())
        } else {
            Err(StateError::LeadershipLost {
                entity: self.entity.clone(),
                reason: "lease is no longer valid".into(),
            })
        }
    }
}

/// Leadership checker that issues [`LeaseToken`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct LeaseLeadershipChecker;

impl LeadershipChecker for LeaseLeadershipChecker {
    fn leadership_check(&self, application: &str, unit: &str) -> Arc<dyn Token> {
        Arc::new(LeaseToken::new(application, unit))
    }
}

/// Claim or extend the leadership lease for an application.
///
/// Succeeds if the lease is absent, expired, or already held by `holder`.
#[derive(Debug, Clone)]
pub struct ClaimLeaseOperation {
    application: String,
    holder: String,
    duration: Duration,
}

impl ClaimLeaseOperation {
    /// Claim `application` for `holder` for `duration`.
    #[must_use]
    pub fn new(
        application: impl Into<String>,
        holder: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            application: application.into(),
            holder: holder.into(),
            duration,
        }
    }
}

impl Operation for ClaimLeaseOperation {
    fn build(&self, store: &dyn DocumentStore, _attempt: u32) -> Result<Vec<ConditionalWrite>> {
        let now = Utc::now();
        let expiry = (now + self.duration).to_rfc3339();
        let write = ConditionalWrite::on(
            collections::LEASES,
            keys::application_leadership(&self.application),
        );

        match read_lease(store, &self.application)? {
            None => Ok(vec![write.asserting(Assert::Missing).insert(doc([
                ("holder", self.holder.clone().into()),
                ("expiry", expiry.into()),
            ]))]),
            Some(lease) if lease.holder == self.holder || !lease.is_live(now) => {
                Ok(vec![write
                    .asserting(Assert::Revision(lease.revision))
                    .update(vec![
                        FieldUpdate::set("holder", self.holder.clone()),
                        FieldUpdate::set("expiry", expiry),
                    ])])
            }
            Some(lease) => Err(StateError::Validation(format!(
                "leadership of {} is held by {}",
                self.application, lease.holder
            ))),
        }
    }

    fn done(&self, result: Result<()>) -> Result<()> {
        if result.is_ok() {
            tracing::debug!(
                application = %self.application,
                holder = %self.holder,
                "Claimed leadership"
            );
        }
        result
    }
}

/// Remove the leadership lease for an application. A missing lease is a
/// no-op.
#[derive(Debug, Clone)]
pub struct RevokeLeaseOperation {
    application: String,
}

impl RevokeLeaseOperation {
    /// Revoke leadership of `application`.
    #[must_use]
    pub fn new(application: impl Into<String>) -> Self {
        Self {
            application: application.into(),
        }
    }
}

impl Operation for RevokeLeaseOperation {
    fn build(&self, store: &dyn DocumentStore, _attempt: u32) -> Result<Vec<ConditionalWrite>> {
        let id = keys::application_leadership(&self.application);
        Ok(match store.get(collections::LEASES, &id)? {
            Some(record) => vec![ConditionalWrite::on(collections::LEASES, id)
                .asserting(Assert::Revision(record.revision))
                .remove()],
            None => Vec::new(),
        })
    }
}
