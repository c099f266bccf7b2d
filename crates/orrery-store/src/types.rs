//! Record and batch types.
//!
//! A batch is an ordered list of [`ConditionalWrite`]s. Each write names one
//! record, an [`Assert`] over that record's current state, and a
//! [`Mutation`] to perform if every assertion in the batch holds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The payload of a record: field name to value.
pub type Document = BTreeMap<String, Value>;

/// A versioned record as observed by a read.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Collection the record belongs to.
    pub collection: String,
    /// Record identifier, unique within the collection.
    pub id: String,
    /// Revision counter. Advances by exactly one on every mutating write.
    pub revision: u64,
    /// Record payload.
    pub doc: Document,
}

impl Record {
    /// Get a field value.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.doc.get(field)
    }

    /// Get a string field.
    #[must_use]
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.doc.get(field).and_then(Value::as_str)
    }

    /// Get an integer field.
    #[must_use]
    pub fn get_i64(&self, field: &str) -> Option<i64> {
        self.doc.get(field).and_then(Value::as_i64)
    }
}

/// The persisted form of a record slot.
///
/// A removed record keeps its slot with `doc: None` so that a later insert
/// continues the revision sequence instead of restarting it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Last revision written to this slot.
    pub revision: u64,
    /// Payload, or `None` if the record is absent.
    pub doc: Option<Document>,
}

impl StoredRecord {
    /// Returns true if the slot holds a live record.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        self.doc.is_some()
    }

    /// Convert to a [`Record`] if present.
    #[must_use]
    pub fn into_record(self, collection: &str, id: &str) -> Option<Record> {
        self.doc.map(|doc| Record {
            collection: collection.to_string(),
            id: id.to_string(),
            revision: self.revision,
            doc,
        })
    }
}

/// An assertion over the current state of a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Assert {
    /// No assertion.
    Any,
    /// The record must be absent.
    Missing,
    /// The record must be present, at any revision.
    Exists,
    /// The record must be present at exactly this revision.
    Revision(u64),
    /// The record must be present and every listed field must equal the
    /// given value. A missing field never matches.
    Fields(Vec<(String, Value)>),
}

impl Assert {
    /// Shorthand for a single field match.
    #[must_use]
    pub fn field(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Fields(vec![(name.into(), value.into())])
    }

    /// Evaluate against the current slot state.
    #[must_use]
    pub fn holds(&self, current: Option<&StoredRecord>) -> bool {
        let doc = current.and_then(|r| r.doc.as_ref());
        match self {
            Self::Any => true,
            Self::Missing => doc.is_none(),
            Self::Exists => doc.is_some(),
            Self::Revision(rev) => {
                doc.is_some() && current.is_some_and(|r| r.revision == *rev)
            }
            Self::Fields(fields) => doc.is_some_and(|doc| {
                fields
                    .iter()
                    .all(|(name, value)| doc.get(name) == Some(value))
            }),
        }
    }
}

/// A single field change within an update.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    /// Set a field to a value.
    Set(String, Value),
    /// Remove a field.
    Unset(String),
    /// Add to an integer field. A missing field counts as zero.
    Inc(String, i64),
}

impl FieldUpdate {
    /// Shorthand for [`FieldUpdate::Set`].
    #[must_use]
    pub fn set(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Set(name.into(), value.into())
    }

    /// Shorthand for [`FieldUpdate::Inc`].
    #[must_use]
    pub fn inc(name: impl Into<String>, by: i64) -> Self {
        Self::Inc(name.into(), by)
    }

    /// Shorthand for [`FieldUpdate::Unset`].
    #[must_use]
    pub fn unset(name: impl Into<String>) -> Self {
        Self::Unset(name.into())
    }
}

/// The change a write makes if the batch is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Assert only; the record is not modified.
    None,
    /// Create the record. Fails the batch if the record is present.
    Insert(Document),
    /// Modify fields of the record. Fails the batch if the record is absent.
    Update(Vec<FieldUpdate>),
    /// Delete the record. Fails the batch if the record is absent.
    Remove,
}

impl Mutation {
    /// Returns true if this mutation advances the record's revision.
    #[must_use]
    pub const fn is_mutating(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// An assert-then-mutate instruction against one record.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalWrite {
    /// Target collection.
    pub collection: String,
    /// Target record identifier.
    pub id: String,
    /// Condition that must hold before the batch is applied.
    pub assert: Assert,
    /// Change to make.
    pub mutation: Mutation,
}

impl ConditionalWrite {
    /// Start a write against `collection/id` with no assertion and no mutation.
    #[must_use]
    pub fn on(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
            assert: Assert::Any,
            mutation: Mutation::None,
        }
    }

    /// Set the assertion.
    #[must_use]
    pub fn asserting(mut self, assert: Assert) -> Self {
        self.assert = assert;
        self
    }

    /// Insert `doc`.
    #[must_use]
    pub fn insert(mut self, doc: Document) -> Self {
        self.mutation = Mutation::Insert(doc);
        self
    }

    /// Apply field updates.
    #[must_use]
    pub fn update(mut self, updates: Vec<FieldUpdate>) -> Self {
        self.mutation = Mutation::Update(updates);
        self
    }

    /// Remove the record.
    #[must_use]
    pub fn remove(mut self) -> Self {
        self.mutation = Mutation::Remove;
        self
    }
}

/// Result of applying a batch that did not fail fatally.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Every assertion held and every mutation took effect.
    Applied,
    /// At least one assertion failed; nothing was applied.
    Conflict,
}

/// Build a [`Document`] from `(field, value)` pairs.
///
/// ```
/// use orrery_store::doc;
///
/// let d = doc([("life", "alive".into()), ("upgrade-counter", 0.into())]);
/// assert_eq!(d.len(), 2);
/// ```
pub fn doc<I, K>(fields: I) -> Document
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    fields.into_iter().map(|(k, v)| (k.into(), v)).collect()
}
