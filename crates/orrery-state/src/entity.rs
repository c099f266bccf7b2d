//! Entity snapshots and the entity resolver.
//!
//! The structs here are plain values decoded from a single read. They are
//! handy for callers deciding what to do, but operations never trust them:
//! every `build` re-reads what it asserts on.

use std::str::FromStr;

use orrery_core::{
    ApplicationTag, ContainerType, CoreError, DeploymentMode, Life, MachineTag, Status, Tag,
    UnitTag,
};
use orrery_store::{collections, DocumentStore, Record};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StateError};
use crate::keys;

/// Charm metadata recorded on an application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Charm {
    /// Charm name.
    pub name: String,
    /// Deployment mode, if the charm declares one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_mode: Option<DeploymentMode>,
}

/// A machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    /// Machine tag.
    pub tag: MachineTag,
    /// Life-cycle state.
    pub life: Life,
    /// Container type; `None` for a top-level machine.
    pub container_type: ContainerType,
    /// Operating system series.
    pub series: String,
}

/// An application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Application {
    /// Application tag.
    pub tag: ApplicationTag,
    /// Life-cycle state.
    pub life: Life,
    /// Charm metadata. Absent while a model migration is importing it.
    pub charm: Option<Charm>,
}

/// A unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    /// Unit tag.
    pub tag: UnitTag,
    /// Life-cycle state.
    pub life: Life,
}

/// A status value with its message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusInfo {
    /// Status value.
    pub status: Status,
    /// Human-readable message, empty if none.
    #[serde(default)]
    pub message: String,
    /// When the status was last set (RFC3339).
    #[serde(default)]
    pub updated: Option<String>,
}

/// Any entity a tag can resolve to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    /// A machine.
    Machine(Machine),
    /// A unit.
    Unit(Unit),
    /// An application.
    Application(Application),
}

impl Entity {
    /// Return the entity's tag.
    #[must_use]
    pub fn tag(&self) -> Tag {
        match self {
            Self::Machine(m) => Tag::Machine(m.tag.clone()),
            Self::Unit(u) => Tag::Unit(u.tag.clone()),
            Self::Application(a) => Tag::Application(a.tag.clone()),
        }
    }

    /// Return the entity's life.
    #[must_use]
    pub const fn life(&self) -> Life {
        match self {
            Self::Machine(m) => m.life,
            Self::Unit(u) => u.life,
            Self::Application(a) => a.life,
        }
    }
}

/// Resolves tags to entities.
pub trait EntityFinder: Send + Sync {
    /// Look up the entity named by `tag`.
    ///
    /// # Errors
    ///
    /// Returns `StateError::NotFound` if no such entity exists, or
    /// `StateError::Validation` for tags that do not name a stored entity.
    fn find_entity(&self, tag: &Tag) -> Result<Entity>;
}

/// Read a required string field.
pub(crate) fn required_str<'a>(record: &'a Record, field: &str) -> Result<&'a str> {
    record.get_str(field).ok_or_else(|| StateError::Corrupt {
        collection: record.collection.clone(),
        id: record.id.clone(),
        reason: format!("missing string field {field:?}"),
    })
}

/// Read and parse a required string field.
pub(crate) fn parse_field<T>(record: &Record, field: &str) -> Result<T>
where
    T: FromStr<Err = CoreError>,
{
    Ok(required_str(record, field)?.parse::<T>()?)
}

impl Machine {
    /// Decode a machine record.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Corrupt` if a field is missing.
    pub fn from_record(tag: MachineTag, record: &Record) -> Result<Self> {
        Ok(Self {
            tag,
            life: parse_field(record, "life")?,
            container_type: record
                .get_str("container-type")
                .map(str::parse::<ContainerType>)
                .transpose()?
                .unwrap_or_default(),
            series: record.get_str("series").unwrap_or_default().to_string(),
        })
    }
}

impl Application {
    /// Decode an application record.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Corrupt` if a field is missing or malformed.
    pub fn from_record(tag: ApplicationTag, record: &Record) -> Result<Self> {
        let charm = record
            .get("charm")
            .filter(|v| !v.is_null())
            .map(|v| serde_json::from_value::<Charm>(v.clone()))
            .transpose()
            .map_err(|e| StateError::Corrupt {
                collection: record.collection.clone(),
                id: record.id.clone(),
                reason: format!("bad charm: {e}"),
            })?;
        Ok(Self {
            tag,
            life: parse_field(record, "life")?,
            charm,
        })
    }

    /// Returns true if the application's charm manages its own workload.
    #[must_use]
    pub fn is_operator(&self) -> bool {
        self.charm
            .as_ref()
            .is_some_and(|c| c.deployment_mode == Some(DeploymentMode::Operator))
    }
}

impl Unit {
    /// Decode a unit record.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Corrupt` if a field is missing.
    pub fn from_record(tag: UnitTag, record: &Record) -> Result<Self> {
        Ok(Self {
            tag,
            life: parse_field(record, "life")?,
        })
    }

    /// The application this unit belongs to.
    #[must_use]
    pub fn application(&self) -> ApplicationTag {
        self.tag.application()
    }
}

impl StatusInfo {
    /// Decode a status record.
    ///
    /// # Errors
    ///
    /// Returns `StateError::Corrupt` if the status field is missing.
    pub fn from_record(record: &Record) -> Result<Self> {
        Ok(Self {
            status: parse_field(record, "status")?,
            message: record.get_str("message").unwrap_or_default().to_string(),
            updated: record.get_str("updated").map(str::to_string),
        })
    }
}

/// Read a machine.
pub(crate) fn read_machine(
    store: &dyn DocumentStore,
    tag: &MachineTag,
) -> Result<(Machine, Record)> {
    let record = store
        .get(collections::MACHINES, &keys::machine(tag.id()))?
        .ok_or_else(|| StateError::not_found("machine", tag.id()))?;
    Ok((Machine::from_record(tag.clone(), &record)?, record))
}

/// Read an application.
pub(crate) fn read_application(
    store: &dyn DocumentStore,
    tag: &ApplicationTag,
) -> Result<(Application, Record)> {
    let record = store
        .get(collections::APPLICATIONS, &keys::application(tag.id()))?
        .ok_or_else(|| StateError::not_found("application", tag.id()))?;
    Ok((Application::from_record(tag.clone(), &record)?, record))
}

/// Read a unit.
pub(crate) fn read_unit(store: &dyn DocumentStore, tag: &UnitTag) -> Result<(Unit, Record)> {
    let record = store
        .get(collections::UNITS, &keys::unit(tag.id()))?
        .ok_or_else(|| StateError::not_found("unit", tag.id()))?;
    Ok((Unit::from_record(tag.clone(), &record)?, record))
}
