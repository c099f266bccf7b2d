//! Entity tags.
//!
//! A tag is the string form used to name an entity across API boundaries,
//! e.g. `machine-0`, `machine-0-kvm-1`, `unit-mysql-0`, `application-mysql`.
//! Each kind has a strongly-typed wrapper holding the bare identifier.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

const MACHINE_PREFIX: &str = "machine-";
const UNIT_PREFIX: &str = "unit-";
const APPLICATION_PREFIX: &str = "application-";
const MODEL_PREFIX: &str = "model-";
const CONTROLLER_PREFIX: &str = "controller-";

/// The kind of entity a tag names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// A machine or container.
    Machine,
    /// A unit of an application.
    Unit,
    /// An application.
    Application,
    /// A model.
    Model,
    /// A controller.
    Controller,
}

impl Kind {
    /// The kind name as used in tag prefixes and messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Machine => "machine",
            Self::Unit => "unit",
            Self::Application => "application",
            Self::Model => "model",
            Self::Controller => "controller",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns true if `s` is a decimal number without leading zeros.
fn is_number(s: &str) -> bool {
    !s.is_empty()
        && s.bytes().all(|b| b.is_ascii_digit())
        && (s == "0" || !s.starts_with('0'))
}

/// Returns true if `id` is a valid machine id such as `0` or `0/kvm/1`.
#[must_use]
pub fn is_valid_machine(id: &str) -> bool {
    let segments: Vec<&str> = id.split('/').collect();
    if segments.len() % 2 == 0 {
        return false;
    }
    segments.iter().enumerate().all(|(i, seg)| {
        if i % 2 == 0 {
            is_number(seg)
        } else {
            !seg.is_empty() && seg.bytes().all(|b| b.is_ascii_lowercase())
        }
    })
}

/// Returns true if `name` is a valid application name.
///
/// Names are lowercase alphanumerics separated by single hyphens, start with a
/// letter, and every hyphen-separated segment contains at least one letter.
#[must_use]
pub fn is_valid_application(name: &str) -> bool {
    if !name.starts_with(|c: char| c.is_ascii_lowercase()) {
        return false;
    }
    name.split('-').all(|seg| {
        !seg.is_empty()
            && seg
                .bytes()
                .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
            && seg.bytes().any(|b| b.is_ascii_lowercase())
    })
}

/// Returns true if `name` is a valid unit name such as `mysql/0`.
#[must_use]
pub fn is_valid_unit(name: &str) -> bool {
    name.split_once('/')
        .is_some_and(|(app, num)| is_valid_application(app) && is_number(num))
}

/// Tag for a machine, holding the machine id (`0`, `0/kvm/1`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MachineTag(String);

impl MachineTag {
    /// Create a machine tag from a machine id.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidId` if the id is malformed.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if is_valid_machine(&id) {
            Ok(Self(id))
        } else {
            Err(CoreError::InvalidId { kind: "machine", id })
        }
    }

    /// Return the machine id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.0
    }

    /// Returns true if this machine is a container hosted on another machine.
    #[must_use]
    pub fn is_container(&self) -> bool {
        self.0.contains('/')
    }
}

impl fmt::Debug for MachineTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MachineTag({})", self.0)
    }
}

impl fmt::Display for MachineTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{MACHINE_PREFIX}{}", self.0.replace('/', "-"))
    }
}

/// Tag for a unit, holding the unit name (`mysql/0`).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UnitTag(String);

impl UnitTag {
    /// Create a unit tag from a unit name.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidId` if the name is malformed.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if is_valid_unit(&name) {
            Ok(Self(name))
        } else {
            Err(CoreError::InvalidId {
                kind: "unit",
                id: name,
            })
        }
    }

    /// Return the unit name.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.0
    }

    /// Return the tag of the application this unit belongs to.
    #[must_use]
    pub fn application(&self) -> ApplicationTag {
        let app = self.0.split_once('/').map_or(self.0.as_str(), |(app, _)| app);
        ApplicationTag(app.to_string())
    }
}

impl fmt::Debug for UnitTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnitTag({})", self.0)
    }
}

impl fmt::Display for UnitTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{UNIT_PREFIX}{}", self.0.replace('/', "-"))
    }
}

/// Tag for an application, holding the application name.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ApplicationTag(String);

impl ApplicationTag {
    /// Create an application tag from an application name.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidId` if the name is malformed.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if is_valid_application(&name) {
            Ok(Self(name))
        } else {
            Err(CoreError::InvalidId {
                kind: "application",
                id: name,
            })
        }
    }

    /// Return the application name.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApplicationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApplicationTag({})", self.0)
    }
}

impl fmt::Display for ApplicationTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{APPLICATION_PREFIX}{}", self.0)
    }
}

/// Any entity tag.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Tag {
    /// A machine tag.
    Machine(MachineTag),
    /// A unit tag.
    Unit(UnitTag),
    /// An application tag.
    Application(ApplicationTag),
    /// A model tag.
    Model(uuid::Uuid),
    /// A controller tag.
    Controller(uuid::Uuid),
}

impl Tag {
    /// Parse a tag string of any kind.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidTag` if the prefix is unknown or the
    /// identifier is malformed.
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || CoreError::InvalidTag(s.to_string());

        if let Some(rest) = s.strip_prefix(MACHINE_PREFIX) {
            MachineTag::new(rest.replace('-', "/"))
                .map(Self::Machine)
                .map_err(|_| invalid())
        } else if let Some(rest) = s.strip_prefix(UNIT_PREFIX) {
            let (app, num) = rest.rsplit_once('-').ok_or_else(invalid)?;
            UnitTag::new(format!("{app}/{num}"))
                .map(Self::Unit)
                .map_err(|_| invalid())
        } else if let Some(rest) = s.strip_prefix(APPLICATION_PREFIX) {
            ApplicationTag::new(rest)
                .map(Self::Application)
                .map_err(|_| invalid())
        } else if let Some(rest) = s.strip_prefix(MODEL_PREFIX) {
            uuid::Uuid::parse_str(rest)
                .map(Self::Model)
                .map_err(|_| invalid())
        } else if let Some(rest) = s.strip_prefix(CONTROLLER_PREFIX) {
            uuid::Uuid::parse_str(rest)
                .map(Self::Controller)
                .map_err(|_| invalid())
        } else {
            Err(invalid())
        }
    }

    /// Return the kind of entity this tag names.
    #[must_use]
    pub const fn kind(&self) -> Kind {
        match self {
            Self::Machine(_) => Kind::Machine,
            Self::Unit(_) => Kind::Unit,
            Self::Application(_) => Kind::Application,
            Self::Model(_) => Kind::Model,
            Self::Controller(_) => Kind::Controller,
        }
    }

    /// Return the bare identifier (machine id, unit name, uuid...).
    #[must_use]
    pub fn id(&self) -> String {
        match self {
            Self::Machine(t) => t.id().to_string(),
            Self::Unit(t) => t.id().to_string(),
            Self::Application(t) => t.id().to_string(),
            Self::Model(u) | Self::Controller(u) => u.to_string(),
        }
    }
}

impl fmt::Debug for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tag({self})")
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Machine(t) => t.fmt(f),
            Self::Unit(t) => t.fmt(f),
            Self::Application(t) => t.fmt(f),
            Self::Model(u) => write!(f, "{MODEL_PREFIX}{u}"),
            Self::Controller(u) => write!(f, "{CONTROLLER_PREFIX}{u}"),
        }
    }
}

impl FromStr for Tag {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Tag {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Tag> for String {
    fn from(tag: Tag) -> Self {
        tag.to_string()
    }
}

macro_rules! typed_tag_conversions {
    ($ty:ident, $variant:ident, $kind:literal) => {
        impl FromStr for $ty {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self> {
                match Tag::parse(s)? {
                    Tag::$variant(t) => Ok(t),
                    _ => Err(CoreError::WrongKind {
                        tag: s.to_string(),
                        expected: $kind,
                    }),
                }
            }
        }

        impl TryFrom<String> for $ty {
            type Error = CoreError;

            fn try_from(value: String) -> Result<Self> {
                value.parse()
            }
        }

        impl From<$ty> for String {
            fn from(tag: $ty) -> Self {
                tag.to_string()
            }
        }

        impl From<$ty> for Tag {
            fn from(tag: $ty) -> Self {
                Tag::$variant(tag)
            }
        }
    };
}

typed_tag_conversions!(MachineTag, Machine, "machine");
typed_tag_conversions!(UnitTag, Unit, "unit");
typed_tag_conversions!(ApplicationTag, Application, "application");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_ids() {
        assert!(is_valid_machine("0"));
        assert!(is_valid_machine("12"));
        assert!(is_valid_machine("0/kvm/1"));
        assert!(is_valid_machine("0/lxd/1/kvm/0"));
        assert!(!is_valid_machine(""));
        assert!(!is_valid_machine("01"));
        assert!(!is_valid_machine("0/kvm"));
        assert!(!is_valid_machine("0/KVM/1"));
        assert!(!is_valid_machine("machine"));
    }

    #[test]
    fn application_names() {
        assert!(is_valid_application("mysql"));
        assert!(is_valid_application("my-app2"));
        assert!(is_valid_application("a1-b2"));
        assert!(!is_valid_application("1app"));
        assert!(!is_valid_application("app-1"));
        assert!(!is_valid_application("app--x"));
        assert!(!is_valid_application("App"));
        assert!(!is_valid_application(""));
    }

    #[test]
    fn unit_names() {
        assert!(is_valid_unit("mysql/0"));
        assert!(is_valid_unit("my-app/12"));
        assert!(!is_valid_unit("mysql"));
        assert!(!is_valid_unit("mysql/01"));
        assert!(!is_valid_unit("mysql/x"));
    }

    #[test]
    fn parse_machine_tag() {
        let tag = Tag::parse("machine-0-kvm-1").unwrap();
        assert_eq!(tag.kind(), Kind::Machine);
        assert_eq!(tag.id(), "0/kvm/1");
        assert_eq!(tag.to_string(), "machine-0-kvm-1");

        let machine: MachineTag = "machine-3".parse().unwrap();
        assert_eq!(machine.id(), "3");
        assert!(!machine.is_container());
    }

    #[test]
    fn parse_unit_tag() {
        let unit: UnitTag = "unit-my-app-7".parse().unwrap();
        assert_eq!(unit.id(), "my-app/7");
        assert_eq!(unit.application().id(), "my-app");
        assert_eq!(unit.to_string(), "unit-my-app-7");
    }

    #[test]
    fn parse_application_tag() {
        let app: ApplicationTag = "application-gitlab".parse().unwrap();
        assert_eq!(app.id(), "gitlab");
        assert_eq!(Tag::from(app).to_string(), "application-gitlab");
    }

    #[test]
    fn parse_model_tag() {
        let tag = Tag::parse("model-550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(tag.kind(), Kind::Model);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(matches!(Tag::parse("foo-1"), Err(CoreError::InvalidTag(_))));
        assert!(Tag::parse("machine-").is_err());
        assert!(Tag::parse("unit-mysql").is_err());
        assert!(Tag::parse("application-1x").is_err());
    }

    #[test]
    fn wrong_kind() {
        let err = "unit-mysql-0".parse::<MachineTag>().unwrap_err();
        assert!(matches!(
            err,
            CoreError::WrongKind {
                expected: "machine",
                ..
            }
        ));
    }

    #[test]
    fn serde_roundtrip_uses_tag_string() {
        let tag = Tag::parse("unit-mysql-0").unwrap();
        let json = serde_json::to_string(&tag).unwrap();
        assert_eq!(json, "\"unit-mysql-0\"");
        let back: Tag = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tag);
    }
}
