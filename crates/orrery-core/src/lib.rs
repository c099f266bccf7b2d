//! Core types and utilities for orrery.
//!
//! This crate provides the foundational types used throughout the orrery
//! control plane:
//!
//! - **Tags**: Strongly-typed names for machines, units, applications, models
//!   and controllers
//! - **Enumerations**: Life, container type, status and deployment mode
//! - **Error types**: Common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use orrery_core::{Tag, Kind, UnitTag};
//!
//! let tag = Tag::parse("unit-mysql-0").unwrap();
//! assert_eq!(tag.kind(), Kind::Unit);
//!
//! let unit: UnitTag = "unit-mysql-0".parse().unwrap();
//! assert_eq!(unit.application().id(), "mysql");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod tags;
pub mod types;

pub use error::{CoreError, Result};
pub use tags::{ApplicationTag, Kind, MachineTag, Tag, UnitTag};
pub use types::{ContainerType, DeploymentMode, Life, Status};
