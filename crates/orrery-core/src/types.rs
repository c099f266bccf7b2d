//! Enumerated values shared between the state layer and the API surface.
//!
//! Every type here is stored as its lowercase string form so records stay
//! readable when inspected directly.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $s:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "kebab-case")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Return the canonical string form.
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $( Self::$variant => $s ),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $( $s => Ok(Self::$variant), )+
                    _ => Err(CoreError::UnknownValue {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

string_enum! {
    /// Life-cycle state of an entity. Life only ever advances.
    Life, "life" {
        /// The entity is in normal use.
        Alive => "alive",
        /// The entity is being torn down.
        Dying => "dying",
        /// The entity is gone and awaiting removal.
        Dead => "dead",
    }
}

string_enum! {
    /// The kind of container a machine runs in.
    ContainerType, "container type" {
        /// A top-level machine, not a container.
        None => "none",
        /// An LXD container.
        Lxd => "lxd",
        /// A KVM virtual machine.
        Kvm => "kvm",
    }
}

string_enum! {
    /// Status values recorded for entities.
    Status, "status" {
        /// Nothing in progress.
        Idle => "idle",
        /// A change was applied successfully.
        Applied => "applied",
        /// A change failed.
        Error => "error",
        /// Waiting for something to happen.
        Pending => "pending",
        /// Actively running.
        Active => "active",
    }
}

string_enum! {
    /// Deployment mode declared by a charm.
    DeploymentMode, "deployment mode" {
        /// The charm manages its own workload (no pod spec).
        Operator => "operator",
        /// The controller deploys the workload from a pod spec.
        Workload => "workload",
    }
}

impl Life {
    /// Returns true if `self` may be followed by `next`.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        (self as u8) <= (next as u8)
    }
}

impl Default for ContainerType {
    fn default() -> Self {
        Self::None
    }
}
