//! Collection names.
//!
//! Each collection maps to a `RocksDB` column family of the same name.

/// Collection names for the document store.
pub mod collections {
    /// Application records, keyed by `a#<name>`.
    pub const APPLICATIONS: &str = "applications";

    /// Machine records, keyed by `m#<id>`.
    pub const MACHINES: &str = "machines";

    /// Unit records, keyed by `u#<name>`.
    pub const UNITS: &str = "units";

    /// Status records, keyed by `<global key>#<status kind>`.
    pub const STATUSES: &str = "statuses";

    /// Pod spec records for CAAS applications, keyed by application global key.
    pub const POD_SPECS: &str = "podspecs";

    /// Persisted uniter state, keyed by unit global key.
    pub const UNIT_STATES: &str = "unitstates";

    /// Controller-wide settings.
    pub const CONTROLLERS: &str = "controllers";

    /// Model settings.
    pub const SETTINGS: &str = "settings";

    /// Leadership lease records, keyed by `<namespace>#<entity>`.
    pub const LEASES: &str = "leases";
}

/// Returns all collection names for database initialization.
#[must_use]
pub fn all_collections() -> Vec<&'static str> {
    vec![
        collections::APPLICATIONS,
        collections::MACHINES,
        collections::UNITS,
        collections::STATUSES,
        collections::POD_SPECS,
        collections::UNIT_STATES,
        collections::CONTROLLERS,
        collections::SETTINGS,
        collections::LEASES,
    ]
}
