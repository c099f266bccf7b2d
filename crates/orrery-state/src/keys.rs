//! Record identifiers.
//!
//! Every entity has a global key of the form `<prefix>#<id>`. Records that
//! hang off an entity (status, pod spec, unit state) reuse the entity's key.

/// Id of the controller settings record.
pub const CONTROLLER_SETTINGS: &str = "controllerSettings";

/// Id of the model settings record.
pub const MODEL_SETTINGS: &str = "e";

/// Lease namespace for application leadership.
pub const APPLICATION_LEADERSHIP: &str = "application-leadership";

/// Global key of a machine: `m#<id>`.
#[must_use]
pub fn machine(id: &str) -> String {
    format!("m#{id}")
}

/// Global key of an application: `a#<name>`.
#[must_use]
pub fn application(name: &str) -> String {
    format!("a#{name}")
}

/// Global key of a unit: `u#<name>`.
#[must_use]
pub fn unit(name: &str) -> String {
    format!("u#{name}")
}

/// Key of a machine's modification status record.
#[must_use]
pub fn machine_modification_status(id: &str) -> String {
    format!("{}#modification", machine(id))
}

/// Key of the leadership lease for an application.
#[must_use]
pub fn application_leadership(application: &str) -> String {
    format!("{APPLICATION_LEADERSHIP}#{application}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_keys() {
        assert_eq!(machine("0/kvm/1"), "m#0/kvm/1");
        assert_eq!(application("gitlab"), "a#gitlab");
        assert_eq!(unit("gitlab/0"), "u#gitlab/0");
        assert_eq!(machine_modification_status("3"), "m#3#modification");
        assert_eq!(
            application_leadership("gitlab"),
            "application-leadership#gitlab"
        );
    }
}
