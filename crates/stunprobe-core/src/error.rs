//! Error types for the acceptance engine.
//!
//! Two layers:
//! - Table errors: the field table or rule set is malformed. These are fatal
//!   and surface when the table is built, never during a run.
//! - Service errors: the target refused or failed a lifecycle call. These are
//!   data for the oracle, not failures of the harness.

use stunprobe_config::ConfigError;
use thiserror::Error;

/// Construction-time invariant violations of a field table.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    /// Two fields share a key
    #[error("duplicate field key: {0}")]
    DuplicateKey(String),

    /// A value is listed as both acceptable and erroneous
    #[error("field {key} lists {value} as both acceptable and an error")]
    OverlappingValue {
        /// Field key
        key: String,
        /// Offending value, JSON encoded
        value: String,
    },

    /// A rule references a key that is not in the table
    #[error("rule {rule} references unknown key {key}")]
    UnknownKey {
        /// Rule name
        rule: String,
        /// Unknown key
        key: String,
    },

    /// A rule's trigger is not declared strictly before the field it skips
    #[error("rule {rule} triggers on {trigger} which is not declared before {target}")]
    LookAhead {
        /// Rule name
        rule: String,
        /// Key the condition reads
        trigger: String,
        /// Key the rule skips
        target: String,
    },

    /// Two rules share a name
    #[error("duplicate rule name: {0}")]
    DuplicateRule(String),
}

/// Failures reported by the target's lifecycle calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The configuration was rejected
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// `start` called while already running
    #[error("server is already running")]
    AlreadyRunning,

    /// `stop` called while not running
    #[error("server already stopped")]
    NotRunning,

    /// A port needed by the instance is held by another instance
    #[error("address in use: port {port}")]
    AddressInUse {
        /// Contended port
        port: u16,
    },

    /// Any other start failure reported by the target
    #[error("server did not start: {0}")]
    StartFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_convert_into_service_errors() {
        let err: ServiceError = ConfigError::InvalidMode("half".to_string()).into();
        assert_eq!(err, ServiceError::InvalidConfig(ConfigError::InvalidMode("half".to_string())));
        assert_eq!(err.to_string(), "invalid configuration: mode must be \"full\" or \"basic\", got \"half\"");
    }
}
