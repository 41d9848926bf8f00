//! Error types for configuration validation.
//!
//! Each variant corresponds to one rejection reason of the server's
//! configuration parser, so tests can assert on the exact rule that fired.

use std::net::IpAddr;

use thiserror::Error;

use crate::server_config::Family;

/// Reasons a configuration is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    // Shape errors
    /// The configuration argument is present but is not an object
    #[error("the server configuration must be an object")]
    NotAnObject,

    /// A recognized key holds a value of the wrong JSON type
    #[error("{key} can only be {expected} or undefined")]
    InvalidType {
        /// Offending key
        key: &'static str,
        /// Human-readable expected type
        expected: &'static str,
    },

    // Value errors
    /// `mode` is a string other than `basic` or `full`
    #[error("mode must be \"full\" or \"basic\", got {0:?}")]
    InvalidMode(String),

    /// `family` is an integer other than 4 or 6
    #[error("IP family must be 4 or 6, got {0}")]
    InvalidFamily(i64),

    /// `protocol` is a string other than `udp` or `tcp`
    #[error("protocol must be 'udp' or 'tcp', got {0:?} ('tls' is not supported)")]
    UnsupportedProtocol(String),

    /// `max_connections` given while the protocol is UDP
    #[error("max_connections has no meaning in UDP mode")]
    MaxConnectionsWithoutTcp,

    /// `max_connections` outside 1..=100000
    #[error("max_connections must be between 1-100000, got {0}")]
    MaxConnectionsOutOfRange(i64),

    /// A port outside 1..=65535
    #[error("{key} value {value} is invalid, must be between 1-65535")]
    PortOutOfRange {
        /// Offending key
        key: &'static str,
        /// Rejected value
        value: i64,
    },

    /// Primary and alternate port resolve to the same value
    #[error("primary port and alternate port must be different values (both {0})")]
    PortCollision(u16),

    // Host errors
    /// A named interface has no address in the selected family
    #[error("no matching adapter found for {key} {name:?}")]
    InterfaceNotFound {
        /// Offending key
        key: &'static str,
        /// Interface name that failed to resolve
        name: String,
    },

    /// Full mode needs two distinct addresses in the selected family
    #[error("full mode requires two or more unique {family} addresses")]
    InsufficientAddresses {
        /// Selected address family
        family: Family,
    },

    /// Primary and alternate interface resolve to the same address
    #[error("primary and alternate interface share address {0}, full mode requires two")]
    SameAddress(IpAddr),

    // Advertisement errors
    /// An advertised address is not a numeric IP of the selected family
    #[error("{key} {value:?} is not a valid {family} address string")]
    InvalidAdvertised {
        /// Offending key
        key: &'static str,
        /// Rejected value
        value: String,
        /// Selected address family
        family: Family,
    },

    /// `alternate_advertised` outside full mode
    #[error("cannot set alternate_advertised unless mode is \"full\"")]
    AlternateAdvertisedRequiresFull,

    // Positional argument errors
    /// More than three positional arguments
    #[error("wrong number of arguments: expected at most 3, got {0}")]
    TooManyArguments(usize),

    /// An endpoint argument is neither an object, an integer nor undefined
    #[error("endpoint argument {position} can only be an object, an integer or undefined")]
    InvalidEndpointArgument {
        /// Zero-based argument position
        position: usize,
    },

    /// The extras argument is neither an object, a string nor undefined
    #[error("extra options can only be an object or a string")]
    InvalidExtrasArgument,
}

/// Convenient Result type alias for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;
