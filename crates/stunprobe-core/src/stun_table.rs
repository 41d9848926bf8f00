//! Field table for the STUN server's configuration object.
//!
//! Acceptable values are chosen so that every combination of them (with any
//! subset omitted) is a configuration the server must accept, on a host with
//! two interfaces (`lo`, `eth0`). Cross-field constraints that would break that
//! are expressed as dependency rules instead:
//!
//! - outside full mode there is no alternate endpoint to configure
//! - `max_connections` is only meaningful over TCP
//! - the advertised-address literals below are IPv4
//!
//! Every error value is rejected on its own, whatever the other fields hold.

use stunprobe_config::{
    DEFAULT_ALTERNATE_PORT, DEFAULT_STUN_PORT,
    keys::{
        ALTERNATE_ADVERTISED, ALTERNATE_INTERFACE, ALTERNATE_PORT, FAMILY, MAX_CONNECTIONS, MODE,
        PRIMARY_ADVERTISED, PRIMARY_INTERFACE, PRIMARY_PORT, PROTOCOL,
    },
};

use crate::{
    error::TableError,
    field::{FieldSpec, FieldTable},
    rules::{Condition, DependencyRule},
};

/// Rule name: alternate fields are skipped unless `mode` is `full`.
pub const RULE_NO_ALTERNATE_OUTSIDE_FULL: &str = "no-alternate-outside-full";

/// Rule name: `max_connections` is skipped unless `protocol` is `tcp`.
pub const RULE_MAX_CONNECTIONS_NEEDS_TCP: &str = "max-connections-needs-tcp";

/// Rule name: advertised addresses are skipped for `family: 6`.
pub const RULE_ADVERTISED_IPV4_ONLY: &str = "advertised-ipv4-only";

/// Field domains in generation order.
pub fn stun_fields() -> Vec<FieldSpec> {
    vec![
        FieldSpec::new(PROTOCOL).accept("udp").accept("tcp").reject("tls").reject(17),
        FieldSpec::new(MODE).accept("basic").accept("full").reject("half").reject(1),
        FieldSpec::new(FAMILY).accept(4).accept(6).reject(5).reject("4"),
        FieldSpec::new(MAX_CONNECTIONS).accept(1).accept(100_000).reject(0).reject(100_001).reject("ten"),
        FieldSpec::new(PRIMARY_PORT)
            .accept(DEFAULT_STUN_PORT)
            .accept(DEFAULT_STUN_PORT + 2)
            .reject(0)
            .reject(65_536)
            .reject("3478"),
        FieldSpec::new(PRIMARY_INTERFACE).accept("lo").reject("bogus0").reject(3),
        FieldSpec::new(PRIMARY_ADVERTISED)
            .accept("192.0.2.10")
            .reject("stun.example.org")
            .reject("::1")
            .reject(7),
        FieldSpec::new(ALTERNATE_PORT)
            .accept(DEFAULT_ALTERNATE_PORT)
            .accept(DEFAULT_ALTERNATE_PORT + 2)
            .reject(0)
            .reject(70_000)
            .reject(true),
        FieldSpec::new(ALTERNATE_INTERFACE).accept("eth0").reject("bogus1").reject(serde_json::json!([])),
        FieldSpec::new(ALTERNATE_ADVERTISED).accept("198.51.100.7").reject("nope").reject(1),
    ]
}

/// Cross-field rules for [`stun_fields`].
pub fn stun_rules() -> Vec<DependencyRule> {
    vec![
        DependencyRule::new(
            RULE_NO_ALTERNATE_OUTSIDE_FULL,
            Condition::not_equals(MODE, "full"),
            [ALTERNATE_PORT, ALTERNATE_INTERFACE, ALTERNATE_ADVERTISED],
            "basic mode (explicit or default) has no alternate endpoint",
        ),
        DependencyRule::new(
            RULE_MAX_CONNECTIONS_NEEDS_TCP,
            Condition::not_equals(PROTOCOL, "tcp"),
            [MAX_CONNECTIONS],
            "max_connections has no meaning over UDP",
        ),
        DependencyRule::new(
            RULE_ADVERTISED_IPV4_ONLY,
            Condition::equals(FAMILY, 6),
            [PRIMARY_ADVERTISED, ALTERNATE_ADVERTISED],
            "advertised address literals are IPv4",
        ),
    ]
}

/// The validated STUN field table.
///
/// # Errors
///
/// Only fails if the static table above is edited into an invalid state.
pub fn stun_field_table() -> Result<FieldTable, TableError> {
    FieldTable::new(stun_fields(), stun_rules())
}
