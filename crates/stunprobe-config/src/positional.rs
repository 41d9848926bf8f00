//! Legacy positional argument form.
//!
//! The legacy lifecycle API accepted `start(primary, alternate, extras)`:
//!
//! - `primary` / `alternate`: undefined, a port number, or an object with
//!   `port`, `interface` and `advertised`
//! - `extras`: undefined, a protocol string, or an object with `protocol`,
//!   `mode`, `family`, `max_connections` and `verbosity`
//!
//! Both endpoint ports are always materialized: primary defaults to
//! [`DEFAULT_STUN_PORT`], alternate to the primary port plus one (wrapping at
//! 65536). `None` in the argument slice stands for an undefined argument.

use serde_json::Value;

use crate::{
    error::{ConfigError, Result},
    options::{OptionMap, keys},
    server_config::DEFAULT_STUN_PORT,
};

const ENDPOINT_FIELDS: [&str; 3] = ["port", "interface", "advertised"];

const ENDPOINT_KEYS: [[&str; 3]; 2] = [
    [keys::PRIMARY_PORT, keys::PRIMARY_INTERFACE, keys::PRIMARY_ADVERTISED],
    [keys::ALTERNATE_PORT, keys::ALTERNATE_INTERFACE, keys::ALTERNATE_ADVERTISED],
];

const EXTRA_KEYS: [&str; 5] =
    [keys::PROTOCOL, keys::MODE, keys::FAMILY, keys::MAX_CONNECTIONS, keys::VERBOSITY];

/// Normalize positional arguments into an option map.
///
/// # Errors
///
/// - [`ConfigError::TooManyArguments`] for more than three arguments
/// - [`ConfigError::InvalidEndpointArgument`] for an endpoint argument of the
///   wrong shape
/// - [`ConfigError::InvalidType`] when a port given through an object is not
///   an integer
/// - [`ConfigError::PortOutOfRange`] when the primary port has no successor
///   to derive the alternate port from
/// - [`ConfigError::InvalidExtrasArgument`] for an extras argument of the wrong
///   shape
pub fn from_positional(args: &[Option<Value>]) -> Result<OptionMap> {
    if args.len() > 3 {
        return Err(ConfigError::TooManyArguments(args.len()));
    }

    let mut options = OptionMap::new();

    for (position, role_keys) in ENDPOINT_KEYS.iter().enumerate() {
        match args.get(position).and_then(Option::as_ref) {
            None => tracing::debug!(position, "endpoint will use defaults"),
            Some(Value::Object(fields)) => {
                for (field, key) in ENDPOINT_FIELDS.iter().zip(role_keys) {
                    if let Some(value) = fields.get(*field) {
                        options.insert(*key, value.clone());
                    }
                }
            },
            Some(value @ Value::Number(_)) => options.insert(role_keys[0], value.clone()),
            Some(_) => return Err(ConfigError::InvalidEndpointArgument { position }),
        }

        let port_key = role_keys[0];
        match options.get(port_key) {
            None => {
                let port = if position == 0 {
                    i64::from(DEFAULT_STUN_PORT)
                } else {
                    let primary = options.get(keys::PRIMARY_PORT).and_then(Value::as_i64).unwrap_or(0);
                    primary
                        .checked_add(1)
                        .ok_or(ConfigError::PortOutOfRange { key: keys::PRIMARY_PORT, value: primary })?
                        .rem_euclid(65536)
                };
                options.insert(port_key, Value::from(port));
            },
            Some(value) if value.as_i64().is_none() => {
                return Err(ConfigError::InvalidType { key: port_key, expected: "an integer" });
            },
            Some(_) => {},
        }
    }

    match args.get(2).and_then(Option::as_ref) {
        None => tracing::debug!("extra options will use defaults"),
        Some(Value::Object(fields)) => {
            for key in EXTRA_KEYS {
                if let Some(value) = fields.get(key) {
                    options.insert(key, value.clone());
                }
            }
        },
        Some(value @ Value::String(_)) => options.insert(keys::PROTOCOL, value.clone()),
        Some(_) => return Err(ConfigError::InvalidExtrasArgument),
    }

    Ok(options)
}
