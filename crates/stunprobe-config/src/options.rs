//! Untyped option objects.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ConfigError, Result};

/// Recognized option keys.
pub mod keys {
    /// Transport protocol (`udp` or `tcp`)
    pub const PROTOCOL: &str = "protocol";
    /// Server mode (`basic` or `full`)
    pub const MODE: &str = "mode";
    /// IP family (4 or 6)
    pub const FAMILY: &str = "family";
    /// TCP connection limit
    pub const MAX_CONNECTIONS: &str = "max_connections";
    /// Log verbosity, accepted and not validated
    pub const VERBOSITY: &str = "verbosity";
    /// Primary port
    pub const PRIMARY_PORT: &str = "primary_port";
    /// Primary interface name
    pub const PRIMARY_INTERFACE: &str = "primary_interface";
    /// Primary advertised address
    pub const PRIMARY_ADVERTISED: &str = "primary_advertised";
    /// Alternate port
    pub const ALTERNATE_PORT: &str = "alternate_port";
    /// Alternate interface name
    pub const ALTERNATE_INTERFACE: &str = "alternate_interface";
    /// Alternate advertised address
    pub const ALTERNATE_ADVERTISED: &str = "alternate_advertised";

    /// Every key the server reads, in validation order.
    pub const ALL: [&str; 11] = [
        MODE,
        FAMILY,
        PROTOCOL,
        MAX_CONNECTIONS,
        VERBOSITY,
        PRIMARY_PORT,
        ALTERNATE_PORT,
        PRIMARY_INTERFACE,
        ALTERNATE_INTERFACE,
        PRIMARY_ADVERTISED,
        ALTERNATE_ADVERTISED,
    ];
}

/// Option object passed to the server's `start()`.
///
/// An absent key means the option was omitted. Values are never inspected for
/// truthiness: `{"primary_port": 0}` carries a port of zero, it does not omit
/// the port.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionMap(BTreeMap<String, Value>);

impl OptionMap {
    /// Create an empty option map (every option omitted).
    pub fn new() -> Self {
        Self::default()
    }

    /// Interpret an arbitrary value as an option object.
    ///
    /// `None` (undefined) is the empty map. Any non-object value is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotAnObject`] for non-object values.
    pub fn from_value(value: Option<&Value>) -> Result<Self> {
        match value {
            None => Ok(Self::new()),
            Some(Value::Object(map)) => {
                Ok(Self(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()))
            },
            Some(_) => Err(ConfigError::NotAnObject),
        }
    }

    /// Look up a key. `None` means omitted.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Whether the key is present.
    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Set a key, replacing any previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    /// Remove a key, returning its previous value.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// Builder-style [`insert`](Self::insert).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value.into());
        self
    }

    /// Iterate present keys in lexical order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of present keys.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether every option is omitted.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert into a JSON object value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    /// Read an optional string option.
    pub(crate) fn string(&self, key: &'static str, expected: &'static str) -> Result<Option<&str>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(ConfigError::InvalidType { key, expected }),
        }
    }

    /// Read an optional integer option. Non-integral numbers are rejected.
    pub(crate) fn integer(&self, key: &'static str, expected: &'static str) -> Result<Option<i64>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value.as_i64().map(Some).ok_or(ConfigError::InvalidType { key, expected }),
        }
    }
}

impl fmt::Display for OptionMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_value())
    }
}

impl FromIterator<(String, Value)> for OptionMap {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
