//! Typed server configuration and the acceptance rules that produce it.
//!
//! [`ServerConfig::from_options`] is the authoritative answer to "would the
//! server accept this option object". Rules are checked in a fixed order and
//! the first violation wins:
//!
//! ```text
//! mode → family → protocol → max_connections → ports → port collision
//!      → interfaces (basic | full) → primary_advertised → alternate_advertised
//! ```

use std::{
    fmt,
    net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr},
};

use serde::Serialize;

use crate::{
    error::{ConfigError, Result},
    interfaces::HostInterfaces,
    options::{OptionMap, keys},
};

/// Port used when `primary_port` is omitted.
pub const DEFAULT_STUN_PORT: u16 = 3478;

/// Port used when `alternate_port` is omitted.
pub const DEFAULT_ALTERNATE_PORT: u16 = DEFAULT_STUN_PORT + 1;

const MAX_CONNECTIONS_LIMIT: i64 = 100_000;

/// Transport protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// UDP (default)
    #[default]
    Udp,
    /// TCP
    Tcp,
}

/// Server mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Single endpoint, binds all interfaces unless one is named (default)
    #[default]
    Basic,
    /// Two addresses times two ports, as required for NAT behavior discovery
    Full,
}

/// IP address family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Family {
    /// IPv4 (default)
    #[default]
    V4,
    /// IPv6
    V6,
}

impl Family {
    /// Whether `addr` belongs to this family.
    pub fn matches(self, addr: &IpAddr) -> bool {
        matches!((self, addr), (Family::V4, IpAddr::V4(_)) | (Family::V6, IpAddr::V6(_)))
    }

    /// Unspecified (wildcard) address of this family.
    pub fn unspecified(self) -> IpAddr {
        match self {
            Family::V4 => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            Family::V6 => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        }
    }

    /// Parse a numeric address literal of this family.
    pub fn parse_numeric(self, s: &str) -> Option<IpAddr> {
        match self {
            Family::V4 => s.parse::<Ipv4Addr>().ok().map(IpAddr::V4),
            Family::V6 => s.parse::<Ipv6Addr>().ok().map(IpAddr::V6),
        }
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Family::V4 => write!(f, "IPv4"),
            Family::V6 => write!(f, "IPv6"),
        }
    }
}

/// Listening endpoints.
///
/// Naming follows the role matrix: the first letter is the address (Primary /
/// Alternate), the second the port. Basic mode only has `pp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Endpoints {
    /// Primary address, primary port
    pub pp: SocketAddr,
    /// Primary address, alternate port
    pub pa: Option<SocketAddr>,
    /// Alternate address, primary port
    pub ap: Option<SocketAddr>,
    /// Alternate address, alternate port
    pub aa: Option<SocketAddr>,
}

/// A configuration the server accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerConfig {
    /// Transport protocol
    pub protocol: Protocol,
    /// Server mode
    pub mode: Mode,
    /// Address family
    pub family: Family,
    /// TCP connection limit, if given
    pub max_connections: Option<u32>,
    /// Resolved primary port
    pub primary_port: u16,
    /// Resolved alternate port
    pub alternate_port: u16,
    /// Listening endpoints
    pub endpoints: Endpoints,
    /// Address reported to clients instead of the primary bind address
    pub primary_advertised: Option<IpAddr>,
    /// Address reported to clients instead of the alternate bind address
    pub alternate_advertised: Option<IpAddr>,
    /// Requested log verbosity (not validated)
    pub verbosity: Option<i64>,
}

impl ServerConfig {
    /// Validate an option object and build the typed configuration.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] in validation order. Unknown keys are
    /// ignored.
    pub fn from_options(options: &OptionMap, host: &impl HostInterfaces) -> Result<Self> {
        let mode = match options.string(keys::MODE, "a string")? {
            None => Mode::default(),
            Some("basic") => Mode::Basic,
            Some("full") => Mode::Full,
            Some(other) => return Err(ConfigError::InvalidMode(other.to_string())),
        };
        tracing::debug!(?mode, explicit = options.contains(keys::MODE), "mode resolved");

        let family = match options.integer(keys::FAMILY, "an integer")? {
            None => Family::default(),
            Some(4) => Family::V4,
            Some(6) => Family::V6,
            Some(other) => return Err(ConfigError::InvalidFamily(other)),
        };
        tracing::debug!(%family, "family resolved");

        let protocol = match options.string(keys::PROTOCOL, "a string")? {
            None => Protocol::default(),
            Some("udp") => Protocol::Udp,
            Some("tcp") => Protocol::Tcp,
            Some(other) => return Err(ConfigError::UnsupportedProtocol(other.to_string())),
        };
        tracing::debug!(?protocol, "protocol resolved");

        let max_connections = match options.integer(keys::MAX_CONNECTIONS, "an integer")? {
            None => None,
            Some(_) if protocol != Protocol::Tcp => {
                return Err(ConfigError::MaxConnectionsWithoutTcp);
            },
            Some(n) if !(1..=MAX_CONNECTIONS_LIMIT).contains(&n) => {
                return Err(ConfigError::MaxConnectionsOutOfRange(n));
            },
            Some(n) => Some(u32::try_from(n).map_err(|_| ConfigError::MaxConnectionsOutOfRange(n))?),
        };

        let verbosity = options.get(keys::VERBOSITY).and_then(serde_json::Value::as_i64);

        let primary_port = port(options, keys::PRIMARY_PORT, DEFAULT_STUN_PORT)?;
        let alternate_port = port(options, keys::ALTERNATE_PORT, DEFAULT_ALTERNATE_PORT)?;
        if primary_port == alternate_port {
            return Err(ConfigError::PortCollision(primary_port));
        }

        let endpoints = match mode {
            Mode::Basic => basic_endpoints(options, host, family, primary_port)?,
            Mode::Full => full_endpoints(options, host, family, primary_port, alternate_port)?,
        };

        let primary_advertised = advertised(options, keys::PRIMARY_ADVERTISED, family)?;

        if options.contains(keys::ALTERNATE_ADVERTISED) {
            options.string(keys::ALTERNATE_ADVERTISED, "a string")?;
            if mode != Mode::Full {
                return Err(ConfigError::AlternateAdvertisedRequiresFull);
            }
        }
        let alternate_advertised = advertised(options, keys::ALTERNATE_ADVERTISED, family)?;

        Ok(Self {
            protocol,
            mode,
            family,
            max_connections,
            primary_port,
            alternate_port,
            endpoints,
            primary_advertised,
            alternate_advertised,
            verbosity,
        })
    }

    /// Ports the running server holds, per protocol.
    ///
    /// Basic mode listens on the primary port only. Full mode listens on both.
    pub fn bound_ports(&self) -> Vec<u16> {
        match self.mode {
            Mode::Basic => vec![self.primary_port],
            Mode::Full => vec![self.primary_port, self.alternate_port],
        }
    }
}

fn port(options: &OptionMap, key: &'static str, default: u16) -> Result<u16> {
    match options.integer(key, "an integer")? {
        None => Ok(default),
        Some(value) => match u16::try_from(value) {
            Ok(port) if port != 0 => {
                tracing::debug!(key, port, "port set");
                Ok(port)
            },
            _ => Err(ConfigError::PortOutOfRange { key, value }),
        },
    }
}

fn basic_endpoints(
    options: &OptionMap,
    host: &impl HostInterfaces,
    family: Family,
    primary_port: u16,
) -> Result<Endpoints> {
    let addr = match options.string(keys::PRIMARY_INTERFACE, "a string")? {
        None => family.unspecified(),
        Some(name) => resolve(host, family, keys::PRIMARY_INTERFACE, name)?,
    };

    Ok(Endpoints { pp: SocketAddr::new(addr, primary_port), pa: None, ap: None, aa: None })
}

fn full_endpoints(
    options: &OptionMap,
    host: &impl HostInterfaces,
    family: Family,
    primary_port: u16,
    alternate_port: u16,
) -> Result<Endpoints> {
    let available = host.addresses(family);
    if available.len() < 2 {
        return Err(ConfigError::InsufficientAddresses { family });
    }

    let primary = match options.string(keys::PRIMARY_INTERFACE, "a string")? {
        Some(name) => resolve(host, family, keys::PRIMARY_INTERFACE, name)?,
        None => available[0],
    };

    let alternate = match options.string(keys::ALTERNATE_INTERFACE, "a string")? {
        Some(name) => resolve(host, family, keys::ALTERNATE_INTERFACE, name)?,
        // Best guess: first address that does not collide with the primary.
        None => available
            .iter()
            .copied()
            .find(|addr| *addr != primary)
            .ok_or(ConfigError::InsufficientAddresses { family })?,
    };

    if primary == alternate {
        return Err(ConfigError::SameAddress(primary));
    }

    Ok(Endpoints {
        pp: SocketAddr::new(primary, primary_port),
        pa: Some(SocketAddr::new(primary, alternate_port)),
        ap: Some(SocketAddr::new(alternate, primary_port)),
        aa: Some(SocketAddr::new(alternate, alternate_port)),
    })
}

fn resolve(
    host: &impl HostInterfaces,
    family: Family,
    key: &'static str,
    name: &str,
) -> Result<IpAddr> {
    host.address_for(family, name)
        .ok_or_else(|| ConfigError::InterfaceNotFound { key, name: name.to_string() })
}

fn advertised(options: &OptionMap, key: &'static str, family: Family) -> Result<Option<IpAddr>> {
    match options.string(key, "a string")? {
        None => Ok(None),
        Some(value) => family.parse_numeric(value).map(Some).ok_or_else(|| {
            ConfigError::InvalidAdvertised { key, value: value.to_string(), family }
        }),
    }
}
