//! Host interface lookup.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::server_config::Family;

/// Read-only view of the host's network interfaces.
///
/// The server resolves `*_interface` options by name and, in full mode, needs
/// to know whether the host has two distinct addresses. Both questions go
/// through this trait.
pub trait HostInterfaces {
    /// Address of the named interface in `family`, if any.
    fn address_for(&self, family: Family, name: &str) -> Option<IpAddr>;

    /// All addresses in `family`, in interface order, without duplicates.
    fn addresses(&self, family: Family) -> Vec<IpAddr>;
}

/// One named interface and its addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    /// Interface name (e.g. `eth0`)
    pub name: String,
    /// Addresses bound to this interface
    pub addresses: Vec<IpAddr>,
}

/// Fixed interface list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticInterfaces {
    interfaces: Vec<Interface>,
}

impl StaticInterfaces {
    /// Create from an explicit interface list.
    pub fn new(interfaces: Vec<Interface>) -> Self {
        Self { interfaces }
    }

    /// Loopback plus one routable interface, each dual-stack.
    ///
    /// - `lo`: `127.0.0.1`, `::1`
    /// - `eth0`: `10.0.0.2`, `fd00::2`
    pub fn dual_homed() -> Self {
        Self::new(vec![
            Interface {
                name: "lo".to_string(),
                addresses: vec![
                    IpAddr::V4(Ipv4Addr::LOCALHOST),
                    IpAddr::V6(Ipv6Addr::LOCALHOST),
                ],
            },
            Interface {
                name: "eth0".to_string(),
                addresses: vec![
                    IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
                    IpAddr::V6(Ipv6Addr::new(0xfd00, 0, 0, 0, 0, 0, 0, 2)),
                ],
            },
        ])
    }
}

impl HostInterfaces for StaticInterfaces {
    fn address_for(&self, family: Family, name: &str) -> Option<IpAddr> {
        self.interfaces
            .iter()
            .find(|iface| iface.name == name)
            .and_then(|iface| iface.addresses.iter().copied().find(|addr| family.matches(addr)))
    }

    fn addresses(&self, family: Family) -> Vec<IpAddr> {
        let mut out = Vec::new();
        for addr in self.interfaces.iter().flat_map(|iface| iface.addresses.iter().copied()) {
            if family.matches(&addr) && !out.contains(&addr) {
                out.push(addr);
            }
        }
        out
    }
}
