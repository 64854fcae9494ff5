use std::net::{IpAddr, Ipv4Addr};

use anyhow::{Result, anyhow};

/// One address bound to one interface, as the kernel reports it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostAddress {
    pub interface: String,
    pub ip: IpAddr,
}

impl HostAddress {
    pub fn new<S: Into<String>>(interface: S, ip: IpAddr) -> Self {
        Self {
            interface: interface.into(),
            ip,
        }
    }
}

/// Reader for the host's interface address table.
pub trait AddressTable: Send + Sync {
    fn addresses(&self) -> Result<Vec<HostAddress>>;
}

/// Looks up the address an interface currently holds, for networks whose
/// address is assigned after configuration (DHCP).
pub trait IpResolver: Send + Sync {
    fn primary_ipv4(&self, interface: &str) -> Result<Ipv4Addr>;
}

/// First IPv4 address the table holds for `interface`.
pub fn first_ipv4(addresses: &[HostAddress], interface: &str) -> Result<Ipv4Addr> {
    addresses
        .iter()
        .filter(|a| a.interface == interface)
        .find_map(|a| match a.ip {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .ok_or_else(|| anyhow!("no IPv4 address found on interface {}", interface))
}
