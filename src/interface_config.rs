use std::net::{IpAddr, Ipv4Addr};

use crate::error::DerivationError;
use crate::settings::{DefaultRole, NetworkSpec};

/// A non-VIP network paired with the physical interface it configures.
#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedBinding<'a> {
    pub network: &'a str,
    pub spec: &'a NetworkSpec,
    pub device: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticAddress {
    pub address: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub broadcast: Ipv4Addr,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BootProtocol {
    Static(StaticAddress),
    /// `detected` is an address the settings already carry for the
    /// dynamic network, if any.
    Dhcp { detected: Option<Ipv4Addr> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceConfiguration {
    pub network: String,
    pub device: String,
    pub protocol: BootProtocol,
    pub gateway: Option<Ipv4Addr>,
    pub dns: Vec<IpAddr>,
}

impl InterfaceConfiguration {
    pub fn is_dhcp(&self) -> bool {
        matches!(self.protocol, BootProtocol::Dhcp { .. })
    }

    pub fn static_address(&self) -> Option<&StaticAddress> {
        match &self.protocol {
            BootProtocol::Static(a) => Some(a),
            BootProtocol::Dhcp { .. } => None,
        }
    }
}

/// Derived configuration for every bound interface. Static entries come
/// first, then DHCP entries, each ordered by network name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InterfaceConfigurations {
    pub configs: Vec<InterfaceConfiguration>,
    /// Nameservers of the network holding the dns role; empty if none.
    pub dns: Vec<IpAddr>,
}

impl InterfaceConfigurations {
    pub fn statics(&self) -> impl Iterator<Item = &InterfaceConfiguration> {
        self.configs.iter().filter(|c| !c.is_dhcp())
    }

    pub fn dhcps(&self) -> impl Iterator<Item = &InterfaceConfiguration> {
        self.configs.iter().filter(|c| c.is_dhcp())
    }

    pub fn has_dhcp(&self) -> bool {
        self.dhcps().next().is_some()
    }
}

pub fn create_interface_configurations(
    bindings: &[ResolvedBinding],
) -> Result<InterfaceConfigurations, DerivationError> {
    let dns_holder = default_holder(bindings, DefaultRole::Dns)?;
    let gateway_holder = default_holder(bindings, DefaultRole::Gateway)?.or_else(|| {
        // A lone static network that claims nothing keeps its own gateway.
        match bindings {
            [only] if !only.spec.is_dynamic() && only.spec.default.is_empty() => Some(only.network),
            _ => None,
        }
    });

    let dns = match dns_holder.and_then(|n| bindings.iter().find(|b| b.network == n)) {
        Some(holder) => holder
            .spec
            .dns
            .iter()
            .map(|s| parse_literal(holder.network, "dns server", s))
            .collect::<Result<Vec<IpAddr>, _>>()?,
        None => Vec::new(),
    };

    let mut ordered: Vec<&ResolvedBinding> = bindings.iter().collect();
    ordered.sort_by(|a, b| {
        (a.spec.is_dynamic(), a.network).cmp(&(b.spec.is_dynamic(), b.network))
    });

    let mut configs = Vec::with_capacity(ordered.len());
    for binding in ordered {
        let holds_gateway = gateway_holder == Some(binding.network);
        let config = if binding.spec.is_dynamic() {
            dhcp_configuration(binding)?
        } else {
            static_configuration(binding, holds_gateway, &dns)?
        };
        configs.push(config);
    }

    Ok(InterfaceConfigurations { configs, dns })
}

fn default_holder<'a>(
    bindings: &[ResolvedBinding<'a>],
    role: DefaultRole,
) -> Result<Option<&'a str>, DerivationError> {
    let mut holder: Option<&'a str> = None;
    for binding in bindings.iter().filter(|b| b.spec.claims(role)) {
        if let Some(first) = holder {
            let (first, second) = if first <= binding.network {
                (first, binding.network)
            } else {
                (binding.network, first)
            };
            return Err(DerivationError::ConflictingDefault {
                role,
                first: first.into(),
                second: second.into(),
            });
        }
        holder = Some(binding.network);
    }
    Ok(holder)
}

fn static_configuration(
    binding: &ResolvedBinding,
    holds_gateway: bool,
    dns: &[IpAddr],
) -> Result<InterfaceConfiguration, DerivationError> {
    let network = binding.network;
    let spec = binding.spec;

    let address: Ipv4Addr = parse_literal(network, "ip", required(network, "ip", &spec.ip)?)?;
    let netmask_str = required(network, "netmask", &spec.netmask)?;
    let netmask: Ipv4Addr = parse_literal(network, "netmask", netmask_str)?;
    if !is_contiguous_mask(netmask) {
        return Err(invalid(network, "netmask", netmask_str));
    }
    let gateway = spec
        .gateway
        .as_deref()
        .map(|g| parse_literal::<Ipv4Addr>(network, "gateway", g))
        .transpose()?;

    Ok(InterfaceConfiguration {
        network: network.into(),
        device: binding.device.clone(),
        protocol: BootProtocol::Static(StaticAddress {
            address,
            netmask,
            broadcast: broadcast_address(address, netmask),
        }),
        gateway: gateway.filter(|_| holds_gateway),
        dns: dns.to_vec(),
    })
}

fn dhcp_configuration(binding: &ResolvedBinding) -> Result<InterfaceConfiguration, DerivationError> {
    let detected = binding
        .spec
        .ip
        .as_deref()
        .map(|ip| parse_literal::<Ipv4Addr>(binding.network, "ip", ip))
        .transpose()?;
    Ok(InterfaceConfiguration {
        network: binding.network.into(),
        device: binding.device.clone(),
        protocol: BootProtocol::Dhcp { detected },
        gateway: None,
        dns: Vec::new(),
    })
}

pub fn broadcast_address(address: Ipv4Addr, netmask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(address) | !u32::from(netmask))
}

fn is_contiguous_mask(netmask: Ipv4Addr) -> bool {
    let m = u32::from(netmask);
    m.leading_ones() + m.trailing_zeros() == 32
}

fn required<'a>(
    network: &str,
    field: &'static str,
    value: &'a Option<String>,
) -> Result<&'a str, DerivationError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| DerivationError::MissingLiteral {
            network: network.into(),
            field,
        })
}

fn parse_literal<T: std::str::FromStr>(
    network: &str,
    field: &'static str,
    value: &str,
) -> Result<T, DerivationError> {
    value.trim().parse::<T>().map_err(|_| invalid(network, field, value))
}

fn invalid(network: &str, field: &'static str, value: &str) -> DerivationError {
    DerivationError::InvalidLiteral {
        network: network.into(),
        field,
        value: value.into(),
    }
}
