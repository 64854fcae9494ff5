use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::thread;

use crossbeam::channel::Sender;
use log::{debug, error, info, warn};

use crate::arp::{AddressBinding, AddressBroadcaster};
use crate::cmd::CmdRunner;
use crate::dns::DnsValidator;
use crate::error::{DerivationError, NetworkError, ValidationTarget};
use crate::fs::FileSystem;
use crate::interface_config::{
    BootProtocol, InterfaceConfigurations, ResolvedBinding, create_interface_configurations,
};
use crate::inventory::PhysicalInterfaceInventory;
use crate::ip::AddressTable;
use crate::materialize::{ConfigMaterializer, ConfigPaths};
use crate::settings::Networks;

/// Receives the outcome of the background address broadcast.
pub type Completion = Sender<Result<(), NetworkError>>;

pub struct NetManager {
    fs: Arc<dyn FileSystem>,
    cmd: Arc<dyn CmdRunner>,
    inventory: Arc<dyn PhysicalInterfaceInventory>,
    addresses: Arc<dyn AddressTable>,
    broadcaster: Arc<dyn AddressBroadcaster>,
    materializer: ConfigMaterializer,
    dns_validator: DnsValidator,
    restart_command: Vec<String>,
}

impl NetManager {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        cmd: Arc<dyn CmdRunner>,
        inventory: Arc<dyn PhysicalInterfaceInventory>,
        addresses: Arc<dyn AddressTable>,
        broadcaster: Arc<dyn AddressBroadcaster>,
        paths: ConfigPaths,
    ) -> Self {
        let dns_validator = DnsValidator::new(fs.clone(), paths.resolv_conf.clone());
        Self {
            materializer: ConfigMaterializer::new(fs.clone(), paths),
            fs,
            cmd,
            inventory,
            addresses,
            broadcaster,
            dns_validator,
            restart_command: vec!["service".into(), "network".into(), "restart".into()],
        }
    }

    pub fn with_restart_command(mut self, command: Vec<String>) -> Self {
        self.restart_command = command;
        self
    }

    /// Converge host networking to `networks`. Address broadcasting runs in
    /// the background after this returns; its outcome goes to `completion`
    /// when one is given and is otherwise only logged.
    pub fn setup_networking(
        &self,
        networks: &Networks,
        completion: Option<Completion>,
    ) -> Result<(), NetworkError> {
        let by_mac = self.inventory.detect().map_err(NetworkError::Discovery)?;
        debug!("Physical interfaces by MAC: {:?}", by_mac);

        let bindings = resolve_bindings(networks, &by_mac)?;
        let configs = create_interface_configurations(&bindings)?;
        debug!("Interface configurations: {:?}", configs);

        let changed = self
            .materializer
            .write(&configs)
            .map_err(NetworkError::Persistence)?;
        if changed {
            self.restart_networking();
        } else {
            info!("Network configuration is unchanged");
        }

        self.validate_static_addresses(&configs)?;
        if !configs.dns.is_empty() {
            self.dns_validator
                .validate(&configs.dns)
                .map_err(|e| NetworkError::Validation(ValidationTarget::Dns, format!("{:#}", e)))?;
        }

        self.start_broadcast(broadcast_bindings(&configs), completion);
        Ok(())
    }

    /// Physical interfaces that have an interface configuration file.
    pub fn get_configured_network_interfaces(&self) -> Result<Vec<String>, NetworkError> {
        let interfaces = self
            .inventory
            .interfaces()
            .map_err(NetworkError::Discovery)?;
        let paths = self.materializer.paths();
        let mut configured: Vec<String> = interfaces
            .into_iter()
            .filter(|i| i.is_physical && self.fs.exists(&paths.ifcfg(&i.name)))
            .map(|i| i.name)
            .collect();
        configured.sort();
        Ok(configured)
    }

    fn restart_networking(&self) {
        info!("Restarting networking with {:?}", self.restart_command);
        if let Err(e) = self.cmd.run(&self.restart_command) {
            error!("Unable to restart networking: {:#}", e);
        }
    }

    fn validate_static_addresses(&self, configs: &InterfaceConfigurations) -> Result<(), NetworkError> {
        let expected: Vec<(&str, IpAddr)> = configs
            .statics()
            .filter_map(|c| {
                c.static_address()
                    .map(|a| (c.device.as_str(), IpAddr::V4(a.address)))
            })
            .collect();
        if expected.is_empty() {
            return Ok(());
        }

        let table = self.addresses.addresses().map_err(|e| {
            NetworkError::Validation(
                ValidationTarget::StaticNetwork,
                format!("unable to read interface addresses: {:#}", e),
            )
        })?;
        let missing: Vec<String> = expected
            .into_iter()
            .filter(|(device, ip)| {
                !table
                    .iter()
                    .any(|h| h.interface == *device && h.ip == *ip)
            })
            .map(|(device, ip)| format!("{} on {}", ip, device))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(NetworkError::Validation(
                ValidationTarget::StaticNetwork,
                format!("addresses not present on host: {}", missing.join(", ")),
            ))
        }
    }

    fn start_broadcast(&self, bindings: Vec<AddressBinding>, completion: Option<Completion>) {
        let broadcaster = self.broadcaster.clone();
        thread::spawn(move || {
            debug!("Broadcasting {:?}", bindings);
            let result = broadcaster
                .broadcast(bindings)
                .map_err(NetworkError::Broadcast);
            match completion {
                Some(tx) => {
                    if tx.send(result).is_err() {
                        warn!("Nobody is waiting for the broadcast result");
                    }
                }
                None => match result {
                    Ok(()) => debug!("Broadcast finished"),
                    Err(e) => error!("{}", e),
                },
            }
        });
    }
}

/// Pair each non-VIP network with the physical interface it configures.
/// Networks naming a MAC that is not on this host are skipped.
pub fn resolve_bindings<'a>(
    networks: &'a Networks,
    by_mac: &HashMap<String, String>,
) -> Result<Vec<ResolvedBinding<'a>>, DerivationError> {
    let mut bindings = Vec::new();
    let mut claimed: HashMap<&str, &str> = HashMap::new();
    let mut mac_less = Vec::new();

    for (name, spec) in networks.iter().filter(|(_, spec)| !spec.is_vip()) {
        let Some(mac) = spec.mac_address() else {
            mac_less.push((name.as_str(), spec));
            continue;
        };
        let Some(device) = by_mac.get(&mac) else {
            info!("No interface has MAC {}, skipping network {}", mac, name);
            continue;
        };
        if let Some(first) = claimed.insert(device.as_str(), name.as_str()) {
            return Err(DerivationError::InterfaceClaimedTwice {
                interface: device.clone(),
                first: first.into(),
                second: name.clone(),
            });
        }
        bindings.push(ResolvedBinding {
            network: name.as_str(),
            spec,
            device: device.clone(),
        });
    }

    match mac_less.as_slice() {
        [] => {}
        [(network, spec)] => {
            let mut candidates: Vec<&String> = by_mac
                .values()
                .filter(|device| !claimed.contains_key(device.as_str()))
                .collect();
            candidates.sort();
            match candidates.as_slice() {
                [device] => {
                    debug!("Binding network {} to only candidate {}", network, device);
                    bindings.push(ResolvedBinding {
                        network: *network,
                        spec: *spec,
                        device: device.to_string(),
                    });
                }
                other => {
                    return Err(DerivationError::NoInterfaceAvailable {
                        network: network.to_string(),
                        candidates: other.len(),
                    });
                }
            }
        }
        several => {
            return Err(DerivationError::AmbiguousBinding {
                networks: several.iter().map(|(n, _)| n.to_string()).collect(),
            });
        }
    }

    Ok(bindings)
}

/// Static addresses are known now; DHCP addresses are known only when
/// the settings already carry one.
pub fn broadcast_bindings(configs: &InterfaceConfigurations) -> Vec<AddressBinding> {
    configs
        .configs
        .iter()
        .map(|c| match &c.protocol {
            BootProtocol::Static(a) => AddressBinding::known(&c.device, a.address),
            BootProtocol::Dhcp {
                detected: Some(ip),
            } => AddressBinding::known(&c.device, *ip),
            BootProtocol::Dhcp { detected: None } => AddressBinding::deferred(&c.device),
        })
        .collect()
}
