use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Result, anyhow};

use crate::arp::{AddressBinding, AddressBroadcaster};
use crate::cmd::{CmdOutput, CmdRunner};
use crate::fs::FileSystem;
use crate::inventory::{PhysicalInterface, PhysicalInterfaceInventory};
use crate::ip::{AddressTable, HostAddress, IpResolver};

#[derive(Debug, Default)]
struct FakeFsState {
    files: HashMap<PathBuf, String>,
    symlinks: HashMap<PathBuf, PathBuf>,
    write_error: Option<String>,
    write_errors: HashMap<PathBuf, String>,
    symlink_error: Option<String>,
    // Writes to these paths succeed but are not kept, as if another
    // daemon owned the file.
    discarded: HashSet<PathBuf>,
    writes: Vec<PathBuf>,
}

#[derive(Debug, Default)]
pub(crate) struct FakeFs {
    state: Mutex<FakeFsState>,
}

impl FakeFs {
    pub(crate) fn put<P: AsRef<Path>>(&self, path: P, contents: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .files
            .insert(path.as_ref().to_path_buf(), contents.to_string());
    }

    pub(crate) fn contents<P: AsRef<Path>>(&self, path: P) -> Option<String> {
        self.state.lock().unwrap().files.get(path.as_ref()).cloned()
    }

    pub(crate) fn symlink_target<P: AsRef<Path>>(&self, path: P) -> Option<PathBuf> {
        self.state
            .lock()
            .unwrap()
            .symlinks
            .get(path.as_ref())
            .cloned()
    }

    pub(crate) fn fail_writes(&self, message: &str) {
        self.state.lock().unwrap().write_error = Some(message.into());
    }

    pub(crate) fn fail_writes_to<P: AsRef<Path>>(&self, path: P, message: &str) {
        self.state
            .lock()
            .unwrap()
            .write_errors
            .insert(path.as_ref().to_path_buf(), message.into());
    }

    pub(crate) fn fail_symlinks(&self, message: &str) {
        self.state.lock().unwrap().symlink_error = Some(message.into());
    }

    pub(crate) fn discard_writes_to<P: AsRef<Path>>(&self, path: P) {
        self.state
            .lock()
            .unwrap()
            .discarded
            .insert(path.as_ref().to_path_buf());
    }

    pub(crate) fn writes(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().writes.clone()
    }
}

impl FileSystem for FakeFs {
    fn read_to_string(&self, path: &Path) -> Result<Option<String>> {
        let state = self.state.lock().unwrap();
        let resolved = state.symlinks.get(path).map(PathBuf::as_path).unwrap_or(path);
        Ok(state.files.get(resolved).cloned())
    }

    fn write(&self, path: &Path, contents: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(e) = state.write_errors.get(path) {
            return Err(anyhow!("{}", e));
        }
        if let Some(e) = &state.write_error {
            return Err(anyhow!("{}", e));
        }
        state.writes.push(path.to_path_buf());
        if !state.discarded.contains(path) {
            state.files.insert(path.to_path_buf(), contents.to_string());
        }
        Ok(())
    }

    fn symlink(&self, target: &Path, link: &Path) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(e) = &state.symlink_error {
            return Err(anyhow!("{}", e));
        }
        state
            .symlinks
            .insert(link.to_path_buf(), target.to_path_buf());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        let state = self.state.lock().unwrap();
        state.files.contains_key(path) || state.symlinks.contains_key(path)
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeCmdRunner {
    commands: Mutex<Vec<Vec<String>>>,
    failures: Mutex<Vec<(String, String)>>,
}

impl FakeCmdRunner {
    pub(crate) fn commands(&self) -> Vec<Vec<String>> {
        self.commands.lock().unwrap().clone()
    }

    /// Fail any command whose joined arguments contain `pattern`.
    pub(crate) fn fail_matching(&self, pattern: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .push((pattern.into(), message.into()));
    }
}

impl CmdRunner for FakeCmdRunner {
    fn run(&self, command: &[String]) -> Result<CmdOutput> {
        self.commands.lock().unwrap().push(command.to_vec());
        let joined = command.join(" ");
        let failures = self.failures.lock().unwrap();
        if let Some((_, message)) = failures.iter().find(|(p, _)| joined.contains(p.as_str())) {
            return Err(anyhow!("{}", message));
        }
        Ok(CmdOutput::default())
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeInventory {
    interfaces: Mutex<Vec<PhysicalInterface>>,
    error: Mutex<Option<String>>,
}

impl FakeInventory {
    /// Physical interfaces given as (name, mac) pairs.
    pub(crate) fn with_interfaces(interfaces: &[(&str, &str)]) -> Self {
        let inventory = Self::default();
        inventory.set_interfaces(interfaces);
        inventory
    }

    pub(crate) fn set_interfaces(&self, interfaces: &[(&str, &str)]) {
        *self.interfaces.lock().unwrap() = interfaces
            .iter()
            .map(|(name, mac)| PhysicalInterface {
                name: name.to_string(),
                mac: Some(mac.to_string()),
                is_physical: true,
            })
            .collect();
    }

    pub(crate) fn add_virtual(&self, name: &str, mac: &str) {
        self.interfaces.lock().unwrap().push(PhysicalInterface {
            name: name.into(),
            mac: Some(mac.into()),
            is_physical: false,
        });
    }

    pub(crate) fn fail(&self, message: &str) {
        *self.error.lock().unwrap() = Some(message.into());
    }
}

impl PhysicalInterfaceInventory for FakeInventory {
    fn interfaces(&self) -> Result<Vec<PhysicalInterface>> {
        if let Some(e) = self.error.lock().unwrap().as_ref() {
            return Err(anyhow!("{}", e));
        }
        Ok(self.interfaces.lock().unwrap().clone())
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeAddressTable {
    addresses: Mutex<Vec<HostAddress>>,
    error: Mutex<Option<String>>,
}

impl FakeAddressTable {
    pub(crate) fn set(&self, addresses: &[(&str, &str)]) {
        *self.addresses.lock().unwrap() = addresses
            .iter()
            .map(|(iface, ip)| HostAddress::new(*iface, ip.parse().unwrap()))
            .collect();
    }

    pub(crate) fn fail(&self, message: &str) {
        *self.error.lock().unwrap() = Some(message.into());
    }
}

impl AddressTable for FakeAddressTable {
    fn addresses(&self) -> Result<Vec<HostAddress>> {
        if let Some(e) = self.error.lock().unwrap().as_ref() {
            return Err(anyhow!("{}", e));
        }
        Ok(self.addresses.lock().unwrap().clone())
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeResolver {
    addresses: Mutex<HashMap<String, Ipv4Addr>>,
    lookups: Mutex<Vec<String>>,
}

impl FakeResolver {
    pub(crate) fn set(&self, interface: &str, ip: &str) {
        self.addresses
            .lock()
            .unwrap()
            .insert(interface.into(), ip.parse().unwrap());
    }

    pub(crate) fn lookups(&self) -> Vec<String> {
        self.lookups.lock().unwrap().clone()
    }
}

impl IpResolver for FakeResolver {
    fn primary_ipv4(&self, interface: &str) -> Result<Ipv4Addr> {
        self.lookups.lock().unwrap().push(interface.into());
        self.addresses
            .lock()
            .unwrap()
            .get(interface)
            .copied()
            .ok_or_else(|| anyhow!("no IPv4 address found on interface {}", interface))
    }
}

#[derive(Debug, Default)]
pub(crate) struct FakeBroadcaster {
    calls: Mutex<Vec<Vec<AddressBinding>>>,
    error: Mutex<Option<String>>,
}

impl FakeBroadcaster {
    pub(crate) fn calls(&self) -> Vec<Vec<AddressBinding>> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn fail(&self, message: &str) {
        *self.error.lock().unwrap() = Some(message.into());
    }
}

impl AddressBroadcaster for FakeBroadcaster {
    fn broadcast(&self, bindings: Vec<AddressBinding>) -> Result<()> {
        self.calls.lock().unwrap().push(bindings);
        match self.error.lock().unwrap().as_ref() {
            Some(e) => Err(anyhow!("{}", e)),
            None => Ok(()),
        }
    }
}
