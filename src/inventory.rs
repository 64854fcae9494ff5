use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::{self, File};
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use log::{debug, warn};
use rustix::fs::Dir;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PhysicalInterface {
    pub name: String,
    pub mac: Option<String>,
    pub is_physical: bool,
}

pub trait PhysicalInterfaceInventory: Send + Sync {
    /// Every interface the host reports, physical or not, sorted by name.
    fn interfaces(&self) -> Result<Vec<PhysicalInterface>>;

    /// MAC address to interface name, for physical interfaces only.
    fn detect(&self) -> Result<HashMap<String, String>> {
        let mut by_mac = HashMap::new();
        for interface in self.interfaces()? {
            debug!(
                "Interface {}: physical={}, mac={:?}",
                interface.name, interface.is_physical, interface.mac
            );
            if !interface.is_physical {
                continue;
            }
            let Some(mac) = interface.mac else {
                continue;
            };
            match by_mac.entry(mac) {
                Entry::Vacant(v) => {
                    v.insert(interface.name);
                }
                Entry::Occupied(o) => warn!(
                    "Interfaces {} and {} share MAC {}, using {}",
                    o.get(),
                    interface.name,
                    o.key(),
                    o.get()
                ),
            }
        }
        Ok(by_mac)
    }
}

/// Reads interfaces from sysfs. An interface counts as physical when the
/// kernel exposes a backing device for it.
#[derive(Clone, Debug)]
pub struct SysfsInventory {
    dir: PathBuf,
}

impl SysfsInventory {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    fn read_mac(&self, name: &str) -> Option<String> {
        let path = self.dir.join(name).join("address");
        match fs::read_to_string(&path) {
            Ok(s) => Some(s.trim().to_ascii_lowercase()).filter(|m| !m.is_empty()),
            Err(e) => {
                warn!("Unable to read MAC address of {}: {}", name, e);
                None
            }
        }
    }
}

impl PhysicalInterfaceInventory for SysfsInventory {
    fn interfaces(&self) -> Result<Vec<PhysicalInterface>> {
        let dir_str = self.dir.display();
        let dir_fd =
            File::open(&self.dir).map_err(|e| anyhow!("unable to open {}: {}", dir_str, e))?;
        let dir = Dir::read_from(dir_fd)
            .map_err(|e| anyhow!("unable to read from directory {}: {}", dir_str, e))?;

        let mut interfaces = Vec::new();
        for entry_res in dir {
            let entry = entry_res
                .map_err(|e| anyhow!("unable to read directory entry in {}: {}", dir_str, e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            if name == "." || name == ".." {
                continue;
            }
            let is_physical = self.dir.join(&name).join("device").exists();
            let mac = if is_physical {
                self.read_mac(&name)
            } else {
                None
            };
            interfaces.push(PhysicalInterface {
                name,
                mac,
                is_physical,
            });
        }
        interfaces.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(interfaces)
    }
}
