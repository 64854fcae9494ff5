use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Result, anyhow};
use serde::Deserialize;

/// Desired networks keyed by logical network name. Ordered so that every
/// sequence derived from it is stable between runs.
pub type Networks = BTreeMap<String, NetworkSpec>;

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    #[default]
    #[serde(alias = "manual", alias = "")]
    Static,
    Dynamic,
    Vip,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DefaultRole {
    Gateway,
    Dns,
}

impl fmt::Display for DefaultRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultRole::Gateway => write!(f, "gateway"),
            DefaultRole::Dns => write!(f, "dns"),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct NetworkSpec {
    #[serde(rename = "type", default)]
    pub network_type: NetworkType,
    pub ip: Option<String>,
    pub netmask: Option<String>,
    pub gateway: Option<String>,
    #[serde(default)]
    pub dns: Vec<String>,
    pub mac: Option<String>,
    #[serde(default)]
    pub default: Vec<DefaultRole>,
}

impl NetworkSpec {
    pub fn is_vip(&self) -> bool {
        self.network_type == NetworkType::Vip
    }

    pub fn is_dynamic(&self) -> bool {
        self.network_type == NetworkType::Dynamic
    }

    pub fn claims(&self, role: DefaultRole) -> bool {
        self.default.contains(&role)
    }

    /// Lower-cased MAC address, or None if the network does not name one.
    pub fn mac_address(&self) -> Option<String> {
        self.mac
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_ascii_lowercase)
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub networks: Networks,
}

impl Settings {
    pub fn from_string(value: &str) -> Result<Self> {
        serde_json::from_str::<Settings>(value)
            .map_err(|e| anyhow!("unable to parse settings: {}", e))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        let f = File::open(p).map_err(|e| anyhow!("unable to open {:?}: {}", p, e))?;
        serde_json::from_reader(BufReader::new(f))
            .map_err(|e| anyhow!("unable to parse settings file {:?}: {}", p, e))
    }
}
