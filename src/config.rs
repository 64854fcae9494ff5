use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, anyhow};
use log::Level;
use serde::Deserialize;

use crate::constants;

/// Agent configuration for the networking subsystem. Every key is optional
/// in the YAML file and falls back to the CentOS-style layout.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct AgentConfig {
    pub log_level: String,
    pub ifcfg_dir: PathBuf,
    pub dhclient_conf: PathBuf,
    pub dhclient_dir: PathBuf,
    pub resolv_conf: PathBuf,
    pub sys_class_net: PathBuf,
    pub restart_command: Vec<String>,
    pub arping_iterations: u32,
    pub arping_interval_ms: u64,
    pub interface_wait_attempts: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            ifcfg_dir: PathBuf::from(constants::DIR_IFCFG),
            dhclient_conf: PathBuf::from(constants::FILE_DHCLIENT_CONF),
            dhclient_dir: PathBuf::from(constants::DIR_DHCP),
            resolv_conf: PathBuf::from(constants::FILE_ETC_RESOLV_CONF),
            sys_class_net: PathBuf::from(constants::DIR_SYS_CLASS_NET),
            restart_command: vec!["service".into(), "network".into(), "restart".into()],
            arping_iterations: 6,
            arping_interval_ms: 5000,
            interface_wait_attempts: 20,
        }
    }
}

impl AgentConfig {
    pub fn from_string(value: &str) -> Result<Self> {
        if value.trim().is_empty() {
            return Ok(Self::default());
        }
        let config = serde_yaml2::from_str::<AgentConfig>(value)
            .map_err(|e| anyhow!("unable to parse agent config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the config file, treating a missing file as all defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let p = path.as_ref();
        match fs::read_to_string(p) {
            Ok(s) => Self::from_string(&s),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(anyhow!("unable to read {:?}: {}", p, e)),
        }
    }

    pub fn level(&self) -> Result<Level> {
        self.log_level
            .parse::<Level>()
            .map_err(|_| anyhow!("invalid log level {}", self.log_level))
    }

    pub fn arping_interval(&self) -> Duration {
        Duration::from_millis(self.arping_interval_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.restart_command.is_empty() {
            return Err(anyhow!("restart-command cannot be empty"));
        }
        if self.arping_iterations == 0 {
            return Err(anyhow!("arping-iterations must be at least 1"));
        }
        self.level()?;
        Ok(())
    }
}
