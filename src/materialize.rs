use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use log::{debug, info};

use crate::config::AgentConfig;
use crate::constants;
use crate::fs::FileSystem;
use crate::interface_config::{BootProtocol, InterfaceConfiguration, InterfaceConfigurations};

const DHCLIENT_CONF_HEADER: &str = r#"# Generated by hostnet

option rfc3442-classless-static-routes code 121 = array of unsigned integer 8;

send host-name "<hostname>";

request subnet-mask, broadcast-address, time-offset, routers,
	domain-name, domain-name-servers, domain-search, host-name,
	netbios-name-servers, netbios-scope, interface-mtu,
	rfc3442-classless-static-routes, ntp-servers;

"#;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigPaths {
    pub ifcfg_dir: PathBuf,
    pub dhclient_conf: PathBuf,
    pub dhclient_dir: PathBuf,
    pub resolv_conf: PathBuf,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self {
            ifcfg_dir: PathBuf::from(constants::DIR_IFCFG),
            dhclient_conf: PathBuf::from(constants::FILE_DHCLIENT_CONF),
            dhclient_dir: PathBuf::from(constants::DIR_DHCP),
            resolv_conf: PathBuf::from(constants::FILE_ETC_RESOLV_CONF),
        }
    }
}

impl From<&AgentConfig> for ConfigPaths {
    fn from(config: &AgentConfig) -> Self {
        Self {
            ifcfg_dir: config.ifcfg_dir.clone(),
            dhclient_conf: config.dhclient_conf.clone(),
            dhclient_dir: config.dhclient_dir.clone(),
            resolv_conf: config.resolv_conf.clone(),
        }
    }
}

impl ConfigPaths {
    pub fn ifcfg(&self, device: &str) -> PathBuf {
        self.ifcfg_dir
            .join(format!("{}{}", constants::PREFIX_IFCFG, device))
    }

    pub fn dhclient_link(&self, device: &str) -> PathBuf {
        self.dhclient_dir
            .join(format!("{}{}.conf", constants::PREFIX_DHCLIENT, device))
    }
}

/// A rendered file and where it belongs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigFile {
    pub path: PathBuf,
    pub contents: String,
}

pub fn render_ifcfg(config: &InterfaceConfiguration) -> String {
    let mut lines = vec![format!("DEVICE={}", config.device)];
    match &config.protocol {
        BootProtocol::Static(address) => {
            lines.push("BOOTPROTO=static".into());
            lines.push(format!("IPADDR={}", address.address));
            lines.push(format!("NETMASK={}", address.netmask));
            lines.push(format!("BROADCAST={}", address.broadcast));
            if let Some(gateway) = config.gateway {
                lines.push(format!("GATEWAY={}", gateway));
            }
            lines.push("ONBOOT=yes".into());
            lines.push("PEERDNS=no".into());
            for (i, server) in config.dns.iter().enumerate() {
                lines.push(format!("DNS{}={}", i + 1, server));
            }
        }
        BootProtocol::Dhcp { .. } => {
            lines.push("BOOTPROTO=dhcp".into());
            lines.push("ONBOOT=yes".into());
            lines.push("PEERDNS=yes".into());
        }
    }
    lines.join("\n") + "\n"
}

pub fn render_dhclient_conf(dns: &[IpAddr]) -> String {
    let mut contents = DHCLIENT_CONF_HEADER.to_string();
    if !dns.is_empty() {
        let servers: Vec<String> = dns.iter().map(IpAddr::to_string).collect();
        contents.push_str(&format!(
            "prepend domain-name-servers {};\n",
            servers.join(", ")
        ));
    }
    contents
}

pub fn render_resolv_conf(dns: &[IpAddr]) -> String {
    dns.iter()
        .map(|server| format!("nameserver {}\n", server))
        .collect()
}

/// Writes derived configuration to disk, touching only files whose
/// content changes.
#[derive(Clone)]
pub struct ConfigMaterializer {
    fs: Arc<dyn FileSystem>,
    paths: ConfigPaths,
}

impl ConfigMaterializer {
    pub fn new(fs: Arc<dyn FileSystem>, paths: ConfigPaths) -> Self {
        Self { fs, paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    fn interface_files(&self, configs: &InterfaceConfigurations) -> Vec<ConfigFile> {
        configs
            .configs
            .iter()
            .map(|c| ConfigFile {
                path: self.paths.ifcfg(&c.device),
                contents: render_ifcfg(c),
            })
            .collect()
    }

    fn dhclient_file(&self, configs: &InterfaceConfigurations) -> Option<ConfigFile> {
        configs.has_dhcp().then(|| ConfigFile {
            path: self.paths.dhclient_conf.clone(),
            contents: render_dhclient_conf(&configs.dns),
        })
    }

    fn resolver_file(&self, configs: &InterfaceConfigurations) -> Option<ConfigFile> {
        (!configs.dns.is_empty()).then(|| ConfigFile {
            path: self.paths.resolv_conf.clone(),
            contents: render_resolv_conf(&configs.dns),
        })
    }

    /// Every file the configuration set maps to, without touching disk.
    pub fn render(&self, configs: &InterfaceConfigurations) -> Vec<ConfigFile> {
        let mut files = self.interface_files(configs);
        files.extend(self.dhclient_file(configs));
        files.extend(self.resolver_file(configs));
        files
    }

    fn converge(&self, file: &ConfigFile) -> Result<bool> {
        let changed = self
            .fs
            .converge(&file.path, &file.contents)
            .with_context(|| format!("unable to write {}", file.path.display()))?;
        if changed {
            info!("Updated {}", file.path.display());
        }
        Ok(changed)
    }

    fn link_dhclient_conf(&self, configs: &InterfaceConfigurations) -> Result<()> {
        for config in configs.dhcps() {
            let link = self.paths.dhclient_link(&config.device);
            debug!(
                "Linking {} to {}",
                link.display(),
                self.paths.dhclient_conf.display()
            );
            self.fs
                .symlink(&self.paths.dhclient_conf, &link)
                .with_context(|| {
                    format!(
                        "unable to link {} to {}",
                        link.display(),
                        self.paths.dhclient_conf.display()
                    )
                })?;
        }
        Ok(())
    }

    /// Converge all files. Returns true if any file content changed.
    pub fn write(&self, configs: &InterfaceConfigurations) -> Result<bool> {
        let mut changed = false;
        for file in self.interface_files(configs) {
            changed |= self.converge(&file)?;
        }
        if let Some(file) = self.dhclient_file(configs) {
            changed |= self.converge(&file)?;
            self.link_dhclient_conf(configs)?;
        }
        if let Some(file) = self.resolver_file(configs) {
            changed |= self.converge(&file)?;
        }
        Ok(changed)
    }
}
