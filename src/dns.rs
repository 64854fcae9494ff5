use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use log::debug;

use crate::fs::FileSystem;

/// Checks that the resolver file the host actually uses lists the
/// nameservers we expect.
#[derive(Clone)]
pub struct DnsValidator {
    fs: Arc<dyn FileSystem>,
    resolv_conf: PathBuf,
}

impl DnsValidator {
    pub fn new<P: Into<PathBuf>>(fs: Arc<dyn FileSystem>, resolv_conf: P) -> Self {
        Self {
            fs,
            resolv_conf: resolv_conf.into(),
        }
    }

    pub fn validate(&self, expected: &[IpAddr]) -> Result<()> {
        if expected.is_empty() {
            return Ok(());
        }
        let path = self.resolv_conf.display();
        let contents = self
            .fs
            .read_to_string(&self.resolv_conf)
            .with_context(|| format!("unable to read {}", path))?
            .ok_or_else(|| anyhow!("{} does not exist", path))?;
        let configured = parse_nameservers(&contents);
        debug!("Nameservers in {}: {:?}", path, configured);

        let missing: Vec<String> = expected
            .iter()
            .filter(|ns| !configured.contains(ns))
            .map(|ns| ns.to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(anyhow!(
                "nameservers {} not found in {}",
                missing.join(", "),
                path
            ))
        }
    }
}

/// Nameserver addresses from resolv.conf content, in file order. Lines that
/// are comments or do not hold an address are ignored.
pub fn parse_nameservers(contents: &str) -> Vec<IpAddr> {
    contents
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some("nameserver"), Some(addr)) => addr.parse().ok(),
                _ => None,
            }
        })
        .collect()
}
