use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use crossbeam::channel::unbounded;
use crossbeam::sync::WaitGroup;
use log::{debug, error, info};

use crate::backoff::RetryBackoff;
use crate::cmd::CmdRunner;
use crate::constants::EXE_ARPING;
use crate::fs::FileSystem;
use crate::ip::IpResolver;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AddressSource {
    Known(Ipv4Addr),
    /// Assigned by DHCP; looked up when the announcement is made.
    Deferred,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddressBinding {
    pub interface: String,
    pub source: AddressSource,
}

impl AddressBinding {
    pub fn known<S: Into<String>>(interface: S, ip: Ipv4Addr) -> Self {
        Self {
            interface: interface.into(),
            source: AddressSource::Known(ip),
        }
    }

    pub fn deferred<S: Into<String>>(interface: S) -> Self {
        Self {
            interface: interface.into(),
            source: AddressSource::Deferred,
        }
    }
}

/// Announces interface addresses to the local segment.
pub trait AddressBroadcaster: Send + Sync {
    /// Announce every binding and return the first failure, if any.
    fn broadcast(&self, bindings: Vec<AddressBinding>) -> Result<()>;
}

/// Sends gratuitous ARP with `arping`, one thread per interface.
#[derive(Clone)]
pub struct ArpingBroadcaster {
    cmd: Arc<dyn CmdRunner>,
    fs: Arc<dyn FileSystem>,
    resolver: Arc<dyn IpResolver>,
    sys_class_net: PathBuf,
    iterations: u32,
    interval: Duration,
    wait_attempts: u32,
    wait_base: Duration,
}

impl ArpingBroadcaster {
    pub fn new<P: Into<PathBuf>>(
        cmd: Arc<dyn CmdRunner>,
        fs: Arc<dyn FileSystem>,
        resolver: Arc<dyn IpResolver>,
        sys_class_net: P,
    ) -> Self {
        Self {
            cmd,
            fs,
            resolver,
            sys_class_net: sys_class_net.into(),
            iterations: 6,
            interval: Duration::from_secs(5),
            wait_attempts: 20,
            wait_base: Duration::from_millis(100),
        }
    }

    pub fn with_iterations(mut self, iterations: u32, interval: Duration) -> Self {
        self.iterations = iterations.max(1);
        self.interval = interval;
        self
    }

    pub fn with_interface_wait(mut self, attempts: u32, base: Duration) -> Self {
        self.wait_attempts = attempts;
        self.wait_base = base;
        self
    }

    fn wait_for_interface(&self, interface: &str) -> Result<()> {
        let path = self.sys_class_net.join(interface);
        let mut backoff = RetryBackoff::new(self.wait_base, Duration::from_secs(2));
        loop {
            if self.fs.exists(&path) {
                return Ok(());
            }
            if backoff.attempt() >= self.wait_attempts {
                return Err(anyhow!(
                    "interface {} did not appear after {} attempts",
                    interface,
                    self.wait_attempts
                ));
            }
            debug!("Waiting for interface {}", interface);
            backoff.wait();
        }
    }

    fn resolve(&self, binding: &AddressBinding) -> Result<Ipv4Addr> {
        match binding.source {
            AddressSource::Known(ip) => Ok(ip),
            AddressSource::Deferred => self
                .resolver
                .primary_ipv4(&binding.interface)
                .with_context(|| format!("unable to resolve address of {}", binding.interface)),
        }
    }

    fn announce(&self, binding: &AddressBinding) -> Result<()> {
        self.wait_for_interface(&binding.interface)?;
        let ip = self.resolve(binding)?;
        let command = arping_command(&binding.interface, ip);
        for i in 0..self.iterations {
            self.cmd
                .run(&command)
                .with_context(|| format!("unable to announce {} on {}", ip, binding.interface))?;
            if i + 1 < self.iterations {
                thread::sleep(self.interval);
            }
        }
        info!("Announced {} on {}", ip, binding.interface);
        Ok(())
    }
}

fn arping_command(interface: &str, ip: Ipv4Addr) -> Vec<String> {
    [EXE_ARPING, "-c", "1", "-U", "-I", interface]
        .iter()
        .map(|s| s.to_string())
        .chain([ip.to_string()])
        .collect()
}

impl AddressBroadcaster for ArpingBroadcaster {
    fn broadcast(&self, bindings: Vec<AddressBinding>) -> Result<()> {
        let wait_group = WaitGroup::new();
        let (err_tx, err_rx) = unbounded::<anyhow::Error>();

        for binding in bindings {
            let broadcaster = self.clone();
            let wg = wait_group.clone();
            let tx = err_tx.clone();
            thread::spawn(move || {
                if let Err(e) = broadcaster.announce(&binding) {
                    error!("Failed to announce {}: {:#}", binding.interface, e);
                    let _ = tx.send(e);
                }
                drop(wg);
            });
        }
        drop(err_tx);

        wait_group.wait();
        match err_rx.try_recv() {
            Ok(e) => Err(e),
            Err(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::fakes::{FakeCmdRunner, FakeFs, FakeResolver};

    struct Fixture {
        cmd: Arc<FakeCmdRunner>,
        fs: Arc<FakeFs>,
        resolver: Arc<FakeResolver>,
        broadcaster: ArpingBroadcaster,
    }

    fn fixture(iterations: u32) -> Fixture {
        let cmd = Arc::new(FakeCmdRunner::default());
        let fs = Arc::new(FakeFs::default());
        let resolver = Arc::new(FakeResolver::default());
        let broadcaster = ArpingBroadcaster::new(
            cmd.clone(),
            fs.clone(),
            resolver.clone(),
            "/sys/class/net",
        )
        .with_iterations(iterations, Duration::ZERO)
        .with_interface_wait(2, Duration::from_millis(1));
        Fixture {
            cmd,
            fs,
            resolver,
            broadcaster,
        }
    }

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    fn sorted(mut commands: Vec<Vec<String>>) -> Vec<Vec<String>> {
        commands.sort();
        commands
    }

    #[test]
    fn test_arping_command() {
        assert_eq!(
            vec!["arping", "-c", "1", "-U", "-I", "eth0", "10.0.0.1"],
            arping_command("eth0", ip("10.0.0.1"))
        );
    }

    #[test]
    fn test_broadcast_known_and_deferred() {
        let f = fixture(2);
        f.fs.put("/sys/class/net/ethstatic", "");
        f.fs.put("/sys/class/net/ethdhcp", "");
        f.resolver.set("ethdhcp", "10.0.0.50");

        f.broadcaster
            .broadcast(vec![
                AddressBinding::known("ethstatic", ip("1.2.3.4")),
                AddressBinding::deferred("ethdhcp"),
            ])
            .unwrap();

        let dhcp = arping_command("ethdhcp", ip("10.0.0.50"));
        let stat = arping_command("ethstatic", ip("1.2.3.4"));
        assert_eq!(
            vec![dhcp.clone(), dhcp, stat.clone(), stat],
            sorted(f.cmd.commands())
        );
        assert_eq!(vec!["ethdhcp".to_string()], f.resolver.lookups());
    }

    #[test]
    fn test_broadcast_nothing() {
        let f = fixture(1);
        f.broadcaster.broadcast(vec![]).unwrap();
        assert!(f.cmd.commands().is_empty());
    }

    #[test]
    fn test_broadcast_reports_failure_after_all_finish() {
        let f = fixture(3);
        f.fs.put("/sys/class/net/eth0", "");
        f.fs.put("/sys/class/net/eth1", "");
        f.cmd.fail_matching("eth1", "arping exploded");

        let err = f
            .broadcaster
            .broadcast(vec![
                AddressBinding::known("eth0", ip("10.0.0.1")),
                AddressBinding::known("eth1", ip("10.0.0.2")),
            ])
            .unwrap_err();

        assert_eq!(
            "unable to announce 10.0.0.2 on eth1: arping exploded",
            format!("{:#}", err)
        );
        let eth0_runs = f
            .cmd
            .commands()
            .iter()
            .filter(|c| c.contains(&"eth0".to_string()))
            .count();
        assert_eq!(3, eth0_runs);
    }

    #[test]
    fn test_broadcast_unresolvable_address() {
        let f = fixture(1);
        f.fs.put("/sys/class/net/ethdhcp", "");
        let err = f
            .broadcaster
            .broadcast(vec![AddressBinding::deferred("ethdhcp")])
            .unwrap_err();
        assert_eq!("unable to resolve address of ethdhcp", err.to_string());
        assert!(f.cmd.commands().is_empty());
    }

    #[test]
    fn test_broadcast_missing_interface() {
        let f = fixture(1);
        let err = f
            .broadcaster
            .broadcast(vec![AddressBinding::known("eth9", ip("10.0.0.9"))])
            .unwrap_err();
        assert_eq!(
            "interface eth9 did not appear after 2 attempts",
            err.to_string()
        );
    }
}
