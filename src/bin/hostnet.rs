use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use crossbeam::channel::bounded;
use hostnet::arp::ArpingBroadcaster;
use hostnet::cmd::{CmdRunner, HostCmdRunner};
use hostnet::config::AgentConfig;
use hostnet::constants;
use hostnet::fs::{FileSystem, HostFs};
use hostnet::inventory::SysfsInventory;
use hostnet::logger::init_logger;
use hostnet::manager::NetManager;
use hostnet::materialize::ConfigPaths;
use hostnet::network::NetlinkHost;
use hostnet::settings::Settings;
use log::{Level, debug, info};

#[derive(Debug, Parser)]
#[command(name = "hostnet", about = "Reconcile host networking with declared networks")]
struct Cli {
    /// Agent configuration file. Defaults apply when it does not exist.
    #[arg(long, global = true, default_value = constants::FILE_HOSTNET_CONFIG)]
    config: PathBuf,

    /// Log at debug level regardless of the configured level.
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Configure interfaces from a settings file and announce their addresses.
    Setup {
        #[arg(long)]
        settings: PathBuf,
    },
    /// List interfaces that have a configuration file.
    Configured,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // Use eprintln! here in case logger does not initialize.
            eprintln!("hostnet: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = AgentConfig::from_file(&cli.config)
        .with_context(|| format!("unable to load {}", cli.config.display()))?;
    let level = if cli.debug {
        Level::Debug
    } else {
        config.level()?
    };
    init_logger(level).map_err(|e| anyhow!("unable to initialize logger: {}", e))?;
    debug!("Agent config: {:?}", config);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("unable to start async runtime")?;
    let host = Arc::new(NetlinkHost::new(rt.handle().clone()));
    let fs: Arc<dyn FileSystem> = Arc::new(HostFs);
    let cmd: Arc<dyn CmdRunner> = Arc::new(HostCmdRunner);

    let broadcaster = ArpingBroadcaster::new(
        cmd.clone(),
        fs.clone(),
        host.clone(),
        config.sys_class_net.clone(),
    )
    .with_iterations(config.arping_iterations, config.arping_interval())
    .with_interface_wait(config.interface_wait_attempts, Duration::from_millis(100));

    let manager = NetManager::new(
        fs,
        cmd,
        Arc::new(SysfsInventory::new(config.sys_class_net.clone())),
        host,
        Arc::new(broadcaster),
        ConfigPaths::from(&config),
    )
    .with_restart_command(config.restart_command.clone());

    match cli.command {
        Command::Setup { settings } => {
            let settings = Settings::from_file(&settings)?;
            let (tx, rx) = bounded(1);
            manager.setup_networking(&settings.networks, Some(tx))?;
            info!("Networking configured, waiting for address announcements");
            rx.recv()
                .map_err(|_| anyhow!("broadcast task exited without a result"))??;
            info!("Addresses announced");
        }
        Command::Configured => {
            for name in manager.get_configured_network_interfaces()? {
                println!("{}", name);
            }
        }
    }
    Ok(())
}
