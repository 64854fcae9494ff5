use std::process::Command;

use anyhow::{Result, anyhow};
use log::debug;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CmdOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external programs. `command[0]` is the executable.
pub trait CmdRunner: Send + Sync {
    fn run(&self, command: &[String]) -> Result<CmdOutput>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HostCmdRunner;

impl CmdRunner for HostCmdRunner {
    fn run(&self, command: &[String]) -> Result<CmdOutput> {
        let (exe, args) = command
            .split_first()
            .ok_or_else(|| anyhow!("empty command"))?;
        debug!("Running {:?}", command);
        let output = Command::new(exe)
            .args(args)
            .output()
            .map_err(|e| anyhow!("unable to run {}: {}", exe, e))?;
        let result = CmdOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        match output.status.code() {
            Some(0) => Ok(result),
            Some(code) => Err(anyhow!(
                "{} failed with exit code {}: {}",
                exe,
                code,
                result.stderr.trim()
            )),
            None => Err(anyhow!("{} terminated by signal", exe)),
        }
    }
}
