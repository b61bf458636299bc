//! Remote command execution.

use crate::error::SshError;
use std::process::{Command, Stdio};

/// Exit status `ssh` reserves for its own failures.
const SSH_CONNECT_FAILURE: i32 = 255;

/// A managed host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    pub name: String,
    pub address: String,
}

/// What one remote command produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub status: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }
}

/// Runs a shell command on a host.
pub trait SshRunner: Sync {
    fn run(&self, host: &Host, command: &str) -> Result<CommandOutput, SshError>;
}

/// The system `ssh` client in batch mode.
#[derive(Debug, Clone, Default)]
pub struct SystemSsh {
    pub user: Option<String>,
    pub connect_timeout: u32,
}

impl SystemSsh {
    pub fn new(user: Option<String>) -> Self {
        Self {
            user,
            connect_timeout: 10,
        }
    }

    fn target(&self, host: &Host) -> String {
        match &self.user {
            Some(user) => format!("{user}@{}", host.address),
            None => host.address.clone(),
        }
    }
}

impl SshRunner for SystemSsh {
    fn run(&self, host: &Host, command: &str) -> Result<CommandOutput, SshError> {
        let target = self.target(host);
        log::debug!("ssh {target} {command}");
        let output = Command::new("ssh")
            .args(["-o", "BatchMode=yes"])
            .args(["-o", &format!("ConnectTimeout={}", self.connect_timeout)])
            .arg(&target)
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| SshError::Spawn {
                host: host.name.clone(),
                source,
            })?;

        let status = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if status == SSH_CONNECT_FAILURE {
            return Err(SshError::Connection {
                host: host.name.clone(),
                reason: stderr,
            });
        }
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).trim_end().to_string(),
            stderr,
            status,
        })
    }
}
