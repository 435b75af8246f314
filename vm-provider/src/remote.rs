//! Remote command execution over SSH.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use vm_core::command::{is_tool_installed, run_unchecked};
use vm_core::error::VmError;
use vm_core::validation::validate_hostname;

use crate::error::{ProviderError, Result};

/// Exit status `ssh` itself uses when the connection or authentication fails.
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Runs one shell command on a named host.
///
/// Stateless: no retries, no connection reuse. Callers own idempotency of
/// the commands they send.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run `command` on `host` and return its trimmed stdout.
    async fn run(&self, host: &str, command: &str) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub ssh_path: String,
    pub user: String,
    pub identity_file: Option<PathBuf>,
    pub port: Option<u16>,
    /// Appended to the VM name to form the host, e.g. `.vms.local`.
    pub host_suffix: String,
    pub connect_timeout_secs: u64,
    pub command_timeout_secs: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            ssh_path: "ssh".to_string(),
            user: "ubuntu".to_string(),
            identity_file: None,
            port: None,
            host_suffix: String::new(),
            connect_timeout_secs: 10,
            // Package installation over a slow mirror dominates this budget.
            command_timeout_secs: 900,
        }
    }
}

/// Safely escape a string for a POSIX shell by wrapping it in single quotes
/// and escaping any existing single quotes.
pub fn shell_quote(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '@' | ':'))
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', "'\"'\"'"))
    }
}

pub struct SshExecutor {
    config: SshConfig,
}

impl SshExecutor {
    pub fn new(config: SshConfig) -> Result<Self> {
        if !is_tool_installed(&config.ssh_path) {
            return Err(ProviderError::DependencyNotFound(format!(
                "ssh ({})",
                config.ssh_path
            )));
        }
        Ok(Self { config })
    }

    fn destination(&self, host: &str) -> String {
        format!("{}@{}{}", self.config.user, host, self.config.host_suffix)
    }

    fn ssh_args(&self, host: &str, command: &str) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.config.connect_timeout_secs),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
        ];
        if let Some(identity) = &self.config.identity_file {
            args.push("-i".to_string());
            args.push(identity.to_string_lossy().into_owned());
        }
        if let Some(port) = self.config.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        args.push("--".to_string());
        args.push(self.destination(host));
        args.push(command.to_string());
        args
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(&self, host: &str, command: &str) -> Result<String> {
        let full_host = format!("{}{}", host, self.config.host_suffix);
        validate_hostname(&full_host)?;

        // The command itself may carry credentials; only the host is logged.
        debug!(host = %full_host, "Running remote command");

        let timeout = Duration::from_secs(self.config.command_timeout_secs);
        let output = run_unchecked(&self.config.ssh_path, &self.ssh_args(host, command), timeout)
            .await
            .map_err(|e| match e {
                VmError::Timeout { secs, .. } => ProviderError::RemoteTimeout {
                    host: full_host.clone(),
                    secs,
                },
                VmError::Spawn { source, .. } => ProviderError::Connection {
                    host: full_host.clone(),
                    reason: format!("failed to start ssh: {source}"),
                },
                other => ProviderError::Connection {
                    host: full_host.clone(),
                    reason: other.to_string(),
                },
            })?;

        match output.code {
            Some(0) => Ok(output.stdout.trim().to_string()),
            Some(SSH_CONNECTION_FAILURE) => {
                let stderr = output.stderr.trim();
                Err(ProviderError::Connection {
                    host: full_host,
                    reason: if stderr.is_empty() {
                        format!("ssh exited with status {SSH_CONNECTION_FAILURE}")
                    } else {
                        stderr.to_string()
                    },
                })
            }
            code => Err(ProviderError::RemoteExit {
                host: full_host,
                code,
                stderr: output.stderr.trim().to_string(),
            }),
        }
    }
}
