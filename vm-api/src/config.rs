use std::path::{Path, PathBuf};

use serde::Deserialize;
use vm_core::error::{Result, VmError};
use vm_orchestrator::readiness::MAX_READINESS_TIMEOUT_SECS;
use vm_orchestrator::{OrchestratorConfig, ReadinessPolicy};
use vm_provider::{DatabaseEngineConfig, DiskSource, HypervisorConfig, SshConfig};

/// Hypervisor backend settings plus the disk model for new VMs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HypervisorSection {
    #[serde(flatten)]
    pub backend: HypervisorConfig,
    #[serde(default)]
    pub disk: DiskSource,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_audit_log_path")]
    pub audit_log_path: PathBuf,

    #[serde(default)]
    pub hypervisor: HypervisorSection,

    #[serde(default)]
    pub ssh: SshConfig,

    #[serde(default)]
    pub database: DatabaseEngineConfig,

    #[serde(default)]
    pub readiness: ReadinessPolicy,

    #[serde(default)]
    pub rollback_on_failure: bool,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_audit_log_path() -> PathBuf {
    PathBuf::from("logs").join("activity.log")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            audit_log_path: default_audit_log_path(),
            hypervisor: HypervisorSection::default(),
            ssh: SshConfig::default(),
            database: DatabaseEngineConfig::default(),
            readiness: ReadinessPolicy::default(),
            rollback_on_failure: false,
        }
    }
}

impl Config {
    /// Load the YAML file named by `VM_API_CONFIG` (if set), then apply
    /// `VM_API_BIND` and `VM_API_AUDIT_LOG` on top and validate the result.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match lookup("VM_API_CONFIG") {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        if let Some(bind_addr) = lookup("VM_API_BIND") {
            config.bind_addr = bind_addr;
        }
        if let Some(path) = lookup("VM_API_AUDIT_LOG") {
            config.audit_log_path = PathBuf::from(path);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            VmError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&contents)
            .map_err(|e| VmError::Config(format!("Invalid config {}: {}", path.display(), e)))
    }

    pub fn from_yaml(contents: &str) -> Result<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml_ng::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(VmError::Config(msg.to_string()));

        if self.bind_addr.trim().is_empty() {
            return invalid("bind_addr must not be empty");
        }
        if self.hypervisor.backend.cpus == 0 {
            return invalid("hypervisor.cpus must be at least 1");
        }
        if self.hypervisor.backend.memory_mb == 0 {
            return invalid("hypervisor.memory_mb must be at least 1");
        }
        if self.hypervisor.backend.command_timeout_secs == 0 {
            return invalid("hypervisor.command_timeout_secs must be at least 1");
        }
        if let DiskSource::Dedicated { size_mb: 0 } = self.hypervisor.disk {
            return invalid("hypervisor.disk.size_mb must be at least 1");
        }
        if self.ssh.user.trim().is_empty() {
            return invalid("ssh.user must not be empty");
        }
        if self.ssh.connect_timeout_secs == 0 || self.ssh.command_timeout_secs == 0 {
            return invalid("ssh timeouts must be at least 1 second");
        }
        if self.readiness.timeout_secs == 0 {
            return invalid("readiness.timeout_secs must be at least 1");
        }
        if self.readiness.timeout_secs > MAX_READINESS_TIMEOUT_SECS {
            return Err(VmError::Config(format!(
                "readiness.timeout_secs must be at most {}",
                MAX_READINESS_TIMEOUT_SECS
            )));
        }
        if self.readiness.initial_interval_ms > self.readiness.max_interval_ms {
            return invalid("readiness.initial_interval_ms must not exceed max_interval_ms");
        }
        if self.database.package.trim().is_empty() || self.database.service.trim().is_empty() {
            return invalid("database.package and database.service must not be empty");
        }
        Ok(())
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            disk: self.hypervisor.disk.clone(),
            database: self.database.clone(),
            readiness: self.readiness.clone(),
            rollback_on_failure: self.rollback_on_failure,
        }
    }
}
