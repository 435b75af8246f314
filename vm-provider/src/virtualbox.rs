//! VirtualBox backend driven through `VBoxManage`.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, info, warn};
use vm_core::command::{describe_command, is_tool_installed, run_captured};
use vm_core::error::VmError;
use vm_core::validation::validate_vm_name;

use crate::error::{ProviderError, Result};
use crate::hypervisor::{DiskSource, Hypervisor, HypervisorConfig};

const STORAGE_CONTROLLER: &str = "SATA";

static QUOTED_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]*)""#).expect("static regex is valid"));

/// Parse `VBoxManage list vms` output.
///
/// Each line looks like `"name" {uuid}`; the first quoted substring is the
/// name. Blank lines and lines without a quoted substring are skipped.
pub fn parse_vm_list(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| QUOTED_NAME.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|name| name.as_str().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

/// One `VBoxManage` invocation with the label used in error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    operation: &'static str,
    args: Vec<String>,
}

impl Step {
    fn new(operation: &'static str, args: &[&str]) -> Self {
        Self {
            operation,
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }
}

pub struct VirtualBoxHypervisor {
    config: HypervisorConfig,
}

impl VirtualBoxHypervisor {
    pub fn new(config: HypervisorConfig) -> Result<Self> {
        if !is_tool_installed(&config.vboxmanage_path) {
            return Err(ProviderError::DependencyNotFound(format!(
                "VBoxManage ({})",
                config.vboxmanage_path
            )));
        }
        Ok(Self { config })
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.command_timeout_secs)
    }

    fn dedicated_disk_path(&self, name: &str) -> PathBuf {
        self.config.disk_dir.join(format!("{name}.vdi"))
    }

    /// The ordered `VBoxManage` calls that take a VM from Absent to Running.
    fn create_steps(&self, name: &str, disk: &DiskSource) -> Vec<Step> {
        let memory = self.config.memory_mb.to_string();
        let cpus = self.config.cpus.to_string();

        let mut steps = vec![
            Step::new(
                "register VM",
                &["createvm", "--name", name, "--ostype", &self.config.os_type, "--register"],
            ),
            Step::new(
                "configure resources",
                &["modifyvm", name, "--memory", &memory, "--cpus", &cpus, "--nic1", "nat"],
            ),
        ];

        let medium = match disk {
            DiskSource::Dedicated { size_mb } => {
                let path = self.dedicated_disk_path(name).to_string_lossy().into_owned();
                let size = size_mb.to_string();
                steps.push(Step::new(
                    "create disk",
                    &["createmedium", "disk", "--filename", &path, "--size", &size],
                ));
                path
            }
            DiskSource::Shared { image } => {
                let path = image.to_string_lossy().into_owned();
                steps.push(Step::new(
                    "mark shared disk multi-attach",
                    &["modifymedium", "disk", &path, "--type", "multiattach"],
                ));
                path
            }
        };

        steps.push(Step::new(
            "add storage controller",
            &[
                "storagectl",
                name,
                "--name",
                STORAGE_CONTROLLER,
                "--add",
                "sata",
                "--controller",
                "IntelAhci",
            ],
        ));
        steps.push(Step::new(
            "attach disk",
            &[
                "storageattach",
                name,
                "--storagectl",
                STORAGE_CONTROLLER,
                "--port",
                "0",
                "--device",
                "0",
                "--type",
                "hdd",
                "--medium",
                &medium,
            ],
        ));
        steps.push(Step::new("start VM", &["startvm", name, "--type", "headless"]));

        steps
    }

    async fn vboxmanage(&self, step: &Step) -> Result<String> {
        debug!(
            command = %describe_command(&self.config.vboxmanage_path, &step.args),
            "Running {}", step.operation
        );
        run_captured(&self.config.vboxmanage_path, &step.args, self.timeout())
            .await
            .map_err(|e| ProviderError::hypervisor(step.operation, e))
    }
}

#[async_trait]
impl Hypervisor for VirtualBoxHypervisor {
    fn name(&self) -> &'static str {
        "virtualbox"
    }

    async fn create_vm(&self, name: &str, disk: &DiskSource) -> Result<()> {
        validate_vm_name(name)?;
        info!("Creating VirtualBox VM {}", name);

        if matches!(disk, DiskSource::Dedicated { .. }) {
            tokio::fs::create_dir_all(&self.config.disk_dir)
                .await
                .map_err(|e| ProviderError::hypervisor("prepare disk directory", VmError::Io(e)))?;
        }

        for step in self.create_steps(name, disk) {
            self.vboxmanage(&step).await?;
        }

        info!("VM {} is running", name);
        Ok(())
    }

    async fn delete_vm(&self, name: &str) -> Result<()> {
        validate_vm_name(name)?;
        info!("Deleting VirtualBox VM {}", name);

        // A VM that is already stopped (or half-created) must still be deletable.
        let poweroff = Step::new("power off VM", &["controlvm", name, "poweroff"]);
        if let Err(e) = self.vboxmanage(&poweroff).await {
            warn!("Ignoring power-off failure for {}: {}", name, e);
        }

        let unregister = Step::new("unregister VM", &["unregistervm", name, "--delete"]);
        self.vboxmanage(&unregister).await?;

        info!("VM {} deleted", name);
        Ok(())
    }

    async fn list_vms(&self) -> Result<Vec<String>> {
        let output = self.vboxmanage(&Step::new("list VMs", &["list", "vms"])).await?;
        Ok(parse_vm_list(&output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_hypervisor() -> VirtualBoxHypervisor {
        VirtualBoxHypervisor {
            config: HypervisorConfig {
                disk_dir: PathBuf::from("/var/lib/vms"),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_parse_vm_list_skips_blank_and_unquoted_lines() {
        let output = "\"alpha\" {6f1b2c1e-0000-4000-8000-000000000001}\n\
                      \n\
                      \"beta\" {6f1b2c1e-0000-4000-8000-000000000002}\n\
                      \n";
        assert_eq!(parse_vm_list(output), vec!["alpha", "beta"]);

        let noisy = "WARNING: something odd\n\"gamma\" {uuid}\n   \n";
        assert_eq!(parse_vm_list(noisy), vec!["gamma"]);
    }

    #[test]
    fn test_parse_vm_list_empty_output() {
        assert!(parse_vm_list("").is_empty());
        assert!(parse_vm_list("\n\n").is_empty());
    }

    #[test]
    fn test_parse_vm_list_names_with_spaces() {
        assert_eq!(
            parse_vm_list("\"my vm\" {uuid}\n"),
            vec!["my vm".to_string()]
        );
    }

    #[test]
    fn test_create_steps_dedicated_disk() {
        let hv = test_hypervisor();
        let steps = hv.create_steps("db01", &DiskSource::Dedicated { size_mb: 20_000 });

        let ops: Vec<_> = steps.iter().map(|s| s.operation).collect();
        assert_eq!(
            ops,
            vec![
                "register VM",
                "configure resources",
                "create disk",
                "add storage controller",
                "attach disk",
                "start VM"
            ]
        );

        assert_eq!(
            steps[1].args,
            vec!["modifyvm", "db01", "--memory", "1024", "--cpus", "1", "--nic1", "nat"]
        );
        assert_eq!(
            steps[2].args,
            vec![
                "createmedium",
                "disk",
                "--filename",
                "/var/lib/vms/db01.vdi",
                "--size",
                "20000"
            ]
        );
        assert_eq!(steps[4].args.last().unwrap(), "/var/lib/vms/db01.vdi");
        assert_eq!(steps[5].args, vec!["startvm", "db01", "--type", "headless"]);
    }

    #[test]
    fn test_create_steps_shared_disk() {
        let hv = test_hypervisor();
        let steps = hv.create_steps(
            "db02",
            &DiskSource::Shared {
                image: PathBuf::from("/srv/golden.vdi"),
            },
        );

        assert_eq!(steps[2].operation, "mark shared disk multi-attach");
        assert_eq!(
            steps[2].args,
            vec!["modifymedium", "disk", "/srv/golden.vdi", "--type", "multiattach"]
        );
        assert_eq!(steps[4].args.last().unwrap(), "/srv/golden.vdi");
        assert!(!steps
            .iter()
            .any(|s| s.args.first().map(String::as_str) == Some("createmedium")));
    }

    #[test]
    fn test_new_requires_vboxmanage() {
        let config = HypervisorConfig {
            vboxmanage_path: "/nonexistent/VBoxManage".to_string(),
            ..Default::default()
        };
        let err = VirtualBoxHypervisor::new(config).err().expect("should fail");
        assert!(err.to_string().contains("Dependency not found"));
    }
}
