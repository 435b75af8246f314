//! Hypervisor lifecycle contract.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Lifecycle state of a VM as reported by the hypervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VmState {
    Absent,
    Created,
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmDescriptor {
    pub name: String,
    pub state: VmState,
}

/// Where a new VM's disk comes from.
///
/// `Dedicated` creates a fresh image per VM; `Shared` mounts one golden image
/// into every VM as a multi-attach volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DiskSource {
    Dedicated {
        #[serde(default = "default_disk_size_mb")]
        size_mb: u64,
    },
    Shared {
        image: PathBuf,
    },
}

fn default_disk_size_mb() -> u64 {
    10_000
}

impl Default for DiskSource {
    fn default() -> Self {
        Self::Dedicated {
            size_mb: default_disk_size_mb(),
        }
    }
}

/// Settings for the hypervisor backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HypervisorConfig {
    /// Backend name: `virtualbox`, or `mock` with the `test-helpers` feature.
    pub provider: String,
    pub vboxmanage_path: String,
    pub os_type: String,
    pub cpus: u32,
    pub memory_mb: u32,
    /// Directory for per-VM disk images in `dedicated` mode.
    pub disk_dir: PathBuf,
    pub command_timeout_secs: u64,
}

impl Default for HypervisorConfig {
    fn default() -> Self {
        Self {
            provider: "virtualbox".to_string(),
            vboxmanage_path: "VBoxManage".to_string(),
            os_type: "Ubuntu_64".to_string(),
            cpus: 1,
            memory_mb: 1024,
            disk_dir: PathBuf::from("disks"),
            command_timeout_secs: 120,
        }
    }
}

/// Lifecycle operations against the local virtualization control plane.
///
/// Every call is independent and reports its own outcome; implementations
/// keep no cache of VM state.
#[async_trait]
pub trait Hypervisor: Send + Sync {
    /// Get the name of the backend (e.g., "virtualbox").
    fn name(&self) -> &'static str;

    /// Register, configure, attach storage to and start a new VM.
    ///
    /// Stops at the first failing step. Steps that already succeeded are not
    /// undone.
    async fn create_vm(&self, name: &str, disk: &DiskSource) -> Result<()>;

    /// Power off (best effort) and unregister a VM, deleting its files.
    async fn delete_vm(&self, name: &str) -> Result<()>;

    /// Names of all registered VMs, in the hypervisor's listing order.
    async fn list_vms(&self) -> Result<Vec<String>>;
}
