//! Hypervisor, remote execution and database bootstrap adapters.
//!
//! Each adapter sits behind a trait ([`Hypervisor`], [`RemoteExecutor`]) so
//! the orchestrator can be driven by the real VirtualBox/SSH backends in
//! production and by the in-memory mocks in tests.

// Standard library
use std::sync::Arc;

pub mod database;
pub mod error;
pub mod hypervisor;
pub mod remote;
pub mod virtualbox;

// When the `test-helpers` feature is enabled, include the mock backends.
#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;

pub use database::{BootstrapStep, DatabaseBootstrapper, DatabaseCredential, DatabaseEngineConfig};
pub use error::{ProviderError, Result};
pub use hypervisor::{DiskSource, Hypervisor, HypervisorConfig, VmDescriptor, VmState};
pub use remote::{RemoteExecutor, SshConfig, SshExecutor};
pub use virtualbox::VirtualBoxHypervisor;

/// Creates a hypervisor backend based on the configuration.
///
/// # Arguments
/// * `config` - Hypervisor settings; `config.provider` selects the backend
///
/// # Returns
/// A shared backend or an error if the backend is unknown or its tool is missing.
pub fn get_hypervisor(config: HypervisorConfig) -> Result<Arc<dyn Hypervisor>> {
    #[cfg(any(test, feature = "test-helpers"))]
    if config.provider == "mock" {
        return Ok(Arc::new(mock::MockHypervisor::new()));
    }

    match config.provider.as_str() {
        "virtualbox" => Ok(Arc::new(VirtualBoxHypervisor::new(config)?)),
        other => Err(ProviderError::InvalidInput(format!(
            "Unknown hypervisor provider: {other}"
        ))),
    }
}
