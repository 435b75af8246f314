//! Orchestrator wired to in-memory backends.

use std::sync::Arc;

use vm_provider::mock::{MockHypervisor, MockRemoteExecutor};

use crate::audit::MemoryAuditSink;
use crate::orchestrator::{OrchestratorConfig, ProvisioningOrchestrator};
use crate::readiness::ReadinessPolicy;

pub struct TestHarness {
    pub orchestrator: ProvisioningOrchestrator,
    pub hypervisor: Arc<MockHypervisor>,
    pub executor: Arc<MockRemoteExecutor>,
    pub audit: Arc<MemoryAuditSink>,
}

/// Readiness settings that give up after a couple of seconds.
pub fn fast_readiness() -> ReadinessPolicy {
    ReadinessPolicy {
        initial_interval_ms: 10,
        max_interval_ms: 50,
        timeout_secs: 2,
        ..Default::default()
    }
}

pub fn test_config() -> OrchestratorConfig {
    OrchestratorConfig {
        readiness: fast_readiness(),
        ..Default::default()
    }
}

/// Build an orchestrator over fresh mocks.
pub fn create_test_orchestrator(config: OrchestratorConfig) -> TestHarness {
    create_test_orchestrator_with(MockHypervisor::new(), config)
}

/// Build an orchestrator over a pre-populated hypervisor.
pub fn create_test_orchestrator_with(
    hypervisor: MockHypervisor,
    config: OrchestratorConfig,
) -> TestHarness {
    let hypervisor = Arc::new(hypervisor);
    let executor = Arc::new(MockRemoteExecutor::new());
    let audit = Arc::new(MemoryAuditSink::new());

    let orchestrator = ProvisioningOrchestrator::new(
        hypervisor.clone(),
        executor.clone(),
        audit.clone(),
        config,
    );

    TestHarness {
        orchestrator,
        hypervisor,
        executor,
        audit,
    }
}
