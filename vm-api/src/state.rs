use vm_orchestrator::ProvisioningOrchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: ProvisioningOrchestrator,
}

impl AppState {
    pub fn new(orchestrator: ProvisioningOrchestrator) -> Self {
        Self { orchestrator }
    }
}
