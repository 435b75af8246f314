use tracing::{info, warn};
use vm_provider::Hypervisor;

/// Undo action for one completed provisioning step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Compensation {
    DeleteVm(String),
}

impl Compensation {
    fn describe(&self) -> String {
        match self {
            Self::DeleteVm(name) => format!("delete VM {name}"),
        }
    }

    async fn run(&self, hypervisor: &dyn Hypervisor) -> Result<(), String> {
        match self {
            Self::DeleteVm(name) => hypervisor
                .delete_vm(name)
                .await
                .map_err(|e| format!("{}: {}", self.describe(), e)),
        }
    }
}

/// Compensations for the steps completed so far, undone newest first.
#[derive(Debug, Default)]
pub(crate) struct CompensationLog {
    completed: Vec<Compensation>,
}

impl CompensationLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, compensation: Compensation) {
        self.completed.push(compensation);
    }

    /// Run every compensation in reverse order, even past a failing one.
    /// Returns the failures, if any.
    pub(crate) async fn unwind(self, hypervisor: &dyn Hypervisor) -> Result<(), Vec<String>> {
        let mut failures = Vec::new();
        for compensation in self.completed.into_iter().rev() {
            match compensation.run(hypervisor).await {
                Ok(()) => info!("Rolled back: {}", compensation.describe()),
                Err(e) => {
                    warn!("Rollback step failed: {}", e);
                    failures.push(e);
                }
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(failures)
        }
    }
}
