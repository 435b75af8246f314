//! The provisioning workflows.
//!
//! Each public operation runs one workflow to completion and folds its
//! result into a [`WorkflowOutcome`]. Steps run strictly in order and the
//! first failure ends the workflow. Nothing is undone on failure unless
//! `rollback_on_failure` is set.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, instrument, warn};
use vm_core::validation::validate_vm_name;
use vm_provider::{
    DatabaseBootstrapper, DatabaseCredential, DatabaseEngineConfig, DiskSource, Hypervisor,
    RemoteExecutor,
};

use crate::audit::{AuditRecord, AuditSink};
use crate::compensation::{Compensation, CompensationLog};
use crate::error::{Result, WorkflowError};
use crate::inflight::{InFlightGuard, InFlightRegistry};
use crate::outcome::{ProvisionRequest, WorkflowOutcome};
use crate::readiness::{wait_until_reachable, ReadinessPolicy};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub disk: DiskSource,
    pub database: DatabaseEngineConfig,
    pub readiness: ReadinessPolicy,
    /// Delete a VM whose database setup failed instead of leaving it running.
    pub rollback_on_failure: bool,
}

/// A failed workflow plus what became of the resources it had created.
struct Failure {
    error: WorkflowError,
    aftermath: Option<String>,
}

impl From<WorkflowError> for Failure {
    fn from(error: WorkflowError) -> Self {
        Self {
            error,
            aftermath: None,
        }
    }
}

impl From<Failure> for WorkflowOutcome {
    fn from(failure: Failure) -> Self {
        let kind = failure.error.kind();
        let message = match failure.aftermath {
            Some(aftermath) => format!("{}; {}", failure.error, aftermath),
            None => failure.error.to_string(),
        };
        WorkflowOutcome::failed(kind, message)
    }
}

#[derive(Clone)]
pub struct ProvisioningOrchestrator {
    hypervisor: Arc<dyn Hypervisor>,
    executor: Arc<dyn RemoteExecutor>,
    bootstrapper: Arc<DatabaseBootstrapper>,
    audit: Arc<dyn AuditSink>,
    in_flight: InFlightRegistry,
    config: Arc<OrchestratorConfig>,
}

impl ProvisioningOrchestrator {
    pub fn new(
        hypervisor: Arc<dyn Hypervisor>,
        executor: Arc<dyn RemoteExecutor>,
        audit: Arc<dyn AuditSink>,
        config: OrchestratorConfig,
    ) -> Self {
        let bootstrapper = Arc::new(DatabaseBootstrapper::new(
            Arc::clone(&executor),
            config.database.clone(),
        ));
        Self {
            hypervisor,
            executor,
            bootstrapper,
            audit,
            in_flight: InFlightRegistry::new(),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn in_flight(&self) -> &InFlightRegistry {
        &self.in_flight
    }

    pub fn audit_sink(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    fn claim(&self, vm_name: &str) -> Result<InFlightGuard> {
        self.in_flight
            .try_acquire(vm_name)
            .ok_or_else(|| WorkflowError::AlreadyInProgress(vm_name.to_string()))
    }

    async fn audit(&self, action: &str, details: String) {
        if let Err(e) = self.audit.record(AuditRecord::new(action, details)).await {
            warn!("Failed to write audit record for '{}': {}", action, e);
        }
    }

    /// Create a VM and, when the request names a database, install the
    /// engine and set up the database and its user on it.
    #[instrument(skip_all, fields(vm = %request.vm_name))]
    pub async fn provision(&self, request: ProvisionRequest) -> WorkflowOutcome {
        match self.run_provision(&request).await {
            Ok(message) => {
                info!("{}", message);
                let details = format!(
                    "VM: {}, DB: {}",
                    request.vm_name,
                    request.database().unwrap_or("none")
                );
                self.audit("create", details).await;
                WorkflowOutcome::succeeded(message, None)
            }
            Err(failure) => {
                let outcome = WorkflowOutcome::from(failure);
                error!("{}", outcome.message);
                outcome
            }
        }
    }

    async fn run_provision(&self, request: &ProvisionRequest) -> std::result::Result<String, Failure> {
        let credential = request.validate()?;
        let name = request.vm_name.as_str();
        let _guard = self.claim(name)?;

        info!("Creating VM {}", name);
        self.hypervisor
            .create_vm(name, &self.config.disk)
            .await
            .map_err(WorkflowError::hypervisor(format!("failed to create VM {name}")))?;

        let Some(credential) = credential else {
            return Ok(format!("VM {name} created and started"));
        };

        let mut compensations = CompensationLog::new();
        compensations.push(Compensation::DeleteVm(name.to_string()));

        if let Err(error) = self.configure_database(name, &credential).await {
            let aftermath = self.after_partial_failure(name, compensations).await;
            return Err(Failure {
                error,
                aftermath: Some(aftermath),
            });
        }

        Ok(format!(
            "VM {name} created and MariaDB configured with database {}",
            credential.database
        ))
    }

    async fn configure_database(&self, name: &str, credential: &DatabaseCredential) -> Result<()> {
        let attempts = wait_until_reachable(self.executor.as_ref(), name, &self.config.readiness)
            .await
            .map_err(WorkflowError::remote(format!("failed to reach VM {name}")))?;
        info!("VM {} accepted remote commands after {} probe(s)", name, attempts);

        self.bootstrapper
            .bootstrap(name, Some(credential))
            .await
            .map_err(WorkflowError::bootstrap(format!(
                "failed to configure database on VM {name}"
            )))
    }

    async fn after_partial_failure(&self, name: &str, compensations: CompensationLog) -> String {
        if !self.config.rollback_on_failure {
            warn!("VM {} left running without database configuration", name);
            return format!(
                "VM {name} was left running without database configuration (provisioning is not atomic)"
            );
        }

        info!("Rolling back VM {}", name);
        match compensations.unwind(self.hypervisor.as_ref()).await {
            Ok(()) => format!("VM {name} was rolled back"),
            Err(failures) => format!("rollback failed: {}", failures.join("; ")),
        }
    }

    /// Delete a VM and its disk.
    ///
    /// The name must pass the same checks as a provisioning request.
    /// [`enumerate`](Self::enumerate) reports every name the hypervisor
    /// knows, so a VM created outside this service under a name such as
    /// `my vm` is listed but refused here with `InvalidRequest`.
    #[instrument(skip(self))]
    pub async fn decommission(&self, vm_name: &str) -> WorkflowOutcome {
        match self.run_decommission(vm_name).await {
            Ok(message) => {
                info!("{}", message);
                self.audit("delete", format!("VM: {vm_name}")).await;
                WorkflowOutcome::succeeded(message, None)
            }
            Err(e) => {
                error!("{}", e);
                e.into()
            }
        }
    }

    async fn run_decommission(&self, vm_name: &str) -> Result<String> {
        validate_vm_name(vm_name)?;
        let _guard = self.claim(vm_name)?;

        self.hypervisor
            .delete_vm(vm_name)
            .await
            .map_err(WorkflowError::hypervisor(format!("failed to delete VM {vm_name}")))?;
        Ok(format!("VM {vm_name} deleted"))
    }

    /// List the hypervisor's VMs by name.
    #[instrument(skip(self))]
    pub async fn enumerate(&self) -> WorkflowOutcome {
        match self.hypervisor.list_vms().await {
            Ok(names) => {
                info!("Listed {} VM(s)", names.len());
                self.audit("view", "Listed VMs".to_string()).await;
                WorkflowOutcome::succeeded("VMs listed", Some(json!(names)))
            }
            Err(source) => {
                let e = WorkflowError::hypervisor("failed to list VMs")(source);
                error!("{}", e);
                e.into()
            }
        }
    }
}
