use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use vm_core::error::VmError;
use vm_provider::ProviderError;

pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Machine-checkable failure class carried by a failed outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    AlreadyInProgress,
    HypervisorFailure,
    RemoteExecutionFailure,
    DatabaseBootstrapFailure,
}

/// Terminal failure of one workflow invocation.
///
/// Lower-layer errors are kept intact as `source`; `stage` is the short
/// label saying which workflow step failed.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("VM {0} already has a workflow in progress")]
    AlreadyInProgress(String),

    #[error("{stage}: {source}")]
    Hypervisor {
        stage: String,
        source: ProviderError,
    },

    #[error("{stage}: {source}")]
    RemoteExecution {
        stage: String,
        source: ProviderError,
    },

    #[error("{stage}: {source}")]
    DatabaseBootstrap {
        stage: String,
        source: ProviderError,
    },
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::AlreadyInProgress(_) => ErrorKind::AlreadyInProgress,
            Self::Hypervisor { .. } => ErrorKind::HypervisorFailure,
            Self::RemoteExecution { .. } => ErrorKind::RemoteExecutionFailure,
            Self::DatabaseBootstrap { .. } => ErrorKind::DatabaseBootstrapFailure,
        }
    }

    pub(crate) fn hypervisor(stage: impl Into<String>) -> impl FnOnce(ProviderError) -> Self {
        let stage = stage.into();
        move |source| match source {
            ProviderError::InvalidInput(msg) => Self::InvalidRequest(msg),
            source => Self::Hypervisor { stage, source },
        }
    }

    pub(crate) fn remote(stage: impl Into<String>) -> impl FnOnce(ProviderError) -> Self {
        let stage = stage.into();
        move |source| Self::RemoteExecution { stage, source }
    }

    /// A bootstrap step that never reached the host is a remote execution
    /// failure; one that ran and failed is a bootstrap failure.
    pub(crate) fn bootstrap(stage: impl Into<String>) -> impl FnOnce(ProviderError) -> Self {
        let stage = stage.into();
        move |source| match source {
            ProviderError::InvalidInput(msg) => Self::InvalidRequest(msg),
            source if source.is_unreachable() => Self::RemoteExecution { stage, source },
            source => Self::DatabaseBootstrap { stage, source },
        }
    }
}

impl From<VmError> for WorkflowError {
    fn from(err: VmError) -> Self {
        match err {
            VmError::Validation(msg) => Self::InvalidRequest(msg),
            other => Self::InvalidRequest(other.to_string()),
        }
    }
}

/// Failures of the audit sink. These never fail a workflow.
#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Audit sink is closed")]
    Closed,

    #[error("Audit I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use vm_provider::BootstrapStep;

    fn unreachable() -> ProviderError {
        ProviderError::Connection {
            host: "db01".to_string(),
            reason: "No route to host".to_string(),
        }
    }

    #[test]
    fn test_bootstrap_classification() {
        let err = WorkflowError::bootstrap("failed to configure database on VM db01")(
            ProviderError::Bootstrap {
                step: BootstrapStep::InstallEngine,
                source: Box::new(unreachable()),
            },
        );
        assert_eq!(err.kind(), ErrorKind::RemoteExecutionFailure);

        let err = WorkflowError::bootstrap("failed to configure database on VM db01")(
            ProviderError::Bootstrap {
                step: BootstrapStep::CreateUser,
                source: Box::new(ProviderError::RemoteExit {
                    host: "db01".to_string(),
                    code: Some(1),
                    stderr: "ERROR 1396".to_string(),
                }),
            },
        );
        assert_eq!(err.kind(), ErrorKind::DatabaseBootstrapFailure);
        assert_eq!(
            err.to_string(),
            "failed to configure database on VM db01: create database user failed: \
             command on db01 exited with status 1: ERROR 1396"
        );
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::RemoteExecutionFailure).unwrap(),
            "\"remote_execution_failure\""
        );
    }

    #[test]
    fn test_validation_becomes_invalid_request() {
        let err: WorkflowError = VmError::Validation("VM name required".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(err.to_string(), "VM name required");
    }
}
