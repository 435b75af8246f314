//! Error types for hypervisor, remote execution and database bootstrap operations.

use thiserror::Error;
use vm_core::error::VmError;

use crate::database::BootstrapStep;

pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors that can occur below the orchestrator.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// A hypervisor lifecycle step failed.
    #[error("{operation} failed: {source}")]
    Hypervisor {
        operation: String,
        #[source]
        source: VmError,
    },

    /// The remote shell channel could not be established.
    #[error("cannot reach {host}: {reason}")]
    Connection { host: String, reason: String },

    /// The remote command ran and exited non-zero.
    #[error("command on {host} exited with {}: {stderr}", exit_status(.code))]
    RemoteExit {
        host: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("command on {host} timed out after {secs}s")]
    RemoteTimeout { host: String, secs: u64 },

    /// A database bootstrap step failed; `source` is the remote failure.
    #[error("{step} failed: {source}")]
    Bootstrap {
        step: BootstrapStep,
        source: Box<ProviderError>,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dependency not found: {0}")]
    DependencyNotFound(String),
}

fn exit_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {code}"),
        None => "a signal".to_string(),
    }
}

impl ProviderError {
    pub fn hypervisor(operation: impl Into<String>, source: VmError) -> Self {
        Self::Hypervisor {
            operation: operation.into(),
            source,
        }
    }

    /// True when the failure means the host never ran the command: the
    /// connection failed or the call timed out.
    pub fn is_unreachable(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::RemoteTimeout { .. } => true,
            Self::Bootstrap { source, .. } => source.is_unreachable(),
            _ => false,
        }
    }
}

impl From<VmError> for ProviderError {
    fn from(err: VmError) -> Self {
        match err {
            VmError::Validation(msg) => Self::InvalidInput(msg),
            VmError::Dependency(dep) => Self::DependencyNotFound(dep),
            other => Self::InvalidInput(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_exit_display() {
        let err = ProviderError::RemoteExit {
            host: "db01".to_string(),
            code: Some(100),
            stderr: "E: Unable to locate package".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "command on db01 exited with status 100: E: Unable to locate package"
        );
    }

    #[test]
    fn test_bootstrap_wraps_step_label() {
        let err = ProviderError::Bootstrap {
            step: BootstrapStep::CreateDatabase,
            source: Box::new(ProviderError::Connection {
                host: "db01".to_string(),
                reason: "Connection refused".to_string(),
            }),
        };
        assert_eq!(
            err.to_string(),
            "create database failed: cannot reach db01: Connection refused"
        );
        assert!(err.is_unreachable());
    }

    #[test]
    fn test_remote_exit_is_not_unreachable() {
        let err = ProviderError::Bootstrap {
            step: BootstrapStep::GrantPrivileges,
            source: Box::new(ProviderError::RemoteExit {
                host: "db01".to_string(),
                code: Some(1),
                stderr: "ERROR 1045".to_string(),
            }),
        };
        assert!(!err.is_unreachable());
    }

    #[test]
    fn test_validation_maps_to_invalid_input() {
        let err: ProviderError = VmError::Validation("bad name".to_string()).into();
        assert!(matches!(err, ProviderError::InvalidInput(ref msg) if msg == "bad name"));
    }
}
