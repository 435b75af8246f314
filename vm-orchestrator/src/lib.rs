//! Provisioning workflows for database VMs.
//!
//! This crate turns declarative requests ("create VM X, optionally with
//! database Y") into an ordered sequence of hypervisor and remote-host
//! steps and reports one outcome per invocation. It is consumed by the
//! vm-api HTTP service but does not depend on it.

mod compensation;

pub mod audit;
pub mod error;
pub mod inflight;
pub mod orchestrator;
pub mod outcome;
pub mod readiness;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use audit::{AuditRecord, AuditSink, FileAuditSink, MemoryAuditSink};
pub use error::{AuditError, ErrorKind, Result, WorkflowError};
pub use inflight::{InFlightGuard, InFlightRegistry};
pub use orchestrator::{OrchestratorConfig, ProvisioningOrchestrator};
pub use outcome::{ProvisionRequest, WorkflowOutcome};
pub use readiness::{wait_until_reachable, ReadinessPolicy};
