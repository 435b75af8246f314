//! Waiting for a freshly started VM to accept remote commands.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info};
use vm_provider::{ProviderError, RemoteExecutor};

/// Longest readiness deadline honored, one day.
pub const MAX_READINESS_TIMEOUT_SECS: u64 = 86_400;

/// Exponential backoff bounded by an overall deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessPolicy {
    pub initial_interval_ms: u64,
    pub max_interval_ms: u64,
    pub timeout_secs: u64,
    /// Command whose success means the host is ready.
    pub probe_command: String,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            initial_interval_ms: 1_000,
            max_interval_ms: 10_000,
            timeout_secs: 180,
            probe_command: "true".to_string(),
        }
    }
}

impl ReadinessPolicy {
    /// The overall deadline, capped at [`MAX_READINESS_TIMEOUT_SECS`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.min(MAX_READINESS_TIMEOUT_SECS))
    }
}

/// Probe `host` until it answers or the policy's deadline passes.
///
/// Returns the number of probes it took. Input errors (an unusable host
/// name, a missing ssh binary) are returned at once; anything else is
/// retried until the deadline.
pub async fn wait_until_reachable(
    executor: &dyn RemoteExecutor,
    host: &str,
    policy: &ReadinessPolicy,
) -> Result<u32, ProviderError> {
    let deadline = Instant::now() + policy.timeout();
    let max_interval = Duration::from_millis(policy.max_interval_ms.max(1));
    let mut interval = Duration::from_millis(policy.initial_interval_ms.max(1)).min(max_interval);
    let mut attempts = 0u32;
    let mut last_error = None;

    loop {
        attempts += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());

        match timeout(remaining, executor.run(host, &policy.probe_command)).await {
            Ok(Ok(_)) => {
                info!("{} reachable after {} attempt(s)", host, attempts);
                return Ok(attempts);
            }
            Ok(Err(
                err @ (ProviderError::InvalidInput(_) | ProviderError::DependencyNotFound(_)),
            )) => return Err(err),
            Ok(Err(err)) => {
                debug!(host, attempts, "Not reachable yet: {}", err);
                last_error = Some(err);
            }
            Err(_) => break,
        }

        let now = Instant::now();
        if now >= deadline {
            break;
        }
        sleep(interval.min(deadline - now)).await;
        interval = (interval * 2).min(max_interval);
    }

    let last = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "probe did not complete".to_string());
    Err(ProviderError::Connection {
        host: host.to_string(),
        reason: format!(
            "no response within {}s after {} attempt(s) (last error: {})",
            policy.timeout().as_secs(),
            attempts,
            last
        ),
    })
}
