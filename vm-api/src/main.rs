use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use vm_api::{create_app, Config};
use vm_logging::{init_subscriber, LogSettings};
use vm_orchestrator::{AuditSink, FileAuditSink, ProvisioningOrchestrator};
use vm_provider::{get_hypervisor, SshExecutor};

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = init_subscriber(&LogSettings::from_env());

    info!("Starting vm-api service...");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: bind_addr={}, audit_log={}, hypervisor={}, rollback_on_failure={}",
        config.bind_addr,
        config.audit_log_path.display(),
        config.hypervisor.backend.provider,
        config.rollback_on_failure
    );

    let audit = Arc::new(
        FileAuditSink::open(&config.audit_log_path)
            .await
            .with_context(|| {
                format!("Failed to open audit log {}", config.audit_log_path.display())
            })?,
    );
    let hypervisor = get_hypervisor(config.hypervisor.backend.clone())?;
    let executor = Arc::new(SshExecutor::new(config.ssh.clone())?);

    let orchestrator = ProvisioningOrchestrator::new(
        hypervisor,
        executor,
        audit.clone(),
        config.orchestrator_config(),
    );
    let app = create_app(orchestrator);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("Listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server failed")?;

    info!("vm-api shutting down");
    audit.close().await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received terminate signal, initiating graceful shutdown"),
    }
}
