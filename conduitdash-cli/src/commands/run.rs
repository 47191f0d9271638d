//! Daemon command.

use std::future::Future;

use conduitdash_core::{LoadedConfig, Monitor};
use tracing::{info, warn};

use crate::error::CliError;
use crate::util::runtime;

/// Runs the stats and geo loops until SIGINT or SIGTERM
pub fn cmd_run(config: &LoadedConfig) -> Result<(), CliError> {
    runtime()?.block_on(async {
        let monitor = Monitor::open(config).await?;
        let shutdown = shutdown_signal()?;
        monitor.run(shutdown).await;
        Ok(())
    })
}

/// Resolves on the first SIGINT or SIGTERM
///
/// Must be called inside the runtime so the SIGTERM handler is installed
/// before the loops start.
fn shutdown_signal() -> Result<impl Future<Output = ()>, CliError> {
    #[cfg(unix)]
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| CliError::Runtime(format!("Failed to install SIGTERM handler: {e}")))?;

    Ok(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Ctrl+C handler unavailable");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            terminate.recv().await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => info!("Received SIGINT (Ctrl+C)"),
            () = terminate => info!("Received SIGTERM"),
        }
    })
}
