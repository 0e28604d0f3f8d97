//! Graceful Shutdown Handler
//!
//! Waits for OS signals and tears the container down.

use super::DestructionReport;
use crate::di::Container;
use crate::error::{CdiError, Result};
use std::time::Duration;
use tokio::signal;

/// Handles graceful shutdown of a container
///
/// ShutdownHandler listens for OS signals (SIGTERM, SIGINT) and destroys every
/// contextual instance through [`Container::shutdown_all`]. Destruction runs
/// user code of unbounded duration, so it is bounded by the configured
/// `shutdown_timeout_ms` when one is set.
///
/// # Example
///
/// ```rust,ignore
/// use meshestra_cdi::lifecycle::ShutdownHandler;
///
/// let handler = ShutdownHandler::new(container.clone());
/// tokio::spawn(async move {
///     let report = handler.wait_for_shutdown().await;
///     std::process::exit(if report.is_ok() { 0 } else { 1 });
/// });
/// ```
pub struct ShutdownHandler {
    container: Container,
    timeout: Option<Duration>,
}

impl ShutdownHandler {
    pub fn new(container: Container) -> Self {
        let timeout = container.config().shutdown_timeout();
        Self { container, timeout }
    }

    /// Override the configured timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Wait for a shutdown signal and perform graceful shutdown
    pub async fn wait_for_shutdown(&self) -> Result<DestructionReport> {
        shutdown_signal().await;
        self.shutdown().await
    }

    /// Perform graceful shutdown now
    pub async fn shutdown(&self) -> Result<DestructionReport> {
        match self.timeout {
            Some(timeout) => self.shutdown_with_timeout(timeout).await,
            None => {
                let container = self.container.clone();
                run_blocking(move || container.shutdown_all()).await
            }
        }
    }

    /// Destroy everything on a blocking task, giving up after `timeout`.
    ///
    /// On timeout the destruction keeps running in the background; the
    /// container is already marked as shut down.
    pub async fn shutdown_with_timeout(&self, timeout: Duration) -> Result<DestructionReport> {
        tracing::info!("Starting graceful shutdown...");
        let container = self.container.clone();
        let report = tokio::time::timeout(timeout, run_blocking(move || container.shutdown_all()))
            .await
            .map_err(|_| {
                tracing::error!("Shutdown did not complete within {:?}", timeout);
                CdiError::ShutdownTimeout { timeout }
            })??;
        tracing::info!("Graceful shutdown complete");
        Ok(report)
    }
}

async fn run_blocking<F>(destroy: F) -> Result<DestructionReport>
where
    F: FnOnce() -> DestructionReport + Send + 'static,
{
    tokio::task::spawn_blocking(destroy)
        .await
        .map_err(|e| CdiError::Internal(format!("shutdown task failed: {e}")))
}

/// Create a future that completes when a shutdown signal is received
///
/// A signal handler that cannot be installed is logged and never fires.
///
/// # Example
///
/// ```rust,ignore
/// use meshestra_cdi::lifecycle::shutdown_signal;
///
/// tokio::select! {
///     _ = shutdown_signal() => {
///         container.shutdown_all();
///     }
///     _ = worker.run() => {}
/// }
/// ```
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM signal");
        },
    }
}
