//! Signal handling for graceful shutdown

use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, warn};

/// Handles shutdown signals (SIGTERM, SIGINT)
pub struct ShutdownSignal;

impl ShutdownSignal {
    /// Create a new shutdown signal handler
    pub fn new() -> Self {
        Self
    }

    /// Wait for a shutdown signal
    ///
    /// Falls back to Ctrl-C alone if SIGTERM cannot be registered.
    pub async fn wait(&self) {
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                warn!(?e, "failed to register SIGTERM handler");
                wait_for_interrupt().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                debug!("received SIGTERM");
            }
            _ = wait_for_interrupt() => {}
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_for_interrupt() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => debug!("received SIGINT"),
        Err(e) => {
            warn!(?e, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    }
}
