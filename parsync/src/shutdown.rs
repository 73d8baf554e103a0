//! Shutdown handling for SIGTERM and SIGINT.
//!
//! A signal cancels the shared token; every running rsync child is then sent
//! SIGTERM by its job and the run ends as interrupted.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Turns the first termination signal into a cancelled token.
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
        }
    }

    /// Token handed to everything that has to stop on shutdown.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for SIGINT or SIGTERM, then cancel the token.
    pub async fn wait_for_signal(&self) -> std::io::Result<()> {
        #[cfg(unix)]
        {
            let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            tokio::select! {
                result = signal::ctrl_c() => {
                    result?;
                    info!("Received SIGINT (Ctrl+C), stopping all jobs");
                }
                _ = terminate.recv() => {
                    info!("Received SIGTERM, stopping all jobs");
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, stopping all jobs");
        }

        self.trigger();
        Ok(())
    }

    /// Cancel the token without waiting for a signal.
    pub fn trigger(&self) {
        self.token.cancel();
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
