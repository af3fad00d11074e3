//! Signal handling for the devpack CLI

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Fires once when the process is asked to stop
#[derive(Debug, Clone, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Trigger a shutdown
    pub fn shutdown(&self) {
        info!("Shutdown triggered");
        self.token.cancel();
    }

    /// Wait for the shutdown signal; returns at once if it already fired
    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }
}

/// Install signal handlers for teardown
///
/// The returned coordinator fires on SIGTERM/SIGINT (Ctrl+C/Ctrl+Break on Windows).
pub fn install_signal_handlers() -> ShutdownCoordinator {
    let coordinator = ShutdownCoordinator::default();
    let trigger = coordinator.clone();

    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let (mut sigterm, mut sigint) =
                match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                    (Ok(term), Ok(int)) => (term, int),
                    (Err(e), _) | (_, Err(e)) => {
                        warn!(error = %e, "Failed to install signal handlers");
                        return;
                    }
                };

            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, tearing down"),
                _ = sigint.recv() => info!("Received SIGINT, tearing down"),
            }
        }

        #[cfg(windows)]
        {
            use tokio::signal::windows;

            let (mut ctrl_c, mut ctrl_break) = match (windows::ctrl_c(), windows::ctrl_break()) {
                (Ok(c), Ok(b)) => (c, b),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(error = %e, "Failed to install console handlers");
                    return;
                }
            };

            tokio::select! {
                _ = ctrl_c.recv() => info!("Received Ctrl+C, tearing down"),
                _ = ctrl_break.recv() => info!("Received Ctrl+Break, tearing down"),
            }
        }

        trigger.shutdown();
    });

    coordinator
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_before_wait() {
        let coordinator = ShutdownCoordinator::default();
        coordinator.shutdown();
        tokio::time::timeout(Duration::from_secs(1), coordinator.wait_for_shutdown())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let coordinator = ShutdownCoordinator::default();
        let waiter = coordinator.clone();
        let handle = tokio::spawn(async move { waiter.wait_for_shutdown().await });
        coordinator.shutdown();
        tokio_test::assert_ok!(handle.await);
    }
}
