//! Graceful shutdown for a tally node.
//!
//! SIGINT/SIGTERM (or a programmatic call) is fanned out to every background
//! task over a `tokio::sync::broadcast` channel.

use tokio::signal;
use tokio::sync::broadcast;

/// Coordinates shutdown across the listener and the periodic loops.
///
/// Tasks call [`subscribe`](Self::subscribe) and `select!` on the receiver
/// alongside their main loop.
pub struct ShutdownController {
    tx: broadcast::Sender<()>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger shutdown programmatically.
    pub fn shutdown(&self) {
        let _ = self.tx.send(());
    }

    /// Wait for SIGTERM or SIGINT, then trigger shutdown.
    pub async fn wait_for_signal(&self) {
        let ctrl_c = async {
            if let Err(e) = signal::ctrl_c().await {
                tracing::error!(error = %e, "cannot listen for SIGINT");
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
                    tracing::error!(error = %e, "cannot install SIGTERM handler");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => { tracing::info!("received SIGINT, shutting down"); }
            _ = terminate => { tracing::info!("received SIGTERM, shutting down"); }
        }

        self.shutdown();
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn programmatic_shutdown_notifies_subscribers() {
        let controller = ShutdownController::new();
        let mut rx = controller.subscribe();
        controller.shutdown();
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn every_loop_sees_the_signal() {
        let controller = ShutdownController::new();
        let mut listener_rx = controller.subscribe();
        let mut mining_rx = controller.subscribe();
        controller.shutdown();
        assert!(listener_rx.recv().await.is_ok());
        assert!(mining_rx.recv().await.is_ok());
    }

    #[test]
    fn shutdown_without_subscribers_is_harmless() {
        ShutdownController::default().shutdown();
    }
}
