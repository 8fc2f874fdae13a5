//! Kiosk shutdown
//!
//! Leaving the page (quit command, SIGINT or SIGTERM) flips a single flag
//! that the input loop and the status renderer both watch.

use tokio::signal;
use tokio::sync::watch;

pub struct ShutdownController {
    tx: watch::Sender<bool>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Trigger shutdown programmatically
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    /// Resolves once shutdown has been triggered, including before the call
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|down| *down).await;
    }

    /// Wait for SIGTERM or SIGINT, then trigger shutdown
    pub async fn wait_for_signal(&self) {
        let ctrl_c = signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(mut sig) => {
                    sig.recv().await;
                }
                Err(e) => {
                    tracing::warn!("SIGTERM handler unavailable: {}", e);
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
    use std::sync::Arc;

    #[tokio::test]
    async fn waiters_are_released() {
        let controller = Arc::new(ShutdownController::new());
        let waiter = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.triggered().await })
        };
        assert!(!controller.is_triggered());
        controller.shutdown();
        waiter.await.unwrap();
        assert!(controller.is_triggered());
    }

    #[tokio::test]
    async fn late_waiters_return_immediately() {
        let controller = ShutdownController::new();
        controller.shutdown();
        controller.triggered().await;
    }
}
