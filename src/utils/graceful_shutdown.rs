use std::sync::Arc;

use tokio::{signal, sync::watch};

/// Why the gateway stops accepting connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// Programmatic request, e.g. from an embedding application or a test
    Requested,
}

/// Fan-out of a single shutdown event to every interested task.
///
/// The first trigger wins; later ones are ignored.
#[derive(Clone)]
pub struct GracefulShutdown {
    shutdown_tx: Arc<watch::Sender<Option<ShutdownReason>>>,
}

impl GracefulShutdown {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(None);
        Self {
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// Get a receiver observing the shutdown state
    pub fn subscribe(&self) -> watch::Receiver<Option<ShutdownReason>> {
        self.shutdown_tx.subscribe()
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_tx.borrow().is_some()
    }

    /// Initiate shutdown. Returns `false` if it was already initiated.
    pub fn trigger_shutdown(&self, reason: ShutdownReason) -> bool {
        let first = self.shutdown_tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
        if first {
            tracing::info!(?reason, "Shutdown initiated");
        } else {
            tracing::debug!(?reason, "Shutdown already initiated, ignoring");
        }
        first
    }

    /// Wait for SIGINT or SIGTERM and trigger shutdown.
    pub async fn run_signal_handler(&self) {
        tokio::select! {
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!("Failed to listen for Ctrl+C: {}", e);
                    std::future::pending::<()>().await;
                }
                self.trigger_shutdown(ShutdownReason::Interrupt);
            }
            _ = wait_for_sigterm() => {
                self.trigger_shutdown(ShutdownReason::Terminate);
            }
        }
    }

    /// Resolve once shutdown has been initiated, even if that happened before the call.
    pub async fn wait_for_shutdown_signal(&self) -> ShutdownReason {
        let mut receiver = self.subscribe();
        match receiver.wait_for(Option::is_some).await {
            Ok(reason) => reason.unwrap_or(ShutdownReason::Requested),
            Err(_) => ShutdownReason::Requested,
        }
    }
}

impl Default for GracefulShutdown {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::error!("Failed to register SIGTERM handler: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await;
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_graceful_shutdown_creation() {
        let shutdown = GracefulShutdown::new();
        assert!(!shutdown.is_shutdown_initiated());
    }

    #[tokio::test]
    async fn test_first_trigger_wins() {
        let shutdown = GracefulShutdown::new();
        let mut receiver = shutdown.subscribe();

        assert!(shutdown.trigger_shutdown(ShutdownReason::Terminate));
        assert!(!shutdown.trigger_shutdown(ShutdownReason::Requested));

        assert!(shutdown.is_shutdown_initiated());
        assert!(receiver.has_changed().unwrap());
        assert_eq!(*receiver.borrow_and_update(), Some(ShutdownReason::Terminate));
    }

    #[tokio::test]
    async fn test_waiters_are_released() {
        let shutdown = GracefulShutdown::new();
        let waiter = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { shutdown.wait_for_shutdown_signal().await })
        };
        tokio::task::yield_now().await;

        shutdown.trigger_shutdown(ShutdownReason::Requested);

        let reason = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reason, ShutdownReason::Requested);
    }

    #[tokio::test]
    async fn test_late_waiter_returns_immediately() {
        let shutdown = GracefulShutdown::new();
        shutdown.trigger_shutdown(ShutdownReason::Interrupt);

        let reason =
            tokio::time::timeout(Duration::from_secs(1), shutdown.wait_for_shutdown_signal())
                .await
                .unwrap();
        assert_eq!(reason, ShutdownReason::Interrupt);
    }
}
