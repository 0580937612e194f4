//! Broadcast shutdown signalling for conveyer stages.
//!
//! A single [`ShutdownTx`] can stop any number of stages at once. Every stage holds a
//! [`ShutdownRx`] and races each of its channel operations against [`ShutdownRx::cancelled`].

use std::future;

use tokio::sync::watch;

/// Transmitter side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Wraps a watch sender into a [`ShutdownTx`].
    pub fn new(tx: watch::Sender<bool>) -> Self {
        Self(tx)
    }

    /// Requests shutdown of every subscribed stage.
    ///
    /// Returns `true` if this call performed the transition, `false` if shutdown had already
    /// been requested. Receivers subscribed later still observe the request.
    pub fn shutdown(&self) -> bool {
        !self.0.send_replace(true)
    }

    /// Creates a new shutdown receiver subscription.
    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiver side of the shutdown channel.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    /// Waits until shutdown is requested.
    ///
    /// Resolves immediately if shutdown was already requested. If the [`ShutdownTx`] is dropped
    /// without ever signalling, this future never resolves.
    pub async fn cancelled(&mut self) {
        let result = self.0.wait_for(|shutdown| *shutdown).await.map(|_| ());
        if result.is_err() {
            future::pending::<()>().await;
        }
    }
}

/// Result of an operation that may be interrupted by a shutdown request.
#[derive(Debug, PartialEq, Eq)]
pub enum ShutdownResult<T> {
    /// The operation completed.
    Ok(T),
    /// Shutdown was requested before the operation completed.
    Shutdown,
}

impl<T> ShutdownResult<T> {
    /// Returns `true` when the operation was interrupted by shutdown.
    pub fn should_shutdown(&self) -> bool {
        matches!(self, ShutdownResult::Shutdown)
    }
}

/// Creates a new shutdown channel in the non-shutdown state.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx::new(tx), ShutdownRx(rx))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use super::*;

    #[tokio::test]
    async fn cancelled_resolves_after_shutdown() {
        let (shutdown_tx, mut shutdown_rx) = create_shutdown_channel();
        let pending = timeout(Duration::from_millis(20), shutdown_rx.cancelled()).await;
        assert!(pending.is_err());

        assert!(shutdown_tx.shutdown());
        assert!(!shutdown_tx.shutdown());

        timeout(Duration::from_secs(1), shutdown_rx.cancelled())
            .await
            .expect("shutdown was requested");
    }

    #[tokio::test]
    async fn late_subscribers_observe_shutdown() {
        let (shutdown_tx, _) = create_shutdown_channel();
        shutdown_tx.shutdown();

        let mut shutdown_rx = shutdown_tx.subscribe();
        timeout(Duration::from_secs(1), shutdown_rx.cancelled())
            .await
            .expect("shutdown was requested before subscribing");
    }

    #[tokio::test]
    async fn dropped_sender_never_cancels() {
        let (shutdown_tx, mut shutdown_rx) = create_shutdown_channel();
        drop(shutdown_tx);

        let result = timeout(Duration::from_millis(50), shutdown_rx.cancelled()).await;
        assert!(result.is_err());
    }
}
