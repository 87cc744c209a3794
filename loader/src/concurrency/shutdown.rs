//! Cooperative cancellation token handed to each worker.

use tokio::sync::watch;

/// Requests a single worker to stop after its current task.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

impl ShutdownTx {
    /// Signals shutdown. Calling it again, or after the worker finished, has no effect.
    pub fn shutdown(&self) {
        // Infallible, the worker may already have dropped its receiver.
        self.0.send_replace(true);
    }

    /// Creates a new shutdown receiver subscription.
    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Worker side of the cancellation token.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    /// Returns `true` once shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }
}

/// Creates a new cancellation token pair.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), ShutdownRx(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_is_sticky_and_idempotent() {
        let (tx, rx) = create_shutdown_channel();
        assert!(!rx.is_shutdown());

        tx.shutdown();
        tx.shutdown();

        assert!(rx.is_shutdown());
        assert!(tx.subscribe().is_shutdown());
    }

    #[test]
    fn shutdown_without_receivers_does_not_fail() {
        let (tx, rx) = create_shutdown_channel();
        drop(rx);
        tx.shutdown();
    }
}
