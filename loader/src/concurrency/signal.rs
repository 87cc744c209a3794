//! One-shot signals built on tokio watch channels.
//!
//! A signal starts lowered and can be raised exactly once. Every receiver observes the raise,
//! including receivers that only start waiting afterwards.

use tokio::sync::watch;

/// Sending side of a one-shot signal.
///
/// Cloned freely, for example into each worker that may raise the fatal-error signal.
#[derive(Debug, Clone)]
pub struct SignalTx(watch::Sender<bool>);

impl SignalTx {
    /// Raises the signal.
    ///
    /// Returns `true` for the call that actually raised it and `false` for every later call.
    /// Never blocks and never fails, even without receivers.
    pub fn raise(&self) -> bool {
        self.0.send_if_modified(|raised| {
            if *raised {
                return false;
            }

            *raised = true;
            true
        })
    }

    /// Returns `true` once the signal has been raised.
    pub fn is_raised(&self) -> bool {
        *self.0.borrow()
    }

    /// Creates a new receiver for this signal.
    pub fn subscribe(&self) -> SignalRx {
        SignalRx(self.0.subscribe())
    }
}

/// Receiving side of a one-shot signal.
#[derive(Debug, Clone)]
pub struct SignalRx(watch::Receiver<bool>);

impl SignalRx {
    /// Returns `true` once the signal has been raised.
    pub fn is_raised(&self) -> bool {
        *self.0.borrow()
    }

    /// Waits until the signal is raised.
    ///
    /// Returns `true` when the signal was raised and `false` when every sender was dropped
    /// without raising it, in which case it can never fire anymore.
    pub async fn wait(&mut self) -> bool {
        self.0.wait_for(|raised| *raised).await.is_ok()
    }
}

/// Creates a new, lowered one-shot signal.
pub fn create_signal() -> (SignalTx, SignalRx) {
    let (tx, rx) = watch::channel(false);
    (SignalTx(tx), SignalRx(rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn signal_is_raised_at_most_once() {
        let (tx, rx) = create_signal();
        assert!(!rx.is_raised());

        assert!(tx.raise());
        assert!(!tx.raise());
        assert!(!tx.clone().raise());

        assert!(rx.is_raised());
        assert!(tx.is_raised());
    }

    #[tokio::test]
    async fn late_receivers_observe_the_raise() {
        let (tx, _rx) = create_signal();
        tx.raise();

        let mut late = tx.subscribe();
        assert!(late.wait().await);
    }

    #[tokio::test]
    async fn waiting_ends_when_senders_are_dropped() {
        let (tx, mut rx) = create_signal();
        drop(tx);

        assert!(!rx.wait().await);
        assert!(!rx.is_raised());
    }

    #[tokio::test]
    async fn concurrent_raises_notify_once() {
        let (tx, mut rx) = create_signal();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let tx = tx.clone();
            handles.push(tokio::spawn(async move { tx.raise() }));
        }

        let mut raised = 0;
        for handle in handles {
            if handle.await.unwrap() {
                raised += 1;
            }
        }

        assert_eq!(raised, 1);
        let waited = tokio::time::timeout(Duration::from_secs(1), rx.wait()).await;
        assert_eq!(waited, Ok(true));
    }
}
