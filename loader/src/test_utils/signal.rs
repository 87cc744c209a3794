use std::time::Duration;

use tokio::time::timeout;

use crate::concurrency::signal::SignalRx;

/// Default time a test waits for a signal.
pub const DEFAULT_SIGNAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Waits until `rx` is raised.
///
/// # Panics
///
/// Panics if the signal is not raised within [`DEFAULT_SIGNAL_TIMEOUT`] or can no longer be
/// raised because its senders are gone.
pub async fn expect_raised(rx: &mut SignalRx) {
    match timeout(DEFAULT_SIGNAL_TIMEOUT, rx.wait()).await {
        Ok(true) => {}
        Ok(false) => panic!("signal can no longer be raised, all senders were dropped"),
        Err(_) => panic!(
            "signal was not raised within {:?}, the expected state was never reached",
            DEFAULT_SIGNAL_TIMEOUT
        ),
    }
}
