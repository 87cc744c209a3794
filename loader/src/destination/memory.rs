use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;
use tracing::info;

use crate::destination::Destination;
use crate::error::{ErrorKind, LoadResult};
use crate::load_error;

/// A file that was fully received by a [`MemoryDestination`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopiedFile {
    pub destination: String,
    pub contents: Vec<u8>,
}

#[derive(Debug, Default)]
struct Inner {
    attempted: Vec<String>,
    copied: Vec<CopiedFile>,
    failing: HashSet<String>,
    copy_delay: Option<Duration>,
    shutdowns: usize,
}

/// In-memory destination for tests.
///
/// Clones share their state, so a test keeps one clone for inspection while the pool owns the
/// others. Copies can be slowed down and made to fail for chosen destination paths.
#[derive(Debug, Clone, Default)]
pub struct MemoryDestination {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDestination {
    /// Creates a new empty memory destination.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every copy sleep for `delay` before reading its source.
    pub async fn set_copy_delay(&self, delay: Duration) {
        self.inner.lock().await.copy_delay = Some(delay);
    }

    /// Makes copies into `destination` fail with [`ErrorKind::TransferFailed`].
    pub async fn fail_on(&self, destination: impl Into<String>) {
        self.inner.lock().await.failing.insert(destination.into());
    }

    /// Returns the destination paths of all copies that were started, in start order.
    pub async fn attempted(&self) -> Vec<String> {
        self.inner.lock().await.attempted.clone()
    }

    /// Returns all files that were copied successfully, in completion order.
    pub async fn copied_files(&self) -> Vec<CopiedFile> {
        self.inner.lock().await.copied.clone()
    }

    /// Returns how many times [`Destination::shutdown`] was called across all clones.
    pub async fn shutdown_count(&self) -> usize {
        self.inner.lock().await.shutdowns
    }
}

impl Destination for MemoryDestination {
    fn name() -> &'static str {
        "memory"
    }

    async fn copy_file<R>(&mut self, mut reader: R, destination: &str) -> LoadResult<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        // The lock is not held while sleeping so that workers copy in parallel.
        let (copy_delay, should_fail) = {
            let mut inner = self.inner.lock().await;
            inner.attempted.push(destination.to_string());
            (inner.copy_delay, inner.failing.contains(destination))
        };

        if let Some(delay) = copy_delay {
            tokio::time::sleep(delay).await;
        }

        if should_fail {
            return Err(load_error!(
                ErrorKind::TransferFailed,
                "Copy into memory destination failed",
                format!("failure injected for `{destination}`")
            ));
        }

        let mut contents = Vec::new();
        let bytes = reader.read_to_end(&mut contents).await?;

        info!(destination, bytes, "stored file in memory");

        self.inner.lock().await.copied.push(CopiedFile {
            destination: destination.to_string(),
            contents,
        });

        Ok(bytes as u64)
    }

    async fn shutdown(&self) -> LoadResult<()> {
        self.inner.lock().await.shutdowns += 1;
        Ok(())
    }
}
