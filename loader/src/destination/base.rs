use std::future::Future;

use tokio::io::AsyncRead;

use crate::error::LoadResult;

/// Trait for systems that receive files through a bulk-copy protocol.
///
/// Each worker owns exactly one [`Destination`] for the whole run, so implementations never
/// have to handle concurrent copies on the same instance.
///
/// The trait also provides an optional [`Destination::shutdown`] method with a default no-op
/// implementation. Override it if the destination must release resources explicitly when
/// its worker finishes.
pub trait Destination {
    /// Returns the name of the destination.
    fn name() -> &'static str;

    /// Streams every byte of `reader` into the file named `destination`, relative to the root
    /// of the target table.
    ///
    /// Returns the number of bytes transferred. A returned future runs to completion once
    /// polled; cancellation of a run never interrupts a copy halfway.
    fn copy_file<R>(
        &mut self,
        reader: R,
        destination: &str,
    ) -> impl Future<Output = LoadResult<u64>> + Send
    where
        R: AsyncRead + Unpin + Send;

    /// Releases the destination after its worker processed its last task.
    ///
    /// The default implementation is a no-op.
    fn shutdown(&self) -> impl Future<Output = LoadResult<()>> + Send {
        async { Ok(()) }
    }
}
