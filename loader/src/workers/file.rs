use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::concurrency::shutdown::ShutdownRx;
use crate::concurrency::signal::SignalTx;
use crate::destination::Destination;
use crate::error::{ErrorKind, LoadError, LoadResult};
use crate::load_error;
use crate::task::LoadTask;
use crate::workers::base::{LoadCounters, WorkerExit, WorkerId, WorkerSummary};

/// Worker that loads its bucket of files, one after the other, over its own destination.
///
/// The cancellation token is checked before each task, including the first, so a worker
/// cancelled before it got to run attempts no task at all. A copy that already started always
/// runs to its end; cancellation only prevents the next task from starting. Skipped tasks are
/// counted neither as successes nor as failures.
///
/// A failed task is counted and logged. Without stop-on-error the worker moves on to its next
/// task; with stop-on-error it raises the pool's fatal signal and stops. Other workers keep
/// going until their own tokens are set.
#[derive(Debug)]
pub struct FileWorker<D> {
    id: WorkerId,
    destination: D,
    tasks: Vec<LoadTask>,
    counters: Arc<LoadCounters>,
    fatal_tx: SignalTx,
    stop_on_error: bool,
    shutdown_rx: ShutdownRx,
}

impl<D> FileWorker<D>
where
    D: Destination,
{
    pub fn new(
        id: WorkerId,
        destination: D,
        tasks: Vec<LoadTask>,
        counters: Arc<LoadCounters>,
        fatal_tx: SignalTx,
        stop_on_error: bool,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            id,
            destination,
            tasks,
            counters,
            fatal_tx,
            stop_on_error,
            shutdown_rx,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Gives back the destination of a worker that will never run.
    pub fn into_destination(self) -> D {
        self.destination
    }

    /// Processes the bucket and releases the destination afterwards.
    pub async fn run(mut self) -> WorkerSummary {
        let tasks = std::mem::take(&mut self.tasks);
        info!(
            worker_id = %self.id,
            tasks = tasks.len(),
            destination = D::name(),
            "file worker started"
        );

        let mut summary = WorkerSummary {
            id: self.id,
            exit: WorkerExit::Completed,
            succeeded: 0,
            failed: 0,
            skipped: 0,
        };

        for (index, task) in tasks.iter().enumerate() {
            if self.shutdown_rx.is_shutdown() {
                summary.exit = WorkerExit::Cancelled;
                summary.skipped = tasks.len() - index;
                info!(
                    worker_id = %self.id,
                    skipped = summary.skipped,
                    "file worker cancelled, remaining tasks are skipped"
                );
                break;
            }

            match self.load(task).await {
                Ok(bytes) => {
                    self.counters.record_success();
                    summary.succeeded += 1;
                    debug!(
                        worker_id = %self.id,
                        source = %task.source.display(),
                        destination = %task.destination,
                        bytes,
                        "file loaded"
                    );
                }
                Err(err) => {
                    self.counters.record_failure();
                    summary.failed += 1;
                    error!(
                        worker_id = %self.id,
                        source = %task.source.display(),
                        destination = %task.destination,
                        error = %err,
                        "failed to load file"
                    );

                    if self.stop_on_error {
                        if self.fatal_tx.raise() {
                            let err = load_error!(
                                ErrorKind::StopOnError,
                                "Load stopped after a failed file",
                                task
                            );
                            error!(worker_id = %self.id, error = %err, "raising fatal error");
                        }

                        summary.exit = WorkerExit::StoppedOnError;
                        summary.skipped = tasks.len() - index - 1;
                        break;
                    }
                }
            }
        }

        if let Err(err) = self.destination.shutdown().await {
            warn!(worker_id = %self.id, error = %err, "failed to shut down destination");
        }

        info!(
            worker_id = %self.id,
            exit = ?summary.exit,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            "file worker finished"
        );

        summary
    }

    /// Opens the source of `task` and copies it into the destination.
    async fn load(&mut self, task: &LoadTask) -> LoadResult<u64> {
        let file = tokio::fs::File::open(&task.source)
            .await
            .map_err(|err| LoadError::from(err).with_kind(ErrorKind::SourceOpenFailed))?;

        self.destination.copy_file(file, &task.destination).await
    }
}
