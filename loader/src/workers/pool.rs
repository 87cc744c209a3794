use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::bail;
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::concurrency::signal::{SignalRx, SignalTx, create_signal};
use crate::destination::Destination;
use crate::error::{ErrorKind, LoadResult};
use crate::load_error;
use crate::task::{LoadTask, effective_worker_count, partition_tasks};
use crate::workers::base::{LoadCounters, WorkerId, WorkerSummary};
use crate::workers::file::FileWorker;

/// Observable lifecycle state of a [`WorkManager`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PoolState {
    /// Workers are built but not started.
    Created,
    /// Workers are running and no terminal event happened yet.
    Running,
    /// Every worker finished and the fatal signal never fired.
    Completed,
    /// The fatal signal fired. [`WorkManager::stop`] still has to be called.
    FatalErrorRaised,
    /// All workers were joined. Terminal.
    Stopped,
}

/// Signals handed to the run loop by [`WorkManager::start`]. Each fires at most once.
#[derive(Debug, Clone)]
pub struct PoolSignals {
    /// Fires after every worker finished.
    pub completion: SignalRx,
    /// Fires on the first failed task under stop-on-error, or when a worker panics.
    pub fatal: SignalRx,
}

#[derive(Debug)]
enum Phase<D> {
    Created {
        workers: Vec<FileWorker<D>>,
        shutdown_txs: Vec<ShutdownTx>,
    },
    Running {
        shutdown_txs: Vec<ShutdownTx>,
        shutdown_sync_rx: SignalRx,
    },
    Stopped,
}

/// Supervisor owning every worker of a load run.
///
/// Each worker gets one destination and one bucket of tasks. The pool aggregates the shared
/// success and failure counters and exposes the completion and fatal-error signals.
#[derive(Debug)]
pub struct WorkManager<D> {
    phase: Phase<D>,
    counters: Arc<LoadCounters>,
    total_tasks: usize,
    worker_count: usize,
    completion_tx: SignalTx,
    fatal_tx: SignalTx,
}

impl<D> WorkManager<D>
where
    D: Destination + Send + 'static,
{
    /// Builds one worker per destination and partitions `tasks` across them.
    ///
    /// The number of destinations must already be clamped to the number of tasks with
    /// [`effective_worker_count`].
    pub fn new(tasks: Vec<LoadTask>, destinations: Vec<D>, stop_on_error: bool) -> LoadResult<Self> {
        let worker_count = destinations.len();
        if worker_count == 0 {
            bail!(
                ErrorKind::InvalidInput,
                "At least one destination is required"
            );
        }

        let total_tasks = tasks.len();
        if effective_worker_count(worker_count, total_tasks) != worker_count {
            bail!(
                ErrorKind::InvalidInput,
                "More destinations than tasks",
                format!("{worker_count} destinations for {total_tasks} tasks")
            );
        }

        let counters = Arc::new(LoadCounters::default());
        let (completion_tx, _) = create_signal();
        let (fatal_tx, _) = create_signal();

        let mut workers = Vec::with_capacity(worker_count);
        let mut shutdown_txs = Vec::with_capacity(worker_count);
        let buckets = partition_tasks(tasks, worker_count);
        for (index, (bucket, destination)) in buckets.into_iter().zip(destinations).enumerate() {
            let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
            workers.push(FileWorker::new(
                WorkerId(index),
                destination,
                bucket,
                counters.clone(),
                fatal_tx.clone(),
                stop_on_error,
                shutdown_rx,
            ));
            shutdown_txs.push(shutdown_tx);
        }

        debug!(
            workers = worker_count,
            tasks = total_tasks,
            stop_on_error,
            "work manager created"
        );

        Ok(Self {
            phase: Phase::Created {
                workers,
                shutdown_txs,
            },
            counters,
            total_tasks,
            worker_count,
            completion_tx,
            fatal_tx,
        })
    }

    /// Launches every worker plus a supervisor task joining them.
    ///
    /// Once all workers returned, the supervisor raises the internal shutdown-sync signal and
    /// then the completion signal. Returns the completion and fatal-error signals.
    pub fn start(&mut self) -> LoadResult<PoolSignals> {
        if !matches!(self.phase, Phase::Created { .. }) {
            bail!(
                ErrorKind::InvalidState,
                "Work manager can only be started once",
                format!("current state is {:?}", self.state())
            );
        }

        let Phase::Created {
            workers,
            shutdown_txs,
        } = std::mem::replace(&mut self.phase, Phase::Stopped)
        else {
            unreachable!("phase was checked to be created");
        };

        let mut join_set = JoinSet::new();
        for worker in workers {
            join_set.spawn(worker.run());
        }

        let (shutdown_sync_tx, shutdown_sync_rx) = create_signal();
        tokio::spawn(supervise(
            join_set,
            self.fatal_tx.clone(),
            shutdown_sync_tx,
            self.completion_tx.clone(),
        ));

        self.phase = Phase::Running {
            shutdown_txs,
            shutdown_sync_rx,
        };

        info!(
            workers = self.worker_count,
            tasks = self.total_tasks,
            "work manager started"
        );

        Ok(PoolSignals {
            completion: self.completion_tx.subscribe(),
            fatal: self.fatal_tx.subscribe(),
        })
    }

    /// Cancels every worker and waits until all of them returned.
    ///
    /// Tasks already in flight are finished first. Once this returns, the counters are final
    /// and every destination was released. Calling it again is a no-op. Stopping a pool that
    /// was never started releases its destinations without running any task.
    pub async fn stop(&mut self) {
        if let Phase::Running {
            shutdown_txs,
            shutdown_sync_rx,
        } = &mut self.phase
        {
            for shutdown_tx in shutdown_txs.iter() {
                shutdown_tx.shutdown();
            }

            if !shutdown_sync_rx.wait().await {
                warn!("work manager supervisor exited without confirming shutdown");
            }
        }

        match std::mem::replace(&mut self.phase, Phase::Stopped) {
            Phase::Created { workers, .. } => {
                for worker in workers {
                    let worker_id = worker.id();
                    if let Err(err) = worker.into_destination().shutdown().await {
                        warn!(%worker_id, error = %err, "failed to shut down destination");
                    }
                }

                info!("work manager stopped before it was started");
            }
            Phase::Running { .. } => {
                info!(
                    succeeded = self.num_succeeded_files(),
                    failed = self.num_failed_files(),
                    total = self.total_tasks,
                    "work manager stopped"
                );
            }
            Phase::Stopped => {
                debug!("work manager already stopped");
            }
        }
    }
}

impl<D> WorkManager<D> {
    /// Returns the current lifecycle state.
    pub fn state(&self) -> PoolState {
        self.state_of(&self.phase)
    }

    fn state_of(&self, phase: &Phase<D>) -> PoolState {
        match phase {
            Phase::Created { .. } => PoolState::Created,
            Phase::Running { .. } if self.fatal_tx.is_raised() => PoolState::FatalErrorRaised,
            Phase::Running { .. } if self.completion_tx.is_raised() => PoolState::Completed,
            Phase::Running { .. } => PoolState::Running,
            Phase::Stopped => PoolState::Stopped,
        }
    }

    /// Point-in-time number of files loaded successfully.
    pub fn num_succeeded_files(&self) -> u64 {
        self.counters.succeeded()
    }

    /// Point-in-time number of files that failed to load.
    pub fn num_failed_files(&self) -> u64 {
        self.counters.failed()
    }

    /// Total number of tasks handed to the pool.
    pub fn total_tasks(&self) -> usize {
        self.total_tasks
    }

    /// Number of workers, equal to the number of destinations.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }
}

/// Joins every worker, then raises shutdown-sync and completion, in that order.
///
/// A panicking worker raises the fatal signal.
async fn supervise(
    mut join_set: JoinSet<WorkerSummary>,
    fatal_tx: SignalTx,
    shutdown_sync_tx: SignalTx,
    completion_tx: SignalTx,
) {
    while let Some(result) = join_set.join_next().await {
        match result {
            Ok(summary) => {
                debug!(worker_id = %summary.id, exit = ?summary.exit, "worker joined");
            }
            Err(join_err) if join_err.is_cancelled() => {
                debug!("worker task was cancelled");
            }
            Err(join_err) => {
                let err = load_error!(ErrorKind::WorkerPanic, "File worker panicked", join_err);
                error!(error = %err, "worker panicked, raising fatal error");
                fatal_tx.raise();
            }
        }
    }

    shutdown_sync_tx.raise();
    completion_tx.raise();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::memory::MemoryDestination;
    use crate::test_utils::files::create_source_files;
    use crate::test_utils::signal::expect_raised;

    #[tokio::test]
    async fn more_destinations_than_tasks_are_rejected() {
        let tasks = vec![LoadTask::new("/a", "a"), LoadTask::new("/b", "b")];
        let destinations = vec![MemoryDestination::new(); 3];

        let err = WorkManager::new(tasks, destinations, false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn empty_destination_set_is_rejected() {
        let err = WorkManager::<MemoryDestination>::new(vec![], vec![], false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn pool_moves_through_its_states() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = create_source_files(dir.path(), 4);
        let destination = MemoryDestination::new();

        let mut manager = WorkManager::new(tasks, vec![destination.clone(); 2], false).unwrap();
        assert_eq!(manager.state(), PoolState::Created);

        let mut signals = manager.start().unwrap();
        expect_raised(&mut signals.completion).await;
        assert_eq!(manager.state(), PoolState::Completed);

        manager.stop().await;
        assert_eq!(manager.state(), PoolState::Stopped);

        let err = manager.start().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert_eq!(manager.state(), PoolState::Stopped);
    }

    #[tokio::test]
    async fn stopping_an_unstarted_pool_releases_destinations() {
        let dir = tempfile::tempdir().unwrap();
        let tasks = create_source_files(dir.path(), 3);
        let destination = MemoryDestination::new();

        let mut manager = WorkManager::new(tasks, vec![destination.clone(); 3], false).unwrap();
        manager.stop().await;
        manager.stop().await;

        assert_eq!(manager.state(), PoolState::Stopped);
        assert_eq!(destination.shutdown_count().await, 3);
        assert!(destination.attempted().await.is_empty());
        assert_eq!(
            manager.start().unwrap_err().kind(),
            ErrorKind::InvalidState
        );
    }

    #[tokio::test]
    async fn pool_without_tasks_completes_immediately() {
        let destination = MemoryDestination::new();
        let mut manager = WorkManager::new(vec![], vec![destination.clone()], false).unwrap();

        let mut signals = manager.start().unwrap();
        expect_raised(&mut signals.completion).await;
        manager.stop().await;

        assert_eq!(manager.num_succeeded_files(), 0);
        assert_eq!(manager.num_failed_files(), 0);
        assert!(!signals.fatal.is_raised());
    }
}
