use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Index of a worker inside its pool.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(pub usize);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reason a worker's loop ended.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    /// Every task of the bucket was attempted.
    Completed,
    /// The cancellation token was set before the bucket was exhausted.
    Cancelled,
    /// A task failed while stop-on-error was enabled.
    StoppedOnError,
}

/// Outcome of a single worker run, returned when its task ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSummary {
    pub id: WorkerId,
    pub exit: WorkerExit,
    pub succeeded: u64,
    pub failed: u64,
    /// Tasks of the bucket that were never started.
    pub skipped: usize,
}

/// Success and failure counters shared by all workers of a pool.
///
/// Each task is counted exactly once by the worker that owns it.
#[derive(Debug, Default)]
pub struct LoadCounters {
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl LoadCounters {
    pub fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}
