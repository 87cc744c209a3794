//! Units of work and their static assignment to workers.

use std::fmt;
use std::path::PathBuf;

/// A single file to load: a local source and its destination relative to the table root.
///
/// Tasks are produced once by enumeration and consumed exactly once by exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadTask {
    /// Local file that is streamed to the destination.
    pub source: PathBuf,
    /// Path of the file inside the directory table, `/`-separated and never absolute.
    pub destination: String,
}

impl LoadTask {
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
        }
    }
}

impl fmt::Display for LoadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source.display(), self.destination)
    }
}

/// Returns how many workers a run with `task_count` tasks actually uses.
///
/// The requested count is clamped to the number of tasks, so no worker starts with an empty
/// bucket. A run without tasks still gets a single worker, which completes immediately.
pub fn effective_worker_count(requested: usize, task_count: usize) -> usize {
    requested.min(task_count).max(1)
}

/// Splits `tasks` into `worker_count` buckets, assigning the task at position `i` to bucket
/// `i % worker_count`.
///
/// Order is preserved within a bucket. Bucket sizes differ by at most one.
///
/// # Panics
///
/// Panics if `worker_count` is zero.
pub fn partition_tasks(tasks: Vec<LoadTask>, worker_count: usize) -> Vec<Vec<LoadTask>> {
    assert!(worker_count > 0, "tasks cannot be partitioned across zero workers");

    let bucket_capacity = tasks.len().div_ceil(worker_count);
    let mut buckets: Vec<Vec<LoadTask>> = (0..worker_count)
        .map(|_| Vec::with_capacity(bucket_capacity))
        .collect();

    for (index, task) in tasks.into_iter().enumerate() {
        buckets[index % worker_count].push(task);
    }

    buckets
}
