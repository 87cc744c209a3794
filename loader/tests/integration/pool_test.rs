use std::time::Duration;

use loader::destination::Destination;
use loader::destination::memory::MemoryDestination;
use loader::error::LoadResult;
use loader::task::{LoadTask, effective_worker_count};
use loader::test_utils::files::{create_source_files, source_contents, source_destination};
use loader::test_utils::signal::expect_raised;
use loader::workers::pool::{PoolState, WorkManager};
use telemetry::tracing::init_test_tracing;
use tokio::io::AsyncRead;

fn pool(
    tasks: Vec<LoadTask>,
    destination: &MemoryDestination,
    workers: usize,
    stop_on_error: bool,
) -> WorkManager<MemoryDestination> {
    let workers = effective_worker_count(workers, tasks.len());
    WorkManager::new(tasks, vec![destination.clone(); workers], stop_on_error).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn all_files_are_loaded_across_three_workers() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tasks = create_source_files(dir.path(), 10);
    let destination = MemoryDestination::new();

    let mut manager = pool(tasks, &destination, 3, false);
    assert_eq!(manager.worker_count(), 3);

    let mut signals = manager.start().unwrap();
    expect_raised(&mut signals.completion).await;
    assert!(!signals.fatal.is_raised());
    assert_eq!(manager.state(), PoolState::Completed);

    manager.stop().await;

    assert_eq!(manager.num_succeeded_files(), 10);
    assert_eq!(manager.num_failed_files(), 0);
    assert_eq!(destination.shutdown_count().await, 3);

    let mut copied = destination.copied_files().await;
    copied.sort_by(|a, b| a.destination.cmp(&b.destination));
    assert_eq!(copied.len(), 10);
    for (index, file) in copied.iter().enumerate() {
        assert_eq!(file.destination, source_destination(index));
        assert_eq!(file.contents, source_contents(index));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_file_is_counted_and_the_run_continues() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tasks = create_source_files(dir.path(), 5);
    let destination = MemoryDestination::new();
    // Worker 0 owns tasks 0, 2 and 4; task 2 is the second in its bucket.
    destination.fail_on(source_destination(2)).await;

    let mut manager = pool(tasks, &destination, 2, false);
    let mut signals = manager.start().unwrap();
    expect_raised(&mut signals.completion).await;
    manager.stop().await;

    assert!(!signals.fatal.is_raised());
    assert_eq!(manager.num_succeeded_files(), 4);
    assert_eq!(manager.num_failed_files(), 1);
    assert_eq!(destination.attempted().await.len(), 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_on_error_halts_only_the_failing_worker() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tasks = create_source_files(dir.path(), 5);
    let destination = MemoryDestination::new();
    destination.fail_on(source_destination(2)).await;

    let mut manager = pool(tasks, &destination, 2, true);
    let mut signals = manager.start().unwrap();

    expect_raised(&mut signals.fatal).await;
    assert_eq!(manager.state(), PoolState::FatalErrorRaised);

    // Worker 1 is not cancelled until the pool is stopped, so it finishes its bucket.
    expect_raised(&mut signals.completion).await;
    assert_eq!(manager.state(), PoolState::FatalErrorRaised);
    manager.stop().await;

    let attempted = destination.attempted().await;
    assert!(!attempted.contains(&source_destination(4)));
    assert!(attempted.contains(&source_destination(1)));
    assert!(attempted.contains(&source_destination(3)));
    assert_eq!(manager.num_succeeded_files(), 3);
    assert_eq!(manager.num_failed_files(), 1);
    assert_eq!(manager.state(), PoolState::Stopped);
}

#[tokio::test(flavor = "multi_thread")]
async fn unopenable_source_raises_the_fatal_signal_under_stop_on_error() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut tasks = vec![LoadTask::new(dir.path().join("missing.txt"), "missing.txt")];
    tasks.extend(create_source_files(dir.path(), 3));
    let destination = MemoryDestination::new();

    let mut manager = pool(tasks, &destination, 1, true);
    let mut signals = manager.start().unwrap();

    expect_raised(&mut signals.fatal).await;
    expect_raised(&mut signals.completion).await;
    assert_eq!(manager.state(), PoolState::FatalErrorRaised);
    manager.stop().await;

    assert_eq!(manager.num_succeeded_files(), 0);
    assert_eq!(manager.num_failed_files(), 1);
    assert!(destination.attempted().await.is_empty());
    assert_eq!(destination.shutdown_count().await, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn simultaneous_failures_raise_the_fatal_signal_without_blocking() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tasks = create_source_files(dir.path(), 8);
    let destination = MemoryDestination::new();
    destination.set_copy_delay(Duration::from_millis(20)).await;
    for task in &tasks {
        destination.fail_on(task.destination.clone()).await;
    }

    let mut manager = pool(tasks, &destination, 8, true);
    let mut signals = manager.start().unwrap();

    expect_raised(&mut signals.fatal).await;
    expect_raised(&mut signals.completion).await;
    manager.stop().await;

    assert_eq!(manager.num_failed_files(), 8);
    assert_eq!(manager.num_succeeded_files(), 0);
    assert_eq!(destination.shutdown_count().await, 8);
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_count_is_clamped_to_the_number_of_tasks() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tasks = create_source_files(dir.path(), 3);
    let destination = MemoryDestination::new();

    let mut manager = pool(tasks, &destination, 8, false);
    assert_eq!(manager.worker_count(), 3);

    let mut signals = manager.start().unwrap();
    expect_raised(&mut signals.completion).await;
    manager.stop().await;

    assert_eq!(manager.num_succeeded_files(), 3);
    assert_eq!(destination.shutdown_count().await, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn counters_add_up_to_the_task_count() {
    init_test_tracing();

    for (task_count, workers) in [(1, 1), (7, 3), (12, 5), (20, 4), (9, 9)] {
        let dir = tempfile::tempdir().unwrap();
        let mut tasks = create_source_files(dir.path(), task_count);
        let destination = MemoryDestination::new();
        for index in (0..task_count).step_by(3) {
            destination.fail_on(source_destination(index)).await;
        }
        // A source that cannot be opened is a failure as well.
        tasks.push(LoadTask::new(dir.path().join("missing.txt"), "missing.txt"));
        let total = tasks.len() as u64;

        let mut manager = pool(tasks, &destination, workers, false);
        let mut signals = manager.start().unwrap();
        expect_raised(&mut signals.completion).await;
        manager.stop().await;

        let expected_failures = task_count.div_ceil(3) as u64 + 1;
        assert_eq!(manager.num_failed_files(), expected_failures);
        assert_eq!(
            manager.num_succeeded_files() + manager.num_failed_files(),
            total
        );
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_is_idempotent_after_completion() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tasks = create_source_files(dir.path(), 4);
    let destination = MemoryDestination::new();

    let mut manager = pool(tasks, &destination, 2, false);
    let mut signals = manager.start().unwrap();
    expect_raised(&mut signals.completion).await;

    manager.stop().await;
    manager.stop().await;
    manager.stop().await;

    assert_eq!(manager.state(), PoolState::Stopped);
    assert_eq!(destination.shutdown_count().await, 2);
    assert_eq!(manager.num_succeeded_files(), 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn counters_do_not_change_after_stop() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tasks = create_source_files(dir.path(), 20);
    let destination = MemoryDestination::new();
    destination.set_copy_delay(Duration::from_millis(50)).await;

    let mut manager = pool(tasks, &destination, 4, false);
    let _signals = manager.start().unwrap();

    tokio::time::sleep(Duration::from_millis(60)).await;
    manager.stop().await;

    let succeeded = manager.num_succeeded_files();
    let failed = manager.num_failed_files();
    let attempted = destination.attempted().await.len();
    assert!(succeeded + failed < 20);
    // In-flight copies were finished, never abandoned.
    assert_eq!(succeeded + failed, attempted as u64);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(manager.num_succeeded_files(), succeeded);
    assert_eq!(manager.num_failed_files(), failed);
    assert_eq!(destination.attempted().await.len(), attempted);
    assert_eq!(destination.shutdown_count().await, 4);
}

/// Destination whose copies always panic.
#[derive(Debug, Clone)]
struct PanickingDestination;

impl Destination for PanickingDestination {
    fn name() -> &'static str {
        "panicking"
    }

    async fn copy_file<R>(&mut self, _reader: R, destination: &str) -> LoadResult<u64>
    where
        R: AsyncRead + Unpin + Send,
    {
        panic!("copy into {destination} panicked");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn worker_panic_raises_the_fatal_signal() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tasks = create_source_files(dir.path(), 4);

    let mut manager = WorkManager::new(tasks, vec![PanickingDestination; 2], false).unwrap();
    let mut signals = manager.start().unwrap();

    expect_raised(&mut signals.fatal).await;
    expect_raised(&mut signals.completion).await;
    manager.stop().await;

    assert_eq!(manager.state(), PoolState::Stopped);
    assert_eq!(manager.num_succeeded_files(), 0);
    assert_eq!(manager.num_failed_files(), 0);
}
