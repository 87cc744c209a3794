use std::future::pending;
use std::time::Duration;

use loader::destination::memory::MemoryDestination;
use loader::driver::{RunOutcome, drive};
use loader::error::ErrorKind;
use loader::task::{LoadTask, effective_worker_count};
use loader::test_utils::files::{create_source_files, source_destination};
use loader::workers::pool::{PoolState, WorkManager};
use telemetry::tracing::init_test_tracing;

const HEARTBEAT: Duration = Duration::from_millis(10);

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
async fn completed_run_reports_all_files() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tasks = create_source_files(dir.path(), 10);
    let destination = MemoryDestination::new();
    destination.fail_on(source_destination(7)).await;

    let mut manager = pool(tasks, &destination, 3, false);
    let report = drive(&mut manager, pending(), HEARTBEAT).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.exit_code(), 0);
    assert_eq!((report.succeeded, report.failed, report.total), (9, 1, 10));
    assert_eq!(manager.state(), PoolState::Stopped);
    assert_eq!(destination.shutdown_count().await, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn fatal_error_ends_the_run() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tasks = create_source_files(dir.path(), 12);
    let destination = MemoryDestination::new();
    destination.set_copy_delay(Duration::from_millis(20)).await;
    destination.fail_on(source_destination(0)).await;

    let mut manager = pool(tasks, &destination, 3, true);
    let report = drive(&mut manager, pending(), HEARTBEAT).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::FatalError);
    assert_eq!(report.exit_code(), 1);
    assert!(report.failed >= 1);
    assert!(report.succeeded + report.failed < report.total as u64);
    assert_eq!(destination.shutdown_count().await, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn interrupt_stops_the_run() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tasks = create_source_files(dir.path(), 10);
    let destination = MemoryDestination::new();
    destination.set_copy_delay(Duration::from_millis(100)).await;

    let mut manager = pool(tasks, &destination, 2, false);
    let interrupt = tokio::time::sleep(Duration::from_millis(30));
    let report = drive(&mut manager, interrupt, HEARTBEAT).await.unwrap();

    assert_eq!(report.outcome, RunOutcome::Interrupted);
    assert_eq!(report.exit_code(), 130);
    // Each worker finishes the copy it was running, then stops.
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 0);

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(manager.num_succeeded_files(), report.succeeded);
    assert_eq!(destination.attempted().await.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn pool_cannot_be_driven_twice() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tasks = create_source_files(dir.path(), 2);
    let destination = MemoryDestination::new();

    let mut manager = pool(tasks, &destination, 2, false);
    drive(&mut manager, pending(), HEARTBEAT).await.unwrap();

    let err = drive(&mut manager, pending(), HEARTBEAT).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test(flavor = "multi_thread")]
async fn zero_heartbeat_is_rejected_before_start() {
    init_test_tracing();
    let dir = tempfile::tempdir().unwrap();
    let tasks = create_source_files(dir.path(), 2);
    let destination = MemoryDestination::new();

    let mut manager = pool(tasks, &destination, 1, false);
    let err = drive(&mut manager, pending(), Duration::ZERO).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert_eq!(manager.state(), PoolState::Created);
}
