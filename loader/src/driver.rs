//! Run loop racing the pool's signals against an external interrupt.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::bail;
use crate::destination::Destination;
use crate::error::{ErrorKind, LoadResult};
use crate::workers::pool::{PoolSignals, WorkManager};

/// Which event ended a run.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every worker finished its bucket. Individual files may still have failed.
    Completed,
    /// A file failed under stop-on-error, or a worker panicked.
    FatalError,
    /// The run was interrupted from outside.
    Interrupted,
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::FatalError => write!(f, "fatal error"),
            RunOutcome::Interrupted => write!(f, "interrupted"),
        }
    }
}

/// Final counts of a run, read after the pool stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub succeeded: u64,
    pub failed: u64,
    pub total: usize,
    pub elapsed: Duration,
}

impl RunReport {
    /// Process exit status for this report.
    ///
    /// Failed files do not change the status of a completed run.
    pub fn exit_code(&self) -> i32 {
        match self.outcome {
            RunOutcome::Completed => 0,
            RunOutcome::FatalError => 1,
            RunOutcome::Interrupted => 130,
        }
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "succeeded={} failed={} total={} elapsed={:.3}s outcome={}",
            self.succeeded,
            self.failed,
            self.total,
            self.elapsed.as_secs_f64(),
            self.outcome
        )
    }
}

/// Starts `manager` and waits for the first of interrupt, fatal error or completion.
///
/// Whatever happens first decides the outcome; the pool is stopped afterwards in every case.
/// Every `heartbeat` a progress line is logged while waiting.
pub async fn drive<D, F>(
    manager: &mut WorkManager<D>,
    interrupt: F,
    heartbeat: Duration,
) -> LoadResult<RunReport>
where
    D: Destination + Send + 'static,
    F: Future<Output = ()>,
{
    if heartbeat.is_zero() {
        bail!(ErrorKind::InvalidInput, "Heartbeat interval must be positive");
    }

    let started = Instant::now();
    let PoolSignals {
        mut completion,
        mut fatal,
    } = manager.start()?;

    let mut ticker = tokio::time::interval_at(started + heartbeat, heartbeat);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tokio::pin!(interrupt);

    let outcome = loop {
        tokio::select! {
            biased;

            _ = &mut interrupt => {
                warn!("interrupt received, stopping workers");
                break RunOutcome::Interrupted;
            }
            true = fatal.wait() => {
                error!("fatal error raised, stopping workers");
                break RunOutcome::FatalError;
            }
            true = completion.wait() => {
                break RunOutcome::Completed;
            }
            _ = ticker.tick() => {
                info!(
                    succeeded = manager.num_succeeded_files(),
                    failed = manager.num_failed_files(),
                    total = manager.total_tasks(),
                    "load in progress"
                );
            }
        }
    };

    manager.stop().await;

    let report = RunReport {
        outcome,
        succeeded: manager.num_succeeded_files(),
        failed: manager.num_failed_files(),
        total: manager.total_tasks(),
        elapsed: started.elapsed(),
    };

    info!(
        outcome = %report.outcome,
        succeeded = report.succeeded,
        failed = report.failed,
        total = report.total,
        elapsed_ms = report.elapsed.as_millis() as u64,
        "load finished"
    );

    Ok(report)
}
