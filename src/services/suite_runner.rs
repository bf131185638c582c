//! Parallel Suite Runner
//!
//! Runs suites as independent workers on a [`JoinSet`] and joins on all of
//! them. Every requested suite yields exactly one [`SuiteRun`], whether it
//! exited, timed out, crashed or was cancelled.

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::domain::errors::RepairError;
use crate::domain::models::{SuiteRun, Termination};
use crate::domain::ports::SuiteExecutor;

/// Slack given to an executor to report its own timeout before the runner
/// abandons it.
pub const KILL_GRACE: Duration = Duration::from_secs(5);

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Run one suite, racing it against its timeout and `cancel`.
///
/// Never fails: executor errors and panics become `Crashed` runs.
#[instrument(skip(executor, cancel), fields(timeout_secs = timeout.as_secs()))]
pub async fn run_suite(
    executor: &dyn SuiteExecutor,
    suite_id: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> SuiteRun {
    let started = Instant::now();
    let execution = AssertUnwindSafe(executor.run(suite_id, timeout)).catch_unwind();

    let outcome = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            warn!(suite_id, "suite cancelled");
            return SuiteRun::cancelled(suite_id, elapsed_ms(started));
        }
        res = tokio::time::timeout(timeout + KILL_GRACE, execution) => res,
    };

    let timed_out = |log_location: Option<PathBuf>| {
        let err = RepairError::SuiteTimeout {
            suite_id: suite_id.to_string(),
            timeout_secs: timeout.as_secs(),
        };
        warn!(error = %err, "suite killed");
        SuiteRun::timed_out(suite_id, log_location, elapsed_ms(started))
    };

    match outcome {
        Err(_) => timed_out(None),
        Ok(Err(panic)) => {
            error!(suite_id, panic = %panic_message(panic.as_ref()), "suite executor panicked");
            SuiteRun::crashed(suite_id, elapsed_ms(started))
        }
        Ok(Ok(Err(e))) => {
            error!(suite_id, error = %e, "suite executor failed");
            SuiteRun::crashed(suite_id, elapsed_ms(started))
        }
        Ok(Ok(Ok(execution))) if execution.timed_out => timed_out(Some(execution.log_path)),
        Ok(Ok(Ok(execution))) => {
            info!(
                suite_id,
                exit_code = execution.exit_code,
                duration_ms = execution.duration_ms,
                "suite finished"
            );
            SuiteRun::exited(
                suite_id,
                execution.exit_code,
                execution.log_path,
                execution.duration_ms,
            )
        }
    }
}

/// Runs of one `run_all` call, in request order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteBatch {
    pub runs: Vec<SuiteRun>,
    /// False when the parent token fired before every worker finished.
    pub complete: bool,
}

pub struct ParallelSuiteRunner {
    executor: Arc<dyn SuiteExecutor>,
}

impl ParallelSuiteRunner {
    pub fn new(executor: Arc<dyn SuiteExecutor>) -> Self {
        Self { executor }
    }

    /// Run every suite concurrently and wait for all of them.
    ///
    /// There is no early return on failure. Firing `cancel` stops the
    /// outstanding workers; their slots come back `Cancelled` and the batch
    /// is tagged incomplete.
    #[instrument(skip(self, cancel), fields(suites = suite_ids.len()))]
    pub async fn run_all(
        &self,
        suite_ids: &[String],
        per_suite_timeout: Duration,
        cancel: &CancellationToken,
    ) -> SuiteBatch {
        let token = cancel.child_token();
        let mut workers = JoinSet::new();
        for (slot, suite_id) in suite_ids.iter().enumerate() {
            let executor = Arc::clone(&self.executor);
            let suite_id = suite_id.clone();
            let token = token.clone();
            workers.spawn(async move {
                let run = run_suite(executor.as_ref(), &suite_id, per_suite_timeout, &token).await;
                (slot, run)
            });
        }

        let mut slots: Vec<Option<SuiteRun>> = vec![None; suite_ids.len()];
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok((slot, run)) => slots[slot] = Some(run),
                Err(e) => error!(error = %e, "suite worker aborted"),
            }
        }

        let runs: Vec<SuiteRun> = slots
            .into_iter()
            .zip(suite_ids)
            .map(|(run, id)| run.unwrap_or_else(|| SuiteRun::crashed(id.as_str(), 0)))
            .collect();
        let complete = !runs.iter().any(|r| r.termination == Termination::Cancelled);

        info!(
            complete,
            timed_out = runs.iter().filter(|r| r.termination == Termination::TimedOut).count(),
            crashed = runs.iter().filter(|r| r.termination == Termination::Crashed).count(),
            "all suite workers joined"
        );
        SuiteBatch { runs, complete }
    }
}
