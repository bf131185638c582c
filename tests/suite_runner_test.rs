//! Parallel suite runs against scripted suites on a paused clock.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{bug_lines, temp_dir};
use mender::adapters::memory::{InMemoryVcs, ScriptedSuiteExecutor};
use mender::domain::models::{
    SuiteStatus, Termination, Verdict, CRASH_EXIT_CODE, TIMEOUT_EXIT_CODE,
};
use mender::services::{ParallelSuiteRunner, ResultAggregator};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| (*s).to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn slow_smoke_suite_times_out_while_others_pass() {
    let dir = temp_dir();
    let vcs = Arc::new(InMemoryVcs::new([("bugs.txt", "")]));
    let executor = ScriptedSuiteExecutor::new(vcs, dir.path())
        .suite("unit", bug_lines)
        .suite("integration", bug_lines)
        .suite("smoke", bug_lines)
        .with_delay("unit", Duration::from_secs(20))
        .with_delay("integration", Duration::from_secs(20))
        .with_delay("smoke", Duration::from_secs(31 * 60));
    let runner = ParallelSuiteRunner::new(Arc::new(executor));
    let suites = ids(&["unit", "integration", "smoke"]);

    let started = Instant::now();
    let batch = runner
        .run_all(&suites, Duration::from_secs(30 * 60), &CancellationToken::new())
        .await;
    assert!(started.elapsed() < Duration::from_secs(31 * 60));

    assert!(batch.complete);
    assert_eq!(batch.runs.len(), 3);
    let smoke = &batch.runs[2];
    assert_eq!(smoke.suite_id, "smoke");
    assert_eq!(smoke.exit_code, TIMEOUT_EXIT_CODE);
    assert_eq!(smoke.termination, Termination::TimedOut);
    assert!(batch.runs[0].duration_ms >= 20_000);

    let (_, report) = ResultAggregator::default()
        .evaluate(batch.runs, &suites, batch.complete)
        .await;
    assert_eq!(report.overall, Verdict::Failed);
    assert_eq!(report.per_suite.get("unit"), Some(&SuiteStatus::Passed));
    assert_eq!(report.per_suite.get("integration"), Some(&SuiteStatus::Passed));
    assert_eq!(report.per_suite.get("smoke"), Some(&SuiteStatus::TimedOut));
    assert!(report.summary().contains("smoke"));
}

#[tokio::test(start_paused = true)]
async fn every_requested_suite_gets_a_run() {
    let dir = temp_dir();
    let vcs = Arc::new(InMemoryVcs::new([("bugs.txt", "a\n")]));
    let executor = ScriptedSuiteExecutor::new(vcs, dir.path())
        .suite("unit", bug_lines)
        .suite("boom", bug_lines)
        .suite("slow", bug_lines)
        .panicking("boom")
        .with_delay("slow", Duration::from_secs(600));
    let runner = ParallelSuiteRunner::new(Arc::new(executor));
    let suites = ids(&["unit", "boom", "slow", "missing", "unit"]);

    let batch = runner
        .run_all(&suites, Duration::from_secs(60), &CancellationToken::new())
        .await;

    assert_eq!(batch.runs.len(), suites.len());
    let got: Vec<&str> = batch.runs.iter().map(|r| r.suite_id.as_str()).collect();
    assert_eq!(got, vec!["unit", "boom", "slow", "missing", "unit"]);
    assert_eq!(batch.runs[1].termination, Termination::Crashed);
    assert_eq!(batch.runs[1].exit_code, CRASH_EXIT_CODE);
    assert_eq!(batch.runs[2].termination, Termination::TimedOut);
    assert_eq!(batch.runs[3].termination, Termination::Crashed);
    assert_ne!(batch.runs[0].log_location, batch.runs[4].log_location);
}

#[tokio::test(start_paused = true)]
async fn cancelled_batch_is_incomplete_but_full_length() {
    let dir = temp_dir();
    let vcs = Arc::new(InMemoryVcs::new([("bugs.txt", "")]));
    let executor = ScriptedSuiteExecutor::new(vcs, dir.path())
        .suite("unit", bug_lines)
        .suite("integration", bug_lines)
        .with_delay("integration", Duration::from_secs(300));
    let runner = ParallelSuiteRunner::new(Arc::new(executor));
    let suites = ids(&["unit", "integration"]);
    let cancel = CancellationToken::new();

    let (batch, ()) = tokio::join!(
        runner.run_all(&suites, Duration::from_secs(600), &cancel),
        async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            cancel.cancel();
        }
    );

    assert!(!batch.complete);
    assert_eq!(batch.runs.len(), 2);
    assert_eq!(batch.runs[1].termination, Termination::Cancelled);

    let (_, report) = ResultAggregator::default()
        .evaluate(batch.runs, &suites, batch.complete)
        .await;
    assert!(!report.passed());
    assert!(!report.complete);
}
