//! Repair Orchestrator
//!
//! Drives one session end to end: snapshot, fast check, locate, fix loop,
//! full verification, and recovery on anything unexpected. The working
//! tree ends either holding a fix that passed every configured suite or
//! bit-for-bit the original snapshot.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::backup_manager::BackupManager;
use super::diagnostics::DiagnosticsCollector;
use super::fix_controller::FixIterationController;
use super::recovery::RecoveryHandler;
use super::reference_locator::{LocateReport, ReferenceLocator};
use super::result_aggregator::ResultAggregator;
use super::suite_runner::{run_suite, ParallelSuiteRunner};
use super::workspace::Workspace;
use crate::domain::errors::{ExhaustionReason, RepairError, RepairResult};
use crate::domain::models::{
    AggregateReport, Config, RecoveryReport, ReferenceState, RepairReport, RepairSession,
    SessionOutcome, SuiteRun, Termination,
};
use crate::domain::ports::{FixProposer, SuiteExecutor, VcsProvider};
use crate::infrastructure::storage::ReportStore;

/// The three external collaborators a session needs.
#[derive(Clone)]
pub struct RepairPorts {
    pub vcs: Arc<dyn VcsProvider>,
    pub executor: Arc<dyn SuiteExecutor>,
    pub proposer: Arc<dyn FixProposer>,
}

/// Session facts gathered outside the session aggregate, folded into the
/// report at the end.
#[derive(Debug, Default)]
struct Findings {
    probes: Vec<ReferenceState>,
    baseline: Option<ReferenceState>,
    aggregate: Option<AggregateReport>,
    exhaustion: Option<ExhaustionReason>,
    recovery: Option<RecoveryReport>,
    error: Option<String>,
}

pub struct RepairOrchestrator {
    backup: Arc<BackupManager>,
    locator: ReferenceLocator,
    controller: FixIterationController,
    runner: ParallelSuiteRunner,
    executor: Arc<dyn SuiteExecutor>,
    aggregator: ResultAggregator,
    recovery: RecoveryHandler,
    reports: ReportStore,
    session_id: Uuid,
    max_attempts: usize,
    fast_suite: String,
    /// Suites a verification run executes.
    selected: Vec<String>,
    /// Suites a verdict is measured against.
    configured: Vec<String>,
    timeout: Duration,
}

fn panic_cause(panic: &(dyn std::any::Any + Send)) -> RepairError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    RepairError::Invariant(format!("panicked: {message}"))
}

impl RepairOrchestrator {
    /// Wire every component from `config`. Fails with `Setup` when no suite
    /// is configured.
    pub fn new(ports: RepairPorts, config: &Config) -> RepairResult<Self> {
        let fast_suite = config
            .fast_suite_id()
            .ok_or_else(|| RepairError::Setup("no suites configured".to_string()))?
            .to_string();
        let workspace = Arc::new(Workspace::new(ports.vcs));
        let backup = Arc::new(BackupManager::new(workspace.clone(), &config.state_dir));
        let aggregator = ResultAggregator::from_config(config);
        let timeout = config.suite_timeout();

        Ok(Self {
            locator: ReferenceLocator::new(
                workspace.clone(),
                ports.executor.clone(),
                aggregator.clone(),
                fast_suite.clone(),
                timeout,
            ),
            controller: FixIterationController::new(
                workspace,
                ports.executor.clone(),
                ports.proposer,
                aggregator.clone(),
                DiagnosticsCollector::new(config.diagnostics_tail_lines)?,
                fast_suite.clone(),
                timeout,
                config.max_consecutive_regressions,
            ),
            runner: ParallelSuiteRunner::new(ports.executor.clone()),
            executor: ports.executor,
            aggregator,
            recovery: RecoveryHandler::new(backup.clone()),
            reports: ReportStore::new(&config.state_dir),
            backup,
            session_id: Uuid::new_v4(),
            max_attempts: config.max_attempts,
            fast_suite,
            selected: config.selected_suite_ids(),
            configured: config.suite_ids(),
            timeout,
        })
    }

    /// Use a pre-chosen session id (suite logs are laid out under it).
    #[must_use]
    pub const fn with_session_id(mut self, session_id: Uuid) -> Self {
        self.session_id = session_id;
        self
    }

    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn backup(&self) -> &BackupManager {
        &self.backup
    }

    pub const fn reports(&self) -> &ReportStore {
        &self.reports
    }

    /// Run a full repair session.
    ///
    /// Returns `Err` only when the snapshot cannot be taken, in which case
    /// nothing was touched. Every other ending, fatal ones included, comes
    /// back as a report whose outcome carries the exit code.
    #[instrument(skip_all, fields(session_id = %self.session_id, max_attempts = self.max_attempts))]
    pub async fn run(&self, cancel: &CancellationToken) -> RepairResult<RepairReport> {
        let snapshot = self.backup.create_snapshot().await?;
        let mut session = RepairSession::with_id(self.session_id, snapshot, self.max_attempts);
        let mut findings = Findings::default();

        let driven = AssertUnwindSafe(self.drive(&mut session, &mut findings, cancel))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(panic_cause(panic.as_ref())));

        match driven {
            Ok(outcome) => {
                if let Err(e) = session.finalize(outcome) {
                    error!(error = %e, "could not finalize session");
                }
                if let Err(e) = self.backup.release(session.snapshot()) {
                    warn!(error = %e, "could not release snapshot marker");
                }
            }
            Err(e) => {
                error!(error = %e, "session failed; entering recovery");
                findings.recovery = Some(self.recovery.recover(&mut session, &e).await);
                findings.error = Some(e.to_string());
            }
        }

        let report = self.build_report(&session, findings);
        match self.reports.save(&report) {
            Ok(path) => info!(path = %path.display(), outcome = %report.outcome, "session report written"),
            Err(e) => warn!(error = %e, "could not write session report"),
        }
        Ok(report)
    }

    async fn drive(
        &self,
        session: &mut RepairSession,
        findings: &mut Findings,
        cancel: &CancellationToken,
    ) -> RepairResult<SessionOutcome> {
        let initial = self.fast_check(cancel).await?;
        session.record_suite_runs([initial.clone()]);

        if ResultAggregator::status_of(&initial).is_passed() {
            info!(fast_suite = %self.fast_suite, "fast suite already passes; skipping repair");
        } else {
            let located = match self.locator.locate(session.snapshot(), cancel).await {
                Ok(located) => located,
                Err(RepairError::Locate { probes }) => {
                    findings.error = Some(RepairError::Locate { probes: probes.clone() }.to_string());
                    findings.probes = probes;
                    self.backup.ensure_restored(session.snapshot()).await?;
                    return Ok(SessionOutcome::LocateFailed);
                }
                Err(e) => return Err(e),
            };
            findings.probes = located.probes;
            findings.baseline = Some(located.baseline.clone());

            match self
                .controller
                .run_loop(session, &located.baseline, &initial, cancel)
                .await
            {
                Ok(accepted) => info!(
                    attempt = accepted.sequence,
                    strategy = %accepted.strategy_descriptor,
                    "fix accepted by fast suite"
                ),
                Err(e @ RepairError::FixExhausted { reason, .. }) => {
                    findings.exhaustion = Some(reason);
                    findings.error = Some(e.to_string());
                    self.backup.ensure_restored(session.snapshot()).await?;
                    return Ok(SessionOutcome::AttemptsExhausted);
                }
                Err(e) => return Err(e),
            }
        }

        let (runs, aggregate) = self.verify(cancel).await;
        session.record_suite_runs(runs);
        let complete = aggregate.complete;
        let passed = aggregate.passed();
        let selection_passed = aggregate.evaluated_passed();
        findings.aggregate = Some(aggregate);
        if !complete {
            return Err(RepairError::Cancelled);
        }
        if passed {
            return Ok(SessionOutcome::Succeeded);
        }
        if selection_passed {
            info!("selected suites pass; remaining configured suites not run");
            return Ok(SessionOutcome::PartiallyVerified);
        }
        if self.backup.ensure_restored(session.snapshot()).await? {
            info!("full verification failed; original changes restored");
        }
        Ok(SessionOutcome::VerificationFailed)
    }

    async fn fast_check(&self, cancel: &CancellationToken) -> RepairResult<SuiteRun> {
        let mut run = run_suite(self.executor.as_ref(), &self.fast_suite, self.timeout, cancel).await;
        if run.termination == Termination::Cancelled {
            return Err(RepairError::Cancelled);
        }
        self.aggregator.parse_run(&mut run).await;
        Ok(run)
    }

    /// Run the selected suites in parallel and aggregate against every
    /// configured suite, so a narrowed run comes back `Partial`. Never
    /// touches the working tree.
    #[instrument(skip_all, fields(selected = self.selected.len(), configured = self.configured.len()))]
    pub async fn verify(&self, cancel: &CancellationToken) -> (Vec<SuiteRun>, AggregateReport) {
        let batch = self.runner.run_all(&self.selected, self.timeout, cancel).await;
        self.aggregator
            .evaluate(batch.runs, &self.configured, batch.complete)
            .await
    }

    /// Snapshot, locate, and release. The tree is left as found.
    #[instrument(skip_all, fields(session_id = %self.session_id))]
    pub async fn locate(&self, cancel: &CancellationToken) -> RepairResult<LocateReport> {
        let snapshot = self.backup.create_snapshot().await?;
        let located = self.locator.locate(&snapshot, cancel).await;
        match self.backup.ensure_restored(&snapshot).await {
            Ok(_) => self.backup.release(&snapshot)?,
            Err(e) => {
                error!(error = %e, "tree differs from snapshot after locate");
                return Err(e);
            }
        }
        located
    }

    fn build_report(&self, session: &RepairSession, findings: Findings) -> RepairReport {
        let mut report = RepairReport::from_session(session);
        report.fix_applied = matches!(
            session.outcome(),
            SessionOutcome::Succeeded | SessionOutcome::PartiallyVerified
        ) && !session.attempts().is_empty();
        report.probes = findings.probes;
        report.baseline = findings.baseline;
        report.aggregate = findings.aggregate;
        report.exhaustion = findings.exhaustion;
        report.recovery = findings.recovery;
        report.error = findings.error;
        report
    }
}
