//! Fix Iteration Controller
//!
//! The bounded repair loop: ask the proposer for a candidate, apply it,
//! verify with the fast suite, then accept it or revert it. Stops on the
//! first full pass, when the budget is spent, when the proposer runs out of
//! ideas or repeats itself, or after too many consecutive regressions.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use super::diagnostics::DiagnosticsCollector;
use super::result_aggregator::ResultAggregator;
use super::suite_runner::run_suite;
use super::workspace::{AppliedChange, Workspace};
use crate::domain::errors::{ExhaustionReason, RepairError, RepairResult};
use crate::domain::models::{
    FixAttempt, ReferenceState, RepairSession, Snapshot, SuiteRun, SuiteStatus, Termination,
    Verification,
};
use crate::domain::ports::{FixProposer, Proposal, SuiteExecutor, VcsError};

/// States of one controller run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Proposing,
    Applying,
    Verifying,
    Accepted,
    Rejected,
    Exhausted,
}

impl LoopState {
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Proposing | Self::Exhausted)
                | (Self::Proposing, Self::Applying | Self::Exhausted)
                | (Self::Applying, Self::Verifying | Self::Rejected)
                | (Self::Verifying, Self::Accepted | Self::Rejected)
                | (Self::Rejected, Self::Proposing | Self::Exhausted)
        )
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug)]
struct LoopMachine {
    state: LoopState,
}

impl LoopMachine {
    const fn new() -> Self {
        Self {
            state: LoopState::Idle,
        }
    }

    fn advance(&mut self, next: LoopState) -> RepairResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(RepairError::InvalidTransition {
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.state = next;
        Ok(())
    }

    fn exhaust(&mut self, attempts: usize, reason: ExhaustionReason) -> RepairError {
        if let Err(e) = self.advance(LoopState::Exhausted) {
            return e;
        }
        RepairError::FixExhausted { attempts, reason }
    }
}

/// Classify a verification run against the current reference failure count.
pub fn classify(run: &SuiteRun, reference_failures: Option<u32>) -> Verification {
    match ResultAggregator::status_of(run) {
        SuiteStatus::Passed => Verification::Passed,
        SuiteStatus::Failed { failures, .. } => match reference_failures {
            Some(reference) if failures < reference => Verification::Improved,
            Some(reference) if failures > reference => Verification::Failed,
            _ => Verification::NoProgress,
        },
        _ => Verification::Failed,
    }
}

pub struct FixIterationController {
    workspace: Arc<Workspace>,
    executor: Arc<dyn SuiteExecutor>,
    proposer: Arc<dyn FixProposer>,
    aggregator: ResultAggregator,
    diagnostics: DiagnosticsCollector,
    fast_suite: String,
    timeout: Duration,
    max_consecutive_regressions: usize,
}

impl FixIterationController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        workspace: Arc<Workspace>,
        executor: Arc<dyn SuiteExecutor>,
        proposer: Arc<dyn FixProposer>,
        aggregator: ResultAggregator,
        diagnostics: DiagnosticsCollector,
        fast_suite: impl Into<String>,
        timeout: Duration,
        max_consecutive_regressions: usize,
    ) -> Self {
        Self {
            workspace,
            executor,
            proposer,
            aggregator,
            diagnostics,
            fast_suite: fast_suite.into(),
            timeout,
            max_consecutive_regressions,
        }
    }

    async fn verify(&self, cancel: &CancellationToken) -> RepairResult<SuiteRun> {
        let mut run = run_suite(self.executor.as_ref(), &self.fast_suite, self.timeout, cancel).await;
        if run.termination == Termination::Cancelled {
            return Err(RepairError::Cancelled);
        }
        self.aggregator.parse_run(&mut run).await;
        Ok(run)
    }

    async fn propose(
        &self,
        diagnostics: &crate::domain::models::Diagnostics,
        tried: &[String],
        cancel: &CancellationToken,
    ) -> RepairResult<Proposal> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(RepairError::Cancelled),
            proposal = self.proposer.propose(diagnostics, tried) => Ok(proposal?),
        }
    }

    /// Revert after a failed verification. Errors are logged, not returned,
    /// because the caller is already unwinding with a more relevant error.
    async fn revert_quietly(&self, snapshot: &Snapshot, attempt: &FixAttempt, change: &AppliedChange) {
        if let Err(e) = self.workspace.revert_patch(snapshot, change).await {
            error!(attempt = attempt.sequence, error = %e, "revert after failed verification did not succeed");
        }
    }

    /// Run the loop until a candidate passes the fast suite.
    ///
    /// `initial_run` is the failing fast-suite run of the live tree; it seeds
    /// the diagnostics and the reference failure count. On success the
    /// accepted patch stays applied and the attempt is returned. Every other
    /// candidate is reverted before the next one is applied.
    #[instrument(
        skip_all,
        fields(session_id = %session.id(), max_attempts = session.max_attempts(), baseline = %baseline.label())
    )]
    pub async fn run_loop(
        &self,
        session: &mut RepairSession,
        baseline: &ReferenceState,
        initial_run: &SuiteRun,
        cancel: &CancellationToken,
    ) -> RepairResult<FixAttempt> {
        let mut machine = LoopMachine::new();
        let max_attempts = session.max_attempts();
        if max_attempts == 0 {
            return Err(machine.exhaust(0, ExhaustionReason::ZeroBudget));
        }

        let snapshot = session.snapshot().clone();
        let mut reference_failures = initial_run.parsed_failure_count;
        let mut diagnostics = self.diagnostics.collect(initial_run, Some(baseline), None).await;
        let mut consecutive_regressions = 0usize;

        loop {
            let attempts = session.attempts().len();
            if attempts >= max_attempts {
                return Err(machine.exhaust(attempts, ExhaustionReason::BudgetSpent));
            }
            if cancel.is_cancelled() {
                return Err(RepairError::Cancelled);
            }

            machine.advance(LoopState::Proposing)?;
            let tried = session.tried_strategies();
            let (patch, strategy) = match self.propose(&diagnostics, &tried, cancel).await? {
                Proposal::Exhausted => {
                    info!(attempts, "fix proposer exhausted");
                    return Err(machine.exhaust(attempts, ExhaustionReason::ProposerExhausted));
                }
                Proposal::Candidate {
                    patch,
                    strategy_descriptor,
                } => (patch, strategy_descriptor),
            };
            if session.has_tried(&strategy) {
                warn!(strategy = %strategy, "fix proposer repeated a strategy");
                return Err(machine.exhaust(attempts, ExhaustionReason::RepeatedStrategy));
            }

            let mut attempt = FixAttempt::new(attempts + 1, strategy, patch);
            machine.advance(LoopState::Applying)?;
            let change = match self.workspace.apply_patch(&snapshot, &attempt.patch).await {
                Ok(change) => change,
                Err(RepairError::Vcs(VcsError::PatchRejected(reason))) => {
                    warn!(attempt = attempt.sequence, strategy = %attempt.strategy_descriptor, %reason, "candidate patch does not apply");
                    attempt.complete(Verification::Failed, None, None)?;
                    session.push_attempt(attempt)?;
                    machine.advance(LoopState::Rejected)?;
                    diagnostics.previous_verification = Some(Verification::Failed);
                    consecutive_regressions += 1;
                    if self.regression_cap_hit(consecutive_regressions) {
                        return Err(machine.exhaust(session.attempts().len(), ExhaustionReason::Regressing));
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };

            machine.advance(LoopState::Verifying)?;
            let run = match AssertUnwindSafe(self.verify(cancel)).catch_unwind().await {
                Ok(Ok(run)) => run,
                Ok(Err(e)) => {
                    self.revert_quietly(&snapshot, &attempt, &change).await;
                    return Err(e);
                }
                Err(panic) => {
                    self.revert_quietly(&snapshot, &attempt, &change).await;
                    std::panic::resume_unwind(panic);
                }
            };

            let verdict = classify(&run, reference_failures);
            attempt.complete(verdict, run.parsed_failure_count, run.log_location.clone())?;
            info!(
                attempt = attempt.sequence,
                strategy = %attempt.strategy_descriptor,
                verification = %verdict,
                failures = ?run.parsed_failure_count,
                reference = ?reference_failures,
                "attempt verified"
            );

            if verdict == Verification::Passed {
                machine.advance(LoopState::Accepted)?;
                session.push_attempt(attempt.clone())?;
                return Ok(attempt);
            }

            session.push_attempt(attempt)?;
            self.workspace.revert_patch(&snapshot, &change).await?;
            machine.advance(LoopState::Rejected)?;

            if verdict == Verification::Failed {
                consecutive_regressions += 1;
            } else {
                consecutive_regressions = 0;
                reference_failures = run.parsed_failure_count.or(reference_failures);
            }
            diagnostics = self.diagnostics.collect(&run, Some(baseline), Some(verdict)).await;

            if self.regression_cap_hit(consecutive_regressions) {
                warn!(consecutive_regressions, "stopping after consecutive regressions");
                return Err(machine.exhaust(session.attempts().len(), ExhaustionReason::Regressing));
            }
        }
    }

    const fn regression_cap_hit(&self, consecutive: usize) -> bool {
        self.max_consecutive_regressions > 0 && consecutive >= self.max_consecutive_regressions
    }
}
