use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::attempt::FixAttempt;
use super::snapshot::Snapshot;
use super::suite::SuiteRun;
use crate::domain::errors::{RepairError, RepairResult};

/// Terminal state of a repair session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    Pending,
    /// A fix (or the untouched tree) passed every configured suite.
    Succeeded,
    AttemptsExhausted,
    LocateFailed,
    /// The fast suite accepted a fix but the full run did not pass;
    /// the original snapshot was restored.
    VerificationFailed,
    /// Every selected suite passed but other configured suites were not
    /// run, so no overall verdict exists. Any fix stays applied.
    PartiallyVerified,
    Fatal,
}

impl SessionOutcome {
    pub const fn exit_code(self) -> i32 {
        match self {
            Self::Succeeded => 0,
            Self::AttemptsExhausted | Self::VerificationFailed | Self::PartiallyVerified => 1,
            Self::LocateFailed => 2,
            Self::Pending | Self::Fatal => 3,
        }
    }

    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::AttemptsExhausted => "attempts_exhausted",
            Self::LocateFailed => "locate_failed",
            Self::VerificationFailed => "verification_failed",
            Self::PartiallyVerified => "partially_verified",
            Self::Fatal => "fatal",
        })
    }
}

/// Aggregate root for one repair run.
///
/// Owns the snapshot, the ordered attempt log and the retained suite runs.
/// Attempts are appended only once verified, so the log never holds a
/// pending entry.
#[derive(Debug)]
pub struct RepairSession {
    id: Uuid,
    snapshot: Snapshot,
    max_attempts: usize,
    attempts: Vec<FixAttempt>,
    suite_runs: Vec<SuiteRun>,
    outcome: SessionOutcome,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
}

impl RepairSession {
    pub fn new(snapshot: Snapshot, max_attempts: usize) -> Self {
        Self::with_id(Uuid::new_v4(), snapshot, max_attempts)
    }

    /// Session with a caller-chosen id, so suite logs can be laid out
    /// under the session directory before the session exists.
    pub fn with_id(id: Uuid, snapshot: Snapshot, max_attempts: usize) -> Self {
        Self {
            id,
            snapshot,
            max_attempts,
            attempts: Vec::new(),
            suite_runs: Vec::new(),
            outcome: SessionOutcome::Pending,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub const fn id(&self) -> Uuid {
        self.id
    }

    pub const fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub const fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    pub fn attempts(&self) -> &[FixAttempt] {
        &self.attempts
    }

    pub fn suite_runs(&self) -> &[SuiteRun] {
        &self.suite_runs
    }

    pub const fn outcome(&self) -> SessionOutcome {
        self.outcome
    }

    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub const fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn remaining_attempts(&self) -> usize {
        self.max_attempts.saturating_sub(self.attempts.len())
    }

    pub fn tried_strategies(&self) -> Vec<String> {
        self.attempts
            .iter()
            .map(|a| a.strategy_descriptor.clone())
            .collect()
    }

    pub fn has_tried(&self, strategy: &str) -> bool {
        self.attempts.iter().any(|a| a.strategy_descriptor == strategy)
    }

    /// Append a verified attempt.
    pub fn push_attempt(&mut self, attempt: FixAttempt) -> RepairResult<()> {
        if self.outcome.is_terminal() {
            return Err(RepairError::Invariant(format!(
                "session already finalized as {}",
                self.outcome
            )));
        }
        if self.attempts.len() >= self.max_attempts {
            return Err(RepairError::Invariant(format!(
                "attempt budget of {} already spent",
                self.max_attempts
            )));
        }
        if self.has_tried(&attempt.strategy_descriptor) {
            return Err(RepairError::Invariant(format!(
                "strategy `{}` already attempted",
                attempt.strategy_descriptor
            )));
        }
        if attempt.sequence != self.attempts.len() + 1 {
            return Err(RepairError::Invariant(format!(
                "attempt sequence {} out of order",
                attempt.sequence
            )));
        }
        if !attempt.verification().is_terminal() {
            return Err(RepairError::Invariant(
                "attempt recorded before verification".to_string(),
            ));
        }
        self.attempts.push(attempt);
        Ok(())
    }

    pub fn record_suite_runs(&mut self, runs: impl IntoIterator<Item = SuiteRun>) {
        self.suite_runs.extend(runs);
    }

    /// Set the terminal outcome. Allowed exactly once.
    pub fn finalize(&mut self, outcome: SessionOutcome) -> RepairResult<()> {
        if self.outcome.is_terminal() || !outcome.is_terminal() {
            return Err(RepairError::InvalidTransition {
                from: self.outcome.to_string(),
                to: outcome.to_string(),
            });
        }
        self.outcome = outcome;
        self.finished_at = Some(Utc::now());
        Ok(())
    }
}
