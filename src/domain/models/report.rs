use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::attempt::FixAttempt;
use super::reference::ReferenceState;
use super::session::{RepairSession, SessionOutcome};
use super::suite::{AggregateReport, SuiteRun};
use crate::domain::errors::ExhaustionReason;

/// What the recovery handler did after an unexpected failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryReport {
    /// The error that triggered recovery.
    pub cause: String,
    /// Whether the working tree is bit-for-bit the original snapshot again.
    pub restored: bool,
    /// Raw snapshot payload kept on durable storage.
    pub snapshot_path: PathBuf,
    pub restore_error: Option<String>,
}

impl RecoveryReport {
    /// Operator-facing instruction when the restore itself failed.
    pub fn manual_recovery_hint(&self) -> Option<String> {
        if self.restored {
            return None;
        }
        Some(format!(
            "working tree NOT restored; reapply the raw snapshot manually with `git apply --binary {}` on a clean checkout",
            self.snapshot_path.display()
        ))
    }
}

/// Auditable record of a finished session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairReport {
    pub session_id: Uuid,
    pub snapshot_id: String,
    pub snapshot_path: PathBuf,
    pub outcome: SessionOutcome,
    pub exit_code: i32,
    pub max_attempts: usize,
    pub attempts: Vec<FixAttempt>,
    #[serde(default)]
    pub probes: Vec<ReferenceState>,
    pub baseline: Option<ReferenceState>,
    #[serde(default)]
    pub suite_runs: Vec<SuiteRun>,
    pub aggregate: Option<AggregateReport>,
    pub exhaustion: Option<ExhaustionReason>,
    pub recovery: Option<RecoveryReport>,
    pub error: Option<String>,
    /// True when the working tree holds the accepted fix rather than the original.
    pub fix_applied: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RepairReport {
    pub fn from_session(session: &RepairSession) -> Self {
        let snapshot = session.snapshot();
        Self {
            session_id: session.id(),
            snapshot_id: snapshot.id().to_string(),
            snapshot_path: snapshot.payload_path().to_path_buf(),
            outcome: session.outcome(),
            exit_code: session.outcome().exit_code(),
            max_attempts: session.max_attempts(),
            attempts: session.attempts().to_vec(),
            probes: Vec::new(),
            baseline: None,
            suite_runs: session.suite_runs().to_vec(),
            aggregate: None,
            exhaustion: None,
            recovery: None,
            error: None,
            fix_applied: false,
            started_at: session.started_at(),
            finished_at: session.finished_at(),
        }
    }

    /// Headline sentence for the human report. Never claims success unless
    /// the outcome is `Succeeded`.
    pub fn headline(&self) -> String {
        match self.outcome {
            SessionOutcome::Succeeded if self.attempts.is_empty() => {
                "suites already pass; no fix attempted".to_string()
            }
            SessionOutcome::Succeeded => format!(
                "fix accepted after {} attempt(s) and verified",
                self.attempts.len()
            ),
            SessionOutcome::AttemptsExhausted => {
                let reason = self
                    .exhaustion
                    .map_or_else(|| "no fix found".to_string(), |r| r.to_string());
                format!(
                    "no fix found within {} attempt(s) ({reason}); original changes restored",
                    self.max_attempts
                )
            }
            SessionOutcome::LocateFailed => {
                "no passing reference state; pre-existing breakage needs a human".to_string()
            }
            SessionOutcome::VerificationFailed if self.attempts.is_empty() => {
                "fast suite passes but the full run did not; no fix attempted".to_string()
            }
            SessionOutcome::VerificationFailed => {
                "fast suite accepted a fix but the full run did not pass; original changes restored"
                    .to_string()
            }
            SessionOutcome::PartiallyVerified if self.attempts.is_empty() => {
                "selected suites pass; the rest were not run, overall result not established"
                    .to_string()
            }
            SessionOutcome::PartiallyVerified => format!(
                "fix accepted after {} attempt(s) and left applied; only the selected suites were run, overall result not established",
                self.attempts.len()
            ),
            SessionOutcome::Fatal => match &self.recovery {
                Some(r) if !r.restored => format!(
                    "fatal error and snapshot restore FAILED; raw snapshot at {}",
                    r.snapshot_path.display()
                ),
                _ => "fatal error; original changes restored".to_string(),
            },
            SessionOutcome::Pending => "session did not finish".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hint_only_when_not_restored() {
        let mut report = RecoveryReport {
            cause: "boom".into(),
            restored: true,
            snapshot_path: PathBuf::from("/r/.git/mender/snapshots/s.patch"),
            restore_error: None,
        };
        assert!(report.manual_recovery_hint().is_none());
        report.restored = false;
        let hint = report.manual_recovery_hint().unwrap();
        assert!(hint.contains("/r/.git/mender/snapshots/s.patch"));
    }
}
