//! Error taxonomy for repair sessions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::models::{ReferenceState, ReferenceStatus};
use super::ports::{ExecutorError, ProposerError, VcsError};

/// Render probe results as `working_tree=failing, branch_head=unknown`.
fn format_probes(probes: &[ReferenceState]) -> String {
    if probes.is_empty() {
        return "no candidates probed".to_string();
    }
    probes
        .iter()
        .map(|p| format!("{}={}", p.kind, p.status))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Why the fix loop stopped without an accepted attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionReason {
    /// `max_attempts` is zero; the proposer was never consulted.
    ZeroBudget,
    /// Every attempt in the budget was spent.
    BudgetSpent,
    /// The proposer signalled it has no further ideas.
    ProposerExhausted,
    /// The proposer offered a strategy it had already tried.
    RepeatedStrategy,
    /// Too many consecutive attempts made the suite worse.
    Regressing,
}

impl fmt::Display for ExhaustionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::ZeroBudget => "attempt budget is zero",
            Self::BudgetSpent => "attempt budget spent",
            Self::ProposerExhausted => "fix proposer has no further ideas",
            Self::RepeatedStrategy => "fix proposer repeated a strategy",
            Self::Regressing => "consecutive attempts kept making things worse",
        };
        f.write_str(text)
    }
}

/// Errors raised while running a repair session.
///
/// `Setup`, `Locate`, `FixExhausted`, `SuiteTimeout` and `RecoveryFailure`
/// are the session-level outcomes; the remaining variants are plumbing
/// failures that route through the recovery handler.
#[derive(Debug, Error)]
pub enum RepairError {
    #[error("setup failed: {0}")]
    Setup(String),

    #[error("no passing reference state found ({})", format_probes(.probes))]
    Locate { probes: Vec<ReferenceState> },

    #[error("fix attempts exhausted after {attempts} attempt(s): {reason}")]
    FixExhausted {
        attempts: usize,
        reason: ExhaustionReason,
    },

    #[error("suite `{suite_id}` timed out after {timeout_secs}s")]
    SuiteTimeout { suite_id: String, timeout_secs: u64 },

    #[error("snapshot restore failed: {reason}; raw snapshot kept at {}", .path.display())]
    RecoveryFailure { path: PathBuf, reason: String },

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Proposer(#[from] ProposerError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("session invariant violated: {0}")]
    Invariant(String),
}

pub type RepairResult<T> = Result<T, RepairError>;

impl RepairError {
    /// CLI exit code for this error when it ends a session.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::FixExhausted { .. } => 1,
            Self::Setup(_) | Self::Locate { .. } => 2,
            _ => 3,
        }
    }

    /// Whether every probe in a locate failure actually ran and failed,
    /// as opposed to candidates that could not be resolved.
    pub fn all_probes_failed(&self) -> bool {
        match self {
            Self::Locate { probes } => probes
                .iter()
                .all(|p| p.status == ReferenceStatus::Failing),
            _ => false,
        }
    }
}

impl From<std::io::Error> for RepairError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for RepairError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
