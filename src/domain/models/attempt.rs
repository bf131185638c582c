use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;

use crate::domain::errors::{RepairError, RepairResult};

/// Verification outcome of a fix attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    Pending,
    /// Fast suite fully green; the attempt is accepted.
    Passed,
    /// Fewer failures than the reference count, still not green.
    Improved,
    /// Same failure count, or no comparable count.
    NoProgress,
    /// More failures, or the run produced no usable result.
    Failed,
}

impl Verification {
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Passed => "passed",
            Self::Improved => "improved",
            Self::NoProgress => "no_progress",
            Self::Failed => "failed",
        })
    }
}

/// One iteration of the repair loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixAttempt {
    pub sequence: usize,
    pub strategy_descriptor: String,
    #[serde(serialize_with = "patch_as_text", deserialize_with = "patch_from_text")]
    pub patch: Vec<u8>,
    verification: Verification,
    pub failure_count: Option<u32>,
    pub log_path: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

fn patch_as_text<S: Serializer>(patch: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&String::from_utf8_lossy(patch))
}

fn patch_from_text<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
    String::deserialize(d).map(String::into_bytes)
}

impl FixAttempt {
    pub fn new(sequence: usize, strategy_descriptor: impl Into<String>, patch: Vec<u8>) -> Self {
        Self {
            sequence,
            strategy_descriptor: strategy_descriptor.into(),
            patch,
            verification: Verification::Pending,
            failure_count: None,
            log_path: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    pub const fn verification(&self) -> Verification {
        self.verification
    }

    /// An empty patch means "drop the pending changes back to HEAD".
    pub fn is_revert(&self) -> bool {
        self.patch.is_empty()
    }

    /// Record the verification result. Allowed exactly once.
    pub fn complete(
        &mut self,
        verification: Verification,
        failure_count: Option<u32>,
        log_path: Option<PathBuf>,
    ) -> RepairResult<()> {
        if self.verification.is_terminal() || !verification.is_terminal() {
            return Err(RepairError::InvalidTransition {
                from: self.verification.to_string(),
                to: verification.to_string(),
            });
        }
        self.verification = verification;
        self.failure_count = failure_count;
        self.log_path = log_path;
        self.completed_at = Some(Utc::now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completes_once() {
        let mut attempt = FixAttempt::new(1, "bump-timeout", b"patch".to_vec());
        attempt
            .complete(Verification::NoProgress, Some(3), None)
            .unwrap();
        assert_eq!(attempt.verification(), Verification::NoProgress);
        assert!(attempt.completed_at.is_some());

        let err = attempt.complete(Verification::Passed, Some(0), None);
        assert!(matches!(err, Err(RepairError::InvalidTransition { .. })));
        assert_eq!(attempt.verification(), Verification::NoProgress);
    }

    #[test]
    fn cannot_complete_as_pending() {
        let mut attempt = FixAttempt::new(1, "s", vec![]);
        assert!(attempt.complete(Verification::Pending, None, None).is_err());
        assert!(attempt.is_revert());
    }

    #[test]
    fn patch_serializes_as_text() {
        let attempt = FixAttempt::new(2, "s", b"--- a/x\n+++ b/x\n".to_vec());
        let json = serde_json::to_value(&attempt).unwrap();
        assert_eq!(json["patch"], "--- a/x\n+++ b/x\n");
        assert_eq!(json["verification"], "pending");
    }
}
