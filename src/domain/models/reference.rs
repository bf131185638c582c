//! Candidate "known good" states probed before any fix is attempted.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which candidate a reference state stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// The current commit with pending changes set aside.
    WorkingTree,
    /// The tip of the branch (its upstream when one is configured).
    BranchHead,
    /// The merge base with the upstream base ref.
    UpstreamBase,
}

impl ReferenceKind {
    /// Fixed probe priority.
    pub const PROBE_ORDER: [Self; 3] = [Self::WorkingTree, Self::BranchHead, Self::UpstreamBase];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::WorkingTree => "working_tree",
            Self::BranchHead => "branch_head",
            Self::UpstreamBase => "upstream_base",
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceStatus {
    Unknown,
    Passing,
    Failing,
}

impl fmt::Display for ReferenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unknown => "unknown",
            Self::Passing => "passing",
            Self::Failing => "failing",
        })
    }
}

/// A named point to test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceState {
    pub kind: ReferenceKind,
    pub status: ReferenceStatus,
    /// Resolved commit id, absent when the candidate could not be resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ReferenceState {
    pub const fn new(kind: ReferenceKind) -> Self {
        Self {
            kind,
            status: ReferenceStatus::Unknown,
            commit: None,
            note: None,
        }
    }

    pub fn probed(kind: ReferenceKind, commit: impl Into<String>, status: ReferenceStatus) -> Self {
        Self {
            kind,
            status,
            commit: Some(commit.into()),
            note: None,
        }
    }

    pub fn unresolved(kind: ReferenceKind, note: impl Into<String>) -> Self {
        Self {
            kind,
            status: ReferenceStatus::Unknown,
            commit: None,
            note: Some(note.into()),
        }
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn is_passing(&self) -> bool {
        self.status == ReferenceStatus::Passing
    }

    /// Short label like `branch_head@1a2b3c4`.
    pub fn label(&self) -> String {
        match &self.commit {
            Some(commit) => format!("{}@{}", self.kind, &commit[..commit.len().min(7)]),
            None => self.kind.to_string(),
        }
    }
}
