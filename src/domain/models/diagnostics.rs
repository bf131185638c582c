use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::attempt::Verification;
use super::reference::ReferenceState;

/// What the fix proposer is told about the last failed verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub suite_id: String,
    pub exit_code: i32,
    pub failure_count: Option<u32>,
    pub log_path: Option<PathBuf>,
    /// Scrubbed tail of the suite log.
    pub log_excerpt: String,
    /// Reference state the suite was last seen passing at.
    pub baseline: Option<ReferenceState>,
    /// Classification of the previous attempt, absent before the first one.
    pub previous_verification: Option<Verification>,
}
