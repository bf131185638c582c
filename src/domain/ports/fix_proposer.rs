//! Fix proposer port - the pluggable source of candidate patches.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::Diagnostics;

#[derive(Debug, Error)]
pub enum ProposerError {
    #[error("fix proposer exited with {exit_code}: {stderr}")]
    Failed { exit_code: i32, stderr: String },

    #[error("fix proposer returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("fix proposer timed out after {0}s")]
    TimedOut(u64),

    #[error("fix proposer io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proposal {
    /// A candidate patch. An empty patch asks to revert the pending changes to HEAD.
    Candidate {
        patch: Vec<u8>,
        strategy_descriptor: String,
    },
    /// No further ideas.
    Exhausted,
}

/// Strategy interface for candidate fixes. The controller never inspects
/// a strategy beyond its descriptor.
#[async_trait]
pub trait FixProposer: Send + Sync {
    async fn propose(
        &self,
        diagnostics: &Diagnostics,
        tried_strategies: &[String],
    ) -> Result<Proposal, ProposerError>;
}
