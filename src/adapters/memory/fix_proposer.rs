//! Scripted fix proposer.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use crate::domain::models::Diagnostics;
use crate::domain::ports::{FixProposer, Proposal, ProposerError};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Candidate {
        strategy: String,
        patch: Vec<u8>,
    },
    Exhausted,
    Fail(String),
    /// Never answers within any realistic timeout.
    Stall,
}

impl ScriptedReply {
    pub fn candidate(strategy: impl Into<String>, patch: Vec<u8>) -> Self {
        Self::Candidate {
            strategy: strategy.into(),
            patch,
        }
    }
}

/// One recorded `propose` call.
#[derive(Debug, Clone)]
pub struct ProposerCall {
    pub diagnostics: Diagnostics,
    pub tried_strategies: Vec<String>,
}

/// [`FixProposer`] that replays a queue of replies, then reports exhaustion.
#[derive(Debug, Default)]
pub struct ScriptedFixProposer {
    replies: Mutex<VecDeque<ScriptedReply>>,
    calls: Mutex<Vec<ProposerCall>>,
}

impl ScriptedFixProposer {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ProposerCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[async_trait]
impl FixProposer for ScriptedFixProposer {
    async fn propose(
        &self,
        diagnostics: &Diagnostics,
        tried_strategies: &[String],
    ) -> Result<Proposal, ProposerError> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ProposerCall {
                diagnostics: diagnostics.clone(),
                tried_strategies: tried_strategies.to_vec(),
            });
        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or(ScriptedReply::Exhausted);
        match reply {
            ScriptedReply::Candidate { strategy, patch } => Ok(Proposal::Candidate {
                patch,
                strategy_descriptor: strategy,
            }),
            ScriptedReply::Exhausted => Ok(Proposal::Exhausted),
            ScriptedReply::Fail(msg) => Err(ProposerError::Failed {
                exit_code: 1,
                stderr: msg,
            }),
            ScriptedReply::Stall => {
                tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
                Err(ProposerError::TimedOut(24 * 60 * 60))
            }
        }
    }
}
