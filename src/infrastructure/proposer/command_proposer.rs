//! Fix proposer backed by an external command.
//!
//! The command receives one JSON request on stdin:
//!
//! ```json
//! {"diagnostics": {...}, "tried_strategies": ["..."]}
//! ```
//!
//! and answers on stdout with either `{"exhausted": true}` or
//! `{"strategy": "...", "patch": "<unified diff>"}`. An empty `patch`
//! asks for the pending changes to be reverted so the tree matches HEAD.
//!
//! The command runs in its own process group; a timeout or a dropped call
//! kills the whole group.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::domain::models::{Diagnostics, ProposerConfig};
use crate::domain::ports::{FixProposer, Proposal, ProposerError};
use crate::infrastructure::process::GroupGuard;

#[derive(Serialize)]
struct ProposalRequest<'a> {
    diagnostics: &'a Diagnostics,
    tried_strategies: &'a [String],
}

#[derive(Debug, Deserialize)]
struct ProposalResponse {
    #[serde(default)]
    exhausted: bool,
    #[serde(default)]
    strategy: Option<String>,
    #[serde(default)]
    patch: String,
}

impl ProposalResponse {
    fn into_proposal(self) -> Result<Proposal, ProposerError> {
        if self.exhausted {
            return Ok(Proposal::Exhausted);
        }
        match self.strategy {
            Some(strategy) if !strategy.trim().is_empty() => Ok(Proposal::Candidate {
                patch: self.patch.into_bytes(),
                strategy_descriptor: strategy,
            }),
            _ => Err(ProposerError::InvalidResponse(
                "response has neither `exhausted: true` nor a non-empty `strategy`".to_string(),
            )),
        }
    }
}

pub struct CommandFixProposer {
    root: PathBuf,
    command: String,
    timeout: Duration,
}

impl CommandFixProposer {
    pub fn new(root: impl Into<PathBuf>, config: &ProposerConfig) -> Self {
        Self {
            root: root.into(),
            command: config.command.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

#[async_trait]
impl FixProposer for CommandFixProposer {
    #[instrument(skip_all, fields(command = %self.command, tried = tried_strategies.len()))]
    async fn propose(
        &self,
        diagnostics: &Diagnostics,
        tried_strategies: &[String],
    ) -> Result<Proposal, ProposerError> {
        let request = serde_json::to_vec(&ProposalRequest {
            diagnostics,
            tried_strategies,
        })
        .map_err(|e| ProposerError::InvalidResponse(format!("cannot encode request: {e}")))?;

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .kill_on_drop(true)
            .spawn()?;
        let mut guard = GroupGuard::new(&child);

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProposerError::InvalidResponse("proposer stdin unavailable".to_string()))?;
        let feed = async move {
            let written = stdin.write_all(&request).await;
            drop(stdin);
            written
        };

        let exchange = async { tokio::join!(feed, child.wait_with_output()) };
        let Ok((written, output)) = tokio::time::timeout(self.timeout, exchange).await else {
            guard.kill();
            warn!(timeout_secs = self.timeout.as_secs(), "fix proposer timed out");
            return Err(ProposerError::TimedOut(self.timeout.as_secs()));
        };
        guard.disarm();
        let output = output?;
        if let Err(e) = written {
            // the proposer may legitimately exit without reading everything
            debug!(error = %e, "proposer closed stdin early");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(exit_code = ?output.status.code(), %stderr, "fix proposer failed");
            return Err(ProposerError::Failed {
                exit_code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        let response: ProposalResponse = serde_json::from_slice(&output.stdout)
            .map_err(|e| ProposerError::InvalidResponse(e.to_string()))?;
        let proposal = response.into_proposal()?;
        debug!(?proposal, "fix proposer answered");
        Ok(proposal)
    }
}
