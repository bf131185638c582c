//! Builds the diagnostics handed to the fix proposer.

use tracing::debug;

use crate::domain::errors::{RepairError, RepairResult};
use crate::domain::models::{Diagnostics, ReferenceState, SuiteRun, Verification};
use crate::infrastructure::logging::SecretScrubber;

#[derive(Debug, Clone)]
pub struct DiagnosticsCollector {
    tail_lines: usize,
    scrubber: SecretScrubber,
}

impl DiagnosticsCollector {
    pub fn new(tail_lines: usize) -> RepairResult<Self> {
        let scrubber = SecretScrubber::new()
            .map_err(|e| RepairError::Setup(format!("secret scrubber: {e}")))?;
        Ok(Self {
            tail_lines,
            scrubber,
        })
    }

    /// Scrubbed log tail plus run metadata.
    pub async fn collect(
        &self,
        run: &SuiteRun,
        baseline: Option<&ReferenceState>,
        previous_verification: Option<Verification>,
    ) -> Diagnostics {
        let log_excerpt = match &run.log_location {
            Some(path) => match tokio::fs::read(path).await {
                Ok(bytes) => self.tail(&String::from_utf8_lossy(&bytes)),
                Err(e) => format!("(log unavailable at {}: {e})", path.display()),
            },
            None => format!("(no log; run ended as {:?})", run.termination),
        };
        debug!(suite_id = %run.suite_id, excerpt_len = log_excerpt.len(), "collected diagnostics");
        Diagnostics {
            suite_id: run.suite_id.clone(),
            exit_code: run.exit_code,
            failure_count: run.parsed_failure_count,
            log_path: run.log_location.clone(),
            log_excerpt,
            baseline: baseline.cloned(),
            previous_verification,
        }
    }

    fn tail(&self, log: &str) -> String {
        let lines: Vec<&str> = log.lines().collect();
        let start = lines.len().saturating_sub(self.tail_lines);
        self.scrubber.scrub_message(&lines[start..].join("\n"))
    }
}
