//! Suite executor port - runs one named test suite.

use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("unknown suite `{0}`")]
    UnknownSuite(String),

    #[error("suite executor io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw result of one suite invocation, before log parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteExecution {
    pub exit_code: i32,
    /// Always written, even when the suite could not be started.
    pub log_path: PathBuf,
    pub duration_ms: u64,
    pub timed_out: bool,
}

#[async_trait]
pub trait SuiteExecutor: Send + Sync {
    /// Run `suite_id`, killing it once `timeout` elapses.
    async fn run(&self, suite_id: &str, timeout: Duration) -> Result<SuiteExecution, ExecutorError>;
}
