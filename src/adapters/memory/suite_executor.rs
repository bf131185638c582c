//! Scripted suite executor driven by the in-memory working tree.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use super::vcs::{InMemoryVcs, Tree};
use crate::domain::models::TIMEOUT_EXIT_CODE;
use crate::domain::ports::{ExecutorError, SuiteExecution, SuiteExecutor};

/// Failure count for a suite given the working tree it runs against.
pub type FailureRule = Arc<dyn Fn(&Tree) -> u32 + Send + Sync>;

#[derive(Clone)]
struct ScriptedSuite {
    rule: FailureRule,
    delay: Duration,
    panics: bool,
    unparseable: bool,
}

/// [`SuiteExecutor`] that evaluates a rule over the [`InMemoryVcs`] tree and
/// writes a cargo-style log.
pub struct ScriptedSuiteExecutor {
    vcs: Arc<InMemoryVcs>,
    log_dir: PathBuf,
    suites: HashMap<String, ScriptedSuite>,
    counter: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSuiteExecutor {
    pub fn new(vcs: Arc<InMemoryVcs>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            vcs,
            log_dir: log_dir.into(),
            suites: HashMap::new(),
            counter: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn suite(
        mut self,
        id: &str,
        rule: impl Fn(&Tree) -> u32 + Send + Sync + 'static,
    ) -> Self {
        self.suites.insert(
            id.to_string(),
            ScriptedSuite {
                rule: Arc::new(rule),
                delay: Duration::ZERO,
                panics: false,
                unparseable: false,
            },
        );
        self
    }

    /// Simulated run time. Runs longer than their timeout are killed.
    #[must_use]
    pub fn with_delay(mut self, id: &str, delay: Duration) -> Self {
        if let Some(s) = self.suites.get_mut(id) {
            s.delay = delay;
        }
        self
    }

    #[must_use]
    pub fn panicking(mut self, id: &str) -> Self {
        if let Some(s) = self.suites.get_mut(id) {
            s.panics = true;
        }
        self
    }

    /// Exit non-zero without a summary line.
    #[must_use]
    pub fn unparseable(mut self, id: &str) -> Self {
        if let Some(s) = self.suites.get_mut(id) {
            s.unparseable = true;
        }
        self
    }

    /// Suite ids in invocation order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn next_log_path(&self, suite_id: &str) -> PathBuf {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.log_dir.join(format!("{suite_id}-{n}.log"))
    }
}

#[async_trait]
impl SuiteExecutor for ScriptedSuiteExecutor {
    async fn run(&self, suite_id: &str, timeout: Duration) -> Result<SuiteExecution, ExecutorError> {
        let suite = self
            .suites
            .get(suite_id)
            .cloned()
            .ok_or_else(|| ExecutorError::UnknownSuite(suite_id.to_string()))?;
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(suite_id.to_string());

        let started = Instant::now();
        let log_path = self.next_log_path(suite_id);
        tokio::fs::create_dir_all(&self.log_dir).await?;

        if suite.panics {
            panic!("scripted suite `{suite_id}` crashed");
        }

        if suite.delay > timeout {
            tokio::time::sleep(timeout).await;
            tokio::fs::write(&log_path, format!("running {suite_id}\nkilled after {}s\n", timeout.as_secs())).await?;
            return Ok(SuiteExecution {
                exit_code: TIMEOUT_EXIT_CODE,
                log_path,
                duration_ms: elapsed_ms(started),
                timed_out: true,
            });
        }

        tokio::time::sleep(suite.delay).await;
        let failures = (suite.rule)(&self.vcs.tree());
        let (exit_code, log) = if suite.unparseable {
            (2, format!("running {suite_id}\nerror: could not compile\n"))
        } else if failures == 0 {
            (0, format!("running {suite_id}\ntest result: ok. 10 passed; 0 failed; 0 ignored\n"))
        } else {
            let mut log = format!("running {suite_id}\n");
            for i in 1..=failures {
                log.push_str(&format!("test case_{i} ... FAILED\n"));
            }
            log.push_str(&format!(
                "test result: FAILED. 10 passed; {failures} failed; 0 ignored\n"
            ));
            (101, log)
        };
        tokio::fs::write(&log_path, log).await?;

        Ok(SuiteExecution {
            exit_code,
            log_path,
            duration_ms: elapsed_ms(started),
            timed_out: false,
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
