//! Runs configured suite commands through `sh -c`.
//!
//! Each run writes stdout and stderr to `<log_dir>/<suite>-<n>.log`. The
//! child gets its own process group so a timeout, or the runner dropping
//! the future, takes down everything the suite spawned.

use std::collections::HashMap;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::domain::models::{SuiteConfig, TIMEOUT_EXIT_CODE};
use crate::infrastructure::process::GroupGuard;
use crate::domain::ports::{ExecutorError, SuiteExecution, SuiteExecutor};

/// Exit code recorded when the shell itself cannot be started.
const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

pub struct ShellSuiteExecutor {
    root: PathBuf,
    commands: HashMap<String, String>,
    log_dir: PathBuf,
    runs: Mutex<HashMap<String, u32>>,
}

impl ShellSuiteExecutor {
    pub fn new<'a>(
        root: impl Into<PathBuf>,
        suites: impl IntoIterator<Item = &'a SuiteConfig>,
        log_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            root: root.into(),
            commands: suites
                .into_iter()
                .map(|s| (s.id.clone(), s.command.clone()))
                .collect(),
            log_dir: log_dir.into(),
            runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    fn next_log_path(&self, suite_id: &str) -> PathBuf {
        let n = {
            let mut runs = self
                .runs
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let n = runs.entry(suite_id.to_string()).or_insert(0);
            *n += 1;
            *n
        };
        self.log_dir.join(format!("{suite_id}-{n}.log"))
    }
}

async fn append_note(path: &Path, note: &str) {
    let opened = tokio::fs::OpenOptions::new().append(true).create(true).open(path).await;
    if let Ok(mut file) = opened {
        if let Err(e) = file.write_all(format!("\n[mender] {note}\n").as_bytes()).await {
            warn!(path = %path.display(), error = %e, "could not annotate suite log");
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[async_trait]
impl SuiteExecutor for ShellSuiteExecutor {
    #[instrument(skip(self), fields(timeout_secs = timeout.as_secs()))]
    async fn run(&self, suite_id: &str, timeout: Duration) -> Result<SuiteExecution, ExecutorError> {
        let command = self
            .commands
            .get(suite_id)
            .ok_or_else(|| ExecutorError::UnknownSuite(suite_id.to_string()))?;

        tokio::fs::create_dir_all(&self.log_dir).await?;
        let log_path = self.next_log_path(suite_id);
        let log = std::fs::File::create(&log_path)?;
        let log_err = log.try_clone()?;

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .current_dir(&self.root)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            .process_group(0)
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(suite_id, error = %e, "suite command could not be spawned");
                append_note(&log_path, &format!("failed to spawn `sh -c {command}`: {e}")).await;
                return Ok(SuiteExecution {
                    exit_code: SPAWN_FAILURE_EXIT_CODE,
                    log_path,
                    duration_ms: elapsed_ms(started),
                    timed_out: false,
                });
            }
        };

        let mut guard = GroupGuard::new(&child);

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => {
                guard.disarm();
                let status = status?;
                let exit_code = status
                    .code()
                    .or_else(|| status.signal().map(|sig| 128 + sig))
                    .unwrap_or(SPAWN_FAILURE_EXIT_CODE);
                let duration_ms = elapsed_ms(started);
                info!(suite_id, exit_code, duration_ms, log = %log_path.display(), "suite command exited");
                Ok(SuiteExecution {
                    exit_code,
                    log_path,
                    duration_ms,
                    timed_out: false,
                })
            }
            Err(_) => {
                guard.kill();
                if let Err(e) = child.kill().await {
                    debug!(suite_id, error = %e, "shell already gone after group kill");
                }
                append_note(&log_path, &format!("killed after {}s timeout", timeout.as_secs())).await;
                warn!(suite_id, timeout_secs = timeout.as_secs(), "suite command timed out");
                Ok(SuiteExecution {
                    exit_code: TIMEOUT_EXIT_CODE,
                    log_path,
                    duration_ms: elapsed_ms(started),
                    timed_out: true,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ResultFormat, SuiteCost};

    fn suite(id: &str, command: &str) -> SuiteConfig {
        SuiteConfig {
            id: id.to_string(),
            command: command.to_string(),
            cost: SuiteCost::Cheap,
            format: ResultFormat::Auto,
        }
    }

    #[tokio::test]
    async fn captures_output_and_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let suites = [suite("unit", "echo out; echo err >&2; exit 3")];
        let executor = ShellSuiteExecutor::new(dir.path(), &suites, dir.path().join("logs"));

        let first = executor.run("unit", Duration::from_secs(10)).await.unwrap();
        assert_eq!(first.exit_code, 3);
        assert!(!first.timed_out);
        let log = std::fs::read_to_string(&first.log_path).unwrap();
        assert!(log.contains("out"));
        assert!(log.contains("err"));

        let second = executor.run("unit", Duration::from_secs(10)).await.unwrap();
        assert!(second.log_path.ends_with("unit-2.log"));
    }

    #[tokio::test]
    async fn timeout_kills_the_group() {
        let dir = tempfile::tempdir().unwrap();
        let suites = [suite("slow", "sleep 30 & sleep 30; echo finished")];
        let executor = ShellSuiteExecutor::new(dir.path(), &suites, dir.path().join("logs"));

        let run = executor.run("slow", Duration::from_millis(200)).await.unwrap();
        assert!(run.timed_out);
        assert_eq!(run.exit_code, TIMEOUT_EXIT_CODE);
        let log = std::fs::read_to_string(&run.log_path).unwrap();
        assert!(log.contains("killed after"));
        assert!(!log.contains("finished"));
    }

    #[tokio::test]
    async fn unknown_suite_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let executor = ShellSuiteExecutor::new(dir.path(), std::iter::empty(), dir.path().join("logs"));
        assert!(matches!(
            executor.run("nope", Duration::from_secs(1)).await,
            Err(ExecutorError::UnknownSuite(_))
        ));
    }
}
