//! Suite runs and their aggregate verdict.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Exit code recorded for a run killed by its timeout.
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code recorded when no process exit status exists (crash, cancel).
pub const CRASH_EXIT_CODE: i32 = -1;

/// Relative cost tier of a suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SuiteCost {
    Cheap,
    #[default]
    Expensive,
}

/// Log format used to read failure counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResultFormat {
    #[default]
    Auto,
    Cargo,
    Pytest,
    Jest,
    Go,
    ExitCode,
}

/// How a suite run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Exited,
    TimedOut,
    Crashed,
    Cancelled,
}

/// Result of one suite executor invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteRun {
    pub suite_id: String,
    pub exit_code: i32,
    pub log_location: Option<PathBuf>,
    pub duration_ms: u64,
    /// Filled in by the result aggregator.
    pub parsed_failure_count: Option<u32>,
    pub termination: Termination,
}

impl SuiteRun {
    pub fn exited(
        suite_id: impl Into<String>,
        exit_code: i32,
        log_location: PathBuf,
        duration_ms: u64,
    ) -> Self {
        Self {
            suite_id: suite_id.into(),
            exit_code,
            log_location: Some(log_location),
            duration_ms,
            parsed_failure_count: None,
            termination: Termination::Exited,
        }
    }

    pub fn timed_out(
        suite_id: impl Into<String>,
        log_location: Option<PathBuf>,
        duration_ms: u64,
    ) -> Self {
        Self {
            suite_id: suite_id.into(),
            exit_code: TIMEOUT_EXIT_CODE,
            log_location,
            duration_ms,
            parsed_failure_count: None,
            termination: Termination::TimedOut,
        }
    }

    pub fn crashed(suite_id: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            suite_id: suite_id.into(),
            exit_code: CRASH_EXIT_CODE,
            log_location: None,
            duration_ms,
            parsed_failure_count: None,
            termination: Termination::Crashed,
        }
    }

    pub fn cancelled(suite_id: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            termination: Termination::Cancelled,
            ..Self::crashed(suite_id, duration_ms)
        }
    }
}

/// Per-suite status after aggregation. Only `Passed` counts as passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SuiteStatus {
    Passed,
    Failed { failures: u32, exit_code: i32 },
    TimedOut,
    Crashed,
    Cancelled,
    /// The run exited but no failure count could be read from its log.
    Unparsed { exit_code: i32 },
    /// Configured but absent from the evaluated runs.
    NotRun,
}

impl SuiteStatus {
    pub const fn is_passed(self) -> bool {
        matches!(self, Self::Passed)
    }
}

impl fmt::Display for SuiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Passed => f.write_str("passed"),
            Self::Failed {
                failures,
                exit_code,
            } => write!(f, "failed ({failures} failures, exit {exit_code})"),
            Self::TimedOut => f.write_str("timed out"),
            Self::Crashed => f.write_str("crashed"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Unparsed { exit_code } => write!(f, "failed (no parseable result, exit {exit_code})"),
            Self::NotRun => f.write_str("not run"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed,
}

/// Which part of the configured suite set an aggregate covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum EvaluatedScope {
    Full,
    Partial {
        evaluated: Vec<String>,
        missing: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateReport {
    pub overall: Verdict,
    pub per_suite: BTreeMap<String, SuiteStatus>,
    pub scope: EvaluatedScope,
    /// False when the run batch was cut short by cancellation.
    pub complete: bool,
}

impl AggregateReport {
    pub fn passed(&self) -> bool {
        self.overall == Verdict::Passed
    }

    /// Every suite that actually ran passed. For a `Full` scope this is
    /// `passed()`; for `Partial` it says nothing about the missing suites.
    pub fn evaluated_passed(&self) -> bool {
        match &self.scope {
            EvaluatedScope::Full => self.passed(),
            EvaluatedScope::Partial { evaluated, .. } => {
                self.complete
                    && !evaluated.is_empty()
                    && evaluated
                        .iter()
                        .all(|id| self.per_suite.get(id).is_some_and(|s| s.is_passed()))
            }
        }
    }

    fn ids_where(&self, pred: impl Fn(SuiteStatus) -> bool) -> Vec<&str> {
        self.per_suite
            .iter()
            .filter(|(_, status)| pred(**status))
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// One-line human summary. "All configured suites passed" is only ever
    /// said about a full, complete, passing evaluation.
    pub fn summary(&self) -> String {
        let quote = |ids: &[&str]| {
            ids.iter()
                .map(|id| format!("`{id}`"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        match (&self.scope, self.overall) {
            (EvaluatedScope::Full, Verdict::Passed) => {
                format!("all {} configured suites passed", self.per_suite.len())
            }
            (EvaluatedScope::Full, Verdict::Failed) => {
                let bad = self.ids_where(|s| !s.is_passed());
                format!(
                    "{} of {} configured suites did not pass: {}",
                    bad.len(),
                    self.per_suite.len(),
                    quote(&bad)
                )
            }
            (EvaluatedScope::Partial { evaluated, missing }, _) => {
                let passed = self.ids_where(SuiteStatus::is_passed);
                let failed: Vec<&str> = evaluated
                    .iter()
                    .map(String::as_str)
                    .filter(|id| !passed.contains(id))
                    .collect();
                let missing: Vec<&str> = missing.iter().map(String::as_str).collect();
                let mut parts = Vec::new();
                if !passed.is_empty() {
                    parts.push(format!("{} passed", quote(&passed)));
                }
                if !failed.is_empty() {
                    parts.push(format!("{} did not pass", quote(&failed)));
                }
                parts.push(format!("{} not yet run", quote(&missing)));
                format!("{}; overall result not established", parts.join("; "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(scope: EvaluatedScope, overall: Verdict, entries: &[(&str, SuiteStatus)]) -> AggregateReport {
        AggregateReport {
            overall,
            per_suite: entries
                .iter()
                .map(|(id, s)| ((*id).to_string(), *s))
                .collect(),
            scope,
            complete: true,
        }
    }

    #[test]
    fn full_pass_summary() {
        let r = report(
            EvaluatedScope::Full,
            Verdict::Passed,
            &[("unit", SuiteStatus::Passed), ("smoke", SuiteStatus::Passed)],
        );
        assert_eq!(r.summary(), "all 2 configured suites passed");
    }

    #[test]
    fn partial_summary_is_bounded() {
        let r = report(
            EvaluatedScope::Partial {
                evaluated: vec!["unit".into()],
                missing: vec!["integration".into()],
            },
            Verdict::Failed,
            &[("unit", SuiteStatus::Passed), ("integration", SuiteStatus::NotRun)],
        );
        let summary = r.summary();
        assert!(summary.contains("`unit` passed"));
        assert!(summary.contains("`integration` not yet run"));
        assert!(!summary.contains("all"));
        assert!(!r.passed());
        assert!(r.evaluated_passed());
    }

    #[test]
    fn timed_out_run_uses_timeout_exit_code() {
        let run = SuiteRun::timed_out("smoke", None, 1_800_000);
        assert_eq!(run.exit_code, TIMEOUT_EXIT_CODE);
        assert_eq!(run.termination, Termination::TimedOut);
        let cancelled = SuiteRun::cancelled("unit", 5);
        assert_eq!(cancelled.exit_code, CRASH_EXIT_CODE);
        assert_eq!(cancelled.termination, Termination::Cancelled);
    }
}
