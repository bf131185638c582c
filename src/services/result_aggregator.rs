//! Result Aggregator
//!
//! Turns suite runs into per-suite statuses and one overall verdict.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info, warn};

use super::log_parser::parse_failure_count;
use crate::domain::models::{
    AggregateReport, Config, EvaluatedScope, ResultFormat, SuiteRun, SuiteStatus, Termination,
    Verdict,
};

#[derive(Debug, Clone, Default)]
pub struct ResultAggregator {
    formats: HashMap<String, ResultFormat>,
}

impl ResultAggregator {
    pub fn new(formats: impl IntoIterator<Item = (String, ResultFormat)>) -> Self {
        Self {
            formats: formats.into_iter().collect(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.suites.iter().map(|s| (s.id.clone(), s.format)))
    }

    fn format_for(&self, suite_id: &str) -> ResultFormat {
        self.formats.get(suite_id).copied().unwrap_or_default()
    }

    /// Fill in `parsed_failure_count` from the run's log.
    ///
    /// Only runs that exited normally are parsed; a missing or unreadable
    /// log leaves the count empty.
    pub async fn parse_run(&self, run: &mut SuiteRun) {
        if run.termination != Termination::Exited {
            return;
        }
        let Some(path) = &run.log_location else {
            return;
        };
        match tokio::fs::read(path).await {
            Ok(bytes) => {
                let log = String::from_utf8_lossy(&bytes);
                run.parsed_failure_count =
                    parse_failure_count(&log, self.format_for(&run.suite_id), run.exit_code);
                debug!(
                    suite_id = %run.suite_id,
                    failures = ?run.parsed_failure_count,
                    "parsed suite log"
                );
            }
            Err(e) => {
                warn!(suite_id = %run.suite_id, path = %path.display(), error = %e, "suite log unreadable");
            }
        }
    }

    /// A suite passes only with exit code 0 and exactly zero parsed failures.
    pub fn status_of(run: &SuiteRun) -> SuiteStatus {
        match run.termination {
            Termination::TimedOut => SuiteStatus::TimedOut,
            Termination::Crashed => SuiteStatus::Crashed,
            Termination::Cancelled => SuiteStatus::Cancelled,
            Termination::Exited => match run.parsed_failure_count {
                None => SuiteStatus::Unparsed {
                    exit_code: run.exit_code,
                },
                Some(0) if run.exit_code == 0 => SuiteStatus::Passed,
                Some(failures) => SuiteStatus::Failed {
                    failures,
                    exit_code: run.exit_code,
                },
            },
        }
    }

    /// Verdict over `runs` measured against the `configured` suite set.
    pub fn aggregate(&self, runs: &[SuiteRun], configured: &[String], complete: bool) -> AggregateReport {
        let mut per_suite: BTreeMap<String, SuiteStatus> = configured
            .iter()
            .map(|id| (id.clone(), SuiteStatus::NotRun))
            .collect();
        for run in runs {
            per_suite.insert(run.suite_id.clone(), Self::status_of(run));
        }

        let missing: Vec<String> = configured
            .iter()
            .filter(|id| per_suite.get(*id) == Some(&SuiteStatus::NotRun))
            .cloned()
            .collect();
        let scope = if missing.is_empty() {
            EvaluatedScope::Full
        } else {
            EvaluatedScope::Partial {
                evaluated: configured
                    .iter()
                    .filter(|id| !missing.contains(id))
                    .cloned()
                    .collect(),
                missing,
            }
        };

        let all_passed = !configured.is_empty()
            && configured
                .iter()
                .all(|id| per_suite.get(id).is_some_and(|s| s.is_passed()));
        let overall = if all_passed && complete && scope == EvaluatedScope::Full {
            Verdict::Passed
        } else {
            Verdict::Failed
        };

        let report = AggregateReport {
            overall,
            per_suite,
            scope,
            complete,
        };
        info!(overall = ?report.overall, complete, summary = %report.summary(), "aggregated suite results");
        report
    }

    /// Parse every run's log, then aggregate.
    pub async fn evaluate(
        &self,
        mut runs: Vec<SuiteRun>,
        configured: &[String],
        complete: bool,
    ) -> (Vec<SuiteRun>, AggregateReport) {
        for run in &mut runs {
            self.parse_run(run).await;
        }
        let report = self.aggregate(&runs, configured, complete);
        (runs, report)
    }
}
