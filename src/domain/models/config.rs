use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::suite::{ResultFormat, SuiteCost};

/// Main configuration structure for mender
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Upper bound on fix attempts per session (0 = give up immediately)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Suite used for in-loop verification and reference probes
    #[serde(default)]
    pub fast_suite: Option<String>,

    /// Per-suite timeout in seconds
    #[serde(default = "default_suite_timeout_secs")]
    pub suite_timeout_secs: u64,

    /// Consecutive worse attempts tolerated before the loop stops (0 = never)
    #[serde(default = "default_max_consecutive_regressions")]
    pub max_consecutive_regressions: usize,

    /// Ref whose merge base with HEAD is probed last
    #[serde(default = "default_upstream_base")]
    pub upstream_base: String,

    /// Durable storage for snapshots, suite logs and reports
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    /// Log lines forwarded to the fix proposer
    #[serde(default = "default_diagnostics_tail_lines")]
    pub diagnostics_tail_lines: usize,

    #[serde(default)]
    pub suites: Vec<SuiteConfig>,

    /// Suites picked with `--suites`; empty runs every configured suite.
    /// Verdicts are still measured against the whole of `suites`.
    #[serde(skip)]
    pub selected_suites: Vec<String>,

    #[serde(default)]
    pub proposer: ProposerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

const fn default_max_attempts() -> usize {
    5
}

const fn default_suite_timeout_secs() -> u64 {
    1800
}

const fn default_max_consecutive_regressions() -> usize {
    2
}

fn default_upstream_base() -> String {
    "origin/main".to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from(".git/mender")
}

const fn default_diagnostics_tail_lines() -> usize {
    200
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            fast_suite: None,
            suite_timeout_secs: default_suite_timeout_secs(),
            max_consecutive_regressions: default_max_consecutive_regressions(),
            upstream_base: default_upstream_base(),
            state_dir: default_state_dir(),
            diagnostics_tail_lines: default_diagnostics_tail_lines(),
            suites: vec![],
            selected_suites: vec![],
            proposer: ProposerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Explicit `fast_suite`, else the first cheap selected suite, else the
    /// first selected suite.
    pub fn fast_suite_id(&self) -> Option<&str> {
        if let Some(id) = self.fast_suite.as_deref() {
            return Some(id);
        }
        let selected: Vec<&SuiteConfig> = self
            .suites
            .iter()
            .filter(|s| self.is_selected(&s.id))
            .collect();
        selected
            .iter()
            .find(|s| s.cost == SuiteCost::Cheap)
            .or_else(|| selected.first())
            .map(|s| s.id.as_str())
    }

    pub fn suite(&self, id: &str) -> Option<&SuiteConfig> {
        self.suites.iter().find(|s| s.id == id)
    }

    /// Every configured suite id, in configuration order.
    pub fn suite_ids(&self) -> Vec<String> {
        self.suites.iter().map(|s| s.id.clone()).collect()
    }

    /// The ids a verification run executes.
    pub fn selected_suite_ids(&self) -> Vec<String> {
        if self.selected_suites.is_empty() {
            self.suite_ids()
        } else {
            self.selected_suites.clone()
        }
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.suite(id).is_some()
            && (self.selected_suites.is_empty() || self.selected_suites.iter().any(|s| s == id))
    }

    pub const fn suite_timeout(&self) -> Duration {
        Duration::from_secs(self.suite_timeout_secs)
    }

    /// Run only the named suites, in the order given. `suites` itself is
    /// left whole.
    ///
    /// Unknown ids are returned as the error value.
    pub fn select_suites(&mut self, ids: &[String]) -> Result<(), Vec<String>> {
        let unknown: Vec<String> = ids
            .iter()
            .filter(|id| self.suite(id).is_none())
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(unknown);
        }
        let mut selected: Vec<String> = Vec::with_capacity(ids.len());
        for id in ids {
            if !selected.contains(id) {
                selected.push(id.clone());
            }
        }
        self.selected_suites = selected;
        Ok(())
    }
}

/// One configured test suite
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SuiteConfig {
    pub id: String,

    /// Shell command, run with `sh -c` from the repository root
    pub command: String,

    #[serde(default)]
    pub cost: SuiteCost,

    /// How failure counts are read from the suite's log
    #[serde(default)]
    pub format: ResultFormat,
}

/// External fix proposer command
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProposerConfig {
    #[serde(default)]
    pub command: String,

    #[serde(default = "default_proposer_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_proposer_timeout_secs() -> u64 {
    900
}

impl Default for ProposerConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            timeout_secs: default_proposer_timeout_secs(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Optional directory for rolling file output
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default)]
    pub rotation: RotationPolicy,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: RotationPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RotationPolicy {
    #[default]
    Daily,
    Hourly,
    Never,
}
