//! `mender repair`: snapshot, locate, fix, verify.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::Args;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::CommandContext;
use crate::cli::duration::parse_duration;
use crate::cli::output::{attempts_table, headline, output, probes_table, suites_table, CommandOutput};
use crate::cli::wiring;
use crate::domain::models::{Config, RepairReport, SessionOutcome};
use crate::infrastructure::config::ConfigLoader;

#[derive(Args, Debug, Default)]
pub struct RepairArgs {
    /// Upper bound on fix attempts (0 gives up immediately)
    #[arg(long)]
    pub max_attempts: Option<usize>,

    /// Suites to verify with, comma separated (default: all configured)
    #[arg(long, value_delimiter = ',')]
    pub suites: Vec<String>,

    /// Suite used for in-loop verification and reference probes
    #[arg(long)]
    pub fast_suite: Option<String>,

    /// Per-suite timeout, e.g. 90, 45s, 30m, 1h30m
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,
}

/// Apply suite selection, fast suite and timeout flags on top of `config`.
pub fn apply_suite_flags(
    config: &mut Config,
    suites: &[String],
    fast_suite: Option<&str>,
    timeout: Option<Duration>,
) -> Result<()> {
    if !suites.is_empty() {
        config
            .select_suites(suites)
            .map_err(|unknown| anyhow!("unknown suite(s): {}", unknown.join(", ")))?;
        if config
            .fast_suite
            .as_deref()
            .is_some_and(|fast| !config.is_selected(fast))
        {
            config.fast_suite = None;
        }
    }
    if let Some(fast) = fast_suite {
        if !config.is_selected(fast) {
            return Err(anyhow!("--fast-suite `{fast}` is not among the selected suites"));
        }
        config.fast_suite = Some(fast.to_string());
    }
    if let Some(timeout) = timeout {
        config.suite_timeout_secs = timeout.as_secs().max(1);
    }
    ConfigLoader::require_suites(config)?;
    ConfigLoader::validate(config)?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct RepairOutput {
    #[serde(flatten)]
    pub report: RepairReport,
    pub report_path: PathBuf,
}

impl CommandOutput for RepairOutput {
    fn to_human(&self) -> String {
        let report = &self.report;
        let mut lines = vec![headline(
            &report.headline(),
            report.outcome == SessionOutcome::Succeeded,
        )];

        if !report.probes.is_empty() {
            lines.push(String::new());
            lines.push("Reference probes:".to_string());
            lines.push(probes_table(&report.probes));
        }
        if !report.attempts.is_empty() {
            lines.push(String::new());
            lines.push(format!("Fix attempts ({} of {}):", report.attempts.len(), report.max_attempts));
            lines.push(attempts_table(&report.attempts));
        }
        if let Some(aggregate) = &report.aggregate {
            lines.push(String::new());
            lines.push(format!("Verification: {}", aggregate.summary()));
            lines.push(suites_table(&report.suite_runs, aggregate));
        }
        if let Some(error) = &report.error {
            lines.push(String::new());
            lines.push(format!("Reason: {error}"));
        }
        if let Some(hint) = report.recovery.as_ref().and_then(|r| r.manual_recovery_hint()) {
            lines.push(headline(&hint, false));
        }
        lines.push(String::new());
        lines.push(format!("Snapshot: {}", report.snapshot_path.display()));
        lines.push(format!("Report:   {}", self.report_path.display()));
        lines.join("\n")
    }
}

pub async fn execute(args: RepairArgs, mut ctx: CommandContext, cancel: &CancellationToken) -> Result<i32> {
    apply_suite_flags(
        &mut ctx.config,
        &args.suites,
        args.fast_suite.as_deref(),
        args.timeout,
    )?;
    if let Some(max) = args.max_attempts {
        ctx.config.max_attempts = max;
    }
    ConfigLoader::require_proposer(&ctx.config)?;

    let orchestrator = wiring::orchestrator(&ctx.root, &ctx.config)?;
    let report = orchestrator.run(cancel).await?;
    let code = report.exit_code;
    let report_path = orchestrator.reports().report_path(report.session_id);
    output(&RepairOutput { report, report_path }, ctx.json);
    Ok(code)
}
