//! `mender verify`: run every selected suite in parallel, touching nothing.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::repair::apply_suite_flags;
use super::CommandContext;
use crate::cli::duration::parse_duration;
use crate::cli::output::{headline, output, suites_table, CommandOutput};
use crate::cli::wiring;
use crate::domain::models::{AggregateReport, SuiteRun};

#[derive(Args, Debug, Default)]
pub struct VerifyArgs {
    /// Suites to run, comma separated (default: all configured)
    #[arg(long, value_delimiter = ',')]
    pub suites: Vec<String>,

    /// Per-suite timeout, e.g. 90, 45s, 30m, 1h30m
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Serialize)]
pub struct VerifyOutput {
    pub aggregate: AggregateReport,
    pub runs: Vec<SuiteRun>,
}

impl VerifyOutput {
    pub fn exit_code(&self) -> i32 {
        if !self.aggregate.complete {
            3
        } else if self.aggregate.passed() {
            0
        } else {
            1
        }
    }
}

impl CommandOutput for VerifyOutput {
    fn to_human(&self) -> String {
        [
            headline(&self.aggregate.summary(), self.aggregate.passed()),
            suites_table(&self.runs, &self.aggregate),
        ]
        .join("\n")
    }
}

pub async fn execute(args: VerifyArgs, mut ctx: CommandContext, cancel: &CancellationToken) -> Result<i32> {
    apply_suite_flags(&mut ctx.config, &args.suites, None, args.timeout)?;
    let orchestrator = wiring::orchestrator(&ctx.root, &ctx.config)?;
    let (runs, aggregate) = orchestrator.verify(cancel).await;
    let result = VerifyOutput { aggregate, runs };
    output(&result, ctx.json);
    Ok(result.exit_code())
}
