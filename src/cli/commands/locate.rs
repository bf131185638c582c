//! `mender locate`: find the nearest passing reference state.

use std::time::Duration;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::repair::apply_suite_flags;
use super::CommandContext;
use crate::cli::duration::parse_duration;
use crate::cli::output::{headline, output, probes_table, CommandOutput};
use crate::cli::wiring;
use crate::domain::errors::RepairError;
use crate::domain::models::ReferenceState;

#[derive(Args, Debug, Default)]
pub struct LocateArgs {
    /// Suite to probe with
    #[arg(long)]
    pub fast_suite: Option<String>,

    /// Per-probe timeout, e.g. 90, 45s, 30m, 1h30m
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Serialize)]
pub struct LocateOutput {
    pub baseline: Option<ReferenceState>,
    pub probes: Vec<ReferenceState>,
}

impl CommandOutput for LocateOutput {
    fn to_human(&self) -> String {
        let title = match &self.baseline {
            Some(baseline) => headline(&format!("fast suite passes at {}", baseline.label()), true),
            None => headline("no passing reference state; pre-existing breakage needs a human", false),
        };
        [title, probes_table(&self.probes)].join("\n")
    }
}

pub async fn execute(args: LocateArgs, mut ctx: CommandContext, cancel: &CancellationToken) -> Result<i32> {
    apply_suite_flags(&mut ctx.config, &[], args.fast_suite.as_deref(), args.timeout)?;
    let orchestrator = wiring::orchestrator(&ctx.root, &ctx.config)?;
    let (result, code) = match orchestrator.locate(cancel).await {
        Ok(located) => (
            LocateOutput {
                baseline: Some(located.baseline),
                probes: located.probes,
            },
            0,
        ),
        Err(RepairError::Locate { probes }) => (
            LocateOutput {
                baseline: None,
                probes,
            },
            2,
        ),
        Err(e) => return Err(e.into()),
    };
    output(&result, ctx.json);
    Ok(code)
}
