//! Command-line interface.

pub mod commands;
pub mod duration;
pub mod output;
pub mod wiring;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;

use crate::domain::errors::RepairError;
use crate::infrastructure::config::ConfigError;
use commands::locate::LocateArgs;
use commands::repair::RepairArgs;
use commands::snapshot::SnapshotArgs;
use commands::verify::VerifyArgs;

/// Exit code for anything that went wrong outside a session outcome.
pub const EXIT_FATAL: i32 = 3;

/// Exit code for configuration and snapshot set-up problems.
pub const EXIT_SETUP: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "mender", version, about = "Diagnose and repair test regressions without losing your work")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Config file (replaces .mender/config.yaml and .mender/local.yaml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Repository root
    #[arg(short = 'C', long, global = true, default_value = ".")]
    pub repo: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Snapshot, locate a passing baseline, try bounded fixes, verify every suite
    Repair(RepairArgs),
    /// Run the configured suites in parallel and report, without touching the tree
    Verify(VerifyArgs),
    /// Find the nearest reference state where the fast suite passes
    Locate(LocateArgs),
    /// Inspect, restore or release the outstanding snapshot
    Snapshot(SnapshotArgs),
}

/// Exit code for an error that escaped a command.
pub fn exit_code_for(err: &anyhow::Error) -> i32 {
    if let Some(e) = err.downcast_ref::<RepairError>() {
        return e.exit_code();
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return EXIT_SETUP;
    }
    EXIT_FATAL
}

/// Print `err` and return the exit code to use.
pub fn handle_error(err: &anyhow::Error, json: bool, code: i32) -> i32 {
    if json {
        let body = serde_json::json!({ "error": format!("{err:#}"), "exit_code": code });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{} {err:#}", style("error:").red().bold());
        if let Some(RepairError::RecoveryFailure { path, .. }) = err.downcast_ref::<RepairError>() {
            eprintln!("raw snapshot kept at {}", path.display());
        }
    }
    code
}
