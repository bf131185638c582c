//! `mender snapshot`: the manual recovery path.

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use super::CommandContext;
use crate::cli::output::{headline, output, CommandOutput};
use crate::cli::wiring;
use crate::domain::models::snapshot::SnapshotMeta;
use crate::domain::models::SessionOutcome;
use crate::infrastructure::storage::ReportStore;

#[derive(Args, Debug)]
pub struct SnapshotArgs {
    #[command(subcommand)]
    pub command: SnapshotCommands,
}

#[derive(Subcommand, Debug)]
pub enum SnapshotCommands {
    /// Show the outstanding snapshot and the last session
    Status,
    /// Put the working tree back to a snapshot (default: the outstanding one)
    Restore {
        /// Snapshot id
        id: Option<String>,
    },
    /// Clear the outstanding marker without touching the working tree
    Release,
}

#[derive(Debug, Serialize)]
pub struct LastSession {
    pub session_id: String,
    pub outcome: SessionOutcome,
    pub headline: String,
}

#[derive(Debug, Serialize)]
pub struct SnapshotStatusOutput {
    pub outstanding: Option<SnapshotMeta>,
    pub last_session: Option<LastSession>,
}

impl CommandOutput for SnapshotStatusOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![match &self.outstanding {
            Some(meta) => headline(
                &format!(
                    "snapshot `{}` is outstanding ({} bytes, taken {}) at {}",
                    meta.id,
                    meta.payload_len,
                    meta.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    meta.payload_path.display()
                ),
                false,
            ),
            None => headline("no outstanding snapshot", true),
        }];
        if let Some(last) = &self.last_session {
            lines.push(format!("last session {}: {} ({})", last.session_id, last.outcome, last.headline));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct SnapshotActionOutput {
    pub action: &'static str,
    pub snapshot_id: Option<String>,
    pub message: String,
}

impl CommandOutput for SnapshotActionOutput {
    fn to_human(&self) -> String {
        self.message.clone()
    }
}

pub async fn execute(args: SnapshotArgs, ctx: CommandContext) -> Result<i32> {
    let backup = wiring::backup_manager(&ctx.root, &ctx.config);
    match args.command {
        SnapshotCommands::Status => {
            let last_session = ReportStore::new(&ctx.config.state_dir)
                .latest()?
                .map(|report| LastSession {
                    session_id: report.session_id.to_string(),
                    outcome: report.outcome,
                    headline: report.headline(),
                });
            let status = SnapshotStatusOutput {
                outstanding: backup.outstanding()?.map(|s| s.meta()),
                last_session,
            };
            output(&status, ctx.json);
        }
        SnapshotCommands::Restore { id } => {
            let outstanding = backup.outstanding()?;
            let snapshot = match (id, &outstanding) {
                (Some(id), _) => backup.load(&id)?,
                (None, Some(snapshot)) => snapshot.clone(),
                (None, None) => bail!("no outstanding snapshot; pass a snapshot id"),
            };
            backup.restore_snapshot(&snapshot).await?;
            if outstanding.is_some_and(|o| o.id() == snapshot.id()) {
                backup.release(&snapshot)?;
            }
            output(
                &SnapshotActionOutput {
                    action: "restore",
                    snapshot_id: Some(snapshot.id().to_string()),
                    message: format!("working tree restored to snapshot `{}`", snapshot.id()),
                },
                ctx.json,
            );
        }
        SnapshotCommands::Release => {
            let released = backup.release_outstanding()?;
            let message = released.as_ref().map_or_else(
                || "no outstanding snapshot".to_string(),
                |id| format!("released snapshot `{id}`; its payload stays on disk"),
            );
            output(
                &SnapshotActionOutput {
                    action: "release",
                    snapshot_id: released,
                    message,
                },
                ctx.json,
            );
        }
    }
    Ok(0)
}
