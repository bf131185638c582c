//! Builds the concrete component graph for a repository.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::proposer::CommandFixProposer;
use crate::infrastructure::storage::ReportStore;
use crate::infrastructure::suites::ShellSuiteExecutor;
use crate::infrastructure::vcs::GitVcs;
use crate::services::{BackupManager, RepairOrchestrator, RepairPorts, Workspace};

/// Load configuration for `root`, or from `file` when given, and anchor
/// `state_dir` at the repository root.
pub fn load_config(root: &Path, file: Option<&Path>) -> Result<Config> {
    let mut config = match file {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load(root)?,
    };
    if config.state_dir.is_relative() {
        config.state_dir = root.join(&config.state_dir);
    }
    Ok(config)
}

pub fn repository_root(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("cannot open repository at {}", path.display()))
}

pub fn git_vcs(root: &Path, config: &Config) -> Arc<GitVcs> {
    Arc::new(GitVcs::new(root, config.upstream_base.clone(), &config.state_dir))
}

/// Orchestrator with suite logs under `sessions/<id>/logs`.
pub fn orchestrator(root: &Path, config: &Config) -> Result<RepairOrchestrator> {
    let session_id = Uuid::new_v4();
    let log_dir = ReportStore::new(&config.state_dir)
        .session_dir(session_id)
        .join("logs");
    let ports = RepairPorts {
        vcs: git_vcs(root, config),
        executor: Arc::new(ShellSuiteExecutor::new(root, &config.suites, log_dir)),
        proposer: Arc::new(CommandFixProposer::new(root, &config.proposer)),
    };
    Ok(RepairOrchestrator::new(ports, config)?.with_session_id(session_id))
}

/// Backup manager alone, for the manual `snapshot` commands.
pub fn backup_manager(root: &Path, config: &Config) -> BackupManager {
    BackupManager::new(Arc::new(Workspace::new(git_vcs(root, config))), &config.state_dir)
}
