//! Reference State Locator
//!
//! Finds the nearest state at which the fast suite passes by probing a fixed,
//! ordered candidate set: HEAD with pending changes set aside, the branch
//! tip, then the merge base with upstream. Each probe runs inside a scoped
//! checkout that is always undone.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::result_aggregator::ResultAggregator;
use super::suite_runner::run_suite;
use super::workspace::Workspace;
use crate::domain::errors::{RepairError, RepairResult};
use crate::domain::models::{
    ReferenceKind, ReferenceState, ReferenceStatus, Snapshot, SuiteRun, Termination,
};
use crate::domain::ports::{SuiteExecutor, VcsResult};

/// Successful locate: the passing baseline plus every probe made on the way.
#[derive(Debug, Clone)]
pub struct LocateReport {
    pub baseline: ReferenceState,
    pub probes: Vec<ReferenceState>,
}

pub struct ReferenceLocator {
    workspace: Arc<Workspace>,
    executor: Arc<dyn SuiteExecutor>,
    aggregator: ResultAggregator,
    fast_suite: String,
    timeout: Duration,
}

impl ReferenceLocator {
    pub fn new(
        workspace: Arc<Workspace>,
        executor: Arc<dyn SuiteExecutor>,
        aggregator: ResultAggregator,
        fast_suite: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            workspace,
            executor,
            aggregator,
            fast_suite: fast_suite.into(),
            timeout,
        }
    }

    async fn resolve_candidate(&self, kind: ReferenceKind) -> VcsResult<String> {
        let vcs = self.workspace.vcs();
        let reference = match kind {
            ReferenceKind::WorkingTree => "HEAD".to_string(),
            ReferenceKind::BranchHead => vcs.current_branch_head().await?,
            ReferenceKind::UpstreamBase => vcs.upstream_base().await?,
        };
        vcs.resolve(&reference).await
    }

    async fn probe(&self, cancel: &CancellationToken) -> RepairResult<SuiteRun> {
        let mut run = run_suite(self.executor.as_ref(), &self.fast_suite, self.timeout, cancel).await;
        if run.termination == Termination::Cancelled {
            return Err(RepairError::Cancelled);
        }
        self.aggregator.parse_run(&mut run).await;
        Ok(run)
    }

    /// Probe candidates in priority order and stop at the first passing one.
    ///
    /// Fails with `Locate` (carrying every probe) when nothing passes. A
    /// candidate that cannot be resolved is recorded `Unknown` and skipped;
    /// one resolving to an already-probed commit reuses that result.
    #[instrument(skip_all, fields(snapshot_id = %snapshot.id(), fast_suite = %self.fast_suite))]
    pub async fn locate(
        &self,
        snapshot: &Snapshot,
        cancel: &CancellationToken,
    ) -> RepairResult<LocateReport> {
        let mut probes = Vec::with_capacity(ReferenceKind::PROBE_ORDER.len());
        let mut seen: HashMap<String, ReferenceStatus> = HashMap::new();

        for kind in ReferenceKind::PROBE_ORDER {
            if cancel.is_cancelled() {
                return Err(RepairError::Cancelled);
            }

            let commit = match self.resolve_candidate(kind).await {
                Ok(commit) => commit,
                Err(e) => {
                    warn!(%kind, error = %e, "reference candidate unresolvable");
                    probes.push(ReferenceState::unresolved(kind, e.to_string()));
                    continue;
                }
            };

            if let Some(status) = seen.get(&commit) {
                debug!(%kind, %commit, "candidate already probed");
                probes.push(
                    ReferenceState::probed(kind, commit, *status)
                        .with_note("same commit as an earlier probe"),
                );
                continue;
            }

            let run = self
                .workspace
                .with_checkout(snapshot, &commit, || self.probe(cancel))
                .await?;
            let status = if ResultAggregator::status_of(&run).is_passed() {
                ReferenceStatus::Passing
            } else {
                ReferenceStatus::Failing
            };
            info!(%kind, %commit, %status, exit_code = run.exit_code, "reference probed");
            seen.insert(commit.clone(), status);

            let state = ReferenceState::probed(kind, commit, status);
            probes.push(state.clone());
            if status == ReferenceStatus::Passing {
                return Ok(LocateReport {
                    baseline: state,
                    probes,
                });
            }
        }

        warn!(probes = probes.len(), "no passing reference state");
        Err(RepairError::Locate { probes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{InMemoryVcs, ScriptedSuiteExecutor};
    use crate::services::backup_manager::BackupManager;

    struct Fixture {
        vcs: Arc<InMemoryVcs>,
        backup: BackupManager,
        locator: ReferenceLocator,
        _dir: tempfile::TempDir,
    }

    /// `unit` fails whenever `lib.rs` contains "bug".
    fn fixture(vcs: InMemoryVcs) -> Fixture {
        let vcs = Arc::new(vcs);
        let dir = tempfile::tempdir().unwrap();
        let workspace = Arc::new(Workspace::new(vcs.clone()));
        let executor = ScriptedSuiteExecutor::new(vcs.clone(), dir.path().join("logs")).suite(
            "unit",
            |tree| u32::from(tree.get("lib.rs").is_some_and(|c| c.contains("bug"))),
        );
        let locator = ReferenceLocator::new(
            workspace.clone(),
            Arc::new(executor),
            ResultAggregator::default(),
            "unit",
            Duration::from_secs(60),
        );
        Fixture {
            backup: BackupManager::new(workspace, dir.path()),
            vcs,
            locator,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn head_without_pending_changes_passes() {
        let f = fixture(InMemoryVcs::new([("lib.rs", "ok\n")]));
        f.vcs.write("lib.rs", "bug\n");
        let before = f.vcs.tree();
        let snap = f.backup.create_snapshot().await.unwrap();

        let report = f.locator.locate(&snap, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.baseline.kind, ReferenceKind::WorkingTree);
        assert_eq!(report.probes.len(), 1);
        assert_eq!(f.vcs.tree(), before);
    }

    #[tokio::test]
    async fn falls_back_to_upstream_base() {
        let vcs = InMemoryVcs::new([("lib.rs", "ok\n")]);
        let good = vcs.head();
        vcs.write("lib.rs", "bug\n");
        vcs.commit_working_tree();
        vcs.set_upstream_base(Some(&good));
        let f = fixture(vcs);
        let snap = f.backup.create_snapshot().await.unwrap();

        let report = f.locator.locate(&snap, &CancellationToken::new()).await.unwrap();
        assert_eq!(report.baseline.kind, ReferenceKind::UpstreamBase);
        assert_eq!(report.baseline.commit.as_deref(), Some(good.as_str()));
        // branch head resolves to HEAD and reuses its result
        assert_eq!(report.probes[1].status, ReferenceStatus::Failing);
        assert!(report.probes[1].note.is_some());
        assert_eq!(f.vcs.checkout_count(), 2);
        assert_eq!(f.vcs.mutation_count(), 0);
    }

    #[tokio::test]
    async fn nothing_passes_is_a_locate_error() {
        let vcs = InMemoryVcs::new([("lib.rs", "bug\n")]);
        let f = fixture(vcs);
        let snap = f.backup.create_snapshot().await.unwrap();

        let err = f.locator.locate(&snap, &CancellationToken::new()).await.unwrap_err();
        match err {
            RepairError::Locate { probes } => {
                assert_eq!(probes.len(), 3);
                assert_eq!(probes[2].status, ReferenceStatus::Unknown);
            }
            other => panic!("expected Locate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cancelled_before_probing() {
        let f = fixture(InMemoryVcs::new([("lib.rs", "ok\n")]));
        let snap = f.backup.create_snapshot().await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            f.locator.locate(&snap, &cancel).await,
            Err(RepairError::Cancelled)
        ));
        assert_eq!(f.vcs.checkout_count(), 0);
    }
}
