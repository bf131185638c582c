//! Workspace
//!
//! Single-writer access to the working tree. Every mutating VCS call goes
//! through here and holds the workspace lock for its duration.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::Mutex;
use tracing::{debug, error, instrument, warn};

use crate::domain::errors::RepairResult;
use crate::domain::models::Snapshot;
use crate::domain::ports::VcsProvider;

/// What a candidate did to the working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppliedChange {
    /// A candidate diff applied over the pending changes.
    Patch(Vec<u8>),
    /// The pending diff, reverted so the tree matches HEAD.
    DroppedPending(Vec<u8>),
}

/// Guarded handle to the working tree.
///
/// Mutating methods take a `&Snapshot`. Only the backup manager can mint a
/// snapshot, so nothing here can run before the caller's work is on disk.
pub struct Workspace {
    vcs: Arc<dyn VcsProvider>,
    lock: Mutex<()>,
}

impl Workspace {
    pub fn new(vcs: Arc<dyn VcsProvider>) -> Self {
        Self {
            vcs,
            lock: Mutex::new(()),
        }
    }

    /// Read-only access for ref resolution.
    pub fn vcs(&self) -> &dyn VcsProvider {
        self.vcs.as_ref()
    }

    /// Current uncommitted changes as a diff against HEAD.
    pub async fn diff(&self) -> RepairResult<Vec<u8>> {
        let _guard = self.lock.lock().await;
        Ok(self.vcs.diff_working_tree().await?)
    }

    /// Apply a candidate patch and return what changed on disk.
    ///
    /// An empty patch asks for the pending changes to be dropped: the
    /// current diff against HEAD is reverted and kept in the returned
    /// change so [`Workspace::revert_patch`] can put it back.
    #[instrument(skip_all, fields(snapshot_id = %snapshot.id(), patch_len = patch.len()))]
    pub async fn apply_patch(&self, snapshot: &Snapshot, patch: &[u8]) -> RepairResult<AppliedChange> {
        let _guard = self.lock.lock().await;
        if patch.is_empty() {
            let pending = self.vcs.diff_working_tree().await?;
            if !pending.is_empty() {
                self.vcs.revert_diff(&pending).await?;
            }
            debug!(pending_len = pending.len(), "pending changes reverted to HEAD");
            return Ok(AppliedChange::DroppedPending(pending));
        }
        self.vcs.apply_diff(patch).await?;
        debug!("patch applied");
        Ok(AppliedChange::Patch(patch.to_vec()))
    }

    /// Undo a change made by [`Workspace::apply_patch`].
    #[instrument(skip_all, fields(snapshot_id = %snapshot.id()))]
    pub async fn revert_patch(&self, snapshot: &Snapshot, change: &AppliedChange) -> RepairResult<()> {
        let _guard = self.lock.lock().await;
        match change {
            AppliedChange::Patch(patch) => self.vcs.revert_diff(patch).await?,
            AppliedChange::DroppedPending(pending) if pending.is_empty() => {}
            AppliedChange::DroppedPending(pending) => self.vcs.apply_diff(pending).await?,
        }
        debug!("candidate change undone");
        Ok(())
    }

    /// Discard everything and reapply the snapshot payload.
    #[instrument(skip_all, fields(snapshot_id = %snapshot.id()))]
    pub async fn reset_to(&self, snapshot: &Snapshot) -> RepairResult<()> {
        let _guard = self.lock.lock().await;
        self.vcs.discard_changes().await?;
        if !snapshot.is_empty() {
            self.vcs.apply_diff(snapshot.diff_payload()).await?;
        }
        Ok(())
    }

    /// Check out `target`, run `body`, then return to the prior ref with
    /// pending changes reinstated.
    ///
    /// Restore runs on every exit path. A panic in `body` is resumed after
    /// the restore. The lock is held throughout, so `body` must not call
    /// back into the workspace, and the returned future must be driven to
    /// completion; cancel through `body` instead of dropping it.
    #[instrument(skip_all, fields(snapshot_id = %snapshot.id(), target = %target))]
    pub async fn with_checkout<T, F, Fut>(
        &self,
        snapshot: &Snapshot,
        target: &str,
        body: F,
    ) -> RepairResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RepairResult<T>>,
    {
        let guard = self.lock.lock().await;
        let checkout = self.vcs.checkout(target).await?;
        debug!(previous = %checkout.previous, "checked out probe target");

        let outcome = AssertUnwindSafe(body()).catch_unwind().await;
        let restored = self.vcs.restore(checkout).await;
        drop(guard);

        match outcome {
            Err(panic) => {
                if let Err(e) = &restored {
                    error!(error = %e, "restore after panicking probe failed");
                }
                std::panic::resume_unwind(panic)
            }
            Ok(result) => {
                if let Err(e) = restored {
                    if let Err(body_err) = &result {
                        warn!(error = %body_err, "probe failed before restore error");
                    }
                    return Err(e.into());
                }
                result
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryVcs;
    use crate::domain::errors::RepairError;
    use chrono::Utc;
    use std::path::PathBuf;

    fn snapshot(payload: Vec<u8>) -> Snapshot {
        Snapshot::new("snap-t".into(), payload, Utc::now(), PathBuf::from("/tmp/snap-t.patch"))
    }

    async fn panicking_probe() -> RepairResult<()> {
        panic!("probe panicked")
    }

    fn fixture() -> (Arc<InMemoryVcs>, Workspace) {
        let vcs = Arc::new(InMemoryVcs::new([("lib.rs", "fn a() {}\n")]));
        vcs.write("lib.rs", "fn a() { 1 }\n");
        let ws = Workspace::new(vcs.clone());
        (vcs, ws)
    }

    #[tokio::test]
    async fn checkout_restores_after_error() {
        let (vcs, ws) = fixture();
        let snap = snapshot(ws.diff().await.unwrap());
        let before = vcs.tree();
        let result: RepairResult<()> = ws
            .with_checkout(&snap, "HEAD", || async {
                Err(RepairError::Invariant("probe broke".into()))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(vcs.tree(), before);
        assert_eq!(vcs.read("lib.rs").as_deref(), Some("fn a() { 1 }\n"));
    }

    #[tokio::test]
    async fn checkout_restores_after_panic() {
        let (vcs, ws) = fixture();
        let snap = snapshot(ws.diff().await.unwrap());
        let before = vcs.tree();
        let ws = Arc::new(ws);
        let ws2 = ws.clone();
        let joined = tokio::spawn(async move {
            ws2.with_checkout(&snap, "HEAD", panicking_probe).await
        })
        .await;
        assert!(joined.unwrap_err().is_panic());
        assert_eq!(vcs.tree(), before);
        // lock released
        assert!(ws.diff().await.is_ok());
    }

    #[tokio::test]
    async fn body_sees_committed_tree() {
        let (vcs, ws) = fixture();
        let snap = snapshot(ws.diff().await.unwrap());
        let seen = ws
            .with_checkout(&snap, "HEAD", || async { Ok(vcs.read("lib.rs")) })
            .await
            .unwrap();
        assert_eq!(seen.as_deref(), Some("fn a() {}\n"));
    }

    #[tokio::test]
    async fn empty_patch_drops_pending_changes_until_undone() {
        let (vcs, ws) = fixture();
        vcs.write("notes.md", "wip\n");
        let snap = snapshot(ws.diff().await.unwrap());
        let before = vcs.tree();

        let change = ws.apply_patch(&snap, &[]).await.unwrap();
        assert!(matches!(&change, AppliedChange::DroppedPending(d) if !d.is_empty()));
        assert_eq!(vcs.read("lib.rs").as_deref(), Some("fn a() {}\n"));
        assert!(vcs.read("notes.md").is_none());

        ws.revert_patch(&snap, &change).await.unwrap();
        assert_eq!(vcs.tree(), before);
    }

    #[tokio::test]
    async fn empty_patch_on_clean_tree_changes_nothing() {
        let vcs = Arc::new(InMemoryVcs::new([("lib.rs", "fn a() {}\n")]));
        let ws = Workspace::new(vcs.clone());
        let snap = snapshot(Vec::new());
        let before = vcs.tree();
        let change = ws.apply_patch(&snap, &[]).await.unwrap();
        assert_eq!(change, AppliedChange::DroppedPending(Vec::new()));
        ws.revert_patch(&snap, &change).await.unwrap();
        assert_eq!(vcs.tree(), before);
        assert_eq!(vcs.mutation_count(), 0);
    }
}
