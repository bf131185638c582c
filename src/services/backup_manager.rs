//! Backup Manager
//!
//! Captures the caller's uncommitted work before anything touches the
//! working tree, and puts it back on demand. Payloads are written to
//! `state_dir/snapshots/` before `create_snapshot` returns and are never
//! deleted by this crate.
//!
//! An `OUTSTANDING` marker file names the snapshot of the session in
//! flight. It is created with `create_new`, so a second session on the same
//! workspace refuses to start until the first one releases it.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use super::workspace::Workspace;
use crate::domain::errors::{RepairError, RepairResult};
use crate::domain::models::snapshot::SnapshotMeta;
use crate::domain::models::Snapshot;
use crate::infrastructure::storage::write_atomic;

const OUTSTANDING_MARKER: &str = "OUTSTANDING";

pub struct BackupManager {
    workspace: Arc<Workspace>,
    snapshots_dir: PathBuf,
}

impl BackupManager {
    pub fn new(workspace: Arc<Workspace>, state_dir: &Path) -> Self {
        Self {
            workspace,
            snapshots_dir: state_dir.join("snapshots"),
        }
    }

    pub fn snapshots_dir(&self) -> &Path {
        &self.snapshots_dir
    }

    fn marker_path(&self) -> PathBuf {
        self.snapshots_dir.join(OUTSTANDING_MARKER)
    }

    fn payload_path(&self, id: &str) -> PathBuf {
        self.snapshots_dir.join(format!("{id}.patch"))
    }

    fn meta_path(&self, id: &str) -> PathBuf {
        self.snapshots_dir.join(format!("{id}.json"))
    }

    /// Capture every pending change to durable storage.
    ///
    /// Fails with `Setup` when another snapshot is outstanding or the diff
    /// cannot be produced. Nothing has been mutated in either case.
    #[instrument(skip(self))]
    pub async fn create_snapshot(&self) -> RepairResult<Snapshot> {
        fs::create_dir_all(&self.snapshots_dir)
            .map_err(|e| RepairError::Setup(format!("cannot create {}: {e}", self.snapshots_dir.display())))?;

        let mut marker = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.marker_path())
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let held = fs::read_to_string(self.marker_path()).unwrap_or_default();
                return Err(RepairError::Setup(format!(
                    "snapshot `{}` is still outstanding; run `mender snapshot restore` or `mender snapshot release` first",
                    held.trim()
                )));
            }
            Err(e) => {
                return Err(RepairError::Setup(format!("cannot claim snapshot marker: {e}")));
            }
        };

        match self.capture().await {
            Ok(snapshot) => {
                if let Err(e) = marker
                    .write_all(snapshot.id().as_bytes())
                    .and_then(|()| marker.sync_all())
                {
                    self.drop_marker();
                    return Err(RepairError::Setup(format!("cannot write snapshot marker: {e}")));
                }
                info!(
                    snapshot_id = %snapshot.id(),
                    payload_len = snapshot.diff_payload().len(),
                    path = %snapshot.payload_path().display(),
                    "snapshot created"
                );
                Ok(snapshot)
            }
            Err(e) => {
                self.drop_marker();
                Err(e)
            }
        }
    }

    async fn capture(&self) -> RepairResult<Snapshot> {
        let payload = self
            .workspace
            .diff()
            .await
            .map_err(|e| RepairError::Setup(format!("cannot capture working tree: {e}")))?;

        let now = Utc::now();
        let base_id = Snapshot::generate_id(now);
        let mut id = base_id.clone();
        let mut n = 1;
        while self.payload_path(&id).exists() {
            id = format!("{base_id}-{n}");
            n += 1;
        }

        let payload_path = self.payload_path(&id);
        let snapshot = Snapshot::new(id.clone(), payload, now, payload_path.clone());
        let meta = serde_json::to_vec_pretty(&snapshot.meta())
            .map_err(|e| RepairError::Setup(format!("cannot encode snapshot metadata: {e}")))?;
        write_atomic(&payload_path, snapshot.diff_payload())
            .and_then(|()| write_atomic(&self.meta_path(&id), &meta))
            .map_err(|e| RepairError::Setup(format!("cannot persist snapshot: {e}")))?;
        Ok(snapshot)
    }

    fn drop_marker(&self) {
        if let Err(e) = fs::remove_file(self.marker_path()) {
            warn!(error = %e, "failed to remove snapshot marker");
        }
    }

    /// Put the working tree back to exactly the snapshot.
    ///
    /// The result is checked bit-for-bit against the payload. Any failure
    /// is a `RecoveryFailure` carrying the payload path.
    #[instrument(skip_all, fields(snapshot_id = %snapshot.id()))]
    pub async fn restore_snapshot(&self, snapshot: &Snapshot) -> RepairResult<()> {
        let failure = |reason: String| {
            error!(path = %snapshot.payload_path().display(), %reason, "snapshot restore failed");
            RepairError::RecoveryFailure {
                path: snapshot.payload_path().to_path_buf(),
                reason,
            }
        };

        self.workspace
            .reset_to(snapshot)
            .await
            .map_err(|e| failure(e.to_string()))?;
        let now = self.workspace.diff().await.map_err(|e| failure(e.to_string()))?;
        if now != snapshot.diff_payload() {
            return Err(failure(
                "working tree differs from the snapshot after restore".to_string(),
            ));
        }
        info!("working tree restored to snapshot");
        Ok(())
    }

    /// Whether the working tree is bit-for-bit the snapshot.
    pub async fn matches(&self, snapshot: &Snapshot) -> RepairResult<bool> {
        Ok(self.workspace.diff().await? == snapshot.diff_payload())
    }

    /// Restore only if the tree has drifted from the snapshot.
    /// Returns whether a restore was needed.
    pub async fn ensure_restored(&self, snapshot: &Snapshot) -> RepairResult<bool> {
        match self.matches(snapshot).await {
            Ok(true) => Ok(false),
            Ok(false) | Err(_) => self.restore_snapshot(snapshot).await.map(|()| true),
        }
    }

    /// Clear the outstanding marker for `snapshot`. The payload stays on disk.
    pub fn release(&self, snapshot: &Snapshot) -> RepairResult<()> {
        match fs::read_to_string(self.marker_path()) {
            Ok(held) if held.trim() == snapshot.id() => {
                fs::remove_file(self.marker_path())?;
                info!(snapshot_id = %snapshot.id(), "snapshot released");
                Ok(())
            }
            Ok(held) => Err(RepairError::Invariant(format!(
                "marker names `{}`, not `{}`",
                held.trim(),
                snapshot.id()
            ))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn load(&self, id: &str) -> RepairResult<Snapshot> {
        let meta: SnapshotMeta = serde_json::from_slice(&fs::read(self.meta_path(id))?)?;
        let payload = fs::read(self.payload_path(id))?;
        if payload.len() != meta.payload_len {
            return Err(RepairError::Storage(format!(
                "snapshot `{id}` payload is {} bytes, metadata says {}",
                payload.len(),
                meta.payload_len
            )));
        }
        Ok(Snapshot::new(meta.id, payload, meta.created_at, self.payload_path(id)))
    }

    /// Snapshot named by the outstanding marker, if any.
    pub fn outstanding(&self) -> RepairResult<Option<Snapshot>> {
        match fs::read_to_string(self.marker_path()) {
            Ok(held) => self.load(held.trim()).map(Some),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Clear the marker regardless of which snapshot it names.
    pub fn release_outstanding(&self) -> RepairResult<Option<String>> {
        match fs::read_to_string(self.marker_path()) {
            Ok(held) => {
                fs::remove_file(self.marker_path())?;
                warn!(snapshot_id = %held.trim(), "outstanding snapshot released manually");
                Ok(Some(held.trim().to_string()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryVcs;

    fn fixture() -> (Arc<InMemoryVcs>, BackupManager, tempfile::TempDir) {
        let vcs = Arc::new(InMemoryVcs::new([("src/lib.rs", "pub fn f() {}\n")]));
        vcs.write("src/lib.rs", "pub fn f() { todo!() }\n");
        vcs.write("notes.md", "wip\n");
        let dir = tempfile::tempdir().unwrap();
        let manager = BackupManager::new(Arc::new(Workspace::new(vcs.clone())), dir.path());
        (vcs, manager, dir)
    }

    #[tokio::test]
    async fn payload_is_durable_before_return() {
        let (_vcs, manager, _dir) = fixture();
        let snap = manager.create_snapshot().await.unwrap();
        assert!(!snap.is_empty());
        assert_eq!(fs::read(snap.payload_path()).unwrap(), snap.diff_payload());
        let loaded = manager.load(snap.id()).unwrap();
        assert_eq!(loaded, snap);
    }

    #[tokio::test]
    async fn second_snapshot_refused_while_outstanding() {
        let (_vcs, manager, _dir) = fixture();
        let snap = manager.create_snapshot().await.unwrap();
        let err = manager.create_snapshot().await.unwrap_err();
        assert!(matches!(err, RepairError::Setup(_)));
        assert_eq!(err.exit_code(), 2);

        manager.release(&snap).unwrap();
        assert!(manager.create_snapshot().await.is_ok());
    }

    #[tokio::test]
    async fn restore_is_bit_for_bit() {
        let (vcs, manager, _dir) = fixture();
        let before = vcs.tree();
        let snap = manager.create_snapshot().await.unwrap();
        vcs.write("src/lib.rs", "garbage\n");
        vcs.write("extra.rs", "x\n");

        manager.restore_snapshot(&snap).await.unwrap();
        assert_eq!(vcs.tree(), before);
        assert!(!manager.ensure_restored(&snap).await.unwrap());
    }

    #[tokio::test]
    async fn failed_restore_surfaces_payload_path() {
        let (vcs, manager, _dir) = fixture();
        let snap = manager.create_snapshot().await.unwrap();
        vcs.set_fail_discard(true);
        vcs.write("src/lib.rs", "garbage\n");

        match manager.restore_snapshot(&snap).await {
            Err(RepairError::RecoveryFailure { path, .. }) => {
                assert_eq!(path, snap.payload_path());
                assert!(path.exists());
            }
            other => panic!("expected RecoveryFailure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn outstanding_survives_restart() {
        let (vcs, manager, dir) = fixture();
        let snap = manager.create_snapshot().await.unwrap();

        let again = BackupManager::new(Arc::new(Workspace::new(vcs)), dir.path());
        let found = again.outstanding().unwrap().unwrap();
        assert_eq!(found.id(), snap.id());
        assert_eq!(again.release_outstanding().unwrap().as_deref(), Some(snap.id()));
        assert!(again.outstanding().unwrap().is_none());
        assert!(snap.payload_path().exists());
    }
}
