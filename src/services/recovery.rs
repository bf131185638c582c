//! Recovery Handler
//!
//! Last line of defence after an unexpected failure: put the caller's work
//! back and say so honestly.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use super::backup_manager::BackupManager;
use crate::domain::errors::RepairError;
use crate::domain::models::{RecoveryReport, RepairSession, SessionOutcome};

pub struct RecoveryHandler {
    backup: Arc<BackupManager>,
}

impl RecoveryHandler {
    pub fn new(backup: Arc<BackupManager>) -> Self {
        Self { backup }
    }

    /// Restore the session snapshot and finalize the session as `Fatal`.
    ///
    /// The outstanding marker is released only when the restore succeeded;
    /// otherwise it stays so the next session refuses to start on a tree
    /// that still needs manual attention.
    #[instrument(skip_all, fields(session_id = %session.id(), cause = %cause))]
    pub async fn recover(&self, session: &mut RepairSession, cause: &RepairError) -> RecoveryReport {
        let snapshot = session.snapshot();
        let restore = self.backup.restore_snapshot(snapshot).await;

        let report = RecoveryReport {
            cause: cause.to_string(),
            restored: restore.is_ok(),
            snapshot_path: snapshot.payload_path().to_path_buf(),
            restore_error: restore.err().map(|e| e.to_string()),
        };

        if report.restored {
            if let Err(e) = self.backup.release(snapshot) {
                warn!(error = %e, "could not release snapshot marker after recovery");
            }
            info!("original changes restored after fatal error");
        } else if let Some(hint) = report.manual_recovery_hint() {
            error!(%hint, "recovery failed");
        }

        if let Err(e) = session.finalize(SessionOutcome::Fatal) {
            warn!(error = %e, "session already finalized before recovery");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryVcs;
    use crate::services::workspace::Workspace;

    #[tokio::test]
    async fn restores_and_releases() {
        let vcs = Arc::new(InMemoryVcs::new([("a.txt", "1\n")]));
        vcs.write("a.txt", "2\n");
        let before = vcs.tree();
        let dir = tempfile::tempdir().unwrap();
        let backup = Arc::new(BackupManager::new(Arc::new(Workspace::new(vcs.clone())), dir.path()));
        let mut session = RepairSession::new(backup.create_snapshot().await.unwrap(), 3);
        vcs.write("a.txt", "half-applied\n");

        let report = RecoveryHandler::new(backup.clone())
            .recover(&mut session, &RepairError::Cancelled)
            .await;
        assert!(report.restored);
        assert_eq!(vcs.tree(), before);
        assert_eq!(session.outcome(), SessionOutcome::Fatal);
        assert!(backup.outstanding().unwrap().is_none());
    }

    #[tokio::test]
    async fn failed_restore_keeps_marker_and_path() {
        let vcs = Arc::new(InMemoryVcs::new([("a.txt", "1\n")]));
        vcs.write("a.txt", "2\n");
        let dir = tempfile::tempdir().unwrap();
        let backup = Arc::new(BackupManager::new(Arc::new(Workspace::new(vcs.clone())), dir.path()));
        let mut session = RepairSession::new(backup.create_snapshot().await.unwrap(), 3);
        vcs.set_fail_discard(true);

        let report = RecoveryHandler::new(backup.clone())
            .recover(&mut session, &RepairError::Invariant("crash".into()))
            .await;
        assert!(!report.restored);
        assert_eq!(report.snapshot_path, session.snapshot().payload_path());
        assert!(report.manual_recovery_hint().is_some());
        assert!(backup.outstanding().unwrap().is_some());
        assert_eq!(session.outcome().exit_code(), 3);
    }
}
