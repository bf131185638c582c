use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use uuid::Uuid;

use super::write_atomic;
use crate::domain::errors::{RepairError, RepairResult};
use crate::domain::models::RepairReport;

/// Persists session reports as `sessions/<id>/report.json`.
#[derive(Debug, Clone)]
pub struct ReportStore {
    sessions_dir: PathBuf,
}

impl ReportStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            sessions_dir: state_dir.join("sessions"),
        }
    }

    pub fn session_dir(&self, session_id: Uuid) -> PathBuf {
        self.sessions_dir.join(session_id.to_string())
    }

    pub fn report_path(&self, session_id: Uuid) -> PathBuf {
        self.session_dir(session_id).join("report.json")
    }

    pub fn save(&self, report: &RepairReport) -> RepairResult<PathBuf> {
        let path = self.report_path(report.session_id);
        let json = serde_json::to_vec_pretty(report)?;
        write_atomic(&path, &json)?;
        debug!(session_id = %report.session_id, path = %path.display(), "report saved");
        Ok(path)
    }

    pub fn load(&self, session_id: Uuid) -> RepairResult<RepairReport> {
        let bytes = fs::read(self.report_path(session_id))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Most recently started session with a readable report.
    pub fn latest(&self) -> RepairResult<Option<RepairReport>> {
        let entries = match fs::read_dir(&self.sessions_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RepairError::from(e)),
        };
        let mut latest: Option<RepairReport> = None;
        for entry in entries {
            let path = entry?.path().join("report.json");
            let Ok(bytes) = fs::read(&path) else {
                continue;
            };
            let Ok(report) = serde_json::from_slice::<RepairReport>(&bytes) else {
                debug!(path = %path.display(), "skipping unreadable report");
                continue;
            };
            if latest
                .as_ref()
                .is_none_or(|l| report.started_at > l.started_at)
            {
                latest = Some(report);
            }
        }
        Ok(latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{RepairSession, SessionOutcome, Snapshot};
    use chrono::{Duration, Utc};

    fn report(offset_secs: i64, outcome: SessionOutcome) -> RepairReport {
        let snap = Snapshot::new(
            "snap-x".into(),
            Vec::new(),
            Utc::now(),
            PathBuf::from("/tmp/snap-x.patch"),
        );
        let mut session = RepairSession::new(snap, 2);
        session.finalize(outcome).unwrap();
        let mut report = RepairReport::from_session(&session);
        report.started_at += Duration::seconds(offset_secs);
        report
    }

    #[test]
    fn save_and_load_latest() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReportStore::new(dir.path());
        assert!(store.latest().unwrap().is_none());

        let older = report(-60, SessionOutcome::AttemptsExhausted);
        let newer = report(0, SessionOutcome::Succeeded);
        store.save(&newer).unwrap();
        let path = store.save(&older).unwrap();
        assert!(path.ends_with("report.json"));

        let latest = store.latest().unwrap().unwrap();
        assert_eq!(latest.session_id, newer.session_id);
        assert_eq!(store.load(older.session_id).unwrap().exit_code, 1);
    }
}
