//! Snapshot of the caller's uncommitted work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Restorable capture of every uncommitted change at session start.
///
/// Only the backup manager constructs snapshots, and mutating workspace
/// operations demand a `&Snapshot`, so holding one proves the caller's work
/// is already on durable storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    id: String,
    diff_payload: Vec<u8>,
    created_at: DateTime<Utc>,
    payload_path: PathBuf,
}

/// On-disk metadata stored next to the payload file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotMeta {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub payload_path: PathBuf,
    pub payload_len: usize,
}

impl Snapshot {
    pub(crate) const fn new(
        id: String,
        diff_payload: Vec<u8>,
        created_at: DateTime<Utc>,
        payload_path: PathBuf,
    ) -> Self {
        Self {
            id,
            diff_payload,
            created_at,
            payload_path,
        }
    }

    /// Timestamp-derived identifier, e.g. `snap-20261018T101500123Z`.
    pub fn generate_id(now: DateTime<Utc>) -> String {
        format!("snap-{}", now.format("%Y%m%dT%H%M%S%3fZ"))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn diff_payload(&self) -> &[u8] {
        &self.diff_payload
    }

    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Durable location of the raw payload, printed for manual recovery.
    pub fn payload_path(&self) -> &Path {
        &self.payload_path
    }

    /// True when the working tree had no pending changes at capture time.
    pub fn is_empty(&self) -> bool {
        self.diff_payload.is_empty()
    }

    pub fn meta(&self) -> SnapshotMeta {
        SnapshotMeta {
            id: self.id.clone(),
            created_at: self.created_at,
            payload_path: self.payload_path.clone(),
            payload_len: self.diff_payload.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn id_is_timestamp_derived() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 10, 15, 0).unwrap();
        assert_eq!(Snapshot::generate_id(now), "snap-20261018T101500000Z");
    }

    #[test]
    fn meta_reflects_payload() {
        let snap = Snapshot::new(
            "snap-1".into(),
            b"diff --git a/x b/x\n".to_vec(),
            Utc::now(),
            PathBuf::from("/tmp/snap-1.patch"),
        );
        let meta = snap.meta();
        assert_eq!(meta.id, "snap-1");
        assert_eq!(meta.payload_len, 19);
        assert!(!snap.is_empty());
    }
}
