//! Durable on-disk state under `state_dir`.
//!
//! Layout:
//! - `snapshots/<id>.patch`, `snapshots/<id>.json` and the `OUTSTANDING` marker
//! - `sessions/<session_id>/logs/<suite>-<n>.log`
//! - `sessions/<session_id>/report.json`

pub mod report_store;

pub use report_store::ReportStore;

use std::fs;
use std::io::{self, Write};
use std::path::Path;

/// Atomic write: write to a temp file in the same directory, fsync, then rename.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let parent = path.parent().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("no parent dir for {}", path.display()),
        )
    })?;
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
