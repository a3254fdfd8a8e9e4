//! JSON export of parsed snapshots.

use crate::error::{Result, TsmError};
use crate::file_utils::{ensure_dir_exists, read_utf8_file};
use crate::models::{ExportOutcome, Snapshot, SnapshotDocument};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// `<output_dir>/<realm>_<download_time>.json`
pub fn export_path(output_dir: &Path, realm: &str, download_time: u64) -> PathBuf {
    output_dir.join(format!("{}_{}.json", realm, download_time))
}

/// Write `snapshot` as JSON unless a file for this (realm, download time) already exists.
///
/// The file is opened with create-new semantics, so an existing export is
/// never truncated or rewritten.
pub fn export_snapshot(snapshot: &Snapshot, realm: &str, output_dir: &Path) -> Result<ExportOutcome> {
    if realm.trim().is_empty() || realm.contains(['/', '\\']) {
        return Err(TsmError::InvalidArgument(format!(
            "Realm '{}' cannot be used in a file name",
            realm
        )));
    }
    ensure_dir_exists(output_dir)?;

    let path = export_path(output_dir, realm, snapshot.download_time);
    if path.exists() {
        tracing::warn!("Current data already exported to {:?}", path);
        return Ok(ExportOutcome::AlreadyExported(path));
    }

    let json = serde_json::to_vec(&snapshot.to_document()?)?;

    let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            tracing::warn!("Current data already exported to {:?}", path);
            return Ok(ExportOutcome::AlreadyExported(path));
        }
        Err(e) => {
            return Err(TsmError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create output file {:?}: {}", path, e),
            )));
        }
    };

    if let Err(e) = file.write_all(&json).and_then(|_| file.sync_all()) {
        // A partial file would make later runs skip this snapshot.
        drop(file);
        let _ = std::fs::remove_file(&path);
        return Err(TsmError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to write data to {:?}: {}", path, e),
        )));
    }

    tracing::info!(
        "Exported {} rows for {} to {:?}",
        snapshot.data.len(),
        realm,
        path
    );
    Ok(ExportOutcome::Written(path))
}

/// Read a previously exported JSON file back into a validated snapshot.
pub fn read_snapshot_file(path: &Path) -> Result<Snapshot> {
    let content = read_utf8_file(path)?;
    let document: SnapshotDocument = serde_json::from_str(&content)?;
    Snapshot::try_from(document)
}
