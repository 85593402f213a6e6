//! Pre-mutation source snapshots.
//!
//! Local sources are archived byte-for-byte into a zip; cloud sources get a
//! JSON manifest of stable ids sufficient to reconstruct the pre-run state.
//! Snapshotting is fail-closed: any failure removes the partial artifact
//! and aborts the run before a single move or delete has happened.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use zip::write::{SimpleFileOptions, ZipWriter};

use shelfwright_core::{BackupError, SourceLocation};
use shelfwright_scan::{ListTarget, Scanner, StorageBackend};

const MANIFEST_VERSION: u32 = 1;

/// What kind of artifact a snapshot produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArchiveKind {
    /// Byte-for-byte zip of a local source.
    Zip,
    /// JSON manifest of a cloud source.
    Manifest,
}

/// Handle to a completed snapshot artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveHandle {
    /// Where the artifact was written.
    pub path: PathBuf,
    /// Zip or manifest.
    pub kind: ArchiveKind,
    /// Number of files covered.
    pub entries: u64,
}

/// One file in a cloud manifest. The stable id plus name and size are
/// enough to locate and verify the original after a bad run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// File name at snapshot time.
    pub name: String,
    /// Identity of the file (provider + stable remote id).
    pub location: SourceLocation,
    /// Size in bytes at snapshot time.
    pub size: u64,
}

/// Manifest artifact for cloud sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Format version.
    pub version: u32,
    /// When the snapshot was taken.
    pub generated_at: DateTime<Utc>,
    /// Description of the source root.
    pub source: String,
    /// All scanned files.
    pub entries: Vec<ManifestEntry>,
}

/// Snapshot the backend's source tree into `out_dir`.
///
/// Runs before any mutation; the artifact is self-contained and does not
/// depend on files that are subsequently moved or deleted.
pub fn snapshot(
    backend: Arc<dyn StorageBackend>,
    out_dir: &Path,
    label: &str,
) -> Result<ArchiveHandle, BackupError> {
    std::fs::create_dir_all(out_dir).map_err(|e| BackupError::Io {
        path: out_dir.to_path_buf(),
        source: e,
    })?;

    let scan = Scanner::new(backend.clone())
        .scan()
        .map_err(|e| BackupError::Archive(format!("source listing failed: {e}")))?;

    let stamp = Utc::now().format("%Y%m%d_%H%M%S");
    let root = backend.root();

    let handle = match &root {
        ListTarget::Local { path: source_root } => {
            let archive_path = out_dir.join(format!("backup_{label}_{stamp}.zip"));
            write_zip(backend.as_ref(), source_root, &scan.records, &archive_path)
                .inspect_err(|_| {
                    // Never leave a partial archive behind
                    let _ = std::fs::remove_file(&archive_path);
                })?;
            ArchiveHandle {
                path: archive_path,
                kind: ArchiveKind::Zip,
                entries: scan.records.len() as u64,
            }
        }
        ListTarget::Cloud { .. } => {
            let manifest_path = out_dir.join(format!("backup_{label}_{stamp}.json"));
            write_manifest(&root, &scan.records, &manifest_path).inspect_err(|_| {
                let _ = std::fs::remove_file(&manifest_path);
            })?;
            ArchiveHandle {
                path: manifest_path,
                kind: ArchiveKind::Manifest,
                entries: scan.records.len() as u64,
            }
        }
    };

    info!(path = %handle.path.display(), entries = handle.entries, "snapshot complete");
    Ok(handle)
}

/// Stream every record into a zip archive. Sequential: one writer.
fn write_zip(
    backend: &dyn StorageBackend,
    source_root: &Path,
    records: &[shelfwright_core::FileRecord],
    archive_path: &Path,
) -> Result<(), BackupError> {
    let file = File::create(archive_path).map_err(|e| BackupError::Io {
        path: archive_path.to_path_buf(),
        source: e,
    })?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for record in records {
        let entry_name = entry_name_for(record, source_root);
        debug!(entry = %entry_name, "archiving");

        zip.start_file(entry_name.as_str(), options)
            .map_err(|e| BackupError::Archive(e.to_string()))?;

        let mut reader = backend
            .open(&record.location)
            .map_err(|e| BackupError::Entry {
                entry: entry_name.clone(),
                message: e.to_string(),
            })?;
        io::copy(&mut reader, &mut zip).map_err(|e| BackupError::Entry {
            entry: entry_name,
            message: e.to_string(),
        })?;
    }

    zip.finish()
        .map_err(|e| BackupError::Archive(e.to_string()))?;
    Ok(())
}

/// Relative archive entry name for a record.
fn entry_name_for(record: &shelfwright_core::FileRecord, source_root: &Path) -> String {
    match &record.location {
        SourceLocation::Local { path } => path
            .strip_prefix(source_root)
            .unwrap_or(path)
            .to_string_lossy()
            .into_owned(),
        SourceLocation::Cloud { .. } => record.name.to_string(),
    }
}

/// Write the cloud manifest as pretty JSON.
fn write_manifest(
    root: &ListTarget,
    records: &[shelfwright_core::FileRecord],
    manifest_path: &Path,
) -> Result<(), BackupError> {
    let manifest = Manifest {
        version: MANIFEST_VERSION,
        generated_at: Utc::now(),
        source: root.to_string(),
        entries: records
            .iter()
            .map(|r| ManifestEntry {
                name: r.name.to_string(),
                location: r.location.clone(),
                size: r.size,
            })
            .collect(),
    };

    let file = File::create(manifest_path).map_err(|e| BackupError::Io {
        path: manifest_path.to_path_buf(),
        source: e,
    })?;
    serde_json::to_writer_pretty(BufWriter::new(file), &manifest)
        .map_err(|e| BackupError::Archive(e.to_string()))
}
