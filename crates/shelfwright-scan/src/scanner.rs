//! File record scanner.
//!
//! Walks a storage backend breadth-first and produces a flat snapshot of
//! `FileRecord`s. Transient listing failures are retried with backoff; an
//! entry that stays unreadable becomes a warning, never an abort.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use shelfwright_core::{BackendError, FileRecord, RecordId, ScanError, ScanWarning, WarningKind};

use crate::backend::{EntryError, ListTarget, RawEntry, RawEntryKind, StorageBackend};

/// How many times a failing sub-listing is attempted before giving up.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base delay between attempts; grows linearly per attempt.
const DEFAULT_BACKOFF: Duration = Duration::from_millis(50);

/// Summary counters for a scan.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ScanStats {
    /// Files recorded.
    pub files: u64,
    /// Directories visited.
    pub dirs: u64,
    /// Total bytes across recorded files.
    pub bytes: u64,
}

/// The result of one scan: a consume-once snapshot for a single run.
#[derive(Debug)]
pub struct ScanSnapshot {
    /// All file records found.
    pub records: Vec<FileRecord>,
    /// Non-fatal warnings.
    pub warnings: Vec<ScanWarning>,
    /// Summary counters.
    pub stats: ScanStats,
    /// How long the scan took.
    pub duration: Duration,
}

/// Breadth-first scanner over a storage backend.
pub struct Scanner {
    backend: Arc<dyn StorageBackend>,
    max_attempts: u32,
    backoff: Duration,
}

impl Scanner {
    /// Create a scanner over a backend.
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }

    /// Override the retry bound (mainly for tests).
    pub fn with_retry(mut self, max_attempts: u32, backoff: Duration) -> Self {
        self.max_attempts = max_attempts.max(1);
        self.backoff = backoff;
        self
    }

    /// Scan the backend's root into a snapshot. Read-only: nothing is
    /// touched beyond listings and metadata.
    ///
    /// Auth failures abort the scan (there is nothing meaningful to list);
    /// everything else degrades to warnings.
    pub fn scan(&self) -> Result<ScanSnapshot, BackendError> {
        let start = Instant::now();
        let mut records = Vec::new();
        let mut warnings = Vec::new();
        let mut stats = ScanStats::default();
        let mut next_id = 0u64;

        let mut queue = VecDeque::new();
        queue.push_back(self.backend.root());

        while let Some(target) = queue.pop_front() {
            stats.dirs += 1;
            let entries = match self.list_with_retry(&target) {
                Ok(entries) => entries,
                Err(err) if err.is_auth() => return Err(err),
                Err(err) => {
                    let err = ScanError::ListFailed {
                        target: target.to_string(),
                        source: err,
                    };
                    warn!(error = %err, "listing failed after retries");
                    warnings.push(ScanWarning::new(
                        target.to_string(),
                        err.to_string(),
                        WarningKind::ListFailed,
                    ));
                    continue;
                }
            };

            for entry in entries {
                match entry {
                    Ok(RawEntry {
                        name,
                        size,
                        modified,
                        kind,
                    }) => match kind {
                        RawEntryKind::File { location } => {
                            let record = FileRecord::new(
                                RecordId::new(next_id),
                                name,
                                size,
                                modified,
                                location,
                            );
                            next_id += 1;
                            stats.files += 1;
                            stats.bytes += size;
                            records.push(record);
                        }
                        RawEntryKind::Dir { target } => {
                            queue.push_back(target);
                        }
                    },
                    Err(entry_err) => {
                        let err = ScanError::Metadata {
                            target: entry_err.name.clone(),
                            message: entry_err.message,
                        };
                        warnings.push(ScanWarning::new(
                            entry_err.name,
                            err.to_string(),
                            WarningKind::MetadataFailed,
                        ));
                    }
                }
            }
        }

        debug!(
            files = stats.files,
            dirs = stats.dirs,
            warnings = warnings.len(),
            "scan complete"
        );

        Ok(ScanSnapshot {
            records,
            warnings,
            stats,
            duration: start.elapsed(),
        })
    }

    /// List one target, retrying transient failures with linear backoff.
    fn list_with_retry(
        &self,
        target: &ListTarget,
    ) -> Result<Vec<Result<RawEntry, EntryError>>, BackendError> {
        let mut attempt = 1;
        loop {
            match self.backend.list_dir(target) {
                Ok(entries) => return Ok(entries),
                Err(err) if err.is_auth() => return Err(err),
                Err(err) if attempt < self.max_attempts => {
                    debug!(target = %target, attempt, error = %err, "retrying listing");
                    std::thread::sleep(self.backoff * attempt);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Read;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};

    use shelfwright_core::SourceLocation;
    use tempfile::TempDir;

    use crate::backend::EntryError;
    use crate::local::LocalBackend;

    fn create_test_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::write(root.join("a.txt"), "hello").unwrap();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("sub/b.txt"), "world!").unwrap();
        fs::create_dir(root.join("sub/deep")).unwrap();
        fs::write(root.join("sub/deep/c.bin"), [0u8; 16]).unwrap();
        temp
    }

    #[test]
    fn test_scan_finds_all_files() {
        let temp = create_test_tree();
        let scanner = Scanner::new(Arc::new(LocalBackend::new(temp.path())));
        let snapshot = scanner.scan().unwrap();

        assert_eq!(snapshot.stats.files, 3);
        assert_eq!(snapshot.stats.bytes, 5 + 6 + 16);
        assert!(snapshot.warnings.is_empty());

        let mut names: Vec<_> = snapshot.records.iter().map(|r| r.name.as_str()).collect();
        names.sort();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.bin"]);
    }

    #[test]
    fn test_record_ids_unique() {
        let temp = create_test_tree();
        let scanner = Scanner::new(Arc::new(LocalBackend::new(temp.path())));
        let snapshot = scanner.scan().unwrap();

        let mut ids: Vec<_> = snapshot.records.iter().map(|r| r.id.0).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), snapshot.records.len());
    }

    /// Backend whose root listing fails a configurable number of times.
    struct FlakyBackend {
        inner: LocalBackend,
        failures_left: AtomicU32,
    }

    impl StorageBackend for FlakyBackend {
        fn root(&self) -> ListTarget {
            self.inner.root()
        }

        fn list_dir(
            &self,
            target: &ListTarget,
        ) -> Result<Vec<Result<RawEntry, EntryError>>, BackendError> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(BackendError::Provider("transient".to_string()));
            }
            self.inner.list_dir(target)
        }

        fn open(
            &self,
            location: &SourceLocation,
        ) -> Result<Box<dyn Read + Send>, BackendError> {
            self.inner.open(location)
        }

        fn relocate(&self, location: &SourceLocation, dest: &Path) -> Result<(), BackendError> {
            self.inner.relocate(location, dest)
        }

        fn remove(&self, location: &SourceLocation) -> Result<(), BackendError> {
            self.inner.remove(location)
        }
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let temp = create_test_tree();
        let backend = FlakyBackend {
            inner: LocalBackend::new(temp.path()),
            failures_left: AtomicU32::new(2),
        };
        let scanner =
            Scanner::new(Arc::new(backend)).with_retry(3, Duration::from_millis(1));

        let snapshot = scanner.scan().unwrap();
        assert_eq!(snapshot.stats.files, 3);
        assert!(snapshot.warnings.is_empty());
    }

    #[test]
    fn test_persistent_failure_becomes_warning() {
        let temp = create_test_tree();
        // Exhaust the retry bound on the root listing.
        let backend = FlakyBackend {
            inner: LocalBackend::new(temp.path()),
            failures_left: AtomicU32::new(3),
        };
        let scanner =
            Scanner::new(Arc::new(backend)).with_retry(3, Duration::from_millis(1));

        let snapshot = scanner.scan().unwrap();
        // Root listing failed for good: no records, but a warning, no abort.
        assert_eq!(snapshot.stats.files, 0);
        assert_eq!(snapshot.warnings.len(), 1);
        assert_eq!(snapshot.warnings[0].kind, WarningKind::ListFailed);
    }

    /// Backend that reports one entry as unreadable.
    struct PartialBackend {
        inner: LocalBackend,
    }

    impl StorageBackend for PartialBackend {
        fn root(&self) -> ListTarget {
            self.inner.root()
        }

        fn list_dir(
            &self,
            target: &ListTarget,
        ) -> Result<Vec<Result<RawEntry, EntryError>>, BackendError> {
            let mut entries = self.inner.list_dir(target)?;
            entries.push(Err(EntryError {
                name: "ghost.txt".to_string(),
                message: "metadata unavailable".to_string(),
            }));
            Ok(entries)
        }

        fn open(
            &self,
            location: &SourceLocation,
        ) -> Result<Box<dyn Read + Send>, BackendError> {
            self.inner.open(location)
        }

        fn relocate(&self, location: &SourceLocation, dest: &Path) -> Result<(), BackendError> {
            self.inner.relocate(location, dest)
        }

        fn remove(&self, location: &SourceLocation) -> Result<(), BackendError> {
            self.inner.remove(location)
        }
    }

    #[test]
    fn test_unreadable_entry_does_not_abort_siblings() {
        let temp = create_test_tree();
        let scanner = Scanner::new(Arc::new(PartialBackend {
            inner: LocalBackend::new(temp.path()),
        }));

        let snapshot = scanner.scan().unwrap();
        assert_eq!(snapshot.stats.files, 3, "siblings must still be scanned");
        assert!(
            snapshot
                .warnings
                .iter()
                .any(|w| w.kind == WarningKind::MetadataFailed)
        );
    }
}
