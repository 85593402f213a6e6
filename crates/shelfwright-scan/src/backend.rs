//! The storage backend contract.
//!
//! Local and cloud backends satisfy the same interface: list one directory
//! level, read a file's bytes, relocate a file, delete a file. Listing one
//! level at a time keeps the scanner's retry bound meaningful for both
//! kinds of store.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use compact_str::CompactString;

use shelfwright_core::{BackendError, SourceLocation};

/// A directory (local) or folder (cloud) that can be listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListTarget {
    /// A local directory.
    Local { path: PathBuf },
    /// A cloud folder, addressed by its stable id.
    Cloud { folder_id: CompactString },
}

impl std::fmt::Display for ListTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local { path } => write!(f, "{}", path.display()),
            Self::Cloud { folder_id } => write!(f, "folder:{folder_id}"),
        }
    }
}

/// What a listed entry is.
#[derive(Debug, Clone)]
pub enum RawEntryKind {
    /// A file, addressable for reading/moving/deleting.
    File { location: SourceLocation },
    /// A directory, listable in turn.
    Dir { target: ListTarget },
}

/// One entry from a directory listing.
#[derive(Debug, Clone)]
pub struct RawEntry {
    /// Display name of the entry.
    pub name: CompactString,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time.
    pub modified: SystemTime,
    /// File or directory.
    pub kind: RawEntryKind,
}

/// A single entry that could not be read while its siblings could.
#[derive(Debug, Clone)]
pub struct EntryError {
    /// Name of the entry within the listing.
    pub name: String,
    /// What went wrong.
    pub message: String,
}

/// Uniform contract over local and cloud storage.
///
/// `list_dir` returns one level; per-entry metadata failures are reported
/// inline so one unreadable entry never hides its siblings. All methods are
/// blocking; async callers wrap them in `spawn_blocking`.
pub trait StorageBackend: Send + Sync {
    /// The root of this backend's source tree.
    fn root(&self) -> ListTarget;

    /// List one directory level.
    fn list_dir(&self, target: &ListTarget) -> Result<Vec<Result<RawEntry, EntryError>>, BackendError>;

    /// Open a file's content for reading.
    fn open(&self, location: &SourceLocation) -> Result<Box<dyn Read + Send>, BackendError>;

    /// Move a file to `dest`. Must fail rather than overwrite, and must
    /// never leave a partially written destination observable.
    fn relocate(&self, location: &SourceLocation, dest: &Path) -> Result<(), BackendError>;

    /// Delete a file.
    fn remove(&self, location: &SourceLocation) -> Result<(), BackendError>;
}
