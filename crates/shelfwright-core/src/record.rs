//! File record types.

use std::path::PathBuf;
use std::time::SystemTime;

use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Unique identifier for a record within one scan snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub u64);

impl RecordId {
    /// Create a new RecordId from a u64.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

/// BLAKE3 content hash used as the duplicate-group key in normal mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    /// Create a new ContentHash from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the hash as a hex string.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Where a file lives. This is the record's identity: two records with the
/// same location are the same file, regardless of display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceLocation {
    /// A file on the local filesystem.
    Local { path: PathBuf },
    /// A file in a cloud drive. `remote_id` is the provider's stable
    /// identifier, never the mutable display name.
    Cloud {
        provider: CompactString,
        remote_id: CompactString,
    },
}

impl SourceLocation {
    /// Create a local location.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local { path: path.into() }
    }

    /// Create a cloud location.
    pub fn cloud(provider: impl Into<CompactString>, remote_id: impl Into<CompactString>) -> Self {
        Self::Cloud {
            provider: provider.into(),
            remote_id: remote_id.into(),
        }
    }

    /// Check if this location is on the local filesystem.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local { .. })
    }

    /// The local path, if any.
    pub fn as_local_path(&self) -> Option<&PathBuf> {
        match self {
            Self::Local { path } => Some(path),
            Self::Cloud { .. } => None,
        }
    }

    /// Deterministic string used for lexicographic tie-breaks.
    pub fn sort_key(&self) -> String {
        match self {
            Self::Local { path } => path.to_string_lossy().into_owned(),
            Self::Cloud {
                provider,
                remote_id,
            } => format!("{provider}:{remote_id}"),
        }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local { path } => write!(f, "{}", path.display()),
            Self::Cloud {
                provider,
                remote_id,
            } => write!(f, "{provider}:{remote_id}"),
        }
    }
}

/// The `(name, extension, size)` triple used as the classification cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileSignature {
    /// File name including extension.
    pub name: CompactString,
    /// Lowercased extension without the leading dot; empty if none.
    pub extension: CompactString,
    /// Size in bytes.
    pub size: u64,
}

/// A single file as observed by one scan.
///
/// Created fresh per sort run; `content_hash` is computed on demand during
/// duplicate detection and cached for the lifetime of the run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Unique identifier within the scan snapshot.
    pub id: RecordId,

    /// File name including extension.
    pub name: CompactString,

    /// Lowercased extension without the leading dot; empty if none.
    pub extension: CompactString,

    /// Size in bytes.
    pub size: u64,

    /// Last modification time, used for newest-wins survivor selection.
    pub modified: SystemTime,

    /// Where the file lives. Identity of the record.
    pub location: SourceLocation,

    /// Content hash (computed on demand).
    pub content_hash: Option<ContentHash>,
}

impl FileRecord {
    /// Create a new record; the extension is derived from the name.
    pub fn new(
        id: RecordId,
        name: impl Into<CompactString>,
        size: u64,
        modified: SystemTime,
        location: SourceLocation,
    ) -> Self {
        let name = name.into();
        let extension = extension_of(&name);
        Self {
            id,
            name,
            extension,
            size,
            modified,
            location,
            content_hash: None,
        }
    }

    /// The classification signature of this record.
    pub fn signature(&self) -> FileSignature {
        FileSignature {
            name: self.name.clone(),
            extension: self.extension.clone(),
            size: self.size,
        }
    }

    /// Deterministic tie-break key (delegates to the location).
    pub fn sort_key(&self) -> String {
        self.location.sort_key()
    }
}

/// Extract the lowercased extension from a file name (no leading dot).
fn extension_of(name: &str) -> CompactString {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            CompactString::new(ext.to_ascii_lowercase())
        }
        _ => CompactString::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_hex() {
        let hash = ContentHash::new([0xab; 32]);
        assert_eq!(hash.to_hex().len(), 64);
        assert!(hash.to_hex().starts_with("abab"));
    }

    #[test]
    fn test_extension_derived_lowercase() {
        let rec = FileRecord::new(
            RecordId::new(1),
            "Report.PDF",
            100,
            SystemTime::now(),
            SourceLocation::local("/tmp/Report.PDF"),
        );
        assert_eq!(rec.extension, "pdf");
    }

    #[test]
    fn test_no_extension() {
        let rec = FileRecord::new(
            RecordId::new(1),
            "Makefile",
            10,
            SystemTime::now(),
            SourceLocation::local("/tmp/Makefile"),
        );
        assert!(rec.extension.is_empty());

        // A leading dot is not an extension
        let rec = FileRecord::new(
            RecordId::new(2),
            ".gitignore",
            10,
            SystemTime::now(),
            SourceLocation::local("/tmp/.gitignore"),
        );
        assert!(rec.extension.is_empty());
    }

    #[test]
    fn test_sort_key_orders_lexicographically() {
        let a = SourceLocation::local("/src/a.txt");
        let b = SourceLocation::local("/src/b.txt");
        assert!(a.sort_key() < b.sort_key());

        let c = SourceLocation::cloud("gdrive", "id-001");
        assert_eq!(c.sort_key(), "gdrive:id-001");
    }

    #[test]
    fn test_signature() {
        let rec = FileRecord::new(
            RecordId::new(1),
            "a.txt",
            42,
            SystemTime::now(),
            SourceLocation::local("/tmp/a.txt"),
        );
        let sig = rec.signature();
        assert_eq!(sig.name, "a.txt");
        assert_eq!(sig.extension, "txt");
        assert_eq!(sig.size, 42);
    }
}
