//! Error taxonomy for the sort pipeline.
//!
//! Failures scoped to a single file are values that end up in the execution
//! report; only errors that compromise the safety guarantee (no backup, no
//! authentication) are fatal and abort the run before any mutation.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::SourceLocation;

/// Errors talking to a storage backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Provider rejected our credentials. Fatal for the run.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The requested entry does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// A destination already exists and overwriting is never permitted.
    #[error("Destination already exists: {path}")]
    AlreadyExists { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Provider-specific failure (rate limit, malformed reply, ...).
    #[error("Provider error: {0}")]
    Provider(String),
}

impl BackendError {
    /// Create an I/O error with path context, classifying common kinds.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound(path.display().to_string()),
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists { path },
            _ => Self::Io { path, source },
        }
    }

    /// Check if this error means the backend rejected our credentials.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// Per-entry scan failure. Non-fatal: the failing entry is skipped and the
/// scan continues with its siblings.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Listing a directory failed after all retries.
    #[error("Failed to list {target}: {source}")]
    ListFailed {
        target: String,
        #[source]
        source: BackendError,
    },

    /// Reading an entry's metadata failed.
    #[error("Failed to read metadata for {target}: {message}")]
    Metadata { target: String, message: String },
}

/// Failure to hash a record's content. Demotes the record to a singleton.
#[derive(Debug, Error)]
#[error("Failed to hash {location}: {message}")]
pub struct HashError {
    pub location: SourceLocation,
    pub message: String,
}

/// Failure of the classification oracle for one request. The affected file
/// falls back to the default category.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The request did not complete in time.
    #[error("Oracle request timed out")]
    Timeout,

    /// Transport-level failure.
    #[error("Oracle request failed: {0}")]
    Http(String),

    /// The oracle answered, but not in a shape we accept.
    #[error("Malformed oracle response: {0}")]
    Malformed(String),
}

/// Failure to snapshot the source before mutation. Always fatal.
#[derive(Debug, Error)]
pub enum BackupError {
    /// I/O failure writing the archive.
    #[error("Backup I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Archiving a source entry failed.
    #[error("Failed to archive {entry}: {message}")]
    Entry { entry: String, message: String },

    /// The archive container itself failed.
    #[error("Archive error: {0}")]
    Archive(String),
}

/// The disambiguation suffix space was exhausted for one destination.
#[derive(Debug, Error)]
#[error("No free destination name for {destination} after {attempts} attempts")]
pub struct CollisionError {
    pub destination: PathBuf,
    pub attempts: u32,
}

/// Errors that stop a run before any destructive action.
#[derive(Debug, Error)]
pub enum FatalError {
    /// The pre-mutation snapshot could not be created.
    #[error("Backup failed: {0}")]
    Backup(#[from] BackupError),

    /// The backend rejected our credentials.
    #[error("Backend authentication failed: {0}")]
    Auth(String),

    /// The run configuration is unusable.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// A directory listing failed after all retries.
    ListFailed,
    /// An entry's metadata could not be read.
    MetadataFailed,
    /// An entry was skipped as unreadable.
    Unreadable,
}

/// Non-fatal warning recorded during a scan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// The entry or listing the warning refers to.
    pub target: String,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(target: impl Into<String>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            target: target.into(),
            message: message.into(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_io_classifier() {
        let err = BackendError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(matches!(err, BackendError::PermissionDenied { .. }));

        let err = BackendError::io(
            "/test/path",
            std::io::Error::new(std::io::ErrorKind::AlreadyExists, "exists"),
        );
        assert!(matches!(err, BackendError::AlreadyExists { .. }));
    }

    #[test]
    fn test_auth_is_fatal_marker() {
        assert!(BackendError::Auth("expired token".into()).is_auth());
        assert!(!BackendError::NotFound("x".into()).is_auth());
    }
}
