//! Execution report types.
//!
//! The report is the caller-facing record of everything a run did: files
//! moved, duplicates removed, and every per-file failure that was recovered
//! locally instead of aborting the run.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::category::CategoryPath;
use crate::error::ScanWarning;
use crate::record::SourceLocation;

/// Pipeline stage a failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    Scan,
    Backup,
    Hash,
    Classify,
    Move,
    Delete,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scan => write!(f, "scan"),
            Self::Backup => write!(f, "backup"),
            Self::Hash => write!(f, "hash"),
            Self::Classify => write!(f, "classify"),
            Self::Move => write!(f, "move"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// A failure scoped to a single file, recovered locally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileFailure {
    /// File name.
    pub name: String,
    /// Where the file lives.
    pub location: SourceLocation,
    /// Stage the failure occurred in.
    pub stage: Stage,
    /// Human-readable message.
    pub message: String,
}

impl FileFailure {
    /// Create a new per-file failure record.
    pub fn new(
        name: impl Into<String>,
        location: SourceLocation,
        stage: Stage,
        message: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            location,
            stage,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FileFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.stage, self.name, self.message)
    }
}

/// A successfully relocated survivor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MovedFile {
    /// File name at the source.
    pub name: String,
    /// Original location.
    pub from: SourceLocation,
    /// Final destination path (after any disambiguation).
    pub to: PathBuf,
    /// Category the file was resolved into.
    pub category: CategoryPath,
}

/// Structured record of per-file outcomes for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// Wall-clock duration of the run.
    pub elapsed: Duration,

    /// Files successfully moved into the destination tree.
    pub moved: Vec<MovedFile>,

    /// Duplicate non-survivors removed at the source.
    pub duplicates_removed: u64,

    /// Duplicate non-survivors left in place (removal disabled or failed).
    pub duplicates_skipped: u64,

    /// Per-file failures recovered during the run.
    pub failures: Vec<FileFailure>,

    /// Non-fatal warnings from the scan.
    pub scan_warnings: Vec<ScanWarning>,

    /// Distinct category paths that received at least one file.
    pub categories_used: BTreeSet<String>,

    /// The run was cancelled; the report covers the work done before that.
    pub cancelled: bool,
}

impl ExecutionReport {
    /// Create an empty report stamped with the current time.
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            elapsed: Duration::ZERO,
            moved: Vec::new(),
            duplicates_removed: 0,
            duplicates_skipped: 0,
            failures: Vec::new(),
            scan_warnings: Vec::new(),
            categories_used: BTreeSet::new(),
            cancelled: false,
        }
    }

    /// Number of files moved.
    pub fn moved_count(&self) -> usize {
        self.moved.len()
    }

    /// Check if any per-file failures were recorded.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Record a successful move.
    pub fn record_move(&mut self, moved: MovedFile) {
        self.categories_used.insert(moved.category.to_string());
        self.moved.push(moved);
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "{} moved, {} duplicates removed, {} failed",
            self.moved.len(),
            self.duplicates_removed,
            self.failures.len()
        );
        if self.cancelled {
            out.push_str(" (cancelled)");
        }
        out
    }
}

impl Default for ExecutionReport {
    fn default() -> Self {
        Self::new()
    }
}
