//! Core types and traits for shelfwright.
//!
//! This crate provides the fundamental data structures shared by the
//! shelfwright pipeline: file records, category trees, run configuration,
//! the error taxonomy and the execution report.

mod category;
mod config;
mod error;
mod record;
mod report;

pub use category::{CategoryNode, CategoryPath, CategoryTree, DEFAULT_MAX_DEPTH, UNCATEGORIZED, sanitize_name};
pub use config::{
    CategoryMode, DedupeMode, OracleConfig, RunConfig, RunConfigBuilder, DEFAULT_CLOUD_WORKERS,
};
pub use error::{
    BackendError, BackupError, CollisionError, FatalError, HashError, OracleError, ScanError,
    ScanWarning, WarningKind,
};
pub use record::{ContentHash, FileRecord, FileSignature, RecordId, SourceLocation};
pub use report::{ExecutionReport, FileFailure, MovedFile, Stage};
