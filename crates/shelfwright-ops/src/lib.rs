//! Backup archiving and sort-plan execution for shelfwright.
//!
//! This crate owns every mutating step of a run: the pre-mutation snapshot
//! of the source, the computation of a collision-free sort plan, and the
//! execution of that plan with per-file failure isolation, bounded
//! concurrency and cooperative cancellation.

mod backup;
mod executor;
mod plan;
mod progress;

pub use backup::{ArchiveHandle, ArchiveKind, Manifest, ManifestEntry, snapshot};
pub use executor::{ExecOptions, ExecOutcome, ExecResult, start_execute};
pub use plan::{MAX_SUFFIX_ATTEMPTS, PlannedMove, SortPlan, build_plan};
pub use progress::{OpKind, OperationProgress};

/// Default channel buffer size for operation progress updates.
pub const OPERATION_CHANNEL_SIZE: usize = 100;
