//! Duplicate detection for shelfwright.
//!
//! Partitions a scan snapshot into duplicate groups under a selectable
//! policy and picks one survivor per group:
//!
//! 1. Group records by size (instant, O(n))
//! 2. Compute a partial prefilter hash for size-matched records
//! 3. Compute the full BLAKE3 hash for prefilter matches
//!
//! Only records with at least one size collision are ever hashed. Hardcore
//! mode skips hashing entirely and keys on `(name, size)`.

mod dedupe;

pub use dedupe::{
    DedupeConfig, DedupeConfigBuilder, DedupeOutcome, DuplicateDetector, DuplicateGroup, GroupKey,
};

// Re-export core types
pub use shelfwright_core::{ContentHash, DedupeMode, FileRecord};
