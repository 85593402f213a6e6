//! Duplicate group detection and survivor selection.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::io::Read;

use compact_str::CompactString;
use derive_builder::Builder;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use shelfwright_core::{
    ContentHash, DedupeMode, FileFailure, FileRecord, HashError, SourceLocation, Stage,
};
use shelfwright_scan::StorageBackend;

/// Configuration for duplicate detection.
#[derive(Debug, Clone, Builder)]
#[builder(setter(into))]
pub struct DedupeConfig {
    /// Detection policy.
    #[builder(default)]
    pub mode: DedupeMode,

    /// Worker threads for hashing (0 = rayon default). For cloud sources
    /// this should be the conservative API bound, not the CPU count.
    #[builder(default = "0")]
    pub workers: usize,

    /// Bytes hashed for the prefilter pass.
    #[builder(default = "8192")]
    pub partial_bytes: usize,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            mode: DedupeMode::Normal,
            workers: 0,
            partial_bytes: 8192,
        }
    }
}

impl DedupeConfig {
    /// Create a new config builder.
    pub fn builder() -> DedupeConfigBuilder {
        DedupeConfigBuilder::default()
    }
}

/// What binds the members of a duplicate group together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupKey {
    /// Byte-identical content.
    Content(ContentHash),
    /// Shared `(lowercased name, size)`; hardcore mode, content may differ.
    NameSize(CompactString, u64),
}

/// A group of records considered duplicates of each other.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// The key all members share.
    pub key: GroupKey,
    /// All member records.
    pub members: Vec<FileRecord>,
    /// Index of the survivor within `members`.
    pub survivor: usize,
}

impl DuplicateGroup {
    fn new(key: GroupKey, members: Vec<FileRecord>) -> Self {
        let survivor = select_survivor(&members);
        Self {
            key,
            members,
            survivor,
        }
    }

    /// The record retained from this group.
    pub fn survivor(&self) -> &FileRecord {
        &self.members[self.survivor]
    }

    /// The records that did not survive.
    pub fn duplicates(&self) -> impl Iterator<Item = &FileRecord> {
        self.members
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != self.survivor)
            .map(|(_, r)| r)
    }

    /// Number of members.
    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// Bytes that removing the non-survivors would reclaim.
    pub fn wasted_bytes(&self) -> u64 {
        self.duplicates().map(|r| r.size).sum()
    }
}

/// Results of one detection pass.
#[derive(Debug, Default)]
pub struct DedupeOutcome {
    /// Groups with two or more members, sorted by wasted bytes descending.
    pub groups: Vec<DuplicateGroup>,
    /// Every record that survives: group survivors plus all singletons.
    pub survivors: Vec<FileRecord>,
    /// Records whose content could not be hashed (demoted to singletons).
    pub failures: Vec<FileFailure>,
}

impl DedupeOutcome {
    /// All non-survivor records, cloneable for the removal step.
    pub fn duplicates_to_remove(&self) -> Vec<FileRecord> {
        self.groups
            .iter()
            .flat_map(|g| g.duplicates().cloned())
            .collect()
    }

    /// Number of records that will be removed as duplicates.
    pub fn duplicate_count(&self) -> usize {
        self.groups.iter().map(|g| g.count() - 1).sum()
    }
}

/// Duplicate detector over a storage backend.
pub struct DuplicateDetector {
    config: DedupeConfig,
}

impl DuplicateDetector {
    /// Create a detector with default config.
    pub fn new() -> Self {
        Self {
            config: DedupeConfig::default(),
        }
    }

    /// Create a detector with custom config.
    pub fn with_config(config: DedupeConfig) -> Self {
        Self { config }
    }

    /// Partition records into duplicate groups and the surviving set.
    ///
    /// A single pass over size buckets: only buckets with two or more
    /// records are ever hashed. Records that cannot be hashed become their
    /// own singletons with a recorded failure.
    pub fn detect(
        &self,
        records: Vec<FileRecord>,
        backend: &dyn StorageBackend,
    ) -> DedupeOutcome {
        let mut outcome = DedupeOutcome::default();

        match self.config.mode {
            DedupeMode::None => {
                outcome.survivors = records;
                return outcome;
            }
            DedupeMode::Hardcore => self.detect_by_name_size(records, &mut outcome),
            DedupeMode::Normal => self.detect_by_content(records, backend, &mut outcome),
        }

        outcome
            .groups
            .sort_by(|a, b| b.wasted_bytes().cmp(&a.wasted_bytes()));
        debug!(
            groups = outcome.groups.len(),
            survivors = outcome.survivors.len(),
            failures = outcome.failures.len(),
            "duplicate detection complete"
        );
        outcome
    }

    /// Hardcore mode: `(lowercased name, size)` keys, no content reads.
    fn detect_by_name_size(&self, records: Vec<FileRecord>, outcome: &mut DedupeOutcome) {
        let mut buckets: HashMap<(CompactString, u64), Vec<FileRecord>> = HashMap::new();
        for record in records {
            let key = (
                CompactString::new(record.name.to_lowercase()),
                record.size,
            );
            buckets.entry(key).or_default().push(record);
        }

        for ((name, size), members) in buckets {
            if members.len() >= 2 {
                let group = DuplicateGroup::new(GroupKey::NameSize(name, size), members);
                outcome.survivors.push(group.survivor().clone());
                outcome.groups.push(group);
            } else {
                outcome.survivors.extend(members);
            }
        }
    }

    /// Normal mode: size buckets, then prefilter hash, then full hash.
    fn detect_by_content(
        &self,
        records: Vec<FileRecord>,
        backend: &dyn StorageBackend,
        outcome: &mut DedupeOutcome,
    ) {
        // Phase 1: group by size; unique sizes survive unhashed.
        let mut size_buckets: HashMap<u64, Vec<FileRecord>> = HashMap::new();
        for record in records {
            size_buckets.entry(record.size).or_default().push(record);
        }

        let mut candidates: Vec<Vec<FileRecord>> = Vec::new();
        for (_, bucket) in size_buckets {
            if bucket.len() >= 2 {
                candidates.push(bucket);
            } else {
                outcome.survivors.extend(bucket);
            }
        }

        if candidates.is_empty() {
            return;
        }

        // Phases 2+3 run in a bounded pool so cloud sources are not hit
        // with CPU-count concurrent downloads.
        let results: Vec<BucketResult> = match self.pool() {
            Some(pool) => pool.install(|| self.hash_buckets(candidates, backend)),
            None => self.hash_buckets(candidates, backend),
        };

        for result in results {
            outcome.survivors.extend(result.singles);
            for (hash, members) in result.hashed {
                if members.len() >= 2 {
                    let group = DuplicateGroup::new(GroupKey::Content(hash), members);
                    outcome.survivors.push(group.survivor().clone());
                    outcome.groups.push(group);
                } else {
                    outcome.survivors.extend(members);
                }
            }
            for (record, error) in result.failed {
                warn!(%error, "hash failed, keeping as singleton");
                outcome.failures.push(FileFailure::new(
                    record.name.to_string(),
                    record.location.clone(),
                    Stage::Hash,
                    error.message,
                ));
                outcome.survivors.push(record);
            }
        }
    }

    fn pool(&self) -> Option<rayon::ThreadPool> {
        if self.config.workers == 0 {
            return None;
        }
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .build()
            .ok()
    }

    fn hash_buckets(
        &self,
        candidates: Vec<Vec<FileRecord>>,
        backend: &dyn StorageBackend,
    ) -> Vec<BucketResult> {
        candidates
            .into_par_iter()
            .map(|bucket| self.hash_bucket(bucket, backend))
            .collect()
    }

    /// Resolve one size bucket into content-hash groups.
    fn hash_bucket(&self, bucket: Vec<FileRecord>, backend: &dyn StorageBackend) -> BucketResult {
        let mut result = BucketResult::default();

        // Phase 2: prefilter on the leading bytes.
        let prefiltered: Vec<(FileRecord, Result<[u8; 32], HashError>)> = bucket
            .into_par_iter()
            .map(|record| {
                let prefix = self.partial_hash(backend, &record.location);
                (record, prefix)
            })
            .collect();

        let mut prefix_groups: HashMap<[u8; 32], Vec<FileRecord>> = HashMap::new();
        for (record, prefix) in prefiltered {
            match prefix {
                Ok(hash) => prefix_groups.entry(hash).or_default().push(record),
                Err(error) => result.failed.push((record, error)),
            }
        }

        // Phase 3: full hash only where the prefilter still collides. A
        // unique prefix means unique content within this size bucket.
        for (_, group) in prefix_groups {
            if group.len() < 2 {
                result.singles.extend(group);
                continue;
            }

            let full: Vec<(FileRecord, Result<ContentHash, HashError>)> = group
                .into_par_iter()
                .map(|mut record| {
                    let hash = match record.content_hash {
                        // Cached from an earlier pass in this run.
                        Some(hash) => Ok(hash),
                        None => {
                            let computed = self.full_hash(backend, &record.location);
                            if let Ok(hash) = &computed {
                                record.content_hash = Some(*hash);
                            }
                            computed
                        }
                    };
                    (record, hash)
                })
                .collect();

            let mut content_groups: HashMap<ContentHash, Vec<FileRecord>> = HashMap::new();
            for (record, hash) in full {
                match hash {
                    Ok(hash) => content_groups.entry(hash).or_default().push(record),
                    Err(error) => result.failed.push((record, error)),
                }
            }
            result.hashed.extend(content_groups);
        }

        result
    }

    /// Hash the first `partial_bytes` of a record's content.
    fn partial_hash(
        &self,
        backend: &dyn StorageBackend,
        location: &SourceLocation,
    ) -> Result<[u8; 32], HashError> {
        let mut reader = backend.open(location).map_err(|e| hash_err(location, e))?;
        let mut hasher = blake3::Hasher::new();
        let mut buf = vec![0u8; self.config.partial_bytes.max(512)];
        let mut filled = 0;
        while filled < buf.len() {
            let n = reader
                .read(&mut buf[filled..])
                .map_err(|e| hash_err(location, e))?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        hasher.update(&buf[..filled]);
        Ok(*hasher.finalize().as_bytes())
    }

    /// Full streaming BLAKE3 hash of a record's content.
    fn full_hash(
        &self,
        backend: &dyn StorageBackend,
        location: &SourceLocation,
    ) -> Result<ContentHash, HashError> {
        let mut reader = backend.open(location).map_err(|e| hash_err(location, e))?;
        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            let n = reader
                .read(&mut buffer)
                .map_err(|e| hash_err(location, e))?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
        }
        Ok(ContentHash::new(*hasher.finalize().as_bytes()))
    }
}

fn hash_err(location: &SourceLocation, error: impl std::fmt::Display) -> HashError {
    HashError {
        location: location.clone(),
        message: error.to_string(),
    }
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-bucket hashing results.
#[derive(Default)]
struct BucketResult {
    hashed: Vec<(ContentHash, Vec<FileRecord>)>,
    singles: Vec<FileRecord>,
    failed: Vec<(FileRecord, HashError)>,
}

/// Pick the survivor: maximum `modified`; exact ties go to the record whose
/// location sorts first lexicographically.
fn select_survivor(members: &[FileRecord]) -> usize {
    let mut best = 0;
    for i in 1..members.len() {
        let candidate = &members[i];
        let current = &members[best];
        let wins = match candidate.modified.cmp(&current.modified) {
            Ordering::Greater => true,
            Ordering::Equal => candidate.sort_key() < current.sort_key(),
            Ordering::Less => false,
        };
        if wins {
            best = i;
        }
    }
    best
}
