//! Run configuration types.
//!
//! There is no process-wide state: everything a run needs travels in a
//! `RunConfig`, validated once at build time.

use std::path::PathBuf;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::category::CategoryTree;
use crate::record::SourceLocation;

/// Conservative worker bound for cloud/API calls, to respect rate limits.
pub const DEFAULT_CLOUD_WORKERS: usize = 4;

/// How duplicates are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DedupeMode {
    /// Skip duplicate detection entirely.
    None,
    /// Key on full content hash; byte equality required.
    #[default]
    Normal,
    /// Key on `(normalized name, size)` without reading content. Trades
    /// precision for speed: genuinely different files that coincidentally
    /// share name and size will be merged.
    Hardcore,
}

impl std::fmt::Display for DedupeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Normal => write!(f, "normal"),
            Self::Hardcore => write!(f, "hardcore"),
        }
    }
}

/// How destination categories are determined.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryMode {
    /// The caller supplies a pre-built tree; resolution is a pure lookup.
    Manual { tree: CategoryTree },
    /// Categories come from the classification oracle, up to `max_depth`.
    Automatic { max_depth: u32 },
}

impl CategoryMode {
    /// The effective depth bound for this mode.
    pub fn max_depth(&self) -> u32 {
        match self {
            Self::Manual { tree } => tree.max_depth(),
            Self::Automatic { max_depth } => (*max_depth).max(1),
        }
    }
}

/// Connection settings for the classification oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// Base URL of the oracle server.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model name passed through to the oracle.
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-file classification timeout.
    #[serde(default = "default_classify_timeout")]
    pub classify_timeout: Duration,

    /// Timeout for whole-tree generation (slower than classification).
    #[serde(default = "default_generate_timeout")]
    pub generate_timeout: Duration,
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3".to_string()
}

fn default_classify_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_generate_timeout() -> Duration {
    Duration::from_secs(120)
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            classify_timeout: default_classify_timeout(),
            generate_timeout: default_generate_timeout(),
        }
    }
}

/// Configuration for one sort run.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct RunConfig {
    /// Where files are read from.
    pub source: SourceLocation,

    /// Root of the destination category tree.
    pub dest_root: PathBuf,

    /// How categories are determined.
    pub category_mode: CategoryMode,

    /// How duplicates are detected.
    #[builder(default)]
    #[serde(default)]
    pub dedupe_mode: DedupeMode,

    /// Snapshot the source before mutating anything.
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub backup: bool,

    /// Where backup artifacts are written (None = next to the destination).
    #[builder(default)]
    #[serde(default)]
    pub backup_dir: Option<PathBuf>,

    /// Delete duplicate non-survivors at the source (true) or leave them
    /// unmoved (false).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub remove_duplicates: bool,

    /// Worker pool size for local hashing and moves (0 = CPU count).
    #[builder(default = "0")]
    #[serde(default)]
    pub local_workers: usize,

    /// Worker bound for cloud/API calls.
    #[builder(default = "DEFAULT_CLOUD_WORKERS")]
    #[serde(default = "default_cloud_workers")]
    pub cloud_workers: usize,

    /// Classification oracle settings.
    #[builder(default)]
    #[serde(default)]
    pub oracle: OracleConfig,
}

fn default_true() -> bool {
    true
}

fn default_cloud_workers() -> usize {
    DEFAULT_CLOUD_WORKERS
}

impl RunConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        let Some(dest) = &self.dest_root else {
            return Err("Destination root is required".to_string());
        };
        if dest.as_os_str().is_empty() {
            return Err("Destination root cannot be empty".to_string());
        }
        if let Some(SourceLocation::Local { path }) = &self.source {
            if path == dest {
                return Err("Source and destination cannot be the same directory".to_string());
            }
            if dest.starts_with(path) {
                return Err("Destination cannot be inside the source directory".to_string());
            }
        }
        if let Some(CategoryMode::Manual { tree }) = &self.category_mode {
            if tree.is_empty() {
                return Err("Manual mode requires at least one category".to_string());
            }
        }
        Ok(())
    }
}

impl RunConfig {
    /// Create a new config builder.
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    /// The effective category depth bound.
    pub fn max_depth(&self) -> u32 {
        self.category_mode.max_depth()
    }

    /// Effective local worker count.
    pub fn effective_local_workers(&self) -> usize {
        if self.local_workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            self.local_workers
        }
    }

    /// Worker bound for the source backend (conservative for cloud).
    pub fn backend_workers(&self) -> usize {
        if self.source.is_local() {
            self.effective_local_workers()
        } else {
            self.cloud_workers.max(1)
        }
    }
}
