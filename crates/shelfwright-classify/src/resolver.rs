//! Category resolver.
//!
//! Determines a destination category path for each surviving file, either
//! by deterministic extension matching against a caller-supplied tree
//! (manual) or by consulting the classification oracle (automatic). Oracle
//! failures fall back to `Uncategorized` and are reported, never thrown.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use shelfwright_core::{
    CategoryPath, CategoryTree, FileSignature, OracleError, UNCATEGORIZED,
};

use crate::oracle::Oracle;

/// Largest sample handed to the oracle for tree generation.
const GENERATION_SAMPLE_LIMIT: usize = 100;

/// The outcome of resolving one file.
#[derive(Debug)]
pub struct Resolution {
    /// The category the file will be filed under.
    pub path: CategoryPath,
    /// The oracle failure that forced a fallback, if any.
    pub fallback: Option<OracleError>,
}

impl Resolution {
    fn resolved(path: CategoryPath) -> Self {
        Self {
            path,
            fallback: None,
        }
    }

    fn fell_back(error: OracleError) -> Self {
        Self {
            path: CategoryPath::uncategorized(),
            fallback: Some(error),
        }
    }
}

enum Strategy<O> {
    Manual,
    Automatic { oracle: O },
}

/// Per-run category resolver. The tree is fixed once `prepare` has run.
pub struct Resolver<O> {
    strategy: Strategy<O>,
    tree: CategoryTree,
    leaves: Vec<CategoryPath>,
    max_depth: u32,
    cache: DashMap<FileSignature, CategoryPath>,
    limiter: Arc<Semaphore>,
}

impl<O: Oracle> Resolver<O> {
    /// Manual strategy over a caller-supplied tree. The tree is used
    /// read-only; a private copy gains the `Uncategorized` fallback leaf.
    pub fn manual(tree: &CategoryTree) -> Self {
        let mut tree = tree.clone();
        tree.insert_path(&CategoryPath::uncategorized());
        let leaves = tree.leaf_paths();
        let max_depth = tree.max_depth();
        Self {
            strategy: Strategy::Manual,
            tree,
            leaves,
            max_depth,
            cache: DashMap::new(),
            limiter: Arc::new(Semaphore::new(1)),
        }
    }

    /// Automatic strategy: the oracle proposes the tree and classifies each
    /// file, with at most `workers` concurrent calls.
    pub fn automatic(oracle: O, max_depth: u32, workers: usize) -> Self {
        Self {
            strategy: Strategy::Automatic { oracle },
            tree: CategoryTree::new(max_depth),
            leaves: Vec::new(),
            max_depth: max_depth.max(1),
            cache: DashMap::new(),
            limiter: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// The category tree resolution happens against.
    pub fn tree(&self) -> &CategoryTree {
        &self.tree
    }

    /// Pre-populate the tree. In automatic mode this is the single
    /// tree-generation oracle call over a bounded sample; any failure falls
    /// back to an `Uncategorized`-only tree and is returned for the record,
    /// not thrown.
    pub async fn prepare(&mut self, sample: &[FileSignature]) -> Result<(), OracleError> {
        let Strategy::Automatic { oracle } = &self.strategy else {
            return Ok(());
        };

        let sample = &sample[..sample.len().min(GENERATION_SAMPLE_LIMIT)];
        let generated = oracle.generate_tree(sample, self.max_depth).await;

        let result = match generated {
            Ok(tree) if !tree.is_empty() => {
                self.tree = tree;
                Ok(())
            }
            Ok(_) => Err(OracleError::Malformed("oracle proposed no categories".into())),
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            warn!(error = %e, "category generation failed, falling back to {UNCATEGORIZED}");
            self.tree = CategoryTree::new(self.max_depth);
        }
        self.tree.insert_path(&CategoryPath::uncategorized());
        self.leaves = self.tree.leaf_paths();
        result
    }

    /// Resolve one file signature to a category path.
    ///
    /// Oracle responses are cached per distinct signature for the run, so
    /// files with identical `(name, extension, size)` cost one call.
    pub async fn resolve(&self, sig: &FileSignature) -> Resolution {
        match &self.strategy {
            Strategy::Manual => Resolution::resolved(self.match_by_extension(sig)),
            Strategy::Automatic { oracle } => {
                if let Some(cached) = self.cache.get(sig) {
                    debug!(file = %sig.name, "classification cache hit");
                    return Resolution::resolved(cached.clone());
                }

                let _permit = self.limiter.acquire().await.ok();
                // Another task may have resolved the same signature while
                // we waited for a permit.
                if let Some(cached) = self.cache.get(sig) {
                    return Resolution::resolved(cached.clone());
                }

                match oracle.classify(sig, &self.leaves, self.max_depth).await {
                    Ok(path) => {
                        let path = path.truncated(self.max_depth);
                        if self.tree.contains_path(&path) {
                            self.cache.insert(sig.clone(), path.clone());
                            Resolution::resolved(path)
                        } else {
                            warn!(file = %sig.name, %path, "oracle returned unknown category");
                            Resolution::fell_back(OracleError::Malformed(format!(
                                "category {path} is not in the tree"
                            )))
                        }
                    }
                    Err(e) => {
                        warn!(file = %sig.name, error = %e, "classification failed");
                        Resolution::fell_back(e)
                    }
                }
            }
        }
    }

    /// Deterministic extension-class matching against the tree's leaves:
    /// the first leaf whose path mentions the extension's class wins.
    fn match_by_extension(&self, sig: &FileSignature) -> CategoryPath {
        let aliases = extension_aliases(&sig.extension);
        for leaf in &self.leaves {
            for component in &leaf.0 {
                let lower = component.to_lowercase();
                if aliases.contains(&lower.as_str()) {
                    return leaf.clone();
                }
            }
        }
        CategoryPath::uncategorized()
    }
}

/// Category-name aliases a given extension may match, lowercased.
fn extension_aliases(extension: &str) -> &'static [&'static str] {
    match extension {
        "pdf" | "doc" | "docx" | "odt" | "rtf" | "txt" | "md" | "xls" | "xlsx" | "csv"
        | "ppt" | "pptx" => &["documents", "document", "docs", "text", "office"],
        "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" | "svg" | "heic" | "tiff" => {
            &["images", "image", "photos", "photo", "pictures", "pics"]
        }
        "mp4" | "mov" | "avi" | "mkv" | "webm" | "m4v" => {
            &["video", "videos", "movies", "films"]
        }
        "mp3" | "wav" | "flac" | "ogg" | "m4a" | "aac" => &["audio", "music", "sound"],
        "zip" | "rar" | "7z" | "tar" | "gz" | "bz2" | "xz" => {
            &["archives", "archive", "compressed"]
        }
        "rs" | "py" | "js" | "ts" | "c" | "cpp" | "h" | "java" | "go" | "rb" | "sh" => {
            &["code", "source", "scripts", "dev"]
        }
        _ => &[],
    }
}
