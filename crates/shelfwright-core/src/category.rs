//! Category tree types.
//!
//! A category tree is a bounded-depth hierarchy of named nodes rooted at a
//! synthetic depth-0 root. It is either supplied whole by the caller (manual
//! mode) or grown from oracle output (automatic mode), and is immutable once
//! a sort run begins.

use std::path::{Path, PathBuf};

use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Default maximum category depth below the root.
pub const DEFAULT_MAX_DEPTH: u32 = 3;

/// Fallback category for files the resolver cannot place.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Sanitize a raw category name: trim whitespace, replace path separators.
/// Returns None for names that are empty after sanitization.
pub fn sanitize_name(raw: &str) -> Option<CompactString> {
    let cleaned = raw.trim().replace(['/', '\\'], "-");
    if cleaned.is_empty() {
        None
    } else {
        Some(CompactString::new(cleaned))
    }
}

/// Ordered sequence of category names from root to leaf.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryPath(pub Vec<CompactString>);

impl CategoryPath {
    /// Create a path from name components, sanitizing each and dropping
    /// empties.
    pub fn new(components: impl IntoIterator<Item = impl AsRef<str>>) -> Self {
        Self(
            components
                .into_iter()
                .filter_map(|c| sanitize_name(c.as_ref()))
                .collect(),
        )
    }

    /// Parse a slash-separated path like `"Documents/Reports"`.
    pub fn from_slash(path: &str) -> Self {
        Self::new(path.split('/'))
    }

    /// The fallback path.
    pub fn uncategorized() -> Self {
        Self(vec![CompactString::new(UNCATEGORIZED)])
    }

    /// Number of components.
    pub fn depth(&self) -> u32 {
        self.0.len() as u32
    }

    /// Check if the path has no components.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A copy clamped to at most `max_depth` components.
    pub fn truncated(&self, max_depth: u32) -> Self {
        Self(self.0.iter().take(max_depth as usize).cloned().collect())
    }

    /// Join the path components under a destination root directory.
    pub fn join(&self, root: &Path) -> PathBuf {
        let mut out = root.to_path_buf();
        for component in &self.0 {
            out.push(component.as_str());
        }
        out
    }
}

impl std::fmt::Display for CategoryPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for component in &self.0 {
            if !first {
                write!(f, "/")?;
            }
            write!(f, "{component}")?;
            first = false;
        }
        Ok(())
    }
}

/// A single node in the category tree.
///
/// Children are keyed by lowercased name, so no two siblings share a name
/// case-insensitively; insertion order is preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryNode {
    /// Display name (empty for the synthetic root).
    pub name: CompactString,
    /// Depth below the root (root is 0).
    pub depth: u32,
    /// Child nodes, keyed by lowercased name.
    pub children: IndexMap<CompactString, CategoryNode>,
}

impl CategoryNode {
    fn new(name: CompactString, depth: u32) -> Self {
        Self {
            name,
            depth,
            children: IndexMap::new(),
        }
    }

    /// Get or insert a child with the given (already sanitized) name.
    fn child_mut(&mut self, name: &CompactString) -> &mut CategoryNode {
        let key = CompactString::new(name.to_lowercase());
        let depth = self.depth + 1;
        self.children
            .entry(key)
            .or_insert_with(|| CategoryNode::new(name.clone(), depth))
    }

    fn child(&self, name: &str) -> Option<&CategoryNode> {
        self.children.get(name.to_lowercase().as_str())
    }

    /// Check if this node has no children.
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A bounded-depth category tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryTree {
    root: CategoryNode,
    max_depth: u32,
}

impl CategoryTree {
    /// Create an empty tree with the given depth bound.
    pub fn new(max_depth: u32) -> Self {
        Self {
            root: CategoryNode::new(CompactString::default(), 0),
            max_depth: max_depth.max(1),
        }
    }

    /// Build a tree from an iterator of paths.
    pub fn from_paths(
        paths: impl IntoIterator<Item = CategoryPath>,
        max_depth: u32,
    ) -> Self {
        let mut tree = Self::new(max_depth);
        for path in paths {
            tree.insert_path(&path);
        }
        tree
    }

    /// The depth bound.
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// The synthetic root node.
    pub fn root(&self) -> &CategoryNode {
        &self.root
    }

    /// Check if the tree has no categories at all.
    pub fn is_empty(&self) -> bool {
        self.root.children.is_empty()
    }

    /// Insert a path, creating intermediate nodes as needed. Components
    /// beyond `max_depth` are dropped; names are sanitized. Inserting a
    /// sibling that differs only in case reuses the existing node.
    pub fn insert_path(&mut self, path: &CategoryPath) {
        let clamped = path.truncated(self.max_depth);
        let mut node = &mut self.root;
        for component in &clamped.0 {
            let Some(name) = sanitize_name(component) else {
                continue;
            };
            node = node.child_mut(&name);
        }
    }

    /// Check whether every component of `path` exists in the tree
    /// (case-insensitive). An empty path is not contained.
    pub fn contains_path(&self, path: &CategoryPath) -> bool {
        if path.is_empty() {
            return false;
        }
        let mut node = &self.root;
        for component in &path.0 {
            match node.child(component) {
                Some(child) => node = child,
                None => return false,
            }
        }
        true
    }

    /// All root-to-leaf paths, in insertion order.
    pub fn leaf_paths(&self) -> Vec<CategoryPath> {
        let mut out = Vec::new();
        let mut stack = Vec::new();
        collect_leaves(&self.root, &mut stack, &mut out);
        out
    }
}

fn collect_leaves(
    node: &CategoryNode,
    stack: &mut Vec<CompactString>,
    out: &mut Vec<CategoryPath>,
) {
    if node.is_leaf() && !stack.is_empty() {
        out.push(CategoryPath(stack.clone()));
        return;
    }
    for child in node.children.values() {
        stack.push(child.name.clone());
        collect_leaves(child, stack, out);
        stack.pop();
    }
}

impl Default for CategoryTree {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DEPTH)
    }
}
