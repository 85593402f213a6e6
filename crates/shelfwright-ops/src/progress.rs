//! Progress reporting types for plan execution.

use serde::{Deserialize, Serialize};

/// The kind of operation being performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    /// Relocating a survivor into the destination tree.
    Move,
    /// Removing a duplicate non-survivor at the source.
    Delete,
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Move => write!(f, "Move"),
            Self::Delete => write!(f, "Delete"),
        }
    }
}

/// Progress information for an ongoing operation batch.
#[derive(Debug, Clone)]
pub struct OperationProgress {
    /// The kind of operation.
    pub kind: OpKind,
    /// Number of files completed (succeeded or failed).
    pub files_completed: usize,
    /// Total number of files in this batch.
    pub files_total: usize,
    /// The file most recently processed.
    pub current_file: Option<String>,
    /// Failures so far in this batch.
    pub failures: usize,
}

impl OperationProgress {
    /// Create a new progress tracker.
    pub fn new(kind: OpKind, files_total: usize) -> Self {
        Self {
            kind,
            files_completed: 0,
            files_total,
            current_file: None,
            failures: 0,
        }
    }

    /// Get the progress as a percentage (0.0 to 100.0).
    pub fn percentage(&self) -> f64 {
        if self.files_total > 0 {
            (self.files_completed as f64 / self.files_total as f64) * 100.0
        } else {
            100.0
        }
    }

    /// Record one completed file.
    pub fn complete_file(&mut self, name: impl Into<String>, failed: bool) {
        self.files_completed += 1;
        self.current_file = Some(name.into());
        if failed {
            self.failures += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage() {
        let mut progress = OperationProgress::new(OpKind::Move, 4);
        assert_eq!(progress.percentage(), 0.0);
        progress.complete_file("a.txt", false);
        assert_eq!(progress.percentage(), 25.0);
    }

    #[test]
    fn test_empty_batch_is_complete() {
        let progress = OperationProgress::new(OpKind::Delete, 0);
        assert_eq!(progress.percentage(), 100.0);
    }
}
