//! Sort plan computation.
//!
//! Maps each survivor to a concrete destination path under the category
//! tree, resolving name collisions with a numeric suffix. Overwriting an
//! existing destination is never an option.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use shelfwright_core::{CategoryPath, CollisionError, FileFailure, FileRecord, Stage};

/// Upper bound on the disambiguation counter.
pub const MAX_SUFFIX_ATTEMPTS: u32 = 1000;

/// One survivor and where it is going.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedMove {
    /// The survivor to relocate.
    pub record: FileRecord,
    /// The category it resolved to.
    pub category: CategoryPath,
    /// Concrete destination path, unique within the plan.
    pub destination: PathBuf,
}

/// A collision-free mapping from survivors to destination paths.
#[derive(Debug, Default)]
pub struct SortPlan {
    /// Moves to execute. Every planned destination is distinct.
    pub moves: Vec<PlannedMove>,
    /// Files that could not be planned (suffix space exhausted).
    pub failures: Vec<FileFailure>,
}

impl SortPlan {
    /// Number of planned moves.
    pub fn len(&self) -> usize {
        self.moves.len()
    }

    /// Check if the plan has no moves.
    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }
}

/// Compute the sort plan for a set of categorized survivors.
///
/// `occupied` reports whether a destination path already exists outside the
/// plan (for a local destination, a filesystem existence probe). Collisions
/// against existing paths and against earlier planned moves both get a
/// `name_1.ext`-style suffix.
pub fn build_plan(
    assignments: Vec<(FileRecord, CategoryPath)>,
    dest_root: &Path,
    occupied: impl Fn(&Path) -> bool,
) -> SortPlan {
    let mut plan = SortPlan::default();
    let mut claimed: HashSet<PathBuf> = HashSet::new();

    for (record, category) in assignments {
        let dir = category.join(dest_root);
        match free_destination(&dir, &record.name, &claimed, &occupied) {
            Ok(destination) => {
                claimed.insert(destination.clone());
                plan.moves.push(PlannedMove {
                    record,
                    category,
                    destination,
                });
            }
            Err(err) => {
                plan.failures.push(FileFailure::new(
                    record.name.to_string(),
                    record.location.clone(),
                    Stage::Move,
                    err.to_string(),
                ));
            }
        }
    }

    plan
}

/// Find the first free destination for `name` in `dir`: the name itself,
/// then `stem_1.ext`, `stem_2.ext`, ...
fn free_destination(
    dir: &Path,
    name: &str,
    claimed: &HashSet<PathBuf>,
    occupied: &impl Fn(&Path) -> bool,
) -> Result<PathBuf, CollisionError> {
    let plain = dir.join(name);
    if !claimed.contains(&plain) && !occupied(&plain) {
        return Ok(plain);
    }

    for counter in 1..=MAX_SUFFIX_ATTEMPTS {
        let candidate = dir.join(suffixed_name(name, counter));
        if !claimed.contains(&candidate) && !occupied(&candidate) {
            return Ok(candidate);
        }
    }

    Err(CollisionError {
        destination: plain,
        attempts: MAX_SUFFIX_ATTEMPTS,
    })
}

/// Build `stem_N.ext` (or `name_N` for extensionless names).
pub(crate) fn suffixed_name(name: &str, counter: u32) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}_{counter}.{ext}"),
        _ => format!("{name}_{counter}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    use shelfwright_core::{RecordId, SourceLocation};

    fn record(id: u64, name: &str, path: &str) -> FileRecord {
        FileRecord::new(
            RecordId::new(id),
            name,
            10,
            SystemTime::UNIX_EPOCH,
            SourceLocation::local(path),
        )
    }

    fn docs() -> CategoryPath {
        CategoryPath::from_slash("Documents")
    }

    #[test]
    fn test_plain_destination_when_free() {
        let plan = build_plan(
            vec![(record(0, "report.txt", "/src/report.txt"), docs())],
            Path::new("/dest"),
            |_| false,
        );
        assert_eq!(plan.moves.len(), 1);
        assert_eq!(
            plan.moves[0].destination,
            PathBuf::from("/dest/Documents/report.txt")
        );
    }

    #[test]
    fn test_second_file_gets_numeric_suffix() {
        let plan = build_plan(
            vec![
                (record(0, "report.txt", "/a/report.txt"), docs()),
                (record(1, "report.txt", "/b/report.txt"), docs()),
            ],
            Path::new("/dest"),
            |_| false,
        );

        assert_eq!(plan.moves.len(), 2);
        assert_eq!(
            plan.moves[0].destination,
            PathBuf::from("/dest/Documents/report.txt")
        );
        assert_eq!(
            plan.moves[1].destination,
            PathBuf::from("/dest/Documents/report_1.txt")
        );
    }

    #[test]
    fn test_existing_destination_forces_suffix() {
        let existing = PathBuf::from("/dest/Documents/report.txt");
        let plan = build_plan(
            vec![(record(0, "report.txt", "/src/report.txt"), docs())],
            Path::new("/dest"),
            move |p| p == existing,
        );
        assert_eq!(
            plan.moves[0].destination,
            PathBuf::from("/dest/Documents/report_1.txt")
        );
    }

    #[test]
    fn test_all_destinations_unique() {
        let assignments: Vec<_> = (0..25)
            .map(|i| {
                (
                    record(i, "same.bin", &format!("/src/{i}/same.bin")),
                    docs(),
                )
            })
            .collect();

        let plan = build_plan(assignments, Path::new("/dest"), |_| false);
        let mut seen = HashSet::new();
        for planned in &plan.moves {
            assert!(
                seen.insert(planned.destination.clone()),
                "duplicate destination {:?}",
                planned.destination
            );
        }
        assert_eq!(plan.moves.len(), 25);
    }

    #[test]
    fn test_suffix_space_exhaustion_is_per_file() {
        let plan = build_plan(
            vec![
                (record(0, "report.txt", "/a/report.txt"), docs()),
                (record(1, "notes.txt", "/a/notes.txt"), docs()),
            ],
            Path::new("/dest"),
            // Every report.txt variant is taken; notes.txt is fine
            |p| p.to_string_lossy().contains("report"),
        );

        assert_eq!(plan.moves.len(), 1);
        assert_eq!(plan.failures.len(), 1);
        assert_eq!(plan.failures[0].name, "report.txt");
        assert!(plan.failures[0].message.contains("attempts"));
    }

    #[test]
    fn test_suffix_for_extensionless_name() {
        assert_eq!(suffixed_name("Makefile", 2), "Makefile_2");
        assert_eq!(suffixed_name("report.txt", 1), "report_1.txt");
        assert_eq!(suffixed_name("archive.tar.gz", 1), "archive.tar_1.gz");
    }
}
