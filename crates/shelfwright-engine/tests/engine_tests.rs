use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tempfile::TempDir;

use shelfwright_classify::Oracle;
use shelfwright_core::{
    BackendError, CategoryMode, CategoryPath, CategoryTree, DedupeMode, FatalError,
    FileSignature, OracleError, RunConfig, SourceLocation, Stage,
};
use shelfwright_engine::{Engine, RunState};
use shelfwright_scan::{EntryError, ListTarget, LocalBackend, RawEntry, StorageBackend};

/// Oracle stub: generates a fixed tree, classifies by extension keyword,
/// and times out for file names containing "odd".
struct StubOracle {
    calls: AtomicU32,
}

impl StubOracle {
    fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
        }
    }
}

impl Oracle for StubOracle {
    async fn classify(
        &self,
        sig: &FileSignature,
        _categories: &[CategoryPath],
        max_depth: u32,
    ) -> Result<CategoryPath, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if sig.name.contains("odd") {
            return Err(OracleError::Timeout);
        }
        let reply = match sig.extension.as_str() {
            "pdf" | "txt" => "Documents",
            "jpg" => "Media/Images",
            _ => "Documents",
        };
        Ok(CategoryPath::from_slash(reply).truncated(max_depth))
    }

    async fn generate_tree(
        &self,
        _sample: &[FileSignature],
        max_depth: u32,
    ) -> Result<CategoryTree, OracleError> {
        Ok(CategoryTree::from_paths(
            [
                CategoryPath::from_slash("Documents"),
                CategoryPath::from_slash("Media/Images"),
            ],
            max_depth,
        ))
    }
}

struct Dirs {
    _temp: TempDir,
    source: PathBuf,
    dest: PathBuf,
    backups: PathBuf,
}

fn dirs() -> Dirs {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("inbox");
    let dest = temp.path().join("sorted");
    let backups = temp.path().join("backups");
    fs::create_dir_all(&source).unwrap();
    Dirs {
        _temp: temp,
        source,
        dest,
        backups,
    }
}

fn manual_tree() -> CategoryTree {
    CategoryTree::from_paths(
        [
            CategoryPath::from_slash("Documents"),
            CategoryPath::from_slash("Images"),
        ],
        3,
    )
}

fn base_config(d: &Dirs, mode: CategoryMode) -> RunConfig {
    RunConfig::builder()
        .source(SourceLocation::local(&d.source))
        .dest_root(&d.dest)
        .category_mode(mode)
        .backup_dir(Some(d.backups.clone()))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_manual_sort_end_to_end() {
    let d = dirs();
    fs::write(d.source.join("report.pdf"), "pdf bytes").unwrap();
    fs::write(d.source.join("photo.jpg"), "jpeg bytes").unwrap();
    fs::write(d.source.join("data.xyz"), "mystery").unwrap();

    let config = base_config(&d, CategoryMode::Manual { tree: manual_tree() });
    let backend: Arc<dyn StorageBackend> = Arc::new(LocalBackend::new(&d.source));
    let handle = Engine::start(config, backend, StubOracle::new());
    let report = handle.wait().await.unwrap();

    assert_eq!(report.moved_count(), 3);
    assert!(!report.cancelled);
    assert!(d.dest.join("Documents/report.pdf").exists());
    assert!(d.dest.join("Images/photo.jpg").exists());
    assert!(d.dest.join("Uncategorized/data.xyz").exists());

    // The source no longer holds the moved files
    assert!(!d.source.join("report.pdf").exists());

    // A backup zip was written before anything moved
    let archives: Vec<_> = fs::read_dir(&d.backups)
        .unwrap()
        .filter_map(Result::ok)
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(archives.len(), 1);
    assert!(archives[0].starts_with("backup_inbox_"));
    assert!(archives[0].ends_with(".zip"));
}

#[tokio::test]
async fn test_duplicates_removed_before_moving() {
    let d = dirs();
    fs::write(d.source.join("a.txt"), "identical contents").unwrap();
    fs::write(d.source.join("b.txt"), "identical contents").unwrap();
    fs::write(d.source.join("c.txt"), "something different").unwrap();

    let mut config = base_config(&d, CategoryMode::Manual { tree: manual_tree() });
    config.dedupe_mode = DedupeMode::Normal;

    let backend: Arc<dyn StorageBackend> = Arc::new(LocalBackend::new(&d.source));
    let report = Engine::start(config, backend, StubOracle::new())
        .wait()
        .await
        .unwrap();

    assert_eq!(report.duplicates_removed, 1);
    assert_eq!(report.moved_count(), 2);

    // Exactly one of a/b survived into Documents, and it was moved, not
    // deleted with its duplicate
    let a = d.dest.join("Documents/a.txt");
    let b = d.dest.join("Documents/b.txt");
    assert!(a.exists() ^ b.exists());
    assert!(d.dest.join("Documents/c.txt").exists());
}

#[tokio::test]
async fn test_failing_backup_aborts_before_any_mutation() {
    let d = dirs();
    fs::write(d.source.join("a.txt"), "same stuff").unwrap();
    fs::write(d.source.join("b.txt"), "same stuff").unwrap();

    // The backup directory path is occupied by a regular file
    fs::write(&d.backups, "not a directory").unwrap();

    let config = base_config(&d, CategoryMode::Manual { tree: manual_tree() });
    let backend: Arc<dyn StorageBackend> = Arc::new(LocalBackend::new(&d.source));
    let handle = Engine::start(config, backend, StubOracle::new());

    let mut watch = handle.watch();
    let err = handle.wait().await.unwrap_err();
    assert!(matches!(err, FatalError::Backup(_)));

    // Fail-closed: zero moves or deletes happened
    assert!(d.source.join("a.txt").exists());
    assert!(d.source.join("b.txt").exists());
    assert!(!d.dest.exists());

    let status = *watch.borrow_and_update();
    assert_eq!(status.state, RunState::Failed);
}

#[tokio::test]
async fn test_oracle_failure_affects_only_that_file() {
    let d = dirs();
    for i in 0..9 {
        fs::write(d.source.join(format!("file{i}.txt")), format!("body {i}")).unwrap();
    }
    fs::write(d.source.join("odd.txt"), "the unlucky one").unwrap();

    let config = base_config(&d, CategoryMode::Automatic { max_depth: 2 });
    let backend: Arc<dyn StorageBackend> = Arc::new(LocalBackend::new(&d.source));
    let report = Engine::start(config, backend, StubOracle::new())
        .wait()
        .await
        .unwrap();

    assert_eq!(report.moved_count(), 10);
    assert!(d.dest.join("Uncategorized/odd.txt").exists());
    for i in 0..9 {
        assert!(d.dest.join(format!("Documents/file{i}.txt")).exists());
    }

    let classify_failures: Vec<_> = report
        .failures
        .iter()
        .filter(|f| f.stage == Stage::Classify)
        .collect();
    assert_eq!(classify_failures.len(), 1);
    assert_eq!(classify_failures[0].name, "odd.txt");
}

#[tokio::test]
async fn test_automatic_mode_truncates_to_max_depth() {
    let d = dirs();
    fs::write(d.source.join("photo.jpg"), "jpeg bytes").unwrap();

    let config = base_config(&d, CategoryMode::Automatic { max_depth: 1 });
    let backend: Arc<dyn StorageBackend> = Arc::new(LocalBackend::new(&d.source));
    let report = Engine::start(config, backend, StubOracle::new())
        .wait()
        .await
        .unwrap();

    assert_eq!(report.moved_count(), 1);
    // The oracle wanted Media/Images; depth 1 keeps only Media
    assert!(d.dest.join("Media/photo.jpg").exists());
    for category in &report.categories_used {
        assert_eq!(category.split('/').count(), 1);
    }
}

/// Backend that always reports an authentication failure.
struct LockedOutBackend;

impl StorageBackend for LockedOutBackend {
    fn root(&self) -> ListTarget {
        ListTarget::Cloud {
            folder_id: "root".into(),
        }
    }

    fn list_dir(
        &self,
        _target: &ListTarget,
    ) -> Result<Vec<Result<RawEntry, EntryError>>, BackendError> {
        Err(BackendError::Auth("token expired".to_string()))
    }

    fn open(
        &self,
        _location: &SourceLocation,
    ) -> Result<Box<dyn std::io::Read + Send>, BackendError> {
        Err(BackendError::Auth("token expired".to_string()))
    }

    fn relocate(
        &self,
        _location: &SourceLocation,
        _dest: &std::path::Path,
    ) -> Result<(), BackendError> {
        Err(BackendError::Auth("token expired".to_string()))
    }

    fn remove(&self, _location: &SourceLocation) -> Result<(), BackendError> {
        Err(BackendError::Auth("token expired".to_string()))
    }
}

#[tokio::test]
async fn test_auth_failure_is_fatal_before_mutation() {
    let d = dirs();
    let config = base_config(&d, CategoryMode::Manual { tree: manual_tree() });

    let handle = Engine::start(config, Arc::new(LockedOutBackend), StubOracle::new());
    let err = handle.wait().await.unwrap_err();

    assert!(matches!(err, FatalError::Auth(_)));
    assert!(!d.dest.exists());
    assert!(
        !d.backups.exists(),
        "no artifact may be produced for an unauthenticated source"
    );
}

/// Oracle that parks classification calls until released.
struct GatedOracle {
    gate: Arc<tokio::sync::Semaphore>,
}

impl Oracle for GatedOracle {
    async fn classify(
        &self,
        _sig: &FileSignature,
        _categories: &[CategoryPath],
        _max_depth: u32,
    ) -> Result<CategoryPath, OracleError> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| OracleError::Timeout)?;
        Ok(CategoryPath::from_slash("Documents"))
    }

    async fn generate_tree(
        &self,
        _sample: &[FileSignature],
        max_depth: u32,
    ) -> Result<CategoryTree, OracleError> {
        Ok(CategoryTree::from_paths(
            [CategoryPath::from_slash("Documents")],
            max_depth,
        ))
    }
}

#[tokio::test]
async fn test_cancel_mid_run_reports_partial_outcome() {
    let d = dirs();
    fs::write(d.source.join("a.txt"), "one").unwrap();
    fs::write(d.source.join("b.txt"), "two2").unwrap();

    let gate = Arc::new(tokio::sync::Semaphore::new(0));
    let config = base_config(&d, CategoryMode::Automatic { max_depth: 2 });
    let backend: Arc<dyn StorageBackend> = Arc::new(LocalBackend::new(&d.source));
    let handle = Engine::start(config, backend, GatedOracle { gate: gate.clone() });

    // Wait until classification is underway, then cancel and unblock it
    let mut watch = handle.watch();
    watch
        .wait_for(|s| s.state == RunState::Categorizing)
        .await
        .unwrap();
    handle.cancel();
    gate.add_permits(16);

    let report = handle.wait().await.unwrap();
    assert!(report.cancelled, "a cancelled run is a report, not an error");
    assert_eq!(report.moved_count(), 0);
    assert!(d.source.join("a.txt").exists());
    assert!(d.source.join("b.txt").exists());
}
