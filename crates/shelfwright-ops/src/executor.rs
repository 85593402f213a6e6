//! Sort plan execution.
//!
//! Removes duplicate non-survivors first, then relocates survivors into
//! the destination tree. Per-file operations run concurrently under a
//! bounded semaphore; moves into one destination directory are serialized
//! by a per-directory lock so collision disambiguation is race-free. Every
//! per-file failure is recorded and the rest of the batch continues.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use shelfwright_core::{
    BackendError, CollisionError, FileFailure, FileRecord, MovedFile, SourceLocation, Stage,
};
use shelfwright_scan::StorageBackend;

use crate::OPERATION_CHANNEL_SIZE;
use crate::plan::{MAX_SUFFIX_ATTEMPTS, PlannedMove, SortPlan, suffixed_name};
use crate::progress::{OpKind, OperationProgress};

/// Options for plan execution.
#[derive(Debug, Clone)]
pub struct ExecOptions {
    /// Delete duplicate non-survivors (true) or leave them unmoved.
    pub remove_duplicates: bool,
    /// Bound on concurrent per-file operations.
    pub workers: usize,
    /// Cooperative cancellation: observed between files, never mid-file.
    pub cancel: CancellationToken,
}

impl Default for ExecOptions {
    fn default() -> Self {
        Self {
            remove_duplicates: true,
            workers: 4,
            cancel: CancellationToken::new(),
        }
    }
}

/// Result sent through the channel during execution.
#[derive(Debug)]
pub enum ExecResult {
    /// Progress update.
    Progress(OperationProgress),
    /// Execution finished (possibly cancelled part-way).
    Complete(ExecOutcome),
}

/// What execution accomplished.
#[derive(Debug, Default)]
pub struct ExecOutcome {
    /// Survivors successfully relocated.
    pub moved: Vec<MovedFile>,
    /// Per-file failures (planning collisions, deletes, moves).
    pub failures: Vec<FileFailure>,
    /// Duplicate non-survivors removed at the source.
    pub duplicates_removed: u64,
    /// Duplicate non-survivors left in place.
    pub duplicates_skipped: u64,
    /// Execution stopped early on cancellation.
    pub cancelled: bool,
}

/// Start executing a sort plan.
///
/// Returns a receiver for progress updates; the final message is always
/// `ExecResult::Complete`.
pub fn start_execute(
    plan: SortPlan,
    duplicates: Vec<FileRecord>,
    backend: Arc<dyn StorageBackend>,
    options: ExecOptions,
) -> mpsc::Receiver<ExecResult> {
    let (tx, rx) = mpsc::channel(OPERATION_CHANNEL_SIZE);

    tokio::spawn(async move {
        let outcome = execute_impl(plan, duplicates, backend, options, &tx).await;
        let _ = tx.send(ExecResult::Complete(outcome)).await;
    });

    rx
}

async fn execute_impl(
    plan: SortPlan,
    duplicates: Vec<FileRecord>,
    backend: Arc<dyn StorageBackend>,
    options: ExecOptions,
    tx: &mpsc::Sender<ExecResult>,
) -> ExecOutcome {
    let mut outcome = ExecOutcome {
        // Collisions the planner could not resolve are already failures.
        failures: plan.failures,
        ..Default::default()
    };

    // Duplicates go first, independently of survivor relocation: the
    // duplicate list never contains a survivor, so a survivor cannot be
    // deleted as a duplicate of itself.
    remove_duplicates(&duplicates, &backend, &options, &mut outcome, tx).await;

    if options.cancel.is_cancelled() {
        outcome.cancelled = true;
        return outcome;
    }

    relocate_survivors(plan.moves, backend, &options, &mut outcome, tx).await;
    outcome
}

async fn remove_duplicates(
    duplicates: &[FileRecord],
    backend: &Arc<dyn StorageBackend>,
    options: &ExecOptions,
    outcome: &mut ExecOutcome,
    tx: &mpsc::Sender<ExecResult>,
) {
    if !options.remove_duplicates {
        outcome.duplicates_skipped = duplicates.len() as u64;
        return;
    }

    let mut progress = OperationProgress::new(OpKind::Delete, duplicates.len());
    for (index, dup) in duplicates.iter().enumerate() {
        if options.cancel.is_cancelled() {
            outcome.cancelled = true;
            outcome.duplicates_skipped += (duplicates.len() - index) as u64;
            return;
        }

        let backend = backend.clone();
        let location = dup.location.clone();
        let result = tokio::task::spawn_blocking(move || backend.remove(&location)).await;

        match result {
            Ok(Ok(())) => {
                debug!(file = %dup.location, "removed duplicate");
                outcome.duplicates_removed += 1;
                progress.complete_file(dup.name.as_str(), false);
            }
            Ok(Err(e)) => {
                warn!(file = %dup.location, error = %e, "failed to remove duplicate");
                outcome.duplicates_skipped += 1;
                outcome.failures.push(FileFailure::new(
                    dup.name.to_string(),
                    dup.location.clone(),
                    Stage::Delete,
                    e.to_string(),
                ));
                progress.complete_file(dup.name.as_str(), true);
            }
            Err(e) => {
                outcome.duplicates_skipped += 1;
                outcome.failures.push(FileFailure::new(
                    dup.name.to_string(),
                    dup.location.clone(),
                    Stage::Delete,
                    format!("task failed: {e}"),
                ));
                progress.complete_file(dup.name.as_str(), true);
            }
        }
        let _ = tx.send(ExecResult::Progress(progress.clone())).await;
    }
}

async fn relocate_survivors(
    moves: Vec<PlannedMove>,
    backend: Arc<dyn StorageBackend>,
    options: &ExecOptions,
    outcome: &mut ExecOutcome,
    tx: &mpsc::Sender<ExecResult>,
) {
    let total = moves.len();
    let semaphore = Arc::new(Semaphore::new(options.workers.max(1)));
    let dir_locks: Arc<DashMap<PathBuf, Arc<Mutex<()>>>> = Arc::new(DashMap::new());
    let mut tasks = JoinSet::new();

    for planned in moves {
        // Observed between files only; anything in flight completes.
        let permit = tokio::select! {
            _ = options.cancel.cancelled() => {
                outcome.cancelled = true;
                break;
            }
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let backend = backend.clone();
        let locks = dir_locks.clone();
        tasks.spawn(async move {
            let _permit = permit;
            move_one(planned, backend, locks).await
        });
    }

    let mut progress = OperationProgress::new(OpKind::Move, total);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(MoveResult::Moved(moved)) => {
                progress.complete_file(moved.name.clone(), false);
                outcome.moved.push(moved);
            }
            Ok(MoveResult::Failed(failure)) => {
                progress.complete_file(failure.name.clone(), true);
                outcome.failures.push(failure);
            }
            Err(e) => {
                warn!(error = %e, "move task failed to join");
            }
        }
        let _ = tx.send(ExecResult::Progress(progress.clone())).await;
    }
}

enum MoveResult {
    Moved(MovedFile),
    Failed(FileFailure),
}

/// Relocate one survivor, serialized per destination directory.
async fn move_one(
    planned: PlannedMove,
    backend: Arc<dyn StorageBackend>,
    locks: Arc<DashMap<PathBuf, Arc<Mutex<()>>>>,
) -> MoveResult {
    let PlannedMove {
        record,
        category,
        destination,
    } = planned;

    let parent = destination
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let lock = locks
        .entry(parent)
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone();
    let _guard = lock.lock().await;

    let location = record.location.clone();
    let dest = destination.clone();
    let result =
        tokio::task::spawn_blocking(move || relocate_disambiguated(backend.as_ref(), &location, &dest))
            .await;

    match result {
        Ok(Ok(final_dest)) => {
            debug!(from = %record.location, to = %final_dest.display(), "moved");
            MoveResult::Moved(MovedFile {
                name: record.name.to_string(),
                from: record.location,
                to: final_dest,
                category,
            })
        }
        Ok(Err(e)) => MoveResult::Failed(FileFailure::new(
            record.name.to_string(),
            record.location,
            Stage::Move,
            e.to_string(),
        )),
        Err(e) => MoveResult::Failed(FileFailure::new(
            record.name.to_string(),
            record.location,
            Stage::Move,
            format!("task failed: {e}"),
        )),
    }
}

/// Attempt the planned destination; if something claimed it since planning,
/// walk the suffix sequence. Runs under the destination directory's lock.
fn relocate_disambiguated(
    backend: &dyn StorageBackend,
    location: &SourceLocation,
    destination: &Path,
) -> Result<PathBuf, BackendError> {
    match backend.relocate(location, destination) {
        Ok(()) => return Ok(destination.to_path_buf()),
        Err(BackendError::AlreadyExists { .. }) => {}
        Err(e) => return Err(e),
    }

    let dir = destination.parent().unwrap_or(Path::new(""));
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    for counter in 1..=MAX_SUFFIX_ATTEMPTS {
        let candidate = dir.join(suffixed_name(&name, counter));
        match backend.relocate(location, &candidate) {
            Ok(()) => return Ok(candidate),
            Err(BackendError::AlreadyExists { .. }) => continue,
            Err(e) => return Err(e),
        }
    }

    Err(BackendError::Provider(
        CollisionError {
            destination: destination.to_path_buf(),
            attempts: MAX_SUFFIX_ATTEMPTS,
        }
        .to_string(),
    ))
}
