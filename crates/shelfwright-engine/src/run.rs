//! Run orchestration.
//!
//! `Engine::start` is the caller-facing entry point: it takes a validated
//! `RunConfig`, a storage backend and an oracle, spawns the pipeline on a
//! task, and hands back a `RunHandle` for status polling, cancellation and
//! final report retrieval.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use shelfwright_analyze::{DedupeConfig, DuplicateDetector};
use shelfwright_classify::{Oracle, Resolver};
use shelfwright_core::{
    BackupError, CategoryMode, ExecutionReport, FatalError, FileFailure, FileSignature,
    RunConfig, ScanWarning, Stage, WarningKind,
};
use shelfwright_ops::{ExecOptions, ExecResult, OpKind, build_plan, snapshot, start_execute};
use shelfwright_scan::{Scanner, StorageBackend};

use crate::state::RunState;

/// A point-in-time view of a run.
#[derive(Debug, Clone, Copy)]
pub struct RunStatus {
    /// Current pipeline state.
    pub state: RunState,
    /// Files processed so far in the mutating phase.
    pub files_done: u64,
    /// Files found by the scan.
    pub files_total: u64,
}

/// Handle to a running (or finished) sort run.
pub struct RunHandle {
    status: watch::Receiver<RunStatus>,
    cancel: CancellationToken,
    task: JoinHandle<Result<ExecutionReport, FatalError>>,
}

impl RunHandle {
    /// The current status.
    pub fn status(&self) -> RunStatus {
        *self.status.borrow()
    }

    /// Subscribe to status changes.
    pub fn watch(&self) -> watch::Receiver<RunStatus> {
        self.status.clone()
    }

    /// Request cancellation. In-flight per-file operations finish; no new
    /// ones start. The run still completes with a partial report.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run and take its report, or the pre-mutation abort
    /// reason.
    pub async fn wait(self) -> Result<ExecutionReport, FatalError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(FatalError::Config(format!("run task failed: {e}"))),
        }
    }
}

/// Entry point for sort runs.
pub struct Engine;

impl Engine {
    /// Start a run. Everything the run needs travels in `config`; no
    /// process-wide state survives across runs.
    pub fn start<O>(config: RunConfig, backend: Arc<dyn StorageBackend>, oracle: O) -> RunHandle
    where
        O: Oracle + 'static,
    {
        let (status_tx, status_rx) = watch::channel(RunStatus {
            state: RunState::Idle,
            files_done: 0,
            files_total: 0,
        });
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_pipeline(
            config,
            backend,
            oracle,
            status_tx,
            cancel.clone(),
        ));

        RunHandle {
            status: status_rx,
            cancel,
            task,
        }
    }
}

/// Status publisher.
struct Progress {
    tx: watch::Sender<RunStatus>,
    current: RunStatus,
}

impl Progress {
    fn new(tx: watch::Sender<RunStatus>) -> Self {
        let current = *tx.borrow();
        Self { tx, current }
    }

    fn state(&mut self, state: RunState) {
        self.current.state = state;
        let _ = self.tx.send(self.current);
    }

    fn total(&mut self, total: u64) {
        self.current.files_total = total;
        let _ = self.tx.send(self.current);
    }

    fn done(&mut self, done: u64) {
        self.current.files_done = done;
        let _ = self.tx.send(self.current);
    }
}

async fn run_pipeline<O: Oracle + 'static>(
    config: RunConfig,
    backend: Arc<dyn StorageBackend>,
    oracle: O,
    status: watch::Sender<RunStatus>,
    cancel: CancellationToken,
) -> Result<ExecutionReport, FatalError> {
    let started = Instant::now();
    let mut report = ExecutionReport::new();
    let mut progress = Progress::new(status);

    // ---- Backing up: the fail-closed barrier. Auth is probed here so any
    // credential problem surfaces before a single mutation.
    progress.state(RunState::BackingUp);

    if let Err(e) = auth_probe(&backend).await {
        progress.state(RunState::Failed);
        return Err(e);
    }

    if config.backup {
        let out_dir = backup_dir(&config);
        let label = backup_label(&config);
        let snapshot_backend = backend.clone();
        let result =
            tokio::task::spawn_blocking(move || snapshot(snapshot_backend, &out_dir, &label))
                .await
                .unwrap_or_else(|e| {
                    Err(BackupError::Archive(format!("snapshot task failed: {e}")))
                });

        match result {
            Ok(handle) => {
                info!(archive = %handle.path.display(), entries = handle.entries, "backup written");
            }
            Err(e) => {
                progress.state(RunState::Failed);
                return Err(FatalError::Backup(e));
            }
        }
    }

    // ---- Scanning (read-only from here until Executing) ----
    progress.state(RunState::Scanning);
    let scan_backend = backend.clone();
    let scan = match tokio::task::spawn_blocking(move || Scanner::new(scan_backend).scan()).await
    {
        Ok(Ok(snapshot)) => snapshot,
        // The source became unlistable after the probe. Nothing was
        // scanned, so nothing will be mutated: complete with the warning.
        Ok(Err(e)) => {
            warn!(error = %e, "scan aborted; nothing to do");
            report.scan_warnings.push(ScanWarning::new(
                config.source.to_string(),
                e.to_string(),
                WarningKind::ListFailed,
            ));
            report.elapsed = started.elapsed();
            progress.state(RunState::Completed);
            return Ok(report);
        }
        Err(e) => {
            progress.state(RunState::Failed);
            return Err(FatalError::Config(format!("scan task failed: {e}")));
        }
    };

    report.scan_warnings.extend(scan.warnings);
    progress.total(scan.stats.files);
    info!(files = scan.stats.files, bytes = scan.stats.bytes, "scan complete");

    if scan.records.is_empty() || cancel.is_cancelled() {
        report.cancelled = cancel.is_cancelled();
        report.elapsed = started.elapsed();
        progress.state(RunState::Completed);
        return Ok(report);
    }

    // ---- Deduplicating ----
    progress.state(RunState::Deduplicating);
    let detector = DuplicateDetector::with_config(DedupeConfig {
        mode: config.dedupe_mode,
        workers: config.backend_workers(),
        ..DedupeConfig::default()
    });
    let dedupe_backend = backend.clone();
    let records = scan.records;
    let dedupe = match tokio::task::spawn_blocking(move || {
        detector.detect(records, dedupe_backend.as_ref())
    })
    .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            progress.state(RunState::Failed);
            return Err(FatalError::Config(format!("dedupe task failed: {e}")));
        }
    };

    let duplicates = dedupe.duplicates_to_remove();
    report.failures.extend(dedupe.failures);
    info!(
        groups = dedupe.groups.len(),
        duplicates = duplicates.len(),
        "deduplication complete"
    );

    if cancel.is_cancelled() {
        report.cancelled = true;
        report.elapsed = started.elapsed();
        progress.state(RunState::Completed);
        return Ok(report);
    }

    // ---- Categorizing ----
    progress.state(RunState::Categorizing);
    let mut resolver = match &config.category_mode {
        CategoryMode::Manual { tree } => Resolver::manual(tree),
        CategoryMode::Automatic { max_depth } => {
            Resolver::automatic(oracle, *max_depth, config.cloud_workers)
        }
    };

    let signatures: Vec<FileSignature> =
        dedupe.survivors.iter().map(|r| r.signature()).collect();
    if let Err(e) = resolver.prepare(&signatures).await {
        warn!(error = %e, "category generation failed; continuing with fallback tree");
    }

    let resolver = Arc::new(resolver);
    let mut classify_tasks = JoinSet::new();
    for record in dedupe.survivors {
        if cancel.is_cancelled() {
            break;
        }
        let resolver = resolver.clone();
        classify_tasks.spawn(async move {
            let resolution = resolver.resolve(&record.signature()).await;
            (record, resolution)
        });
    }

    let mut assignments = Vec::new();
    while let Some(joined) = classify_tasks.join_next().await {
        if let Ok((record, resolution)) = joined {
            if let Some(err) = resolution.fallback {
                report.failures.push(FileFailure::new(
                    record.name.to_string(),
                    record.location.clone(),
                    Stage::Classify,
                    err.to_string(),
                ));
            }
            assignments.push((record, resolution.path));
        }
    }
    // Deterministic plan order regardless of classification completion order
    assignments.sort_by_key(|(record, _)| record.id.0);

    if cancel.is_cancelled() {
        report.cancelled = true;
        report.elapsed = started.elapsed();
        progress.state(RunState::Completed);
        return Ok(report);
    }

    // ---- Executing ----
    progress.state(RunState::Executing);
    let plan = if config.source.is_local() {
        build_plan(assignments, &config.dest_root, |p| p.exists())
    } else {
        // Remote destinations cannot be probed cheaply; the executor
        // disambiguates on collision instead.
        build_plan(assignments, &config.dest_root, |_| false)
    };

    let duplicates_total = duplicates.len() as u64;
    let mut rx = start_execute(
        plan,
        duplicates,
        backend,
        ExecOptions {
            remove_duplicates: config.remove_duplicates,
            workers: config.backend_workers(),
            cancel: cancel.clone(),
        },
    );

    let mut exec = None;
    while let Some(event) = rx.recv().await {
        match event {
            ExecResult::Progress(p) => {
                let done = match p.kind {
                    OpKind::Delete => p.files_completed as u64,
                    OpKind::Move => duplicates_total + p.files_completed as u64,
                };
                progress.done(done);
            }
            ExecResult::Complete(outcome) => exec = Some(outcome),
        }
    }
    let exec = exec.unwrap_or_default();

    for moved in exec.moved {
        report.record_move(moved);
    }
    report.failures.extend(exec.failures);
    report.duplicates_removed = exec.duplicates_removed;
    report.duplicates_skipped = exec.duplicates_skipped;
    report.cancelled |= exec.cancelled;
    report.elapsed = started.elapsed();

    info!(summary = %report.summary(), "run complete");
    progress.state(RunState::Completed);
    Ok(report)
}

/// Verify the backend accepts our credentials before anything else runs.
/// Non-auth listing problems are left for the scanner's retry logic.
async fn auth_probe(backend: &Arc<dyn StorageBackend>) -> Result<(), FatalError> {
    let probe = backend.clone();
    let result = tokio::task::spawn_blocking(move || probe.list_dir(&probe.root())).await;
    match result {
        Ok(Err(e)) if e.is_auth() => Err(FatalError::Auth(e.to_string())),
        _ => Ok(()),
    }
}

/// Where backup artifacts go: the configured directory, or next to the
/// destination root.
fn backup_dir(config: &RunConfig) -> PathBuf {
    config.backup_dir.clone().unwrap_or_else(|| {
        config
            .dest_root
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    })
}

/// Human label embedded in the backup artifact name.
fn backup_label(config: &RunConfig) -> String {
    match &config.source {
        shelfwright_core::SourceLocation::Local { path } => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "source".to_string()),
        shelfwright_core::SourceLocation::Cloud { provider, .. } => provider.to_string(),
    }
}
