//! shelfwright - sorts messy file collections into a categorized tree.
//!
//! Usage:
//!   shelfwright sort --source DIR --dest DIR --categories "Docs,Images"
//!   shelfwright sort --source DIR --dest DIR --auto [--oracle-url URL]
//!   shelfwright plan --source DIR --dest DIR --categories "Docs"
//!   shelfwright duplicates --source DIR [--dedupe hardcore]
//!   shelfwright --help

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, eyre};
use humansize::{DECIMAL, format_size};
use tracing_subscriber::EnvFilter;

use shelfwright_analyze::{DedupeConfig, DuplicateDetector};
use shelfwright_classify::{HttpOracle, Resolver};
use shelfwright_core::{
    CategoryMode, CategoryPath, CategoryTree, DEFAULT_MAX_DEPTH, DedupeMode, ExecutionReport,
    OracleConfig, RunConfig, SourceLocation,
};
use shelfwright_engine::{Engine, RunState};
use shelfwright_ops::build_plan;
use shelfwright_scan::{LocalBackend, Scanner, StorageBackend};

#[derive(Parser)]
#[command(
    name = "shelfwright",
    version,
    about = "Sorts messy file collections into a categorized destination tree",
    long_about = "shelfwright scans a source directory, removes duplicates, resolves a \
                  category for every surviving file (from a category list you supply or \
                  from a classification model), and moves the files into a destination \
                  tree - after writing a backup of the source."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a full sort: backup, scan, dedupe, categorize, move
    Sort {
        #[command(flatten)]
        common: CommonArgs,

        /// Skip the pre-run backup archive
        #[arg(long)]
        no_backup: bool,

        /// Directory for backup artifacts (default: next to the destination)
        #[arg(long)]
        backup_dir: Option<PathBuf>,

        /// Leave duplicate files in the source instead of deleting them
        #[arg(long)]
        keep_duplicates: bool,

        /// Print the final report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Compute and print the move plan without touching any file
    Plan {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Find duplicate files and report reclaimable space
    Duplicates {
        /// Source directory to scan
        #[arg(long)]
        source: PathBuf,

        /// Detection mode
        #[arg(long, default_value = "normal")]
        dedupe: DedupeArg,

        /// Maximum number of duplicate groups to show
        #[arg(short = 'n', long, default_value = "20")]
        top: usize,
    },
}

#[derive(clap::Args)]
struct CommonArgs {
    /// Source directory to sort
    #[arg(long)]
    source: PathBuf,

    /// Destination root for the category tree
    #[arg(long)]
    dest: PathBuf,

    /// Comma-separated category paths for manual mode (e.g. "Docs/Reports,Images")
    #[arg(long)]
    categories: Option<String>,

    /// Let the classification oracle generate categories and classify files
    #[arg(long)]
    auto: bool,

    /// Maximum category depth
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: u32,

    /// Duplicate detection mode
    #[arg(long, default_value = "normal")]
    dedupe: DedupeArg,

    /// Base URL of the classification oracle
    #[arg(long, default_value = "http://localhost:11434")]
    oracle_url: String,

    /// Model name passed to the oracle
    #[arg(long, default_value = "llama3")]
    model: String,
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum DedupeArg {
    None,
    #[default]
    Normal,
    /// Match on name+size without reading content (fast but lossy)
    Hardcore,
}

impl From<DedupeArg> for DedupeMode {
    fn from(arg: DedupeArg) -> Self {
        match arg {
            DedupeArg::None => DedupeMode::None,
            DedupeArg::Normal => DedupeMode::Normal,
            DedupeArg::Hardcore => DedupeMode::Hardcore,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Sort {
            common,
            no_backup,
            backup_dir,
            keep_duplicates,
            json,
        } => run_sort(common, no_backup, backup_dir, keep_duplicates, json).await,
        Command::Plan { common } => run_plan(common).await,
        Command::Duplicates {
            source,
            dedupe,
            top,
        } => run_duplicates(&source, dedupe.into(), top),
    }
}

/// Build the run configuration shared by `sort` and `plan`.
fn build_config(
    common: &CommonArgs,
    no_backup: bool,
    backup_dir: Option<PathBuf>,
    keep_duplicates: bool,
) -> Result<RunConfig> {
    let source = common.source.canonicalize().context("Invalid source")?;

    let category_mode = if common.auto {
        CategoryMode::Automatic {
            max_depth: common.max_depth,
        }
    } else {
        let list = common.categories.as_deref().ok_or_else(|| {
            eyre!("either --auto or --categories is required")
        })?;
        let paths = list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(CategoryPath::from_slash);
        CategoryMode::Manual {
            tree: CategoryTree::from_paths(paths, common.max_depth),
        }
    };

    RunConfig::builder()
        .source(SourceLocation::local(source))
        .dest_root(common.dest.clone())
        .category_mode(category_mode)
        .dedupe_mode(DedupeMode::from(common.dedupe))
        .backup(!no_backup)
        .backup_dir(backup_dir)
        .remove_duplicates(!keep_duplicates)
        .oracle(OracleConfig {
            endpoint: common.oracle_url.clone(),
            model: common.model.clone(),
            ..OracleConfig::default()
        })
        .build()
        .map_err(|e| eyre!("invalid configuration: {e}"))
}

/// Run the full pipeline and print the report.
async fn run_sort(
    common: CommonArgs,
    no_backup: bool,
    backup_dir: Option<PathBuf>,
    keep_duplicates: bool,
    json: bool,
) -> Result<()> {
    let config = build_config(&common, no_backup, backup_dir, keep_duplicates)?;
    let source_root = config
        .source
        .as_local_path()
        .cloned()
        .unwrap_or_else(|| common.source.clone());
    let backend: Arc<dyn StorageBackend> = Arc::new(LocalBackend::new(source_root));
    let oracle = HttpOracle::new(&config.oracle);

    let handle = Engine::start(config, backend, oracle);

    // Narrate state transitions while the run progresses
    let mut watch = handle.watch();
    let narrator = tokio::spawn(async move {
        let mut last = RunState::Idle;
        while watch.changed().await.is_ok() {
            let status = *watch.borrow_and_update();
            if status.state != last && !status.state.is_terminal() {
                eprintln!("{}...", status.state);
                last = status.state;
            }
        }
    });

    let result = handle.wait().await;
    narrator.abort();

    let report = result.context("run aborted before any file was touched")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if report.has_failures() {
        std::process::exit(2);
    }
    Ok(())
}

/// Compute the plan without executing it.
async fn run_plan(common: CommonArgs) -> Result<()> {
    let config = build_config(&common, true, None, true)?;
    let source_root = config
        .source
        .as_local_path()
        .cloned()
        .unwrap_or_else(|| common.source.clone());
    let backend: Arc<dyn StorageBackend> = Arc::new(LocalBackend::new(source_root));

    eprintln!("Scanning {}...", common.source.display());
    let scan = Scanner::new(backend.clone()).scan()?;
    eprintln!("Found {} files", scan.records.len());

    let detector = DuplicateDetector::with_config(DedupeConfig {
        mode: config.dedupe_mode,
        ..DedupeConfig::default()
    });
    let dedupe = detector.detect(scan.records, backend.as_ref());

    let mut resolver = match &config.category_mode {
        CategoryMode::Manual { tree } => Resolver::manual(tree),
        CategoryMode::Automatic { max_depth } => Resolver::automatic(
            HttpOracle::new(&config.oracle),
            *max_depth,
            config.cloud_workers,
        ),
    };
    let signatures: Vec<_> = dedupe.survivors.iter().map(|r| r.signature()).collect();
    if let Err(e) = resolver.prepare(&signatures).await {
        eprintln!("Warning: category generation failed ({e}); using fallback");
    }

    let mut assignments = Vec::new();
    for record in &dedupe.survivors {
        let resolution = resolver.resolve(&record.signature()).await;
        assignments.push((record.clone(), resolution.path));
    }

    let plan = build_plan(assignments, &config.dest_root, |p| p.exists());

    for group in &dedupe.groups {
        for duplicate in group.duplicates() {
            println!("delete {}  (duplicate of {})", duplicate.location, group.survivor().name);
        }
    }
    for planned in &plan.moves {
        println!("move   {}  ->  {}", planned.record.location, planned.destination.display());
    }
    for failure in &plan.failures {
        println!("skip   {}  ({})", failure.name, failure.message);
    }

    println!(
        "\n{} moves, {} duplicate deletions planned",
        plan.len(),
        dedupe.duplicate_count()
    );
    Ok(())
}

/// Report-only duplicate detection.
fn run_duplicates(source: &PathBuf, mode: DedupeMode, top: usize) -> Result<()> {
    let source = source.canonicalize().context("Invalid source")?;
    eprintln!("Scanning {}...", source.display());

    let backend: Arc<dyn StorageBackend> = Arc::new(LocalBackend::new(&source));
    let scan = Scanner::new(backend.clone()).scan()?;

    let detector = DuplicateDetector::with_config(DedupeConfig {
        mode,
        ..DedupeConfig::default()
    });
    let outcome = detector.detect(scan.records, backend.as_ref());

    if outcome.groups.is_empty() {
        println!("No duplicates found");
        return Ok(());
    }

    let wasted: u64 = outcome.groups.iter().map(|g| g.wasted_bytes()).sum();
    println!(
        "{} duplicate group(s), {} reclaimable",
        outcome.groups.len(),
        format_size(wasted, DECIMAL)
    );
    println!();

    for group in outcome.groups.iter().take(top) {
        println!(
            "{} x {} ({} wasted)",
            group.count(),
            format_size(group.survivor().size, DECIMAL),
            format_size(group.wasted_bytes(), DECIMAL)
        );
        println!("  keep   {}", group.survivor().location);
        for duplicate in group.duplicates() {
            println!("  delete {}", duplicate.location);
        }
    }
    if outcome.groups.len() > top {
        println!("... and {} more group(s)", outcome.groups.len() - top);
    }
    Ok(())
}

/// Human-readable report summary.
fn print_report(report: &ExecutionReport) {
    println!();
    println!("{}", "─".repeat(60));
    println!(" {}", report.summary());
    println!("{}", "─".repeat(60));

    if !report.categories_used.is_empty() {
        println!(" Categories used:");
        for category in &report.categories_used {
            println!("   {category}");
        }
    }
    if !report.failures.is_empty() {
        println!(" Failures:");
        for failure in &report.failures {
            println!("   {failure}");
        }
    }
    if !report.scan_warnings.is_empty() {
        println!(" {} scan warning(s)", report.scan_warnings.len());
    }
    println!(" Elapsed: {:.2}s", report.elapsed.as_secs_f64());
}
