//! Command-line interface.
//!
//! The CLI is a thin driver over [`crate::organizer::Organizer`]: it wires
//! Ctrl+C to cooperative cancellation, renders progress bars, and maps
//! outcomes to exit codes.
//!
//! ```bash
//! # Scan a sample library, analyzing audio file names
//! musorg scan ~/Samples
//!
//! # Rescan without analysis
//! musorg scan ~/Samples --skip-analysis
//!
//! # Find duplicate files
//! musorg duplicates ~/Samples
//!
//! # Verbose mode for debugging
//! musorg -v duplicates ~/Samples
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bytesize::ByteSize;
use clap::{Args, Parser, Subcommand};

use crate::cache::MetadataCache;
use crate::config::Settings;
use crate::duplicates::DetectionOutcome;
use crate::error::ExitCode;
use crate::organizer::Organizer;
use crate::persist::SqliteStore;
use crate::progress::Progress;
use crate::scanner::{FileRecord, ScanOptions, ScanOutcome};
use crate::task::{TaskEvent, TaskHandle};

/// Sample-library organizer: incremental scans and duplicate detection.
#[derive(Debug, Parser)]
#[command(name = "musorg")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Scan a directory and cache per-file metadata
    Scan(ScanArgs),
    /// Scan a directory and report duplicate files
    Duplicates(DuplicatesArgs),
}

/// Arguments shared by both subcommands.
#[derive(Debug, Args)]
pub struct CommonArgs {
    /// Directory to scan
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Metadata cache file (defaults to the platform cache directory)
    #[arg(long, value_name = "FILE")]
    pub cache: Option<PathBuf>,

    /// Print results as JSON instead of text
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the scan subcommand.
#[derive(Debug, Args)]
pub struct ScanArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Skip metadata analysis on cache misses
    #[arg(long)]
    pub skip_analysis: bool,

    /// Also persist records to the library database
    #[arg(long, value_name = "FILE")]
    pub db: Option<PathBuf>,
}

/// Arguments for the duplicates subcommand.
#[derive(Debug, Args)]
pub struct DuplicatesArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

/// Run the application logic and return the process exit code.
///
/// # Errors
///
/// Returns an error for unexpected failures; expected terminal states
/// (no duplicates, interrupted, partial) map to exit codes instead.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    crate::logging::init_logging(cli.verbose, cli.quiet);

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::SeqCst);
        })
        .context("failed to install Ctrl+C handler")?;
    }

    match cli.command {
        Commands::Scan(args) => run_scan(args, cli.quiet, &interrupted),
        Commands::Duplicates(args) => run_duplicates(args, cli.quiet, &interrupted),
    }
}

fn build_organizer(common: &CommonArgs, quiet: bool) -> Organizer {
    let mut settings = Settings::load();
    if let Some(cache) = &common.cache {
        settings.cache_path = Some(cache.clone());
    }
    let cache = Arc::new(MetadataCache::open(settings.cache_file()));
    Organizer::new(settings, cache).with_progress(Arc::new(Progress::new(quiet)))
}

/// Drain a task's events until completion, forwarding Ctrl+C as a cancel
/// request.
fn wait_for<T: Send + 'static>(handle: &TaskHandle<T>, interrupted: &Arc<AtomicBool>) -> anyhow::Result<T> {
    loop {
        if interrupted.swap(false, Ordering::SeqCst) {
            handle.cancel();
        }
        match handle.events().recv_timeout(Duration::from_millis(100)) {
            Ok(TaskEvent::Completed(payload)) => return Ok(payload),
            Ok(TaskEvent::Progress { .. }) => {}
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                anyhow::bail!("background worker exited without completing")
            }
        }
    }
}

fn run_scan(
    args: ScanArgs,
    quiet: bool,
    interrupted: &Arc<AtomicBool>,
) -> anyhow::Result<ExitCode> {
    let mut organizer = build_organizer(&args.common, quiet);
    if let Some(db) = &args.db {
        let store = SqliteStore::open(db).context("failed to open library database")?;
        organizer = organizer.with_store(Arc::new(store));
    }

    let options = ScanOptions {
        analyze_audio: !args.skip_analysis,
    };
    let handle = organizer.start_scan(args.common.path.clone(), options);
    let outcome = wait_for(handle, interrupted)??;

    report_scan(&outcome, &args.common)?;

    if outcome.interrupted {
        Ok(ExitCode::Interrupted)
    } else if outcome.errors.is_empty() {
        Ok(ExitCode::Success)
    } else {
        Ok(ExitCode::PartialSuccess)
    }
}

fn run_duplicates(
    args: DuplicatesArgs,
    quiet: bool,
    interrupted: &Arc<AtomicBool>,
) -> anyhow::Result<ExitCode> {
    let mut organizer = build_organizer(&args.common, quiet);

    // Hashing happens lazily during detection, so skip analysis here.
    let options = ScanOptions {
        analyze_audio: false,
    };
    let handle = organizer.start_scan(args.common.path.clone(), options);
    let scan: ScanOutcome = wait_for(handle, interrupted)??;
    if scan.interrupted {
        return Ok(ExitCode::Interrupted);
    }
    let scan_errors = scan.errors.len();

    let handle = organizer.start_detection(scan.records);
    let detection = wait_for(handle, interrupted)?;

    report_duplicates(&detection, &args.common)?;

    if detection.stats.interrupted {
        Ok(ExitCode::Interrupted)
    } else if detection.groups.is_empty() {
        Ok(ExitCode::NoDuplicates)
    } else if scan_errors > 0 {
        Ok(ExitCode::PartialSuccess)
    } else {
        Ok(ExitCode::Success)
    }
}

fn report_scan(outcome: &ScanOutcome, common: &CommonArgs) -> anyhow::Result<()> {
    if common.json {
        #[derive(serde::Serialize)]
        struct ScanReport<'a> {
            records: &'a [FileRecord],
            cache_hits: usize,
            cache_misses: usize,
            errors: usize,
            interrupted: bool,
        }
        let report = ScanReport {
            records: &outcome.records,
            cache_hits: outcome.cache_hits,
            cache_misses: outcome.cache_misses,
            errors: outcome.errors.len(),
            interrupted: outcome.interrupted,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let total_bytes: u64 = outcome.records.iter().map(|r| r.size).sum();
    println!(
        "Scanned {} files ({}) in {:.1?}",
        outcome.records.len(),
        ByteSize(total_bytes),
        outcome.duration
    );
    println!(
        "Cache: {} hits, {} misses ({:.0}% hit rate)",
        outcome.cache_hits,
        outcome.cache_misses,
        outcome.hit_rate()
    );
    if !outcome.errors.is_empty() {
        println!("Skipped {} unreadable files", outcome.errors.len());
    }
    if outcome.interrupted {
        println!("Scan was interrupted; results are partial");
    }
    Ok(())
}

fn report_duplicates(outcome: &DetectionOutcome, common: &CommonArgs) -> anyhow::Result<()> {
    if common.json {
        println!("{}", serde_json::to_string_pretty(&outcome.groups)?);
        return Ok(());
    }

    if outcome.stats.interrupted {
        println!("Detection was interrupted; no groups reported");
        return Ok(());
    }

    for group in &outcome.groups {
        println!(
            "{} files x {} ({} reclaimable):",
            group.len(),
            ByteSize(group.size),
            ByteSize(group.wasted_space())
        );
        for file in &group.files {
            println!("  {}", file.path.display());
        }
    }
    println!(
        "{} duplicate groups, {} duplicate files, {} reclaimable",
        outcome.groups.len(),
        outcome.stats.duplicate_files,
        ByteSize(outcome.stats.wasted_space)
    );
    Ok(())
}
