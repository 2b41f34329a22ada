//! The incremental scan-and-cache pipeline.
//!
//! A scan walks a root directory, stats every file, and consults the
//! metadata cache before doing anything expensive. Cache hits are served
//! straight from the cache; misses build a fresh record, optionally run the
//! configured analyzer, and write the result back. The cache is flushed once
//! at the end of the pass, including when the scan is cancelled, so work
//! already done survives.
//!
//! Per-file failures (stat errors, unreadable files, analyzer failures) are
//! logged and counted but never abort the scan. Only an unusable root or an
//! unwritable cache store fails the whole operation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::analysis::MetadataAnalyzer;
use crate::cache::{CacheError, CachedMetadata, MetadataCache};
use crate::persist::FileStore;
use crate::progress::ProgressCallback;

use super::{FileRecord, ScanError, Walker, WalkerConfig};

/// How often scan progress is reported, in files.
pub const SCAN_PROGRESS_EVERY: usize = 100;

/// Per-scan options chosen by the caller.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Run the configured analyzer on cache misses for audio files.
    /// Analysis is costly, so it is user-controlled.
    pub analyze_audio: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            analyze_audio: true,
        }
    }
}

/// Pipeline configuration.
#[derive(Clone)]
pub struct PipelineConfig {
    /// Walker configuration for directory traversal.
    pub walker: WalkerConfig,
    /// Extensions (lowercase, with dot) treated as audio for analysis.
    pub audio_extensions: BTreeSet<String>,
    /// Optional cancellation flag checked between files.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            walker: WalkerConfig::default(),
            audio_extensions: crate::analysis::default_audio_extensions(),
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl std::fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("walker", &self.walker)
            .field("audio_extensions", &self.audio_extensions)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Set the walker configuration.
    #[must_use]
    pub fn with_walker(mut self, walker: WalkerConfig) -> Self {
        self.walker = walker;
        self
    }

    /// Set the audio extension set.
    #[must_use]
    pub fn with_audio_extensions(mut self, extensions: BTreeSet<String>) -> Self {
        self.audio_extensions = extensions;
        self
    }

    /// Set the cancellation flag.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Fatal scan failures. Everything else is per-file and advisory.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// The root path does not exist.
    #[error("Scan root not found: {0}")]
    RootNotFound(PathBuf),

    /// The root path is not a directory.
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// The cache backing store could not be written.
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Result of a scan pass.
///
/// `interrupted` distinguishes a cancelled scan (partial `records`) from a
/// completed one; `errors` carries the advisory per-file failures that were
/// skipped along the way.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Records for every file processed, in walk order
    pub records: Vec<FileRecord>,
    /// Files served entirely from the cache
    pub cache_hits: usize,
    /// Files that needed fresh processing
    pub cache_misses: usize,
    /// Files the analyzer ran on
    pub analyzed: usize,
    /// Analyzer failures (record kept with base attributes)
    pub analysis_failures: usize,
    /// Per-file errors that were skipped
    pub errors: Vec<ScanError>,
    /// Whether the scan was cancelled before finishing
    pub interrupted: bool,
    /// Wall-clock duration of the pass
    pub duration: Duration,
}

impl ScanOutcome {
    /// Cache hit rate over the processed files, 0-100.
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let processed = self.cache_hits + self.cache_misses;
        if processed == 0 {
            0.0
        } else {
            (self.cache_hits as f64 / processed as f64) * 100.0
        }
    }
}

/// Orchestrates walking, caching, and analysis into one scan pass.
///
/// # Example
///
/// ```no_run
/// use musorg::cache::MetadataCache;
/// use musorg::scanner::{PipelineConfig, ScanOptions, ScanPipeline};
/// use std::path::Path;
/// use std::sync::Arc;
///
/// let cache = Arc::new(MetadataCache::open("/tmp/musorg-cache.json"));
/// let pipeline = ScanPipeline::new(cache, PipelineConfig::default());
/// let outcome = pipeline
///     .scan(Path::new("/home/user/Samples"), &ScanOptions::default())
///     .unwrap();
/// println!("{} files, {:.0}% cached", outcome.records.len(), outcome.hit_rate());
/// ```
pub struct ScanPipeline {
    cache: Arc<MetadataCache>,
    analyzer: Option<Arc<dyn MetadataAnalyzer>>,
    store: Option<Arc<dyn FileStore>>,
    config: PipelineConfig,
}

impl ScanPipeline {
    /// Create a pipeline around an explicitly constructed cache.
    #[must_use]
    pub fn new(cache: Arc<MetadataCache>, config: PipelineConfig) -> Self {
        Self {
            cache,
            analyzer: None,
            store: None,
            config,
        }
    }

    /// Attach a metadata analyzer, invoked on cache misses for audio files.
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: Arc<dyn MetadataAnalyzer>) -> Self {
        self.analyzer = Some(analyzer);
        self
    }

    /// Attach a persistence collaborator that receives the completed batch.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn FileStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Scan `root` and return the collected records.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when the root is missing or not a
    /// directory, or when the cache cannot be flushed at the end of the
    /// pass. Cancellation is not an error: the outcome comes back through
    /// `Ok` with `interrupted` set and partial records.
    pub fn scan(&self, root: &Path, options: &ScanOptions) -> Result<ScanOutcome, PipelineError> {
        let started = std::time::Instant::now();

        if !root.exists() {
            return Err(PipelineError::RootNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(PipelineError::NotADirectory(root.to_path_buf()));
        }

        log::info!("Scanning {}", root.display());
        let mut outcome = ScanOutcome::default();

        // Counting pre-pass for the progress denominator. Best effort only;
        // the walk is cheap next to hashing and analysis.
        let total = self.make_walker(root).walk().filter(Result::is_ok).count();

        if let Some(callback) = &self.config.progress_callback {
            callback.on_phase_start("scan", total);
        }

        let mut current = 0usize;
        for result in self.make_walker(root).walk() {
            if self.config.is_shutdown_requested() {
                log::info!("Scan cancelled after {} files", current);
                outcome.interrupted = true;
                break;
            }

            match result {
                Ok(record) => {
                    self.process_file(record, options, &mut outcome);
                    current += 1;
                    if current % SCAN_PROGRESS_EVERY == 0 {
                        if let Some(callback) = &self.config.progress_callback {
                            callback.on_progress(current, total);
                        }
                    }
                }
                Err(e) => {
                    log::warn!("Skipping file: {}", e);
                    outcome.errors.push(e);
                }
            }
        }

        // A cancel raised between our checkpoints (the walker also polls
        // the flag) must still mark the outcome as partial.
        if self.config.is_shutdown_requested() {
            outcome.interrupted = true;
        }

        // Keep what was computed, even on a cancelled pass.
        self.cache.flush()?;

        if let Some(store) = &self.store {
            if let Err(e) = store.upsert_batch(&outcome.records) {
                log::warn!("Failed to persist scan batch: {}", e);
            }
        }

        if let Some(callback) = &self.config.progress_callback {
            callback.on_progress(current, total);
            callback.on_phase_end("scan");
        }

        outcome.duration = started.elapsed();
        log::info!(
            "Scan {}: {} files, {} cache hits, {} misses, {} errors in {:.1?}",
            if outcome.interrupted {
                "cancelled"
            } else {
                "complete"
            },
            outcome.records.len(),
            outcome.cache_hits,
            outcome.cache_misses,
            outcome.errors.len(),
            outcome.duration
        );

        Ok(outcome)
    }

    fn make_walker(&self, root: &Path) -> Walker {
        let mut walker = Walker::new(root, self.config.walker.clone());
        if let Some(flag) = &self.config.shutdown_flag {
            walker = walker.with_shutdown_flag(Arc::clone(flag));
        }
        walker
    }

    /// Handle one discovered file: cache consult, then fresh processing on
    /// a miss.
    fn process_file(&self, mut record: FileRecord, options: &ScanOptions, outcome: &mut ScanOutcome) {
        let mod_time = record.mod_time_secs();

        if let Some(cached) = self.cache.get(&record.path, mod_time, record.size) {
            record.hash = cached.hash;
            record.tags = cached.tags;
            outcome.cache_hits += 1;
            outcome.records.push(record);
            return;
        }
        outcome.cache_misses += 1;

        if options.analyze_audio && self.is_audio(&record) {
            if let Some(analyzer) = &self.analyzer {
                match analyzer.analyze(&record.path) {
                    Ok(tags) => {
                        outcome.analyzed += 1;
                        for (dimension, values) in tags {
                            record.tags.insert(dimension, values);
                        }
                    }
                    Err(e) => {
                        outcome.analysis_failures += 1;
                        log::warn!("Analysis failed for {}: {}", record.path.display(), e);
                    }
                }
            }
        }

        self.cache.update(
            &record.path,
            mod_time,
            record.size,
            CachedMetadata {
                hash: record.hash.clone(),
                tags: record.tags.clone(),
            },
        );
        outcome.records.push(record);
    }

    fn is_audio(&self, record: &FileRecord) -> bool {
        record
            .extension()
            .is_some_and(|ext| self.config.audio_extensions.contains(&ext))
    }
}
