//! Caller-facing operation surface.
//!
//! An [`Organizer`] owns the dependency-injected collaborators (metadata
//! cache, analyzer, file store) and exposes each long operation as a
//! start/cancel pair returning a [`TaskHandle`] with progress and completion
//! events. A UI or CLI driver consumes those events; it never touches the
//! pipeline or detector directly.
//!
//! Only one scan and one detection run at a time per organizer: starting a
//! new operation cancels a running one of the same kind and waits for it to
//! unwind (last-request-wins), because both read and mutate the shared
//! metadata cache.

use std::path::PathBuf;
use std::sync::Arc;

use crate::analysis::{
    analyze_batch, BatchConfig, BatchStats, FilenameAnalyzer, MetadataAnalyzer,
};
use crate::cache::MetadataCache;
use crate::config::Settings;
use crate::duplicates::{DetectionOutcome, DetectorConfig, DuplicateDetector};
use crate::persist::FileStore;
use crate::progress::{ProgressCallback, Tee};
use crate::scanner::{
    FileRecord, PipelineConfig, PipelineError, ScanOptions, ScanOutcome, ScanPipeline,
};
use crate::task::TaskHandle;

/// Result payload of a batch analysis task.
pub type AnalysisOutcome = (Vec<FileRecord>, BatchStats);

/// Owns the collaborators and runs operations in the background.
///
/// # Example
///
/// ```no_run
/// use musorg::cache::MetadataCache;
/// use musorg::config::Settings;
/// use musorg::organizer::Organizer;
/// use musorg::scanner::ScanOptions;
/// use musorg::task::TaskEvent;
/// use std::sync::Arc;
///
/// let settings = Settings::load();
/// let cache = Arc::new(MetadataCache::open(settings.cache_file()));
/// let mut organizer = Organizer::new(settings, cache);
///
/// let handle = organizer.start_scan("/home/user/Samples", ScanOptions::default());
/// for event in handle.events() {
///     match event {
///         TaskEvent::Progress { current, total } => println!("{current}/{total}"),
///         TaskEvent::Completed(result) => {
///             println!("{} records", result.unwrap().records.len());
///             break;
///         }
///     }
/// }
/// ```
pub struct Organizer {
    settings: Settings,
    cache: Arc<MetadataCache>,
    analyzer: Arc<dyn MetadataAnalyzer>,
    store: Option<Arc<dyn FileStore>>,
    progress: Option<Arc<dyn ProgressCallback>>,
    scan_task: Option<TaskHandle<Result<ScanOutcome, PipelineError>>>,
    detect_task: Option<TaskHandle<DetectionOutcome>>,
    analysis_task: Option<TaskHandle<AnalysisOutcome>>,
}

impl Organizer {
    /// Create an organizer around an explicitly constructed cache.
    ///
    /// The built-in [`FilenameAnalyzer`] is used until
    /// [`with_analyzer`](Self::with_analyzer) replaces it.
    #[must_use]
    pub fn new(settings: Settings, cache: Arc<MetadataCache>) -> Self {
        Self {
            settings,
            cache,
            analyzer: Arc::new(FilenameAnalyzer::new()),
            store: None,
            progress: None,
            scan_task: None,
            detect_task: None,
            analysis_task: None,
        }
    }

    /// Replace the metadata analyzer (e.g. with an audio-decoding one).
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: Arc<dyn MetadataAnalyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Attach a persistence collaborator receiving completed scan batches.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn FileStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Attach a display progress callback (fed alongside task events).
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// The shared metadata cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// Start a background scan of `root`, cancelling any running scan
    /// first.
    ///
    /// The returned handle's completion payload is the scan result: `Ok`
    /// with an outcome (possibly `interrupted` with partial records), or
    /// `Err` for fatal failures.
    pub fn start_scan(
        &mut self,
        root: impl Into<PathBuf>,
        options: ScanOptions,
    ) -> &TaskHandle<Result<ScanOutcome, PipelineError>> {
        if let Some(previous) = self.scan_task.take() {
            log::info!("Superseding running scan");
            previous.cancel();
            let _ = previous.wait();
        }

        let root = root.into();
        let cache = Arc::clone(&self.cache);
        let analyzer = Arc::clone(&self.analyzer);
        let store = self.store.clone();
        let audio_extensions = self.settings.audio_extensions.clone();
        let progress = self.progress.clone();

        let task = TaskHandle::spawn("scan", move |ctx| {
            let mut sinks: Vec<Arc<dyn ProgressCallback>> = vec![Arc::new(ctx.clone())];
            if let Some(display) = progress {
                sinks.push(display);
            }
            let config = PipelineConfig::default()
                .with_audio_extensions(audio_extensions)
                .with_shutdown_flag(ctx.cancel_flag())
                .with_progress_callback(Arc::new(Tee::new(sinks)));

            let mut pipeline = ScanPipeline::new(cache, config).with_analyzer(analyzer);
            if let Some(store) = store {
                pipeline = pipeline.with_store(store);
            }
            pipeline.scan(&root, &options)
        });

        self.scan_task.insert(task)
    }

    /// Request cancellation of the running scan, if any. Non-blocking.
    pub fn cancel_scan(&self) {
        if let Some(task) = &self.scan_task {
            task.cancel();
        }
    }

    /// Start background duplicate detection over `records`, cancelling any
    /// running detection first.
    pub fn start_detection(&mut self, records: Vec<FileRecord>) -> &TaskHandle<DetectionOutcome> {
        if let Some(previous) = self.detect_task.take() {
            log::info!("Superseding running detection");
            previous.cancel();
            let _ = previous.wait();
        }

        let cache = Arc::clone(&self.cache);
        let hasher = self.settings.hasher();
        let progress = self.progress.clone();

        let task = TaskHandle::spawn("detect", move |ctx| {
            let mut sinks: Vec<Arc<dyn ProgressCallback>> = vec![Arc::new(ctx.clone())];
            if let Some(display) = progress {
                sinks.push(display);
            }
            let config = DetectorConfig::default()
                .with_cache(cache)
                .with_shutdown_flag(ctx.cancel_flag())
                .with_progress_callback(Arc::new(Tee::new(sinks)));

            DuplicateDetector::new(hasher, config).find(records)
        });

        self.detect_task.insert(task)
    }

    /// Request cancellation of the running detection, if any. Non-blocking.
    pub fn cancel_detection(&self) {
        if let Some(task) = &self.detect_task {
            task.cancel();
        }
    }

    /// Start background re-analysis of `records` on the bounded worker
    /// pool, cancelling any running analysis first.
    pub fn start_analysis(&mut self, records: Vec<FileRecord>) -> &TaskHandle<AnalysisOutcome> {
        if let Some(previous) = self.analysis_task.take() {
            log::info!("Superseding running analysis");
            previous.cancel();
            let _ = previous.wait();
        }

        let cache = Arc::clone(&self.cache);
        let analyzer = Arc::clone(&self.analyzer);
        let threads = self.settings.analysis_threads;
        let progress = self.progress.clone();

        let task = TaskHandle::spawn("analysis", move |ctx| {
            let mut sinks: Vec<Arc<dyn ProgressCallback>> = vec![Arc::new(ctx.clone())];
            if let Some(display) = progress {
                sinks.push(display);
            }
            let config = BatchConfig {
                threads,
                cache: Some(cache),
                shutdown_flag: Some(ctx.cancel_flag()),
                progress_callback: Some(Arc::new(Tee::new(sinks))),
            };
            analyze_batch(records, analyzer, &config)
        });

        self.analysis_task.insert(task)
    }
}
