//! End-to-end scan pipeline tests: incremental caching, invalidation,
//! cancellation, and fatal-error behavior.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use musorg::analysis::{AnalysisError, FilenameAnalyzer, MetadataAnalyzer, TagMap};
use musorg::cache::MetadataCache;
use musorg::scanner::{PipelineConfig, PipelineError, ScanOptions, ScanPipeline};
use tempfile::TempDir;

/// Wraps the filename analyzer and counts invocations, so tests can prove
/// that cache hits skip analysis entirely.
struct CountingAnalyzer {
    inner: FilenameAnalyzer,
    calls: AtomicUsize,
}

impl CountingAnalyzer {
    fn new() -> Self {
        Self {
            inner: FilenameAnalyzer::new(),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MetadataAnalyzer for CountingAnalyzer {
    fn analyze(&self, path: &Path) -> Result<TagMap, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.analyze(path)
    }
}

/// A scratch library: three audio files plus one text file, with the cache
/// kept outside the scanned tree.
fn library(dir: &TempDir) -> std::path::PathBuf {
    let tree = dir.path().join("tree");
    std::fs::create_dir(&tree).unwrap();
    std::fs::write(tree.join("kick_Am_120bpm.wav"), b"RIFF....WAVEkick").unwrap();
    std::fs::write(tree.join("snare.flac"), b"snare body").unwrap();
    std::fs::write(tree.join("loop_Fmaj.ogg"), b"loop body").unwrap();
    std::fs::write(tree.join("README.txt"), b"not audio").unwrap();
    tree
}

fn pipeline_with(
    dir: &TempDir,
    analyzer: Arc<dyn MetadataAnalyzer>,
) -> (ScanPipeline, Arc<MetadataCache>) {
    let cache = Arc::new(MetadataCache::open(dir.path().join("cache.json")));
    let pipeline =
        ScanPipeline::new(Arc::clone(&cache), PipelineConfig::default()).with_analyzer(analyzer);
    (pipeline, cache)
}

#[test]
fn test_first_scan_all_misses() {
    let dir = TempDir::new().unwrap();
    let tree = library(&dir);
    let analyzer = Arc::new(CountingAnalyzer::new());
    let (pipeline, cache) = pipeline_with(&dir, analyzer.clone());

    let outcome = pipeline.scan(&tree, &ScanOptions::default()).unwrap();

    assert_eq!(outcome.records.len(), 4);
    assert_eq!(outcome.cache_hits, 0);
    assert_eq!(outcome.cache_misses, 4);
    // Only the three audio files reach the analyzer.
    assert_eq!(analyzer.calls(), 3);
    assert_eq!(cache.len(), 4);

    let kick = outcome
        .records
        .iter()
        .find(|r| r.path.ends_with("kick_Am_120bpm.wav"))
        .unwrap();
    assert_eq!(kick.tags["key"], vec!["Am"]);
    assert_eq!(kick.tags["bpm"], vec!["120"]);
}

#[test]
fn test_rescan_unchanged_is_all_hits() {
    let dir = TempDir::new().unwrap();
    let tree = library(&dir);
    let analyzer = Arc::new(CountingAnalyzer::new());
    let (pipeline, _cache) = pipeline_with(&dir, analyzer.clone());

    pipeline.scan(&tree, &ScanOptions::default()).unwrap();
    let first_calls = analyzer.calls();

    let second = pipeline.scan(&tree, &ScanOptions::default()).unwrap();

    assert_eq!(second.cache_hits, 4);
    assert_eq!(second.cache_misses, 0);
    assert_eq!(second.hit_rate(), 100.0);
    // No analyzer work on a fully cached rescan.
    assert_eq!(analyzer.calls(), first_calls);
    // Cached tags come back with the records.
    let kick = second
        .records
        .iter()
        .find(|r| r.path.ends_with("kick_Am_120bpm.wav"))
        .unwrap();
    assert_eq!(kick.tags["key"], vec!["Am"]);
}

#[test]
fn test_cache_survives_pipeline_restart() {
    let dir = TempDir::new().unwrap();
    let tree = library(&dir);
    let analyzer = Arc::new(CountingAnalyzer::new());

    {
        let (pipeline, _cache) = pipeline_with(&dir, analyzer.clone());
        pipeline.scan(&tree, &ScanOptions::default()).unwrap();
    }

    // A fresh cache instance loads the flushed state from disk.
    let (pipeline, _cache) = pipeline_with(&dir, analyzer.clone());
    let outcome = pipeline.scan(&tree, &ScanOptions::default()).unwrap();

    assert_eq!(outcome.cache_hits, 4);
    assert_eq!(outcome.cache_misses, 0);
}

#[test]
fn test_modified_file_is_the_only_miss() {
    let dir = TempDir::new().unwrap();
    let tree = library(&dir);
    let analyzer = Arc::new(CountingAnalyzer::new());
    let (pipeline, _cache) = pipeline_with(&dir, analyzer);

    pipeline.scan(&tree, &ScanOptions::default()).unwrap();

    // Change one file's content and size; its fingerprint no longer
    // matches.
    std::fs::write(tree.join("snare.flac"), b"snare body, re-exported longer").unwrap();

    let outcome = pipeline.scan(&tree, &ScanOptions::default()).unwrap();
    assert_eq!(outcome.cache_misses, 1);
    assert_eq!(outcome.cache_hits, 3);
}

#[test]
fn test_skip_analysis_option() {
    let dir = TempDir::new().unwrap();
    let tree = library(&dir);
    let analyzer = Arc::new(CountingAnalyzer::new());
    let (pipeline, _cache) = pipeline_with(&dir, analyzer.clone());

    let options = ScanOptions {
        analyze_audio: false,
    };
    let outcome = pipeline.scan(&tree, &options).unwrap();

    assert_eq!(outcome.records.len(), 4);
    assert_eq!(analyzer.calls(), 0);
}

#[test]
fn test_cancelled_scan_reports_partial() {
    let dir = TempDir::new().unwrap();
    let tree = library(&dir);
    let cache = Arc::new(MetadataCache::open(dir.path().join("cache.json")));

    let flag = Arc::new(AtomicBool::new(true));
    let config = PipelineConfig::default().with_shutdown_flag(flag);
    let pipeline = ScanPipeline::new(Arc::clone(&cache), config);

    let outcome = pipeline.scan(&tree, &ScanOptions::default()).unwrap();

    assert!(outcome.interrupted);
    // Nothing was processed, so nothing may be cached.
    assert!(outcome.records.is_empty());
    assert!(cache.is_empty());
    // The flush still happened: the cache file exists (empty).
    assert!(dir.path().join("cache.json").exists());
}

#[test]
fn test_missing_root_is_fatal() {
    let dir = TempDir::new().unwrap();
    let cache = Arc::new(MetadataCache::open(dir.path().join("cache.json")));
    let pipeline = ScanPipeline::new(cache, PipelineConfig::default());

    let result = pipeline.scan(Path::new("/no/such/dir"), &ScanOptions::default());
    assert!(matches!(result, Err(PipelineError::RootNotFound(_))));
}

#[test]
fn test_file_root_is_fatal() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("not_a_dir.wav");
    std::fs::write(&file, b"x").unwrap();

    let cache = Arc::new(MetadataCache::open(dir.path().join("cache.json")));
    let pipeline = ScanPipeline::new(cache, PipelineConfig::default());

    let result = pipeline.scan(&file, &ScanOptions::default());
    assert!(matches!(result, Err(PipelineError::NotADirectory(_))));
}

#[test]
fn test_scan_persists_to_store() {
    use musorg::persist::{FileStore, SqliteStore};

    let dir = TempDir::new().unwrap();
    let tree = library(&dir);
    let store = Arc::new(SqliteStore::open(&dir.path().join("library.db")).unwrap());

    let cache = Arc::new(MetadataCache::open(dir.path().join("cache.json")));
    let pipeline = ScanPipeline::new(cache, PipelineConfig::default())
        .with_store(Arc::clone(&store) as Arc<dyn FileStore>);

    pipeline.scan(&tree, &ScanOptions::default()).unwrap();

    assert_eq!(store.count().unwrap(), 4);
}
