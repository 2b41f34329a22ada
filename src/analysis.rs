//! Multi-dimensional tags and pluggable metadata analysis.
//!
//! Tags are an open map of dimension name to values (`"instrument" ->
//! ["KICK"]`, `"bpm" -> ["120"]`) rather than a fixed struct, because
//! analyzers are pluggable and each contributes its own dimensions. This
//! module provides:
//!
//! - [`TagMap`] plus parsing/formatting of the `dimension:value` tag syntax
//! - the [`MetadataAnalyzer`] seam that the scan pipeline calls on cache
//!   misses (an audio-DSP analyzer plugs in here)
//! - [`FilenameAnalyzer`], the built-in analyzer that derives musical key,
//!   BPM, and file type from the file name alone
//! - [`analyze_batch`], parallel re-analysis of an existing record list

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use rayon::prelude::*;
use regex::Regex;

use crate::cache::{CachedMetadata, MetadataCache};
use crate::progress::ProgressCallback;
use crate::scanner::FileRecord;
use crate::task;

/// Open tag schema: dimension name -> list of values.
pub type TagMap = BTreeMap<String, Vec<String>>;

/// Extensions treated as audio unless configured otherwise.
pub const AUDIO_EXTENSIONS: [&str; 5] = [".wav", ".aiff", ".flac", ".mp3", ".ogg"];

/// The [`AUDIO_EXTENSIONS`] list as an owned set.
#[must_use]
pub fn default_audio_extensions() -> std::collections::BTreeSet<String> {
    AUDIO_EXTENSIONS.into_iter().map(String::from).collect()
}

/// Errors from tag-string parsing and validation.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum TagError {
    /// A `dimension:value` token had an empty dimension part.
    #[error("empty dimension in token: {0}")]
    EmptyDimension(String),

    /// A dimension name contained characters outside `[A-Za-z0-9_]`.
    #[error("invalid dimension name: {0}")]
    InvalidDimension(String),
}

/// Errors from a metadata analyzer. Always per-file, never fatal to a scan.
#[derive(thiserror::Error, Debug)]
pub enum AnalysisError {
    /// The file could not be read.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: std::path::PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Per-file metadata extraction strategy.
///
/// The scan pipeline calls this on cache misses for audio files. A failure
/// is logged and the file keeps its base attributes; it never aborts the
/// scan.
pub trait MetadataAnalyzer: Send + Sync {
    /// Extract tags for one file.
    fn analyze(&self, path: &Path) -> Result<TagMap, AnalysisError>;
}

/// Check that a dimension name is usable: non-empty, `[A-Za-z0-9_]+`.
#[must_use]
pub fn validate_dimension(dimension: &str) -> bool {
    !dimension.is_empty()
        && dimension
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Normalize a tag value: strip punctuation, trim, uppercase.
#[must_use]
pub fn normalize_tag(tag: &str) -> String {
    tag.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || *c == '-' || *c == '_')
        .collect::<String>()
        .trim()
        .to_uppercase()
}

/// Parse a user-entered tag string into a [`TagMap`].
///
/// Tokens are separated by `,` or `;`. A token with a colon is split into
/// dimension and value (`inst:kick`); tokens without one land in the
/// `general` dimension. Dimensions are lowercased, values uppercased,
/// duplicates within a dimension dropped.
///
/// # Errors
///
/// Returns [`TagError::EmptyDimension`] for tokens like `:kick`.
pub fn parse_tag_string(input: &str) -> Result<TagMap, TagError> {
    let mut tags = TagMap::new();
    for token in input.split([',', ';']).map(str::trim).filter(|t| !t.is_empty()) {
        let (dimension, value) = match token.split_once(':') {
            Some((dim, value)) => {
                let dim = dim.trim().to_lowercase();
                if dim.is_empty() {
                    return Err(TagError::EmptyDimension(token.to_string()));
                }
                if !validate_dimension(&dim) {
                    return Err(TagError::InvalidDimension(dim));
                }
                (dim, value.trim().to_uppercase())
            }
            None => ("general".to_string(), token.to_uppercase()),
        };
        if value.is_empty() {
            continue;
        }
        let values = tags.entry(dimension).or_default();
        if !values.contains(&value) {
            values.push(value);
        }
    }
    Ok(tags)
}

/// Format a [`TagMap`] as a human-readable string (`Inst: KICK; Key: AM`).
#[must_use]
pub fn format_tag_string(tags: &TagMap) -> String {
    tags.iter()
        .map(|(dimension, values)| {
            let mut label = dimension.clone();
            if let Some(first) = label.get_mut(0..1) {
                first.make_ascii_uppercase();
            }
            format!("{}: {}", label, values.join(", "))
        })
        .collect::<Vec<_>>()
        .join("; ")
}

// Matches a musical key embedded in a file name, e.g. "Amin", "F#-maj",
// "c-sharp_minor". The root must not butt against another letter.
static KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:^|[^a-zA-Z])(?P<root>[A-G](?:[#b]|-sharp|-flat)?)(?:-|_| )?(?P<quality>m(?:in(?:or)?)?|maj(?:or)?|minor|major)?(?:[^a-zA-Z]|$)",
    )
    .unwrap()
});

// Matches "120bpm" / "98 BPM". The suffix is required; a bare 2-3 digit
// number is too often a take counter.
static BPM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?P<bpm>\d{2,3})\s?(?i:bpm)\b").unwrap());

/// Standardize a detected key: `a-sharp`/`Bb` roots, `min`/`maj` qualities.
fn unify_detected_key(root: &str, quality: &str) -> String {
    let root = root
        .to_lowercase()
        .replace("-sharp", "#")
        .replace("-flat", "b");
    let mut normalized = String::with_capacity(root.len());
    let mut chars = root.chars();
    if let Some(first) = chars.next() {
        normalized.push(first.to_ascii_uppercase());
    }
    normalized.extend(chars);

    match quality.to_lowercase().as_str() {
        "" => normalized,
        "maj" | "major" => format!("{normalized}maj"),
        // "m", "min", "minor" and anything else the pattern let through
        _ => format!("{normalized}m"),
    }
}

/// Detect a musical key from a file name, if one is present.
///
/// File names containing `--` opt out of detection (the original library
/// convention for names that would otherwise false-positive).
#[must_use]
pub fn detect_key_from_filename(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    if stem.contains("--") {
        return None;
    }
    let caps = KEY_RE.captures(stem)?;
    let root = caps.name("root")?.as_str();
    let quality = caps.name("quality").map_or("", |m| m.as_str());
    Some(unify_detected_key(root, quality))
}

/// Detect a BPM annotation from a file name, if one is present.
#[must_use]
pub fn detect_bpm_from_filename(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    let caps = BPM_RE.captures(stem)?;
    caps.name("bpm")?.as_str().parse().ok()
}

/// Built-in analyzer deriving tags from the file name and a cheap header
/// check, with no audio decoding.
///
/// Contributes the `filetype` dimension for every file, `key` and `bpm`
/// when the name carries them, and `invalid_audio` for WAV files whose
/// header is not RIFF (those are also excluded from key/BPM tagging).
#[derive(Debug, Clone, Default)]
pub struct FilenameAnalyzer;

impl FilenameAnalyzer {
    /// Create the analyzer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl MetadataAnalyzer for FilenameAnalyzer {
    fn analyze(&self, path: &Path) -> Result<TagMap, AnalysisError> {
        let mut tags = TagMap::new();

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()));
        if let Some(ext) = &extension {
            tags.insert("filetype".to_string(), vec![ext.clone()]);
        }

        // Quick WAV header check: a .wav that does not start with RIFF is
        // marked invalid and skipped for further tagging.
        if extension.as_deref() == Some(".wav") {
            let mut header = [0u8; 4];
            let mut file = std::fs::File::open(path).map_err(|source| AnalysisError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let read = file.read(&mut header).map_err(|source| AnalysisError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            if read < 4 || &header != b"RIFF" {
                log::warn!("Invalid WAV header: {}", path.display());
                tags.insert("invalid_audio".to_string(), vec!["true".to_string()]);
                return Ok(tags);
            }
        }

        if let Some(key) = detect_key_from_filename(path) {
            tags.insert("key".to_string(), vec![key]);
        }
        if let Some(bpm) = detect_bpm_from_filename(path) {
            tags.insert("bpm".to_string(), vec![bpm.to_string()]);
        }

        Ok(tags)
    }
}

/// Configuration for batch re-analysis.
#[derive(Clone, Default)]
pub struct BatchConfig {
    /// Worker threads (0 = min(cores, 4)).
    pub threads: usize,
    /// Optional metadata cache to write results back into.
    pub cache: Option<Arc<MetadataCache>>,
    /// Optional cancellation flag.
    pub shutdown_flag: Option<Arc<std::sync::atomic::AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchConfig")
            .field("threads", &self.threads)
            .field("cache", &self.cache.as_ref().map(|_| "<cache>"))
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Statistics from a batch analysis pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Records that entered the batch
    pub input_files: usize,
    /// Records whose tags were updated
    pub analyzed: usize,
    /// Records whose analysis failed (left unchanged)
    pub failed: usize,
    /// Whether the batch was interrupted by cancellation
    pub interrupted: bool,
}

/// Re-run an analyzer over a record list on a bounded worker pool.
///
/// Each record is analyzed independently; failures leave the record
/// unchanged. Results are merged into the records' tags and written back to
/// the cache (under its own lock) when one is configured. Cancellation
/// passes remaining records through untouched.
#[must_use]
pub fn analyze_batch(
    records: Vec<FileRecord>,
    analyzer: Arc<dyn MetadataAnalyzer>,
    config: &BatchConfig,
) -> (Vec<FileRecord>, BatchStats) {
    let mut stats = BatchStats {
        input_files: records.len(),
        ..Default::default()
    };

    if records.is_empty() {
        return (records, stats);
    }

    if let Some(callback) = &config.progress_callback {
        callback.on_phase_start("analysis", records.len());
    }

    let pool = task::io_pool(config.threads);
    let total = records.len();
    let processed = AtomicUsize::new(0);

    let results: Vec<(FileRecord, Option<bool>)> = pool.install(|| {
        records
            .into_par_iter()
            .map(|mut record| {
                if config.is_shutdown_requested() {
                    return (record, None);
                }

                let outcome = match analyzer.analyze(&record.path) {
                    Ok(tags) => {
                        for (dimension, values) in tags {
                            record.tags.insert(dimension, values);
                        }
                        if let Some(cache) = &config.cache {
                            cache.update(
                                &record.path,
                                record.mod_time_secs(),
                                record.size,
                                CachedMetadata {
                                    hash: record.hash.clone(),
                                    tags: record.tags.clone(),
                                },
                            );
                        }
                        true
                    }
                    Err(e) => {
                        log::warn!("Analysis failed for {}: {}", record.path.display(), e);
                        false
                    }
                };

                let done = processed.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(callback) = &config.progress_callback {
                    callback.on_progress(done, total);
                }
                (record, Some(outcome))
            })
            .collect()
    });

    let mut updated = Vec::with_capacity(results.len());
    for (record, outcome) in results {
        match outcome {
            Some(true) => stats.analyzed += 1,
            Some(false) => stats.failed += 1,
            None => stats.interrupted = true,
        }
        updated.push(record);
    }

    if let Some(cache) = &config.cache {
        if let Err(e) = cache.flush() {
            log::warn!("Failed to flush cache after batch analysis: {}", e);
        }
    }

    if let Some(callback) = &config.progress_callback {
        callback.on_phase_end("analysis");
    }

    (updated, stats)
}
