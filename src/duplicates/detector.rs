//! Two-stage duplicate detector.
//!
//! Stage 1 buckets records by size and throws away singletons unhashed.
//! Stage 2 hashes only the members of multi-file buckets, lazily per
//! bucket, then partitions each bucket by hash value. Hashes come from the
//! record itself when a scan already computed one, from the metadata cache
//! when the fingerprint still matches, and from [`ContentHasher`] as a last
//! resort; fresh hashes are written back to the cache.
//!
//! Cancellation semantics differ from the scan pipeline on purpose: a
//! partial duplicate list is dangerous (a user could delete a file whose
//! twin was never discovered), so a cancelled detection returns no groups
//! at all.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CachedMetadata, MetadataCache};
use crate::progress::ProgressCallback;
use crate::scanner::{ContentHasher, FileRecord};

use super::{group_by_size, DuplicateGroup};

/// How often detection progress is reported, in files.
pub const DETECT_PROGRESS_EVERY: usize = 5;

/// Detector configuration.
#[derive(Clone, Default)]
pub struct DetectorConfig {
    /// Optional metadata cache consulted before hashing and updated after.
    pub cache: Option<Arc<MetadataCache>>,
    /// Optional cancellation flag checked between buckets and hashes.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback.
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for DetectorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorConfig")
            .field("cache", &self.cache.as_ref().map(|_| "<cache>"))
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl DetectorConfig {
    /// Set the metadata cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<MetadataCache>) -> Self {
        self.cache = Some(cache);
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

/// Statistics from a detection run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectionStats {
    /// Records that entered detection
    pub input_files: usize,
    /// Records eliminated by unique size, never hashed
    pub eliminated_by_size: usize,
    /// Records that entered the hashing stage
    pub hash_candidates: usize,
    /// Hashes computed fresh by the hasher
    pub hashed_files: usize,
    /// Hashes reused from the records themselves
    pub reused_hashes: usize,
    /// Hashes served by the metadata cache
    pub cache_hits: usize,
    /// Records whose hash came back unavailable (too large, timeout, I/O)
    pub hash_skipped: usize,
    /// Confirmed duplicate files beyond each group's first copy
    pub duplicate_files: usize,
    /// Bytes reclaimable across all groups
    pub wasted_space: u64,
    /// Whether detection was cancelled (groups are empty in that case)
    pub interrupted: bool,
}

/// Result of a detection run: groups plus stats and timing.
#[derive(Debug, Default)]
pub struct DetectionOutcome {
    /// Confirmed duplicate groups; empty when `stats.interrupted`
    pub groups: Vec<DuplicateGroup>,
    /// Run statistics
    pub stats: DetectionStats,
    /// Wall-clock duration of the run
    pub duration: Duration,
}

/// Groups file records into sets of identical files.
///
/// # Example
///
/// ```no_run
/// use musorg::duplicates::{DetectorConfig, DuplicateDetector};
/// use musorg::scanner::ContentHasher;
///
/// let detector = DuplicateDetector::new(ContentHasher::default(), DetectorConfig::default());
/// let outcome = detector.find(vec![]);
/// println!("{} duplicate groups", outcome.groups.len());
/// ```
pub struct DuplicateDetector {
    hasher: ContentHasher,
    config: DetectorConfig,
}

impl DuplicateDetector {
    /// Create a detector with the given hasher and configuration.
    #[must_use]
    pub fn new(hasher: ContentHasher, config: DetectorConfig) -> Self {
        Self { hasher, config }
    }

    /// Find duplicate groups among `records`.
    ///
    /// Membership is deterministic for unchanged file contents; the order
    /// of groups and of members within a group is not specified. On
    /// cancellation the outcome has no groups and `stats.interrupted` set.
    #[must_use]
    pub fn find(&self, records: Vec<FileRecord>) -> DetectionOutcome {
        let started = std::time::Instant::now();
        let mut outcome = DetectionOutcome {
            stats: DetectionStats {
                input_files: records.len(),
                ..Default::default()
            },
            ..Default::default()
        };

        log::info!("Finding duplicates among {} records", records.len());

        let (buckets, grouping) = group_by_size(records);
        outcome.stats.eliminated_by_size = grouping.eliminated_unique;
        outcome.stats.hash_candidates = grouping.potential_duplicates;

        log::debug!(
            "Size stage: {} buckets, {} candidates, {:.1}% eliminated",
            buckets.len(),
            grouping.potential_duplicates,
            grouping.elimination_rate()
        );

        if let Some(callback) = &self.config.progress_callback {
            callback.on_phase_start("hashing", grouping.potential_duplicates);
        }

        let total = grouping.potential_duplicates;
        let mut processed = 0usize;
        let mut groups = Vec::new();

        'buckets: for (size, members) in buckets {
            if self.config.is_shutdown_requested() {
                outcome.stats.interrupted = true;
                break 'buckets;
            }

            let mut by_hash: std::collections::HashMap<String, Vec<FileRecord>> =
                std::collections::HashMap::new();

            for mut record in members {
                if self.config.is_shutdown_requested() {
                    outcome.stats.interrupted = true;
                    break 'buckets;
                }

                match self.resolve_hash(&mut record, &mut outcome.stats) {
                    Some(hash) => by_hash.entry(hash).or_default().push(record),
                    None => outcome.stats.hash_skipped += 1,
                }

                processed += 1;
                if processed % DETECT_PROGRESS_EVERY == 0 {
                    if let Some(callback) = &self.config.progress_callback {
                        callback.on_progress(processed, total);
                    }
                }
            }

            for (hash, files) in by_hash {
                if files.len() > 1 {
                    log::debug!("Duplicate group ({} bytes): {} files", size, files.len());
                    groups.push(DuplicateGroup::new(hash, size, files));
                }
            }
        }

        if self.config.is_shutdown_requested() {
            outcome.stats.interrupted = true;
        }

        if outcome.stats.interrupted {
            // A partial group list must never reach a caller.
            log::info!("Duplicate detection cancelled, discarding partial groups");
            groups.clear();
        } else {
            outcome.stats.duplicate_files = groups.iter().map(DuplicateGroup::duplicate_count).sum();
            outcome.stats.wasted_space = groups.iter().map(DuplicateGroup::wasted_space).sum();
        }

        if let Some(cache) = &self.config.cache {
            if let Err(e) = cache.flush() {
                log::warn!("Failed to flush cache after detection: {}", e);
            }
        }

        if let Some(callback) = &self.config.progress_callback {
            callback.on_progress(processed, total);
            callback.on_phase_end("hashing");
        }

        outcome.groups = groups;
        outcome.duration = started.elapsed();
        log::info!(
            "Detection {}: {} groups, {} duplicate files, {} bytes reclaimable in {:.1?}",
            if outcome.stats.interrupted {
                "cancelled"
            } else {
                "complete"
            },
            outcome.groups.len(),
            outcome.stats.duplicate_files,
            outcome.stats.wasted_space,
            outcome.duration
        );

        outcome
    }

    /// Get a hash for the record: reuse, cache, or compute. `None` means
    /// the file cannot participate in hash grouping.
    fn resolve_hash(&self, record: &mut FileRecord, stats: &mut DetectionStats) -> Option<String> {
        if let Some(hash) = &record.hash {
            stats.reused_hashes += 1;
            return Some(hash.clone());
        }

        let mod_time = record.mod_time_secs();
        if let Some(cache) = &self.config.cache {
            if let Some(cached) = cache.get(&record.path, mod_time, record.size) {
                if let Some(hash) = cached.hash {
                    stats.cache_hits += 1;
                    record.hash = Some(hash.clone());
                    return Some(hash);
                }
            }
        }

        let hash = self.hasher.hash_file(&record.path)?;
        stats.hashed_files += 1;
        record.hash = Some(hash.clone());

        if let Some(cache) = &self.config.cache {
            cache.update(
                &record.path,
                mod_time,
                record.size,
                CachedMetadata {
                    hash: record.hash.clone(),
                    tags: record.tags.clone(),
                },
            );
        }

        Some(hash)
    }
}
