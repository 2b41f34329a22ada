//! JSON-file-backed metadata cache.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::{CacheEntry, CachedMetadata};
use crate::scanner::path_utils::canonical_key;

/// Errors from cache persistence. Load failures are not represented here;
/// they downgrade to an empty cache.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// The backing file could not be written.
    #[error("cannot write cache file {path}: {source}")]
    Io {
        /// The cache file path
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The in-memory cache could not be serialized.
    #[error("cannot serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Persistent map from file path to previously computed metadata.
///
/// Lookups return the payload only when the stored `(mod_time, size)`
/// fingerprint exactly matches the file's current one. Mutation is guarded
/// by a single lock so scan workers can write back concurrently. Nothing is
/// persisted until [`flush`](Self::flush) runs; the pipeline calls it at
/// scan checkpoints rather than per entry.
///
/// The cache grows without bound: entries keyed by paths that no longer
/// exist are kept until the backing file is deleted.
pub struct MetadataCache {
    path: PathBuf,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl std::fmt::Debug for MetadataCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataCache")
            .field("path", &self.path)
            .field("entries", &self.len())
            .finish()
    }
}

impl MetadataCache {
    /// Open a cache backed by the given file, loading any persisted state.
    ///
    /// A missing file is a cold start; an unreadable or corrupt file resets
    /// the cache to empty with a warning. Neither is an error.
    #[must_use]
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = Self::load(&path);
        Self {
            path,
            entries: Mutex::new(entries),
        }
    }

    fn load(path: &Path) -> HashMap<String, CacheEntry> {
        if !path.exists() {
            log::debug!("No cache file at {}, starting cold", path.display());
            return HashMap::new();
        }
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                log::warn!("Failed reading cache {}: {}", path.display(), e);
                return HashMap::new();
            }
        };
        match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                log::warn!(
                    "Corrupt cache {}, resetting to empty: {}",
                    path.display(),
                    e
                );
                HashMap::new()
            }
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn file_path(&self) -> &Path {
        &self.path
    }

    /// Look up the cached payload for a file, validating the fingerprint.
    ///
    /// Returns `None` on a miss or when the stored fingerprint differs from
    /// the given one (stale entry).
    #[must_use]
    pub fn get(&self, path: &Path, mod_time: f64, size: u64) -> Option<CachedMetadata> {
        let key = canonical_key(path);
        let entries = self.entries.lock().unwrap();
        match entries.get(&key) {
            Some(entry) if entry.matches(mod_time, size) => {
                log::trace!("Cache hit: {}", key);
                Some(entry.data.clone())
            }
            Some(_) => {
                log::trace!("Cache stale: {}", key);
                None
            }
            None => {
                log::trace!("Cache miss: {}", key);
                None
            }
        }
    }

    /// Create or overwrite the entry for a file with a new fingerprint and
    /// payload. Safe to call from multiple workers.
    pub fn update(&self, path: &Path, mod_time: f64, size: u64, data: CachedMetadata) {
        let key = canonical_key(path);
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key, CacheEntry::new(mod_time, size, data));
    }

    /// Persist the entire cache to the backing file.
    ///
    /// Called explicitly at scan checkpoints; there is no autosave.
    pub fn flush(&self) -> CacheResult<()> {
        let entries = self.entries.lock().unwrap();
        let json = serde_json::to_string_pretty(&*entries)?;
        drop(entries);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                    path: self.path.clone(),
                    source,
                })?;
            }
        }
        std::fs::write(&self.path, json).map_err(|source| CacheError::Io {
            path: self.path.clone(),
            source,
        })?;
        log::debug!("Flushed cache to {}", self.path.display());
        Ok(())
    }

    /// Number of entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
