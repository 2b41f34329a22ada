//! Cache entry definitions and validity checks.

use serde::{Deserialize, Serialize};

use crate::analysis::TagMap;

/// The cached payload for one file: everything expensive to recompute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CachedMetadata {
    /// Content hash (hex), if one was computed
    #[serde(default)]
    pub hash: Option<String>,
    /// Tags produced by analyzers
    #[serde(default)]
    pub tags: TagMap,
}

/// One persisted cache record: validity fingerprint plus payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Modification time observed when the entry was written (epoch seconds)
    pub mod_time: f64,
    /// File size observed when the entry was written
    pub size: u64,
    /// The payload computed at that time
    pub data: CachedMetadata,
}

impl CacheEntry {
    /// Create an entry from a freshly observed fingerprint and payload.
    #[must_use]
    pub fn new(mod_time: f64, size: u64, data: CachedMetadata) -> Self {
        Self {
            mod_time,
            size,
            data,
        }
    }

    /// Whether this entry is still valid for a file with the given
    /// fingerprint. Any difference means stale.
    #[must_use]
    pub fn matches(&self, mod_time: f64, size: u64) -> bool {
        self.mod_time == mod_time && self.size == size
    }
}
