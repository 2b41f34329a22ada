//! Scanner module: file discovery, metadata records, and content hashing.
//!
//! The scanner is divided into submodules:
//! - [`walker`]: recursive directory traversal and file discovery
//! - [`hasher`]: bounded-cost content hashing
//! - [`pipeline`]: the incremental scan-and-cache pipeline
//! - [`path_utils`]: Unicode path normalization for cache keys
//!
//! # Example
//!
//! ```no_run
//! use musorg::scanner::{Walker, WalkerConfig};
//! use std::path::Path;
//!
//! let walker = Walker::new(Path::new("/home/user/Samples"), WalkerConfig::default());
//! for entry in walker.walk() {
//!     match entry {
//!         Ok(record) => println!("{}: {} bytes", record.path.display(), record.size),
//!         Err(e) => eprintln!("Warning: {}", e),
//!     }
//! }
//! ```

pub mod hasher;
pub mod path_utils;
pub mod pipeline;
pub mod walker;

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::analysis::TagMap;

pub use hasher::ContentHasher;
pub use pipeline::{PipelineConfig, PipelineError, ScanOptions, ScanOutcome, ScanPipeline};
pub use walker::Walker;

/// One entry per filesystem file discovered by a scan.
///
/// Created with base attributes (path, size, mtime) during the walk, then
/// enriched in place from the metadata cache or by analyzers. The content
/// hash stays `None` until something actually needs it; `None` also covers
/// "hashing was skipped or failed".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Absolute, normalized path (unique within a scan)
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
    /// Content hash (hex), if computed
    #[serde(default)]
    pub hash: Option<String>,
    /// Multi-dimensional tags (dimension -> values), populated by analyzers
    #[serde(default)]
    pub tags: TagMap,
}

impl FileRecord {
    /// Create a record with base attributes only.
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: SystemTime) -> Self {
        Self {
            path,
            size,
            modified,
            hash: None,
            tags: TagMap::new(),
        }
    }

    /// Modification time as fractional seconds since the Unix epoch.
    ///
    /// This is the cache fingerprint form. Pre-epoch timestamps collapse
    /// to 0.0.
    #[must_use]
    pub fn mod_time_secs(&self) -> f64 {
        mod_time_secs(self.modified)
    }

    /// Lowercased file extension including the leading dot, if any.
    #[must_use]
    pub fn extension(&self) -> Option<String> {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
    }
}

/// Convert a [`SystemTime`] to fractional seconds since the Unix epoch.
#[must_use]
pub fn mod_time_secs(time: SystemTime) -> f64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// Errors that can occur while enumerating or stat-ing files.
///
/// During a scan these are collected per entry, logged, and skipped; one bad
/// subtree never aborts the whole walk.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// Permission was denied when accessing a file or directory.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// The file vanished between discovery and stat.
    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    /// An I/O error occurred while accessing a file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Configuration for directory walking.
#[derive(Debug, Clone, Default)]
pub struct WalkerConfig {
    /// Follow symbolic links during traversal.
    /// Warning: symlink cycles are not detected.
    pub follow_symlinks: bool,

    /// Skip hidden files and directories (names starting with `.`).
    pub skip_hidden: bool,

    /// Glob patterns to ignore (gitignore-style).
    pub ignore_patterns: Vec<String>,
}
