//! Bounded-cost content hashing.
//!
//! Hashing an arbitrary user library must never stall the scan: a single
//! multi-gigabyte bounce or a file on a dying disk would otherwise hold up
//! everything behind it. [`ContentHasher`] therefore enforces two budgets on
//! every file: a size cap (checked before any content is read) and a
//! wall-clock timeout (checked between chunks).
//!
//! The result is deliberately an `Option<String>` rather than a `Result`:
//! "too large", "timed out", and "unreadable" all mean the same thing to a
//! caller, namely that this file cannot participate in hash-based duplicate
//! grouping.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::{Duration, Instant};

/// Default read chunk size (64 KiB).
pub const DEFAULT_BLOCK_SIZE: usize = 64 * 1024;

/// Default upper bound on file size eligible for hashing (250 MiB).
pub const DEFAULT_MAX_HASH_SIZE: u64 = 250 * 1024 * 1024;

/// Default per-file hashing timeout.
pub const DEFAULT_HASH_TIMEOUT: Duration = Duration::from_secs(5);

/// Streaming BLAKE3 hasher with size and time budgets.
///
/// # Example
///
/// ```no_run
/// use musorg::scanner::ContentHasher;
/// use std::path::Path;
///
/// let hasher = ContentHasher::default();
/// match hasher.hash_file(Path::new("loop.wav")) {
///     Some(hex) => println!("hash: {hex}"),
///     None => println!("skipped"),
/// }
/// ```
#[derive(Debug, Clone)]
pub struct ContentHasher {
    block_size: usize,
    max_size: u64,
    timeout: Duration,
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            max_size: DEFAULT_MAX_HASH_SIZE,
            timeout: DEFAULT_HASH_TIMEOUT,
        }
    }
}

impl ContentHasher {
    /// Create a hasher with the default budgets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the read chunk size in bytes (minimum 1).
    #[must_use]
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    /// Set the maximum file size eligible for hashing.
    #[must_use]
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Set the per-file wall-clock timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Compute the content hash of a file, or `None` if it was skipped.
    ///
    /// Returns `None` when the file exceeds the size cap (without reading
    /// any content), when hashing exceeds the timeout (the partial digest
    /// is discarded), or on any I/O error. All three cases are equivalent
    /// for duplicate detection.
    #[must_use]
    pub fn hash_file(&self, path: &Path) -> Option<String> {
        let size = match std::fs::metadata(path) {
            Ok(meta) => meta.len(),
            Err(e) => {
                log::warn!("Cannot stat {} for hashing: {}", path.display(), e);
                return None;
            }
        };

        if size > self.max_size {
            log::debug!(
                "Skipping hash for {} ({} bytes over {} byte cap)",
                path.display(),
                size,
                self.max_size
            );
            return None;
        }

        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("Cannot open {} for hashing: {}", path.display(), e);
                return None;
            }
        };

        let mut hasher = blake3::Hasher::new();
        let mut buffer = vec![0u8; self.block_size];
        let started = Instant::now();

        loop {
            if started.elapsed() > self.timeout {
                log::warn!(
                    "Hashing {} timed out after {:?}",
                    path.display(),
                    self.timeout
                );
                return None;
            }
            match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => {
                    hasher.update(&buffer[..n]);
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => {
                    log::warn!("Error reading {} for hashing: {}", path.display(), e);
                    return None;
                }
            }
        }

        Some(hasher.finalize().to_hex().to_string())
    }
}
