//! Metadata caching for incremental scans.
//!
//! Rescanning a large sample library must not repeat expensive work (content
//! hashing, metadata analysis) for files that have not changed. The cache
//! maps each file's absolute, normalized path to the payload computed last
//! time, stamped with the `(mod_time, size)` fingerprint observed at that
//! moment.
//!
//! # Invalidation
//!
//! An entry is valid for a file only while the file's current fingerprint
//! exactly equals the stored one. Any mismatch is a miss: the pipeline
//! recomputes and overwrites the entry. There is no eviction; entries for
//! renamed or deleted files linger until the cache file is removed.

pub mod entry;
pub mod store;

pub use entry::{CacheEntry, CachedMetadata};
pub use store::{CacheError, CacheResult, MetadataCache};
