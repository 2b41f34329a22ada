//! Duplicate detection: size grouping then hash confirmation.
//!
//! Files can only be duplicates if they are exactly the same size, so the
//! detector first buckets records by size and discards singletons without
//! touching their content. Only members of multi-file buckets are hashed,
//! and equal hashes within a bucket confirm a [`DuplicateGroup`].

pub mod detector;
pub mod groups;

pub use detector::{DetectionOutcome, DetectionStats, DetectorConfig, DuplicateDetector};
pub use groups::{group_by_size, DuplicateGroup, GroupingStats};
