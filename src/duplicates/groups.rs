//! Size grouping and duplicate group types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::scanner::FileRecord;

/// Statistics from the size-grouping stage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupingStats {
    /// Records that entered grouping
    pub total_files: usize,
    /// Records discarded because their size was unique
    pub eliminated_unique: usize,
    /// Records left in multi-file buckets
    pub potential_duplicates: usize,
}

impl GroupingStats {
    /// Percentage of input eliminated without any hashing.
    #[must_use]
    pub fn elimination_rate(&self) -> f64 {
        if self.total_files == 0 {
            0.0
        } else {
            (self.eliminated_unique as f64 / self.total_files as f64) * 100.0
        }
    }
}

/// Partition records by exact size, dropping single-member buckets.
///
/// This is the cheap first stage of duplicate detection: a file whose size
/// is unique cannot have a duplicate and never needs hashing.
#[must_use]
pub fn group_by_size(records: Vec<FileRecord>) -> (HashMap<u64, Vec<FileRecord>>, GroupingStats) {
    let mut stats = GroupingStats {
        total_files: records.len(),
        ..Default::default()
    };

    let mut buckets: HashMap<u64, Vec<FileRecord>> = HashMap::new();
    for record in records {
        buckets.entry(record.size).or_default().push(record);
    }

    buckets.retain(|_, members| {
        if members.len() > 1 {
            stats.potential_duplicates += members.len();
            true
        } else {
            stats.eliminated_unique += 1;
            false
        }
    });

    (buckets, stats)
}

/// A confirmed set of files with identical size and identical content hash.
///
/// Membership is a partition: no record appears in two groups. Group order
/// and member order carry no meaning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    /// Shared content hash (hex)
    pub hash: String,
    /// Shared file size in bytes
    pub size: u64,
    /// The duplicate files, at least two
    pub files: Vec<FileRecord>,
}

impl DuplicateGroup {
    /// Create a group from a confirmed hash bucket.
    #[must_use]
    pub fn new(hash: String, size: u64, files: Vec<FileRecord>) -> Self {
        Self { hash, size, files }
    }

    /// Number of files in the group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the group is empty (never true for emitted groups).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Copies beyond the first, i.e. how many files could be removed.
    #[must_use]
    pub fn duplicate_count(&self) -> usize {
        self.files.len().saturating_sub(1)
    }

    /// Bytes reclaimable by keeping a single copy.
    #[must_use]
    pub fn wasted_space(&self) -> u64 {
        self.size * self.duplicate_count() as u64
    }
}
