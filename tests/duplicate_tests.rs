//! End-to-end duplicate detection tests over real directory trees.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use musorg::cache::MetadataCache;
use musorg::duplicates::{DetectorConfig, DuplicateDetector};
use musorg::scanner::{ContentHasher, FileRecord, PipelineConfig, ScanOptions, ScanPipeline};
use tempfile::TempDir;

fn scan(dir: &TempDir, tree: &std::path::Path) -> Vec<FileRecord> {
    let cache = Arc::new(MetadataCache::open(dir.path().join("cache.json")));
    let pipeline = ScanPipeline::new(cache, PipelineConfig::default());
    let options = ScanOptions {
        analyze_audio: false,
    };
    pipeline.scan(tree, &options).unwrap().records
}

fn detector() -> DuplicateDetector {
    DuplicateDetector::new(ContentHasher::default(), DetectorConfig::default())
}

#[test]
fn test_equal_content_pair_found() {
    let dir = TempDir::new().unwrap();
    let tree = dir.path().join("tree");
    std::fs::create_dir(&tree).unwrap();
    // a and b share length and content; c has a different length.
    std::fs::write(tree.join("a.txt"), b"X").unwrap();
    std::fs::write(tree.join("b.txt"), b"X").unwrap();
    std::fs::write(tree.join("c.txt"), b"YY").unwrap();

    let outcome = detector().find(scan(&dir, &tree));

    assert_eq!(outcome.groups.len(), 1);
    let group = &outcome.groups[0];
    assert_eq!(group.len(), 2);
    let mut names: Vec<_> = group
        .files
        .iter()
        .map(|f| f.path.file_name().unwrap().to_str().unwrap().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["a.txt", "b.txt"]);
}

#[test]
fn test_same_size_different_content_not_grouped() {
    let dir = TempDir::new().unwrap();
    let tree = dir.path().join("tree");
    std::fs::create_dir(&tree).unwrap();
    std::fs::write(tree.join("a.wav"), b"aaaa").unwrap();
    std::fs::write(tree.join("b.wav"), b"bbbb").unwrap();

    let outcome = detector().find(scan(&dir, &tree));

    assert!(outcome.groups.is_empty());
    // Both were hashed to tell them apart.
    assert_eq!(outcome.stats.hash_candidates, 2);
}

#[test]
fn test_all_sizes_unique_no_hashing() {
    let dir = TempDir::new().unwrap();
    let tree = dir.path().join("tree");
    std::fs::create_dir(&tree).unwrap();
    std::fs::write(tree.join("a.wav"), b"1").unwrap();
    std::fs::write(tree.join("b.wav"), b"22").unwrap();
    std::fs::write(tree.join("c.wav"), b"333").unwrap();

    let outcome = detector().find(scan(&dir, &tree));

    assert!(outcome.groups.is_empty());
    assert_eq!(outcome.stats.eliminated_by_size, 3);
    assert_eq!(outcome.stats.hash_candidates, 0);
    assert_eq!(outcome.stats.hashed_files, 0);
    assert_eq!(outcome.stats.cache_hits, 0);
}

#[test]
fn test_oversized_identical_twins_excluded() {
    let dir = TempDir::new().unwrap();
    let tree = dir.path().join("tree");
    std::fs::create_dir(&tree).unwrap();
    std::fs::write(tree.join("a.bin"), vec![9u8; 8192]).unwrap();
    std::fs::write(tree.join("b.bin"), vec![9u8; 8192]).unwrap();

    // A cap below the file size forces the hasher to skip both.
    let hasher = ContentHasher::new().with_max_size(4096);
    let detector = DuplicateDetector::new(hasher, DetectorConfig::default());
    let outcome = detector.find(scan(&dir, &tree));

    assert!(outcome.groups.is_empty());
    assert_eq!(outcome.stats.hash_skipped, 2);
}

#[test]
fn test_three_way_group_and_accounting() {
    let dir = TempDir::new().unwrap();
    let tree = dir.path().join("tree");
    std::fs::create_dir(&tree).unwrap();
    let body = b"identical sample data";
    std::fs::write(tree.join("a.wav"), body).unwrap();
    std::fs::write(tree.join("a2.wav"), body).unwrap();
    std::fs::write(tree.join("a3.wav"), body).unwrap();

    let outcome = detector().find(scan(&dir, &tree));

    assert_eq!(outcome.groups.len(), 1);
    assert_eq!(outcome.groups[0].len(), 3);
    assert_eq!(outcome.stats.duplicate_files, 2);
    assert_eq!(
        outcome.stats.wasted_space,
        2 * body.len() as u64
    );
}

#[test]
fn test_membership_is_a_partition() {
    let dir = TempDir::new().unwrap();
    let tree = dir.path().join("tree");
    std::fs::create_dir(&tree).unwrap();
    // Two groups of two, same size across all four files.
    std::fs::write(tree.join("a1.wav"), b"AAAA").unwrap();
    std::fs::write(tree.join("a2.wav"), b"AAAA").unwrap();
    std::fs::write(tree.join("b1.wav"), b"BBBB").unwrap();
    std::fs::write(tree.join("b2.wav"), b"BBBB").unwrap();

    let outcome = detector().find(scan(&dir, &tree));

    assert_eq!(outcome.groups.len(), 2);
    let mut all_paths = Vec::new();
    for group in &outcome.groups {
        assert!(group.len() >= 2);
        for file in &group.files {
            assert_eq!(file.size, group.size);
            assert_eq!(file.hash.as_deref(), Some(group.hash.as_str()));
            all_paths.push(file.path.clone());
        }
    }
    let total = all_paths.len();
    all_paths.sort();
    all_paths.dedup();
    assert_eq!(all_paths.len(), total, "a record appeared in two groups");
}

#[test]
fn test_detection_is_deterministic() {
    let dir = TempDir::new().unwrap();
    let tree = dir.path().join("tree");
    std::fs::create_dir(&tree).unwrap();
    std::fs::write(tree.join("a.wav"), b"dup dup").unwrap();
    std::fs::write(tree.join("b.wav"), b"dup dup").unwrap();
    std::fs::write(tree.join("c.wav"), b"lonely!").unwrap();

    let first = detector().find(scan(&dir, &tree));
    let second = detector().find(scan(&dir, &tree));

    let normalize = |outcome: &musorg::duplicates::DetectionOutcome| {
        let mut groups: Vec<Vec<String>> = outcome
            .groups
            .iter()
            .map(|g| {
                let mut members: Vec<String> = g
                    .files
                    .iter()
                    .map(|f| f.path.display().to_string())
                    .collect();
                members.sort();
                members
            })
            .collect();
        groups.sort();
        groups
    };

    assert_eq!(normalize(&first), normalize(&second));
}

#[test]
fn test_cancelled_detection_returns_nothing() {
    let dir = TempDir::new().unwrap();
    let tree = dir.path().join("tree");
    std::fs::create_dir(&tree).unwrap();
    std::fs::write(tree.join("a.wav"), b"twin data").unwrap();
    std::fs::write(tree.join("b.wav"), b"twin data").unwrap();

    let records = scan(&dir, &tree);
    let flag = Arc::new(AtomicBool::new(true));
    let config = DetectorConfig::default().with_shutdown_flag(flag);
    let detector = DuplicateDetector::new(ContentHasher::default(), config);

    let outcome = detector.find(records);

    assert!(outcome.stats.interrupted);
    assert!(outcome.groups.is_empty());
}

#[test]
fn test_scan_hash_cache_feeds_detection() {
    let dir = TempDir::new().unwrap();
    let tree = dir.path().join("tree");
    std::fs::create_dir(&tree).unwrap();
    std::fs::write(tree.join("a.wav"), b"cached twin").unwrap();
    std::fs::write(tree.join("b.wav"), b"cached twin").unwrap();

    let cache = Arc::new(MetadataCache::open(dir.path().join("cache.json")));

    // First detection computes and caches both hashes.
    let config = DetectorConfig::default().with_cache(Arc::clone(&cache));
    let detector = DuplicateDetector::new(ContentHasher::default(), config);
    let first = detector.find(scan(&dir, &tree));
    assert_eq!(first.stats.hashed_files, 2);

    // A rescan pulls the cached hashes into the records, so a second
    // detection reuses them and hashes nothing.
    let config = DetectorConfig::default().with_cache(Arc::clone(&cache));
    let detector = DuplicateDetector::new(ContentHasher::default(), config);
    let second = detector.find(scan(&dir, &tree));
    assert_eq!(second.stats.hashed_files, 0);
    assert_eq!(second.stats.reused_hashes, 2);
    assert_eq!(second.groups.len(), 1);
}
