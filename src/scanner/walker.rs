//! Recursive directory walker.
//!
//! Enumerates every regular file under a root, lazily, yielding base
//! [`FileRecord`]s as it goes so consumers can start working before the walk
//! finishes. A single unreadable entry is yielded as an error value and the
//! walk continues; one bad subtree never aborts the whole enumeration.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use jwalk::WalkDir;

use super::{FileRecord, ScanError, WalkerConfig};

/// Lazy recursive file enumerator.
///
/// # Example
///
/// ```no_run
/// use musorg::scanner::{Walker, WalkerConfig};
/// use std::path::Path;
///
/// let walker = Walker::new(Path::new("."), WalkerConfig::default());
/// let files: Vec<_> = walker.walk().filter_map(Result::ok).collect();
/// println!("found {} files", files.len());
/// ```
#[derive(Debug)]
pub struct Walker {
    root: PathBuf,
    config: WalkerConfig,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Walker {
    /// Create a walker rooted at `path`.
    #[must_use]
    pub fn new(path: &Path, config: WalkerConfig) -> Self {
        Self {
            root: path.to_path_buf(),
            config,
            shutdown_flag: None,
        }
    }

    /// Attach a cooperative cancellation flag. When set, iteration stops at
    /// the next entry.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Build an ignore matcher from the configured patterns.
    fn build_ignore(&self) -> Option<Gitignore> {
        if self.config.ignore_patterns.is_empty() {
            return None;
        }
        let mut builder = GitignoreBuilder::new(&self.root);
        for pattern in &self.config.ignore_patterns {
            if let Err(e) = builder.add_line(None, pattern) {
                log::warn!("Invalid ignore pattern '{}': {}", pattern, e);
            }
        }
        match builder.build() {
            Ok(gitignore) if !gitignore.is_empty() => Some(gitignore),
            Ok(_) => None,
            Err(e) => {
                log::warn!("Failed to build ignore patterns: {}", e);
                None
            }
        }
    }

    fn is_ignored(&self, path: &Path, is_dir: bool, ignore: &Option<Gitignore>) -> bool {
        let Some(gi) = ignore else {
            return false;
        };
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        gi.matched(relative, is_dir).is_ignore()
    }

    /// Walk the tree, yielding a record per regular file.
    ///
    /// Every regular file under the root appears exactly once; ordering is
    /// deterministic (children sorted by name) but not otherwise meaningful.
    /// Stat failures are yielded as [`ScanError`] values.
    pub fn walk(&self) -> impl Iterator<Item = Result<FileRecord, ScanError>> + '_ {
        let ignore = self.build_ignore();

        let walk_dir = WalkDir::new(&self.root)
            .follow_links(self.config.follow_symlinks)
            .skip_hidden(self.config.skip_hidden)
            .process_read_dir(|_depth, _path, _state, children| {
                children.sort_by(|a, b| match (a, b) {
                    (Ok(a), Ok(b)) => a.file_name().cmp(b.file_name()),
                    (Ok(_), Err(_)) => std::cmp::Ordering::Less,
                    (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
                    (Err(_), Err(_)) => std::cmp::Ordering::Equal,
                });
            });

        walk_dir.into_iter().filter_map(move |entry_result| {
            if self.is_shutdown_requested() {
                log::debug!("Walker: shutdown requested, stopping iteration");
                return None;
            }

            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e
                        .path()
                        .map_or_else(|| self.root.clone(), Path::to_path_buf);
                    log::warn!("Walker error for {}: {}", path.display(), e);
                    return Some(Err(ScanError::Io {
                        path,
                        source: std::io::Error::other(e.to_string()),
                    }));
                }
            };

            let path = entry.path();
            if path == self.root {
                return None;
            }

            let file_type = entry.file_type();
            if file_type.is_dir() {
                return None;
            }
            if file_type.is_symlink() && !self.config.follow_symlinks {
                log::trace!("Skipping symlink: {}", path.display());
                return None;
            }
            if self.is_ignored(&path, false, &ignore) {
                log::trace!("Ignoring file: {}", path.display());
                return None;
            }

            let metadata = if self.config.follow_symlinks {
                std::fs::metadata(&path)
            } else {
                std::fs::symlink_metadata(&path)
            };
            let metadata = match metadata {
                Ok(m) => m,
                Err(e) => return Some(Err(stat_error(&path, e))),
            };

            // Symlink targets can be directories too.
            if !metadata.is_file() {
                return None;
            }

            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            Some(Ok(FileRecord::new(path, metadata.len(), modified)))
        })
    }
}

fn stat_error(path: &Path, error: std::io::Error) -> ScanError {
    use std::io::ErrorKind;

    match error.kind() {
        ErrorKind::PermissionDenied => {
            log::warn!("Permission denied: {}", path.display());
            ScanError::PermissionDenied(path.to_path_buf())
        }
        ErrorKind::NotFound => {
            log::debug!("File vanished during walk: {}", path.display());
            ScanError::NotFound(path.to_path_buf())
        }
        _ => {
            log::warn!("I/O error for {}: {}", path.display(), error);
            ScanError::Io {
                path: path.to_path_buf(),
                source: error,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::TempDir;

    fn create_test_dir() -> TempDir {
        let dir = TempDir::new().unwrap();

        let mut f = File::create(dir.path().join("kick.wav")).unwrap();
        writeln!(f, "kick contents").unwrap();

        let mut f = File::create(dir.path().join("snare.wav")).unwrap();
        writeln!(f, "snare contents").unwrap();

        let subdir = dir.path().join("loops");
        fs::create_dir(&subdir).unwrap();
        let mut f = File::create(subdir.join("break.wav")).unwrap();
        writeln!(f, "break contents").unwrap();

        dir
    }

    #[test]
    fn test_walker_finds_all_files() {
        let dir = create_test_dir();
        let walker = Walker::new(dir.path(), WalkerConfig::default());

        let files: Vec<_> = walker.walk().filter_map(Result::ok).collect();

        assert_eq!(files.len(), 3);
        for file in &files {
            assert!(file.size > 0);
            assert!(file.path.is_absolute() || file.path.exists());
        }
    }

    #[test]
    fn test_walker_yields_each_file_once() {
        let dir = create_test_dir();
        let walker = Walker::new(dir.path(), WalkerConfig::default());

        let mut paths: Vec<_> = walker
            .walk()
            .filter_map(Result::ok)
            .map(|f| f.path)
            .collect();
        paths.sort();
        paths.dedup();
        assert_eq!(paths.len(), 3);
    }

    #[test]
    fn test_walker_includes_empty_files() {
        let dir = create_test_dir();
        File::create(dir.path().join("empty.wav")).unwrap();

        let walker = Walker::new(dir.path(), WalkerConfig::default());
        let files: Vec<_> = walker.walk().filter_map(Result::ok).collect();

        assert_eq!(files.len(), 4);
        assert!(files.iter().any(|f| f.size == 0));
    }

    #[test]
    fn test_walker_skip_hidden() {
        let dir = create_test_dir();
        let mut f = File::create(dir.path().join(".DS_Store")).unwrap();
        writeln!(f, "junk").unwrap();

        let config = WalkerConfig {
            skip_hidden: true,
            ..Default::default()
        };
        let walker = Walker::new(dir.path(), config);
        let files: Vec<_> = walker.walk().filter_map(Result::ok).collect();

        assert_eq!(files.len(), 3);
    }

    #[test]
    fn test_walker_ignore_patterns() {
        let dir = create_test_dir();
        let mut f = File::create(dir.path().join("session.tmp")).unwrap();
        writeln!(f, "scratch").unwrap();

        let config = WalkerConfig {
            ignore_patterns: vec!["*.tmp".to_string()],
            ..Default::default()
        };
        let walker = Walker::new(dir.path(), config);
        let files: Vec<_> = walker.walk().filter_map(Result::ok).collect();

        assert!(files
            .iter()
            .all(|f| f.path.extension().is_none_or(|e| e != "tmp")));
        assert_eq!(files.len(), 3);
    }

    #[test]
    #[cfg(unix)]
    fn test_walker_skips_symlinks_by_default() {
        let dir = create_test_dir();
        std::os::unix::fs::symlink(
            dir.path().join("kick.wav"),
            dir.path().join("kick_link.wav"),
        )
        .unwrap();

        let walker = Walker::new(dir.path(), WalkerConfig::default());
        let files: Vec<_> = walker.walk().filter_map(Result::ok).collect();

        assert_eq!(files.len(), 3);
    }

    #[test]
    fn test_walker_shutdown_flag_stops_early() {
        let dir = create_test_dir();
        for i in 0..20 {
            let mut f = File::create(dir.path().join(format!("pad{i}.wav"))).unwrap();
            writeln!(f, "pad {i}").unwrap();
        }

        let shutdown = Arc::new(AtomicBool::new(true));
        let walker =
            Walker::new(dir.path(), WalkerConfig::default()).with_shutdown_flag(shutdown);

        let files: Vec<_> = walker.walk().filter_map(Result::ok).collect();
        assert!(files.is_empty());
    }

    #[test]
    fn test_walker_nonexistent_root_yields_errors_not_panic() {
        let walker = Walker::new(Path::new("/nonexistent/path/12345"), WalkerConfig::default());
        let results: Vec<_> = walker.walk().collect();
        assert!(results.is_empty() || results.iter().all(Result::is_err));
    }
}
