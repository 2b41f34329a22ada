//! Application settings.
//!
//! Settings persist as JSON under the platform config directory and fall
//! back to defaults when the file is missing or unreadable. They carry the
//! resource policy for hashing and analysis plus the default locations of
//! the metadata cache and the file-record database.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::scanner::hasher::{DEFAULT_BLOCK_SIZE, DEFAULT_HASH_TIMEOUT, DEFAULT_MAX_HASH_SIZE};
use crate::scanner::ContentHasher;

fn default_max_hash_size() -> u64 {
    DEFAULT_MAX_HASH_SIZE
}

fn default_hash_timeout_secs() -> u64 {
    DEFAULT_HASH_TIMEOUT.as_secs()
}

fn default_hash_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_audio_extensions() -> BTreeSet<String> {
    crate::analysis::default_audio_extensions()
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Largest file eligible for content hashing, in bytes.
    #[serde(default = "default_max_hash_size")]
    pub max_hash_size: u64,

    /// Per-file hashing timeout, in seconds.
    #[serde(default = "default_hash_timeout_secs")]
    pub hash_timeout_secs: u64,

    /// Read chunk size for hashing, in bytes.
    #[serde(default = "default_hash_block_size")]
    pub hash_block_size: usize,

    /// Worker threads for batch analysis (0 = min(cores, 4)).
    #[serde(default)]
    pub analysis_threads: usize,

    /// Extensions (lowercase, with dot) treated as audio.
    #[serde(default = "default_audio_extensions")]
    pub audio_extensions: BTreeSet<String>,

    /// Override for the metadata cache file location.
    #[serde(default)]
    pub cache_path: Option<PathBuf>,

    /// Override for the file-record database location.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_hash_size: default_max_hash_size(),
            hash_timeout_secs: default_hash_timeout_secs(),
            hash_block_size: default_hash_block_size(),
            analysis_threads: 0,
            audio_extensions: default_audio_extensions(),
            cache_path: None,
            db_path: None,
        }
    }
}

impl Settings {
    /// Load settings from the default platform-specific path, falling back
    /// to defaults on any failure.
    #[must_use]
    pub fn load() -> Self {
        match Self::load_internal() {
            Ok(settings) => settings,
            Err(e) => {
                log::debug!("Failed to load settings, using defaults: {}", e);
                Self::default()
            }
        }
    }

    fn load_internal() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save settings to the default platform-specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config directory cannot be determined or
    /// written.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "musorg", "musorg")
            .ok_or_else(|| anyhow::anyhow!("Failed to determine project directories"))
    }

    fn config_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.json"))
    }

    /// Effective metadata cache file path.
    #[must_use]
    pub fn cache_file(&self) -> PathBuf {
        self.cache_path.clone().unwrap_or_else(|| {
            Self::project_dirs()
                .map(|dirs| dirs.cache_dir().join("metadata_cache.json"))
                .unwrap_or_else(|_| PathBuf::from("musorg_cache.json"))
        })
    }

    /// Effective file-record database path.
    #[must_use]
    pub fn db_file(&self) -> PathBuf {
        self.db_path.clone().unwrap_or_else(|| {
            Self::project_dirs()
                .map(|dirs| dirs.data_dir().join("library.db"))
                .unwrap_or_else(|_| PathBuf::from("musorg_library.db"))
        })
    }

    /// Build a content hasher honoring the configured budgets.
    #[must_use]
    pub fn hasher(&self) -> ContentHasher {
        ContentHasher::new()
            .with_block_size(self.hash_block_size)
            .with_max_size(self.max_hash_size)
            .with_timeout(Duration::from_secs(self.hash_timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.max_hash_size, 250 * 1024 * 1024);
        assert_eq!(settings.hash_timeout_secs, 5);
        assert_eq!(settings.hash_block_size, 64 * 1024);
        assert!(settings.audio_extensions.contains(".wav"));
        assert!(settings.audio_extensions.contains(".flac"));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"analysis_threads": 2}"#).unwrap();
        assert_eq!(settings.analysis_threads, 2);
        assert_eq!(settings.max_hash_size, 250 * 1024 * 1024);
    }

    #[test]
    fn test_path_overrides_win() {
        let settings = Settings {
            cache_path: Some(PathBuf::from("/tmp/custom_cache.json")),
            db_path: Some(PathBuf::from("/tmp/custom.db")),
            ..Default::default()
        };
        assert_eq!(settings.cache_file(), PathBuf::from("/tmp/custom_cache.json"));
        assert_eq!(settings.db_file(), PathBuf::from("/tmp/custom.db"));
    }
}
