//! Durable storage of scan results.
//!
//! The pipeline hands completed record batches to a [`FileStore`] and never
//! reads them back: rescans always come from the filesystem and the metadata
//! cache. The store exists so other frontends can query the library without
//! rescanning it.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

use crate::scanner::path_utils::canonical_key;
use crate::scanner::FileRecord;

/// Errors from the file-record store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// A database operation failed.
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Record tags could not be serialized.
    #[error("cannot serialize tags: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Write-only sink for completed file records.
pub trait FileStore: Send + Sync {
    /// Insert or update a batch of records, keyed by path.
    fn upsert_batch(&self, records: &[FileRecord]) -> Result<(), StoreError>;
}

/// SQLite-backed [`FileStore`].
pub struct SqliteStore {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("path", &self.path)
            .finish()
    }
}

impl SqliteStore {
    /// Open (creating if needed) the store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the database cannot be opened or the
    /// schema cannot be created.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        let conn = Connection::open(path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS files (
                path      TEXT PRIMARY KEY,
                size      INTEGER NOT NULL,
                mod_time  TEXT NOT NULL,
                hash      TEXT,
                tags      TEXT NOT NULL
            )",
            [],
        )?;
        log::debug!("Opened file store at {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            conn: Mutex::new(conn),
        })
    }

    /// Number of stored records (test and diagnostics helper).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on query failure.
    pub fn count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

impl FileStore for SqliteStore {
    fn upsert_batch(&self, records: &[FileRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO files (path, size, mod_time, hash, tags)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(path) DO UPDATE SET
                     size = excluded.size,
                     mod_time = excluded.mod_time,
                     hash = excluded.hash,
                     tags = excluded.tags",
            )?;
            for record in records {
                let mod_time: DateTime<Utc> = record.modified.into();
                stmt.execute(params![
                    canonical_key(&record.path),
                    record.size as i64,
                    mod_time.to_rfc3339(),
                    record.hash,
                    serde_json::to_string(&record.tags)?,
                ])?;
            }
        }
        tx.commit()?;
        log::debug!("Upserted {} records into {}", records.len(), self.path.display());
        Ok(())
    }
}
