//! Durable storage for a crawl session
//!
//! One SQLite database under the session root backs the four tables the
//! engine persists: the pending queue, the in-flight ledger, the document-id
//! map, and the counters. Each store opens its own connection against the
//! shared file and guards it with a single mutex.
//!
//! Durability follows the session mode: resumable sessions write through
//! transactions with full synchronous flushing so a crash loses nothing
//! acknowledged; non-resumable sessions run with synchronous off and start
//! from a wiped environment directory.

mod counters;
mod queue;
mod registry;

pub use counters::Counters;
pub use queue::{ordering_key, InFlightLedger, UrlQueueStore, KEY_LEN};
pub use registry::{DocIdRegistry, RegistryError};

use rusqlite::Connection;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Registry-assigned document identifier. Assignment starts at 1.
pub type DocId = u32;

/// Storage-layer errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record for {0} has no bound document id")]
    UnboundRecord(String),
}

/// Result type alias for storage operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Handle to the durable environment of one crawl session.
///
/// The environment lives in a `frontier/` directory under the session root.
/// Opening it in non-resumable mode clears that directory first, so the
/// session always starts from empty state; resumable mode keeps whatever a
/// previous session left behind.
#[derive(Debug, Clone)]
pub struct StorageEnv {
    db_path: PathBuf,
    resumable: bool,
}

impl StorageEnv {
    const ENV_DIR: &'static str = "frontier";
    const DB_FILE: &'static str = "frontier.db";

    pub fn open(root: &Path, resumable: bool) -> StoreResult<Self> {
        let env_dir = root.join(Self::ENV_DIR);
        if !resumable && env_dir.exists() {
            info!("clearing storage environment at {}", env_dir.display());
            fs::remove_dir_all(&env_dir)?;
        }
        fs::create_dir_all(&env_dir)?;

        Ok(Self {
            db_path: env_dir.join(Self::DB_FILE),
            resumable,
        })
    }

    /// Opens a fresh connection with the session's durability pragmas.
    pub fn connection(&self) -> StoreResult<Connection> {
        let conn = Connection::open(&self.db_path)?;
        let synchronous = if self.resumable { "FULL" } else { "OFF" };
        conn.execute_batch(&format!(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = {synchronous};
            PRAGMA busy_timeout = 5000;
            PRAGMA temp_store = MEMORY;
        "
        ))?;
        Ok(conn)
    }

    pub fn resumable(&self) -> bool {
        self.resumable
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_environment_directory() {
        let root = TempDir::new().unwrap();
        let env = StorageEnv::open(root.path(), false).unwrap();

        assert!(root.path().join("frontier").is_dir());
        assert!(env.db_path().starts_with(root.path()));
        assert!(!env.resumable());
    }

    #[test]
    fn test_non_resumable_open_wipes_previous_state() {
        let root = TempDir::new().unwrap();
        let env = StorageEnv::open(root.path(), true).unwrap();
        let conn = env.connection().unwrap();
        conn.execute_batch("CREATE TABLE leftover (x INTEGER); INSERT INTO leftover VALUES (1);")
            .unwrap();
        drop(conn);

        let env = StorageEnv::open(root.path(), false).unwrap();
        let conn = env.connection().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE name = 'leftover'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_resumable_open_keeps_previous_state() {
        let root = TempDir::new().unwrap();
        let env = StorageEnv::open(root.path(), true).unwrap();
        let conn = env.connection().unwrap();
        conn.execute_batch("CREATE TABLE leftover (x INTEGER); INSERT INTO leftover VALUES (1);")
            .unwrap();
        drop(conn);

        let env = StorageEnv::open(root.path(), true).unwrap();
        let conn = env.connection().unwrap();
        let count: i64 = conn
            .query_row("SELECT count(*) FROM leftover", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
