//! URL to document-id registry
//!
//! The registry is the sole authority on "has this URL ever been seen" and
//! on id assignment. Ids are handed out densely starting at 1, which is what
//! lets a resumed session recover the last assigned id as the row count.
//! Explicit registration may leave gaps but never moves the id watermark
//! backwards.

use crate::storage::{DocId, StorageEnv, StoreResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{info, warn};

/// Invariant violations surfaced to callers of the registration API
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("explicit id {requested} must be larger than the last assigned id {last}")]
    NonMonotonicId { requested: DocId, last: DocId },

    #[error("{url} is already registered under id {existing}, refusing id {requested}")]
    IdAlreadyAssigned {
        url: String,
        existing: DocId,
        requested: DocId,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Bijective URL to id map with monotonic assignment.
pub struct DocIdRegistry {
    inner: Mutex<RegistryInner>,
}

struct RegistryInner {
    conn: Connection,
    last_id: DocId,
    transactional: bool,
}

impl DocIdRegistry {
    pub fn open(env: &StorageEnv) -> StoreResult<Self> {
        Self::with_connection(env.connection()?, env.resumable())
    }

    fn with_connection(conn: Connection, resumable: bool) -> StoreResult<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS doc_ids (
                url TEXT PRIMARY KEY,
                doc_id INTEGER NOT NULL
            );",
        )?;

        let mut last_id = 0;
        if resumable {
            let count: i64 = conn.query_row("SELECT count(*) FROM doc_ids", [], |row| row.get(0))?;
            if count > 0 {
                // Ids were assigned densely from 1, so the row count is the
                // highest id handed out by the previous session.
                last_id = count as DocId;
                info!("recovered document registry with {count} known urls");
            }
        }

        Ok(Self {
            inner: Mutex::new(RegistryInner {
                conn,
                last_id,
                transactional: resumable,
            }),
        })
    }

    #[cfg(test)]
    pub fn new_in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, false)
    }

    /// Pure read: the id previously bound to this URL, if any.
    ///
    /// Store failures are logged and reported as "not found"; dedup callers
    /// treat the URL as new, which at worst re-fetches a page.
    pub fn lookup(&self, url: &str) -> Option<DocId> {
        let inner = self.inner.lock().unwrap();
        match inner.find(url) {
            Ok(found) => found,
            Err(e) => {
                warn!("registry lookup failed for {url}: {e}");
                None
            }
        }
    }

    /// Returns the existing id for a known URL, or binds and returns the
    /// next id. Ids start at 1.
    pub fn assign_new_id(&self, url: &str) -> StoreResult<DocId> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.find(url)? {
            return Ok(existing);
        }

        let id = inner.last_id + 1;
        inner.insert(url, id)?;
        inner.last_id = id;
        Ok(id)
    }

    /// Binds an externally chosen id to a URL for cold-start seeding.
    ///
    /// Re-registering an existing mapping is a no-op; a conflicting mapping
    /// or a non-increasing id is rejected. On success the id watermark
    /// advances to `id`, so explicit ids may leave gaps but never reverse.
    pub fn register_existing(&self, url: &str, id: DocId) -> Result<(), RegistryError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(existing) = inner.find(url)? {
            if existing == id {
                return Ok(());
            }
            return Err(RegistryError::IdAlreadyAssigned {
                url: url.to_string(),
                existing,
                requested: id,
            });
        }

        if id <= inner.last_id {
            return Err(RegistryError::NonMonotonicId {
                requested: id,
                last: inner.last_id,
            });
        }

        inner.insert(url, id)?;
        inner.last_id = id;
        Ok(())
    }

    /// Number of known URLs.
    pub fn count(&self) -> StoreResult<u64> {
        let inner = self.inner.lock().unwrap();
        let count: i64 = inner
            .conn
            .query_row("SELECT count(*) FROM doc_ids", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn last_id(&self) -> DocId {
        self.inner.lock().unwrap().last_id
    }
}

impl RegistryInner {
    fn find(&self, url: &str) -> rusqlite::Result<Option<DocId>> {
        self.conn
            .query_row(
                "SELECT doc_id FROM doc_ids WHERE url = ?1",
                params![url],
                |row| row.get(0),
            )
            .optional()
    }

    fn insert(&mut self, url: &str, id: DocId) -> rusqlite::Result<()> {
        let sql = "INSERT INTO doc_ids (url, doc_id) VALUES (?1, ?2)";
        if self.transactional {
            let tx = self.conn.transaction()?;
            tx.execute(sql, params![url, id])?;
            tx.commit()?;
        } else {
            self.conn.execute(sql, params![url, id])?;
        }
        Ok(())
    }
}
