//! Durable named counters
//!
//! Counter values live in an in-memory map and are written through to the
//! counters table only in resumable mode; a non-resumable session starts
//! from a wiped environment, so persisting them would buy nothing.

use crate::storage::{StorageEnv, StoreResult};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::sync::Mutex;

/// Named persistent integer counters.
pub struct Counters {
    inner: Mutex<CountersInner>,
}

struct CountersInner {
    values: HashMap<String, i64>,
    conn: Option<Connection>,
}

impl Counters {
    /// Number of records admitted to the pending queue over the session.
    pub const SCHEDULED_PAGES: &'static str = "scheduled-pages";
    /// Number of leased records acknowledged as fully attempted.
    pub const PROCESSED_PAGES: &'static str = "processed-pages";

    pub fn open(env: &StorageEnv) -> StoreResult<Self> {
        let conn = if env.resumable() {
            Some(env.connection()?)
        } else {
            None
        };
        Self::with_connection(conn)
    }

    fn with_connection(conn: Option<Connection>) -> StoreResult<Self> {
        let mut values = HashMap::new();
        if let Some(conn) = &conn {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS counters (
                    name TEXT PRIMARY KEY,
                    value INTEGER NOT NULL
                );",
            )?;

            let mut stmt = conn.prepare("SELECT name, value FROM counters")?;
            let rows = stmt.query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?;
            for row in rows {
                let (name, value) = row?;
                values.insert(name, value);
            }
        }

        Ok(Self {
            inner: Mutex::new(CountersInner { values, conn }),
        })
    }

    #[cfg(test)]
    pub fn new_in_memory() -> StoreResult<Self> {
        Self::with_connection(Some(Connection::open_in_memory()?))
    }

    /// Current value of a counter, zero if it was never set.
    pub fn get(&self, name: &str) -> i64 {
        let inner = self.inner.lock().unwrap();
        inner.values.get(name).copied().unwrap_or(0)
    }

    pub fn set(&self, name: &str, value: i64) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.store(name, value)
    }

    /// Adds `delta` to a counter, creating it at zero first if needed.
    pub fn add(&self, name: &str, delta: i64) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        let value = inner.values.get(name).copied().unwrap_or(0) + delta;
        inner.store(name, value)
    }

    pub fn increment(&self, name: &str) -> StoreResult<()> {
        self.add(name, 1)
    }
}

impl CountersInner {
    fn store(&mut self, name: &str, value: i64) -> StoreResult<()> {
        if let Some(conn) = &mut self.conn {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT OR REPLACE INTO counters (name, value) VALUES (?1, ?2)",
                params![name, value],
            )?;
            tx.commit()?;
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }
}
