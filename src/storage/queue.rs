//! Durable priority queue of URL records
//!
//! Records are keyed by a 6-byte composite: 1 byte priority, 1 byte depth
//! clamped to [0,127], 4 bytes document id in big-endian. SQLite compares
//! BLOB keys by unsigned memcmp, so ascending key order is priority first,
//! then depth, then discovery order. The key column is the table's primary
//! key in a WITHOUT ROWID table, which keeps the rows clustered in exactly
//! that order.

use crate::storage::{DocId, StorageEnv, StoreError, StoreResult};
use crate::url::{TldList, WebUrl};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

/// Length of the composite ordering key in bytes.
pub const KEY_LEN: usize = 6;

/// Encodes the composite dequeue key for a record.
///
/// Fails if the record has not been bound to a document id; unbound records
/// must never reach a durable queue.
pub fn ordering_key(record: &WebUrl) -> StoreResult<[u8; KEY_LEN]> {
    let doc_id = record
        .doc_id
        .ok_or_else(|| StoreError::UnboundRecord(record.url().to_string()))?;

    let mut key = [0u8; KEY_LEN];
    key[0] = record.priority;
    key[1] = record.depth.clamp(0, 127) as u8;
    key[2..].copy_from_slice(&doc_id.to_be_bytes());
    Ok(key)
}

/// Disk-backed ordered multiset of URL records.
///
/// `get` and `delete` operate on the lowest-key prefix; callers that lease
/// work pair them under one exclusive region so no record is dispatched
/// twice or lost.
pub struct UrlQueueStore {
    conn: Mutex<Connection>,
    table: String,
    transactional: bool,
    tld: Arc<TldList>,
}

impl UrlQueueStore {
    pub fn open(
        env: &StorageEnv,
        table: &str,
        transactional: bool,
        tld: Arc<TldList>,
    ) -> StoreResult<Self> {
        let conn = env.connection()?;
        Self::with_connection(conn, table, transactional, tld)
    }

    fn with_connection(
        conn: Connection,
        table: &str,
        transactional: bool,
        tld: Arc<TldList>,
    ) -> StoreResult<Self> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                key BLOB PRIMARY KEY,
                url TEXT NOT NULL,
                doc_id INTEGER NOT NULL,
                parent_doc_id INTEGER,
                parent_url TEXT,
                depth INTEGER NOT NULL,
                priority INTEGER NOT NULL,
                anchor TEXT,
                tag TEXT
            ) WITHOUT ROWID;"
        ))?;

        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
            transactional,
            tld,
        })
    }

    #[cfg(test)]
    pub fn new_in_memory(transactional: bool) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, "pending", transactional, Arc::new(TldList::builtin()))
    }

    /// Inserts a record under its composite key, replacing any previous
    /// entry with the same key.
    pub fn put(&self, record: &WebUrl) -> StoreResult<()> {
        let key = ordering_key(record)?;
        let sql = format!(
            "INSERT OR REPLACE INTO {}
             (key, url, doc_id, parent_doc_id, parent_url, depth, priority, anchor, tag)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            self.table
        );
        let args = params![
            &key[..],
            record.url(),
            record.doc_id,
            record.parent_doc_id,
            record.parent_url,
            record.depth,
            record.priority,
            record.anchor,
            record.tag,
        ];

        let mut conn = self.conn.lock().unwrap();
        if self.transactional {
            let tx = conn.transaction()?;
            tx.execute(&sql, args)?;
            tx.commit()?;
        } else {
            conn.execute(&sql, args)?;
        }
        Ok(())
    }

    /// Returns up to `max` records in ascending key order without removing
    /// them.
    pub fn get(&self, max: usize) -> StoreResult<Vec<WebUrl>> {
        let sql = format!(
            "SELECT url, doc_id, parent_doc_id, parent_url, depth, priority, anchor, tag
             FROM {} ORDER BY key LIMIT ?1",
            self.table
        );

        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![max as i64], |row| {
            let url: String = row.get(0)?;
            let mut record = WebUrl::new(url, &self.tld);
            record.doc_id = Some(row.get::<_, DocId>(1)?);
            record.parent_doc_id = row.get(2)?;
            record.parent_url = row.get(3)?;
            record.depth = row.get(4)?;
            record.priority = row.get(5)?;
            record.anchor = row.get(6)?;
            record.tag = row.get(7)?;
            Ok(record)
        })?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Removes the `count` lowest-key records.
    pub fn delete(&self, count: usize) -> StoreResult<()> {
        let sql = format!(
            "DELETE FROM {t} WHERE key IN (SELECT key FROM {t} ORDER BY key LIMIT ?1)",
            t = self.table
        );

        let mut conn = self.conn.lock().unwrap();
        if self.transactional {
            let tx = conn.transaction()?;
            tx.execute(&sql, params![count as i64])?;
            tx.commit()?;
        } else {
            conn.execute(&sql, params![count as i64])?;
        }
        Ok(())
    }

    /// Removes the entry matching the record's exact composite key.
    ///
    /// Returns false when no such entry exists.
    pub fn remove(&self, record: &WebUrl) -> StoreResult<bool> {
        let key = ordering_key(record)?;
        let sql = format!("DELETE FROM {} WHERE key = ?1", self.table);

        let mut conn = self.conn.lock().unwrap();
        let removed = if self.transactional {
            let tx = conn.transaction()?;
            let removed = tx.execute(&sql, params![&key[..]])?;
            tx.commit()?;
            removed
        } else {
            conn.execute(&sql, params![&key[..]])?
        };
        Ok(removed > 0)
    }

    pub fn len(&self) -> StoreResult<u64> {
        let sql = format!("SELECT count(*) FROM {}", self.table);
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Durable record of leased-but-unacknowledged URLs.
///
/// Same shape and key scheme as the pending queue, different purpose:
/// entries are inserted when a batch is leased and removed one by one on
/// acknowledgement, so whatever remains at startup is work that was in
/// flight when the previous session died. Only resumable sessions read it
/// back; a non-resumable session wipes it with the rest of the environment.
pub struct InFlightLedger {
    store: UrlQueueStore,
}

impl InFlightLedger {
    pub fn open(env: &StorageEnv, tld: Arc<TldList>) -> StoreResult<Self> {
        Ok(Self {
            store: UrlQueueStore::open(env, "in_flight", env.resumable(), tld)?,
        })
    }

    #[cfg(test)]
    pub fn new_in_memory() -> StoreResult<Self> {
        Ok(Self {
            store: UrlQueueStore::new_in_memory(true)?,
        })
    }

    pub fn put(&self, record: &WebUrl) -> StoreResult<()> {
        self.store.put(record)
    }

    pub fn get(&self, max: usize) -> StoreResult<Vec<WebUrl>> {
        self.store.get(max)
    }

    pub fn delete(&self, count: usize) -> StoreResult<()> {
        self.store.delete(count)
    }

    pub fn remove(&self, record: &WebUrl) -> StoreResult<bool> {
        self.store.remove(record)
    }

    pub fn len(&self) -> StoreResult<u64> {
        self.store.len()
    }

    pub fn is_empty(&self) -> StoreResult<bool> {
        self.store.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::url::DEFAULT_PRIORITY;

    fn record(url: &str, doc_id: DocId, depth: i16, priority: u8) -> WebUrl {
        let tld = TldList::builtin();
        let mut record = WebUrl::new(url, &tld);
        record.doc_id = Some(doc_id);
        record.depth = depth;
        record.priority = priority;
        record
    }

    #[test]
    fn test_key_layout() {
        let key = ordering_key(&record("https://a.test/", 0x01020304, 5, 9)).unwrap();
        assert_eq!(key, [9, 5, 0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_key_requires_bound_doc_id() {
        let tld = TldList::builtin();
        let unbound = WebUrl::new("https://a.test/", &tld);
        assert!(matches!(
            ordering_key(&unbound),
            Err(StoreError::UnboundRecord(_))
        ));
    }

    #[test]
    fn test_key_depth_clamped_to_127() {
        let key = ordering_key(&record("https://a.test/", 1, 1000, 0)).unwrap();
        assert_eq!(key[1], 127);
    }

    #[test]
    fn test_key_negative_depth_clamped_to_0() {
        let key = ordering_key(&record("https://a.test/", 1, -1, 0)).unwrap();
        assert_eq!(key[1], 0);
    }

    #[test]
    fn test_key_order_priority_dominates() {
        let urgent = ordering_key(&record("https://a.test/1", 99, 100, 1)).unwrap();
        let relaxed = ordering_key(&record("https://a.test/2", 1, 0, 2)).unwrap();
        assert!(urgent < relaxed);
    }

    #[test]
    fn test_key_order_depth_before_id() {
        let shallow = ordering_key(&record("https://a.test/1", 99, 1, 5)).unwrap();
        let deep = ordering_key(&record("https://a.test/2", 1, 2, 5)).unwrap();
        assert!(shallow < deep);
    }

    #[test]
    fn test_key_order_id_tracks_discovery() {
        let first = ordering_key(&record("https://a.test/1", 255, 1, 5)).unwrap();
        let later = ordering_key(&record("https://a.test/2", 256, 1, 5)).unwrap();
        assert!(first < later);
    }

    #[test]
    fn test_put_get_roundtrip() {
        let store = UrlQueueStore::new_in_memory(false).unwrap();
        let mut original = record("https://a.test/page", 7, 2, DEFAULT_PRIORITY);
        original.parent_doc_id = Some(3);
        original.parent_url = Some("https://a.test/".to_string());
        original.anchor = Some("click here".to_string());
        original.tag = Some("a".to_string());
        store.put(&original).unwrap();

        let fetched = store.get(10).unwrap();
        assert_eq!(fetched.len(), 1);
        let fetched = &fetched[0];
        assert_eq!(fetched.url(), "https://a.test/page");
        assert_eq!(fetched.doc_id, Some(7));
        assert_eq!(fetched.parent_doc_id, Some(3));
        assert_eq!(fetched.parent_url.as_deref(), Some("https://a.test/"));
        assert_eq!(fetched.depth, 2);
        assert_eq!(fetched.priority, DEFAULT_PRIORITY);
        assert_eq!(fetched.anchor.as_deref(), Some("click here"));
        assert_eq!(fetched.tag.as_deref(), Some("a"));
        assert_eq!(fetched.domain(), "a.test");
    }

    #[test]
    fn test_get_returns_records_in_key_order() {
        let store = UrlQueueStore::new_in_memory(false).unwrap();
        store.put(&record("https://a.test/3", 3, 1, 5)).unwrap();
        store.put(&record("https://a.test/1", 1, 0, 1)).unwrap();
        store.put(&record("https://a.test/2", 2, 9, 1)).unwrap();

        let ids: Vec<_> = store
            .get(10)
            .unwrap()
            .iter()
            .map(|r| r.doc_id.unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_get_does_not_remove() {
        let store = UrlQueueStore::new_in_memory(false).unwrap();
        store.put(&record("https://a.test/1", 1, 0, 1)).unwrap();

        assert_eq!(store.get(10).unwrap().len(), 1);
        assert_eq!(store.get(10).unwrap().len(), 1);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_get_respects_max() {
        let store = UrlQueueStore::new_in_memory(false).unwrap();
        for id in 1..=5 {
            store
                .put(&record(&format!("https://a.test/{id}"), id, 0, 1))
                .unwrap();
        }
        assert_eq!(store.get(2).unwrap().len(), 2);
    }

    #[test]
    fn test_delete_removes_lowest_keys() {
        let store = UrlQueueStore::new_in_memory(false).unwrap();
        for id in 1..=4 {
            store
                .put(&record(&format!("https://a.test/{id}"), id, 0, 1))
                .unwrap();
        }

        store.delete(2).unwrap();
        let ids: Vec<_> = store
            .get(10)
            .unwrap()
            .iter()
            .map(|r| r.doc_id.unwrap())
            .collect();
        assert_eq!(ids, vec![3, 4]);
    }

    #[test]
    fn test_put_same_key_replaces() {
        let store = UrlQueueStore::new_in_memory(true).unwrap();
        store.put(&record("https://a.test/x", 1, 0, 1)).unwrap();
        store.put(&record("https://a.test/x", 1, 0, 1)).unwrap();
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_remove_exact_key() {
        let store = UrlQueueStore::new_in_memory(true).unwrap();
        let target = record("https://a.test/1", 1, 0, 1);
        store.put(&target).unwrap();
        store.put(&record("https://a.test/2", 2, 0, 1)).unwrap();

        assert!(store.remove(&target).unwrap());
        assert_eq!(store.len().unwrap(), 1);
        assert!(!store.remove(&target).unwrap());
    }

    #[test]
    fn test_ledger_roundtrip() {
        let ledger = InFlightLedger::new_in_memory().unwrap();
        let leased = record("https://a.test/busy", 9, 1, 1);
        ledger.put(&leased).unwrap();

        assert_eq!(ledger.len().unwrap(), 1);
        assert!(ledger.remove(&leased).unwrap());
        assert!(ledger.is_empty().unwrap());
    }
}
