// src/storage/sqlite.rs
//
// SQLite-backed evidence store. One connection behind a mutex; the writer
// thread is the only hot caller, readers (listing, fetch) are occasional.

use super::{timestamp_now, DeleteScope, EvidenceRecord, EvidenceStore};
use crate::error::StoreError;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::info;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS evidence (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    violation_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    image_blob BLOB
);
";

pub struct SqliteEvidenceStore {
    conn: Mutex<Connection>,
}

impl SqliteEvidenceStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Unavailable(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_millis(1_000))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        info!("Evidence store ready at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EvidenceStore for SqliteEvidenceStore {
    fn insert(&self, violation_type: &str, entity_id: &str, image: &[u8]) -> Result<i64, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO evidence (violation_type, entity_id, timestamp, image_blob) VALUES (?1, ?2, ?3, ?4)",
            params![violation_type, entity_id, timestamp_now(), image],
        )?;
        Ok(conn.last_insert_rowid())
    }

    fn list(&self) -> Result<Vec<EvidenceRecord>, StoreError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT id, violation_type, entity_id, timestamp FROM evidence ORDER BY id DESC")?;
        let rows = stmt.query_map([], |row| {
            Ok(EvidenceRecord {
                id: row.get(0)?,
                violation_type: row.get(1)?,
                entity_id: row.get(2)?,
                timestamp: row.get(3)?,
            })
        })?;
        let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn fetch_image(&self, id: i64) -> Result<Option<Vec<u8>>, StoreError> {
        let conn = self.conn();
        let image = conn
            .query_row("SELECT image_blob FROM evidence WHERE id = ?1", params![id], |row| {
                row.get::<_, Option<Vec<u8>>>(0)
            })
            .optional()?;
        Ok(image.flatten())
    }

    fn delete(&self, scope: &DeleteScope) -> Result<usize, StoreError> {
        let conn = self.conn();
        let removed = match scope {
            DeleteScope::All => conn.execute("DELETE FROM evidence", [])?,
            DeleteScope::Ids(ids) if ids.is_empty() => 0,
            DeleteScope::Ids(ids) => {
                let placeholders = vec!["?"; ids.len()].join(",");
                let sql = format!("DELETE FROM evidence WHERE id IN ({})", placeholders);
                conn.execute(&sql, params_from_iter(ids.iter()))?
            }
        };
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteEvidenceStore {
        SqliteEvidenceStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_insert_and_list_newest_first() {
        let s = store();
        let first = s.insert("collision", "id_1_id_2", b"one").unwrap();
        let second = s.insert("wrong_way", "id_9", b"two").unwrap();
        assert!(second > first);

        let records = s.list().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, second);
        assert_eq!(records[0].violation_type, "wrong_way");
        assert_eq!(records[1].entity_id, "id_1_id_2");
    }

    #[test]
    fn test_fetch_image() {
        let s = store();
        let id = s.insert("stalled_vehicle", "id_3", &[1, 2, 3]).unwrap();
        assert_eq!(s.fetch_image(id).unwrap(), Some(vec![1, 2, 3]));
        assert_eq!(s.fetch_image(id + 100).unwrap(), None);
    }

    #[test]
    fn test_delete_by_ids_and_all() {
        let s = store();
        let a = s.insert("collision", "id_1_id_2", b"a").unwrap();
        let _b = s.insert("collision", "id_3_id_4", b"b").unwrap();
        let c = s.insert("collision", "id_5_id_6", b"c").unwrap();

        assert_eq!(s.delete(&DeleteScope::Ids(vec![a, c])).unwrap(), 2);
        assert_eq!(s.list().unwrap().len(), 1);
        assert_eq!(s.delete(&DeleteScope::Ids(Vec::new())).unwrap(), 0);
        assert_eq!(s.delete(&DeleteScope::All).unwrap(), 1);
        assert!(s.list().unwrap().is_empty());
    }
}
