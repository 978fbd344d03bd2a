//! SQLite-backed storage implementation for replica persistence.
//!
//! Each record is one row keyed by `(room, key)`. Writes run in autocommit
//! mode with `synchronous = FULL`, so a successful [`save_record`] has been
//! flushed before it returns.
//!
//! [`save_record`]: ReplicaStorage::save_record

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};

use super::storage::{ReplicaStorage, StorageResult};
use crate::error::ReplicaError;
use crate::hash::VersionTag;
use crate::replica::ReplicaRecord;

/// Raw row: (key, content, tag, last_modified millis)
type ReplicaRow = (String, Option<Vec<u8>>, Option<String>, i64);

/// SQLite-backed replica storage.
///
/// # Thread Safety
///
/// The connection is wrapped in a `Mutex` for thread-safe access.
/// SQLite itself is used in serialized threading mode.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open or create a SQLite database at the given path.
    ///
    /// This will create the necessary tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or if schema
    /// initialization fails.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Create an in-memory SQLite database for testing.
    ///
    /// Data is lost when the storage is dropped.
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.conn.lock().map_err(|_| ReplicaError::Poisoned)?;
        // journal_mode answers with the resulting mode as a row
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.pragma_update(None, "synchronous", "FULL")?;
        conn.execute_batch(
            r#"
            -- One row per key per room; content and tag are NULL after a delete
            CREATE TABLE IF NOT EXISTS replicas (
                room TEXT NOT NULL,
                key TEXT NOT NULL,
                content BLOB,
                tag TEXT,
                last_modified INTEGER NOT NULL,
                PRIMARY KEY (room, key)
            );
            "#,
        )?;
        Ok(())
    }
}

impl ReplicaStorage for SqliteStorage {
    fn load_room(&self, room: &str) -> StorageResult<HashMap<String, ReplicaRecord>> {
        let conn = self.conn.lock().map_err(|_| ReplicaError::Poisoned)?;
        let mut stmt =
            conn.prepare("SELECT key, content, tag, last_modified FROM replicas WHERE room = ?")?;
        let rows = stmt
            .query_map(params![room], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<Vec<u8>>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })?
            .collect::<Result<Vec<ReplicaRow>, _>>()?;

        let mut records = HashMap::with_capacity(rows.len());
        for (key, content, tag, millis) in rows {
            let last_modified =
                DateTime::<Utc>::from_timestamp_millis(millis).unwrap_or(DateTime::UNIX_EPOCH);
            let tag = tag.as_deref().and_then(VersionTag::parse);
            let record = ReplicaRecord::restore(content, tag, last_modified).ok_or_else(|| {
                ReplicaError::Corrupt {
                    room: room.to_string(),
                    key: key.clone(),
                }
            })?;
            records.insert(key, record);
        }
        Ok(records)
    }

    fn save_record(&self, room: &str, key: &str, record: &ReplicaRecord) -> StorageResult<()> {
        let conn = self.conn.lock().map_err(|_| ReplicaError::Poisoned)?;
        conn.execute(
            "INSERT OR REPLACE INTO replicas (room, key, content, tag, last_modified)
             VALUES (?, ?, ?, ?, ?)",
            params![
                room,
                key,
                record.content(),
                record.tag().map(VersionTag::as_str),
                record.last_modified().timestamp_millis(),
            ],
        )?;
        Ok(())
    }
}
