//! Key-value persistence for the social store.
//!
//! Every component layers its records on the [`KeyValueStore`] trait by
//! serializing them to JSON strings under a partitioned key (see [`keys`]).
//! Two implementations are provided: [`SqliteStore`], the durable store the
//! binary uses, and [`MemoryStore`], a process-local map used as a test
//! double.
//!
//! There are no multi-call transactions. A read-modify-write performed by a
//! component races other writers under last-write-wins per key; the only
//! atomic unit is a single [`KeyValueStore::write_batch`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum StorageError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
    Serde(serde_json::Error),
    /// A stored id is already at the top of its range.
    SequenceExhausted(u64),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Sqlite(e) => write!(f, "sqlite error: {e}"),
            StorageError::Io(e) => write!(f, "io error: {e}"),
            StorageError::Serde(e) => write!(f, "serialization error: {e}"),
            StorageError::SequenceExhausted(last) => {
                write!(f, "no id left after {last}")
            }
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Sqlite(e)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serde(e)
    }
}

// ---------------------------------------------------------------------------
// Store contract
// ---------------------------------------------------------------------------

/// Durable string-keyed map shared by every component.
pub trait KeyValueStore: Send + Sync {
    /// Value stored under `key`, or `None` when the key was never written.
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Overwrite `key` with `value`.
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Write several keys as one unit: either all land or none do.
    fn write_batch(&self, entries: &[(String, String)]) -> Result<(), StorageError>;

    /// Delete `key`. Returns whether it existed.
    fn remove(&self, key: &str) -> Result<bool, StorageError>;

    fn read_or_default(&self, key: &str, default: &str) -> Result<String, StorageError> {
        Ok(self.read(key)?.unwrap_or_else(|| default.to_string()))
    }
}

/// Read and decode a JSON record.
///
/// A value that does not parse as `T` is logged and reported as absent, so
/// a corrupt key re-initializes on the next write instead of failing reads.
pub fn read_record<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let Some(raw) = store.read(key)? else {
        return Ok(None);
    };
    match serde_json::from_str::<T>(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            crate::tlog!("storage: discarding malformed value at {key}: {e}");
            Ok(None)
        }
    }
}

pub fn read_record_or_default<T: DeserializeOwned + Default>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<T, StorageError> {
    Ok(read_record(store, key)?.unwrap_or_default())
}

pub fn encode_record<T: Serialize>(value: &T) -> Result<String, StorageError> {
    Ok(serde_json::to_string(value)?)
}

pub fn write_record<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    store.write(key, &encode_record(value)?)
}

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Next id in a strictly increasing sequence that tracks wall-clock time.
///
/// Clock skew or several writes within one millisecond never produce a
/// duplicate or a step backwards. Fails when `last` has no successor.
pub fn next_sequence_id(last: Option<u64>) -> Result<u64, StorageError> {
    let now = now_millis();
    match last {
        Some(prev) if prev >= now => prev
            .checked_add(1)
            .ok_or(StorageError::SequenceExhausted(prev)),
        _ => Ok(now),
    }
}

// ---------------------------------------------------------------------------
// Key naming
// ---------------------------------------------------------------------------

/// Logical key layout. One function per record partition.
pub mod keys {
    pub const SESSION: &str = "session";
    pub const POSTS: &str = "db_posts";
    pub const POST_SEQUENCE: &str = "db_posts_seq";

    pub fn profile(identity: &str) -> String {
        format!("profile_{identity}")
    }

    pub fn following(identity: &str) -> String {
        format!("following_{identity}")
    }

    pub fn followers(identity: &str) -> String {
        format!("followers_{identity}")
    }

    pub fn likes(content_key: &str) -> String {
        format!("post_likes_{content_key}")
    }

    pub fn comments(content_key: &str) -> String {
        format!("post_comments_{content_key}")
    }

    pub fn chat(thread_key: &str) -> String {
        format!("chat_{thread_key}")
    }

    pub fn threads(identity: &str) -> String {
        format!("threads_{identity}")
    }

    pub fn notifications(identity: &str) -> String {
        format!("notifications_{identity}")
    }
}

// ---------------------------------------------------------------------------
// SQLite store
// ---------------------------------------------------------------------------

/// Key-value store backed by a single SQLite table.
///
/// Several processes may open the same file; WAL mode lets their reads and
/// writes interleave, which is how separate "users" observe each other.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create the database at `path` and ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=2000;")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> Result<(), StorageError> {
        self.lock().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv (
                key         TEXT PRIMARY KEY,
                value       TEXT NOT NULL,
                updated_at  INTEGER NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for SqliteStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        let value = self
            .lock()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock().execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, now_millis() as i64],
        )?;
        Ok(())
    }

    fn write_batch(&self, entries: &[(String, String)]) -> Result<(), StorageError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let now = now_millis() as i64;
        for (key, value) in entries {
            tx.execute(
                "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
                params![key, value, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StorageError> {
        let affected = self
            .lock()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// Process-local store. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.map.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock().get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn write_batch(&self, entries: &[(String, String)]) -> Result<(), StorageError> {
        let mut map = self.lock();
        for (key, value) in entries {
            map.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.lock().remove(key).is_some())
    }
}

/// `{data_dir}/oldworld.db`
pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join("oldworld.db")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
