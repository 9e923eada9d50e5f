//! Key-value persistence boundary.
//!
//! The record store only needs synchronous read/write/remove by key. Two
//! media are provided: an in-memory map (tests, ephemeral sessions) and a
//! SQLite database holding a single `kv` table.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, RwLock};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use crate::error::StorageError;

/// One step of an all-or-nothing batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvWrite<'a> {
    Set(&'a str, &'a str),
    Remove(&'a str),
}

impl KvWrite<'_> {
    pub fn key(&self) -> &str {
        match self {
            Self::Set(key, _) | Self::Remove(key) => *key,
        }
    }
}

/// Synchronous key-value medium holding UTF-8 text.
pub trait KeyValueStore: Send + Sync {
    /// Read a value. `Ok(None)` when the key was never written.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Apply every write or none of them.
    ///
    /// The default applies the writes in order and, when one fails, puts the
    /// previous values of the already-applied keys back.
    fn write_batch(&self, writes: &[KvWrite<'_>]) -> Result<(), StorageError> {
        let mut applied: Vec<(&str, Option<String>)> = Vec::with_capacity(writes.len());
        for write in writes {
            let result = self.get(write.key()).and_then(|previous| {
                match write {
                    KvWrite::Set(key, value) => self.set(key, value)?,
                    KvWrite::Remove(key) => self.remove(key)?,
                }
                Ok(previous)
            });
            match result {
                Ok(previous) => applied.push((write.key(), previous)),
                Err(e) => {
                    restore(self, &applied);
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

fn restore<S: KeyValueStore + ?Sized>(store: &S, applied: &[(&str, Option<String>)]) {
    for (key, previous) in applied.iter().rev() {
        let result = match previous {
            Some(value) => store.set(key, value),
            None => store.remove(key),
        };
        if let Err(e) = result {
            warn!(key, error = %e, "Failed to restore value after aborted batch");
        }
    }
}

fn check_quota(limit: Option<usize>, key: &str, value: &str) -> Result<(), StorageError> {
    if let Some(limit) = limit
        && value.len() > limit
    {
        return Err(StorageError::QuotaExceeded {
            key: key.to_string(),
            needed: value.len(),
            limit,
        });
    }
    Ok(())
}

/// In-memory medium with optional quota and injectable write failures.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
    quota_bytes: Option<usize>,
    fail_writes: AtomicBool,
    fail_key: RwLock<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any single value larger than `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            quota_bytes: Some(bytes),
            ..Self::default()
        }
    }

    /// Make every subsequent `set` fail with `QuotaExceeded`.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make writes and removals of one key fail; `None` clears it.
    pub fn fail_writes_to(&self, key: Option<&str>) {
        *self.fail_key.write().unwrap_or_else(|e| e.into_inner()) = key.map(str::to_string);
    }

    /// Write a raw value, bypassing quota and failure injection.
    pub fn seed(&self, key: &str, value: &str) {
        let mut values = self.values.write().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
    }

    fn injected_failure(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let failing_key = self.fail_key.read().unwrap_or_else(|e| e.into_inner());
        if self.fail_writes.load(Ordering::SeqCst) || failing_key.as_deref() == Some(key) {
            return Err(StorageError::QuotaExceeded {
                key: key.to_string(),
                needed: value.len(),
                limit: 0,
            });
        }
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let values = self.values.read().map_err(|_| StorageError::Unavailable)?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.injected_failure(key, value)?;
        check_quota(self.quota_bytes, key, value)?;
        let mut values = self.values.write().map_err(|_| StorageError::Unavailable)?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        if self.fail_key.read().unwrap_or_else(|e| e.into_inner()).as_deref() == Some(key) {
            return Err(StorageError::Unavailable);
        }
        let mut values = self.values.write().map_err(|_| StorageError::Unavailable)?;
        values.remove(key);
        Ok(())
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kv (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

/// SQLite-backed medium: one row per key in the `kv` table.
///
/// Batches run inside a transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    quota_bytes: Option<usize>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("quota_bytes", &self.quota_bytes)
            .finish_non_exhaustive()
    }
}

impl SqliteStore {
    /// Open (or create) the database file, creating its directory if needed.
    pub fn open(path: impl AsRef<Path>, quota_bytes: Option<usize>) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        info!(path = %path.display(), "Key-value database opened");
        Self::init(conn, quota_bytes)
    }

    /// A private database that disappears with the store.
    pub fn open_in_memory(quota_bytes: Option<usize>) -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?, quota_bytes)
    }

    fn init(conn: Connection, quota_bytes: Option<usize>) -> Result<Self, StorageError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            quota_bytes,
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Unavailable)
    }
}

fn upsert(conn: &Connection, key: &str, value: &str) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO kv (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.connection()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        check_quota(self.quota_bytes, key, value)?;
        upsert(&*self.connection()?, key, value)?;
        debug!(key, bytes = value.len(), "Value written");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.connection()?
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn write_batch(&self, writes: &[KvWrite<'_>]) -> Result<(), StorageError> {
        for write in writes {
            if let KvWrite::Set(key, value) = write {
                check_quota(self.quota_bytes, key, value)?;
            }
        }
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        for write in writes {
            match write {
                KvWrite::Set(key, value) => upsert(&tx, key, value)?,
                KvWrite::Remove(key) => {
                    tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
                }
            }
        }
        tx.commit()?;
        debug!(writes = writes.len(), "Batch committed");
        Ok(())
    }
}
