/// Durable key/value storage backends
///
/// The store only needs to load and save opaque byte blobs per key, an
/// atomic multi-key save for `reset_all`, and a read-modify-write that no
/// other writer can interleave with. Anything that can do that (an SQLite
/// file, an in-memory map, a platform preference store) can back it.
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::error::StorageError;

/// How long a connection waits for another one holding the write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Key/value persistence used by the store
pub trait Storage: Send {
    /// Read the blob stored under `key`, if any
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Write every entry or none of them
    fn save_all(&mut self, entries: &[(&str, &[u8])]) -> Result<(), StorageError>;

    /// Write a single entry
    fn save(&mut self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.save_all(&[(key, value)])
    }

    /// Read `key`, hand the current blob to `f` and write what it returns,
    /// holding every other writer of this storage off until done.
    ///
    /// `f` returning `None` leaves the entry untouched. An error from `f`
    /// aborts the update without writing anything.
    fn update<F, E>(&mut self, key: &str, f: F) -> Result<(), E>
    where
        F: FnOnce(Option<Vec<u8>>) -> Result<Option<Vec<u8>>, E>,
        E: From<StorageError>;
}

/// SQLite-backed storage, one row per key
pub struct SqliteStorage {
    conn: Connection,
    db_path: Option<PathBuf>,
}

impl SqliteStorage {
    /// Open (or create) the database file at `path`.
    /// The parent directory is created if needed.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        log::info!("📁 Database opened at: {}", path.display());

        let mut storage = SqliteStorage {
            conn,
            db_path: Some(path.to_path_buf()),
        };
        storage.init_schema()?;

        Ok(storage)
    }

    /// Private database that disappears with the connection
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let mut storage = SqliteStorage {
            conn: Connection::open_in_memory()?,
            db_path: None,
        };
        storage.init_schema()?;

        Ok(storage)
    }

    /// Create the records table if it doesn't exist
    fn init_schema(&mut self) -> Result<(), StorageError> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS records (
                key             TEXT PRIMARY KEY,
                value           BLOB NOT NULL,
                updated_at      INTEGER NOT NULL
            )",
            [],
        )?;

        log::debug!("Database schema initialized");

        Ok(())
    }

    /// Path to the database file (`None` for in-memory databases)
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }
}

impl Storage for SqliteStorage {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM records WHERE key = ?1",
                params![key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;

        Ok(value)
    }

    fn save_all(&mut self, entries: &[(&str, &[u8])]) -> Result<(), StorageError> {
        let now = chrono::Utc::now().timestamp_millis();
        let tx = self.conn.transaction()?;

        for (key, value) in entries {
            tx.execute(
                "INSERT INTO records (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, now],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    // BEGIN IMMEDIATE takes the write lock before the read, so two
    // connections on the same file cannot both read the old value.
    fn update<F, E>(&mut self, key: &str, f: F) -> Result<(), E>
    where
        F: FnOnce(Option<Vec<u8>>) -> Result<Option<Vec<u8>>, E>,
        E: From<StorageError>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StorageError::from)?;

        let current = tx
            .query_row(
                "SELECT value FROM records WHERE key = ?1",
                params![key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()
            .map_err(StorageError::from)?;

        if let Some(value) = f(current)? {
            tx.execute(
                "INSERT INTO records (key, value, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                params![key, value, chrono::Utc::now().timestamp_millis()],
            )
            .map_err(StorageError::from)?;
        }

        tx.commit().map_err(StorageError::from)?;
        Ok(())
    }
}

// Implement Debug for better error messages
impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("db_path", &self.db_path)
            .finish()
    }
}

/// In-memory storage
///
/// Clones share the same entries, so a second store built from a clone
/// sees what the first one saved (handy for simulating a restart).
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put raw bytes under a key, bypassing the store
    pub fn insert_raw(&self, key: &str, value: &[u8]) -> Result<(), StorageError> {
        self.lock()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>, StorageError> {
        self.entries
            .lock()
            .map_err(|_| StorageError::Unavailable("memory storage lock poisoned".to_string()))
    }
}

impl Storage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn save_all(&mut self, entries: &[(&str, &[u8])]) -> Result<(), StorageError> {
        let mut map = self.lock()?;
        for (key, value) in entries {
            map.insert((*key).to_string(), value.to_vec());
        }
        Ok(())
    }

    fn update<F, E>(&mut self, key: &str, f: F) -> Result<(), E>
    where
        F: FnOnce(Option<Vec<u8>>) -> Result<Option<Vec<u8>>, E>,
        E: From<StorageError>,
    {
        let mut map = self.lock()?;
        if let Some(value) = f(map.get(key).cloned())? {
            map.insert(key.to_string(), value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_missing_key() {
        let storage = SqliteStorage::open_in_memory().unwrap();
        assert_eq!(storage.load("nothing").unwrap(), None);
        assert_eq!(storage.path(), None);
    }

    #[test]
    fn test_sqlite_overwrite() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        storage.save("k", b"one").unwrap();
        storage.save("k", b"two").unwrap();
        assert_eq!(storage.load("k").unwrap().as_deref(), Some(&b"two"[..]));
    }

    #[test]
    fn test_sqlite_batch_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("eidos.db");

        {
            let mut storage = SqliteStorage::open(&path).unwrap();
            storage.save_all(&[("a", b"1"), ("b", b"2")]).unwrap();
        }

        let storage = SqliteStorage::open(&path).unwrap();
        assert_eq!(storage.path(), Some(path.as_path()));
        assert_eq!(storage.load("a").unwrap().as_deref(), Some(&b"1"[..]));
        assert_eq!(storage.load("b").unwrap().as_deref(), Some(&b"2"[..]));
    }

    fn append(current: Option<Vec<u8>>, byte: u8) -> Result<Option<Vec<u8>>, StorageError> {
        let mut value = current.unwrap_or_default();
        value.push(byte);
        Ok(Some(value))
    }

    #[test]
    fn test_sqlite_update_sees_other_connections() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eidos.db");
        let mut first = SqliteStorage::open(&path).unwrap();
        let mut second = SqliteStorage::open(&path).unwrap();

        first.update("k", |current| append(current, b'a')).unwrap();
        second.update("k", |current| append(current, b'b')).unwrap();
        first.update("k", |current| append(current, b'c')).unwrap();

        assert_eq!(second.load("k").unwrap().as_deref(), Some(&b"abc"[..]));
    }

    #[test]
    fn test_sqlite_concurrent_updates_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eidos.db");
        SqliteStorage::open(&path).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let mut storage = SqliteStorage::open(&path).unwrap();
                    for _ in 0..25 {
                        storage.update("k", |current| append(current, b'x')).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let storage = SqliteStorage::open(&path).unwrap();
        assert_eq!(storage.load("k").unwrap().map(|value| value.len()), Some(100));
    }

    #[test]
    fn test_failed_update_writes_nothing() {
        let mut storage = SqliteStorage::open_in_memory().unwrap();
        storage.save("k", b"old").unwrap();

        let result: Result<(), StorageError> = storage.update("k", |_| {
            Err(StorageError::Unavailable("rejected".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(storage.load("k").unwrap().as_deref(), Some(&b"old"[..]));

        storage.update("k", |_| Ok::<_, StorageError>(None)).unwrap();
        assert_eq!(storage.load("k").unwrap().as_deref(), Some(&b"old"[..]));
    }

    #[test]
    fn test_memory_clones_share_entries() {
        let mut first = MemoryStorage::new();
        let second = first.clone();

        first.save("k", b"v").unwrap();
        assert_eq!(second.load("k").unwrap().as_deref(), Some(&b"v"[..]));
    }
}
