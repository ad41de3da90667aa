//! SQLite-backed store.
//!
//! Every named store lives in a single `kv` table keyed by `(store, key)`,
//! so several mirrored databases can share one file. Statements run on the
//! blocking pool so callers on the async runtime are never stalled.

use crate::error::{StorageError, StorageResult};
use crate::store::{KvStore, SizeProbe, StoreDriver};
use crate::{utf16_len, utf16_megabytes};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Persistent key-value store backed by SQLite.
#[derive(Clone)]
pub struct SqliteStore {
    name: String,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens (or creates) a store named `name` in the database at `path`.
    pub fn open(path: impl AsRef<Path>, name: impl Into<String>) -> StorageResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        debug!("Opened SQLite store at {}", path.display());
        Self::with_connection(conn, name.into())
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory(name: impl Into<String>) -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, name.into())
    }

    /// Returns another named store sharing this store's database.
    #[must_use]
    pub fn sibling(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            conn: Arc::clone(&self.conn),
        }
    }

    fn with_connection(conn: Connection, name: String) -> StorageResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv (
                store TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (store, key)
            );
            ",
        )?;
        Ok(Self {
            name,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Returns the number of keys in this store.
    pub fn len(&self) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM kv WHERE store = ?1",
            params![self.name],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Returns true when this store holds no keys.
    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }

    async fn run<T, F>(&self, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection, &str) -> StorageResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let name = self.name.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            op(&*conn, name.as_str())
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

#[async_trait]
impl KvStore for SqliteStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn driver(&self) -> StoreDriver {
        StoreDriver::Sqlite
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        let key = key.to_string();
        self.run(move |conn, store| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT value FROM kv WHERE store = ?1 AND key = ?2",
                    params![store, key],
                    |row| row.get(0),
                )
                .optional()?;
            match raw {
                Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn set(&self, key: &str, value: Value) -> StorageResult<()> {
        let key = key.to_string();
        let raw = serde_json::to_string(&value)?;
        self.run(move |conn, store| {
            conn.execute(
                "INSERT OR REPLACE INTO kv (store, key, value) VALUES (?1, ?2, ?3)",
                params![store, key, raw],
            )?;
            Ok(())
        })
        .await
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        let key = key.to_string();
        self.run(move |conn, store| {
            conn.execute(
                "DELETE FROM kv WHERE store = ?1 AND key = ?2",
                params![store, key],
            )?;
            Ok(())
        })
        .await
    }
}

impl SizeProbe for SqliteStore {
    fn footprint_mb(&self) -> f64 {
        // SQLite's LENGTH counts code points, so values are measured here.
        let conn = self.conn.lock().unwrap();
        let chars = conn
            .prepare("SELECT value FROM kv")
            .and_then(|mut stmt| {
                let values = stmt.query_map([], |row| row.get::<_, String>(0))?;
                values.map(|v| v.map(|v| utf16_len(&v))).sum::<rusqlite::Result<usize>>()
            })
            .unwrap_or(0);
        utf16_megabytes(chars)
    }
}
