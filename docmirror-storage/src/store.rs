//! Key-value store contract.

use crate::error::StorageResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Identifies the medium behind a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreDriver {
    /// Browser-style `localStorage`: small, fixed quota.
    LocalStorage,
    /// IndexedDB-style storage with a large quota.
    IndexedDb,
    /// SQLite database file.
    Sqlite,
    /// Plain process memory.
    Memory,
}

impl StoreDriver {
    /// Returns true when the medium enforces a small size cap, which is what
    /// turns on eviction in the sync engine.
    #[must_use]
    pub fn is_capacity_constrained(self) -> bool {
        matches!(self, Self::LocalStorage)
    }

    /// Returns the driver's name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::LocalStorage => "localStorageWrapper",
            Self::IndexedDb => "asyncStorage",
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for StoreDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Asynchronous, namespaced key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns the name this store was opened under.
    fn name(&self) -> &str;

    /// Returns the medium behind this store.
    fn driver(&self) -> StoreDriver;

    /// Reads a value. Absent keys yield `None`.
    async fn get(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Writes a value, replacing any previous one.
    async fn set(&self, key: &str, value: Value) -> StorageResult<()>;

    /// Removes a value. Removing an absent key succeeds.
    async fn remove(&self, key: &str) -> StorageResult<()>;
}

/// Reports the total footprint of a storage medium.
pub trait SizeProbe: Send + Sync {
    /// Returns the current footprint in megabytes.
    fn footprint_mb(&self) -> f64;
}

/// A [`SizeProbe`] backed by a closure.
pub struct ProbeFn<F>(F);

/// Wraps a closure as a [`SizeProbe`].
pub fn probe_fn<F>(f: F) -> ProbeFn<F>
where
    F: Fn() -> f64 + Send + Sync,
{
    ProbeFn(f)
}

impl<F> SizeProbe for ProbeFn<F>
where
    F: Fn() -> f64 + Send + Sync,
{
    fn footprint_mb(&self) -> f64 {
        (self.0)()
    }
}
