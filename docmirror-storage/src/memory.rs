//! In-process store.
//!
//! Values are kept serialized, so the footprint can be measured the same way
//! a browser measures `localStorage`. Clones share the same map, which lets a
//! test drop an engine and reopen another one over the same contents.

use crate::error::{StorageError, StorageResult};
use crate::store::{KvStore, SizeProbe, StoreDriver};
use crate::{utf16_len, utf16_megabytes, DEFAULT_STORE_NAME};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// In-memory key-value store.
#[derive(Clone)]
pub struct MemoryStore {
    name: String,
    driver: StoreDriver,
    quota_mb: Option<f64>,
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    /// Creates an empty store with the [`StoreDriver::Memory`] driver.
    #[must_use]
    pub fn new() -> Self {
        Self::named(DEFAULT_STORE_NAME)
    }

    /// Creates an empty store under the given name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            driver: StoreDriver::Memory,
            quota_mb: None,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Reports a different driver, e.g. [`StoreDriver::LocalStorage`].
    #[must_use]
    pub fn with_driver(mut self, driver: StoreDriver) -> Self {
        self.driver = driver;
        self
    }

    /// Rejects writes that would grow the footprint past `quota_mb`.
    #[must_use]
    pub fn with_quota_mb(mut self, quota_mb: f64) -> Self {
        self.quota_mb = Some(quota_mb);
        self
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    /// Returns true when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true when `key` is stored.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.read().unwrap().contains_key(key)
    }

    /// Returns all keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Returns a sorted copy of all contents.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .filter_map(|(k, v)| serde_json::from_str(v).ok().map(|v| (k.clone(), v)))
            .collect()
    }

    /// Serialized values only, in UTF-16 code units. Keys are not counted.
    fn chars_used(entries: &HashMap<String, String>) -> usize {
        entries.values().map(|v| utf16_len(v)).sum()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn driver(&self) -> StoreDriver {
        self.driver
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        let raw = self.entries.read().unwrap().get(key).cloned();
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value) -> StorageResult<()> {
        let raw = serde_json::to_string(&value)?;
        let mut entries = self.entries.write().unwrap();
        if let Some(quota) = self.quota_mb {
            let previous = entries.get(key).map_or(0, |v| utf16_len(v));
            let projected = Self::chars_used(&entries) - previous + utf16_len(&raw);
            if utf16_megabytes(projected) > quota {
                return Err(StorageError::QuotaExceeded(format!(
                    "writing {key} would exceed {quota} MB"
                )));
            }
        }
        entries.insert(key.to_string(), raw);
        Ok(())
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.entries.write().unwrap().remove(key);
        Ok(())
    }
}

impl SizeProbe for MemoryStore {
    fn footprint_mb(&self) -> f64 {
        utf16_megabytes(Self::chars_used(&self.entries.read().unwrap()))
    }
}
