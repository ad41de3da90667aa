//! Persisted id lists.
//!
//! The tracking list, the change queue and the removal queue share one
//! representation: an ordered, duplicate-free list of canonical id strings
//! stored as a JSON array under a single key. An empty list is never
//! written; its key is deleted instead.
//!
//! Every mutation holds the list's lock while it persists, and the in-memory
//! copy is only replaced once the store accepted the write, so memory never
//! runs ahead of what a restart would reload.

use crate::error::{SyncError, SyncResult};
use docmirror_storage::KvStore;
use docmirror_types::Identifier;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// An ordered set of ids mirrored under one store key.
pub struct PersistedIdList {
    label: &'static str,
    key: String,
    store: Arc<dyn KvStore>,
    limit: Option<usize>,
    ids: Mutex<Vec<String>>,
}

impl PersistedIdList {
    /// Creates an empty list persisted under `key`. Nothing is read yet.
    pub fn new(label: &'static str, key: impl Into<String>, store: Arc<dyn KvStore>) -> Self {
        Self {
            label,
            key: key.into(),
            store,
            limit: None,
            ids: Mutex::new(Vec::new()),
        }
    }

    /// Caps the list; inserting past the cap drops the oldest ids.
    #[must_use]
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Returns the store key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns a copy of the ids in order.
    pub async fn snapshot(&self) -> Vec<String> {
        self.ids.lock().await.clone()
    }

    /// Returns true when `id` is in the list.
    pub async fn contains(&self, id: &str) -> bool {
        self.ids.lock().await.iter().any(|x| x == id)
    }

    /// Returns the number of ids.
    pub async fn len(&self) -> usize {
        self.ids.lock().await.len()
    }

    /// Returns true when the list is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Replaces the in-memory list with the stored one.
    ///
    /// Returns the stored list, or `None` when the key is absent (the
    /// in-memory list is then cleared).
    pub async fn reload(&self) -> SyncResult<Option<Vec<String>>> {
        let mut ids = self.ids.lock().await;
        let stored = self.read().await?;
        *ids = stored.clone().unwrap_or_default();
        debug!("Loaded {} {} id(s) from {}", ids.len(), self.label, self.key);
        Ok(stored)
    }

    /// Adds every stored id missing from the in-memory list. Nothing already
    /// in memory is dropped.
    pub async fn merge_stored(&self) -> SyncResult<()> {
        let mut ids = self.ids.lock().await;
        let Some(stored) = self.read().await? else {
            return Ok(());
        };
        let known: HashSet<String> = ids.iter().cloned().collect();
        let missing: Vec<String> = stored.into_iter().filter(|id| !known.contains(id)).collect();
        if !missing.is_empty() {
            debug!("Merged {} stored {} id(s)", missing.len(), self.label);
            ids.extend(missing);
        }
        Ok(())
    }

    /// Appends `id` unless present. Returns true when it was appended.
    pub async fn insert(&self, id: &str) -> SyncResult<bool> {
        let appended = self.insert_all(&[id.to_string()]).await?;
        Ok(!appended.is_empty())
    }

    /// Appends every id not yet present and persists once. Returns the ids
    /// that were appended.
    pub async fn insert_all(&self, new_ids: &[String]) -> SyncResult<Vec<String>> {
        let mut ids = self.ids.lock().await;
        let mut next = ids.clone();
        let mut appended = Vec::new();
        for id in new_ids {
            if !next.contains(id) {
                next.push(id.clone());
                appended.push(id.clone());
            }
        }
        if appended.is_empty() {
            return Ok(appended);
        }
        if let Some(limit) = self.limit {
            if next.len() > limit {
                let overflow = next.len() - limit;
                debug!("Dropping {overflow} oldest {} id(s)", self.label);
                next.drain(..overflow);
            }
        }
        self.persist(&next).await?;
        *ids = next;
        Ok(appended)
    }

    /// Removes `id`. Returns true when it was present.
    pub async fn remove(&self, id: &str) -> SyncResult<bool> {
        Ok(self.remove_all(&[id.to_string()]).await? > 0)
    }

    /// Removes every listed id and persists once. Returns how many were
    /// present.
    pub async fn remove_all(&self, gone: &[String]) -> SyncResult<usize> {
        let mut ids = self.ids.lock().await;
        let gone: HashSet<&str> = gone.iter().map(String::as_str).collect();
        let next: Vec<String> = ids
            .iter()
            .filter(|id| !gone.contains(id.as_str()))
            .cloned()
            .collect();
        let removed = ids.len() - next.len();
        if removed == 0 {
            return Ok(0);
        }
        self.persist(&next).await?;
        *ids = next;
        Ok(removed)
    }

    async fn persist(&self, ids: &[String]) -> SyncResult<()> {
        if ids.is_empty() {
            self.store.remove(&self.key).await?;
        } else {
            self.store.set(&self.key, Value::from(ids.to_vec())).await?;
        }
        Ok(())
    }

    async fn read(&self) -> SyncResult<Option<Vec<String>>> {
        let Some(value) = self.store.get(&self.key).await? else {
            return Ok(None);
        };
        let Value::Array(items) = value else {
            return Err(SyncError::CorruptList {
                key: self.key.clone(),
                reason: format!("expected an array, found {value}"),
            });
        };
        let mut ids: Vec<String> = Vec::with_capacity(items.len());
        for item in &items {
            // Older lists may hold structured ids in their JSON form.
            match Identifier::from_json(item) {
                Ok(id) if !ids.iter().any(|x| x == id.as_str()) => ids.push(id.as_str().to_string()),
                Ok(_) => debug!("Skipping duplicate {} id {item}", self.label),
                Err(e) => warn!("Skipping unusable {} id {item}: {e}", self.label),
            }
        }
        Ok(Some(ids))
    }
}
