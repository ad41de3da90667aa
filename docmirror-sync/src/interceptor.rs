//! Mutation interception.
//!
//! [`TrackedCollection`] wraps a collection and implements the same
//! [`ObservableCollection`] contract. Before a mutation is forwarded, every
//! affected id is written to the change queue; once the mutation succeeds
//! the ids leave the queue again. A failed mutation leaves its ids queued,
//! so a restart still knows which entries carry unconfirmed local edits.

use crate::queues::PersistedIdList;
use async_trait::async_trait;
use docmirror_collection::{
    CollectionError, CollectionEvent, CollectionResult, ObservableCollection, Selector,
};
use docmirror_types::{Entry, Fields, IdGeneration, Identifier};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// The change queue plus a count of mutations in flight per id.
///
/// An id leaves the queue only when the last in-flight mutation touching it
/// succeeds, so an overlapping mutation never loses its entry early.
pub struct ChangeTracker {
    queue: PersistedIdList,
    in_flight: Mutex<HashMap<String, usize>>,
}

impl ChangeTracker {
    pub(crate) fn new(queue: PersistedIdList) -> Self {
        Self {
            queue,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the persisted queue.
    pub fn queue(&self) -> &PersistedIdList {
        &self.queue
    }

    /// Returns the number of mutations in flight for `id`.
    pub fn in_flight(&self, id: &str) -> usize {
        self.in_flight.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    /// Records the start of a mutation touching `ids`.
    pub async fn begin(&self, ids: &[String]) {
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            for id in ids {
                *in_flight.entry(id.clone()).or_default() += 1;
            }
        }
        if let Err(e) = self.queue.insert_all(ids).await {
            warn!("Failed to record pending change for {ids:?}: {e}");
        }
    }

    /// Records the outcome of a mutation started with [`ChangeTracker::begin`].
    pub async fn finish(&self, ids: &[String], succeeded: bool) {
        let settled: Vec<String> = {
            let mut in_flight = self.in_flight.lock().unwrap();
            let mut settled = Vec::new();
            for id in ids {
                let remaining = match in_flight.get_mut(id.as_str()) {
                    Some(count) => {
                        *count = count.saturating_sub(1);
                        *count
                    }
                    None => 0,
                };
                if remaining == 0 {
                    in_flight.remove(id.as_str());
                    settled.push(id.clone());
                }
            }
            settled
        };
        if !succeeded {
            debug!("Mutation of {ids:?} failed, keeping them queued");
            return;
        }
        if settled.is_empty() {
            return;
        }
        if let Err(e) = self.queue.remove_all(&settled).await {
            warn!("Failed to clear confirmed change for {settled:?}: {e}");
        }
    }
}

/// A collection decorator that records in-flight mutations.
#[derive(Clone)]
pub struct TrackedCollection {
    inner: Arc<dyn ObservableCollection>,
    tracker: Arc<ChangeTracker>,
}

impl TrackedCollection {
    /// Wraps `inner`, recording its mutations in `tracker`.
    pub fn new(inner: Arc<dyn ObservableCollection>, tracker: Arc<ChangeTracker>) -> Self {
        Self { inner, tracker }
    }

    /// Returns the wrapped collection.
    pub fn inner(&self) -> &Arc<dyn ObservableCollection> {
        &self.inner
    }

    /// Inserts a raw JSON document.
    ///
    /// A document whose `_id` has an unusable shape is rejected before
    /// anything is queued or forwarded.
    pub async fn insert_document(&self, document: Value) -> CollectionResult<Identifier> {
        let entry = Entry::from_document(document).map_err(|e| match e {
            docmirror_types::Error::Identifier(e) => CollectionError::Identifier(e),
            other => CollectionError::Rejected(other.to_string()),
        })?;
        self.insert(entry).await
    }

    async fn affected_ids(&self, selector: &Selector) -> CollectionResult<Vec<String>> {
        Ok(match selector {
            Selector::Id(id) => vec![id.as_str().to_string()],
            Selector::Ids(ids) => ids.iter().map(|id| id.as_str().to_string()).collect(),
            Selector::All => self
                .inner
                .find(selector, None)
                .await?
                .into_iter()
                .map(|e| e.id.as_str().to_string())
                .collect(),
        })
    }

    async fn tracked<T, F>(&self, ids: Vec<String>, mutation: F) -> CollectionResult<T>
    where
        F: Future<Output = CollectionResult<T>> + Send,
    {
        self.tracker.begin(&ids).await;
        let outcome = mutation.await;
        self.tracker.finish(&ids, outcome.is_ok()).await;
        outcome
    }
}

#[async_trait]
impl ObservableCollection for TrackedCollection {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn id_generation(&self) -> IdGeneration {
        self.inner.id_generation()
    }

    async fn find(&self, selector: &Selector, limit: Option<usize>) -> CollectionResult<Vec<Entry>> {
        self.inner.find(selector, limit).await
    }

    async fn find_one(&self, id: &Identifier) -> CollectionResult<Option<Entry>> {
        self.inner.find_one(id).await
    }

    async fn count(&self) -> CollectionResult<usize> {
        self.inner.count().await
    }

    async fn insert(&self, entry: Entry) -> CollectionResult<Identifier> {
        let ids = vec![entry.id.as_str().to_string()];
        self.tracked(ids, self.inner.insert(entry)).await
    }

    async fn update(&self, selector: &Selector, modifier: &Fields) -> CollectionResult<usize> {
        let ids = self.affected_ids(selector).await?;
        self.tracked(ids, self.inner.update(selector, modifier)).await
    }

    async fn remove(&self, selector: &Selector) -> CollectionResult<usize> {
        let ids = self.affected_ids(selector).await?;
        self.tracked(ids, self.inner.remove(selector)).await
    }

    fn observe(&self) -> mpsc::UnboundedReceiver<CollectionEvent> {
        self.inner.observe()
    }
}
