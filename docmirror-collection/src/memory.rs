//! In-process observable collection.
//!
//! Entries are kept in insertion order, which is also the iteration order
//! `find` reports. Every mutation is applied and announced to observers
//! under one lock, so observers see changes in the order they happened.

use crate::collection::ObservableCollection;
use crate::error::{CollectionError, CollectionResult};
use crate::event::CollectionEvent;
use crate::selector::Selector;
use async_trait::async_trait;
use docmirror_types::{Entry, Fields, IdGeneration, Identifier};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Default)]
struct Inner {
    entries: Vec<Entry>,
    observers: Vec<mpsc::UnboundedSender<CollectionEvent>>,
}

impl Inner {
    fn position(&self, id: &Identifier) -> Option<usize> {
        self.entries.iter().position(|e| &e.id == id)
    }

    fn emit(&mut self, event: CollectionEvent) {
        self.observers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// An observable collection held entirely in memory.
#[derive(Clone)]
pub struct MemoryCollection {
    name: String,
    generation: IdGeneration,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryCollection {
    /// Creates an empty collection using plain string ids.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            generation: IdGeneration::String,
            inner: Arc::new(Mutex::new(Inner::default())),
        }
    }

    /// Switches the id generation, e.g. to structured ids.
    #[must_use]
    pub fn with_id_generation(mut self, generation: IdGeneration) -> Self {
        self.generation = generation;
        self
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    /// Returns true when the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns a copy of all entries in iteration order.
    pub fn entries(&self) -> Vec<Entry> {
        self.inner.lock().unwrap().entries.clone()
    }

    /// Returns the entry with `id`.
    pub fn get(&self, id: &Identifier) -> Option<Entry> {
        let inner = self.inner.lock().unwrap();
        inner.position(id).map(|i| inner.entries[i].clone())
    }

    /// Returns the number of live observers.
    pub fn observer_count(&self) -> usize {
        let mut inner = self.inner.lock().unwrap();
        inner.observers.retain(|tx| !tx.is_closed());
        inner.observers.len()
    }
}

#[async_trait]
impl ObservableCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn id_generation(&self) -> IdGeneration {
        self.generation
    }

    async fn find(&self, selector: &Selector, limit: Option<usize>) -> CollectionResult<Vec<Entry>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .entries
            .iter()
            .filter(|e| selector.matches(&e.id))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn find_one(&self, id: &Identifier) -> CollectionResult<Option<Entry>> {
        Ok(self.get(id))
    }

    async fn count(&self) -> CollectionResult<usize> {
        Ok(self.len())
    }

    async fn insert(&self, entry: Entry) -> CollectionResult<Identifier> {
        let mut inner = self.inner.lock().unwrap();
        if inner.position(&entry.id).is_some() {
            return Err(CollectionError::DuplicateId(entry.id.as_str().to_string()));
        }
        let id = entry.id.clone();
        inner.entries.push(entry.clone());
        inner.emit(CollectionEvent::Added(entry));
        debug!("Inserted {} into {}", id, self.name);
        Ok(id)
    }

    async fn update(&self, selector: &Selector, modifier: &Fields) -> CollectionResult<usize> {
        let mut inner = self.inner.lock().unwrap();
        let mut changes = Vec::new();
        for entry in inner.entries.iter_mut().filter(|e| selector.matches(&e.id)) {
            let old = entry.clone();
            entry.apply_set(modifier);
            if *entry != old {
                changes.push(CollectionEvent::Changed {
                    new: entry.clone(),
                    old,
                });
            }
        }
        let touched = inner
            .entries
            .iter()
            .filter(|e| selector.matches(&e.id))
            .count();
        for event in changes {
            inner.emit(event);
        }
        Ok(touched)
    }

    async fn remove(&self, selector: &Selector) -> CollectionResult<usize> {
        let mut inner = self.inner.lock().unwrap();
        let (removed, kept): (Vec<Entry>, Vec<Entry>) = std::mem::take(&mut inner.entries)
            .into_iter()
            .partition(|e| selector.matches(&e.id));
        inner.entries = kept;
        let count = removed.len();
        for entry in removed {
            inner.emit(CollectionEvent::Removed(entry));
        }
        Ok(count)
    }

    fn observe(&self) -> mpsc::UnboundedReceiver<CollectionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock().unwrap();
        for entry in &inner.entries {
            let _ = tx.send(CollectionEvent::Added(entry.clone()));
        }
        inner.observers.push(tx);
        rx
    }
}
