#![allow(dead_code)]

use async_trait::async_trait;
use docmirror_collection::{
    CollectionError, CollectionEvent, CollectionResult, MemoryCollection, ObservableCollection,
    Selector,
};
use docmirror_storage::{KvStore, MemoryStore, StorageError, StorageResult, StoreDriver};
use docmirror_sync::{MirrorConfig, SyncEngine};
use docmirror_types::{Entry, Fields, IdGeneration, Identifier};
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

pub fn entry(id: &str, v: i64) -> Entry {
    Entry::empty(id).with_field("v", v)
}

pub fn set(value: Value) -> Fields {
    value.as_object().cloned().unwrap()
}

/// Polls `check` until it holds, failing the test after five seconds.
pub async fn eventually<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check().await {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Decodes the JSON array stored under `key`, or an empty list.
pub fn stored_list(store: &MemoryStore, key: &str) -> Vec<String> {
    match store.snapshot().get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect(),
        Some(other) => panic!("{key} holds {other}"),
        None => Vec::new(),
    }
}

/// Writes a persisted state directly, as a previous session would have left it.
pub async fn seed(store: &MemoryStore, root: &str, entries: &[Entry]) {
    let ids: Vec<String> = entries.iter().map(|e| e.id.as_str().to_string()).collect();
    store.set(root, Value::from(ids)).await.unwrap();
    for e in entries {
        store
            .set(&format!("{root}__{}", e.id.as_str()), e.to_document())
            .await
            .unwrap();
    }
}

pub async fn open_engine(collection: &MemoryCollection, store: &MemoryStore) -> Arc<SyncEngine> {
    SyncEngine::new(
        Arc::new(collection.clone()),
        Arc::new(store.clone()),
        MirrorConfig::default(),
    )
    .unwrap()
    .open()
    .await
    .unwrap()
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("docmirror_sync=debug")
        .with_test_writer()
        .try_init();
}

// ── Scripted collection ──────────────────────────────────────────

/// A collection whose upstream state and mutation outcomes a test controls.
///
/// Ids marked upstream are invisible to queries but make inserts collide,
/// like a document the server already has that has not reached the client.
#[derive(Clone)]
pub struct ScriptedCollection {
    inner: MemoryCollection,
    upstream: Arc<Mutex<HashSet<String>>>,
    fail_mutations: Arc<AtomicBool>,
    hold: Arc<Mutex<Option<oneshot::Receiver<()>>>>,
    updates: Arc<Mutex<Vec<(Selector, Fields)>>>,
}

impl ScriptedCollection {
    pub fn new(name: &str) -> Self {
        Self {
            inner: MemoryCollection::new(name),
            upstream: Arc::default(),
            fail_mutations: Arc::default(),
            hold: Arc::default(),
            updates: Arc::default(),
        }
    }

    pub fn inner(&self) -> &MemoryCollection {
        &self.inner
    }

    pub fn mark_upstream(&self, id: &str) {
        self.upstream.lock().unwrap().insert(id.to_string());
    }

    pub fn fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    /// Parks the next mutation until the returned sender fires or drops.
    pub fn hold_next_mutation(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.hold.lock().unwrap() = Some(rx);
        tx
    }

    pub fn updates(&self) -> Vec<(Selector, Fields)> {
        self.updates.lock().unwrap().clone()
    }

    async fn gate(&self) -> CollectionResult<()> {
        let held = self.hold.lock().unwrap().take();
        if let Some(rx) = held {
            let _ = rx.await;
        }
        if self.fail_mutations.load(Ordering::SeqCst) {
            return Err(CollectionError::Rejected("scripted failure".into()));
        }
        Ok(())
    }

    fn is_upstream(&self, id: &Identifier) -> bool {
        self.upstream.lock().unwrap().contains(id.as_str())
    }
}

#[async_trait]
impl ObservableCollection for ScriptedCollection {
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

    async fn insert(&self, entry: Entry) -> CollectionResult<Identifier> {
        self.gate().await?;
        if self.is_upstream(&entry.id) {
            return Err(CollectionError::DuplicateId(entry.id.as_str().to_string()));
        }
        self.inner.insert(entry).await
    }

    async fn update(&self, selector: &Selector, modifier: &Fields) -> CollectionResult<usize> {
        self.gate().await?;
        self.updates
            .lock()
            .unwrap()
            .push((selector.clone(), modifier.clone()));
        self.inner.update(selector, modifier).await
    }

    async fn remove(&self, selector: &Selector) -> CollectionResult<usize> {
        self.gate().await?;
        self.inner.remove(selector).await
    }

    fn observe(&self) -> mpsc::UnboundedReceiver<CollectionEvent> {
        self.inner.observe()
    }
}

/// Whether `key` names an entry rather than one of the id lists.
fn is_data_key(key: &str) -> bool {
    !key.contains("::") && key.matches("__").count() >= 2
}

// ── Unreliable store ─────────────────────────────────────────────

/// A store whose reads of selected keys fail or never finish, or whose data
/// reads can be held after the value was fetched.
#[derive(Clone)]
pub struct UnreliableStore {
    inner: MemoryStore,
    broken: Arc<Mutex<HashSet<String>>>,
    stalled: Arc<Mutex<HashSet<String>>>,
    held: Arc<Mutex<Option<watch::Receiver<bool>>>>,
    parked: Arc<AtomicUsize>,
}

impl UnreliableStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            broken: Arc::default(),
            stalled: Arc::default(),
            held: Arc::default(),
            parked: Arc::default(),
        }
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn break_reads(&self, key: &str) {
        self.broken.lock().unwrap().insert(key.to_string());
    }

    pub fn stall_reads(&self, key: &str) {
        self.stalled.lock().unwrap().insert(key.to_string());
    }

    /// Holds every data-key read, after its value was fetched, until the
    /// returned sender publishes `true` or drops.
    pub fn hold_data_reads(&self) -> watch::Sender<bool> {
        let (tx, rx) = watch::channel(false);
        *self.held.lock().unwrap() = Some(rx);
        tx
    }

    fn hold_for(&self, key: &str) -> Option<watch::Receiver<bool>> {
        if !is_data_key(key) {
            return None;
        }
        self.held.lock().unwrap().clone()
    }

    /// Returns how many reads are currently held.
    pub fn parked(&self) -> usize {
        self.parked.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KvStore for UnreliableStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn driver(&self) -> StoreDriver {
        self.inner.driver()
    }

    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        if self.broken.lock().unwrap().contains(key) {
            return Err(StorageError::Unavailable(format!("cannot read {key}")));
        }
        let stalled = self.stalled.lock().unwrap().contains(key);
        if stalled {
            std::future::pending::<()>().await;
        }
        let value = self.inner.get(key).await?;
        if let Some(mut rx) = self.hold_for(key) {
            self.parked.fetch_add(1, Ordering::SeqCst);
            let _ = rx.wait_for(|open| *open).await;
            self.parked.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: Value) -> StorageResult<()> {
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> StorageResult<()> {
        self.inner.remove(key).await
    }
}
