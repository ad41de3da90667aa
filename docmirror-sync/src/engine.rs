//! Sync engine: live projection of collection events into the store.
//!
//! The engine owns the three persisted id lists of one namespace and is the
//! only writer of them. Collection events are consumed by a single observer
//! task in delivery order; rehydration lives in `reconcile.rs`.

use crate::config::MirrorConfig;
use crate::error::{SyncError, SyncResult};
use crate::eviction::EvictionPolicy;
use crate::interceptor::{ChangeTracker, TrackedCollection};
use crate::queues::PersistedIdList;
use crate::registry::PersisterRegistry;
use crate::stats::{StatsSnapshot, SyncStats};
use docmirror_collection::{CollectionEvent, ObservableCollection};
use docmirror_storage::{KvStore, SizeProbe};
use docmirror_types::{Entry, Identifier, Namespace};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Mirrors one observable collection into a key-value store.
pub struct SyncEngine {
    pub(crate) namespace: Namespace,
    pub(crate) collection: Arc<dyn ObservableCollection>,
    pub(crate) store: Arc<dyn KvStore>,
    pub(crate) config: MirrorConfig,
    pub(crate) tracking: PersistedIdList,
    pub(crate) changes: Arc<ChangeTracker>,
    pub(crate) removals: PersistedIdList,
    pub(crate) stats: SyncStats,
    pub(crate) refresh_lock: tokio::sync::Mutex<()>,
    /// Held for each projected event, and by a pass while it snapshots the
    /// tracking list.
    pub(crate) projection: tokio::sync::Mutex<()>,
    /// Ids projected while a refresh pass runs; `None` outside a pass.
    touched: Mutex<Option<HashSet<String>>>,
    eviction: Option<EvictionPolicy>,
    observer: Mutex<Option<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Creates an engine for `collection`, persisting into `store`.
    ///
    /// Nothing is read or observed yet; see [`SyncEngine::open`].
    pub fn new(
        collection: Arc<dyn ObservableCollection>,
        store: Arc<dyn KvStore>,
        config: MirrorConfig,
    ) -> SyncResult<Self> {
        config.validate()?;
        let namespace = Namespace::new(collection.name())
            .map_err(|e| SyncError::InvalidConfig(e.to_string()))?;
        let tracking = PersistedIdList::new("tracked", namespace.root_key(), Arc::clone(&store));
        let changes = PersistedIdList::new("pending change", namespace.changes_key(), Arc::clone(&store));
        let removals = PersistedIdList::new("removal", namespace.removals_key(), Arc::clone(&store))
            .with_limit(config.removal_queue_limit);
        Ok(Self {
            namespace,
            collection,
            store,
            config,
            tracking,
            changes: Arc::new(ChangeTracker::new(changes)),
            removals,
            stats: SyncStats::default(),
            refresh_lock: tokio::sync::Mutex::new(()),
            projection: tokio::sync::Mutex::new(()),
            touched: Mutex::new(None),
            eviction: None,
            observer: Mutex::new(None),
        })
    }

    /// Enables eviction, measuring the store with `probe`. Eviction only
    /// runs when the store's driver is capacity constrained.
    #[must_use]
    pub fn with_size_probe(mut self, probe: Arc<dyn SizeProbe>) -> Self {
        self.eviction = Some(EvictionPolicy::from_config(&self.config, probe));
        self
    }

    /// Loads the persisted lists, starts observing the collection and runs
    /// the initializing rehydration pass.
    ///
    /// Fails only if the persisted lists cannot be read: projecting events
    /// over an unloaded tracking list would overwrite it.
    pub async fn open(self) -> SyncResult<Arc<Self>> {
        self.tracking.reload().await?;
        self.changes.queue().merge_stored().await?;
        self.removals.merge_stored().await?;

        let engine = Arc::new(self);
        let events = engine.collection.observe();
        let handle = tokio::spawn(observe_loop(Arc::downgrade(&engine), events));
        *engine.observer.lock().unwrap() = Some(handle);
        info!(
            "Mirroring {} into store {} ({})",
            engine.namespace,
            engine.store.name(),
            engine.store.driver()
        );

        if let Err(e) = engine.refresh(true).await {
            warn!("Initial rehydration of {} failed: {e}", engine.namespace);
        }
        Ok(engine)
    }

    /// Opens the engine and registers it with `registry`.
    pub async fn open_in(self, registry: &PersisterRegistry) -> SyncResult<Arc<Self>> {
        let engine = self.open().await?;
        registry.register(Arc::clone(&engine));
        Ok(engine)
    }

    /// Stops observing the collection. Already-queued events are dropped.
    pub fn close(&self) {
        if let Some(handle) = self.observer.lock().unwrap().take() {
            handle.abort();
            debug!("Stopped observing {}", self.namespace);
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    /// Returns the namespace.
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Returns the root key holding the tracking list.
    pub fn key(&self) -> &str {
        self.namespace.root_key()
    }

    /// Returns the data key of an entry.
    pub fn data_key(&self, id: &Identifier) -> String {
        self.namespace.data_key(id)
    }

    /// Returns the projection counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns the configuration.
    pub fn config(&self) -> &MirrorConfig {
        &self.config
    }

    /// Returns the mirrored collection.
    pub fn collection(&self) -> &Arc<dyn ObservableCollection> {
        &self.collection
    }

    /// Returns the store.
    pub fn store(&self) -> &Arc<dyn KvStore> {
        &self.store
    }

    /// Returns the ids believed persisted, in order.
    pub async fn tracked_ids(&self) -> Vec<String> {
        self.tracking.snapshot().await
    }

    /// Returns the ids with unconfirmed local mutations.
    pub async fn pending_changes(&self) -> Vec<String> {
        self.changes.queue().snapshot().await
    }

    /// Returns the ids removed locally and not yet acknowledged.
    pub async fn pending_removals(&self) -> Vec<String> {
        self.removals.snapshot().await
    }

    /// Drops removals the remote side has confirmed. Returns how many were
    /// pending.
    pub async fn acknowledge_removals(&self, ids: &[String]) -> SyncResult<usize> {
        self.removals.remove_all(ids).await
    }

    /// Returns a view of the collection whose mutations are recorded in the
    /// change queue.
    pub fn tracked(&self) -> TrackedCollection {
        TrackedCollection::new(Arc::clone(&self.collection), Arc::clone(&self.changes))
    }

    // ── Live projection ──────────────────────────────────────────

    /// Projects one collection event into the store.
    pub async fn handle_event(&self, event: &CollectionEvent) -> SyncResult<()> {
        let _projecting = self.projection.lock().await;
        self.note_touched(event.id().as_str());
        let outcome = match event {
            CollectionEvent::Added(entry) => self.on_added(entry).await,
            CollectionEvent::Changed { new, .. } => self.on_changed(new).await,
            CollectionEvent::Removed(entry) => self.on_removed(entry).await,
        };
        if let Err(e) = &outcome {
            warn!(
                "Dropping {} projection of {} in {}: {e}",
                event.kind(),
                event.id(),
                self.namespace
            );
        }
        outcome
    }

    /// Persists a newly added entry and tracks its id.
    pub async fn on_added(&self, entry: &Entry) -> SyncResult<()> {
        if let Some(policy) = &self.eviction {
            if self.store.driver().is_capacity_constrained() {
                if let Err(e) = policy.enforce(self.collection.as_ref()).await {
                    warn!("Eviction in {} failed: {e}", self.namespace);
                }
            }
        }

        let appended = self.tracking.insert(entry.id.as_str()).await?;
        self.store
            .set(&self.data_key(&entry.id), entry.to_document())
            .await?;
        if appended {
            self.stats.record_added();
            debug!("Tracking {} in {}", entry.id, self.namespace);
        }
        Ok(())
    }

    /// Deletes a removed entry's copy and records the removal.
    pub async fn on_removed(&self, entry: &Entry) -> SyncResult<()> {
        let id = entry.id.as_str();
        if !self.tracking.contains(id).await {
            return Ok(());
        }
        self.store.remove(&self.data_key(&entry.id)).await?;
        if !self.tracking.remove(id).await? {
            // A duplicate delivery got here first.
            return Ok(());
        }
        self.removals.insert(id).await?;
        self.stats.record_removed();
        debug!("Untracked {} in {}", entry.id, self.namespace);
        Ok(())
    }

    /// Overwrites a changed entry's copy.
    pub async fn on_changed(&self, entry: &Entry) -> SyncResult<()> {
        self.store
            .set(&self.data_key(&entry.id), entry.to_document())
            .await?;
        self.stats.record_changed();
        Ok(())
    }
}

impl SyncEngine {
    /// Starts recording projected ids for a refresh pass.
    pub(crate) fn begin_pass(&self) {
        *self.touched.lock().unwrap() = Some(HashSet::new());
    }

    /// Stops recording projected ids.
    pub(crate) fn end_pass(&self) {
        *self.touched.lock().unwrap() = None;
    }

    fn note_touched(&self, id: &str) {
        if let Some(touched) = self.touched.lock().unwrap().as_mut() {
            touched.insert(id.to_string());
        }
    }

    /// Whether a live event for `id` was projected during the current pass.
    pub(crate) fn touched_during_pass(&self, id: &str) -> bool {
        self.touched
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|touched| touched.contains(id))
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        if let Ok(mut observer) = self.observer.lock() {
            if let Some(handle) = observer.take() {
                handle.abort();
            }
        }
    }
}

async fn observe_loop(engine: Weak<SyncEngine>, mut events: mpsc::UnboundedReceiver<CollectionEvent>) {
    while let Some(event) = events.recv().await {
        let Some(engine) = engine.upgrade() else {
            break;
        };
        // Failures are logged by handle_event and never stop the loop.
        let _ = engine.handle_event(&event).await;
    }
}
