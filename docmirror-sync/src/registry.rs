//! Process-wide registry of engines and the storage-change listener.
//!
//! When another context writes to the shared store, every registered engine
//! has to rehydrate. Notifications arrive in bursts, so they are debounced:
//! a refresh of all engines starts once no notification has arrived for the
//! debounce window.

use crate::engine::SyncEngine;
use crate::error::SyncResult;
use crate::reconcile::RefreshReport;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The engines that react to storage-change notifications.
#[derive(Default)]
pub struct PersisterRegistry {
    engines: Mutex<Vec<Arc<SyncEngine>>>,
}

impl PersisterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an engine. An engine already registered under the same
    /// root key is replaced.
    pub fn register(&self, engine: Arc<SyncEngine>) {
        let mut engines = self.engines.lock().unwrap();
        engines.retain(|e| e.key() != engine.key());
        debug!("Registered {}", engine.namespace());
        engines.push(engine);
    }

    /// Removes the engine registered under `root_key`. Returns true when one
    /// was registered.
    pub fn unregister(&self, root_key: &str) -> bool {
        let mut engines = self.engines.lock().unwrap();
        let before = engines.len();
        engines.retain(|e| e.key() != root_key);
        engines.len() != before
    }

    pub fn len(&self) -> usize {
        self.engines.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the root keys of the registered engines.
    pub fn keys(&self) -> Vec<String> {
        self.engines
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.key().to_string())
            .collect()
    }

    /// Refreshes every registered engine in registration order.
    pub async fn refresh_all(&self, init: bool) -> Vec<(String, SyncResult<RefreshReport>)> {
        let engines: Vec<Arc<SyncEngine>> = self.engines.lock().unwrap().clone();
        let mut results = Vec::with_capacity(engines.len());
        for engine in engines {
            let outcome = engine.refresh(init).await;
            if let Err(e) = &outcome {
                warn!("Refresh of {} failed: {e}", engine.namespace());
            }
            results.push((engine.key().to_string(), outcome));
        }
        results
    }

    /// Starts the debounced listener. Every [`StorageChangeNotifier::notify`]
    /// call restarts the quiet period; once it elapses all engines refresh.
    pub fn spawn_change_listener(self: &Arc<Self>, debounce: Duration) -> StorageChangeNotifier {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(debounce_loop(Arc::downgrade(self), rx, debounce));
        StorageChangeNotifier { tx, task }
    }
}

/// Handle used to report that the shared store was changed elsewhere.
///
/// Dropping it stops the listener.
pub struct StorageChangeNotifier {
    tx: mpsc::UnboundedSender<()>,
    task: JoinHandle<()>,
}

impl StorageChangeNotifier {
    /// Reports a change to the shared store.
    pub fn notify(&self) {
        let _ = self.tx.send(());
    }
}

impl Drop for StorageChangeNotifier {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn debounce_loop(
    registry: Weak<PersisterRegistry>,
    mut signals: mpsc::UnboundedReceiver<()>,
    debounce: Duration,
) {
    while signals.recv().await.is_some() {
        let mut absorbed = 1usize;
        loop {
            match tokio::time::timeout(debounce, signals.recv()).await {
                Ok(Some(())) => absorbed += 1,
                Ok(None) => return,
                Err(_) => break,
            }
        }
        let Some(registry) = registry.upgrade() else {
            return;
        };
        info!(
            "Store changed elsewhere ({absorbed} notification(s)), refreshing {} engine(s)",
            registry.len()
        );
        registry.refresh_all(false).await;
    }
}
