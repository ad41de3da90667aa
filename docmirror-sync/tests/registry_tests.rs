mod common;

use common::{entry, open_engine, seed};
use docmirror_collection::MemoryCollection;
use docmirror_storage::MemoryStore;
use docmirror_sync::{MirrorConfig, PersisterRegistry, SyncEngine, DEFAULT_REFRESH_DEBOUNCE};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

// ── Membership ───────────────────────────────────────────────────

#[tokio::test]
async fn register_and_unregister() {
    let registry = PersisterRegistry::new();
    let store = MemoryStore::new();
    let tasks = open_engine(&MemoryCollection::new("tasks"), &store).await;
    let notes = open_engine(&MemoryCollection::new("notes"), &store).await;

    registry.register(tasks);
    registry.register(notes);
    assert_eq!(registry.keys(), vec!["minimongo__tasks", "minimongo__notes"]);

    assert!(registry.unregister("minimongo__tasks"));
    assert!(!registry.unregister("minimongo__tasks"));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn registering_the_same_namespace_replaces() {
    let registry = PersisterRegistry::new();
    let store = MemoryStore::new();
    let col = MemoryCollection::new("tasks");
    registry.register(open_engine(&col, &store).await);
    registry.register(open_engine(&col, &store).await);
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn open_in_registers() {
    let registry = PersisterRegistry::new();
    let engine = SyncEngine::new(
        Arc::new(MemoryCollection::new("tasks")),
        Arc::new(MemoryStore::new()),
        MirrorConfig::default(),
    )
    .unwrap()
    .open_in(&registry)
    .await
    .unwrap();
    assert_eq!(registry.keys(), vec![engine.key().to_string()]);
}

// ── Refresh ──────────────────────────────────────────────────────

#[tokio::test]
async fn refresh_all_reaches_every_engine() {
    let registry = PersisterRegistry::new();
    let store = MemoryStore::new();
    let tasks = MemoryCollection::new("tasks");
    let notes = MemoryCollection::new("notes");
    registry.register(open_engine(&tasks, &store).await);
    registry.register(open_engine(&notes, &store).await);

    seed(&store, "minimongo__tasks", &[entry("t", 1)]).await;
    seed(&store, "minimongo__notes", &[entry("n", 1)]).await;

    let results = registry.refresh_all(false).await;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|(_, r)| r.is_ok()));
    assert_eq!(tasks.entries(), vec![entry("t", 1)]);
    assert_eq!(notes.entries(), vec![entry("n", 1)]);
}

#[tokio::test(start_paused = true)]
async fn notifications_are_debounced() {
    let registry = Arc::new(PersisterRegistry::new());
    let store = MemoryStore::new();
    let tasks = MemoryCollection::new("tasks");
    registry.register(open_engine(&tasks, &store).await);
    let notifier = registry.spawn_change_listener(DEFAULT_REFRESH_DEBOUNCE);

    seed(&store, "minimongo__tasks", &[entry("a", 1)]).await;
    notifier.notify();
    tokio::time::sleep(Duration::from_millis(200)).await;
    notifier.notify();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(tasks.is_empty(), "quiet period restarted by the second notification");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(tasks.entries(), vec![entry("a", 1)]);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_notifier_stops_listening() {
    let registry = Arc::new(PersisterRegistry::new());
    let store = MemoryStore::new();
    let tasks = MemoryCollection::new("tasks");
    registry.register(open_engine(&tasks, &store).await);
    let notifier = registry.spawn_change_listener(Duration::from_millis(50));

    seed(&store, "minimongo__tasks", &[entry("a", 1)]).await;
    notifier.notify();
    drop(notifier);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(tasks.is_empty());
}
