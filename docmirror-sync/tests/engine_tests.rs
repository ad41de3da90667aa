mod common;

use common::{entry, eventually, open_engine, set, stored_list};
use docmirror_collection::{CollectionEvent, MemoryCollection, ObservableCollection, Selector};
use docmirror_storage::MemoryStore;
use docmirror_sync::{MirrorConfig, StatsSnapshot, SyncEngine, SyncError};
use docmirror_types::{Entry, IdGeneration, Identifier};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

const ROOT: &str = "minimongo__tasks";

// ── Construction & accessors ─────────────────────────────────────

#[tokio::test]
async fn keys_follow_collection_name() {
    let engine = SyncEngine::new(
        Arc::new(MemoryCollection::new("tasks")),
        Arc::new(MemoryStore::new()),
        MirrorConfig::default(),
    )
    .unwrap();

    assert_eq!(engine.key(), ROOT);
    assert_eq!(engine.data_key(&"a".into()), "minimongo__tasks__a");
    assert_eq!(engine.namespace().changes_key(), "minimongo__tasks::changes");
    assert_eq!(engine.namespace().removals_key(), "minimongo__tasks::removals");
    assert_eq!(engine.stats(), StatsSnapshot::default());
}

#[tokio::test]
async fn invalid_config_is_rejected() {
    let result = SyncEngine::new(
        Arc::new(MemoryCollection::new("tasks")),
        Arc::new(MemoryStore::new()),
        MirrorConfig {
            trim_by: 0,
            ..MirrorConfig::default()
        },
    );
    assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
}

#[tokio::test]
async fn collection_name_shadowing_a_queue_is_rejected() {
    let result = SyncEngine::new(
        Arc::new(MemoryCollection::new("tasks::changes")),
        Arc::new(MemoryStore::new()),
        MirrorConfig::default(),
    );
    assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
}

#[tokio::test]
async fn corrupt_tracking_list_fails_open() {
    let store = MemoryStore::new();
    docmirror_storage::KvStore::set(&store, ROOT, json!("not a list"))
        .await
        .unwrap();
    let result = SyncEngine::new(
        Arc::new(MemoryCollection::new("tasks")),
        Arc::new(store),
        MirrorConfig::default(),
    )
    .unwrap()
    .open()
    .await;
    assert!(matches!(result, Err(SyncError::CorruptList { .. })));
}

// ── Live projection ──────────────────────────────────────────────

#[tokio::test]
async fn insert_update_remove_round() {
    let col = MemoryCollection::new("tasks");
    let store = MemoryStore::new();
    let engine = open_engine(&col, &store).await;

    col.insert(Entry::empty("a").with_field("v", 1)).await.unwrap();
    eventually("a persisted", || async { store.contains_key("minimongo__tasks__a") }).await;
    assert_eq!(store.snapshot()["minimongo__tasks__a"], json!({"_id": "a", "v": 1}));
    assert_eq!(stored_list(&store, ROOT), vec!["a"]);

    col.update(&"a".into(), &set(json!({"v": 2}))).await.unwrap();
    eventually("v updated", || async {
        store.snapshot()["minimongo__tasks__a"]["v"] == json!(2)
    })
    .await;
    assert_eq!(stored_list(&store, ROOT), vec!["a"]);

    col.remove(&"a".into()).await.unwrap();
    eventually("a deleted", || async { !store.contains_key("minimongo__tasks__a") }).await;
    assert!(!store.contains_key(ROOT));
    assert_eq!(engine.tracked_ids().await, Vec::<String>::new());
    assert_eq!(engine.pending_removals().await, vec!["a"]);

    assert_eq!(
        engine.stats(),
        StatsSnapshot {
            added: 1,
            removed: 1,
            changed: 1,
        }
    );
}

#[tokio::test]
async fn existing_entries_are_persisted_on_open() {
    let col = MemoryCollection::new("tasks");
    col.insert(entry("a", 1)).await.unwrap();
    col.insert(entry("b", 2)).await.unwrap();
    let store = MemoryStore::new();

    let _engine = open_engine(&col, &store).await;
    eventually("both tracked", || async { stored_list(&store, ROOT).len() == 2 }).await;
    assert_eq!(stored_list(&store, ROOT), vec!["a", "b"]);
}

#[tokio::test]
async fn structured_ids_persist_in_canonical_form() {
    let col = MemoryCollection::new("tasks").with_id_generation(IdGeneration::Structured);
    let store = MemoryStore::new();
    let _engine = open_engine(&col, &store).await;

    let id = Identifier::structured("507f1f77bcf86cd799439011").unwrap();
    col.insert(Entry::empty(id.clone()).with_field("v", 1)).await.unwrap();

    let key = "minimongo__tasks__507f1f77bcf86cd799439011";
    eventually("structured entry persisted", || async { store.contains_key(key) }).await;
    assert_eq!(
        store.snapshot()[key],
        json!({"_id": {"_str": "507f1f77bcf86cd799439011"}, "v": 1})
    );
    assert_eq!(stored_list(&store, ROOT), vec!["507f1f77bcf86cd799439011"]);
}

// ── Direct event handling ────────────────────────────────────────

fn unopened(col: &MemoryCollection, store: &MemoryStore) -> SyncEngine {
    SyncEngine::new(
        Arc::new(col.clone()),
        Arc::new(store.clone()),
        MirrorConfig::default(),
    )
    .unwrap()
}

#[tokio::test]
async fn duplicate_removal_is_idempotent() {
    let col = MemoryCollection::new("tasks");
    let store = MemoryStore::new();
    let engine = unopened(&col, &store);
    let a = entry("a", 1);

    engine.handle_event(&CollectionEvent::Added(a.clone())).await.unwrap();
    engine.handle_event(&CollectionEvent::Removed(a.clone())).await.unwrap();
    engine.handle_event(&CollectionEvent::Removed(a)).await.unwrap();

    assert_eq!(engine.stats().removed, 1);
    assert_eq!(engine.pending_removals().await, vec!["a"]);
    assert_eq!(store.keys(), vec!["minimongo__tasks::removals".to_string()]);
}

#[tokio::test]
async fn removal_of_untracked_entry_is_ignored() {
    let col = MemoryCollection::new("tasks");
    let store = MemoryStore::new();
    let engine = unopened(&col, &store);

    engine
        .handle_event(&CollectionEvent::Removed(entry("ghost", 1)))
        .await
        .unwrap();
    assert_eq!(engine.stats().removed, 0);
    assert!(engine.pending_removals().await.is_empty());
    assert!(store.is_empty());
}

#[tokio::test]
async fn repeated_add_rewrites_data_but_counts_once() {
    let col = MemoryCollection::new("tasks");
    let store = MemoryStore::new();
    let engine = unopened(&col, &store);

    engine.handle_event(&CollectionEvent::Added(entry("a", 1))).await.unwrap();
    engine.handle_event(&CollectionEvent::Added(entry("a", 2))).await.unwrap();

    assert_eq!(engine.stats().added, 1);
    assert_eq!(stored_list(&store, ROOT), vec!["a"]);
    assert_eq!(store.snapshot()["minimongo__tasks__a"]["v"], json!(2));
}

#[tokio::test]
async fn failed_write_is_reported_and_counted_nowhere() {
    let col = MemoryCollection::new("tasks");
    let store = MemoryStore::new().with_quota_mb(0.000_01);
    let engine = unopened(&col, &store);

    let result = engine.handle_event(&CollectionEvent::Added(entry("a", 1))).await;
    assert!(matches!(result, Err(SyncError::Storage(_))));
    assert_eq!(engine.stats().added, 0);
    assert!(engine.tracked_ids().await.is_empty());
}

#[tokio::test]
async fn acknowledged_removals_leave_the_queue() {
    let col = MemoryCollection::new("tasks");
    let store = MemoryStore::new();
    let engine = unopened(&col, &store);
    for id in ["a", "b"] {
        engine.handle_event(&CollectionEvent::Added(entry(id, 1))).await.unwrap();
        engine.handle_event(&CollectionEvent::Removed(entry(id, 1))).await.unwrap();
    }

    let acked = engine.acknowledge_removals(&["a".to_string()]).await.unwrap();
    assert_eq!(acked, 1);
    assert_eq!(engine.pending_removals().await, vec!["b"]);
    assert_eq!(stored_list(&store, "minimongo__tasks::removals"), vec!["b"]);
}

#[tokio::test]
async fn removal_queue_is_capped() {
    let col = MemoryCollection::new("tasks");
    let store = MemoryStore::new();
    let engine = SyncEngine::new(
        Arc::new(col.clone()),
        Arc::new(store.clone()),
        MirrorConfig {
            removal_queue_limit: Some(2),
            ..MirrorConfig::default()
        },
    )
    .unwrap();
    for id in ["a", "b", "c"] {
        engine.handle_event(&CollectionEvent::Added(entry(id, 1))).await.unwrap();
        engine.handle_event(&CollectionEvent::Removed(entry(id, 1))).await.unwrap();
    }
    assert_eq!(engine.pending_removals().await, vec!["b", "c"]);
}

// ── Shutdown ─────────────────────────────────────────────────────

#[tokio::test]
async fn close_stops_projection() {
    let col = MemoryCollection::new("tasks");
    let store = MemoryStore::new();
    let engine = open_engine(&col, &store).await;

    col.insert(entry("a", 1)).await.unwrap();
    eventually("a persisted", || async { store.contains_key("minimongo__tasks__a") }).await;

    engine.close();
    eventually("observer dropped", || async { col.observer_count() == 0 }).await;
    col.insert(entry("b", 1)).await.unwrap();
    tokio::task::yield_now().await;
    assert!(!store.contains_key("minimongo__tasks__b"));
    assert_eq!(
        col.find(&Selector::All, None).await.unwrap().len(),
        2,
        "the collection itself is unaffected"
    );
}
