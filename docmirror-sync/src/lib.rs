//! Sync engine mirroring an observable collection into a key-value store.
//!
//! # Architecture
//!
//! A [`SyncEngine`] watches one collection and keeps a copy of every entry
//! in a persistent store, so the collection can be rebuilt after a restart
//! and a local edit that never reached the remote side is not lost.
//!
//! ## Components
//!
//! - **Queues**: the tracking list, change queue and removal queue, each a
//!   JSON array under one store key
//! - **Engine**: projects `added`, `changed` and `removed` events into the store
//! - **Reconcile**: rehydrates the collection from the store
//! - **Interceptor**: records ids of in-flight mutations in the change queue
//! - **Eviction**: trims the oldest entries when a constrained store is full
//! - **Registry**: refreshes every engine when the store changes elsewhere
//!
//! ## Store layout
//!
//! For a collection named `todos`:
//!
//! | key | value |
//! |-----|-------|
//! | `minimongo__todos` | ids of persisted entries |
//! | `minimongo__todos__{id}` | one entry's document |
//! | `minimongo__todos::changes` | ids with unconfirmed local edits |
//! | `minimongo__todos::removals` | ids removed locally |
//!
//! # Example
//!
//! ```
//! use docmirror_collection::MemoryCollection;
//! use docmirror_storage::MemoryStore;
//! use docmirror_sync::{MirrorConfig, SyncEngine};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), docmirror_sync::SyncError> {
//! let todos = Arc::new(MemoryCollection::new("todos"));
//! let store = Arc::new(MemoryStore::new());
//! let engine = SyncEngine::new(todos, store, MirrorConfig::default())?
//!     .open()
//!     .await?;
//! assert_eq!(engine.key(), "minimongo__todos");
//! # Ok(())
//! # }
//! ```

mod barrier;
mod config;
mod engine;
mod error;
mod eviction;
mod interceptor;
mod queues;
mod reconcile;
mod registry;
mod stats;

pub use barrier::{Completion, CompletionBarrier};
pub use config::{
    MirrorConfig, DEFAULT_CAP_MB, DEFAULT_READ_TIMEOUT_MS, DEFAULT_REFRESH_DEBOUNCE,
    DEFAULT_REMOVAL_QUEUE_LIMIT, DEFAULT_TRIM_BY,
};
pub use engine::SyncEngine;
pub use error::{SyncError, SyncResult};
pub use eviction::EvictionPolicy;
pub use interceptor::{ChangeTracker, TrackedCollection};
pub use queues::PersistedIdList;
pub use reconcile::{Reconciliation, RefreshReport};
pub use registry::{PersisterRegistry, StorageChangeNotifier};
pub use stats::{StatsSnapshot, SyncStats};
