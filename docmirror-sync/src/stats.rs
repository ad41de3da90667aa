//! Projection counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters of projected events. Observability only.
#[derive(Debug, Default)]
pub struct SyncStats {
    added: AtomicU64,
    removed: AtomicU64,
    changed: AtomicU64,
}

/// A point-in-time copy of [`SyncStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub added: u64,
    pub removed: u64,
    pub changed: u64,
}

impl SyncStats {
    pub(crate) fn record_added(&self) {
        self.added.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_removed(&self) {
        self.removed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_changed(&self) {
        self.changed.fetch_add(1, Ordering::Relaxed);
    }

    /// Rehydration restarts the `added` count.
    pub(crate) fn reset_added(&self) {
        self.added.store(0, Ordering::Relaxed);
    }

    /// Returns the current counts.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            added: self.added.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            changed: self.changed.load(Ordering::Relaxed),
        }
    }
}
