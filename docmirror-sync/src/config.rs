//! Engine configuration.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Footprint above which a capacity-constrained store is trimmed (MB).
pub const DEFAULT_CAP_MB: f64 = 4.8;

/// Entries removed per trim.
pub const DEFAULT_TRIM_BY: usize = 50;

/// Removal queue entries kept before the oldest are dropped.
pub const DEFAULT_REMOVAL_QUEUE_LIMIT: usize = 1000;

/// Upper bound on a single rehydration read (ms).
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 5_000;

/// Quiet period before a storage-change notification triggers a refresh.
pub const DEFAULT_REFRESH_DEBOUNCE: Duration = Duration::from_millis(250);

/// Configuration for a sync engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Store footprint ceiling in megabytes.
    pub cap_mb: f64,
    /// Number of oldest entries evicted per trim.
    pub trim_by: usize,
    /// Maximum removal queue length; `None` keeps every removal.
    pub removal_queue_limit: Option<usize>,
    /// Timeout for each per-entry read during rehydration (ms).
    pub read_timeout_ms: u64,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            cap_mb: DEFAULT_CAP_MB,
            trim_by: DEFAULT_TRIM_BY,
            removal_queue_limit: Some(DEFAULT_REMOVAL_QUEUE_LIMIT),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
        }
    }
}

impl MirrorConfig {
    /// Checks that every setting is usable.
    pub fn validate(&self) -> SyncResult<()> {
        if !self.cap_mb.is_finite() || self.cap_mb <= 0.0 {
            return Err(SyncError::InvalidConfig(format!(
                "cap_mb must be a positive number, got {}",
                self.cap_mb
            )));
        }
        if self.trim_by == 0 {
            return Err(SyncError::InvalidConfig("trim_by must be at least 1".into()));
        }
        if self.removal_queue_limit == Some(0) {
            return Err(SyncError::InvalidConfig(
                "removal_queue_limit must be at least 1 (use None for no limit)".into(),
            ));
        }
        if self.read_timeout_ms == 0 {
            return Err(SyncError::InvalidConfig("read_timeout_ms must be at least 1".into()));
        }
        Ok(())
    }

    /// Returns the per-read timeout.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}
