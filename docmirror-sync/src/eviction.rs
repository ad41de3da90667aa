//! Footprint cap for capacity-constrained stores.
//!
//! When the measured footprint is over the ceiling, the first `trim_by`
//! entries in collection iteration order are removed from the collection.
//! Their removal events then clear them from the store through the normal
//! projection path. One batch per check; the ceiling is not guaranteed to
//! be restored in a single pass.

use crate::config::MirrorConfig;
use crate::error::SyncResult;
use docmirror_collection::{ObservableCollection, Selector};
use docmirror_storage::SizeProbe;
use std::sync::Arc;
use tracing::{info, warn};

/// Trims a collection when its store grows past a ceiling.
pub struct EvictionPolicy {
    cap_mb: f64,
    trim_by: usize,
    probe: Arc<dyn SizeProbe>,
}

impl EvictionPolicy {
    /// Creates a policy.
    pub fn new(cap_mb: f64, trim_by: usize, probe: Arc<dyn SizeProbe>) -> Self {
        Self {
            cap_mb,
            trim_by,
            probe,
        }
    }

    /// Creates a policy from the engine configuration.
    pub fn from_config(config: &MirrorConfig, probe: Arc<dyn SizeProbe>) -> Self {
        Self::new(config.cap_mb, config.trim_by, probe)
    }

    /// Returns the ceiling in megabytes.
    pub fn cap_mb(&self) -> f64 {
        self.cap_mb
    }

    /// Returns the batch size.
    pub fn trim_by(&self) -> usize {
        self.trim_by
    }

    /// Returns true when the footprint exceeds the ceiling.
    pub fn over_cap(&self) -> bool {
        self.probe.footprint_mb() > self.cap_mb
    }

    /// Removes one batch of the oldest entries if over the ceiling. Returns
    /// how many entries were removed.
    pub async fn enforce(&self, collection: &dyn ObservableCollection) -> SyncResult<usize> {
        let footprint = self.probe.footprint_mb();
        if footprint <= self.cap_mb {
            return Ok(0);
        }
        let victims = collection.find(&Selector::All, Some(self.trim_by)).await?;
        info!(
            "Store at {footprint:.2} MB exceeds {} MB, trimming {} entries from {}",
            self.cap_mb,
            victims.len(),
            collection.name()
        );
        let mut removed = 0;
        for victim in victims {
            match collection.remove(&Selector::Id(victim.id.clone())).await {
                Ok(n) => removed += n,
                Err(e) => warn!("Failed to evict {}: {e}", victim.id),
            }
        }
        Ok(removed)
    }
}
