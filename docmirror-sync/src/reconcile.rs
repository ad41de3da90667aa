//! Rehydration and reconciliation.
//!
//! A refresh pass reloads the persisted lists, reads every tracked entry
//! concurrently, waits on a [`CompletionBarrier`] until each read has been
//! accounted for, and then writes the entries back into the live collection.
//!
//! Live projection keeps running during a pass, and the live side wins:
//! an entry whose event is projected while the pass runs is not written back
//! over, and is never swept. The sweep only considers ids that were tracked
//! when the pass began or that the pass loaded; a live entry the engine has
//! never tracked still has its `Added` projection queued and is kept.

use crate::barrier::CompletionBarrier;
use crate::engine::SyncEngine;
use crate::error::SyncResult;
use docmirror_collection::Selector;
use docmirror_types::Entry;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// How one persisted entry was written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// Inserted; the collection did not have it.
    Inserted,
    /// The collection had it; persisted fields were applied as an update.
    Updated,
    /// The insert collided upstream while a local edit was pending, so the
    /// persisted fields were applied as an update instead.
    FellBackToUpdate,
    /// The insert collided upstream with no local edit pending; the remote
    /// version was kept and the persisted fields dropped.
    KeptRemote,
    /// A live mutation of the entry was projected during the pass; the live
    /// version was kept.
    KeptLive,
}

/// Outcome of a refresh pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    /// Whether this was the initializing pass.
    pub init: bool,
    /// Ids in the persisted tracking list.
    pub loaded: usize,
    pub inserted: usize,
    pub updated: usize,
    pub fell_back: usize,
    pub kept_remote: usize,
    pub kept_live: usize,
    /// Tracked ids whose entry could not be read or parsed.
    pub skipped: usize,
    /// Live entries removed because the store no longer holds them.
    pub swept: usize,
    /// Whether the tracking list was rewritten to drop unreadable ids.
    pub corrected: bool,
}

impl RefreshReport {
    /// Returns how many entries were written back.
    pub fn reconciled(&self) -> usize {
        self.inserted + self.updated + self.fell_back + self.kept_remote + self.kept_live
    }
}

impl SyncEngine {
    /// Rehydrates the collection from the store.
    ///
    /// With `init` set (the pass run by [`SyncEngine::open`]) a tracking
    /// list that names unreadable entries is corrected. Without it, live
    /// entries the store no longer holds are removed from the collection.
    /// Concurrent calls run one after another.
    pub async fn refresh(&self, init: bool) -> SyncResult<RefreshReport> {
        let _pass = self.refresh_lock.lock().await;
        let report = self.run_pass(init).await;
        self.end_pass();
        report
    }

    async fn run_pass(&self, init: bool) -> SyncResult<RefreshReport> {
        self.stats.reset_added();
        let mut report = RefreshReport {
            init,
            ..RefreshReport::default()
        };

        // Unresolved mutations stay pending across the pass.
        self.changes.queue().merge_stored().await?;
        self.removals.merge_stored().await?;

        // No projection is half done while the lists are swapped: every
        // event is either fully reflected in `before` and the store, or
        // recorded as touched.
        let (before, loaded) = {
            let _quiet = self.projection.lock().await;
            self.begin_pass();
            (self.tracking.snapshot().await, self.tracking.reload().await?)
        };
        let Some(loaded) = loaded else {
            debug!("Nothing persisted for {}", self.namespace);
            return Ok(report);
        };
        report.loaded = loaded.len();

        let documents = self.read_entries(&loaded).await;
        let generation = self.collection.id_generation();
        let mut reconciled: Vec<String> = Vec::with_capacity(loaded.len());

        for (tracked, document) in loaded.iter().zip(documents) {
            let Some(document) = document else {
                report.skipped += 1;
                continue;
            };
            let fallback = generation.reconstruct(tracked).ok();
            let entry = match Entry::from_stored(document, generation, fallback.as_ref()) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping persisted {tracked} in {}: {e}", self.namespace);
                    report.skipped += 1;
                    continue;
                }
            };
            let id = entry.id.as_str().to_string();
            match self.reconcile_entry(entry).await {
                Ok(outcome) => {
                    match outcome {
                        Reconciliation::Inserted => report.inserted += 1,
                        Reconciliation::Updated => report.updated += 1,
                        Reconciliation::FellBackToUpdate => report.fell_back += 1,
                        Reconciliation::KeptRemote => report.kept_remote += 1,
                        Reconciliation::KeptLive => report.kept_live += 1,
                    }
                    reconciled.push(id);
                }
                Err(e) => {
                    warn!("Failed to restore {id} into {}: {e}", self.namespace);
                    report.skipped += 1;
                }
            }
        }

        let reconciled_set: HashSet<&str> = reconciled.iter().map(String::as_str).collect();
        let dropped: Vec<String> = loaded
            .iter()
            .filter(|id| !reconciled_set.contains(id.as_str()))
            .cloned()
            .collect();

        if !init {
            let known: HashSet<&str> = before
                .iter()
                .chain(loaded.iter())
                .map(String::as_str)
                .collect();
            report.swept = self.sweep(&known, &reconciled_set).await?;
        } else if reconciled.len() != loaded.len() {
            self.tracking.remove_all(&dropped).await?;
            report.corrected = true;
            info!(
                "Dropped {} unreadable id(s) from the tracking list of {}",
                dropped.len(),
                self.namespace
            );
        }

        info!(
            "Rehydrated {} of {} entries into {} (init: {init})",
            report.reconciled(),
            report.loaded,
            self.namespace
        );
        Ok(report)
    }

    /// Writes one persisted entry back into the collection.
    pub async fn reconcile_entry(&self, entry: Entry) -> SyncResult<Reconciliation> {
        if self.touched_during_pass(entry.id.as_str()) {
            debug!("{} changed live during the pass, keeping it", entry.id);
            return Ok(Reconciliation::KeptLive);
        }
        let selector = Selector::Id(entry.id.clone());
        if self.collection.find_one(&entry.id).await?.is_some() {
            self.collection.update(&selector, &entry.fields).await?;
            return Ok(Reconciliation::Updated);
        }

        let fields = entry.fields.clone();
        let id = entry.id.clone();
        match self.collection.insert(entry).await {
            Ok(_) => Ok(Reconciliation::Inserted),
            Err(e) if e.is_duplicate() => {
                if self.changes.queue().contains(id.as_str()).await {
                    debug!("{id} exists upstream with a local edit pending, updating instead");
                    self.collection.update(&selector, &fields).await?;
                    Ok(Reconciliation::FellBackToUpdate)
                } else {
                    warn!("{id} already exists upstream in {}, keeping the remote copy", self.namespace);
                    Ok(Reconciliation::KeptRemote)
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Reads the data key of every id concurrently. The result is in the
    /// order of `ids`; unreadable, missing or timed-out entries are `None`.
    async fn read_entries(&self, ids: &[String]) -> Vec<Option<Value>> {
        let (barrier, tokens) = CompletionBarrier::new(ids.len());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let timeout = self.config.read_timeout();

        for ((index, id), token) in ids.iter().enumerate().zip(tokens) {
            let store = Arc::clone(&self.store);
            let key = self.namespace.data_key_for(id);
            let tx = tx.clone();
            tokio::spawn(async move {
                let document = match tokio::time::timeout(timeout, store.get(&key)).await {
                    Ok(Ok(document)) => document,
                    Ok(Err(e)) => {
                        warn!("Failed to read {key}: {e}");
                        None
                    }
                    Err(_) => {
                        warn!("Reading {key} timed out");
                        None
                    }
                };
                let _ = tx.send((index, document));
                token.complete();
            });
        }
        drop(tx);

        barrier.wait().await;

        let mut documents = vec![None; ids.len()];
        while let Ok((index, document)) = rx.try_recv() {
            documents[index] = document;
        }
        documents
    }

    /// Removes live entries that the store no longer holds. Only ids in
    /// `known` are candidates; entries projected during the pass are kept.
    async fn sweep(&self, known: &HashSet<&str>, reconciled: &HashSet<&str>) -> SyncResult<usize> {
        let mut swept = 0;
        for entry in self.collection.find(&Selector::All, None).await? {
            let id = entry.id.as_str();
            if !known.contains(id) || reconciled.contains(id) || self.touched_during_pass(id) {
                continue;
            }
            swept += self.collection.remove(&Selector::Id(entry.id.clone())).await?;
        }
        if swept > 0 {
            info!("Removed {swept} entries no longer persisted from {}", self.namespace);
        }
        Ok(swept)
    }
}
