//! The observable collection contract.

use crate::error::CollectionResult;
use crate::event::CollectionEvent;
use crate::selector::Selector;
use async_trait::async_trait;
use docmirror_types::{Entry, Fields, IdGeneration, Identifier};
use tokio::sync::mpsc;

/// A live collection of entries that reports its changes.
///
/// Mutations resolve once the collection's authoritative side has accepted
/// or rejected them. Events are delivered in the order the changes were
/// applied locally.
#[async_trait]
pub trait ObservableCollection: Send + Sync {
    /// Returns the collection's logical name.
    fn name(&self) -> &str;

    /// Returns how this collection generates its ids.
    fn id_generation(&self) -> IdGeneration {
        IdGeneration::String
    }

    /// Returns the selected entries in iteration order, at most `limit`.
    async fn find(&self, selector: &Selector, limit: Option<usize>) -> CollectionResult<Vec<Entry>>;

    /// Returns the entry with `id`, if present.
    async fn find_one(&self, id: &Identifier) -> CollectionResult<Option<Entry>>;

    /// Returns the number of entries.
    async fn count(&self) -> CollectionResult<usize> {
        Ok(self.find(&Selector::All, None).await?.len())
    }

    /// Inserts an entry. Fails with `DuplicateId` if the id is taken.
    async fn insert(&self, entry: Entry) -> CollectionResult<Identifier>;

    /// Applies `$set` of `modifier` to the selected entries. Returns how many
    /// entries were updated.
    async fn update(&self, selector: &Selector, modifier: &Fields) -> CollectionResult<usize>;

    /// Removes the selected entries. Returns how many were removed.
    async fn remove(&self, selector: &Selector) -> CollectionResult<usize>;

    /// Subscribes to changes.
    ///
    /// The receiver first yields an `Added` event for every entry already in
    /// the collection, then every later change.
    fn observe(&self) -> mpsc::UnboundedReceiver<CollectionEvent>;
}
