//! Observable collection contract for docmirror.
//!
//! The sync engine mirrors any collection that implements
//! [`ObservableCollection`]: a queryable set of entries that can be inserted,
//! updated and removed, and that reports every change as a
//! [`CollectionEvent`] on a channel.
//!
//! [`MemoryCollection`] is a complete in-process implementation, used by the
//! engine's tests and by applications whose collection has no remote side.

mod collection;
mod error;
mod event;
mod memory;
mod selector;

pub use collection::ObservableCollection;
pub use error::{CollectionError, CollectionResult};
pub use event::{CollectionEvent, EventKind};
pub use memory::MemoryCollection;
pub use selector::Selector;
