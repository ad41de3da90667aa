//! Persistent key-value store adapters for docmirror.
//!
//! The sync engine only sees the [`KvStore`] contract: asynchronous
//! get/set/remove of JSON values keyed by string, plus a driver identifier
//! that tells it whether the medium is capacity constrained. A
//! [`SizeProbe`] reports the footprint of such media.
//!
//! # Backends
//!
//! - [`MemoryStore`]: values serialized into a shared in-process map, with an
//!   optional quota. Configured with [`StoreDriver::LocalStorage`] it behaves
//!   like a browser `localStorage` and is subject to eviction.
//! - [`SqliteStore`]: one SQLite table keyed by `(store, key)`; several named
//!   stores can share a database file.

mod error;
mod memory;
mod sqlite;
mod store;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{probe_fn, KvStore, ProbeFn, SizeProbe, StoreDriver};

/// Name of the store used when the caller does not pick one.
pub const DEFAULT_STORE_NAME: &str = "minimongo";

/// Length of `s` in UTF-16 code units, which is what a browser reports as
/// a string's length.
#[must_use]
pub fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// Converts a character count into megabytes the way browsers account for
/// `localStorage` (UTF-16, two bytes per character).
#[must_use]
pub fn utf16_megabytes(chars: usize) -> f64 {
    chars as f64 * 2.0 / 1024.0 / 1024.0
}
