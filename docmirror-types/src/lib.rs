//! Core type definitions for docmirror.
//!
//! This crate defines the collection-agnostic types shared by the store
//! adapters, the collection contract and the sync engine:
//! - Entry identifiers (plain strings or structured ObjectID-style ids)
//! - Entries (an identifier plus an arbitrary JSON field set)
//! - Namespaces and the storage keys derived from them

mod entry;
mod ids;
mod namespace;

pub use entry::{Entry, Fields};
pub use ids::{IdGeneration, Identifier, IdentifierError};
pub use namespace::{Namespace, ROOT_PREFIX};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid identifier: {0}")]
    Identifier(#[from] IdentifierError),

    #[error("document is not a JSON object")]
    NotAnObject,

    #[error("namespace name {0:?} contains the queue separator \"::\"")]
    InvalidNamespace(String),
}
