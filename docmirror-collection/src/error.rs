//! Error types for collection operations.

use docmirror_types::IdentifierError;
use thiserror::Error;

/// Result type for collection operations.
pub type CollectionResult<T> = Result<T, CollectionError>;

/// Errors that can occur in collection operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectionError {
    /// An entry with this id already exists.
    #[error("duplicate id: {0}")]
    DuplicateId(String),

    /// The authoritative side refused the mutation.
    #[error("mutation rejected: {0}")]
    Rejected(String),

    /// The entry's identifier has an unusable shape.
    #[error("invalid identifier: {0}")]
    Identifier(#[from] IdentifierError),
}

impl CollectionError {
    /// Returns true for a rejected insert of an id that already exists.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateId(_))
    }
}
