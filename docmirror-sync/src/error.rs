//! Error types for the sync layer.

use docmirror_collection::CollectionError;
use docmirror_storage::StorageError;
use docmirror_types::IdentifierError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The persistent store failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The mirrored collection failed.
    #[error("collection error: {0}")]
    Collection(#[from] CollectionError),

    /// An entry's identifier has an unusable shape.
    #[error("identifier error: {0}")]
    Identifier(#[from] IdentifierError),

    /// A persisted document could not be turned back into an entry.
    #[error("document error: {0}")]
    Document(#[from] docmirror_types::Error),

    /// A persisted id list is not a JSON array.
    #[error("corrupt id list under {key}: {reason}")]
    CorruptList { key: String, reason: String },

    /// The configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
