//! Change notifications emitted by observable collections.

use docmirror_types::{Entry, Identifier};
use std::fmt;

/// A change to an observed collection.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionEvent {
    /// An entry entered the collection.
    Added(Entry),
    /// An entry's fields changed.
    Changed {
        /// The entry after the change.
        new: Entry,
        /// The entry before the change.
        old: Entry,
    },
    /// An entry left the collection.
    Removed(Entry),
}

impl CollectionEvent {
    /// Returns the id of the affected entry.
    #[must_use]
    pub fn id(&self) -> &Identifier {
        match self {
            Self::Added(entry) | Self::Removed(entry) => &entry.id,
            Self::Changed { new, .. } => &new.id,
        }
    }

    /// Returns the kind of change.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Added(_) => EventKind::Added,
            Self::Changed { .. } => EventKind::Changed,
            Self::Removed(_) => EventKind::Removed,
        }
    }
}

/// Discriminant of a [`CollectionEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Added,
    Changed,
    Removed,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Changed => write!(f, "changed"),
            Self::Removed => write!(f, "removed"),
        }
    }
}
