//! Namespaces and the storage keys derived from them.

use crate::{Error, Identifier, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix of every namespace root key.
pub const ROOT_PREFIX: &str = "minimongo";

/// Separator between the root key and an entry id in a data key.
const DATA_SEPARATOR: &str = "__";

/// Separator between the root key and a queue name. Distinct from
/// [`DATA_SEPARATOR`] so queue keys never collide with data keys, and
/// rejected in names so they never collide with another namespace's root.
const QUEUE_SEPARATOR: &str = "::";

/// Logical name scoping all keys of one mirrored collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    name: String,
    root: String,
}

impl Namespace {
    /// Creates the namespace for a collection name.
    ///
    /// Names containing `::` are rejected: `todos::changes` would own the
    /// change queue key of `todos`.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.contains(QUEUE_SEPARATOR) {
            return Err(Error::InvalidNamespace(name));
        }
        let root = format!("{ROOT_PREFIX}{DATA_SEPARATOR}{name}");
        Ok(Self { name, root })
    }

    /// Returns the collection name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the root key, under which the tracking list is stored.
    #[must_use]
    pub fn root_key(&self) -> &str {
        &self.root
    }

    /// Returns the data key of an entry.
    #[must_use]
    pub fn data_key(&self, id: &Identifier) -> String {
        self.data_key_for(id.as_str())
    }

    /// Returns the data key of a canonical id string.
    #[must_use]
    pub fn data_key_for(&self, canonical: &str) -> String {
        format!("{}{DATA_SEPARATOR}{canonical}", self.root)
    }

    /// Extracts the canonical id from one of this namespace's data keys.
    #[must_use]
    pub fn id_from_data_key<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.root.as_str())?
            .strip_prefix(DATA_SEPARATOR)
            .filter(|id| !id.is_empty())
    }

    /// Returns the key of the change queue.
    #[must_use]
    pub fn changes_key(&self) -> String {
        format!("{}{QUEUE_SEPARATOR}changes", self.root)
    }

    /// Returns the key of the removal queue.
    #[must_use]
    pub fn removals_key(&self) -> String {
        format!("{}{QUEUE_SEPARATOR}removals", self.root)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
