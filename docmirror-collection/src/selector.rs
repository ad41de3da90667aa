//! Entry selectors.

use docmirror_types::Identifier;

/// Selects the entries a query or mutation applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Every entry.
    All,
    /// The entry with this id.
    Id(Identifier),
    /// The entries with any of these ids.
    Ids(Vec<Identifier>),
}

impl Selector {
    /// Returns true when the entry with `id` is selected.
    #[must_use]
    pub fn matches(&self, id: &Identifier) -> bool {
        match self {
            Self::All => true,
            Self::Id(selected) => selected == id,
            Self::Ids(selected) => selected.contains(id),
        }
    }
}

impl From<Identifier> for Selector {
    fn from(id: Identifier) -> Self {
        Self::Id(id)
    }
}

impl From<&Identifier> for Selector {
    fn from(id: &Identifier) -> Self {
        Self::Id(id.clone())
    }
}

impl From<&str> for Selector {
    fn from(id: &str) -> Self {
        Self::Id(Identifier::plain(id))
    }
}
