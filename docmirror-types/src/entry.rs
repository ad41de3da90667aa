//! Entries mirrored between a collection and a store.
//!
//! An entry is an identifier plus an arbitrary JSON field set. Its document
//! form is a single JSON object with the identifier under `_id`, which is
//! the shape written to the store.

use crate::{Error, IdGeneration, Identifier, IdentifierError, Result};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Member name holding the identifier in the document form.
pub(crate) const ID_MEMBER: &str = "_id";

/// The field set of an entry.
pub type Fields = serde_json::Map<String, Value>;

/// A record with a stable identifier and arbitrary fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// The entry's identifier.
    pub id: Identifier,
    /// All fields except `_id`.
    pub fields: Fields,
}

impl Entry {
    /// Creates an entry. An `_id` member inside `fields` is discarded.
    #[must_use]
    pub fn new(id: impl Into<Identifier>, mut fields: Fields) -> Self {
        fields.remove(ID_MEMBER);
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Creates an entry with no fields.
    #[must_use]
    pub fn empty(id: impl Into<Identifier>) -> Self {
        Self::new(id, Fields::new())
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        if name != ID_MEMBER {
            self.fields.insert(name, value.into());
        }
        self
    }

    /// Returns a field value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Applies `$set` semantics: every member of `modifier` overwrites the
    /// field of the same name. `_id` is never touched.
    pub fn apply_set(&mut self, modifier: &Fields) {
        for (name, value) in modifier {
            if name != ID_MEMBER {
                self.fields.insert(name.clone(), value.clone());
            }
        }
    }

    /// Returns the document form (`_id` plus fields).
    #[must_use]
    pub fn to_document(&self) -> Value {
        let mut doc = Fields::with_capacity(self.fields.len() + 1);
        doc.insert(ID_MEMBER.to_string(), self.id.to_json());
        for (name, value) in &self.fields {
            doc.insert(name.clone(), value.clone());
        }
        Value::Object(doc)
    }

    /// Parses a document whose `_id` must already have a valid shape.
    pub fn from_document(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(Error::NotAnObject);
        };
        let raw_id = fields.remove(ID_MEMBER).ok_or(IdentifierError::Missing)?;
        let id = Identifier::from_json(&raw_id)?;
        Ok(Self { id, fields })
    }

    /// Parses a document read back from storage.
    ///
    /// The `_id` is normalized through `generation`, so a structured id that
    /// was flattened to a string is restored. When the document has no `_id`
    /// the `fallback` identifier (the one it was tracked under) is used.
    pub fn from_stored(
        value: Value,
        generation: IdGeneration,
        fallback: Option<&Identifier>,
    ) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(Error::NotAnObject);
        };
        let id = match fields.remove(ID_MEMBER) {
            Some(raw) => generation.normalize(&raw)?,
            None => fallback.cloned().ok_or(IdentifierError::Missing)?,
        };
        Ok(Self { id, fields })
    }
}

impl Serialize for Entry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_document().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Entry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_document(value).map_err(de::Error::custom)
    }
}

impl TryFrom<Value> for Entry {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_document(value)
    }
}
