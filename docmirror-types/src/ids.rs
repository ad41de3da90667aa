//! Identifier types for mirrored entries.
//!
//! A collection keys its entries either by plain strings or by structured
//! ObjectID-style ids (24 hex characters). Both reduce to a canonical string
//! at the store boundary; [`IdGeneration`] turns that string back into the
//! form the collection expects.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Member name holding the hex string of a structured id in its JSON form.
const STRUCTURED_MEMBER: &str = "_str";

/// Length of a structured id in hex characters (12 bytes).
const STRUCTURED_LEN: usize = 24;

/// Errors produced when an identifier has an unusable shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentifierError {
    /// The document carries no `_id` at all.
    #[error("document has no _id")]
    Missing,

    /// The identifier is an empty string.
    #[error("identifier is empty")]
    Empty,

    /// A structured id that is not 24 hex characters.
    #[error("malformed structured id: {0:?}")]
    MalformedStructured(String),

    /// Neither a string nor a `{"_str": ...}` object.
    #[error("unsupported identifier shape: {0}")]
    UnsupportedShape(String),
}

/// Identifier of an entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identifier {
    /// A plain string id.
    Plain(String),
    /// A structured id, held as its lowercase hex string.
    Structured(String),
}

impl Identifier {
    /// Creates a plain string identifier.
    #[must_use]
    pub fn plain(id: impl Into<String>) -> Self {
        Self::Plain(id.into())
    }

    /// Creates a structured identifier from its hex string.
    pub fn structured(hex: impl AsRef<str>) -> Result<Self, IdentifierError> {
        let hex = hex.as_ref();
        if hex.len() != STRUCTURED_LEN || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(IdentifierError::MalformedStructured(hex.to_string()));
        }
        Ok(Self::Structured(hex.to_ascii_lowercase()))
    }

    /// Generates a fresh identifier of the requested kind.
    ///
    /// Structured ids take the first 12 bytes of a UUID v7, so they sort by
    /// creation time the way ObjectIDs do.
    #[must_use]
    pub fn generate(generation: IdGeneration) -> Self {
        match generation {
            IdGeneration::String => Self::Plain(Uuid::new_v4().simple().to_string()),
            IdGeneration::Structured => {
                let uuid = Uuid::now_v7();
                Self::Structured(hex::encode(&uuid.as_bytes()[..STRUCTURED_LEN / 2]))
            }
        }
    }

    /// Returns the canonical string form used in storage keys.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Plain(s) | Self::Structured(s) => s,
        }
    }

    /// Returns true for structured ids.
    #[must_use]
    pub fn is_structured(&self) -> bool {
        matches!(self, Self::Structured(_))
    }

    /// Parses an identifier from its JSON form.
    ///
    /// A JSON string becomes a plain id, `{"_str": "<hex>"}` a structured
    /// one. Anything else is rejected.
    pub fn from_json(value: &Value) -> Result<Self, IdentifierError> {
        match value {
            Value::String(s) if s.is_empty() => Err(IdentifierError::Empty),
            Value::String(s) => Ok(Self::Plain(s.clone())),
            Value::Object(map) => match map.get(STRUCTURED_MEMBER) {
                Some(Value::String(hex)) if map.len() == 1 => Self::structured(hex),
                _ => Err(IdentifierError::UnsupportedShape(value.to_string())),
            },
            Value::Null => Err(IdentifierError::Missing),
            other => Err(IdentifierError::UnsupportedShape(other.to_string())),
        }
    }

    /// Returns the JSON form of this identifier.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Plain(s) => Value::String(s.clone()),
            Self::Structured(hex) => {
                let mut map = serde_json::Map::new();
                map.insert(STRUCTURED_MEMBER.to_string(), Value::String(hex.clone()));
                Value::Object(map)
            }
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(s) => write!(f, "{s}"),
            Self::Structured(hex) => write!(f, "ObjectID(\"{hex}\")"),
        }
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Self::plain(s)
    }
}

impl From<String> for Identifier {
    fn from(s: String) -> Self {
        Self::Plain(s)
    }
}

impl Serialize for Identifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Plain(s) => serializer.serialize_str(s),
            Self::Structured(hex) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(STRUCTURED_MEMBER, hex)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Identifier {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_json(&value).map_err(de::Error::custom)
    }
}

/// How a collection generates (and therefore expects) its identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdGeneration {
    /// Plain string ids.
    #[default]
    String,
    /// Structured ObjectID-style ids.
    Structured,
}

impl IdGeneration {
    /// Rebuilds an identifier from its canonical string form.
    pub fn reconstruct(self, canonical: &str) -> Result<Identifier, IdentifierError> {
        if canonical.is_empty() {
            return Err(IdentifierError::Empty);
        }
        match self {
            Self::String => Ok(Identifier::plain(canonical)),
            Self::Structured => Identifier::structured(canonical),
        }
    }

    /// Normalizes a persisted `_id` value into the form the collection expects.
    ///
    /// Structured ids that survived serialization are kept as they are. A bare
    /// string (a structured id that lost its type on the way through storage)
    /// is rebuilt with [`IdGeneration::reconstruct`].
    pub fn normalize(self, value: &Value) -> Result<Identifier, IdentifierError> {
        match value {
            Value::String(s) => self.reconstruct(s),
            other => Identifier::from_json(other),
        }
    }
}
