//! Entity keys with ancestor paths.
//!
//! A [`Key`] is a non-empty path of `(kind, id)` elements. Every element but the
//! last names an ancestor; the first element is the root of the key's *entity
//! group*. Keys carry no storage location of their own, so two keys are equal
//! exactly when their paths are equal.
//!
//! # Websafe encoding
//!
//! Keys travel through URLs, task payloads and entity properties in their
//! websafe form: URL-safe base64 (no padding) of the path as a JSON array of
//! `[kind, id]` pairs. Keys serialize as that string, so a key stored inside
//! another entity is a plain string property and can be compared with `=`
//! filters. The [`Display`](fmt::Display) form (`Profile:alice/Conference:#7`)
//! is for logs only.
//!
//! ```
//! use conference_core::key::Key;
//!
//! let organizer = Key::named("Profile", "alice");
//! let conference = Key::with_parent(&organizer, "Conference", 7);
//!
//! assert_eq!(conference.parent(), Some(organizer.clone()));
//! assert!(conference.is_descendant_of(&organizer));
//!
//! let websafe = conference.urlsafe();
//! assert_eq!(Key::from_urlsafe(&websafe).ok(), Some(conference));
//! ```

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Errors raised while decoding a websafe key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// The input is not valid URL-safe base64.
    #[error("Key is not valid base64: {0}")]
    Encoding(String),

    /// The decoded path is malformed.
    #[error("Malformed key path: {0}")]
    Malformed(String),
}

/// Identifier of one path element.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyId {
    /// Numeric id, usually allocated by the store.
    Int(i64),
    /// Application-chosen name (e.g. a user id).
    Name(String),
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(id) => write!(f, "#{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl From<i64> for KeyId {
    fn from(id: i64) -> Self {
        Self::Int(id)
    }
}

impl From<&str> for KeyId {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for KeyId {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

/// One `(kind, id)` step of a key path.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PathElement {
    /// Entity kind, e.g. `"Conference"`.
    pub kind: String,
    /// Id within the parent and kind.
    pub id: KeyId,
}

/// Hierarchical entity key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    path: Vec<PathElement>,
}

impl Key {
    /// Root key with an explicit id.
    #[must_use]
    pub fn root(kind: impl Into<String>, id: impl Into<KeyId>) -> Self {
        Self {
            path: vec![PathElement {
                kind: kind.into(),
                id: id.into(),
            }],
        }
    }

    /// Root key identified by a name.
    #[must_use]
    pub fn named(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::root(kind, KeyId::Name(name.into()))
    }

    /// Child key under `parent`.
    #[must_use]
    pub fn with_parent(parent: &Self, kind: impl Into<String>, id: impl Into<KeyId>) -> Self {
        let mut path = parent.path.clone();
        path.push(PathElement {
            kind: kind.into(),
            id: id.into(),
        });
        Self { path }
    }

    /// Kind of the entity this key names.
    #[must_use]
    pub fn kind(&self) -> &str {
        self.last().kind.as_str()
    }

    /// Id of the entity this key names.
    #[must_use]
    pub fn id(&self) -> &KeyId {
        &self.last().id
    }

    /// Full path, root first.
    #[must_use]
    pub fn path(&self) -> &[PathElement] {
        &self.path
    }

    /// Parent key, `None` for root keys.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.path.len() < 2 {
            return None;
        }
        Some(Self {
            path: self.path[..self.path.len() - 1].to_vec(),
        })
    }

    /// Root of the entity group this key belongs to.
    #[must_use]
    pub fn group(&self) -> Self {
        Self {
            path: self.path[..1].to_vec(),
        }
    }

    /// True when `ancestor` is a prefix of this key's path (a key counts as
    /// its own descendant, matching ancestor-query semantics).
    #[must_use]
    pub fn is_descendant_of(&self, ancestor: &Self) -> bool {
        self.path.starts_with(&ancestor.path)
    }

    /// Websafe string form.
    #[must_use]
    pub fn urlsafe(&self) -> String {
        let pairs: Vec<serde_json::Value> = self
            .path
            .iter()
            .map(|element| {
                let id = match &element.id {
                    KeyId::Int(id) => serde_json::Value::from(*id),
                    KeyId::Name(name) => serde_json::Value::from(name.as_str()),
                };
                serde_json::Value::Array(vec![element.kind.as_str().into(), id])
            })
            .collect();
        URL_SAFE_NO_PAD.encode(serde_json::Value::Array(pairs).to_string())
    }

    /// Parse a websafe key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError`] if the input is not base64 or does not decode to a
    /// well-formed, non-empty path.
    pub fn from_urlsafe(websafe: &str) -> Result<Self, KeyError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(websafe.trim())
            .map_err(|e| KeyError::Encoding(e.to_string()))?;
        let pairs: Vec<(String, serde_json::Value)> =
            serde_json::from_slice(&bytes).map_err(|e| KeyError::Malformed(e.to_string()))?;
        if pairs.is_empty() {
            return Err(KeyError::Malformed("empty path".to_string()));
        }

        let mut path = Vec::with_capacity(pairs.len());
        for (kind, id) in pairs {
            let id = match id {
                serde_json::Value::Number(n) => KeyId::Int(
                    n.as_i64()
                        .ok_or_else(|| KeyError::Malformed(format!("{kind}: {n}")))?,
                ),
                serde_json::Value::String(name) if !name.is_empty() => KeyId::Name(name),
                other => return Err(KeyError::Malformed(format!("{kind}: {other}"))),
            };
            if kind.is_empty() {
                return Err(KeyError::Malformed("empty kind".to_string()));
            }
            path.push(PathElement { kind, id });
        }
        Ok(Self { path })
    }

    #[allow(clippy::missing_const_for_fn)]
    fn last(&self) -> &PathElement {
        // Constructors never build an empty path.
        &self.path[self.path.len() - 1]
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, element) in self.path.iter().enumerate() {
            if index > 0 {
                f.write_str("/")?;
            }
            write!(f, "{}:{}", element.kind, element.id)?;
        }
        Ok(())
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.urlsafe())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let websafe = String::deserialize(deserializer)?;
        Self::from_urlsafe(&websafe).map_err(serde::de::Error::custom)
    }
}
