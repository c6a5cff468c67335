//! Content units and their identities.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// Opaque, type-specific unit metadata.
///
/// Backed by a sorted map so serialization is deterministic.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// A scalar value inside a unit key.
///
/// Floating point values are deliberately not representable: a unit key is
/// compared for exact equality, and floats do not have a total equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyScalar {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Integer(i64),
    /// Text value.
    Text(String),
}

impl fmt::Display for KeyScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyScalar::Bool(b) => write!(f, "{}", b),
            KeyScalar::Integer(i) => write!(f, "{}", i),
            KeyScalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for KeyScalar {
    fn from(s: &str) -> Self {
        KeyScalar::Text(s.to_string())
    }
}

impl From<String> for KeyScalar {
    fn from(s: String) -> Self {
        KeyScalar::Text(s)
    }
}

impl From<i64> for KeyScalar {
    fn from(i: i64) -> Self {
        KeyScalar::Integer(i)
    }
}

impl From<bool> for KeyScalar {
    fn from(b: bool) -> Self {
        KeyScalar::Bool(b)
    }
}

/// An ordered mapping of key name to scalar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitKey(BTreeMap<String, KeyScalar>);

impl UnitKey {
    /// Creates an empty key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field, returning the key for chaining.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<KeyScalar>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Sets a field.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<KeyScalar>) {
        self.0.insert(name.into(), value.into());
    }

    /// Returns a field by name.
    pub fn get(&self, name: &str) -> Option<&KeyScalar> {
        self.0.get(name)
    }

    /// Iterates fields in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &KeyScalar)> {
        self.0.iter()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the key has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, KeyScalar)> for UnitKey {
    fn from_iter<I: IntoIterator<Item = (String, KeyScalar)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The logical identity of a unit: its type plus its key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitIdentity {
    /// Content type identifier (e.g. `rpm`).
    pub type_id: String,
    /// Type-specific key fields.
    pub unit_key: UnitKey,
}

impl UnitIdentity {
    /// Creates a new identity.
    pub fn new(type_id: impl Into<String>, unit_key: UnitKey) -> Self {
        Self {
            type_id: type_id.into(),
            unit_key,
        }
    }
}

impl fmt::Display for UnitIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{{", self.type_id)?;
        for (i, (name, value)) in self.unit_key.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        f.write_str("}")
    }
}

/// A unit of content as held by an upstream repository.
///
/// Units are immutable once published: the same identity is never expected
/// to carry different bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentUnit {
    /// Content type identifier.
    pub type_id: String,
    /// Type-specific key fields.
    pub unit_key: UnitKey,
    /// Opaque metadata, published verbatim.
    #[serde(default)]
    pub metadata: Metadata,
    /// Where the unit's bytes live on the publishing node.
    pub storage_path: PathBuf,
}

impl ContentUnit {
    /// Creates a unit with empty metadata.
    pub fn new(type_id: impl Into<String>, unit_key: UnitKey, storage_path: impl Into<PathBuf>) -> Self {
        Self {
            type_id: type_id.into(),
            unit_key,
            metadata: Metadata::new(),
            storage_path: storage_path.into(),
        }
    }

    /// Sets the metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Returns the unit's identity.
    pub fn identity(&self) -> UnitIdentity {
        UnitIdentity::new(self.type_id.clone(), self.unit_key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_display() {
        let key = UnitKey::new().with("name", "zsh").with("epoch", 0i64);
        let id = UnitIdentity::new("rpm", key);
        assert_eq!(id.to_string(), "rpm:{epoch=0,name=zsh}");
    }

    #[test]
    fn identity_equality_is_exact() {
        let a = UnitIdentity::new("rpm", UnitKey::new().with("N", 1i64));
        let b = UnitIdentity::new("rpm", UnitKey::new().with("N", "1"));
        assert_ne!(a, b);

        let c = UnitIdentity::new("rpm", UnitKey::new().with("N", 1i64));
        assert_eq!(a, c);
    }

    #[test]
    fn key_json_is_a_plain_object() {
        let key = UnitKey::new().with("A", "a").with("N", 3i64).with("ok", true);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"{"A":"a","N":3,"ok":true}"#);

        let back: UnitKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }

    #[test]
    fn float_key_values_are_rejected() {
        let result: Result<UnitKey, _> = serde_json::from_str(r#"{"v": 1.5}"#);
        assert!(result.is_err());
    }

    #[test]
    fn unit_identity_ignores_metadata() {
        let mut metadata = Metadata::new();
        metadata.insert("size".into(), serde_json::json!(12));
        let unit = ContentUnit::new("rpm", UnitKey::new().with("N", 0i64), "/tmp/x")
            .with_metadata(metadata);
        let plain = ContentUnit::new("rpm", UnitKey::new().with("N", 0i64), "/tmp/y");
        assert_eq!(unit.identity(), plain.identity());
    }
}
