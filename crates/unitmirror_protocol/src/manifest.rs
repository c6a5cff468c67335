//! The `units.json` manifest.

use crate::error::{ProtocolError, ProtocolResult};
use crate::fingerprint::Fingerprint;
use crate::unit::{ContentUnit, Metadata, UnitIdentity, UnitKey};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Well-known manifest file name inside a published repository root.
pub const MANIFEST_FILENAME: &str = "units.json";

/// Directory holding content objects inside a published repository root.
pub const CONTENT_DIR: &str = "content";

/// One published unit.
///
/// Unknown fields are ignored when parsing so that older readers keep
/// working against newer publishers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Content type identifier.
    pub type_id: String,
    /// Type-specific key fields.
    pub unit_key: UnitKey,
    /// Opaque metadata.
    #[serde(default)]
    pub metadata: Metadata,
    /// Path of the content object relative to the repository root.
    pub relative_path: String,
}

impl ManifestEntry {
    /// Builds the entry for a unit stored under `fingerprint`.
    pub fn for_unit(unit: &ContentUnit, fingerprint: &Fingerprint) -> Self {
        Self {
            type_id: unit.type_id.clone(),
            unit_key: unit.unit_key.clone(),
            metadata: unit.metadata.clone(),
            relative_path: content_path(fingerprint),
        }
    }

    /// Returns the entry's unit identity.
    pub fn identity(&self) -> UnitIdentity {
        UnitIdentity::new(self.type_id.clone(), self.unit_key.clone())
    }

    /// Extracts the fingerprint from `relative_path`.
    ///
    /// The path must be exactly `content/<fingerprint>`.
    pub fn fingerprint(&self) -> ProtocolResult<Fingerprint> {
        let invalid = |reason: &str| ProtocolError::InvalidContentPath {
            path: self.relative_path.clone(),
            reason: reason.to_string(),
        };

        let mut parts = self.relative_path.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(CONTENT_DIR), Some(name), None) => {
                Fingerprint::from_hex(name).map_err(|_| invalid("not a fingerprint"))
            }
            _ => Err(invalid("expected content/<fingerprint>")),
        }
    }
}

/// Returns the repository-relative path of an object.
pub fn content_path(fingerprint: &Fingerprint) -> String {
    format!("{}/{}", CONTENT_DIR, fingerprint.to_hex())
}

/// The authoritative list of a repository's units.
///
/// A manifest is written wholesale on every publish and read wholesale on
/// every sync. Entries keep the order they were published in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Creates an empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a manifest from entries, validating it.
    pub fn from_entries(entries: Vec<ManifestEntry>) -> ProtocolResult<Self> {
        let manifest = Self { entries };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Parses and validates a manifest document.
    pub fn from_json(bytes: &[u8]) -> ProtocolResult<Self> {
        let entries: Vec<ManifestEntry> = serde_json::from_slice(bytes)
            .map_err(|e| ProtocolError::MalformedManifest(e.to_string()))?;
        Self::from_entries(entries)
    }

    /// Serializes the manifest.
    ///
    /// Output is deterministic for a given entry list.
    pub fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(&self.entries)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    /// Checks content paths and identity uniqueness.
    pub fn validate(&self) -> ProtocolResult<()> {
        let mut seen = HashSet::with_capacity(self.entries.len());
        for entry in &self.entries {
            entry.fingerprint()?;
            let identity = entry.identity();
            if !seen.insert(identity.clone()) {
                return Err(ProtocolError::DuplicateIdentity(identity.to_string()));
            }
        }
        Ok(())
    }

    /// Returns the entries.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Iterates entries in published order.
    pub fn iter(&self) -> std::slice::Iter<'_, ManifestEntry> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the manifest lists no units.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up an entry by identity.
    pub fn get(&self, identity: &UnitIdentity) -> Option<&ManifestEntry> {
        self.entries
            .iter()
            .find(|e| e.type_id == identity.type_id && e.unit_key == identity.unit_key)
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a ManifestEntry;
    type IntoIter = std::slice::Iter<'a, ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::KeyScalar;

    fn entry(n: i64, data: &[u8]) -> ManifestEntry {
        let unit = ContentUnit::new("rpm", UnitKey::new().with("N", n), "/unused");
        ManifestEntry::for_unit(&unit, &Fingerprint::compute(data))
    }

    #[test]
    fn entry_fingerprint_from_path() {
        let e = entry(0, b"zero");
        assert_eq!(e.fingerprint().unwrap(), Fingerprint::compute(b"zero"));
        assert!(e.relative_path.starts_with("content/"));
    }

    #[test]
    fn rejects_escaping_paths() {
        let mut e = entry(0, b"zero");
        e.relative_path = format!("../content/{}", Fingerprint::compute(b"zero"));
        assert!(e.fingerprint().is_err());

        e.relative_path = "content/not-hex".into();
        assert!(e.fingerprint().is_err());

        e.relative_path = format!("content/{}/extra", Fingerprint::compute(b"zero"));
        assert!(e.fingerprint().is_err());
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let fp = Fingerprint::compute(b"a");
        let doc = format!(
            r#"[{{"type_id":"rpm","unit_key":{{"N":1}},"metadata":{{}},"relative_path":"content/{}","publisher":"v9","size":1}}]"#,
            fp
        );
        let manifest = Manifest::from_json(doc.as_bytes()).unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest.entries()[0].fingerprint().unwrap(), fp);
    }

    #[test]
    fn metadata_defaults_to_empty() {
        let fp = Fingerprint::compute(b"a");
        let doc = format!(
            r#"[{{"type_id":"rpm","unit_key":{{"N":1}},"relative_path":"content/{}"}}]"#,
            fp
        );
        let manifest = Manifest::from_json(doc.as_bytes()).unwrap();
        assert!(manifest.entries()[0].metadata.is_empty());
    }

    #[test]
    fn malformed_documents_fail() {
        assert!(matches!(
            Manifest::from_json(b"{not json"),
            Err(ProtocolError::MalformedManifest(_))
        ));
        assert!(matches!(
            Manifest::from_json(br#"{"type_id":"rpm"}"#),
            Err(ProtocolError::MalformedManifest(_))
        ));
    }

    #[test]
    fn duplicate_identities_fail() {
        let entries = vec![entry(1, b"a"), entry(1, b"b")];
        assert!(matches!(
            Manifest::from_entries(entries),
            Err(ProtocolError::DuplicateIdentity(_))
        ));
    }

    #[test]
    fn serialization_is_deterministic() {
        let manifest = Manifest::from_entries(vec![entry(2, b"b"), entry(1, b"a")]).unwrap();
        let first = manifest.to_json().unwrap();
        let reparsed = Manifest::from_json(&first).unwrap();
        assert_eq!(reparsed.to_json().unwrap(), first);
        assert_eq!(
            reparsed.entries()[0].unit_key.get("N"),
            Some(&KeyScalar::Integer(2))
        );
    }

    #[test]
    fn lookup_by_identity() {
        let manifest = Manifest::from_entries(vec![entry(1, b"a"), entry(2, b"b")]).unwrap();
        let id = UnitIdentity::new("rpm", UnitKey::new().with("N", 2i64));
        assert_eq!(
            manifest.get(&id).unwrap().fingerprint().unwrap(),
            Fingerprint::compute(b"b")
        );
        assert!(manifest
            .get(&UnitIdentity::new("rpm", UnitKey::new().with("N", 3i64)))
            .is_none());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    proptest! {
        #[test]
        fn every_distinct_identity_is_found(ns in prop::collection::btree_set(any::<i64>(), 0..32)) {
            let entries: Vec<ManifestEntry> = ns
                .iter()
                .map(|n| {
                    let unit = ContentUnit::new("rpm", UnitKey::new().with("N", *n), "/unused");
                    ManifestEntry::for_unit(&unit, &Fingerprint::compute(&n.to_le_bytes()))
                })
                .collect();
            let manifest = Manifest::from_entries(entries).unwrap();
            prop_assert_eq!(manifest.len(), ns.len());

            let found: BTreeSet<i64> = ns
                .iter()
                .filter(|n| manifest.get(&UnitIdentity::new("rpm", UnitKey::new().with("N", **n))).is_some())
                .copied()
                .collect();
            prop_assert_eq!(found, ns);
        }
    }
}
