//! Manifest differ.
//!
//! Identity alone decides what is transferred: a unit present on both sides
//! is never re-fetched, even if its metadata changed upstream. Such units are
//! reported separately by [`metadata_drift`].

use std::collections::{BTreeSet, HashSet};
use unitmirror_protocol::{Manifest, ManifestEntry, Metadata, UnitIdentity};

/// Add and remove sets between a remote manifest and local state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManifestDiff {
    /// Remote entries whose identity is absent locally, in manifest order.
    pub to_add: Vec<ManifestEntry>,
    /// Local identities absent from the remote manifest, sorted.
    pub to_remove: Vec<UnitIdentity>,
}

impl ManifestDiff {
    /// Returns true if there is nothing to add or remove.
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Computes `to_add = remote - local` and `to_remove = local - remote`.
pub fn diff(remote: &Manifest, local: &BTreeSet<UnitIdentity>) -> ManifestDiff {
    let remote_ids: HashSet<UnitIdentity> = remote.iter().map(ManifestEntry::identity).collect();

    let to_add = remote
        .iter()
        .filter(|entry| !local.contains(&entry.identity()))
        .cloned()
        .collect();
    let to_remove = local
        .iter()
        .filter(|id| !remote_ids.contains(*id))
        .cloned()
        .collect();

    ManifestDiff { to_add, to_remove }
}

/// Identities held on both sides whose metadata differs, sorted.
pub fn metadata_drift<'a, I>(remote: &Manifest, local: I) -> Vec<UnitIdentity>
where
    I: IntoIterator<Item = (&'a UnitIdentity, &'a Metadata)>,
{
    let mut drifted: Vec<UnitIdentity> = local
        .into_iter()
        .filter(|(id, metadata)| {
            remote
                .get(id)
                .is_some_and(|entry| &entry.metadata != *metadata)
        })
        .map(|(id, _)| id.clone())
        .collect();
    drifted.sort();
    drifted
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use unitmirror_protocol::{content_path, Fingerprint, UnitKey};

    fn id(name: &str) -> UnitIdentity {
        UnitIdentity::new("rpm", UnitKey::new().with("name", name))
    }

    fn entry(name: &str) -> ManifestEntry {
        ManifestEntry {
            type_id: "rpm".into(),
            unit_key: UnitKey::new().with("name", name),
            metadata: Metadata::new(),
            relative_path: content_path(&Fingerprint::compute(name.as_bytes())),
        }
    }

    fn manifest(names: &[&str]) -> Manifest {
        Manifest::from_entries(names.iter().map(|n| entry(n)).collect()).unwrap()
    }

    #[test]
    fn empty_local_adds_everything() {
        let remote = manifest(&["a", "b", "c"]);
        let result = diff(&remote, &BTreeSet::new());
        assert_eq!(result.to_add.len(), 3);
        assert!(result.to_remove.is_empty());
    }

    #[test]
    fn identical_sides_are_empty() {
        let remote = manifest(&["a", "b"]);
        let local = [id("a"), id("b")].into_iter().collect();
        assert!(diff(&remote, &local).is_empty());
    }

    #[test]
    fn mixed_changes() {
        let remote = manifest(&["a", "c"]);
        let local = [id("a"), id("b")].into_iter().collect();
        let result = diff(&remote, &local);
        assert_eq!(result.to_add, vec![entry("c")]);
        assert_eq!(result.to_remove, vec![id("b")]);
    }

    #[test]
    fn key_type_matters() {
        let remote = Manifest::from_entries(vec![ManifestEntry {
            unit_key: UnitKey::new().with("epoch", 0i64),
            ..entry("x")
        }])
        .unwrap();
        let local = [UnitIdentity::new("rpm", UnitKey::new().with("epoch", "0"))]
            .into_iter()
            .collect();
        let result = diff(&remote, &local);
        assert_eq!(result.to_add.len(), 1);
        assert_eq!(result.to_remove.len(), 1);
    }

    #[test]
    fn metadata_changes_are_drift_not_adds() {
        let mut changed = entry("a");
        changed.metadata.insert("summary".into(), json!("new"));
        let remote = Manifest::from_entries(vec![changed, entry("b")]).unwrap();

        let mut old = Metadata::new();
        old.insert("summary".into(), json!("old"));
        let local: BTreeMap<UnitIdentity, Metadata> =
            [(id("a"), old), (id("b"), Metadata::new())].into_iter().collect();

        let ids: BTreeSet<_> = local.keys().cloned().collect();
        assert!(diff(&remote, &ids).is_empty());
        assert_eq!(metadata_drift(&remote, &local), vec![id("a")]);
    }

    proptest! {
        #[test]
        fn diff_is_set_difference(
            remote in prop::collection::btree_set("[a-f]{1,2}", 0..12),
            local in prop::collection::btree_set("[a-f]{1,2}", 0..12),
        ) {
            let names: Vec<&str> = remote.iter().map(String::as_str).collect();
            let manifest = manifest(&names);
            let local_ids: BTreeSet<UnitIdentity> = local.iter().map(|n| id(n)).collect();
            let remote_ids: BTreeSet<UnitIdentity> = remote.iter().map(|n| id(n)).collect();

            let result = diff(&manifest, &local_ids);
            let added: BTreeSet<UnitIdentity> = result.to_add.iter().map(ManifestEntry::identity).collect();
            let removed: BTreeSet<UnitIdentity> = result.to_remove.iter().cloned().collect();

            let expected_add: BTreeSet<UnitIdentity> = remote_ids.difference(&local_ids).cloned().collect();
            let expected_remove: BTreeSet<UnitIdentity> = local_ids.difference(&remote_ids).cloned().collect();
            prop_assert_eq!(&added, &expected_add);
            prop_assert_eq!(&removed, &expected_remove);
            prop_assert!(added.is_disjoint(&removed));
        }
    }
}
