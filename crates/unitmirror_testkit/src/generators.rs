//! Property-based test generators using proptest.
//!
//! Unit names produced here are valid file names, so generated unit sets
//! can be written through [`crate::TestUpstream`] directly.

use proptest::prelude::*;
use std::collections::BTreeMap;
use unitmirror_protocol::{KeyScalar, Metadata, UnitIdentity, UnitKey};

/// Strategy for generating key scalars of every supported kind.
pub fn key_scalar_strategy() -> impl Strategy<Value = KeyScalar> {
    prop_oneof![
        any::<bool>().prop_map(KeyScalar::Bool),
        any::<i64>().prop_map(KeyScalar::Integer),
        "[a-z0-9._-]{0,12}".prop_map(KeyScalar::Text),
    ]
}

/// Strategy for generating unit keys with one to four fields.
pub fn unit_key_strategy() -> impl Strategy<Value = UnitKey> {
    prop::collection::btree_map("[a-z]{1,8}", key_scalar_strategy(), 1..5).prop_map(|fields| {
        let mut key = UnitKey::new();
        for (name, value) in fields {
            key.insert(name, value);
        }
        key
    })
}

/// Strategy for generating unit type ids.
pub fn type_id_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("rpm".to_string()),
        Just("srpm".to_string()),
        Just("erratum".to_string()),
        "[a-z]{3,10}",
    ]
}

/// Strategy for generating unit identities.
pub fn unit_identity_strategy() -> impl Strategy<Value = UnitIdentity> {
    (type_id_strategy(), unit_key_strategy())
        .prop_map(|(type_id, unit_key)| UnitIdentity::new(type_id, unit_key))
}

/// Strategy for generating small metadata maps.
pub fn metadata_strategy() -> impl Strategy<Value = Metadata> {
    prop::collection::btree_map("[a-z]{1,8}", "[ -~]{0,16}", 0..4).prop_map(|fields| {
        fields
            .into_iter()
            .map(|(k, v)| (k, serde_json::Value::String(v)))
            .collect()
    })
}

/// Strategy for generating valid repository ids.
pub fn repo_id_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_-]{0,15}"
}

/// Strategy for generating unit content.
pub fn content_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..256)
}

/// Strategy for a set of named units: distinct names mapped to content.
///
/// Content is drawn from a small pool so that some units share bytes.
pub fn unit_set_strategy(max_units: usize) -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
    let pool = prop::collection::vec(content_strategy(), 1..4);
    pool.prop_flat_map(move |pool| {
        let len = pool.len();
        prop::collection::btree_map("[a-z]{1,6}", 0..len, 0..=max_units).prop_map(
            move |picks| {
                picks
                    .into_iter()
                    .map(|(name, index)| (name, pool[index].clone()))
                    .collect()
            },
        )
    })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for filesystem-heavy tests.
    #[must_use]
    pub fn io_bound() -> Self {
        Self {
            cases: 12,
            max_shrink_iters: 50,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unitmirror_protocol::validate_repo_id;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn unit_keys_are_never_empty(key in unit_key_strategy()) {
            prop_assert!(!key.is_empty());
        }

        #[test]
        fn identity_survives_json(identity in unit_identity_strategy()) {
            let json = serde_json::to_string(&identity).unwrap();
            let back: UnitIdentity = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(back, identity);
        }

        #[test]
        fn repo_ids_are_valid(repo_id in repo_id_strategy()) {
            prop_assert!(validate_repo_id(&repo_id).is_ok());
        }

        #[test]
        fn unit_sets_respect_bound(units in unit_set_strategy(6)) {
            prop_assert!(units.len() <= 6);
        }
    }
}
