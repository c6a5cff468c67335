//! Synchronization and reconciliation reports.
//!
//! Reports are plain data: they hold no handles and serialize to JSON so
//! they can cross a process or RPC boundary unchanged.

use crate::error::ProtocolResult;
use crate::unit::UnitIdentity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A per-unit failure recorded during a sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitError {
    /// The unit that failed.
    pub unit: UnitIdentity,
    /// Human readable failure description.
    pub message: String,
}

/// Outcome of synchronizing one repository.
///
/// `succeeded` is true whenever the manifest was obtained and parsed, even
/// if individual units failed; those failures are listed in `errors`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResult {
    /// Repository that was synchronized.
    pub repo_id: String,
    /// Whether the sync ran to completion.
    pub succeeded: bool,
    /// Number of units added.
    pub added_count: usize,
    /// Number of units removed.
    pub removed_count: usize,
    /// Units added locally.
    pub added: Vec<UnitIdentity>,
    /// Units removed locally.
    pub removed: Vec<UnitIdentity>,
    /// Per-unit failures.
    pub errors: Vec<UnitError>,
    /// Units present on both sides whose metadata differs upstream.
    ///
    /// These are not re-fetched: identity alone decides what is transferred.
    #[serde(default)]
    pub metadata_drift: Vec<UnitIdentity>,
    /// Why the sync aborted, if it did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
}

impl SyncResult {
    /// Starts a result for a sync that obtained its manifest.
    pub fn started(repo_id: impl Into<String>) -> Self {
        Self {
            repo_id: repo_id.into(),
            succeeded: true,
            added_count: 0,
            removed_count: 0,
            added: Vec::new(),
            removed: Vec::new(),
            errors: Vec::new(),
            metadata_drift: Vec::new(),
            exception: None,
        }
    }

    /// A result for a sync that aborted before touching local state.
    pub fn aborted(repo_id: impl Into<String>, exception: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            exception: Some(exception.into()),
            ..Self::started(repo_id)
        }
    }

    /// Records an added unit.
    pub fn record_added(&mut self, unit: UnitIdentity) {
        self.added.push(unit);
        self.added_count = self.added.len();
    }

    /// Records a removed unit.
    pub fn record_removed(&mut self, unit: UnitIdentity) {
        self.removed.push(unit);
        self.removed_count = self.removed.len();
    }

    /// Records a per-unit failure.
    pub fn record_error(&mut self, unit: UnitIdentity, message: impl Into<String>) {
        self.errors.push(UnitError {
            unit,
            message: message.into(),
        });
    }

    /// Marks the sync as failed after local state was touched.
    pub fn fail(&mut self, exception: impl Into<String>) {
        self.succeeded = false;
        self.exception = Some(exception.into());
    }

    /// Returns true if the sync completed without any per-unit failures.
    pub fn is_clean(&self) -> bool {
        self.succeeded && self.errors.is_empty()
    }
}

/// Which repositories a reconciliation created, refreshed and removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReport {
    /// Newly created mirrors.
    pub added: Vec<String>,
    /// Existing mirrors that were refreshed.
    pub merged: Vec<String>,
    /// Mirrors that were removed.
    pub removed: Vec<String>,
}

/// Aggregated outcome of one reconciliation pass.
///
/// `succeeded` reflects only reconciliation-level failures (local working
/// state could not be created or removed, invalid options). A repository
/// whose sync failed is reported through `synchronization[repo_id]` and
/// does not flip it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Whether the pass completed without reconciliation-level errors.
    pub succeeded: bool,
    /// Mirror lifecycle changes.
    pub merge: MergeReport,
    /// Per-repository sync results for created and refreshed mirrors.
    pub synchronization: BTreeMap<String, SyncResult>,
    /// Reconciliation-level errors.
    pub errors: Vec<String>,
}

impl ReconciliationReport {
    /// Returns repositories whose sync did not succeed.
    pub fn failed_repos(&self) -> Vec<&str> {
        self.synchronization
            .iter()
            .filter(|(_, r)| !r.succeeded)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Returns true if every level succeeded and no unit failed.
    pub fn is_clean(&self) -> bool {
        self.succeeded && self.synchronization.values().all(SyncResult::is_clean)
    }

    /// Serializes the report as pretty JSON.
    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::UnitKey;

    fn id(n: i64) -> UnitIdentity {
        UnitIdentity::new("rpm", UnitKey::new().with("N", n))
    }

    #[test]
    fn counts_follow_lists() {
        let mut result = SyncResult::started("repo");
        result.record_added(id(1));
        result.record_added(id(2));
        result.record_removed(id(3));
        result.record_error(id(4), "no route to host");

        assert!(result.succeeded);
        assert_eq!(result.added_count, 2);
        assert_eq!(result.removed_count, 1);
        assert_eq!(result.errors.len(), 1);
        assert!(!result.is_clean());
    }

    #[test]
    fn aborted_result() {
        let result = SyncResult::aborted("repo", "connection refused");
        assert!(!result.succeeded);
        assert_eq!(result.added_count, 0);
        assert_eq!(result.removed_count, 0);
        assert_eq!(result.exception.as_deref(), Some("connection refused"));
    }

    #[test]
    fn report_serializes_without_handles() {
        let mut report = ReconciliationReport {
            succeeded: true,
            ..Default::default()
        };
        report.merge.added.push("a".into());
        report
            .synchronization
            .insert("a".into(), SyncResult::aborted("a", "boom"));

        let json = report.to_json().unwrap();
        let back: ReconciliationReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
        assert_eq!(back.failed_repos(), vec!["a"]);
        assert!(!back.is_clean());
    }

    #[test]
    fn exception_omitted_when_absent() {
        let value = serde_json::to_value(SyncResult::started("r")).unwrap();
        assert!(value.get("exception").is_none());
        assert_eq!(value["added_count"], 0);
    }
}
