//! Bind reconciler.
//!
//! Converges the locally mirrored repositories toward a desired binding set.
//! Each repository is handled as one action (create, refresh or delete) and
//! actions for different repositories run in parallel on a bounded pool.
//! Work on one repository is serialized by its mirror lock, and shared
//! objects are only deleted through the reference-counted content pool.

use crate::config::EngineConfig;
use crate::coordinator::SyncCoordinator;
use crate::error::{EngineResult, SyncError};
use crate::mirror::LocalMirrors;
use crate::pool::run_bounded;
use crate::transport::Transport;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use unitmirror_protocol::{
    validate_repo_id, Binding, ReconcileOptions, ReconciliationReport, SyncResult,
};

enum Action {
    Create(Binding),
    Refresh(Binding),
    Delete(String),
}

impl Action {
    fn repo_id(&self) -> &str {
        match self {
            Action::Create(b) | Action::Refresh(b) => &b.repo_id,
            Action::Delete(repo_id) => repo_id,
        }
    }
}

enum Outcome {
    Created(SyncResult),
    Refreshed(SyncResult),
    Deleted,
    Failed(SyncError),
}

/// Drives create, refresh and delete for every bound repository.
#[derive(Debug)]
pub struct BindReconciler {
    mirrors: Arc<LocalMirrors>,
    coordinator: SyncCoordinator,
    workers: usize,
}

impl BindReconciler {
    /// Creates a reconciler over local mirrors and a transport.
    pub fn new(
        mirrors: Arc<LocalMirrors>,
        transport: Arc<dyn Transport>,
        config: EngineConfig,
    ) -> Self {
        let workers = config.workers;
        Self {
            coordinator: SyncCoordinator::new(Arc::clone(&mirrors), transport, config),
            mirrors,
            workers,
        }
    }

    /// Returns the sync coordinator used for create and refresh.
    pub fn coordinator(&self) -> &SyncCoordinator {
        &self.coordinator
    }

    /// Runs one reconciliation pass.
    ///
    /// Always returns a report. `succeeded` is false only when a
    /// reconciliation-level error occurred; a repository whose sync failed
    /// is visible in `synchronization` instead.
    pub fn reconcile(
        &self,
        desired: &[Binding],
        options: &ReconcileOptions,
    ) -> ReconciliationReport {
        let mut report = ReconciliationReport::default();

        if let Err(e) = options.validate() {
            report.errors.push(SyncError::InvalidOptions(e.to_string()).to_string());
            return report;
        }

        let current: BTreeSet<String> = match self.mirrors.repo_ids() {
            Ok(ids) => ids.into_iter().filter(|id| options.selects(id)).collect(),
            Err(e) => {
                report.errors.push(e.to_string());
                return report;
            }
        };

        let mut wanted: BTreeMap<String, Binding> = BTreeMap::new();
        for binding in desired {
            if !options.selects(&binding.repo_id) {
                continue;
            }
            if let Err(e) = validate_repo_id(&binding.repo_id) {
                report
                    .errors
                    .push(SyncError::reconciliation(&binding.repo_id, e).to_string());
                continue;
            }
            if wanted.contains_key(&binding.repo_id) {
                tracing::warn!(
                    repo_id = %binding.repo_id,
                    consumer_id = %binding.consumer_id,
                    "duplicate binding ignored"
                );
                continue;
            }
            wanted.insert(binding.repo_id.clone(), binding.clone());
        }

        let actions = plan(wanted, &current);
        tracing::info!(
            actions = actions.len(),
            current = current.len(),
            "starting reconciliation"
        );

        let outcomes = run_bounded(actions, self.workers, |action| {
            let repo_id = action.repo_id().to_string();
            (repo_id, self.apply(action))
        });

        for (repo_id, outcome) in outcomes {
            match outcome {
                Outcome::Created(result) => {
                    report.merge.added.push(repo_id.clone());
                    report.synchronization.insert(repo_id, result);
                }
                Outcome::Refreshed(result) => {
                    report.merge.merged.push(repo_id.clone());
                    report.synchronization.insert(repo_id, result);
                }
                Outcome::Deleted => report.merge.removed.push(repo_id),
                Outcome::Failed(e) => {
                    tracing::error!(repo_id, error = %e, "reconciliation action failed");
                    report.errors.push(e.to_string());
                }
            }
        }

        report.succeeded = report.errors.is_empty();
        tracing::info!(
            added = report.merge.added.len(),
            merged = report.merge.merged.len(),
            removed = report.merge.removed.len(),
            errors = report.errors.len(),
            "reconciliation complete"
        );
        report
    }

    fn apply(&self, action: Action) -> Outcome {
        match action {
            Action::Create(binding) => {
                match self
                    .mirrors
                    .create(&binding.repo_id, Some(binding.distributor_config.clone()))
                {
                    Ok(_) => Outcome::Created(self.sync(&binding)),
                    Err(e) => Outcome::Failed(e),
                }
            }
            Action::Refresh(binding) => Outcome::Refreshed(self.sync(&binding)),
            Action::Delete(repo_id) => match self.delete(&repo_id) {
                Ok(()) => Outcome::Deleted,
                Err(e) => Outcome::Failed(e),
            },
        }
    }

    fn sync(&self, binding: &Binding) -> SyncResult {
        self.coordinator
            .sync(&binding.repo_id, &binding.distributor_config.manifest_url)
    }

    fn delete(&self, repo_id: &str) -> EngineResult<()> {
        let _lock = self.mirrors.lock(repo_id)?;
        self.mirrors.destroy(repo_id)?;
        Ok(())
    }
}

/// Orders actions by repository id: creates and refreshes for every wanted
/// binding, deletes for every current mirror no longer wanted.
fn plan(wanted: BTreeMap<String, Binding>, current: &BTreeSet<String>) -> Vec<Action> {
    let mut actions: Vec<Action> = current
        .iter()
        .filter(|id| !wanted.contains_key(*id))
        .map(|id| Action::Delete(id.clone()))
        .collect();
    actions.extend(wanted.into_iter().map(|(repo_id, binding)| {
        if current.contains(&repo_id) {
            Action::Refresh(binding)
        } else {
            Action::Create(binding)
        }
    }));
    actions.sort_by(|a, b| a.repo_id().cmp(b.repo_id()));
    actions
}
