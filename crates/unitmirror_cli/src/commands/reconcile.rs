//! Reconcile command implementation.

use super::{print_json, CommandResult};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use unitmirror_engine::{BindReconciler, EngineConfig, LocalMirrors, SchemeTransport};
use unitmirror_protocol::{Binding, ReconcileOptions};

/// Runs the reconcile command.
///
/// `bindings_file` holds a JSON array of bindings. The command fails if the
/// pass failed or any repository's sync aborted.
pub fn run(
    root: &Path,
    bindings_file: &Path,
    options: ReconcileOptions,
    config: EngineConfig,
) -> CommandResult {
    let data = fs::read(bindings_file)
        .map_err(|e| format!("cannot read {}: {}", bindings_file.display(), e))?;
    let bindings: Vec<Binding> = serde_json::from_slice(&data)
        .map_err(|e| format!("invalid bindings file {}: {}", bindings_file.display(), e))?;

    let mirrors = Arc::new(LocalMirrors::open(root)?);
    let transport = Arc::new(SchemeTransport::new(&config)?);
    let reconciler = BindReconciler::new(mirrors, transport, config);
    let report = reconciler.reconcile(&bindings, &options);
    print_json(&report)?;

    let failed = report.failed_repos();
    if !report.succeeded {
        return Err(format!("reconciliation failed: {}", report.errors.join("; ")).into());
    }
    if !failed.is_empty() {
        return Err(format!("sync failed for {}", failed.join(", ")).into());
    }
    Ok(())
}
