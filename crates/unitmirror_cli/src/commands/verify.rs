//! Verify command implementation.

use super::{print_json, CommandResult};
use std::path::Path;
use unitmirror_engine::LocalMirrors;

/// Runs the verify command, optionally deleting orphaned objects.
pub fn run(root: &Path, sweep: bool) -> CommandResult {
    let mirrors = LocalMirrors::open(root)?;
    let report = mirrors.verify(sweep)?;
    print_json(&report)?;

    if !report.is_healthy() {
        return Err(format!(
            "verification failed: {} corrupt, {} missing",
            report.corrupt.len(),
            report.missing.len()
        )
        .into());
    }
    Ok(())
}
