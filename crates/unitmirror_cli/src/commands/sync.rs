//! Sync command implementation.

use super::{print_json, CommandResult};
use std::path::Path;
use std::sync::Arc;
use unitmirror_engine::{EngineConfig, LocalMirrors, SchemeTransport, SyncCoordinator};
use unitmirror_protocol::MirrorSource;

/// Runs the sync command, creating the mirror first if it does not exist.
pub fn run(root: &Path, repo_id: &str, manifest_url: &str, config: EngineConfig) -> CommandResult {
    let mirrors = Arc::new(LocalMirrors::open(root)?);
    if !mirrors.exists(repo_id) {
        let source = MirrorSource::from_manifest_url(manifest_url)?;
        mirrors.create(repo_id, Some(source))?;
    }

    let transport = Arc::new(SchemeTransport::new(&config)?);
    let coordinator = SyncCoordinator::new(mirrors, transport, config);
    let result = coordinator.sync(repo_id, manifest_url);
    print_json(&result)?;

    if !result.succeeded {
        return Err(format!("sync of {} failed", repo_id).into());
    }
    Ok(())
}
