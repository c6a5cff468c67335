//! Sync coordinator.
//!
//! Synchronizes one repository mirror against its upstream manifest:
//!
//! 1. Fetch and parse the manifest. Any failure here aborts the sync
//!    before local state is touched.
//! 2. Diff the manifest against the mirror's unit identities.
//! 3. Fetch missing content with bounded parallelism. A failed object is
//!    recorded and skipped; the sync continues.
//! 4. Drop units no longer published, releasing their objects.
//! 5. Persist the mirror.
//!
//! Every path produces a [`SyncResult`]; no error escapes.

use crate::config::EngineConfig;
use crate::diff::{diff, metadata_drift};
use crate::error::{EngineResult, SyncError};
use crate::mirror::{LocalMirrors, MirroredUnit};
use crate::pool::run_bounded;
use crate::transport::{parse_location, repo_base, Transport};
use std::sync::Arc;
use std::thread;
use unitmirror_protocol::{
    Fingerprint, Manifest, ManifestEntry, MirrorSource, SyncResult, CONTENT_DIR,
};
use unitmirror_store::StoreError;
use url::Url;

/// Drives the synchronization of individual repositories.
pub struct SyncCoordinator {
    mirrors: Arc<LocalMirrors>,
    transport: Arc<dyn Transport>,
    config: EngineConfig,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("mirrors", &self.mirrors)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SyncCoordinator {
    /// Creates a coordinator over local mirrors and a transport.
    pub fn new(
        mirrors: Arc<LocalMirrors>,
        transport: Arc<dyn Transport>,
        config: EngineConfig,
    ) -> Self {
        Self {
            mirrors,
            transport,
            config,
        }
    }

    /// Returns the local mirrors.
    pub fn mirrors(&self) -> &Arc<LocalMirrors> {
        &self.mirrors
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Synchronizes the existing mirror `repo_id` from `manifest_url`.
    ///
    /// The mirror must already exist; see [`LocalMirrors::create`].
    pub fn sync(&self, repo_id: &str, manifest_url: &str) -> SyncResult {
        let _lock = match self.mirrors.lock(repo_id) {
            Ok(lock) => lock,
            Err(e) => return SyncResult::aborted(repo_id, e.to_string()),
        };

        let (location, manifest) = match self.fetch_manifest(manifest_url) {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::warn!(repo_id, url = manifest_url, error = %e, "sync aborted");
                return SyncResult::aborted(repo_id, e.to_string());
            }
        };
        let base = match repo_base(&location) {
            Ok(base) => base,
            Err(e) => return SyncResult::aborted(repo_id, e.to_string()),
        };

        let mut mirror = match self.mirrors.load(repo_id) {
            Ok(mirror) => mirror,
            Err(e) => return SyncResult::aborted(repo_id, e.to_string()),
        };

        let delta = diff(&manifest, &mirror.unit_identities());
        let mut result = SyncResult::started(repo_id);
        result.metadata_drift = metadata_drift(
            &manifest,
            mirror.units().map(|(id, unit)| (id, &unit.metadata)),
        );
        if !result.metadata_drift.is_empty() {
            tracing::info!(
                repo_id,
                count = result.metadata_drift.len(),
                "metadata changed upstream for held units; not re-fetched"
            );
        }
        tracing::debug!(
            repo_id,
            to_add = delta.to_add.len(),
            to_remove = delta.to_remove.len(),
            "computed manifest diff"
        );

        let fetched = run_bounded(delta.to_add, self.config.fetch_concurrency, |entry| {
            let outcome = self.fetch_unit(repo_id, &base, &entry);
            (entry, outcome)
        });
        let mut acquired = Vec::new();
        for (entry, outcome) in fetched {
            let identity = entry.identity();
            match outcome {
                Ok(fingerprint) => {
                    mirror.insert(MirroredUnit::from_entry(&entry, fingerprint));
                    acquired.push(fingerprint);
                    result.record_added(identity);
                }
                Err(cause) => {
                    let e = SyncError::object_fetch(&identity, &cause);
                    tracing::warn!(repo_id, kind = ?cause.kind(), error = %e, "content fetch failed");
                    result.record_error(identity, e.to_string());
                }
            }
        }

        let removed: Vec<MirroredUnit> = delta
            .to_remove
            .iter()
            .filter_map(|identity| mirror.remove(identity))
            .collect();

        if mirror.source().map(|s| s.manifest_url.as_str()) != Some(manifest_url) {
            if let Ok(source) = MirrorSource::from_manifest_url(manifest_url) {
                mirror.set_source(source);
            }
        }

        if let Err(e) = self.mirrors.save(&mirror) {
            tracing::error!(repo_id, error = %e, "failed to save mirror state");
            // The saved state never names these objects; drop the references taken for them.
            for fingerprint in &acquired {
                if let Err(e) = self.mirrors.pool().release(repo_id, fingerprint) {
                    tracing::warn!(
                        repo_id,
                        %fingerprint,
                        error = %e,
                        "unsaved object could not be deleted"
                    );
                }
            }
            result.fail(format!("failed to save mirror state: {}", e));
            return result;
        }

        for unit in removed {
            if let Err(e) = self.mirrors.pool().release(repo_id, &unit.fingerprint) {
                tracing::warn!(
                    repo_id,
                    fingerprint = %unit.fingerprint,
                    error = %e,
                    "released object could not be deleted"
                );
            }
            result.record_removed(unit.identity());
        }

        tracing::info!(
            repo_id,
            added = result.added_count,
            removed = result.removed_count,
            errors = result.errors.len(),
            "sync complete"
        );
        result
    }

    fn fetch_manifest(&self, manifest_url: &str) -> EngineResult<(Url, Manifest)> {
        let location = parse_location(manifest_url)?;
        let bytes = self.transport.fetch(&location)?;
        let manifest = Manifest::from_json(&bytes).map_err(|e| SyncError::ManifestFormat {
            url: manifest_url.to_string(),
            message: e.to_string(),
        })?;
        Ok((location, manifest))
    }

    /// Makes one unit's content available locally, referenced by `repo_id`.
    fn fetch_unit(&self, repo_id: &str, base: &Url, entry: &ManifestEntry) -> EngineResult<Fingerprint> {
        let fingerprint = entry.fingerprint()?;
        let pool = self.mirrors.pool();
        if pool.link_existing(repo_id, &fingerprint)? {
            tracing::trace!(repo_id, %fingerprint, "object already held");
            return Ok(fingerprint);
        }

        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            match self.transfer(base, &fingerprint) {
                Ok(staged) => {
                    pool.commit(repo_id, staged)?;
                    return Ok(fingerprint);
                }
                Err(e) if e.is_retryable() && attempt + 1 < retry.max_attempts => {
                    attempt += 1;
                    let delay = retry.delay_for_attempt(attempt);
                    tracing::debug!(repo_id, %fingerprint, attempt, ?delay, error = %e, "retrying");
                    thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Streams one object into staging and checks its digest.
    fn transfer(
        &self,
        base: &Url,
        fingerprint: &Fingerprint,
    ) -> EngineResult<unitmirror_store::StagedObject> {
        let hex = fingerprint.to_hex();
        let mut reader = self.transport.open_at(base, &[CONTENT_DIR, &hex])?;
        let staged = self
            .mirrors
            .pool()
            .store()
            .stage(&mut reader)
            .map_err(|e| match e {
                StoreError::Io(io) => {
                    SyncError::transport_retryable(format!("{}{}/{}", base, CONTENT_DIR, hex), io.to_string())
                }
                other => SyncError::Store(other),
            })?;
        staged.verify(fingerprint).map_err(|e| match e {
            StoreError::Corrupted { expected, actual } => {
                SyncError::FingerprintMismatch { expected, actual }
            }
            other => SyncError::Store(other),
        })?;
        Ok(staged)
    }
}
