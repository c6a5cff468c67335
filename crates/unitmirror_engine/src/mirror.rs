//! Local mirror state.
//!
//! Layout under the local root:
//!
//! ```text
//! content/<fingerprint>           objects shared by every mirror
//! mirrors/<repo_id>/mirror.json   one RepositoryMirror per repository
//! locks/<repo_id>.lock            advisory lock serializing work on a mirror
//! ```
//!
//! Reference counts for shared objects are rebuilt from every
//! `mirror.json` when the tree is opened.

use crate::error::{EngineResult, SyncError};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::NamedTempFile;
use unitmirror_protocol::{
    validate_repo_id, Fingerprint, ManifestEntry, Metadata, MirrorSource, UnitIdentity, UnitKey,
};
use unitmirror_store::{ContentPool, FileObjectStore, ObjectStore, StoreError};

/// Directory holding the shared object store.
pub const LOCAL_CONTENT_DIR: &str = "content";
/// Directory holding one subdirectory per mirror.
pub const MIRRORS_DIR: &str = "mirrors";
/// Directory holding per-mirror lock files.
pub const LOCKS_DIR: &str = "locks";
/// Name of a mirror's state file.
pub const MIRROR_STATE_FILE: &str = "mirror.json";

const STATE_VERSION: u32 = 1;

/// A unit held by a local mirror.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirroredUnit {
    /// Content type identifier.
    pub type_id: String,
    /// Type-specific key fields.
    pub unit_key: UnitKey,
    /// Metadata as of the sync that added the unit.
    #[serde(default)]
    pub metadata: Metadata,
    /// Object holding the unit's bytes.
    pub fingerprint: Fingerprint,
}

impl MirroredUnit {
    /// Builds a mirrored unit from a manifest entry.
    pub fn from_entry(entry: &ManifestEntry, fingerprint: Fingerprint) -> Self {
        Self {
            type_id: entry.type_id.clone(),
            unit_key: entry.unit_key.clone(),
            metadata: entry.metadata.clone(),
            fingerprint,
        }
    }

    /// Returns the unit's identity.
    pub fn identity(&self) -> UnitIdentity {
        UnitIdentity::new(self.type_id.clone(), self.unit_key.clone())
    }
}

#[derive(Serialize, Deserialize)]
struct MirrorState {
    version: u32,
    repo_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<MirrorSource>,
    #[serde(default)]
    units: Vec<MirroredUnit>,
}

/// The local, on-disk representation of one mirrored repository.
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryMirror {
    repo_id: String,
    source: Option<MirrorSource>,
    units: BTreeMap<UnitIdentity, MirroredUnit>,
    working_dir: PathBuf,
}

impl RepositoryMirror {
    /// Returns the repository id.
    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    /// Returns where the mirror was last synced from.
    pub fn source(&self) -> Option<&MirrorSource> {
        self.source.as_ref()
    }

    /// Records where the mirror is synced from.
    pub fn set_source(&mut self, source: MirrorSource) {
        self.source = Some(source);
    }

    /// Returns the mirror's working directory.
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Returns the identities of every held unit.
    pub fn unit_identities(&self) -> BTreeSet<UnitIdentity> {
        self.units.keys().cloned().collect()
    }

    /// Iterates held units in identity order.
    pub fn units(&self) -> impl Iterator<Item = (&UnitIdentity, &MirroredUnit)> {
        self.units.iter()
    }

    /// Returns a held unit.
    pub fn get(&self, identity: &UnitIdentity) -> Option<&MirroredUnit> {
        self.units.get(identity)
    }

    /// Adds or replaces a unit.
    pub fn insert(&mut self, unit: MirroredUnit) {
        self.units.insert(unit.identity(), unit);
    }

    /// Removes a unit, returning it if it was held.
    pub fn remove(&mut self, identity: &UnitIdentity) -> Option<MirroredUnit> {
        self.units.remove(identity)
    }

    /// Number of held units.
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns true if no units are held.
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// An exclusive lock on one mirror, released on drop.
#[derive(Debug)]
pub struct MirrorLock {
    file: File,
}

impl Drop for MirrorLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Summary of one mirror, for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorSummary {
    /// Repository id.
    pub repo_id: String,
    /// Manifest URL the mirror was last synced from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_url: Option<String>,
    /// Number of held units.
    pub units: usize,
}

/// Everything held under a local root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectReport {
    /// The local root.
    pub root: PathBuf,
    /// One summary per mirror, sorted by repository id.
    pub mirrors: Vec<MirrorSummary>,
    /// Objects in the shared store.
    pub objects: usize,
}

/// Result of checking every local object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyReport {
    /// Objects re-hashed.
    pub checked: usize,
    /// Objects whose bytes no longer match their name.
    pub corrupt: Vec<Fingerprint>,
    /// Objects no mirror references.
    pub orphans: Vec<Fingerprint>,
    /// Objects a mirror references that are absent, as `(repo_id, fingerprint)`.
    pub missing: Vec<(String, Fingerprint)>,
    /// Orphans deleted by a sweep, if one was requested.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub swept: Vec<Fingerprint>,
}

impl VerifyReport {
    /// Returns true if nothing is corrupt or missing.
    pub fn is_healthy(&self) -> bool {
        self.corrupt.is_empty() && self.missing.is_empty()
    }
}

/// All mirrors held under one local root, plus their shared content pool.
pub struct LocalMirrors {
    root: PathBuf,
    store: Arc<FileObjectStore>,
    pool: ContentPool,
}

impl std::fmt::Debug for LocalMirrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMirrors")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl LocalMirrors {
    /// Opens or creates a local root and rebuilds reference counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the layout cannot be created or a mirror state
    /// file cannot be read. An unreadable state file is fatal here because
    /// skipping it would undercount references to shared objects.
    pub fn open(root: impl Into<PathBuf>) -> EngineResult<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(MIRRORS_DIR))?;
        fs::create_dir_all(root.join(LOCKS_DIR))?;
        let store = Arc::new(FileObjectStore::open(&root.join(LOCAL_CONTENT_DIR))?);
        let pool = ContentPool::new(Arc::clone(&store) as Arc<dyn ObjectStore>);

        let mirrors = Self { root, store, pool };
        let mut references = 0usize;
        for repo_id in mirrors.repo_ids()? {
            let mirror = mirrors.load(&repo_id)?;
            for (_, unit) in mirror.units() {
                mirrors.pool.retain(&repo_id, &unit.fingerprint);
                references += 1;
            }
        }
        tracing::debug!(root = %mirrors.root.display(), references, "opened local mirrors");
        Ok(mirrors)
    }

    /// Returns the local root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the shared content pool.
    pub fn pool(&self) -> &ContentPool {
        &self.pool
    }

    /// Returns the shared object store.
    pub fn store(&self) -> &FileObjectStore {
        &self.store
    }

    /// Returns a mirror's working directory.
    pub fn mirror_dir(&self, repo_id: &str) -> PathBuf {
        self.root.join(MIRRORS_DIR).join(repo_id)
    }

    /// Ids of every mirror with a state file, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the mirrors directory cannot be read.
    pub fn repo_ids(&self) -> EngineResult<BTreeSet<String>> {
        let mut ids = BTreeSet::new();
        for entry in fs::read_dir(self.root.join(MIRRORS_DIR))? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if validate_repo_id(&name).is_ok() && entry.path().join(MIRROR_STATE_FILE).is_file() {
                ids.insert(name);
            }
        }
        Ok(ids)
    }

    /// Returns true if a mirror exists for `repo_id`.
    pub fn exists(&self, repo_id: &str) -> bool {
        validate_repo_id(repo_id).is_ok()
            && self.mirror_dir(repo_id).join(MIRROR_STATE_FILE).is_file()
    }

    /// Creates an empty mirror and persists it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Reconciliation`] if the id is invalid, the mirror
    /// already exists or the working directory cannot be created.
    pub fn create(
        &self,
        repo_id: &str,
        source: Option<MirrorSource>,
    ) -> EngineResult<RepositoryMirror> {
        validate_repo_id(repo_id).map_err(|e| SyncError::reconciliation(repo_id, e))?;
        if self.exists(repo_id) {
            return Err(SyncError::reconciliation(repo_id, "mirror already exists"));
        }
        let working_dir = self.mirror_dir(repo_id);
        fs::create_dir_all(&working_dir).map_err(|e| SyncError::reconciliation(repo_id, e))?;

        let mirror = RepositoryMirror {
            repo_id: repo_id.to_string(),
            source,
            units: BTreeMap::new(),
            working_dir,
        };
        self.save(&mirror)
            .map_err(|e| SyncError::reconciliation(repo_id, e))?;
        tracing::info!(repo_id, "created mirror");
        Ok(mirror)
    }

    /// Loads a mirror's persisted state.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Reconciliation`] if the mirror does not exist or
    /// its state file is unreadable.
    pub fn load(&self, repo_id: &str) -> EngineResult<RepositoryMirror> {
        validate_repo_id(repo_id).map_err(|e| SyncError::reconciliation(repo_id, e))?;
        let working_dir = self.mirror_dir(repo_id);
        let data = fs::read(working_dir.join(MIRROR_STATE_FILE)).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                SyncError::reconciliation(repo_id, "no local mirror")
            } else {
                SyncError::reconciliation(repo_id, e)
            }
        })?;
        let state: MirrorState = serde_json::from_slice(&data).map_err(|e| {
            SyncError::reconciliation(repo_id, format!("corrupt mirror state: {}", e))
        })?;
        if state.version > STATE_VERSION {
            return Err(SyncError::reconciliation(
                repo_id,
                format!("mirror state version {} is newer than supported", state.version),
            ));
        }

        Ok(RepositoryMirror {
            repo_id: repo_id.to_string(),
            source: state.source,
            units: state
                .units
                .into_iter()
                .map(|unit| (unit.identity(), unit))
                .collect(),
            working_dir,
        })
    }

    /// Atomically persists a mirror's state.
    ///
    /// # Errors
    ///
    /// Returns an error if the state file cannot be written.
    pub fn save(&self, mirror: &RepositoryMirror) -> EngineResult<()> {
        let state = MirrorState {
            version: STATE_VERSION,
            repo_id: mirror.repo_id.clone(),
            source: mirror.source.clone(),
            units: mirror.units.values().cloned().collect(),
        };
        let mut json = serde_json::to_vec_pretty(&state).map_err(io::Error::from)?;
        json.push(b'\n');

        let mut temp = NamedTempFile::new_in(&mirror.working_dir)?;
        temp.write_all(&json)?;
        temp.as_file().sync_all()?;
        temp.persist(mirror.working_dir.join(MIRROR_STATE_FILE))
            .map_err(|e| e.error)?;
        Ok(())
    }

    /// Removes a mirror, its lock file, and its references.
    ///
    /// The state file goes first, so a failure part way never leaves a
    /// mirror whose referenced objects were deleted. Returns the objects
    /// deleted because no other mirror referenced them.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Reconciliation`] if the working directory cannot
    /// be removed.
    pub fn destroy(&self, repo_id: &str) -> EngineResult<Vec<Fingerprint>> {
        validate_repo_id(repo_id).map_err(|e| SyncError::reconciliation(repo_id, e))?;
        let working_dir = self.mirror_dir(repo_id);
        match fs::remove_file(working_dir.join(MIRROR_STATE_FILE)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(SyncError::reconciliation(repo_id, e)),
        }
        match fs::remove_dir_all(&working_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(SyncError::reconciliation(repo_id, e)),
        }

        let deleted = self.pool.release_owner(repo_id).unwrap_or_else(|e| {
            tracing::warn!(repo_id, error = %e, "objects left behind, sweep to reclaim");
            Vec::new()
        });
        match fs::remove_file(self.lock_path(repo_id)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::debug!(repo_id, error = %e, "lock file left behind"),
        }
        tracing::info!(repo_id, deleted = deleted.len(), "removed mirror");
        Ok(deleted)
    }

    /// Takes the exclusive lock for a mirror, blocking until it is free.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Reconciliation`] if the lock file cannot be
    /// opened or locked.
    pub fn lock(&self, repo_id: &str) -> EngineResult<MirrorLock> {
        validate_repo_id(repo_id).map_err(|e| SyncError::reconciliation(repo_id, e))?;
        let path = self.lock_path(repo_id);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| SyncError::reconciliation(repo_id, e))?;
        file.lock_exclusive()
            .map_err(|e| SyncError::reconciliation(repo_id, e))?;
        Ok(MirrorLock { file })
    }

    fn lock_path(&self, repo_id: &str) -> PathBuf {
        self.root.join(LOCKS_DIR).join(format!("{}.lock", repo_id))
    }

    /// Deletes every object no mirror references.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated or cleaned.
    pub fn sweep(&self) -> EngineResult<Vec<Fingerprint>> {
        Ok(self.pool.sweep()?)
    }

    /// Summarizes every mirror.
    ///
    /// # Errors
    ///
    /// Returns an error if a mirror or the store cannot be read.
    pub fn inspect(&self) -> EngineResult<InspectReport> {
        let mut mirrors = Vec::new();
        for repo_id in self.repo_ids()? {
            let mirror = self.load(&repo_id)?;
            mirrors.push(MirrorSummary {
                manifest_url: mirror.source().map(|s| s.manifest_url.clone()),
                units: mirror.len(),
                repo_id,
            });
        }
        Ok(InspectReport {
            root: self.root.clone(),
            mirrors,
            objects: self.store.list()?.len(),
        })
    }

    /// Re-hashes every object and cross-checks mirrors against the store.
    ///
    /// With `sweep`, orphans are deleted afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or a mirror cannot be read.
    pub fn verify(&self, sweep: bool) -> EngineResult<VerifyReport> {
        let mut report = VerifyReport::default();
        for fingerprint in self.store.list()? {
            report.checked += 1;
            match self.store.verify(&fingerprint) {
                Ok(()) => {}
                Err(StoreError::Corrupted { .. }) => {
                    tracing::warn!(%fingerprint, "corrupt object");
                    report.corrupt.push(fingerprint);
                }
                Err(e) => return Err(e.into()),
            }
        }

        for repo_id in self.repo_ids()? {
            let mirror = self.load(&repo_id)?;
            let mut seen = BTreeSet::new();
            for (_, unit) in mirror.units() {
                if seen.insert(unit.fingerprint) && !self.store.contains(&unit.fingerprint)? {
                    report.missing.push((repo_id.clone(), unit.fingerprint));
                }
            }
        }

        report.orphans = self.pool.orphans()?;
        if sweep {
            report.swept = self.sweep()?;
        }
        Ok(report)
    }
}
