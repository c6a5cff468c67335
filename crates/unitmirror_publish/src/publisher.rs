//! Repository publisher.

use crate::config::{LinkMode, PublishConfig};
use crate::error::{PublishError, PublishResult};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use unitmirror_protocol::{
    validate_repo_id, ContentUnit, Fingerprint, Manifest, ManifestEntry, MirrorSource,
    UnitIdentity, CONTENT_DIR, MANIFEST_FILENAME,
};
use unitmirror_store::{FileObjectStore, ObjectStore};
use url::Url;

/// Directory under the destination root holding one copy of every object.
pub const POOL_DIR: &str = ".pool";

/// What a single [`Publisher::publish`] call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    /// The published repository.
    pub repo_id: String,
    /// Number of units in the manifest.
    pub units: usize,
    /// Objects newly written to the pool.
    pub objects_written: usize,
    /// Content entries newly linked into the repository.
    pub objects_linked: usize,
    /// Content entries removed because no unit references them any more.
    pub links_pruned: usize,
    /// Pool objects deleted because no repository links them any more.
    pub objects_pruned: usize,
    /// Where the manifest was written.
    pub manifest_path: PathBuf,
}

/// Publishes repositories as content-addressable trees.
///
/// Layout under the destination root:
///
/// ```text
/// .pool/<fingerprint>                  one copy of each object
/// <repo_id>/units.json                 the manifest
/// <repo_id>/content/<fingerprint>      link to .pool/<fingerprint>
/// ```
///
/// Publishing is idempotent: re-publishing the same units rewrites a
/// byte-identical manifest and transfers nothing. Manifest and content are
/// not written transactionally; a crash can leave a manifest ahead of its
/// content, which readers report as a fetch error.
///
/// After each publish, pool objects no repository links are deleted. Two
/// publishers sharing a destination root must not run concurrently.
///
/// # Example
///
/// ```no_run
/// use unitmirror_protocol::{ContentUnit, UnitKey};
/// use unitmirror_publish::{PublishConfig, Publisher};
///
/// let publisher = Publisher::new(PublishConfig::new("/srv/pub")).unwrap();
/// let unit = ContentUnit::new("rpm", UnitKey::new().with("name", "zsh"), "/var/lib/zsh.rpm");
/// let report = publisher.publish(&[unit], "base").unwrap();
/// assert_eq!(report.units, 1);
/// ```
#[derive(Debug)]
pub struct Publisher {
    config: PublishConfig,
    pool: FileObjectStore,
}

impl Publisher {
    /// Creates a publisher, creating the destination root and pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn new(config: PublishConfig) -> PublishResult<Self> {
        let pool = FileObjectStore::open(&config.destination_root.join(POOL_DIR))?;
        Ok(Self { config, pool })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PublishConfig {
        &self.config
    }

    /// Returns the shared object pool.
    pub fn pool(&self) -> &FileObjectStore {
        &self.pool
    }

    /// Returns the published root of a repository.
    pub fn repo_root(&self, repo_id: &str) -> PathBuf {
        self.config.destination_root.join(repo_id)
    }

    /// Publishes `units` as repository `repo_id`.
    ///
    /// Every unit is read and pooled before anything in the repository root
    /// changes, so an unreadable unit leaves the previous publication intact.
    ///
    /// # Errors
    ///
    /// Returns an error on an invalid repository id, duplicate identities,
    /// unreadable unit bytes or filesystem failure.
    pub fn publish(&self, units: &[ContentUnit], repo_id: &str) -> PublishResult<PublishReport> {
        validate_repo_id(repo_id)?;

        let mut seen = BTreeSet::new();
        for unit in units {
            let identity = unit.identity();
            if !seen.insert(identity.clone()) {
                return Err(PublishError::DuplicateUnit(identity));
            }
        }

        let mut entries: BTreeMap<UnitIdentity, ManifestEntry> = BTreeMap::new();
        let mut fingerprints = BTreeSet::new();
        let mut objects_written = 0;
        for unit in units {
            let fingerprint = self.pool_unit(unit, &mut objects_written)?;
            fingerprints.insert(fingerprint);
            entries.insert(unit.identity(), ManifestEntry::for_unit(unit, &fingerprint));
        }

        let repo_root = self.repo_root(repo_id);
        let content_dir = repo_root.join(CONTENT_DIR);
        fs::create_dir_all(&content_dir)?;

        let mut objects_linked = 0;
        for fingerprint in &fingerprints {
            if self.link_object(&content_dir, fingerprint)? {
                objects_linked += 1;
            }
        }

        let manifest = Manifest::from_entries(entries.into_values().collect())?;
        let manifest_path = repo_root.join(MANIFEST_FILENAME);
        write_atomic(&repo_root, &manifest_path, &manifest.to_json()?)?;

        let links_pruned = prune_links(&content_dir, &fingerprints)?;
        let objects_pruned = self.prune_pool()?;

        tracing::info!(
            repo_id,
            units = manifest.len(),
            objects_written,
            objects_linked,
            links_pruned,
            objects_pruned,
            "published repository"
        );

        Ok(PublishReport {
            repo_id: repo_id.to_string(),
            units: manifest.len(),
            objects_written,
            objects_linked,
            links_pruned,
            objects_pruned,
            manifest_path,
        })
    }

    /// Returns the source a consumer binds to in order to mirror `repo_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the repository id or base URL is invalid.
    pub fn consumer_payload(&self, repo_id: &str) -> PublishResult<MirrorSource> {
        validate_repo_id(repo_id)?;

        let mut base = self.base_url()?;
        if self.config.serve_https && base.scheme() == "http" {
            base.set_scheme("https")
                .map_err(|()| self.invalid_base_url("cannot switch scheme to https"))?;
        }
        if let Some(host) = &self.config.host {
            base.set_host(Some(host))
                .map_err(|e| self.invalid_base_url(&e.to_string()))?;
        }

        let manifest_url = base
            .join(&format!("{}/{}", repo_id, MANIFEST_FILENAME))
            .map_err(|e| self.invalid_base_url(&e.to_string()))?;
        Ok(MirrorSource::from_manifest_url(manifest_url.to_string())?)
    }

    fn base_url(&self) -> PublishResult<Url> {
        match &self.config.base_url {
            Some(raw) => {
                let mut url = Url::parse(raw).map_err(|e| self.invalid_base_url(&e.to_string()))?;
                if !url.path().ends_with('/') {
                    let path = format!("{}/", url.path());
                    url.set_path(&path);
                }
                Ok(url)
            }
            None => {
                let root = std::path::absolute(&self.config.destination_root)?;
                Url::from_directory_path(&root)
                    .map_err(|()| self.invalid_base_url("destination root is not an absolute path"))
            }
        }
    }

    fn invalid_base_url(&self, reason: &str) -> PublishError {
        PublishError::InvalidBaseUrl {
            url: self
                .config
                .base_url
                .clone()
                .unwrap_or_else(|| self.config.destination_root.display().to_string()),
            reason: reason.to_string(),
        }
    }

    fn pool_unit(&self, unit: &ContentUnit, written: &mut usize) -> PublishResult<Fingerprint> {
        let staged = self
            .pool
            .stage_path(&unit.storage_path)
            .map_err(|e| PublishError::UnitUnreadable {
                unit: unit.identity(),
                path: unit.storage_path.clone(),
                message: e.to_string(),
            })?;
        let fingerprint = *staged.fingerprint();
        if self.pool.commit(staged)? {
            *written += 1;
        }
        Ok(fingerprint)
    }

    /// Deletes pool objects that no repository's content directory links.
    fn prune_pool(&self) -> PublishResult<usize> {
        let linked = self.linked_fingerprints()?;
        let mut pruned = 0;
        for fingerprint in self.pool.list()? {
            if !linked.contains(&fingerprint) && self.pool.remove(&fingerprint)? {
                tracing::debug!(fingerprint = %fingerprint.to_hex(), "pruned pool object");
                pruned += 1;
            }
        }
        Ok(pruned)
    }

    /// Collects every fingerprint linked from any published repository.
    fn linked_fingerprints(&self) -> PublishResult<BTreeSet<Fingerprint>> {
        let mut linked = BTreeSet::new();
        for repo in fs::read_dir(&self.config.destination_root)? {
            let repo = repo?;
            let hidden = repo.file_name().to_str().map_or(true, |n| n.starts_with('.'));
            if hidden || !repo.file_type()?.is_dir() {
                continue;
            }
            let content_dir = repo.path().join(CONTENT_DIR);
            let entries = match fs::read_dir(&content_dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            for entry in entries {
                let name = entry?.file_name();
                if let Some(fp) = name.to_str().and_then(|n| Fingerprint::from_hex(n).ok()) {
                    linked.insert(fp);
                }
            }
        }
        Ok(linked)
    }

    /// Links a pooled object into a repository. Returns false if already linked.
    fn link_object(&self, content_dir: &Path, fingerprint: &Fingerprint) -> PublishResult<bool> {
        let link = content_dir.join(fingerprint.to_hex());
        if fs::symlink_metadata(&link).is_ok() {
            return Ok(false);
        }

        let result = match self.config.link_mode {
            LinkMode::HardLink => fs::hard_link(self.pool.object_path(fingerprint), &link),
            LinkMode::Symlink => {
                let target = Path::new("..")
                    .join("..")
                    .join(POOL_DIR)
                    .join(fingerprint.to_hex());
                symlink(&target, &link)
            }
        };
        match result {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

/// Removes content entries not in `keep`. Foreign file names are left alone.
fn prune_links(content_dir: &Path, keep: &BTreeSet<Fingerprint>) -> PublishResult<usize> {
    let mut pruned = 0;
    for entry in fs::read_dir(content_dir)? {
        let entry = entry?;
        let Some(fingerprint) = entry
            .file_name()
            .to_str()
            .and_then(|name| Fingerprint::from_hex(name).ok())
        else {
            continue;
        };
        if !keep.contains(&fingerprint) {
            fs::remove_file(entry.path())?;
            pruned += 1;
        }
    }
    Ok(pruned)
}

fn write_atomic(dir: &Path, path: &Path, data: &[u8]) -> io::Result<()> {
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(unix)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};
    use unitmirror_protocol::{Protocol, UnitKey};

    fn write_units(dir: &TempDir, contents: &[(&str, &[u8])]) -> Vec<ContentUnit> {
        contents
            .iter()
            .map(|(name, bytes)| {
                let path = dir.path().join(format!("{}.rpm", name));
                fs::write(&path, bytes).unwrap();
                ContentUnit::new("rpm", UnitKey::new().with("name", *name), path)
            })
            .collect()
    }

    #[test]
    fn publish_writes_manifest_and_content() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let units = write_units(&src, &[("zsh", b"zsh bytes"), ("bash", b"bash bytes")]);

        let publisher = Publisher::new(PublishConfig::new(dst.path())).unwrap();
        let report = publisher.publish(&units, "base").unwrap();

        assert_eq!(report.units, 2);
        assert_eq!(report.objects_written, 2);
        assert_eq!(report.objects_linked, 2);

        let manifest = Manifest::from_json(&fs::read(&report.manifest_path).unwrap()).unwrap();
        for entry in &manifest {
            let path = dst.path().join("base").join(&entry.relative_path);
            let (fp, _) = Fingerprint::compute_reader(fs::File::open(path).unwrap()).unwrap();
            assert_eq!(fp, entry.fingerprint().unwrap());
        }
    }

    #[test]
    fn republish_is_idempotent() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let units = write_units(&src, &[("a", b"1"), ("b", b"2"), ("c", b"3")]);
        let publisher = Publisher::new(PublishConfig::new(dst.path())).unwrap();

        let first = publisher.publish(&units, "repo").unwrap();
        let before = fs::read(&first.manifest_path).unwrap();

        let mut reversed = units.clone();
        reversed.reverse();
        let second = publisher.publish(&reversed, "repo").unwrap();

        assert_eq!(fs::read(&second.manifest_path).unwrap(), before);
        assert_eq!(second.objects_written, 0);
        assert_eq!(second.objects_linked, 0);
        assert_eq!(publisher.pool().list().unwrap().len(), 3);
    }

    #[test]
    fn identical_bytes_share_one_pool_object() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let publisher = Publisher::new(PublishConfig::new(dst.path())).unwrap();

        let a = write_units(&src, &[("shared", b"same bytes")]);
        publisher.publish(&a, "repo-a").unwrap();
        let b = write_units(&src, &[("shared", b"same bytes")]);
        let report = publisher.publish(&b, "repo-b").unwrap();

        assert_eq!(report.objects_written, 0);
        assert_eq!(publisher.pool().list().unwrap().len(), 1);
    }

    #[test]
    fn duplicate_identity_rejected() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let mut units = write_units(&src, &[("zsh", b"one")]);
        units.push(units[0].clone());

        let publisher = Publisher::new(PublishConfig::new(dst.path())).unwrap();
        assert!(matches!(
            publisher.publish(&units, "repo"),
            Err(PublishError::DuplicateUnit(_))
        ));
    }

    #[test]
    fn unreadable_unit_keeps_previous_manifest() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let publisher = Publisher::new(PublishConfig::new(dst.path())).unwrap();
        let units = write_units(&src, &[("zsh", b"zsh")]);
        let report = publisher.publish(&units, "repo").unwrap();
        let before = fs::read(&report.manifest_path).unwrap();

        let mut more = units.clone();
        more.push(ContentUnit::new(
            "rpm",
            UnitKey::new().with("name", "ghost"),
            src.path().join("ghost.rpm"),
        ));
        assert!(matches!(
            publisher.publish(&more, "repo"),
            Err(PublishError::UnitUnreadable { .. })
        ));
        assert_eq!(fs::read(&report.manifest_path).unwrap(), before);
    }

    #[test]
    fn dropped_units_are_unlinked() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let publisher = Publisher::new(PublishConfig::new(dst.path())).unwrap();
        let units = write_units(&src, &[("a", b"a"), ("b", b"b")]);
        publisher.publish(&units, "repo").unwrap();

        let report = publisher.publish(&units[..1], "repo").unwrap();
        assert_eq!(report.links_pruned, 1);
        let remaining = fs::read_dir(dst.path().join("repo").join(CONTENT_DIR))
            .unwrap()
            .count();
        assert_eq!(remaining, 1);
    }

    #[test]
    fn unreferenced_pool_objects_are_deleted() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let publisher = Publisher::new(PublishConfig::new(dst.path())).unwrap();
        let units = write_units(&src, &[("a", b"a"), ("b", b"b")]);
        publisher.publish(&units, "repo").unwrap();
        assert_eq!(publisher.pool().list().unwrap().len(), 2);

        let report = publisher.publish(&units[..1], "repo").unwrap();
        assert_eq!(report.objects_pruned, 1);
        assert_eq!(publisher.pool().list().unwrap(), vec![Fingerprint::compute(b"a")]);

        let report = publisher.publish(&[], "repo").unwrap();
        assert_eq!(report.objects_pruned, 1);
        assert!(publisher.pool().list().unwrap().is_empty());
    }

    #[test]
    fn pool_objects_linked_by_other_repos_are_kept() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let publisher = Publisher::new(PublishConfig::new(dst.path())).unwrap();
        let units = write_units(&src, &[("shared", b"shared"), ("own", b"own")]);
        publisher.publish(&units, "first").unwrap();
        publisher.publish(&units[..1], "second").unwrap();

        let report = publisher.publish(&[], "first").unwrap();
        assert_eq!(report.links_pruned, 2);
        assert_eq!(report.objects_pruned, 1);
        let shared = Fingerprint::compute(b"shared");
        assert_eq!(publisher.pool().list().unwrap(), vec![shared]);
        let link = dst.path().join("second").join(CONTENT_DIR).join(shared.to_hex());
        assert_eq!(fs::read(link).unwrap(), b"shared");
    }

    #[cfg(unix)]
    #[test]
    fn symlink_mode_links_into_pool() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let config = PublishConfig::new(dst.path()).with_link_mode(LinkMode::Symlink);
        let publisher = Publisher::new(config).unwrap();
        let units = write_units(&src, &[("zsh", b"linked")]);
        publisher.publish(&units, "repo").unwrap();

        let fp = Fingerprint::compute(b"linked");
        let link = dst.path().join("repo").join(CONTENT_DIR).join(fp.to_hex());
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read(&link).unwrap(), b"linked");
    }

    #[test]
    fn invalid_repo_id_rejected() {
        let dst = tempdir().unwrap();
        let publisher = Publisher::new(PublishConfig::new(dst.path())).unwrap();
        assert!(matches!(
            publisher.publish(&[], "../escape"),
            Err(PublishError::Protocol(_))
        ));
        assert!(publisher.publish(&[], POOL_DIR).is_err());
    }

    #[test]
    fn consumer_payload_for_http() {
        let dst = tempdir().unwrap();
        let config = PublishConfig::new(dst.path()).with_base_url("http://up.example.com:8080/pub");
        let publisher = Publisher::new(config).unwrap();

        let source = publisher.consumer_payload("base").unwrap();
        assert_eq!(source.protocol, Protocol::Http);
        assert_eq!(source.host.as_deref(), Some("up.example.com:8080"));
        assert_eq!(
            source.manifest_url,
            "http://up.example.com:8080/pub/base/units.json"
        );
    }

    #[test]
    fn consumer_payload_https_and_host_override() {
        let dst = tempdir().unwrap();
        let config = PublishConfig::new(dst.path())
            .with_base_url("http://internal/pub/")
            .with_https(true)
            .with_host("cdn.example.com");
        let publisher = Publisher::new(config).unwrap();

        let source = publisher.consumer_payload("base").unwrap();
        assert_eq!(source.protocol, Protocol::Https);
        assert_eq!(source.host.as_deref(), Some("cdn.example.com"));
        assert_eq!(source.manifest_url, "https://cdn.example.com/pub/base/units.json");
    }

    #[test]
    fn consumer_payload_defaults_to_file() {
        let dst = tempdir().unwrap();
        let publisher = Publisher::new(PublishConfig::new(dst.path())).unwrap();

        let source = publisher.consumer_payload("base").unwrap();
        assert_eq!(source.protocol, Protocol::File);
        assert!(source.host.is_none());
        assert!(source.manifest_url.starts_with("file://"));
        assert!(source.manifest_url.ends_with("/base/units.json"));
    }
}
