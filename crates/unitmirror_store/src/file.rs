//! File-based object store.

use crate::backend::{ObjectStore, StagedObject, StagedPayload};
use crate::error::{StoreError, StoreResult};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use unitmirror_protocol::{Fingerprint, FingerprintHasher};

/// Name of the staging directory inside a store root.
pub const STAGING_DIR: &str = ".staging";

/// A file-based object store.
///
/// Each object is a regular file named by its lowercase hex fingerprint
/// directly under the store root. Staged objects live in
/// `<root>/.staging` so that committing is a same-filesystem rename.
///
/// # Durability
///
/// Staged bytes are synced to disk before they are committed.
///
/// # Example
///
/// ```no_run
/// use unitmirror_store::{FileObjectStore, ObjectStore};
/// use std::path::Path;
///
/// let store = FileObjectStore::open(Path::new("/var/lib/mirror/content")).unwrap();
/// let fp = store.put(b"persistent data").unwrap();
/// assert!(store.object_path(&fp).exists());
/// ```
#[derive(Debug, Clone)]
pub struct FileObjectStore {
    root: PathBuf,
}

impl FileObjectStore {
    /// Opens or creates a store rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn open(root: &Path) -> StoreResult<Self> {
        fs::create_dir_all(root.join(STAGING_DIR))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Returns the store root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns where an object with this fingerprint lives, present or not.
    #[must_use]
    pub fn object_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.root.join(fingerprint.to_hex())
    }

    /// Stages the contents of a local file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn stage_path(&self, path: &Path) -> StoreResult<StagedObject> {
        let mut file = File::open(path)?;
        self.stage(&mut file)
    }
}

impl ObjectStore for FileObjectStore {
    fn stage(&self, reader: &mut dyn Read) -> StoreResult<StagedObject> {
        let mut temp = NamedTempFile::new_in(self.root.join(STAGING_DIR))?;
        let mut hasher = FingerprintHasher::new();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            hasher.update(&buf[..n]);
            temp.write_all(&buf[..n])?;
        }
        temp.as_file().sync_all()?;

        let size = hasher.len();
        Ok(StagedObject::new(
            hasher.finalize(),
            size,
            StagedPayload::File(temp),
        ))
    }

    fn commit(&self, staged: StagedObject) -> StoreResult<bool> {
        let path = self.object_path(staged.fingerprint());
        if path.exists() {
            return Ok(false);
        }

        let temp = match staged.payload {
            StagedPayload::File(temp) => temp,
            StagedPayload::Memory(data) => {
                let mut temp = NamedTempFile::new_in(self.root.join(STAGING_DIR))?;
                temp.write_all(&data)?;
                temp.as_file().sync_all()?;
                temp
            }
        };

        match temp.persist_noclobber(&path) {
            Ok(_) => Ok(true),
            // A concurrent commit of the same fingerprint won.
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(StoreError::Io(e.error)),
        }
    }

    fn contains(&self, fingerprint: &Fingerprint) -> StoreResult<bool> {
        Ok(self.object_path(fingerprint).is_file())
    }

    fn open(&self, fingerprint: &Fingerprint) -> StoreResult<Box<dyn Read + Send>> {
        match File::open(self.object_path(fingerprint)) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(*fingerprint))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, fingerprint: &Fingerprint) -> StoreResult<bool> {
        match fs::remove_file(self.object_path(fingerprint)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> StoreResult<Vec<Fingerprint>> {
        let mut fingerprints = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(fp) = entry
                .file_name()
                .to_str()
                .and_then(|name| Fingerprint::from_hex(name).ok())
            {
                fingerprints.push(fp);
            }
        }
        fingerprints.sort();
        Ok(fingerprints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_layout() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("content");
        let store = FileObjectStore::open(&root).unwrap();
        assert!(root.join(STAGING_DIR).is_dir());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn put_and_read() {
        let dir = tempdir().unwrap();
        let store = FileObjectStore::open(dir.path()).unwrap();

        let fp = store.put(b"hello world").unwrap();
        assert_eq!(fp, Fingerprint::compute(b"hello world"));
        assert!(store.object_path(&fp).is_file());
        assert_eq!(store.read(&fp).unwrap(), b"hello world");
    }

    #[test]
    fn commit_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = FileObjectStore::open(dir.path()).unwrap();

        let staged = store.stage(&mut &b"same"[..]).unwrap();
        assert!(store.commit(staged).unwrap());
        let staged = store.stage(&mut &b"same"[..]).unwrap();
        assert!(!store.commit(staged).unwrap());

        assert_eq!(store.list().unwrap().len(), 1);
    }

    #[test]
    fn dropped_stage_leaves_nothing() {
        let dir = tempdir().unwrap();
        let store = FileObjectStore::open(dir.path()).unwrap();

        let staged = store.stage(&mut &b"discard me"[..]).unwrap();
        assert_eq!(staged.size(), 10);
        drop(staged);

        assert!(store.list().unwrap().is_empty());
        let staging: Vec<_> = fs::read_dir(dir.path().join(STAGING_DIR)).unwrap().collect();
        assert!(staging.is_empty());
    }

    #[test]
    fn staged_verify() {
        let dir = tempdir().unwrap();
        let store = FileObjectStore::open(dir.path()).unwrap();

        let staged = store.stage(&mut &b"bytes"[..]).unwrap();
        assert!(staged.verify(&Fingerprint::compute(b"bytes")).is_ok());
        assert!(matches!(
            staged.verify(&Fingerprint::compute(b"other")),
            Err(StoreError::Corrupted { .. })
        ));
    }

    #[test]
    fn remove_and_missing() {
        let dir = tempdir().unwrap();
        let store = FileObjectStore::open(dir.path()).unwrap();

        let fp = store.put(b"gone soon").unwrap();
        assert!(store.remove(&fp).unwrap());
        assert!(!store.remove(&fp).unwrap());
        assert!(!store.contains(&fp).unwrap());
        assert!(matches!(store.open(&fp), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn list_ignores_foreign_files() {
        let dir = tempdir().unwrap();
        let store = FileObjectStore::open(dir.path()).unwrap();
        store.put(b"one").unwrap();
        fs::write(dir.path().join("README"), b"not an object").unwrap();

        assert_eq!(store.list().unwrap(), vec![Fingerprint::compute(b"one")]);
    }

    #[test]
    fn verify_detects_tampering() {
        let dir = tempdir().unwrap();
        let store = FileObjectStore::open(dir.path()).unwrap();
        let fp = store.put(b"original").unwrap();
        assert!(store.verify(&fp).is_ok());

        fs::write(store.object_path(&fp), b"tampered").unwrap();
        assert!(matches!(store.verify(&fp), Err(StoreError::Corrupted { .. })));
    }
}
