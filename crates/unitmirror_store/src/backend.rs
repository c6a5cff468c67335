//! Object store trait definition.

use crate::error::{StoreError, StoreResult};
use std::io::Read;
use tempfile::NamedTempFile;
use unitmirror_protocol::Fingerprint;

/// An object whose bytes have been received and hashed but not yet made
/// visible in a store.
///
/// Dropping a staged object discards it.
#[derive(Debug)]
pub struct StagedObject {
    fingerprint: Fingerprint,
    size: u64,
    pub(crate) payload: StagedPayload,
}

#[derive(Debug)]
pub(crate) enum StagedPayload {
    File(NamedTempFile),
    Memory(Vec<u8>),
}

impl StagedObject {
    pub(crate) fn new(fingerprint: Fingerprint, size: u64, payload: StagedPayload) -> Self {
        Self {
            fingerprint,
            size,
            payload,
        }
    }

    /// The fingerprint of the staged bytes.
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Number of staged bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Fails unless the staged bytes hash to `expected`.
    pub fn verify(&self, expected: &Fingerprint) -> StoreResult<()> {
        if &self.fingerprint != expected {
            return Err(StoreError::Corrupted {
                expected: *expected,
                actual: self.fingerprint,
            });
        }
        Ok(())
    }
}

/// A content-addressable object store.
///
/// Stores are **opaque byte stores** keyed by fingerprint. They know nothing
/// about repositories, manifests or which mirror owns an object.
///
/// # Invariants
///
/// - An object is visible only after `commit` returns
/// - `commit` of an already present fingerprint leaves the stored object
///   untouched and returns `false`
/// - `open` returns exactly the bytes that hash to the fingerprint
/// - Stores must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryObjectStore`] - For testing
/// - [`super::FileObjectStore`] - For persistent storage
pub trait ObjectStore: Send + Sync {
    /// Reads `reader` to the end into a staging area, hashing it.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or staging fails.
    fn stage(&self, reader: &mut dyn Read) -> StoreResult<StagedObject>;

    /// Makes a staged object visible under its fingerprint.
    ///
    /// Returns `true` if the object was newly written.
    ///
    /// # Errors
    ///
    /// Returns an error if the object cannot be persisted.
    fn commit(&self, staged: StagedObject) -> StoreResult<bool>;

    /// Returns true if the object exists.
    ///
    /// # Errors
    ///
    /// Returns an error if existence cannot be determined.
    fn contains(&self, fingerprint: &Fingerprint) -> StoreResult<bool>;

    /// Opens an object for reading.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the object does not exist.
    fn open(&self, fingerprint: &Fingerprint) -> StoreResult<Box<dyn Read + Send>>;

    /// Deletes an object.
    ///
    /// Returns `true` if an object was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the object exists but cannot be deleted.
    fn remove(&self, fingerprint: &Fingerprint) -> StoreResult<bool>;

    /// Lists every stored fingerprint.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated.
    fn list(&self) -> StoreResult<Vec<Fingerprint>>;

    /// Stages and commits an in-memory buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if staging or committing fails.
    fn put(&self, data: &[u8]) -> StoreResult<Fingerprint> {
        let mut reader = data;
        let staged = self.stage(&mut reader)?;
        let fingerprint = *staged.fingerprint();
        self.commit(staged)?;
        Ok(fingerprint)
    }

    /// Reads a whole object into memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the object is missing or unreadable.
    fn read(&self, fingerprint: &Fingerprint) -> StoreResult<Vec<u8>> {
        let mut reader = self.open(fingerprint)?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        Ok(data)
    }

    /// Re-hashes an object and checks it against its name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupted`] on mismatch.
    fn verify(&self, fingerprint: &Fingerprint) -> StoreResult<()> {
        let reader = self.open(fingerprint)?;
        let (actual, _) = Fingerprint::compute_reader(reader)?;
        if &actual != fingerprint {
            return Err(StoreError::Corrupted {
                expected: *fingerprint,
                actual,
            });
        }
        Ok(())
    }
}
