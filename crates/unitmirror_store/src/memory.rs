//! In-memory object store for testing.

use crate::backend::{ObjectStore, StagedObject, StagedPayload};
use crate::error::{StoreError, StoreResult};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Arc;
use unitmirror_protocol::Fingerprint;

/// An in-memory object store.
///
/// This store keeps all objects in memory and is suitable for:
/// - Unit tests
/// - Pools whose contents need not survive the process
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use unitmirror_store::{InMemoryObjectStore, ObjectStore};
///
/// let store = InMemoryObjectStore::new();
/// let fp = store.put(b"test data").unwrap();
/// assert_eq!(store.len(), 1);
/// assert_eq!(store.read(&fp).unwrap(), b"test data");
/// ```
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<Fingerprint, Arc<Vec<u8>>>>,
}

impl InMemoryObjectStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Overwrites an object's bytes without re-hashing.
    ///
    /// Useful for testing corruption detection.
    pub fn tamper(&self, fingerprint: &Fingerprint, data: Vec<u8>) {
        self.objects.write().insert(*fingerprint, Arc::new(data));
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn stage(&self, reader: &mut dyn Read) -> StoreResult<StagedObject> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        let fingerprint = Fingerprint::compute(&data);
        let size = data.len() as u64;
        Ok(StagedObject::new(
            fingerprint,
            size,
            StagedPayload::Memory(data),
        ))
    }

    fn commit(&self, staged: StagedObject) -> StoreResult<bool> {
        let fingerprint = *staged.fingerprint();
        let data = match staged.payload {
            StagedPayload::Memory(data) => data,
            StagedPayload::File(temp) => {
                let mut data = Vec::new();
                temp.reopen()?.read_to_end(&mut data)?;
                data
            }
        };

        let mut objects = self.objects.write();
        if objects.contains_key(&fingerprint) {
            return Ok(false);
        }
        objects.insert(fingerprint, Arc::new(data));
        Ok(true)
    }

    fn contains(&self, fingerprint: &Fingerprint) -> StoreResult<bool> {
        Ok(self.objects.read().contains_key(fingerprint))
    }

    fn open(&self, fingerprint: &Fingerprint) -> StoreResult<Box<dyn Read + Send>> {
        let data = self
            .objects
            .read()
            .get(fingerprint)
            .cloned()
            .ok_or(StoreError::NotFound(*fingerprint))?;
        Ok(Box::new(Cursor::new(SharedBytes(data))))
    }

    fn remove(&self, fingerprint: &Fingerprint) -> StoreResult<bool> {
        Ok(self.objects.write().remove(fingerprint).is_some())
    }

    fn list(&self) -> StoreResult<Vec<Fingerprint>> {
        let mut fingerprints: Vec<_> = self.objects.read().keys().copied().collect();
        fingerprints.sort();
        Ok(fingerprints)
    }
}

struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_store_is_empty() {
        let store = InMemoryObjectStore::new();
        assert!(store.is_empty());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn put_and_read() {
        let store = InMemoryObjectStore::new();
        let fp = store.put(b"hello").unwrap();
        assert_eq!(fp, Fingerprint::compute(b"hello"));
        assert!(store.contains(&fp).unwrap());
        assert_eq!(store.read(&fp).unwrap(), b"hello");
    }

    #[test]
    fn identical_bytes_stored_once() {
        let store = InMemoryObjectStore::new();
        let a = store.put(b"shared").unwrap();
        let b = store.put(b"shared").unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn commit_reports_new_writes() {
        let store = InMemoryObjectStore::new();
        let staged = store.stage(&mut &b"x"[..]).unwrap();
        assert!(store.commit(staged).unwrap());
        let staged = store.stage(&mut &b"x"[..]).unwrap();
        assert!(!store.commit(staged).unwrap());
    }

    #[test]
    fn uncommitted_stage_is_invisible() {
        let store = InMemoryObjectStore::new();
        let staged = store.stage(&mut &b"pending"[..]).unwrap();
        assert!(!store.contains(staged.fingerprint()).unwrap());
    }

    #[test]
    fn missing_object() {
        let store = InMemoryObjectStore::new();
        let fp = Fingerprint::compute(b"never stored");
        assert!(matches!(store.open(&fp), Err(StoreError::NotFound(_))));
        assert!(!store.remove(&fp).unwrap());
    }

    #[test]
    fn tamper_is_detected() {
        let store = InMemoryObjectStore::new();
        let fp = store.put(b"good").unwrap();
        store.tamper(&fp, b"evil".to_vec());
        assert!(matches!(store.verify(&fp), Err(StoreError::Corrupted { .. })));
    }

    #[test]
    fn concurrent_puts() {
        use std::thread;

        let store = Arc::new(InMemoryObjectStore::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store.put(format!("object-{}", i % 4).as_bytes()).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 4);
    }
}
