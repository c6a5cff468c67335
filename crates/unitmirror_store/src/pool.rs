//! Reference-counted content pool.
//!
//! A pool wraps an [`ObjectStore`] shared by several owners (mirrored
//! repositories). Each owner holds references to the objects its units
//! use; an object is deleted exactly when its last reference is released.
//!
//! Reference counts live in memory. Callers rebuild them on startup from
//! their own persisted state with [`ContentPool::retain`].

use crate::backend::{ObjectStore, StagedObject};
use crate::error::StoreResult;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use unitmirror_protocol::Fingerprint;

type OwnerCounts = BTreeMap<String, usize>;

/// Shared object storage with per-owner reference counting.
///
/// All reference changes and the store operations they imply happen under
/// one lock, so an object can never be deleted between another owner's
/// existence check and its new reference.
pub struct ContentPool {
    store: Arc<dyn ObjectStore>,
    refs: Mutex<HashMap<Fingerprint, OwnerCounts>>,
}

impl std::fmt::Debug for ContentPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentPool")
            .field("objects_referenced", &self.refs.lock().len())
            .finish()
    }
}

impl ContentPool {
    /// Creates a pool over `store` with no references.
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            refs: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Records a reference without touching the store.
    pub fn retain(&self, owner: &str, fingerprint: &Fingerprint) {
        let mut refs = self.refs.lock();
        *refs
            .entry(*fingerprint)
            .or_default()
            .entry(owner.to_string())
            .or_insert(0) += 1;
    }

    /// References an object if the store already holds it.
    ///
    /// Returns `false` when the object is absent and must be transferred.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be queried.
    pub fn link_existing(&self, owner: &str, fingerprint: &Fingerprint) -> StoreResult<bool> {
        let mut refs = self.refs.lock();
        if !self.store.contains(fingerprint)? {
            return Ok(false);
        }
        *refs
            .entry(*fingerprint)
            .or_default()
            .entry(owner.to_string())
            .or_insert(0) += 1;
        tracing::trace!(owner, %fingerprint, "linked existing object");
        Ok(true)
    }

    /// Commits a staged object and references it for `owner`.
    ///
    /// # Errors
    ///
    /// Returns an error if the commit fails; no reference is taken then.
    pub fn commit(&self, owner: &str, staged: StagedObject) -> StoreResult<Fingerprint> {
        let fingerprint = *staged.fingerprint();
        let mut refs = self.refs.lock();
        let written = self.store.commit(staged)?;
        *refs
            .entry(fingerprint)
            .or_default()
            .entry(owner.to_string())
            .or_insert(0) += 1;
        tracing::trace!(owner, %fingerprint, written, "committed object");
        Ok(fingerprint)
    }

    /// Drops one of `owner`'s references to an object.
    ///
    /// Returns `true` if that was the last reference from any owner and the
    /// object was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the object could not be deleted. The reference
    /// is released regardless; a later [`ContentPool::sweep`] collects it.
    pub fn release(&self, owner: &str, fingerprint: &Fingerprint) -> StoreResult<bool> {
        let mut refs = self.refs.lock();
        let Some(owners) = refs.get_mut(fingerprint) else {
            return Ok(false);
        };
        if let Some(count) = owners.get_mut(owner) {
            *count -= 1;
            if *count == 0 {
                owners.remove(owner);
            }
        }
        if !owners.is_empty() {
            return Ok(false);
        }
        refs.remove(fingerprint);
        let removed = self.store.remove(fingerprint)?;
        if removed {
            tracing::debug!(owner, %fingerprint, "deleted unreferenced object");
        }
        Ok(removed)
    }

    /// Drops every reference held by `owner`.
    ///
    /// Returns the objects that were deleted as a result.
    ///
    /// # Errors
    ///
    /// Returns the first deletion error after releasing all references.
    pub fn release_owner(&self, owner: &str) -> StoreResult<Vec<Fingerprint>> {
        let mut refs = self.refs.lock();
        let mut unreferenced = Vec::new();
        refs.retain(|fingerprint, owners| {
            owners.remove(owner);
            if owners.is_empty() {
                unreferenced.push(*fingerprint);
                false
            } else {
                true
            }
        });

        let mut deleted = Vec::new();
        let mut first_error = None;
        for fingerprint in unreferenced {
            match self.store.remove(&fingerprint) {
                Ok(true) => deleted.push(fingerprint),
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(owner, %fingerprint, error = %e, "failed to delete object");
                    first_error.get_or_insert(e);
                }
            }
        }
        deleted.sort();
        match first_error {
            Some(e) => Err(e),
            None => Ok(deleted),
        }
    }

    /// Total references to an object across all owners.
    pub fn references(&self, fingerprint: &Fingerprint) -> usize {
        self.refs
            .lock()
            .get(fingerprint)
            .map_or(0, |owners| owners.values().sum())
    }

    /// Owners referencing an object, sorted.
    pub fn owners(&self, fingerprint: &Fingerprint) -> Vec<String> {
        self.refs
            .lock()
            .get(fingerprint)
            .map(|owners| owners.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Stored objects that no owner references.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated.
    pub fn orphans(&self) -> StoreResult<Vec<Fingerprint>> {
        let refs = self.refs.lock();
        Ok(self
            .store
            .list()?
            .into_iter()
            .filter(|fp| !refs.contains_key(fp))
            .collect())
    }

    /// Deletes every unreferenced object and returns what was deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated or an object
    /// cannot be deleted.
    pub fn sweep(&self) -> StoreResult<Vec<Fingerprint>> {
        let refs = self.refs.lock();
        let mut deleted = Vec::new();
        for fingerprint in self.store.list()? {
            if refs.contains_key(&fingerprint) {
                continue;
            }
            if self.store.remove(&fingerprint)? {
                deleted.push(fingerprint);
            }
        }
        if !deleted.is_empty() {
            tracing::info!(count = deleted.len(), "swept orphaned objects");
        }
        Ok(deleted)
    }
}
