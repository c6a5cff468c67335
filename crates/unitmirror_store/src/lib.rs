//! # unitmirror store
//!
//! Content-addressable object storage for unitmirror.
//!
//! Objects are opaque byte streams named by their [`Fingerprint`]. A store
//! never holds the same fingerprint twice, and never interprets the bytes it
//! holds.
//!
//! ## Design Principles
//!
//! - Writes are staged first and committed with an atomic rename, so a
//!   reader never observes a partially written object
//! - Committing an object that already exists is a no-op
//! - Stores must be `Send + Sync`; concurrent commits of the same
//!   fingerprint are safe
//! - Ownership of objects is tracked by [`ContentPool`], not by the store
//!
//! ## Available Backends
//!
//! - [`InMemoryObjectStore`] - For testing
//! - [`FileObjectStore`] - One file per object under a root directory
//!
//! ## Example
//!
//! ```rust
//! use unitmirror_store::{InMemoryObjectStore, ObjectStore};
//!
//! let store = InMemoryObjectStore::new();
//! let fp = store.put(b"hello world").unwrap();
//! assert!(store.contains(&fp).unwrap());
//! assert_eq!(store.read(&fp).unwrap(), b"hello world");
//! ```
//!
//! [`Fingerprint`]: unitmirror_protocol::Fingerprint

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;
mod pool;

pub use backend::{ObjectStore, StagedObject};
pub use error::{StoreError, StoreResult};
pub use file::{FileObjectStore, STAGING_DIR};
pub use memory::InMemoryObjectStore;
pub use pool::ContentPool;
