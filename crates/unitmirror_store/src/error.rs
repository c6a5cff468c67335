//! Error types for store operations.

use std::io;
use thiserror::Error;
use unitmirror_protocol::Fingerprint;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The requested object does not exist.
    #[error("object {0} not found")]
    NotFound(Fingerprint),

    /// An object's bytes do not hash to its name.
    #[error("object {expected} is corrupted: content hashes to {actual}")]
    Corrupted {
        /// The fingerprint the object is stored under.
        expected: Fingerprint,
        /// The fingerprint of its actual bytes.
        actual: Fingerprint,
    },
}
