//! Error types for protocol parsing and validation.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while parsing or validating protocol documents.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The manifest document could not be parsed.
    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    /// A manifest entry references a content path outside `content/<fingerprint>`.
    #[error("invalid content path {path:?}: {reason}")]
    InvalidContentPath {
        /// The offending relative path.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Two entries share the same unit identity.
    #[error("duplicate unit identity {0}")]
    DuplicateIdentity(String),

    /// A fingerprint string is not a lowercase SHA-256 hex digest.
    #[error("invalid fingerprint {value:?}: {reason}")]
    InvalidFingerprint {
        /// The rejected string.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// An unsupported URL scheme was supplied.
    #[error("unsupported protocol: {0}")]
    UnsupportedProtocol(String),

    /// A URL could not be parsed.
    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Parse failure.
        reason: String,
    },

    /// A repository id is not usable as a single path component.
    #[error("invalid repository id {repo_id:?}: {reason}")]
    InvalidRepoId {
        /// The rejected id.
        repo_id: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Reconcile options are contradictory.
    #[error("invalid reconcile options: {0}")]
    InvalidOptions(String),

    /// JSON encoding or decoding failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
