//! Error types for the mirror engine.

use thiserror::Error;
use unitmirror_protocol::{Fingerprint, ProtocolError};
use unitmirror_store::StoreError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, SyncError>;

/// Broad failure classes, deciding how far a failure propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Opening a manifest or content stream failed. Fatal to one repository sync.
    Transport,
    /// The manifest could not be parsed. Fatal to one repository sync.
    ManifestFormat,
    /// One content object could not be fetched. Recorded, never fatal.
    ObjectFetch,
    /// Local working state could not be created or removed.
    Reconciliation,
    /// The engine was configured or invoked incorrectly.
    Configuration,
    /// Local storage failed.
    Local,
}

/// Errors that can occur during sync and reconciliation.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Network or transport error.
    #[error("transport error for {url}: {message}")]
    Transport {
        /// The location being opened.
        url: String,
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// The location does not exist.
    #[error("not found: {url}")]
    NotFound {
        /// The missing location.
        url: String,
    },

    /// A request exceeded the configured timeout.
    #[error("timed out: {url}")]
    Timeout {
        /// The location being read.
        url: String,
    },

    /// The manifest was fetched but is not a valid manifest.
    #[error("malformed manifest at {url}: {message}")]
    ManifestFormat {
        /// The manifest location.
        url: String,
        /// Parse failure.
        message: String,
    },

    /// One content object could not be fetched.
    #[error("failed to fetch {unit}: {message}")]
    ObjectFetch {
        /// The unit whose content failed.
        unit: String,
        /// Failure description.
        message: String,
    },

    /// Fetched bytes do not hash to the fingerprint the manifest names.
    #[error("fingerprint mismatch: expected {expected}, got {actual}")]
    FingerprintMismatch {
        /// Fingerprint from the manifest.
        expected: Fingerprint,
        /// Fingerprint of the received bytes.
        actual: Fingerprint,
    },

    /// Local working state for a repository could not be changed.
    #[error("reconciliation failed for {repo_id}: {message}")]
    Reconciliation {
        /// The repository affected.
        repo_id: String,
        /// Failure description.
        message: String,
    },

    /// Reconcile options are contradictory.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// A location is not a supported URL.
    #[error("invalid location: {0}")]
    InvalidLocation(String),

    /// Engine or transport configuration is unusable.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Object store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Protocol document error.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
            retryable: false,
        }
    }

    /// Wraps a per-unit failure, naming the unit.
    pub fn object_fetch(unit: impl ToString, cause: &SyncError) -> Self {
        Self::ObjectFetch {
            unit: unit.to_string(),
            message: cause.to_string(),
        }
    }

    /// Creates a reconciliation error.
    pub fn reconciliation(repo_id: impl Into<String>, message: impl ToString) -> Self {
        Self::Reconciliation {
            repo_id: repo_id.into(),
            message: message.to_string(),
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout { .. } => true,
            SyncError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }

    /// Returns the failure class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Transport { .. } | SyncError::NotFound { .. } | SyncError::Timeout { .. } => {
                ErrorKind::Transport
            }
            SyncError::ManifestFormat { .. } => ErrorKind::ManifestFormat,
            SyncError::ObjectFetch { .. } | SyncError::FingerprintMismatch { .. } => {
                ErrorKind::ObjectFetch
            }
            SyncError::Reconciliation { .. } | SyncError::InvalidOptions(_) => {
                ErrorKind::Reconciliation
            }
            SyncError::InvalidLocation(_) | SyncError::InvalidConfig(_) => {
                ErrorKind::Configuration
            }
            SyncError::Store(_) | SyncError::Io(_) | SyncError::Protocol(_) => ErrorKind::Local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_errors() {
        assert!(SyncError::transport_retryable("http://up/x", "connection reset").is_retryable());
        assert!(!SyncError::transport_fatal("https://up/x", "invalid certificate").is_retryable());
        assert!(SyncError::Timeout { url: "http://up/x".into() }.is_retryable());
        assert!(!SyncError::NotFound { url: "http://up/x".into() }.is_retryable());
        assert!(!SyncError::InvalidOptions("both".into()).is_retryable());
    }

    #[test]
    fn error_kinds() {
        assert_eq!(
            SyncError::NotFound { url: "file:///x".into() }.kind(),
            ErrorKind::Transport
        );
        assert_eq!(
            SyncError::ManifestFormat {
                url: "file:///x".into(),
                message: "eof".into()
            }
            .kind(),
            ErrorKind::ManifestFormat
        );
        assert_eq!(
            SyncError::FingerprintMismatch {
                expected: Fingerprint::compute(b"a"),
                actual: Fingerprint::compute(b"b"),
            }
            .kind(),
            ErrorKind::ObjectFetch
        );
        assert_eq!(
            SyncError::reconciliation("repo", "permission denied").kind(),
            ErrorKind::Reconciliation
        );
    }

    #[test]
    fn error_display() {
        let err = SyncError::reconciliation("base", "disk full");
        assert_eq!(err.to_string(), "reconciliation failed for base: disk full");

        let err = SyncError::transport_retryable("http://up/units.json", "connection refused");
        assert!(err.to_string().contains("http://up/units.json"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn object_fetch_names_unit_and_cause() {
        let cause = SyncError::NotFound { url: "http://up/content/ab".into() };
        let err = SyncError::object_fetch("rpm:name=zsh", &cause);
        assert_eq!(err.kind(), ErrorKind::ObjectFetch);
        assert!(!err.is_retryable());
        let text = err.to_string();
        assert!(text.starts_with("failed to fetch rpm:name=zsh: "));
        assert!(text.contains("http://up/content/ab"));
    }
}
