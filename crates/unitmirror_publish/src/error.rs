//! Error types for publishing.

use std::path::PathBuf;
use thiserror::Error;
use unitmirror_protocol::{ProtocolError, UnitIdentity};
use unitmirror_store::StoreError;

/// Result type for publish operations.
pub type PublishResult<T> = Result<T, PublishError>;

/// Errors that can occur while publishing a repository.
#[derive(Error, Debug)]
pub enum PublishError {
    /// The same unit identity appears twice in one publish input.
    #[error("duplicate unit {0} in publish input")]
    DuplicateUnit(UnitIdentity),

    /// A unit's bytes could not be read from its storage path.
    #[error("cannot read unit {unit} from {path:?}: {message}")]
    UnitUnreadable {
        /// The unit being published.
        unit: UnitIdentity,
        /// Its storage path.
        path: PathBuf,
        /// The underlying failure.
        message: String,
    },

    /// The configured base URL cannot be served to consumers.
    #[error("invalid base url {url:?}: {reason}")]
    InvalidBaseUrl {
        /// The configured URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Object pool error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid repository id or manifest.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use unitmirror_protocol::UnitKey;

    #[test]
    fn error_display() {
        let unit = UnitIdentity::new("rpm", UnitKey::new().with("name", "zsh"));
        let err = PublishError::UnitUnreadable {
            unit,
            path: "/missing/zsh.rpm".into(),
            message: "No such file or directory".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("zsh"));
        assert!(msg.contains("/missing/zsh.rpm"));
    }
}
