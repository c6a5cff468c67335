//! Bindings between a downstream node and upstream repositories.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use url::Url;

/// Checks that `repo_id` can name a directory on both sides of a mirror.
///
/// Ids must be a single normal path component. Leading dots are reserved for
/// bookkeeping directories such as the publisher's object pool.
pub fn validate_repo_id(repo_id: &str) -> ProtocolResult<()> {
    let reject = |reason: &str| {
        Err(ProtocolError::InvalidRepoId {
            repo_id: repo_id.to_string(),
            reason: reason.to_string(),
        })
    };
    if repo_id.is_empty() {
        return reject("must not be empty");
    }
    if repo_id.starts_with('.') {
        return reject("must not start with '.'");
    }
    if repo_id.contains(['/', '\\', '\0']) {
        return reject("must not contain path separators");
    }
    let mut components = std::path::Path::new(repo_id).components();
    match (components.next(), components.next()) {
        (Some(std::path::Component::Normal(_)), None) => Ok(()),
        _ => reject("must be a single path component"),
    }
}

/// Transport protocol a repository is published over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Local or network filesystem (`file://`).
    File,
    /// Plain HTTP.
    Http,
    /// HTTP over TLS.
    Https,
}

impl Protocol {
    /// Returns the URL scheme for this protocol.
    pub fn scheme(&self) -> &'static str {
        match self {
            Protocol::File => "file",
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }

    /// Determines the protocol from a URL string.
    pub fn of_url(url: &str) -> ProtocolResult<Self> {
        parse_url(url)?.scheme().parse()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

impl FromStr for Protocol {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(Protocol::File),
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            other => Err(ProtocolError::UnsupportedProtocol(other.to_string())),
        }
    }
}

/// Where a mirrored repository is fetched from.
///
/// This is the payload a publisher hands to consumers, and what a binding's
/// distributor configuration carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorSource {
    /// Transport protocol.
    pub protocol: Protocol,
    /// Host serving the repository, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Absolute URL of the repository's `units.json`.
    pub manifest_url: String,
}

impl MirrorSource {
    /// Creates a source from a manifest URL, deriving protocol and host.
    ///
    /// The host is `host[:port]`; credentials in the URL are never copied
    /// into it.
    pub fn from_manifest_url(manifest_url: impl Into<String>) -> ProtocolResult<Self> {
        let manifest_url = manifest_url.into();
        let url = parse_url(&manifest_url)?;
        let protocol: Protocol = url.scheme().parse()?;
        let host = match protocol {
            Protocol::File => None,
            Protocol::Http | Protocol::Https => url.host_str().map(|h| match url.port() {
                Some(port) => format!("{}:{}", h, port),
                None => h.to_string(),
            }),
        };
        Ok(Self {
            protocol,
            host,
            manifest_url,
        })
    }
}

fn parse_url(url: &str) -> ProtocolResult<Url> {
    Url::parse(url).map_err(|e| ProtocolError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// A declaration that a downstream node mirrors one upstream repository.
///
/// The desired set of bindings is supplied by the caller on every
/// reconciliation pass and is never persisted by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    /// The downstream consumer the binding belongs to.
    pub consumer_id: String,
    /// The upstream repository to mirror.
    pub repo_id: String,
    /// Where to fetch the repository from.
    pub distributor_config: MirrorSource,
}

impl Binding {
    /// Creates a binding.
    pub fn new(
        consumer_id: impl Into<String>,
        repo_id: impl Into<String>,
        distributor_config: MirrorSource,
    ) -> Self {
        Self {
            consumer_id: consumer_id.into(),
            repo_id: repo_id.into(),
            distributor_config,
        }
    }
}

/// Caller options for a reconciliation pass.
///
/// `all` and `repo_ids` are mutually exclusive. When neither is given every
/// desired binding is reconciled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOptions {
    /// Reconcile every desired binding.
    #[serde(default)]
    pub all: bool,
    /// Reconcile only these repositories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_ids: Option<BTreeSet<String>>,
}

impl ReconcileOptions {
    /// Options selecting every binding.
    pub fn all() -> Self {
        Self {
            all: true,
            repo_ids: None,
        }
    }

    /// Options selecting an explicit subset of repositories.
    pub fn only<I, S>(repo_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            all: false,
            repo_ids: Some(repo_ids.into_iter().map(Into::into).collect()),
        }
    }

    /// Rejects contradictory options.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.all && self.repo_ids.is_some() {
            return Err(ProtocolError::InvalidOptions(
                "`all` and an explicit repo_ids subset are mutually exclusive".into(),
            ));
        }
        Ok(())
    }

    /// Returns true if `repo_id` is in scope for this pass.
    pub fn selects(&self, repo_id: &str) -> bool {
        match &self.repo_ids {
            Some(ids) if !self.all => ids.contains(repo_id),
            _ => true,
        }
    }
}
