//! Publisher configuration.

use std::path::{Path, PathBuf};

/// How a repository's `content/<fingerprint>` entry refers to the pooled object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkMode {
    /// Hard link into the pool. Requires pool and repositories on one filesystem.
    #[default]
    HardLink,
    /// Relative symbolic link into the pool.
    Symlink,
}

/// Configuration for a [`crate::Publisher`].
#[derive(Debug, Clone)]
pub struct PublishConfig {
    /// Directory every repository is published under.
    pub destination_root: PathBuf,
    /// URL at which `destination_root` is served to consumers.
    ///
    /// When unset, consumers are pointed at the root with a `file://` URL.
    pub base_url: Option<String>,
    /// Advertise HTTPS to consumers even if `base_url` says `http`.
    pub serve_https: bool,
    /// Host advertised to consumers instead of the one in `base_url`.
    pub host: Option<String>,
    /// How repository content entries link to pooled objects.
    pub link_mode: LinkMode,
}

impl PublishConfig {
    /// Creates a configuration publishing under `destination_root`.
    pub fn new(destination_root: impl Into<PathBuf>) -> Self {
        Self {
            destination_root: destination_root.into(),
            base_url: None,
            serve_https: false,
            host: None,
            link_mode: LinkMode::default(),
        }
    }

    /// Sets the URL the destination root is served under.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Advertises HTTPS to consumers.
    pub fn with_https(mut self, serve_https: bool) -> Self {
        self.serve_https = serve_https;
        self
    }

    /// Overrides the advertised host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the link mode.
    pub fn with_link_mode(mut self, link_mode: LinkMode) -> Self {
        self.link_mode = link_mode;
        self
    }

    /// Returns the destination root.
    pub fn destination_root(&self) -> &Path {
        &self.destination_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = PublishConfig::new("/srv/pub");
        assert_eq!(config.destination_root(), Path::new("/srv/pub"));
        assert!(config.base_url.is_none());
        assert!(!config.serve_https);
        assert_eq!(config.link_mode, LinkMode::HardLink);
    }

    #[test]
    fn config_builder() {
        let config = PublishConfig::new("/srv/pub")
            .with_base_url("http://mirror.example.com/pub/")
            .with_https(true)
            .with_host("cdn.example.com")
            .with_link_mode(LinkMode::Symlink);

        assert_eq!(config.base_url.as_deref(), Some("http://mirror.example.com/pub/"));
        assert!(config.serve_https);
        assert_eq!(config.host.as_deref(), Some("cdn.example.com"));
        assert_eq!(config.link_mode, LinkMode::Symlink);
    }
}
