//! Test fixtures for upstream and downstream trees.
//!
//! Both fixtures live in temporary directories that are removed on drop.

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use unitmirror_protocol::{
    content_path, Binding, ContentUnit, Fingerprint, Metadata, MirrorSource, UnitKey,
    CONTENT_DIR,
};
use unitmirror_publish::{PublishConfig, PublishReport, Publisher};

/// Unit type used by fixture units.
pub const TEST_TYPE_ID: &str = "rpm";

/// Consumer id used by fixture bindings.
pub const TEST_CONSUMER_ID: &str = "test-consumer";

/// A temporary upstream: a publisher plus a directory of unit source files.
pub struct TestUpstream {
    publisher: Publisher,
    sources: PathBuf,
    _temp_dir: TempDir,
}

impl TestUpstream {
    /// Creates an upstream publishing under a fresh temporary directory.
    ///
    /// No base URL is configured, so consumers are bound over `file://`.
    pub fn new() -> Self {
        Self::with_config(|config| config)
    }

    /// Creates an upstream, letting the caller adjust the publish config.
    pub fn with_config(configure: impl FnOnce(PublishConfig) -> PublishConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let sources = temp_dir.path().join("sources");
        fs::create_dir_all(&sources).expect("Failed to create source directory");

        let config = configure(PublishConfig::new(temp_dir.path().join("published")));
        let publisher = Publisher::new(config).expect("Failed to create publisher");
        Self {
            publisher,
            sources,
            _temp_dir: temp_dir,
        }
    }

    /// Returns the publisher.
    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Writes `data` to a source file and returns a unit named `name`.
    pub fn unit(&self, name: &str, data: &[u8]) -> ContentUnit {
        let path = self.sources.join(name);
        fs::write(&path, data).expect("Failed to write unit source");
        ContentUnit::new(TEST_TYPE_ID, UnitKey::new().with("name", name), path)
    }

    /// As [`TestUpstream::unit`], with metadata.
    pub fn unit_with_metadata(&self, name: &str, data: &[u8], metadata: Metadata) -> ContentUnit {
        self.unit(name, data).with_metadata(metadata)
    }

    /// Publishes `units` as `repo_id`.
    pub fn publish(&self, repo_id: &str, units: &[ContentUnit]) -> PublishReport {
        self.publisher
            .publish(units, repo_id)
            .expect("Failed to publish")
    }

    /// Publishes one unit per name, each holding the bytes of
    /// [`named_content`].
    pub fn publish_named(&self, repo_id: &str, names: &[&str]) -> PublishReport {
        let units: Vec<ContentUnit> = names
            .iter()
            .map(|name| self.unit(name, &named_content(name)))
            .collect();
        self.publish(repo_id, &units)
    }

    /// Returns the source a consumer binds to.
    pub fn source(&self, repo_id: &str) -> MirrorSource {
        self.publisher
            .consumer_payload(repo_id)
            .expect("Failed to build consumer payload")
    }

    /// Returns the manifest URL of `repo_id`.
    pub fn manifest_url(&self, repo_id: &str) -> String {
        self.source(repo_id).manifest_url
    }

    /// Returns a binding for `repo_id`.
    pub fn binding(&self, repo_id: &str) -> Binding {
        Binding::new(TEST_CONSUMER_ID, repo_id, self.source(repo_id))
    }

    /// Returns the published root of `repo_id`.
    pub fn repo_root(&self, repo_id: &str) -> PathBuf {
        self.publisher.repo_root(repo_id)
    }

    /// Replaces the published object for `fingerprint` in `repo_id` with
    /// other bytes, leaving the pooled copy untouched.
    pub fn replace_object(&self, repo_id: &str, fingerprint: &Fingerprint, data: &[u8]) {
        let path = self.repo_root(repo_id).join(content_path(fingerprint));
        fs::remove_file(&path).expect("Failed to unlink published object");
        fs::write(&path, data).expect("Failed to write replacement object");
    }

    /// Removes the published object for `fingerprint` from `repo_id`.
    pub fn remove_object(&self, repo_id: &str, fingerprint: &Fingerprint) {
        let path = self
            .repo_root(repo_id)
            .join(CONTENT_DIR)
            .join(fingerprint.to_hex());
        fs::remove_file(&path).expect("Failed to unlink published object");
    }
}

impl Default for TestUpstream {
    fn default() -> Self {
        Self::new()
    }
}

/// A temporary downstream root for local mirrors.
pub struct TestDownstream {
    temp_dir: TempDir,
}

impl TestDownstream {
    /// Creates an empty downstream root.
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }
}

impl Default for TestDownstream {
    fn default() -> Self {
        Self::new()
    }
}

/// The bytes [`TestUpstream::publish_named`] stores for `name`.
pub fn named_content(name: &str) -> Vec<u8> {
    format!("content of {}", name).into_bytes()
}

/// The fingerprint of [`named_content`] for `name`.
pub fn named_fingerprint(name: &str) -> Fingerprint {
    Fingerprint::compute(&named_content(name))
}
