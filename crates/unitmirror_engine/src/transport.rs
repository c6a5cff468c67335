//! Transport layer abstraction for fetching manifests and content.
//!
//! A transport only opens byte streams. It has no notion of manifests,
//! fingerprints or retries; the sync coordinator decides what a failure
//! means depending on whether a manifest or a content object was requested.

use crate::config::EngineConfig;
use crate::error::{EngineResult, SyncError};
use crate::http::{HttpTransport, ReqwestClient};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Cursor, Read};
use url::Url;

/// Opens readable byte streams at a location.
///
/// Implementations must be usable from several threads at once; the sync
/// coordinator fetches content objects in parallel through one transport.
pub trait Transport: Send + Sync {
    /// Opens a stream at `location`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`] if nothing exists there and a
    /// [`SyncError::Transport`] for connectivity failures.
    fn open(&self, location: &Url) -> EngineResult<Box<dyn Read + Send>>;

    /// Opens a stream at `segments` below `base`.
    ///
    /// # Errors
    ///
    /// As [`Transport::open`], or [`SyncError::InvalidLocation`] if `base`
    /// cannot have path segments.
    fn open_at(&self, base: &Url, segments: &[&str]) -> EngineResult<Box<dyn Read + Send>> {
        self.open(&resolve(base, segments)?)
    }

    /// Reads everything at `location` into memory.
    ///
    /// # Errors
    ///
    /// As [`Transport::open`]; a failure while reading the body is a
    /// retryable transport error.
    fn fetch(&self, location: &Url) -> EngineResult<Vec<u8>> {
        let mut reader = self.open(location)?;
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .map_err(|e| SyncError::transport_retryable(location.as_str(), e.to_string()))?;
        Ok(data)
    }
}

/// Parses a location string into a URL.
///
/// # Errors
///
/// Returns [`SyncError::InvalidLocation`] if it is not an absolute URL.
pub fn parse_location(location: &str) -> EngineResult<Url> {
    Url::parse(location).map_err(|e| SyncError::InvalidLocation(format!("{}: {}", location, e)))
}

/// Appends path segments to a base URL.
///
/// # Errors
///
/// Returns [`SyncError::InvalidLocation`] if `base` cannot be a base.
pub fn resolve(base: &Url, segments: &[&str]) -> EngineResult<Url> {
    let mut url = base.clone();
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|()| SyncError::InvalidLocation(base.to_string()))?;
        path.pop_if_empty();
        path.extend(segments);
    }
    Ok(url)
}

/// Returns the repository root a manifest URL lives in.
///
/// # Errors
///
/// Returns [`SyncError::InvalidLocation`] if no parent can be derived.
pub fn repo_base(manifest_url: &Url) -> EngineResult<Url> {
    manifest_url
        .join("./")
        .map_err(|e| SyncError::InvalidLocation(format!("{}: {}", manifest_url, e)))
}

/// Transport for `file://` locations.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileTransport;

impl FileTransport {
    /// Creates a file transport.
    pub fn new() -> Self {
        Self
    }
}

impl Transport for FileTransport {
    fn open(&self, location: &Url) -> EngineResult<Box<dyn Read + Send>> {
        if location.scheme() != "file" {
            return Err(SyncError::InvalidLocation(format!(
                "{} is not a file:// location",
                location
            )));
        }
        let path = location
            .to_file_path()
            .map_err(|()| SyncError::InvalidLocation(location.to_string()))?;

        match File::open(&path) {
            Ok(file) if file.metadata().map(|m| m.is_dir()).unwrap_or(false) => {
                Err(SyncError::transport_fatal(location.as_str(), "is a directory"))
            }
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(SyncError::NotFound {
                url: location.to_string(),
            }),
            Err(e) => Err(SyncError::Transport {
                url: location.to_string(),
                message: e.to_string(),
                retryable: e.kind() == io::ErrorKind::Interrupted,
            }),
        }
    }
}

/// Transport choosing a concrete transport by URL scheme.
///
/// `file` goes to a [`FileTransport`], `http` and `https` to an HTTP
/// transport. Any other scheme is an invalid location.
pub struct SchemeTransport {
    file: FileTransport,
    http: Box<dyn Transport>,
}

impl SchemeTransport {
    /// Creates a transport using a reqwest client configured from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] if the HTTP client cannot be built.
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        let client = ReqwestClient::new(config.timeout)?;
        Ok(Self::with_http(HttpTransport::new(client)))
    }

    /// Creates a transport with a custom HTTP transport.
    pub fn with_http(http: impl Transport + 'static) -> Self {
        Self {
            file: FileTransport,
            http: Box::new(http),
        }
    }
}

impl std::fmt::Debug for SchemeTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemeTransport").finish_non_exhaustive()
    }
}

impl Transport for SchemeTransport {
    fn open(&self, location: &Url) -> EngineResult<Box<dyn Read + Send>> {
        match location.scheme() {
            "file" => self.file.open(location),
            "http" | "https" => self.http.open(location),
            other => Err(SyncError::InvalidLocation(format!(
                "unsupported scheme {:?} in {}",
                other, location
            ))),
        }
    }
}

#[derive(Debug, Clone)]
enum MockResponse {
    Body(Vec<u8>),
    Fail { retryable: bool, remaining: Option<u32> },
}

/// A mock transport for testing.
///
/// Locations not registered answer [`SyncError::NotFound`].
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<String, Vec<MockResponse>>>,
    requests: Mutex<HashMap<String, usize>>,
}

impl MockTransport {
    /// Creates an empty mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `data` at `location`.
    pub fn insert(&self, location: &str, data: impl Into<Vec<u8>>) {
        self.responses
            .lock()
            .insert(location.to_string(), vec![MockResponse::Body(data.into())]);
    }

    /// Makes every request to `location` fail.
    pub fn fail(&self, location: &str, retryable: bool) {
        self.responses.lock().insert(
            location.to_string(),
            vec![MockResponse::Fail {
                retryable,
                remaining: None,
            }],
        );
    }

    /// Makes the next `times` requests to `location` fail with a retryable
    /// error before it serves what was registered with [`MockTransport::insert`].
    pub fn fail_times(&self, location: &str, times: u32) {
        self.responses
            .lock()
            .entry(location.to_string())
            .or_default()
            .insert(
                0,
                MockResponse::Fail {
                    retryable: true,
                    remaining: Some(times),
                },
            );
    }

    /// Number of requests made to `location`.
    pub fn requests(&self, location: &str) -> usize {
        self.requests.lock().get(location).copied().unwrap_or(0)
    }

    /// Total requests made.
    pub fn total_requests(&self) -> usize {
        self.requests.lock().values().sum()
    }
}

impl Transport for MockTransport {
    fn open(&self, location: &Url) -> EngineResult<Box<dyn Read + Send>> {
        let key = location.as_str();
        *self.requests.lock().entry(key.to_string()).or_insert(0) += 1;

        let mut responses = self.responses.lock();
        let Some(queue) = responses.get_mut(key) else {
            return Err(SyncError::NotFound {
                url: key.to_string(),
            });
        };

        match queue.first_mut() {
            Some(MockResponse::Body(data)) => Ok(Box::new(Cursor::new(data.clone()))),
            Some(MockResponse::Fail {
                retryable,
                remaining,
            }) => {
                let retryable = *retryable;
                if let Some(left) = remaining {
                    *left = left.saturating_sub(1);
                    if *left == 0 {
                        queue.remove(0);
                    }
                }
                Err(SyncError::Transport {
                    url: key.to_string(),
                    message: "injected failure".into(),
                    retryable,
                })
            }
            None => Err(SyncError::NotFound {
                url: key.to_string(),
            }),
        }
    }
}
