//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait so the status-code and
//! failure mapping can be tested without a network. [`ReqwestClient`] is the
//! production implementation.

use crate::error::{EngineResult, SyncError};
use crate::transport::Transport;
use std::fmt;
use std::io::Read;
use std::time::Duration;
use url::Url;

/// A failed HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpError {
    /// Response status, if a response was received.
    pub status: Option<u16>,
    /// Failure description.
    pub message: String,
    /// Whether the request exceeded the client timeout.
    pub timed_out: bool,
}

impl HttpError {
    /// An error carrying a response status.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            timed_out: false,
        }
    }

    /// An error where no response was received.
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            timed_out: false,
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// HTTP client abstraction.
///
/// Implementations issue a GET and hand back the response body as a stream.
/// Non-success statuses must be reported as errors.
pub trait HttpClient: Send + Sync {
    /// Sends a GET request and returns the response body.
    fn get(&self, url: &Url) -> Result<Box<dyn Read + Send>, HttpError>;
}

/// HTTP(S) transport over any [`HttpClient`].
///
/// Failure mapping:
/// - 404 and 410 become [`SyncError::NotFound`]
/// - timeouts become [`SyncError::Timeout`]
/// - 5xx, 408, 429 and connection failures are retryable transport errors
/// - every other status is a non-retryable transport error
pub struct HttpTransport<C: HttpClient> {
    client: C,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(client: C) -> Self {
        Self { client }
    }

    /// Returns the underlying client.
    pub fn client(&self) -> &C {
        &self.client
    }

    fn map_error(location: &Url, err: HttpError) -> SyncError {
        let url = location.to_string();
        if err.timed_out {
            return SyncError::Timeout { url };
        }
        match err.status {
            Some(404) | Some(410) => SyncError::NotFound { url },
            Some(status) if status >= 500 || status == 408 || status == 429 => {
                SyncError::transport_retryable(url, err.to_string())
            }
            Some(_) => SyncError::transport_fatal(url, err.to_string()),
            None => SyncError::transport_retryable(url, err.to_string()),
        }
    }
}

impl<C: HttpClient> Transport for HttpTransport<C> {
    fn open(&self, location: &Url) -> EngineResult<Box<dyn Read + Send>> {
        match location.scheme() {
            "http" | "https" => {}
            other => {
                return Err(SyncError::InvalidLocation(format!(
                    "{} is not an http(s) location ({})",
                    location, other
                )))
            }
        }
        tracing::trace!(url = %location, "GET");
        self.client
            .get(location)
            .map_err(|e| Self::map_error(location, e))
    }
}

/// Blocking [`HttpClient`] backed by reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Creates a client whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidConfig`] for a zero timeout: every request
    /// must be bounded.
    pub fn new(timeout: Duration) -> EngineResult<Self> {
        if timeout.is_zero() {
            return Err(SyncError::InvalidConfig(
                "transport timeout must be greater than zero".into(),
            ));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("unitmirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &Url) -> Result<Box<dyn Read + Send>, HttpError> {
        let response = self.client.get(url.as_str()).send().map_err(|e| HttpError {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
            timed_out: e.is_timeout(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::status(
                status.as_u16(),
                status.canonical_reason().unwrap_or("request failed"),
            ));
        }
        Ok(Box::new(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::io::Cursor;

    #[derive(Default)]
    struct TestClient {
        responses: Mutex<HashMap<String, Result<Vec<u8>, HttpError>>>,
    }

    impl TestClient {
        fn set(&self, url: &str, response: Result<Vec<u8>, HttpError>) {
            self.responses.lock().insert(url.to_string(), response);
        }
    }

    impl HttpClient for TestClient {
        fn get(&self, url: &Url) -> Result<Box<dyn Read + Send>, HttpError> {
            match self.responses.lock().get(url.as_str()).cloned() {
                Some(Ok(body)) => Ok(Box::new(Cursor::new(body))),
                Some(Err(e)) => Err(e),
                None => Err(HttpError::status(404, "Not Found")),
            }
        }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn successful_get() {
        let client = TestClient::default();
        client.set("https://up/units.json", Ok(b"[]".to_vec()));
        let transport = HttpTransport::new(client);

        assert_eq!(transport.fetch(&url("https://up/units.json")).unwrap(), b"[]");
    }

    #[test]
    fn not_found_mapping() {
        let transport = HttpTransport::new(TestClient::default());
        let err = transport.fetch(&url("http://up/missing")).unwrap_err();
        assert!(matches!(err, SyncError::NotFound { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn server_errors_are_retryable() {
        let client = TestClient::default();
        client.set("http://up/a", Err(HttpError::status(503, "Service Unavailable")));
        client.set("http://up/b", Err(HttpError::status(403, "Forbidden")));
        client.set("http://up/c", Err(HttpError::connection("connection refused")));
        client.set(
            "http://up/d",
            Err(HttpError {
                status: None,
                message: "operation timed out".into(),
                timed_out: true,
            }),
        );
        let transport = HttpTransport::new(client);

        assert!(transport.fetch(&url("http://up/a")).unwrap_err().is_retryable());
        assert!(!transport.fetch(&url("http://up/b")).unwrap_err().is_retryable());
        assert!(transport.fetch(&url("http://up/c")).unwrap_err().is_retryable());
        assert!(matches!(
            transport.fetch(&url("http://up/d")),
            Err(SyncError::Timeout { .. })
        ));
    }

    #[test]
    fn rejects_non_http_scheme() {
        let transport = HttpTransport::new(TestClient::default());
        assert!(matches!(
            transport.open(&url("file:///etc/hosts")),
            Err(SyncError::InvalidLocation(_))
        ));
    }

    #[test]
    fn zero_timeout_is_a_config_error() {
        assert!(matches!(
            ReqwestClient::new(Duration::ZERO),
            Err(SyncError::InvalidConfig(_))
        ));
        assert!(ReqwestClient::new(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn http_error_display() {
        assert_eq!(HttpError::status(502, "Bad Gateway").to_string(), "HTTP 502: Bad Gateway");
        assert_eq!(HttpError::connection("dns failure").to_string(), "dns failure");
    }
}
