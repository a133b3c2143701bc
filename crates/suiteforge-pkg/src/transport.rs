//! Byte-level artifact transport.
//!
//! The resolver never talks to the network directly; it asks a [`Transport`]
//! for the bytes behind a URL. [`HttpTransport`] is the default, serving
//! `http(s)://` through a blocking reqwest client and `file://` URLs or bare
//! paths from disk.

use crate::config::Config;
use std::path::Path;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while acquiring suites or artifacts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Connection, timeout or body read failure.
    #[error("network error fetching '{url}': {reason}")]
    Network { url: String, reason: String },

    /// The server answered with a non-success status.
    #[error("'{url}' returned status {status}")]
    Status { url: String, status: u16 },

    /// Nothing exists at the location.
    #[error("'{location}' not found")]
    NotFound { location: String },

    /// Local filesystem failure.
    #[error("I/O error at '{path}': {reason}")]
    Io { path: String, reason: String },

    /// An external command (such as git) failed.
    #[error("command `{command}` failed: {reason}")]
    Command { command: String, reason: String },

    /// A fetched snapshot could not be used.
    #[error("invalid snapshot from '{location}': {reason}")]
    InvalidSnapshot { location: String, reason: String },

    /// Every location was tried and none worked.
    #[error("all locations failed for {what}:\n  {}", .attempts.join("\n  "))]
    Exhausted { what: String, attempts: Vec<String> },
}

impl FetchError {
    /// Whether a retry of the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    pub(crate) fn io(path: &Path, err: &std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound {
                location: path.display().to_string(),
            }
        } else {
            Self::Io {
                path: path.display().to_string(),
                reason: err.to_string(),
            }
        }
    }
}

/// Downloads the bytes behind a URL.
pub trait Transport: Send + Sync {
    fn download(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Returns the local path for `file://` URLs and scheme-less paths.
#[must_use]
pub fn local_path(url: &str) -> Option<&Path> {
    if let Some(path) = url.strip_prefix("file://") {
        return Some(Path::new(path));
    }
    if url.contains("://") {
        None
    } else {
        Some(Path::new(url))
    }
}

/// HTTP(S) and local-file transport with bounded retries.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    retries: u32,
    retry_delay: Duration,
}

impl HttpTransport {
    /// Create a transport from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &Config) -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.fetch_timeout())
            .build()
            .map_err(|e| FetchError::Network {
                url: String::new(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            retries: config.fetch_retries,
            retry_delay: Duration::from_millis(500),
        })
    }

    /// Override the pause between retries.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn download_once(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/octet-stream")
            .send()
            .map_err(|e| FetchError::Network {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound {
                location: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|e| FetchError::Network {
                url: url.to_string(),
                reason: e.to_string(),
            })
    }
}

impl Transport for HttpTransport {
    fn download(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if let Some(path) = local_path(url) {
            debug!(path = %path.display(), "reading local artifact");
            return std::fs::read(path).map_err(|e| FetchError::io(path, &e));
        }

        let mut attempt = 0;
        loop {
            match self.download_once(url) {
                Ok(bytes) => {
                    debug!(url, bytes = bytes.len(), "downloaded");
                    return Ok(bytes);
                }
                Err(err) if err.is_transient() && attempt < self.retries => {
                    attempt += 1;
                    warn!(url, attempt, "transient fetch failure, retrying: {err}");
                    thread::sleep(self.retry_delay * attempt);
                }
                Err(err) => return Err(err),
            }
        }
    }
}
