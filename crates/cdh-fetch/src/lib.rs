//! Byte retrieval for schema, mapping and source-file locations.
//!
//! The harmonization engine only ever needs two operations from storage:
//! read a location into a byte buffer and write a byte buffer to a location.
//! [`Fetch`] is that seam; local paths, `file://` URLs and `http(s)://` URLs
//! are covered here, anything else would plug in behind the same trait.

use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to read {location}: {source}")]
    Read {
        location: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write {location}: {source}")]
    Write {
        location: String,
        #[source]
        source: std::io::Error,
    },
    #[error("request for {location} failed: {source}")]
    Http {
        location: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("request for {location} returned status {status}")]
    HttpStatus { location: String, status: u16 },
    #[error("unsupported location scheme: {0}")]
    UnsupportedScheme(String),
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// Read a location into a byte buffer. One attempt; a failure is fatal to
/// the run.
pub trait Fetch {
    fn fetch(&self, location: &str) -> Result<Vec<u8>>;
}

/// Local filesystem retrieval for plain paths and `file://` URLs.
#[derive(Debug, Default, Clone)]
pub struct FileFetcher;

impl FileFetcher {
    /// Strip a `file://` prefix; plain paths pass through.
    fn to_path(location: &str) -> PathBuf {
        PathBuf::from(location.strip_prefix("file://").unwrap_or(location))
    }
}

impl Fetch for FileFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        debug!(location, "reading local file");
        fs::read(Self::to_path(location)).map_err(|source| FetchError::Read {
            location: location.to_string(),
            source,
        })
    }
}

/// HTTP(S) retrieval via a blocking client.
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
        }
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        debug!(location, "fetching remote document");
        let response = self
            .client
            .get(location)
            .send()
            .map_err(|source| FetchError::Http {
                location: location.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                location: location.to_string(),
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().map_err(|source| FetchError::Http {
            location: location.to_string(),
            source,
        })?;
        Ok(bytes.to_vec())
    }
}

/// Dispatches on location scheme: `http(s)://` to [`HttpFetcher`],
/// everything path-like to [`FileFetcher`].
#[derive(Debug, Default)]
pub struct StandardFetcher {
    file: FileFetcher,
    http: HttpFetcher,
}

impl Fetch for StandardFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>> {
        if location.starts_with("http://") || location.starts_with("https://") {
            self.http.fetch(location)
        } else if location.starts_with("file://") || !location.contains("://") {
            self.file.fetch(location)
        } else {
            Err(FetchError::UnsupportedScheme(location.to_string()))
        }
    }
}

/// True when the location resolves to an existing local file.
pub fn local_file_exists(location: &str) -> bool {
    if location.contains("://") && !location.starts_with("file://") {
        // remote locations are only checked at fetch time
        return true;
    }
    FileFetcher::to_path(location).is_file()
}

/// Write bytes to a local path, creating parent directories as needed.
pub fn write_bytes(location: &str, bytes: &[u8]) -> Result<()> {
    let path = FileFetcher::to_path(location);
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|source| FetchError::Write {
            location: location.to_string(),
            source,
        })?;
    }
    debug!(location, bytes = bytes.len(), "writing output file");
    fs::write(&path, bytes).map_err(|source| FetchError::Write {
        location: location.to_string(),
        source,
    })
}
