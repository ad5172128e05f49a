//! Error types for the upload module.
//!
//! Each variant carries the context (path, URL, status) needed for an
//! actionable message at the top level.

use std::path::PathBuf;

use thiserror::Error;

use crate::transfer::TransportError;

/// Errors opening the media source. Fatal before any upload traffic.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Local file could not be opened or inspected.
    #[error("error opening {path}: {source}")]
    Open {
        /// The file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Remote source request failed at the network level.
    #[error("error fetching {url}: {source}")]
    Fetch {
        /// The source URL.
        url: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// Remote source answered with a non-success status.
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The source URL.
        url: String,
        /// The HTTP status code.
        status: u16,
    },
}

impl SourceError {
    /// Creates an open error.
    pub fn open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Open {
            path: path.into(),
            source,
        }
    }

    /// Creates a fetch error.
    pub fn fetch(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Fetch {
            url: url.into(),
            source,
        }
    }

    /// Creates a remote status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }
}

/// Errors loading a metadata JSON file.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The file could not be read.
    #[error("could not read metadata file {path}: {source}")]
    Read {
        /// The metadata file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid metadata JSON.
    #[error("could not parse metadata file {path}: {source}")]
    Parse {
        /// The metadata file path.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from the resumable upload exchange.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The transport failed; nothing is retried.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server rejected the credentials.
    #[error(
        "[AUTH] authorization rejected (HTTP {status}) at {url}\n  Suggestion: {suggestion}"
    )]
    AuthRequired {
        /// The URL that rejected the request.
        url: String,
        /// The HTTP status code (401 or 403).
        status: u16,
        /// User-facing hint.
        suggestion: &'static str,
    },

    /// Non-success status while creating the session or sending a chunk.
    #[error("HTTP {status} during {stage} at {url}: {body}")]
    HttpStatus {
        /// Which step of the exchange failed.
        stage: &'static str,
        /// The URL that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// Session creation succeeded but no usable `Location` was returned.
    #[error("upload session at {url} returned no usable Location header")]
    MissingSessionUrl {
        /// The session creation URL.
        url: String,
    },

    /// The final response body could not be decoded.
    #[error("invalid response from {url}: {source}")]
    InvalidResponse {
        /// The URL that returned the body.
        url: String,
        /// The underlying decode error.
        #[source]
        source: reqwest::Error,
    },

    /// Reading the next chunk from the source failed.
    #[error("error reading upload source at byte {offset}: {source}")]
    SourceRead {
        /// Byte offset where the read failed.
        offset: u64,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Metadata could not be serialized.
    #[error("could not encode upload metadata: {source}")]
    Metadata {
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}

/// Longest response body kept in an error message.
const MAX_ERROR_BODY: usize = 512;

impl UploadError {
    /// Creates a status error, promoting 401/403 to [`Self::AuthRequired`].
    pub fn http_status(
        stage: &'static str,
        url: impl Into<String>,
        status: u16,
        body: &str,
    ) -> Self {
        if matches!(status, 401 | 403) {
            return Self::AuthRequired {
                url: url.into(),
                status,
                suggestion: "Provide a valid access token with --token or UPLOADER_ACCESS_TOKEN.",
            };
        }
        let mut body = body.trim().to_string();
        if body.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|i| body.is_char_boundary(*i))
                .unwrap_or(0);
            body.truncate(cut);
            body.push_str("...");
        }
        Self::HttpStatus {
            stage,
            url: url.into(),
            status,
            body,
        }
    }

    /// Returns the HTTP status of the failed call, when there was one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthRequired { status, .. } | Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
