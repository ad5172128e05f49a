//! Opening the media to upload, from disk or from a URL.

use std::fmt;
use std::path::Path;

use futures_util::TryStreamExt;
use reqwest::Client;
use reqwest::header::CONTENT_LENGTH;
use tokio::io::AsyncRead;
use tokio_util::io::StreamReader;
use tracing::{debug, info, instrument, warn};

use super::error::SourceError;

/// Byte source for an upload with a best-effort total length.
pub struct UploadSource {
    name: String,
    total_bytes: u64,
    reader: Box<dyn AsyncRead + Send + Unpin>,
}

impl fmt::Debug for UploadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadSource")
            .field("name", &self.name)
            .field("total_bytes", &self.total_bytes)
            .finish_non_exhaustive()
    }
}

/// Returns whether `location` names a remote source.
///
/// ```
/// use uploader_core::upload::is_remote_location;
///
/// assert!(is_remote_location("https://example.com/clip.mp4"));
/// assert!(is_remote_location("HTTP://example.com/clip.mp4"));
/// assert!(!is_remote_location("./httpdocs/clip.mp4"));
/// ```
#[must_use]
pub fn is_remote_location(location: &str) -> bool {
    url::Url::parse(location).is_ok_and(|u| matches!(u.scheme(), "http" | "https"))
}

impl UploadSource {
    /// Opens `location` as a URL (HEAD for size, then GET) or a local file.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] when the file cannot be opened or the remote
    /// fetch fails.
    #[instrument(skip(client))]
    pub async fn open(location: &str, client: &Client) -> Result<Self, SourceError> {
        if is_remote_location(location) {
            Self::open_remote(location, client).await
        } else {
            Self::open_file(Path::new(location)).await
        }
    }

    /// Opens a local file, taking its size from metadata.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Open`] if the file cannot be opened or stated.
    pub async fn open_file(path: &Path) -> Result<Self, SourceError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| SourceError::open(path, e))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| SourceError::open(path, e))?;
        debug!(path = %path.display(), bytes = metadata.len(), "opened local source");
        Ok(Self {
            name: path.display().to_string(),
            total_bytes: metadata.len(),
            reader: Box::new(file),
        })
    }

    async fn open_remote(url: &str, client: &Client) -> Result<Self, SourceError> {
        let head = client
            .head(url)
            .send()
            .await
            .map_err(|e| SourceError::fetch(url, e))?;
        let mut total_bytes = if head.status().is_success() {
            head.headers()
                .get(CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(0)
        } else {
            warn!(status = head.status().as_u16(), "HEAD request failed; size unknown until GET");
            0
        };

        let response = client
            .get(url)
            .send()
            .await
            .map_err(|e| SourceError::fetch(url, e))?;
        if !response.status().is_success() {
            return Err(SourceError::http_status(url, response.status().as_u16()));
        }
        if let Some(len) = response.content_length() {
            total_bytes = len;
        }
        if total_bytes == 0 {
            info!(url, "remote source did not report a length; progress percentage unavailable");
        }
        debug!(url, total_bytes, "opened remote source");

        let body = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Self {
            name: url.to_string(),
            total_bytes,
            reader: Box::new(StreamReader::new(Box::pin(body))),
        })
    }

    /// Wraps an arbitrary reader. `total_bytes` of 0 means unknown.
    #[must_use]
    pub fn from_reader(
        name: impl Into<String>,
        total_bytes: u64,
        reader: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            total_bytes,
            reader: Box::new(reader),
        }
    }

    /// Display name (path or URL).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared total length; 0 when unknown.
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Consumes the source, returning its reader.
    #[must_use]
    pub fn into_reader(self) -> Box<dyn AsyncRead + Send + Unpin> {
        self.reader
    }
}
