//! Resumable upload client.
//!
//! An upload is one session-creating `POST` carrying the metadata, followed
//! by one `PUT` per chunk to the session URL. Only the chunk requests are
//! marked as payload, so the transport throttles and measures media bytes
//! and nothing else.

use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, HeaderValue, LOCATION};
use reqwest::{Body, Method, Request, Response, StatusCode};
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::constants::{
    CHUNK_GRANULARITY, DEFAULT_CHUNK_SIZE, DEFAULT_CONTENT_TYPE, DEFAULT_ENDPOINT,
    RESUME_INCOMPLETE, UPLOAD_CONTENT_LENGTH, UPLOAD_CONTENT_TYPE,
};
use super::error::UploadError;
use super::metadata::VideoMetadata;
use super::source::UploadSource;
use crate::transfer::{Transport, mark_payload};

/// The created video as reported by the final chunk response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedVideo {
    /// Server-assigned video ID.
    pub id: String,
}

/// Settings for [`UploadClient`].
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Session-creating endpoint.
    pub endpoint: Url,
    /// Bearer token sent on every request when set.
    pub access_token: Option<String>,
    /// Bytes per chunk request, see [`normalize_chunk_size`].
    pub chunk_size: usize,
    /// Media type announced for the upload.
    pub content_type: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            access_token: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
        }
    }
}

#[allow(clippy::expect_used)]
fn default_endpoint() -> Url {
    Url::parse(DEFAULT_ENDPOINT).expect("default endpoint is a valid URL")
}

/// Rounds `requested` up to a positive multiple of the chunk granularity.
///
/// ```
/// use uploader_core::upload::normalize_chunk_size;
///
/// assert_eq!(normalize_chunk_size(0), 256 * 1024);
/// assert_eq!(normalize_chunk_size(256 * 1024), 256 * 1024);
/// assert_eq!(normalize_chunk_size(300 * 1024), 512 * 1024);
/// ```
#[must_use]
pub fn normalize_chunk_size(requested: usize) -> usize {
    requested
        .max(1)
        .div_ceil(CHUNK_GRANULARITY)
        .saturating_mul(CHUNK_GRANULARITY)
}

/// Drives the resumable upload protocol over a [`Transport`].
#[derive(Debug)]
pub struct UploadClient<T> {
    transport: T,
    config: UploadConfig,
}

impl<T: Transport> UploadClient<T> {
    /// Creates a client. The chunk size is normalized.
    #[must_use]
    pub fn new(transport: T, mut config: UploadConfig) -> Self {
        config.chunk_size = normalize_chunk_size(config.chunk_size);
        Self { transport, config }
    }

    /// Returns the effective configuration.
    #[must_use]
    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Returns the transport requests go through.
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Uploads `source` with `metadata`, returning the created video.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError`] on transport failure, a non-success status,
    /// or a source read error. Nothing is retried.
    #[instrument(skip_all, fields(source = source.name(), total = source.total_bytes()))]
    pub async fn upload(
        &self,
        metadata: &VideoMetadata,
        source: UploadSource,
    ) -> Result<UploadedVideo, UploadError> {
        let declared = source.total_bytes();
        let session = self
            .start_session(metadata, (declared > 0).then_some(declared))
            .await?;
        info!(session = %session, "upload session created");
        self.send_chunks(&session, source.into_reader()).await
    }

    /// Creates a resumable session and returns its URL.
    ///
    /// # Errors
    ///
    /// Returns [`UploadError`] if the request fails or no `Location` comes back.
    pub async fn start_session(
        &self,
        metadata: &VideoMetadata,
        total_bytes: Option<u64>,
    ) -> Result<Url, UploadError> {
        let mut url = self.config.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("uploadType", "resumable")
            .append_pair("part", "snippet,status");

        let body = serde_json::to_vec(metadata).map_err(|source| UploadError::Metadata { source })?;
        let mut request = Request::new(Method::POST, url.clone());
        let headers = request.headers_mut();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=UTF-8"),
        );
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        if let Some(total) = total_bytes {
            headers.insert(UPLOAD_CONTENT_LENGTH, HeaderValue::from(total));
        }
        if let Ok(value) = HeaderValue::from_str(&self.config.content_type) {
            headers.insert(UPLOAD_CONTENT_TYPE, value);
        }
        *request.body_mut() = Some(Body::from(body));
        self.authorize(&mut request);

        let response = self.transport.execute(request).await?;
        if !response.status().is_success() {
            return Err(status_error("session", &url, response).await);
        }

        let location = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| url.join(v).ok())
            .ok_or_else(|| UploadError::MissingSessionUrl {
                url: url.to_string(),
            })?;
        Ok(location)
    }

    async fn send_chunks(
        &self,
        session: &Url,
        mut reader: Box<dyn AsyncRead + Send + Unpin>,
    ) -> Result<UploadedVideo, UploadError> {
        let chunk_size = self.config.chunk_size;
        let mut offset: u64 = 0;
        let mut current = read_chunk(&mut reader, chunk_size, offset).await?;

        loop {
            let len = current.len() as u64;
            // Read one chunk ahead so the final range can carry the exact total.
            let next = if current.len() < chunk_size {
                None
            } else {
                let following = read_chunk(&mut reader, chunk_size, offset + len).await?;
                (!following.is_empty()).then_some(following)
            };

            let range = content_range(offset, len, next.is_none());
            debug!(range = %range, "sending chunk");
            let response = self.put_chunk(session, current, &range).await?;
            let status = response.status();
            offset += len;

            if status.as_u16() == RESUME_INCOMPLETE {
                let Some(following) = next else {
                    return Err(UploadError::http_status(
                        "finalize",
                        session.as_str(),
                        RESUME_INCOMPLETE,
                        "server reported the upload as incomplete after the final chunk",
                    ));
                };
                if let Some(acked) = response.headers().get(reqwest::header::RANGE) {
                    debug!(acknowledged = ?acked, "chunk accepted");
                }
                current = following;
                continue;
            }

            if status == StatusCode::OK || status == StatusCode::CREATED {
                if next.is_some() {
                    warn!(offset, "server completed the upload before the final chunk");
                }
                let url = session.to_string();
                return response
                    .json::<UploadedVideo>()
                    .await
                    .map_err(|source| UploadError::InvalidResponse { url, source });
            }

            return Err(status_error("chunk", session, response).await);
        }
    }

    async fn put_chunk(
        &self,
        session: &Url,
        chunk: Vec<u8>,
        range: &str,
    ) -> Result<Response, UploadError> {
        let mut request = Request::new(Method::PUT, session.clone());
        let headers = request.headers_mut();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(chunk.len()));
        if let Ok(value) = HeaderValue::from_str(range) {
            headers.insert(CONTENT_RANGE, value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.config.content_type) {
            headers.insert(CONTENT_TYPE, value);
        }
        *request.body_mut() = Some(Body::from(chunk));
        mark_payload(&mut request);
        self.authorize(&mut request);
        Ok(self.transport.execute(request).await?)
    }

    fn authorize(&self, request: &mut Request) {
        let Some(token) = self.config.access_token.as_deref() else {
            return;
        };
        if let Ok(mut value) = HeaderValue::from_str(&format!("Bearer {token}")) {
            value.set_sensitive(true);
            request.headers_mut().insert(AUTHORIZATION, value);
        }
    }
}

/// Reads up to `limit` bytes, stopping early only at end of input.
async fn read_chunk(
    reader: &mut (dyn AsyncRead + Send + Unpin),
    limit: usize,
    offset: u64,
) -> Result<Vec<u8>, UploadError> {
    let mut chunk = Vec::with_capacity(limit);
    reader
        .take(limit as u64)
        .read_to_end(&mut chunk)
        .await
        .map_err(|source| UploadError::SourceRead { offset, source })?;
    Ok(chunk)
}

/// `Content-Range` value for a chunk of `len` bytes at `offset`.
fn content_range(offset: u64, len: u64, is_last: bool) -> String {
    if len == 0 {
        return format!("bytes */{offset}");
    }
    let end = offset + len - 1;
    if is_last {
        format!("bytes {offset}-{end}/{}", offset + len)
    } else {
        format!("bytes {offset}-{end}/*")
    }
}

async fn status_error(stage: &'static str, url: &Url, response: Response) -> UploadError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    UploadError::http_status(stage, url.as_str(), status, &body)
}
