//! Transport boundary and the throttling decorator.
//!
//! The upload client talks to the network through the [`Transport`] trait.
//! [`ReqwestTransport`] is the real network transport; [`ThrottlingTransport`]
//! wraps any transport and swaps the body of payload-carrying requests for a
//! [`RateLimitedStream`] bound to one shared [`TransferMonitor`].
//!
//! Payload requests are identified by an explicit marker set by the caller
//! with [`mark_payload`]. Unmarked requests pass through untouched whatever
//! their size.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use http_body_util::BodyExt;
use reqwest::header::{CONTENT_LENGTH, HeaderName, HeaderValue};
use reqwest::{Body, Client, Request, Response};
use tracing::{debug, instrument, trace};

use super::constants::PAYLOAD_MARKER_HEADER;
use super::error::TransportError;
use super::monitor::{MonitorHandle, TransferMonitor};
use super::throttle::RateLimitedStream;

/// Sends one HTTP request and returns the response.
///
/// Implementations must not alter request semantics beyond what they
/// document.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request`, returning the response or a transport failure.
    async fn execute(&self, request: Request) -> Result<Response, TransportError>;
}

/// Tags `request` as the payload-carrying request of an upload.
pub fn mark_payload(request: &mut Request) {
    request.headers_mut().insert(
        HeaderName::from_static(PAYLOAD_MARKER_HEADER),
        HeaderValue::from_static("1"),
    );
}

/// Returns whether `request` carries the payload marker.
#[must_use]
pub fn is_payload(request: &Request) -> bool {
    request.headers().contains_key(PAYLOAD_MARKER_HEADER)
}

/// Network transport backed by a pooled [`reqwest::Client`].
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Wraps an existing client.
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client with a connect timeout and a per-read timeout.
    ///
    /// There is no whole-request timeout since a paced upload body may take
    /// arbitrarily long. Redirects are not followed so that `308` answers
    /// reach the caller.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialised.
    pub fn with_timeouts(
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("uploader/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    /// Returns the underlying client for building requests.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: Request) -> Result<Response, TransportError> {
        let method = request.method().to_string();
        let url = request.url().to_string();
        self.client
            .execute(request)
            .await
            .map_err(|e| TransportError::from_reqwest(method, url, e))
    }
}

/// Transport decorator that throttles and measures payload request bodies.
///
/// Owns exactly one [`TransferMonitor`] for its whole lifetime. Every marked
/// request gets a fresh [`RateLimitedStream`], all of them reporting into
/// that monitor, so totals and rate history survive chunk boundaries.
#[derive(Debug)]
pub struct ThrottlingTransport<T> {
    inner: T,
    bytes_per_sec: u64,
    monitor: Arc<TransferMonitor>,
    handle: MonitorHandle,
    payload_requests: AtomicU64,
}

impl<T: Transport> ThrottlingTransport<T> {
    /// Wraps `inner` for a transfer of `total_bytes` (0 when unknown),
    /// capped at `bytes_per_sec` (0 for no cap).
    #[must_use]
    #[instrument(skip(inner))]
    pub fn new(inner: T, bytes_per_sec: u64, total_bytes: u64) -> Self {
        if bytes_per_sec == 0 {
            debug!("upload rate limiting disabled");
        } else {
            debug!("upload rate limiting enabled");
        }
        Self {
            inner,
            bytes_per_sec,
            monitor: Arc::new(TransferMonitor::new(total_bytes)),
            handle: MonitorHandle::new(),
            payload_requests: AtomicU64::new(0),
        }
    }

    /// Returns the monitor shared by all payload bodies.
    #[must_use]
    pub fn monitor(&self) -> &Arc<TransferMonitor> {
        &self.monitor
    }

    /// Returns a handle that yields the monitor once the first payload
    /// request has been seen.
    #[must_use]
    pub fn monitor_handle(&self) -> MonitorHandle {
        self.handle.clone()
    }

    /// Returns the configured ceiling in bytes per second.
    #[must_use]
    pub fn bytes_per_sec(&self) -> u64 {
        self.bytes_per_sec
    }

    /// Returns how many payload requests have passed through.
    #[must_use]
    pub fn payload_requests(&self) -> u64 {
        self.payload_requests.load(Ordering::SeqCst)
    }

    /// Returns the wrapped transport.
    #[must_use]
    pub fn inner(&self) -> &T {
        &self.inner
    }

    fn substitute_body(&self, request: &mut Request) {
        request.headers_mut().remove(PAYLOAD_MARKER_HEADER);
        self.handle.attach(Arc::clone(&self.monitor));
        let sequence = self.payload_requests.fetch_add(1, Ordering::SeqCst) + 1;

        let Some(body) = request.body_mut().take() else {
            debug!(sequence, "payload request has no body");
            return;
        };

        let declared_len = body
            .as_bytes()
            .map(|b| b.len() as u64)
            .or_else(|| declared_content_length(request));
        debug!(sequence, declared_len, "throttling payload request body");

        let limited = RateLimitedStream::new(
            body.into_data_stream(),
            self.bytes_per_sec,
            Arc::clone(&self.monitor),
        );
        *request.body_mut() = Some(Body::wrap_stream(limited));

        if let Some(len) = declared_len {
            request
                .headers_mut()
                .insert(CONTENT_LENGTH, HeaderValue::from(len));
        }
    }
}

#[async_trait]
impl<T: Transport> Transport for ThrottlingTransport<T> {
    async fn execute(&self, mut request: Request) -> Result<Response, TransportError> {
        if is_payload(&request) {
            self.substitute_body(&mut request);
        } else {
            trace!(method = %request.method(), url = %request.url(), "passing control request through");
        }
        self.inner.execute(request).await
    }
}

fn declared_content_length(request: &Request) -> Option<u64> {
    request
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use futures_util::StreamExt;
    use reqwest::Method;

    use super::*;

    /// Records what reached the wire side, drains bodies, then fails.
    #[derive(Default)]
    struct RecordingTransport {
        seen: Mutex<Vec<SeenRequest>>,
    }

    struct SeenRequest {
        buffered_len: Option<usize>,
        streamed_len: usize,
        had_marker: bool,
        content_length: Option<u64>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn execute(&self, mut request: Request) -> Result<Response, TransportError> {
            let had_marker = is_payload(&request);
            let content_length = declared_content_length(&request);
            let body = request.body_mut().take();
            let buffered_len = body.as_ref().and_then(Body::as_bytes).map(<[u8]>::len);
            let mut streamed_len = 0;
            if let Some(body) = body {
                let mut data = body.into_data_stream();
                while let Some(chunk) = data.next().await {
                    streamed_len += chunk.unwrap().len();
                }
            }
            self.seen.lock().unwrap().push(SeenRequest {
                buffered_len,
                streamed_len,
                had_marker,
                content_length,
            });
            Err(TransportError::timeout(
                request.method().as_str(),
                request.url().as_str(),
            ))
        }
    }

    fn request_with_body(len: usize) -> Request {
        let mut request = Request::new(
            Method::PUT,
            "https://upload.example.com/session".parse().unwrap(),
        );
        *request.body_mut() = Some(Body::from(vec![7u8; len]));
        request
    }

    #[tokio::test]
    async fn test_unmarked_request_passes_through_untouched() {
        let transport = ThrottlingTransport::new(RecordingTransport::default(), 0, 1_000);

        let _ = transport.execute(request_with_body(500)).await;

        let seen = transport.inner().seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].buffered_len, Some(500), "body should stay buffered");
        assert_eq!(transport.monitor().status().bytes, 0);
        assert_eq!(transport.payload_requests(), 0);
        assert!(!transport.monitor_handle().is_attached());
    }

    #[tokio::test]
    async fn test_large_unmarked_request_is_not_guessed_as_payload() {
        let transport = ThrottlingTransport::new(RecordingTransport::default(), 0, 0);

        let _ = transport.execute(request_with_body(5_000_000)).await;

        let seen = transport.inner().seen.lock().unwrap();
        assert_eq!(seen[0].buffered_len, Some(5_000_000));
        assert_eq!(transport.monitor().status().bytes, 0);
    }

    #[tokio::test]
    async fn test_marked_request_body_is_substituted_and_counted() {
        let transport = ThrottlingTransport::new(RecordingTransport::default(), 0, 4_096);
        let mut request = request_with_body(4_096);
        mark_payload(&mut request);

        let _ = transport.execute(request).await;

        let seen = transport.inner().seen.lock().unwrap();
        assert_eq!(seen[0].buffered_len, None, "body should be a stream");
        assert_eq!(seen[0].streamed_len, 4_096);
        assert!(!seen[0].had_marker, "marker must not reach the wire");
        assert_eq!(seen[0].content_length, Some(4_096));
        assert_eq!(transport.monitor().status().bytes, 4_096);
        assert_eq!(transport.payload_requests(), 1);
    }

    #[tokio::test]
    async fn test_monitor_published_on_first_payload_request() {
        let transport = ThrottlingTransport::new(RecordingTransport::default(), 0, 10);
        let handle = transport.monitor_handle();
        assert!(handle.get().is_none());

        let _ = transport.execute(request_with_body(10)).await;
        assert!(handle.get().is_none());

        let mut request = request_with_body(10);
        mark_payload(&mut request);
        let _ = transport.execute(request).await;

        let monitor = handle.get().unwrap();
        assert!(Arc::ptr_eq(&monitor, transport.monitor()));
    }

    #[tokio::test]
    async fn test_two_chunks_accumulate_in_one_monitor() {
        let transport = ThrottlingTransport::new(RecordingTransport::default(), 0, 1_000_000);

        for len in [600_000, 400_000] {
            let mut request = request_with_body(len);
            mark_payload(&mut request);
            let _ = transport.execute(request).await;
        }

        let status = transport.monitor().status();
        assert_eq!(status.bytes, 1_000_000);
        assert_eq!(status.progress(), Some(1.0));
        assert_eq!(transport.payload_requests(), 2);
    }

    #[tokio::test]
    async fn test_inner_error_is_returned_unchanged() {
        let transport = ThrottlingTransport::new(RecordingTransport::default(), 0, 0);
        let mut request = request_with_body(32);
        mark_payload(&mut request);

        let err = transport.execute(request).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout { .. }));
        assert_eq!(err.url(), "https://upload.example.com/session");
    }

    #[tokio::test]
    async fn test_marked_request_without_body_is_forwarded() {
        let transport = ThrottlingTransport::new(RecordingTransport::default(), 0, 0);
        let mut request = Request::new(
            Method::PUT,
            "https://upload.example.com/session".parse().unwrap(),
        );
        mark_payload(&mut request);

        let _ = transport.execute(request).await;

        let seen = transport.inner().seen.lock().unwrap();
        assert_eq!(seen[0].streamed_len, 0);
        assert!(!seen[0].had_marker);
        assert_eq!(transport.payload_requests(), 1);
    }
}
