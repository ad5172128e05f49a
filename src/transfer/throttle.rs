//! Rate limited, byte-counting body stream.
//!
//! [`RateLimitedStream`] wraps one request body and paces it so that the
//! cumulative number of bytes handed to the HTTP client never runs ahead of
//! `elapsed * ceiling`. Content is passed through untouched; the only effects
//! are timing and the byte counts recorded into the shared
//! [`TransferMonitor`].
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use futures_util::{StreamExt, stream};
//! use uploader_core::transfer::{RateLimitedStream, TransferMonitor};
//!
//! # async fn example() {
//! let monitor = Arc::new(TransferMonitor::new(5));
//! let body = stream::iter([Ok::<_, std::io::Error>(Bytes::from_static(b"hello"))]);
//!
//! // 0 bytes/sec: unthrottled, counting only
//! let mut limited = RateLimitedStream::new(body, 0, Arc::clone(&monitor));
//! while let Some(chunk) = limited.next().await {
//!     let _ = chunk.unwrap();
//! }
//! assert_eq!(monitor.status().bytes, 5);
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;
use tokio::time::{Instant, Sleep};
use tracing::trace;

use super::TransferMonitor;
use super::constants::{BYTES_PER_KBPS, MAX_SLICE_BYTES};

/// Converts a ceiling in kilobits per second into bytes per second.
///
/// ```
/// use uploader_core::transfer::kbps_to_bytes_per_sec;
///
/// assert_eq!(kbps_to_bytes_per_sec(1_000), 125_000);
/// assert_eq!(kbps_to_bytes_per_sec(0), 0);
/// ```
#[must_use]
pub fn kbps_to_bytes_per_sec(kbps: u64) -> u64 {
    kbps.saturating_mul(BYTES_PER_KBPS)
}

/// Body stream that paces its output to a ceiling and reports into a monitor.
///
/// A fresh stream is built for every physical request body, while the
/// monitor is shared across all of them.
pub struct RateLimitedStream<S> {
    inner: Pin<Box<S>>,
    bytes_per_sec: u64,
    monitor: Arc<TransferMonitor>,
    start: Instant,
    released: u64,
    pending: Option<Bytes>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl<S> std::fmt::Debug for RateLimitedStream<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedStream")
            .field("bytes_per_sec", &self.bytes_per_sec)
            .field("released", &self.released)
            .field("pending", &self.pending.as_ref().map(Bytes::len))
            .field("sleeping", &self.sleep.is_some())
            .finish_non_exhaustive()
    }
}

impl<S> RateLimitedStream<S> {
    /// Wraps `inner`, pacing it to `bytes_per_sec` (0 disables pacing).
    #[must_use]
    pub fn new(inner: S, bytes_per_sec: u64, monitor: Arc<TransferMonitor>) -> Self {
        Self {
            inner: Box::pin(inner),
            bytes_per_sec,
            monitor,
            start: Instant::now(),
            released: 0,
            pending: None,
            sleep: None,
        }
    }

    /// Returns the configured ceiling in bytes per second.
    #[must_use]
    pub fn bytes_per_sec(&self) -> u64 {
        self.bytes_per_sec
    }

    /// Returns whether pacing is disabled.
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.bytes_per_sec == 0
    }

    /// Returns the number of bytes handed out by this stream.
    #[must_use]
    pub fn bytes_released(&self) -> u64 {
        self.released
    }

    /// Earliest instant at which `cumulative` bytes may have been released.
    fn release_deadline(&self, cumulative: u64) -> Instant {
        let nanos = u128::from(cumulative) * 1_000_000_000 / u128::from(self.bytes_per_sec);
        let offset = Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX));
        self.start + offset
    }
}

impl<S, E> Stream for RateLimitedStream<S>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    type Item = Result<Bytes, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        let pending_len = loop {
            if let Some(pending) = &this.pending {
                break pending.len().min(MAX_SLICE_BYTES);
            }
            match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) if chunk.is_empty() => {}
                Some(Ok(chunk)) => this.pending = Some(chunk),
                Some(Err(e)) => return Poll::Ready(Some(Err(e))),
                None => return Poll::Ready(None),
            }
        };

        if this.bytes_per_sec > 0 {
            let released = this.released;
            let deadline = this.release_deadline(released + pending_len as u64);
            if Instant::now() < deadline {
                let sleep = this.sleep.get_or_insert_with(|| {
                    trace!(
                        released,
                        wait_ms = deadline.saturating_duration_since(Instant::now()).as_millis(),
                        "pacing upload body"
                    );
                    Box::pin(tokio::time::sleep_until(deadline))
                });
                ready!(sleep.as_mut().poll(cx));
            }
            this.sleep = None;
        }

        let slice = match this.pending.take() {
            Some(mut pending) if pending.len() > pending_len => {
                let head = pending.split_to(pending_len);
                this.pending = Some(pending);
                head
            }
            Some(pending) => pending,
            None => return Poll::Ready(None),
        };

        this.released += slice.len() as u64;
        this.monitor.record_bytes(slice.len() as u64);
        Poll::Ready(Some(Ok(slice)))
    }
}
