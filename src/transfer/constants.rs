//! Constants for the transfer module (pacing, rate window, reporting).

use std::time::Duration;

/// Bytes per second in one kilobit per second.
pub const BYTES_PER_KBPS: u64 = 125;

/// Largest slice a rate limited stream hands to the HTTP body at once.
pub const MAX_SLICE_BYTES: usize = 32 * 1024;

/// Width of the sliding window used for the instantaneous rate.
pub const RATE_WINDOW: Duration = Duration::from_secs(3);

/// Number of time buckets the rate window is divided into.
///
/// Reads landing in the same bucket share one sample, so sample count stays
/// bounded however many slices per second the link sustains.
pub const RATE_BUCKETS: u32 = 64;

/// Default progress reporting interval.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// Shortest progress reporting interval; smaller requests are raised to it.
pub const MIN_REPORT_INTERVAL: Duration = Duration::from_millis(10);

/// Marker header the calling layer sets on the payload-carrying request.
///
/// Stripped by [`ThrottlingTransport`](super::ThrottlingTransport) before the
/// request leaves the process.
pub const PAYLOAD_MARKER_HEADER: &str = "x-transfer-payload";
