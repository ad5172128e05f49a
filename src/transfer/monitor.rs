//! Shared accounting for one logical transfer.
//!
//! A [`TransferMonitor`] outlives every physical request body of an upload.
//! Each [`RateLimitedStream`](super::RateLimitedStream) reports into the same
//! monitor, so byte counts and rate history read as one continuous transfer
//! even when the upload is split into chunks.
//!
//! # Example
//!
//! ```
//! use uploader_core::transfer::TransferMonitor;
//!
//! let monitor = TransferMonitor::new(1_000);
//! monitor.record_bytes(250);
//!
//! let status = monitor.status();
//! assert_eq!(status.bytes, 250);
//! assert_eq!(status.progress(), Some(0.25));
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::constants::{RATE_BUCKETS, RATE_WINDOW};

/// Accounting object shared between the upload path and the reporter.
///
/// All state sits behind one mutex so [`status`](Self::status) never observes
/// a byte count without its matching rate sample.
#[derive(Debug)]
pub struct TransferMonitor {
    start: Instant,
    window: Duration,
    state: Mutex<MonitorState>,
}

#[derive(Debug)]
struct MonitorState {
    total_bytes: u64,
    bytes_so_far: u64,
    samples: VecDeque<Sample>,
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    at: Instant,
    bytes: u64,
}

/// Point-in-time snapshot returned by [`TransferMonitor::status`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferStatus {
    /// Bytes observed so far across all request bodies.
    pub bytes: u64,
    /// Expected total size; 0 when unknown.
    pub total_bytes: u64,
    /// Bytes per second over the recent window.
    pub current_rate: f64,
    /// Time since the monitor was created.
    pub elapsed: Duration,
}

impl TransferMonitor {
    /// Creates a monitor for a transfer of `total_bytes` (0 when unknown).
    #[must_use]
    pub fn new(total_bytes: u64) -> Self {
        Self::with_window(total_bytes, RATE_WINDOW)
    }

    /// Creates a monitor with a custom rate window.
    #[must_use]
    pub fn with_window(total_bytes: u64, window: Duration) -> Self {
        debug!(total_bytes, window_ms = window.as_millis(), "creating transfer monitor");
        Self {
            start: Instant::now(),
            window,
            state: Mutex::new(MonitorState {
                total_bytes,
                bytes_so_far: 0,
                samples: VecDeque::new(),
            }),
        }
    }

    /// Updates the expected total size without resetting progress.
    pub fn set_total_size(&self, total_bytes: u64) {
        let mut state = self.lock();
        if state.total_bytes != total_bytes {
            debug!(
                previous = state.total_bytes,
                total_bytes, "updating transfer size estimate"
            );
        }
        state.total_bytes = total_bytes;
    }

    /// Adds `bytes` to the running count and the recent-activity window.
    pub fn record_bytes(&self, bytes: u64) {
        let now = Instant::now();
        let mut state = self.lock();
        state.bytes_so_far = state.bytes_so_far.saturating_add(bytes);
        let bucket = self.window / RATE_BUCKETS;
        match state.samples.back_mut() {
            Some(last) if now.saturating_duration_since(last.at) < bucket => {
                last.bytes = last.bytes.saturating_add(bytes);
            }
            _ => state.samples.push_back(Sample { at: now, bytes }),
        }
        evict_stale(&mut state.samples, now, self.window);
    }

    /// Returns a consistent snapshot of the transfer.
    #[must_use]
    pub fn status(&self) -> TransferStatus {
        let now = Instant::now();
        let mut state = self.lock();
        evict_stale(&mut state.samples, now, self.window);

        let elapsed = now.saturating_duration_since(self.start);
        let span = elapsed.min(self.window);
        let windowed: u64 = state.samples.iter().map(|s| s.bytes).sum();
        #[allow(clippy::cast_precision_loss)]
        let current_rate = if span.is_zero() {
            0.0
        } else {
            windowed as f64 / span.as_secs_f64()
        };

        TransferStatus {
            bytes: state.bytes_so_far,
            total_bytes: state.total_bytes,
            current_rate,
            elapsed,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn evict_stale(samples: &mut VecDeque<Sample>, now: Instant, window: Duration) {
    while samples
        .front()
        .is_some_and(|s| now.saturating_duration_since(s.at) > window)
    {
        samples.pop_front();
    }
}

/// Slot through which a reporter discovers the monitor once uploading starts.
///
/// Cloning shares the slot. The monitor can be attached once; later attaches
/// are ignored.
#[derive(Debug, Clone, Default)]
pub struct MonitorHandle {
    slot: Arc<OnceLock<Arc<TransferMonitor>>>,
}

impl MonitorHandle {
    /// Creates an empty handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes `monitor`; returns `false` if one was already attached.
    pub fn attach(&self, monitor: Arc<TransferMonitor>) -> bool {
        let attached = self.slot.set(monitor).is_ok();
        if attached {
            debug!("transfer monitor attached");
        }
        attached
    }

    /// Returns the attached monitor, if any.
    #[must_use]
    pub fn get(&self) -> Option<Arc<TransferMonitor>> {
        self.slot.get().cloned()
    }

    /// Returns whether a monitor has been attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.slot.get().is_some()
    }
}

impl TransferStatus {
    /// Fraction complete in `[0, 1]`, or `None` when the total is unknown.
    ///
    /// Clamps to 1.0 when more bytes arrived than were declared.
    #[must_use]
    pub fn progress(&self) -> Option<f64> {
        if self.total_bytes == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let fraction = self.bytes as f64 / self.total_bytes as f64;
        Some(fraction.min(1.0))
    }

    /// Estimated time remaining at the current rate.
    ///
    /// `None` when the total is unknown or nothing is moving.
    #[must_use]
    pub fn time_remaining(&self) -> Option<Duration> {
        if self.total_bytes == 0 {
            return None;
        }
        if self.bytes >= self.total_bytes {
            return Some(Duration::ZERO);
        }
        if !self.current_rate.is_finite() || self.current_rate <= 0.0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let remaining = (self.total_bytes - self.bytes) as f64;
        Duration::try_from_secs_f64(remaining / self.current_rate).ok()
    }

    /// Percentage string such as `42.0%`, or `?` when unknown.
    #[must_use]
    pub fn percent_string(&self) -> String {
        self.progress()
            .map_or_else(|| "?".to_string(), |p| format!("{:.1}%", p * 100.0))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_monitor_starts_empty() {
        let monitor = TransferMonitor::new(1_000);
        let status = monitor.status();
        assert_eq!(status.bytes, 0);
        assert_eq!(status.total_bytes, 1_000);
        assert_eq!(status.progress(), Some(0.0));
    }

    #[test]
    fn test_record_bytes_is_additive() {
        let monitor = TransferMonitor::new(0);
        for n in [10, 0, 4096, 7, 1] {
            monitor.record_bytes(n);
            let _ = monitor.status();
        }
        assert_eq!(monitor.status().bytes, 4114);
    }

    #[test]
    fn test_record_bytes_concurrent_with_status_sums_exactly() {
        let monitor = Arc::new(TransferMonitor::new(0));
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let m = Arc::clone(&monitor);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        m.record_bytes(3);
                    }
                })
            })
            .collect();
        let reader = {
            let m = Arc::clone(&monitor);
            std::thread::spawn(move || {
                let mut last = 0;
                for _ in 0..1_000 {
                    let bytes = m.status().bytes;
                    assert!(bytes >= last, "byte count went backwards");
                    last = bytes;
                }
            })
        };
        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();
        assert_eq!(monitor.status().bytes, 12_000);
    }

    #[test]
    fn test_set_total_size_keeps_progress() {
        let monitor = TransferMonitor::new(0);
        monitor.record_bytes(500);
        assert_eq!(monitor.status().progress(), None);

        monitor.set_total_size(2_000);
        let status = monitor.status();
        assert_eq!(status.bytes, 500);
        assert_eq!(status.progress(), Some(0.25));
    }

    #[test]
    fn test_progress_clamps_when_declared_length_too_small() {
        let monitor = TransferMonitor::new(100);
        monitor.record_bytes(150);
        let status = monitor.status();
        assert_eq!(status.bytes, 150);
        assert_eq!(status.progress(), Some(1.0));
        assert_eq!(status.time_remaining(), Some(Duration::ZERO));
        assert_eq!(status.percent_string(), "100.0%");
    }

    #[test]
    fn test_unknown_total_has_no_progress_or_eta() {
        let monitor = TransferMonitor::new(0);
        monitor.record_bytes(42);
        let status = monitor.status();
        assert_eq!(status.progress(), None);
        assert_eq!(status.time_remaining(), None);
        assert_eq!(status.percent_string(), "?");
    }

    #[test]
    fn test_time_remaining_none_when_idle() {
        let status = TransferStatus {
            bytes: 10,
            total_bytes: 100,
            current_rate: 0.0,
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(status.time_remaining(), None);
    }

    #[test]
    fn test_time_remaining_from_rate() {
        let status = TransferStatus {
            bytes: 250,
            total_bytes: 1_250,
            current_rate: 100.0,
            elapsed: Duration::from_secs(1),
        };
        assert_eq!(status.time_remaining(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_monitor_handle_attaches_once() {
        let handle = MonitorHandle::new();
        let observer = handle.clone();
        assert!(observer.get().is_none());

        let first = Arc::new(TransferMonitor::new(10));
        assert!(handle.attach(Arc::clone(&first)));
        assert!(!handle.attach(Arc::new(TransferMonitor::new(99))));

        let seen = observer.get().unwrap();
        assert!(Arc::ptr_eq(&seen, &first));
        assert!(observer.is_attached());
    }

    #[tokio::test]
    async fn test_current_rate_tracks_recent_window() {
        tokio::time::pause();

        let monitor = TransferMonitor::with_window(0, Duration::from_secs(2));
        for _ in 0..4 {
            tokio::time::advance(Duration::from_millis(500)).await;
            monitor.record_bytes(1_000);
        }
        // 4000 bytes over the 2s window
        let rate = monitor.status().current_rate;
        assert!((rate - 2_000.0).abs() < 1.0, "rate was {rate}");

        // Stall: old samples age out and the rate falls to zero
        tokio::time::advance(Duration::from_secs(3)).await;
        let status = monitor.status();
        assert_eq!(status.current_rate, 0.0);
        assert_eq!(status.bytes, 4_000);
    }

    #[tokio::test]
    async fn test_current_rate_follows_throttle_change() {
        tokio::time::pause();

        let monitor = TransferMonitor::with_window(0, Duration::from_secs(1));
        for _ in 0..10 {
            tokio::time::advance(Duration::from_millis(100)).await;
            monitor.record_bytes(10_000);
        }
        let fast = monitor.status().current_rate;

        for _ in 0..20 {
            tokio::time::advance(Duration::from_millis(100)).await;
            monitor.record_bytes(1_000);
        }
        let slow = monitor.status().current_rate;

        assert!(slow < fast / 5.0, "fast={fast} slow={slow}");
    }

    #[tokio::test]
    async fn test_current_rate_accurate_at_high_read_frequency() {
        tokio::time::pause();

        // 32 KiB every millisecond for a full window: 32,768,000 B/s.
        let monitor = TransferMonitor::new(0);
        for _ in 0..3_000 {
            tokio::time::advance(Duration::from_millis(1)).await;
            monitor.record_bytes(32 * 1024);
        }

        let rate = monitor.status().current_rate;
        let expected = 32_768_000.0;
        assert!(
            (rate - expected).abs() < expected * 0.05,
            "rate was {rate}, expected about {expected}"
        );
        assert!(monitor.lock().samples.len() <= RATE_BUCKETS as usize + 1);
    }
}
