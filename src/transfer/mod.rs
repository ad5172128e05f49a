//! Rate limited, progress-observable upload transport.
//!
//! This module shapes and measures the request bodies an upload client
//! produces, without changing anything else about the HTTP exchange.
//!
//! # Features
//!
//! - Leaky-bucket pacing of payload bodies to a ceiling in bytes/second
//! - One shared [`TransferMonitor`] per logical transfer, across chunks
//! - Explicit payload marking instead of size guessing
//! - Cancellable periodic [`ProgressReporter`]
//!
//! # Example
//!
//! ```no_run
//! use uploader_core::transfer::{
//!     ProgressReporter, ReqwestTransport, ThrottlingTransport, WriterSink, kbps_to_bytes_per_sec,
//! };
//!
//! # async fn example() {
//! let transport = ThrottlingTransport::new(
//!     ReqwestTransport::default(),
//!     kbps_to_bytes_per_sec(1_000),
//!     10 * 1024 * 1024,
//! );
//! let mut reporter =
//!     ProgressReporter::new(transport.monitor_handle(), WriterSink::new(std::io::stdout()));
//! reporter.start();
//! // ... send requests through `transport` ...
//! reporter.finish().await;
//! # }
//! ```

mod constants;
mod error;
mod interceptor;
mod monitor;
mod reporter;
mod throttle;

pub use constants::{
    DEFAULT_REPORT_INTERVAL, MAX_SLICE_BYTES, MIN_REPORT_INTERVAL, PAYLOAD_MARKER_HEADER, RATE_WINDOW,
};
pub use error::TransportError;
pub use interceptor::{ReqwestTransport, ThrottlingTransport, Transport, is_payload, mark_payload};
pub use monitor::{MonitorHandle, TransferMonitor, TransferStatus};
pub use reporter::{
    ProgressReporter, ReporterState, StatusSink, TerminalSink, WriterSink, format_status_line,
};
pub use throttle::{RateLimitedStream, kbps_to_bytes_per_sec};
