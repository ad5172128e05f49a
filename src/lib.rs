//! Uploader Core Library
//!
//! This library provides the core functionality for the uploader tool,
//! which sends large media files to a resumable HTTP upload endpoint with
//! an optional bandwidth ceiling and live progress.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`transfer`] - Rate limited, measured request bodies behind a
//!   [`Transport`] decorator, plus the periodic progress reporter
//! - [`upload`] - Media sources, video metadata and the resumable upload
//!   session client

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod transfer;
pub mod upload;

// Re-export commonly used types
pub use transfer::{
    MonitorHandle, ProgressReporter, RateLimitedStream, ReqwestTransport, ThrottlingTransport,
    TransferMonitor, TransferStatus, Transport, TransportError, kbps_to_bytes_per_sec,
};
pub use upload::{
    UploadClient, UploadConfig, UploadError, UploadSource, UploadedVideo, VideoMetadata,
    build_metadata,
};
