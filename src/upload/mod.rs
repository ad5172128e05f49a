//! Resumable video upload over a throttled [`Transport`](crate::transfer::Transport).
//!
//! - [`UploadSource`] opens the media from disk or a URL
//! - [`build_metadata`] merges a metadata file with command line values
//! - [`UploadClient`] runs the session protocol, one marked request per chunk

mod client;
mod constants;
mod error;
mod metadata;
mod source;

pub use client::{UploadClient, UploadConfig, UploadedVideo, normalize_chunk_size};
pub use constants::{
    CHUNK_GRANULARITY, CONNECT_TIMEOUT_SECS, DEFAULT_CHUNK_SIZE, DEFAULT_CONTENT_TYPE,
    DEFAULT_ENDPOINT, READ_TIMEOUT_SECS,
};
pub use error::{MetadataError, SourceError, UploadError};
pub use metadata::{
    AccessPolicy, DEFAULT_DESCRIPTION, DEFAULT_PRIVACY, DEFAULT_TITLE, MetaFile, MetadataFlags,
    MonetizationDetails, MonetizationFile, Snippet, VideoMetadata, VideoStatus, build_metadata,
};
pub use source::{UploadSource, is_remote_location};
