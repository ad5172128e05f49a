//! Constants for the upload module (chunking, session protocol, timeouts).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default per-read timeout (5 minutes) for slow servers.
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Chunk sizes must be a multiple of this for resumable sessions.
pub const CHUNK_GRANULARITY: usize = 256 * 1024;

/// Default bytes per physical upload request (16 MiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * CHUNK_GRANULARITY;

/// Default API endpoint for creating resumable upload sessions.
pub const DEFAULT_ENDPOINT: &str = "https://www.googleapis.com/upload/youtube/v3/videos";

/// Content type announced for the media when nothing better is known.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// HTTP status a resumable session returns for an accepted, incomplete chunk.
pub const RESUME_INCOMPLETE: u16 = 308;

/// Header announcing the total media size when creating a session.
pub const UPLOAD_CONTENT_LENGTH: &str = "x-upload-content-length";

/// Header announcing the media type when creating a session.
pub const UPLOAD_CONTENT_TYPE: &str = "x-upload-content-type";
