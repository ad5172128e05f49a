//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;
use uploader_core::upload::{DEFAULT_DESCRIPTION, DEFAULT_TITLE};

/// Upload a video through a resumable session, optionally rate limited.
///
/// The source may be a local file or an http(s) URL, which is streamed
/// through without being stored locally.
#[derive(Parser, Debug)]
#[command(name = "uploader")]
#[command(author, version, about)]
pub struct Args {
    /// Video file to upload (local path or http(s) URL)
    #[arg(long)]
    pub filename: Option<String>,

    /// Video title
    #[arg(long, default_value = DEFAULT_TITLE)]
    pub title: String,

    /// Video description
    #[arg(long, default_value = DEFAULT_DESCRIPTION)]
    pub description: String,

    /// Video category ID
    #[arg(long = "category-id", default_value = "")]
    pub category_id: String,

    /// Comma separated list of video tags
    #[arg(long, default_value = "")]
    pub tags: String,

    /// Video privacy status (default: private)
    #[arg(long)]
    pub privacy: Option<String>,

    /// JSON file with title, description, tags etc.
    #[arg(long = "meta-json")]
    pub meta_json: Option<PathBuf>,

    /// Upload rate limit in kbps (0 disables)
    #[arg(long)]
    pub ratelimit: Option<u64>,

    /// Bytes per upload request, in MiB
    #[arg(long = "chunk-size", value_parser = clap::value_parser!(u64).range(1..=1024))]
    pub chunk_size: Option<u64>,

    /// Session-creating endpoint
    #[arg(long)]
    pub endpoint: Option<String>,

    /// OAuth access token
    #[arg(long, env = "UPLOADER_ACCESS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress progress output and non-error logs
    #[arg(short, long)]
    pub quiet: bool,
}
