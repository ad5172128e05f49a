//! Merging command line arguments with file config into runtime settings.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use uploader_core::upload::{
    CONNECT_TIMEOUT_SECS, DEFAULT_CHUNK_SIZE, DEFAULT_ENDPOINT, MetadataFlags, READ_TIMEOUT_SECS,
};
use url::Url;

use crate::app_config::FileConfig;
use crate::cli::Args;

const BYTES_PER_MIB: u64 = 1024 * 1024;

/// Everything the upload run needs, with precedence already applied.
#[derive(Debug, Clone)]
pub(crate) struct RuntimeSettings {
    pub(crate) filename: String,
    pub(crate) metadata: MetadataFlags,
    pub(crate) meta_json: Option<PathBuf>,
    pub(crate) ratelimit_kbps: u64,
    pub(crate) chunk_size: usize,
    pub(crate) endpoint: Url,
    pub(crate) access_token: Option<String>,
    pub(crate) quiet: bool,
    pub(crate) log_level: &'static str,
    pub(crate) connect_timeout: Duration,
    pub(crate) read_timeout: Duration,
}

/// Applies command line > config file > built-in defaults.
pub(crate) fn resolve_settings(args: Args, file: Option<&FileConfig>) -> Result<RuntimeSettings> {
    let file = file.cloned().unwrap_or_default();

    let Some(filename) = args.filename.filter(|f| !f.trim().is_empty()) else {
        bail!("You must provide a filename of a video file to upload (--filename)");
    };

    let quiet = args.quiet || (args.verbose == 0 && file.quiet.unwrap_or(false));
    let log_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => file.verbosity.map_or("info", |v| v.log_level()),
            1 => "debug",
            _ => "trace",
        }
    };

    let endpoint_raw = args
        .endpoint
        .or(file.endpoint)
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
    let endpoint = Url::parse(&endpoint_raw)
        .with_context(|| format!("Invalid endpoint URL '{endpoint_raw}'"))?;

    let chunk_size = match args.chunk_size.or(file.chunk_size_mib) {
        Some(mib) => usize::try_from(mib.saturating_mul(BYTES_PER_MIB))
            .context("Chunk size does not fit in memory on this platform")?,
        None => DEFAULT_CHUNK_SIZE,
    };

    Ok(RuntimeSettings {
        filename,
        metadata: MetadataFlags {
            title: args.title,
            description: args.description,
            category_id: args.category_id,
            tags: args.tags,
            privacy: args.privacy.or(file.privacy).unwrap_or_default(),
        },
        meta_json: args.meta_json,
        ratelimit_kbps: args.ratelimit.or(file.ratelimit).unwrap_or(0),
        chunk_size,
        endpoint,
        access_token: args.token.filter(|t| !t.is_empty()),
        quiet,
        log_level,
        connect_timeout: Duration::from_secs(
            file.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
        ),
        read_timeout: Duration::from_secs(file.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS)),
    })
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::app_config::VerbositySetting;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["uploader", "--filename", "clip.mp4"];
        argv.extend_from_slice(extra);
        let mut args = Args::try_parse_from(argv).expect("args should parse");
        // Keep the environment out of these tests.
        args.token = None;
        args
    }

    #[test]
    fn test_defaults_without_file() {
        let settings = resolve_settings(args(&[]), None).expect("settings");
        assert_eq!(settings.filename, "clip.mp4");
        assert_eq!(settings.ratelimit_kbps, 0);
        assert_eq!(settings.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(settings.endpoint.as_str(), DEFAULT_ENDPOINT);
        assert_eq!(settings.log_level, "info");
        assert!(!settings.quiet);
        assert_eq!(settings.connect_timeout, Duration::from_secs(CONNECT_TIMEOUT_SECS));
    }

    #[test]
    fn test_missing_filename_is_error() {
        let args = Args::try_parse_from(["uploader"]).expect("args should parse");
        let err = resolve_settings(args, None).expect_err("filename is required");
        assert!(err.to_string().contains("filename"));
    }

    #[test]
    fn test_file_values_fill_unset_flags() {
        let file = FileConfig {
            ratelimit: Some(500),
            chunk_size_mib: Some(4),
            privacy: Some("unlisted".to_string()),
            endpoint: Some("https://upload.example.com/v".to_string()),
            quiet: Some(true),
            verbosity: Some(VerbositySetting::Verbose),
            connect_timeout_secs: Some(5),
            read_timeout_secs: Some(60),
        };
        let settings = resolve_settings(args(&[]), Some(&file)).expect("settings");
        assert_eq!(settings.ratelimit_kbps, 500);
        assert_eq!(settings.chunk_size, 4 * 1024 * 1024);
        assert_eq!(settings.metadata.privacy, "unlisted");
        assert_eq!(settings.endpoint.as_str(), "https://upload.example.com/v");
        assert!(settings.quiet);
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.read_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_command_line_wins_over_file() {
        let file = FileConfig {
            ratelimit: Some(500),
            privacy: Some("unlisted".to_string()),
            verbosity: Some(VerbositySetting::Debug),
            ..FileConfig::default()
        };
        let settings = resolve_settings(
            args(&["--ratelimit", "0", "--privacy", "public", "-v"]),
            Some(&file),
        )
        .expect("settings");
        assert_eq!(settings.ratelimit_kbps, 0);
        assert_eq!(settings.metadata.privacy, "public");
        assert_eq!(settings.log_level, "debug");
    }

    #[test]
    fn test_quiet_flag_forces_error_level() {
        let settings = resolve_settings(args(&["-q", "-vv"]), None).expect("settings");
        assert!(settings.quiet);
        assert_eq!(settings.log_level, "error");
    }

    #[test]
    fn test_invalid_endpoint_is_error() {
        let err = resolve_settings(args(&["--endpoint", "::nope"]), None)
            .expect_err("invalid endpoint expected");
        assert!(err.to_string().contains("endpoint"));
    }
}
