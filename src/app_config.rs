//! Application configuration loading for CLI defaults.
//!
//! The file is a flat list of `key = value` lines. Strings are double
//! quoted; `#` starts a comment outside strings.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

/// File configuration for uploader defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileConfig {
    /// Default upload rate limit in kbps (0 disables).
    pub ratelimit: Option<u64>,
    /// Default bytes per upload request, in MiB.
    pub chunk_size_mib: Option<u64>,
    /// Default privacy status.
    pub privacy: Option<String>,
    /// Session-creating endpoint.
    pub endpoint: Option<String>,
    /// Suppress progress output by default.
    pub quiet: Option<bool>,
    /// Default verbosity mode.
    pub verbosity: Option<VerbositySetting>,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: Option<u64>,
    /// HTTP per-read timeout in seconds.
    pub read_timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Validates config values against runtime and CLI constraints.
    pub fn validate(&self) -> Result<()> {
        if let Some(chunk) = self.chunk_size_mib
            && !(1..=1024).contains(&chunk)
        {
            bail!("Invalid config value for `chunk_size_mib`: {chunk}. Expected range: 1..=1024");
        }
        if let Some(endpoint) = self.endpoint.as_deref()
            && url::Url::parse(endpoint).is_err()
        {
            bail!("Invalid config value for `endpoint`: '{endpoint}' is not a URL");
        }
        validate_timeout_secs("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout_secs("read_timeout_secs", self.read_timeout_secs)?;
        Ok(())
    }
}

fn validate_timeout_secs(field: &str, value: Option<u64>) -> Result<()> {
    let Some(value) = value else {
        return Ok(());
    };
    if !(1..=3600).contains(&value) {
        bail!("Invalid config value for `{field}`: {value}. Expected range: 1..=3600");
    }
    Ok(())
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

impl VerbositySetting {
    /// Log filter used when neither `RUST_LOG` nor a CLI flag decides.
    #[must_use]
    pub fn log_level(self) -> &'static str {
        match self {
            Self::Default => "info",
            Self::Verbose => "debug",
            Self::Quiet => "error",
            Self::Debug => "trace",
        }
    }
}

/// Loaded config metadata.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Resolved config path if a base directory is known.
    pub path: Option<PathBuf>,
    /// Parsed file config when a config file exists and was valid.
    pub config: Option<FileConfig>,
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/uploader/config.toml`
/// 2. `$HOME/.config/uploader/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join("uploader")
                .join("config.toml"),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("uploader")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path if present.
pub fn load_default_file_config() -> Result<LoadedConfig> {
    let path = resolve_default_config_path();
    let config = match path.as_deref() {
        Some(path_ref) if path_ref.exists() => Some(load_file_config(path_ref)?),
        _ => None,
    };
    Ok(LoadedConfig { path, config })
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }
        let line_no = line_index + 1;

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };

        let key = raw_key.trim();
        let value = raw_value.trim();
        let invalid = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "ratelimit" => cfg.ratelimit = Some(parse_integer_u64(value).with_context(invalid)?),
            "chunk_size_mib" => {
                cfg.chunk_size_mib = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "privacy" => cfg.privacy = Some(parse_string_literal(value).with_context(invalid)?),
            "endpoint" => cfg.endpoint = Some(parse_string_literal(value).with_context(invalid)?),
            "quiet" => cfg.quiet = Some(parse_boolean(value).with_context(invalid)?),
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(invalid)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(|| {
                    format!("Invalid `verbosity` value '{parsed}' on line {line_no}")
                })?);
            }
            "connect_timeout_secs" => {
                cfg.connect_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            "read_timeout_secs" => {
                cfg.read_timeout_secs = Some(parse_integer_u64(value).with_context(invalid)?);
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    cfg.validate()?;
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer_u64(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}

fn parse_boolean(raw_value: &str) -> Result<bool> {
    match raw_value.trim() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => bail!("Expected 'true' or 'false'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config_partial_fields() {
        let cfg = parse_config_str(
            r#"
ratelimit = 800
verbosity = "verbose"
"#,
        )
        .expect("partial config should parse");
        assert_eq!(cfg.ratelimit, Some(800));
        assert_eq!(cfg.verbosity, Some(VerbositySetting::Verbose));
        assert!(cfg.endpoint.is_none());
    }

    #[test]
    fn test_parse_config_all_fields() {
        let cfg = parse_config_str(
            r#"
ratelimit = 0
chunk_size_mib = 8
privacy = "unlisted"
endpoint = "https://upload.example.com/videos"
quiet = true
verbosity = "debug"
connect_timeout_secs = 10
read_timeout_secs = 90
"#,
        )
        .expect("full config should parse");
        assert_eq!(
            cfg,
            FileConfig {
                ratelimit: Some(0),
                chunk_size_mib: Some(8),
                privacy: Some("unlisted".to_string()),
                endpoint: Some("https://upload.example.com/videos".to_string()),
                quiet: Some(true),
                verbosity: Some(VerbositySetting::Debug),
                connect_timeout_secs: Some(10),
                read_timeout_secs: Some(90),
            }
        );
    }

    #[test]
    fn test_parse_config_rejects_invalid_chunk_size() {
        let err = parse_config_str("chunk_size_mib = 0").expect_err("invalid chunk size expected");
        assert!(err.to_string().contains("chunk_size_mib"));
    }

    #[test]
    fn test_parse_config_rejects_invalid_endpoint() {
        let err =
            parse_config_str(r#"endpoint = "not a url""#).expect_err("invalid endpoint expected");
        assert!(err.to_string().contains("endpoint"));
    }

    #[test]
    fn test_parse_config_rejects_numeric_values_with_trailing_tokens() {
        let err =
            parse_config_str("ratelimit = 4 trailing").expect_err("expected trailing token error");
        assert!(err.to_string().contains("ratelimit"));
    }

    #[test]
    fn test_parse_config_rejects_negative_ratelimit() {
        let err = parse_config_str("ratelimit = -1").expect_err("negative value expected error");
        assert!(err.to_string().contains("ratelimit"));
    }

    #[test]
    fn test_parse_config_supports_inline_comments() {
        let cfg = parse_config_str(
            r#"
ratelimit = 400 # evenings only
privacy = "public # not a comment"
"#,
        )
        .expect("config with comments should parse");
        assert_eq!(cfg.ratelimit, Some(400));
        assert_eq!(cfg.privacy.as_deref(), Some("public # not a comment"));
    }

    #[test]
    fn test_parse_config_rejects_invalid_boolean() {
        let err = parse_config_str("quiet = yes").expect_err("invalid boolean expected");
        assert!(err.to_string().contains("quiet"));
    }

    #[test]
    fn test_parse_config_rejects_invalid_timeout_value() {
        let err =
            parse_config_str("read_timeout_secs = 0").expect_err("invalid timeout expected");
        assert!(err.to_string().contains("read_timeout_secs"));
    }

    #[test]
    fn test_parse_config_rejects_unknown_keys() {
        let err = parse_config_str("unknown_key = 123").expect_err("unknown key error expected");
        assert!(err.to_string().contains("Unknown configuration key"));
        assert!(err.to_string().contains("unknown_key"));
    }

    #[test]
    fn test_parse_config_rejects_missing_equals() {
        let err = parse_config_str("ratelimit 5").expect_err("syntax error expected");
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_verbosity_log_level() {
        assert_eq!(VerbositySetting::Default.log_level(), "info");
        assert_eq!(VerbositySetting::Verbose.log_level(), "debug");
        assert_eq!(VerbositySetting::Quiet.log_level(), "error");
        assert_eq!(VerbositySetting::Debug.log_level(), "trace");
    }

    #[test]
    fn test_load_file_config_reads_from_disk() {
        let dir = tempfile::TempDir::new().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "ratelimit = 250\n").expect("write config");
        let cfg = load_file_config(&path).expect("config should load");
        assert_eq!(cfg.ratelimit, Some(250));
    }
}
