//! Video metadata sent when the upload session is created.
//!
//! Values come from an optional JSON metadata file and from command line
//! flags. File values win; anything the file leaves empty falls back to the
//! corresponding flag.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::MetadataError;

/// Privacy status used when neither the file nor the flags set one.
pub const DEFAULT_PRIVACY: &str = "private";

/// Title used when neither the file nor the flags set one.
pub const DEFAULT_TITLE: &str = "Video Title";

/// Description used when neither the file nor the flags set one.
pub const DEFAULT_DESCRIPTION: &str = "uploaded by youtubeuploader";

/// Resource body for the session-creating request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoMetadata {
    /// Title, description, tags and category.
    pub snippet: Snippet,
    /// Privacy settings.
    pub status: VideoStatus,
    /// Present only when monetization is allowed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub monetization_details: Option<MonetizationDetails>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snippet {
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub category_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatus {
    pub privacy_status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonetizationDetails {
    pub access: AccessPolicy,
}

/// Whether monetization is allowed, with region exceptions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessPolicy {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub exception: Vec<String>,
}

/// Shape of the `--meta-json` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetaFile {
    pub title: String,
    pub description: String,
    pub category_id: String,
    pub privacy_status: String,
    pub tags: Vec<String>,
    pub monetization: MonetizationFile,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MonetizationFile {
    pub allowed: bool,
    pub excluded_regions: Vec<String>,
}

impl MetaFile {
    /// Reads and parses a metadata file.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError`] if the file is unreadable or not valid JSON.
    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let raw = std::fs::read_to_string(path).map_err(|source| MetadataError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let meta = serde_json::from_str(&raw).map_err(|source| MetadataError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "loaded metadata file");
        Ok(meta)
    }
}

/// Metadata values given on the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFlags {
    pub title: String,
    pub description: String,
    pub category_id: String,
    /// Comma separated.
    pub tags: String,
    pub privacy: String,
}

/// Merges the metadata file (if any) over the flags.
///
/// ```
/// use uploader_core::upload::{MetadataFlags, build_metadata};
///
/// let flags = MetadataFlags {
///     title: "Holiday".into(),
///     tags: "sea,sun".into(),
///     ..MetadataFlags::default()
/// };
/// let video = build_metadata(None, &flags);
/// assert_eq!(video.snippet.title, "Holiday");
/// assert_eq!(video.snippet.tags, vec!["sea", "sun"]);
/// assert_eq!(video.status.privacy_status, "private");
/// ```
#[must_use]
pub fn build_metadata(meta: Option<&MetaFile>, flags: &MetadataFlags) -> VideoMetadata {
    let mut video = VideoMetadata::default();

    if let Some(meta) = meta {
        video.snippet = Snippet {
            title: meta.title.clone(),
            description: meta.description.clone(),
            tags: meta.tags.clone(),
            category_id: meta.category_id.clone(),
        };
        video.status.privacy_status.clone_from(&meta.privacy_status);
        if meta.monetization.allowed {
            video.monetization_details = Some(MonetizationDetails {
                access: AccessPolicy {
                    allowed: true,
                    exception: meta.monetization.excluded_regions.clone(),
                },
            });
        }
    }

    if video.status.privacy_status.is_empty() {
        video.status.privacy_status = if flags.privacy.trim().is_empty() {
            DEFAULT_PRIVACY.to_string()
        } else {
            flags.privacy.trim().to_string()
        };
    }
    if video.snippet.tags.is_empty() {
        video.snippet.tags = split_tags(&flags.tags);
    }
    if video.snippet.title.is_empty() {
        video.snippet.title = non_empty_or(&flags.title, DEFAULT_TITLE);
    }
    if video.snippet.description.is_empty() {
        video.snippet.description = non_empty_or(&flags.description, DEFAULT_DESCRIPTION);
    }
    if video.snippet.category_id.is_empty() {
        video.snippet.category_id.clone_from(&flags.category_id);
    }

    video
}

fn non_empty_or(value: &str, default: &str) -> String {
    if value.trim().is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}
