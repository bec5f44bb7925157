//! Requests, formats and metadata of a media source

use crate::error::MediaError;
use crate::utils::{ext_from_mime, filename_from_url, validate_media_url};
use serde::{Deserialize, Serialize};

/// One user request: a source URL and an optional quality label or format id.
///
/// Fields are private so a request cannot change once validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRequest {
    url: String,
    format_hint: Option<String>,
}

impl MediaRequest {
    /// Validate the URL and build a request
    pub fn parse(url: &str, format_hint: Option<&str>) -> Result<Self, MediaError> {
        let parsed = validate_media_url(url)?;
        let format_hint = format_hint
            .map(str::trim)
            .filter(|hint| !hint.is_empty())
            .map(str::to_string);

        Ok(Self {
            url: parsed.to_string(),
            format_hint,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn format_hint(&self) -> Option<&str> {
        self.format_hint.as_deref()
    }
}

/// A downloadable stream as reported by the extractor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    /// Extractor format id
    #[serde(default)]
    pub format_id: String,
    /// Container extension
    #[serde(default)]
    pub ext: String,
    #[serde(default)]
    pub format_note: Option<String>,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub width: Option<u32>,
    /// Audio codec, `"none"` for video-only streams
    #[serde(default)]
    pub acodec: Option<String>,
    /// Video codec, `"none"` for audio-only streams
    #[serde(default)]
    pub vcodec: Option<String>,
    /// Average bitrate in kbit/s
    #[serde(default, skip_serializing)]
    pub tbr: Option<f64>,
}

impl FormatDescriptor {
    /// `WxH` when both dimensions are known
    pub fn resolution(&self) -> Option<String> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(format!("{}x{}", w, h)),
            _ => None,
        }
    }

    /// Check if the stream carries video
    pub fn has_video(&self) -> bool {
        match self.vcodec.as_deref() {
            Some("none") => false,
            Some(_) => true,
            None => self.height.is_some(),
        }
    }

    /// Check if the stream carries audio
    pub fn has_audio(&self) -> bool {
        matches!(self.acodec.as_deref(), Some(codec) if codec != "none")
    }

    /// Check if the stream is audio without video
    pub fn is_audio_only(&self) -> bool {
        self.has_audio() && !self.has_video()
    }
}

/// Thumbnail reference
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Metadata of a media source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub uploader: Option<String>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub thumbnails: Vec<Thumbnail>,
    #[serde(default)]
    pub formats: Vec<FormatDescriptor>,
    #[serde(default, skip_serializing)]
    pub webpage_url: Option<String>,
}

impl MediaInfo {
    /// Synthesize metadata for a URL that serves a media file directly
    pub fn from_direct(url: &str, content_type: Option<&str>, content_length: Option<u64>) -> Self {
        let file_name = filename_from_url(url).unwrap_or_else(|| "media".to_string());
        let (stem, url_ext) = match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), Some(ext.to_lowercase())),
            _ => (file_name.clone(), None),
        };
        let ext = url_ext
            .or_else(|| {
                content_type
                    .map(ext_from_mime)
                    .filter(|ext| *ext != "bin")
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "bin".to_string());

        Self {
            id: file_name,
            title: stem,
            formats: vec![FormatDescriptor {
                format_id: "direct".to_string(),
                ext,
                format_note: content_type.map(str::to_string),
                filesize: content_length,
                ..FormatDescriptor::default()
            }],
            webpage_url: Some(url.to_string()),
            ..Self::default()
        }
    }

    /// Look up a format by its id
    pub fn format(&self, format_id: &str) -> Option<&FormatDescriptor> {
        self.formats.iter().find(|f| f.format_id == format_id)
    }
}
