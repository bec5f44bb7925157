//! URL validation and link extraction helpers

use crate::error::MediaError;
use crate::utils::mime::is_direct_media_ext;
use regex::Regex;
use std::sync::LazyLock;
use url::Url;

static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s<>"'()\[\]]+"#).expect("link pattern is valid")
});

static VIDEO_ID_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?:https?://)?(?:www\.|m\.)?youtube\.com/watch\?(?:[^\s]*&)?v=([A-Za-z0-9_-]{6,})",
        r"(?:https?://)?(?:www\.)?youtube\.com/(?:v|embed|shorts)/([A-Za-z0-9_-]{6,})",
        r"(?:https?://)?youtu\.be/([A-Za-z0-9_-]{6,})",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("video id pattern is valid"))
    .collect()
});

/// Parse and validate a user supplied media URL.
///
/// Only absolute `http`/`https` URLs with a host are accepted.
pub fn validate_media_url(raw: &str) -> Result<Url, MediaError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(MediaError::InvalidInput("URL is empty".to_string()));
    }

    let parsed = Url::parse(trimmed)
        .map_err(|e| MediaError::InvalidInput(format!("'{}' is not a valid URL: {}", trimmed, e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(MediaError::InvalidInput(format!(
                "Unsupported URL scheme: {}",
                other
            )))
        }
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(MediaError::InvalidInput("URL has no host".to_string()));
    }

    Ok(parsed)
}

/// Check if the URL path ends in a known direct media extension
pub fn has_direct_media_extension(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .and_then(|last| last.rsplit_once('.').map(|(_, ext)| ext.to_string()))
        .map_or(false, |ext| is_direct_media_ext(&ext))
}

/// Last path segment of a URL, percent-decoded, if it looks like a file name
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?.to_string();
    if last.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(&last)
        .map(|d| d.into_owned())
        .unwrap_or(last);
    Some(decoded)
}

/// Pull every http(s) link out of free text, de-duplicated in order of appearance.
///
/// Watch, embed, shorts and short-host video links are normalized to the
/// canonical `watch?v=` form so the same video is not fetched twice.
pub fn extract_links(text: &str) -> Vec<String> {
    let mut links: Vec<String> = Vec::new();

    for candidate in LINK_PATTERN.find_iter(text) {
        let raw = candidate.as_str().trim_end_matches(['.', ',', ';', '!']);
        let normalized = normalize_video_link(raw).unwrap_or_else(|| raw.to_string());
        if !links.contains(&normalized) {
            links.push(normalized);
        }
    }

    links
}

fn normalize_video_link(link: &str) -> Option<String> {
    VIDEO_ID_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(link)
            .and_then(|caps| caps.get(1))
            .map(|id| format!("https://www.youtube.com/watch?v={}", id.as_str()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_media_url() {
        assert!(validate_media_url("https://example.com/watch?v=1").is_ok());
        assert!(validate_media_url("  http://example.com/a.mp4  ").is_ok());

        for bad in ["", "not a url", "ftp://example.com/a.mp4", "file:///etc/passwd"] {
            let err = validate_media_url(bad).unwrap_err();
            assert!(matches!(err, MediaError::InvalidInput(_)), "{}", bad);
        }
    }

    #[test]
    fn test_has_direct_media_extension() {
        assert!(has_direct_media_extension("https://cdn.example.com/v/clip.MP4"));
        assert!(has_direct_media_extension(
            "https://cdn.example.com/song.mp3?token=abc"
        ));
        assert!(!has_direct_media_extension("https://example.com/watch?v=abc"));
        assert!(!has_direct_media_extension("https://example.com/page.html"));
        assert!(!has_direct_media_extension("not a url"));
    }

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("https://cdn.example.com/media/My%20Clip.mp4?x=1").as_deref(),
            Some("My Clip.mp4")
        );
        assert_eq!(filename_from_url("https://cdn.example.com/"), None);
    }

    #[test]
    fn test_extract_links_normalizes_and_dedupes() {
        let text = "first https://youtu.be/dQw4w9WgXcQ, then\n\
                    https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10 and \
                    https://cdn.example.com/a.mp4.\n\
                    https://www.youtube.com/shorts/brZCOVlyPPo";
        assert_eq!(
            extract_links(text),
            vec![
                "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
                "https://cdn.example.com/a.mp4".to_string(),
                "https://www.youtube.com/watch?v=brZCOVlyPPo".to_string(),
            ]
        );
    }

    #[test]
    fn test_extract_links_empty_text() {
        assert!(extract_links("no links here").is_empty());
    }
}
