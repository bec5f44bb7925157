//! MIME type utilities for determining file extensions and container types

/// Extensions that identify a file the server can hand out as-is
pub const DIRECT_MEDIA_EXTENSIONS: &[&str] = &[
    "mp4", "m4v", "webm", "mkv", "mov", "avi", "flv", "3gp", "ts", "mpeg", "mpg", "ogv", "m4a",
    "mp3", "aac", "ogg", "oga", "opus", "wav", "flac", "jpg", "jpeg", "png", "gif", "webp",
];

/// Get file extension from MIME type
pub fn ext_from_mime(mime_type: &str) -> &'static str {
    match essence(mime_type).as_str() {
        // Video formats
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/3gpp" => "3gp",
        "video/x-flv" => "flv",
        "video/quicktime" => "mov",
        "video/x-msvideo" => "avi",
        "video/mp2t" => "ts",
        "video/mpeg" => "mpeg",
        "video/ogg" => "ogv",
        "video/x-matroska" => "mkv",

        // Audio formats
        "audio/mp4" | "audio/x-m4a" => "m4a",
        "audio/webm" => "webm",
        "audio/mpeg" => "mp3",
        "audio/ogg" => "ogg",
        "audio/wav" | "audio/x-wav" => "wav",
        "audio/flac" => "flac",
        "audio/aac" | "audio/x-aac" => "aac",
        "audio/opus" => "opus",

        // Images
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",

        "application/zip" => "zip",
        "text/plain" => "txt",

        _ => "bin",
    }
}

/// Get MIME type from file extension
pub fn mime_from_ext(extension: &str) -> &'static str {
    let ext = extension.trim_start_matches('.').to_lowercase();
    match ext.as_str() {
        // Video formats
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "3gp" => "video/3gpp",
        "flv" => "video/x-flv",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "ts" => "video/mp2t",
        "mpeg" | "mpg" => "video/mpeg",
        "ogv" => "video/ogg",
        "mkv" => "video/x-matroska",

        // Audio formats
        "m4a" => "audio/mp4",
        "mp3" => "audio/mpeg",
        "ogg" | "oga" => "audio/ogg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "aac" => "audio/aac",
        "opus" => "audio/opus",

        // Images
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",

        "zip" => "application/zip",
        "txt" => "text/plain",

        _ => "application/octet-stream",
    }
}

/// Guess the MIME type of a file from its name
pub fn mime_from_path(path: &std::path::Path) -> &'static str {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(mime_from_ext)
        .unwrap_or("application/octet-stream")
}

/// Check if a content type denotes media that can be fetched directly
pub fn is_direct_media_mime(mime_type: &str) -> bool {
    let essence = essence(mime_type);
    essence.starts_with("video/") || essence.starts_with("audio/") || essence.starts_with("image/")
}

/// Check if an extension is a known direct media extension
pub fn is_direct_media_ext(extension: &str) -> bool {
    let ext = extension.trim_start_matches('.').to_lowercase();
    DIRECT_MEDIA_EXTENSIONS.contains(&ext.as_str())
}

/// Lowercased MIME type without parameters
fn essence(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("video/mp4"), "mp4");
        assert_eq!(ext_from_mime("Video/MP4; codecs=\"avc1\""), "mp4");
        assert_eq!(ext_from_mime("audio/mpeg"), "mp3");
        assert_eq!(ext_from_mime("image/jpeg"), "jpg");
        assert_eq!(ext_from_mime("text/html"), "bin");
    }

    #[test]
    fn test_mime_from_ext() {
        assert_eq!(mime_from_ext("mp4"), "video/mp4");
        assert_eq!(mime_from_ext(".M4A"), "audio/mp4");
        assert_eq!(mime_from_ext("zip"), "application/zip");
        assert_eq!(mime_from_ext("unknown"), "application/octet-stream");
    }

    #[test]
    fn test_mime_from_path() {
        assert_eq!(mime_from_path(Path::new("/tmp/a/clip.webm")), "video/webm");
        assert_eq!(
            mime_from_path(Path::new("/tmp/a/noext")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_is_direct_media_mime() {
        assert!(is_direct_media_mime("video/mp4"));
        assert!(is_direct_media_mime("audio/ogg; codecs=opus"));
        assert!(is_direct_media_mime("image/png"));
        assert!(!is_direct_media_mime("text/html; charset=utf-8"));
        assert!(!is_direct_media_mime("application/json"));
    }

    #[test]
    fn test_is_direct_media_ext() {
        assert!(is_direct_media_ext("MP4"));
        assert!(is_direct_media_ext(".mp3"));
        assert!(!is_direct_media_ext("html"));
    }
}
