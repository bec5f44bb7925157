//! Safe filename generation utilities

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static INVALID_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("invalid character pattern is valid")
});

static DOT_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.{2,}").expect("dot run pattern is valid"));

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Convert a title to a safe filename by removing/replacing invalid characters
pub fn to_safe_filename(title: &str, extension: &str) -> String {
    let mut safe_title = INVALID_CHARS.replace_all(title, "_").to_string();

    // Remove leading/trailing dots and spaces
    safe_title = safe_title
        .trim_matches(|c: char| c == '.' || c == ' ')
        .to_string();

    safe_title = truncate_on_char_boundary(&safe_title, 200)
        .trim_end()
        .to_string();

    if safe_title.is_empty() {
        safe_title = "video".to_string();
    }

    with_extension(safe_title, extension)
}

/// Strict cleanup for names that travel through archives and headers.
///
/// Invalid characters are dropped, whitespace becomes `_`, dot runs collapse
/// and non-ASCII characters are removed.
pub fn clean_filename(title: &str, extension: &str) -> String {
    let without_invalid = INVALID_CHARS.replace_all(title, "");
    let ascii: String = without_invalid.chars().filter(char::is_ascii).collect();
    let underscored = WHITESPACE.replace_all(ascii.trim(), "_");
    let collapsed = DOT_RUNS.replace_all(&underscored, ".");
    let trimmed = collapsed.trim_matches(|c: char| c == '.' || c == '_');
    let stem = truncate_on_char_boundary(trimmed, 180);

    let stem = if stem.is_empty() { "media" } else { stem };
    with_extension(stem.to_string(), extension)
}

/// Prefix a name with a zero-padded sequence number
pub fn with_sequence_prefix(index: usize, filename: &str) -> String {
    format!("{:03}_{}", index, filename)
}

/// Check if a filename is safe for the current filesystem
pub fn is_safe_filename(filename: &str) -> bool {
    if filename.is_empty() || filename.len() > 255 {
        return false;
    }

    if INVALID_CHARS.is_match(filename) {
        return false;
    }

    // Check for reserved names on Windows
    let reserved_names = [
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];

    if let Some(name_str) = Path::new(filename).file_stem().and_then(|s| s.to_str()) {
        if reserved_names.contains(&name_str.to_uppercase().as_str()) {
            return false;
        }
    }

    !(filename.starts_with('.')
        || filename.ends_with('.')
        || filename.starts_with(' ')
        || filename.ends_with(' '))
}

/// Generate a unique filename by appending a number if the file already exists
pub fn generate_unique_filename(base_path: &Path, filename: &str) -> std::io::Result<String> {
    let mut counter = 1;
    let mut final_filename = filename.to_string();

    let path = Path::new(filename);
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let extension = path
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();

    while base_path.join(&final_filename).exists() {
        final_filename = format!("{} ({}){}", stem, counter, extension);
        counter += 1;

        if counter > 10000 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "Too many files with similar names",
            ));
        }
    }

    Ok(final_filename)
}

fn with_extension(stem: String, extension: &str) -> String {
    if extension.is_empty() {
        return stem;
    }
    let ext = extension.trim_start_matches('.');
    format!("{}.{}", stem, ext)
}

fn truncate_on_char_boundary(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_safe_filename() {
        assert_eq!(
            to_safe_filename("Test Video: Title", "mp4"),
            "Test Video_ Title.mp4"
        );

        assert_eq!(
            to_safe_filename("Video with <invalid> chars", "mp4"),
            "Video with _invalid_ chars.mp4"
        );

        assert_eq!(to_safe_filename("", "mp4"), "video.mp4");
        assert_eq!(to_safe_filename("clip", ".webm"), "clip.webm");
    }

    #[test]
    fn test_to_safe_filename_truncates_multibyte_titles() {
        let title = "é".repeat(150);
        let name = to_safe_filename(&title, "mp4");
        assert!(name.len() <= 204);
        assert!(name.ends_with(".mp4"));
    }

    #[test]
    fn test_clean_filename() {
        assert_eq!(
            clean_filename("My Video: Part 1 / Final?", "mp4"),
            "My_Video_Part_1_Final.mp4"
        );
        assert_eq!(clean_filename("Ünïcode  title...end", "m4a"), "ncode_title.end.m4a");
        assert_eq!(clean_filename("???", "mp3"), "media.mp3");
    }

    #[test]
    fn test_with_sequence_prefix() {
        assert_eq!(with_sequence_prefix(1, "a.mp4"), "001_a.mp4");
        assert_eq!(with_sequence_prefix(42, "b.txt"), "042_b.txt");
        assert_eq!(with_sequence_prefix(1234, "c"), "1234_c");
    }

    #[test]
    fn test_is_safe_filename() {
        assert!(is_safe_filename("normal_file.mp4"));
        assert!(is_safe_filename("video with spaces.mp4"));
        assert!(!is_safe_filename("file<with>invalid:chars.mp4"));
        assert!(!is_safe_filename(""));
        assert!(!is_safe_filename(".hidden_file.mp4"));
        assert!(!is_safe_filename("CON.mp4"));
        assert!(!is_safe_filename("file with trailing space .mp4 "));
    }

    #[test]
    fn test_generate_unique_filename() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            generate_unique_filename(dir.path(), "clip.mp4").unwrap(),
            "clip.mp4"
        );

        std::fs::write(dir.path().join("clip.mp4"), b"x").unwrap();
        std::fs::write(dir.path().join("clip (1).mp4"), b"x").unwrap();
        assert_eq!(
            generate_unique_filename(dir.path(), "clip.mp4").unwrap(),
            "clip (2).mp4"
        );
    }
}
