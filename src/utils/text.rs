//! Message sanitizing for anything that leaves the process

use regex::Regex;
use std::sync::LazyLock;

/// Longest message handed to a caller
pub const MAX_MESSAGE_LEN: usize = 512;

static ESCAPE_SEQUENCES: LazyLock<Regex> = LazyLock::new(|| {
    // CSI sequences, OSC sequences (BEL or ST terminated) and lone two-byte escapes
    Regex::new(r"\x1b\[[0-?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[@-Z\\-_]")
        .expect("escape sequence pattern is valid")
});

static WHITESPACE_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Reduce an arbitrary message to one printable line.
///
/// Terminal escape sequences are removed, control characters become spaces,
/// whitespace runs collapse and the result is bounded to [`MAX_MESSAGE_LEN`]
/// characters.
pub fn sanitize_message(raw: &str) -> String {
    let stripped = ESCAPE_SEQUENCES.replace_all(raw, "");
    let printable: String = stripped
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    let collapsed = WHITESPACE_RUNS.replace_all(printable.trim(), " ");

    if collapsed.chars().count() > MAX_MESSAGE_LEN {
        let mut truncated: String = collapsed.chars().take(MAX_MESSAGE_LEN - 3).collect();
        truncated.push_str("...");
        truncated
    } else {
        collapsed.into_owned()
    }
}

/// Last non-empty line of tool output, usually the actual error
pub fn last_meaningful_line(output: &str) -> Option<&str> {
    output
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
}
