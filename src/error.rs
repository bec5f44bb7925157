//! Error types for mediafetch

use crate::utils::text::{last_meaningful_line, sanitize_message};
use serde::Serialize;
use std::error::Error as _;
use thiserror::Error;

/// Main error type for mediafetch operations
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid or missing API key")]
    Unauthorized,

    #[error("Too many requests")]
    RateLimited,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Upstream throttled: {0}")]
    UpstreamThrottled(String),

    #[error("Extraction failed: {0}")]
    Extraction(String),

    #[error("Unsupported source: {0}")]
    Unsupported(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Failure taxonomy shared by outcomes, batch reports and the HTTP layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    Unauthorized,
    RateLimited,
    TransientTransport,
    FatalExtraction,
    StorageFailure,
}

impl ErrorKind {
    /// Stable lowercase name used in error bodies and failure placeholders
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::TransientTransport => "transient_transport",
            ErrorKind::FatalExtraction => "fatal_extraction",
            ErrorKind::StorageFailure => "storage_failure",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MediaError {
    /// Classify the error into the failure taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            MediaError::InvalidInput(_) | MediaError::Url(_) => ErrorKind::InvalidInput,
            MediaError::Unauthorized => ErrorKind::Unauthorized,
            MediaError::RateLimited => ErrorKind::RateLimited,
            MediaError::Transport(_) | MediaError::Tls(_) | MediaError::UpstreamThrottled(_) => {
                ErrorKind::TransientTransport
            }
            MediaError::Extraction(_)
            | MediaError::Unsupported(_)
            | MediaError::AccessDenied(_)
            | MediaError::ToolUnavailable(_)
            | MediaError::Json(_)
            | MediaError::Generic(_) => ErrorKind::FatalExtraction,
            MediaError::Io(_) | MediaError::Archive(_) => ErrorKind::StorageFailure,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::TransientTransport
    }

    /// Check if error happened during the TLS handshake or as an abrupt EOF on a TLS stream
    pub fn is_tls(&self) -> bool {
        matches!(self, MediaError::Tls(_))
    }

    /// Single-line message safe to hand to a caller
    pub fn sanitized_message(&self) -> String {
        sanitize_message(&self.to_string())
    }

    /// Map an HTTP status returned by an upstream server
    pub fn from_status(status: reqwest::StatusCode, url: &str) -> Self {
        let message = format!("HTTP {} for {}", status.as_u16(), url);
        match status.as_u16() {
            429 => MediaError::UpstreamThrottled(message),
            401 | 403 => MediaError::AccessDenied(message),
            404 | 410 => MediaError::Extraction(message),
            408 => MediaError::Transport(message),
            code if code >= 500 => MediaError::Transport(message),
            _ => MediaError::Extraction(message),
        }
    }

    /// Classify the diagnostic output of an external tool
    pub fn from_tool_output(tool: &str, stderr: &str) -> Self {
        let detail = last_meaningful_line(stderr)
            .map(sanitize_message)
            .unwrap_or_else(|| format!("{} exited without output", tool));
        let lower = stderr.to_lowercase();

        if TLS_MARKERS.iter().any(|m| lower.contains(m)) {
            MediaError::Tls(detail)
        } else if lower.contains("http error 429") || lower.contains("too many requests") {
            MediaError::UpstreamThrottled(detail)
        } else if lower.contains("unsupported url") {
            MediaError::Unsupported(detail)
        } else if ACCESS_MARKERS.iter().any(|m| lower.contains(m)) {
            MediaError::AccessDenied(detail)
        } else if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m)) {
            MediaError::Transport(detail)
        } else {
            MediaError::Extraction(detail)
        }
    }
}

const TLS_MARKERS: &[&str] = &[
    "ssl",
    "tls",
    "certificate",
    "handshake",
    "eof occurred in violation of protocol",
    "unexpected eof",
];

const ACCESS_MARKERS: &[&str] = &[
    "private video",
    "sign in to confirm",
    "members-only",
    "http error 403",
    "permission denied",
];

const TRANSIENT_MARKERS: &[&str] = &[
    "timed out",
    "timeout",
    "connection reset",
    "connection refused",
    "temporary failure in name resolution",
    "remote end closed connection",
    "http error 5",
    "incomplete read",
];

impl From<reqwest::Error> for MediaError {
    fn from(err: reqwest::Error) -> Self {
        let detail = error_chain(&err);
        let lower = detail.to_lowercase();

        if TLS_MARKERS.iter().any(|m| lower.contains(m)) {
            return MediaError::Tls(detail);
        }
        if let Some(status) = err.status() {
            let url = err.url().map(|u| u.as_str()).unwrap_or("upstream");
            return MediaError::from_status(status, url);
        }
        if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
            return MediaError::Transport(detail);
        }
        if err.is_builder() {
            return MediaError::InvalidInput(detail);
        }
        MediaError::Transport(detail)
    }
}

/// Flatten an error and its sources into one line
fn error_chain(err: &reqwest::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
