//! HTTP mapping of the error taxonomy

use crate::error::{ErrorKind, MediaError};
use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Error returned by handlers and middleware
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct HttpError {
    kind: ErrorKind,
    message: String,
    retry_after: Option<Duration>,
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    kind: ErrorKind,
    status: u16,
}

impl HttpError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(ErrorKind::Unauthorized, "Invalid or missing API key")
    }

    pub fn rate_limited(retry_after: Duration) -> Self {
        Self {
            retry_after: Some(retry_after),
            ..Self::new(ErrorKind::RateLimited, "Too many requests")
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status(&self) -> StatusCode {
        status_for(self.kind)
    }
}

/// Status code of each failure kind
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        ErrorKind::TransientTransport => StatusCode::BAD_GATEWAY,
        ErrorKind::FatalExtraction => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::StorageFailure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = %self.kind, "{}", self.message);
        }

        let body = ErrorBody {
            error: &self.message,
            kind: self.kind,
            status: status.as_u16(),
        };
        let mut response = (status, axum::Json(body)).into_response();

        if let Some(retry_after) = self.retry_after {
            // Whole seconds, rounded up so clients never retry early
            let secs = retry_after
                .as_secs()
                .saturating_add(u64::from(retry_after.subsec_nanos() > 0));
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs.max(1)));
        }
        response
    }
}

impl From<MediaError> for HttpError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::RateLimited => HttpError::rate_limited(Duration::from_secs(1)),
            other => HttpError::new(other.kind(), other.sanitized_message()),
        }
    }
}

impl From<JsonRejection> for HttpError {
    fn from(rejection: JsonRejection) -> Self {
        HttpError::bad_request(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(ErrorKind::InvalidInput), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(ErrorKind::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(ErrorKind::RateLimited), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(status_for(ErrorKind::TransientTransport), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for(ErrorKind::FatalExtraction), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status_for(ErrorKind::StorageFailure), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_media_error_is_sanitized() {
        let err: HttpError = MediaError::Extraction("\u{1b}[0;31mERROR:\u{1b}[0m bad\nformat".into()).into();
        assert_eq!(err.kind(), ErrorKind::FatalExtraction);
        assert!(!err.message().contains('\u{1b}'));
        assert!(!err.message().contains('\n'));
    }

    #[test]
    fn test_retry_after_header_rounds_up() {
        let response = HttpError::rate_limited(Duration::from_millis(2500)).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "3");

        let response = HttpError::rate_limited(Duration::ZERO).into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], "1");

        let response = HttpError::rate_limited(Duration::MAX).into_response();
        assert_eq!(response.headers()[header::RETRY_AFTER], u64::MAX.to_string().as_str());
    }
}
