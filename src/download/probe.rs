//! Header probe deciding whether a URL is directly streamable media

use crate::download::profile::RequestProfile;
use crate::error::MediaError;
use crate::utils::mime::is_direct_media_mime;
use async_trait::async_trait;
use reqwest::header::{CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use reqwest::{Response, StatusCode};
use tracing::debug;

/// What the probe learned from the response headers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
}

impl ProbeReport {
    /// True for `video/*`, `audio/*` and `image/*` responses
    pub fn is_direct_media(&self) -> bool {
        self.content_type
            .as_deref()
            .map_or(false, is_direct_media_mime)
    }
}

/// Looks at a URL without downloading it
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, url: &str, profile: &RequestProfile) -> Result<ProbeReport, MediaError>;
}

/// Probe with `HEAD`, falling back to a two-byte ranged `GET`
#[derive(Debug, Clone, Default)]
pub struct HttpProbe;

#[async_trait]
impl MediaProbe for HttpProbe {
    async fn probe(&self, url: &str, profile: &RequestProfile) -> Result<ProbeReport, MediaError> {
        let client = profile.build_client()?;

        match client.head(url).send().await {
            Ok(response) if response.status().is_success() => {
                let report = report_from(&response);
                if report.content_type.is_some() {
                    debug!("HEAD probe of {}: {:?}", url, report);
                    return Ok(report);
                }
            }
            Ok(response) => debug!("HEAD probe of {} returned {}", url, response.status()),
            Err(e) => {
                let err = MediaError::from(e);
                if err.is_tls() {
                    return Err(err);
                }
                debug!("HEAD probe of {} failed: {}", url, err);
            }
        }

        // Some servers reject HEAD; a tiny ranged GET reports the same headers
        let response = client.get(url).header(RANGE, "bytes=0-1").send().await?;
        let status = response.status();
        if !(status.is_success() || status == StatusCode::PARTIAL_CONTENT) {
            return Err(MediaError::from_status(status, url));
        }
        let report = report_from(&response);
        debug!("Ranged probe of {}: {:?}", url, report);
        Ok(report)
    }
}

fn report_from(response: &Response) -> ProbeReport {
    let headers = response.headers();
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    // "bytes 0-1/total" beats the length of a partial body
    let from_range = headers
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(total_from_content_range);
    let content_length = from_range.or_else(|| {
        if response.status() == StatusCode::PARTIAL_CONTENT {
            return None;
        }
        headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|len| *len > 0)
    });

    ProbeReport {
        content_type,
        content_length,
    }
}

/// Total size from a `Content-Range` value
pub fn total_from_content_range(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::profile::{TlsMode, TransportSettings};

    fn profile() -> RequestProfile {
        RequestProfile::for_attempt(&TransportSettings::default(), 0, TlsMode::Standard)
    }

    #[test]
    fn test_total_from_content_range() {
        assert_eq!(total_from_content_range("bytes 0-1/5000"), Some(5000));
        assert_eq!(total_from_content_range("bytes 0-1/*"), None);
        assert_eq!(total_from_content_range("garbage"), None);
    }

    #[tokio::test]
    async fn test_head_probe_detects_media() {
        let mut server = mockito::Server::new_async().await;
        let _head = server
            .mock("HEAD", "/clip.mp4")
            .with_status(200)
            .with_header("content-type", "video/mp4")
            .create_async()
            .await;

        let report = HttpProbe
            .probe(&format!("{}/clip.mp4", server.url()), &profile())
            .await
            .unwrap();
        assert_eq!(report.content_type.as_deref(), Some("video/mp4"));
        assert!(report.is_direct_media());
    }

    #[tokio::test]
    async fn test_probe_falls_back_to_ranged_get() {
        let mut server = mockito::Server::new_async().await;
        let _head = server
            .mock("HEAD", "/photo")
            .with_status(405)
            .create_async()
            .await;
        let _get = server
            .mock("GET", "/photo")
            .match_header("range", "bytes=0-1")
            .with_status(206)
            .with_header("content-type", "image/jpeg")
            .with_header("content-range", "bytes 0-1/5000")
            .with_body("ab")
            .create_async()
            .await;

        let report = HttpProbe
            .probe(&format!("{}/photo", server.url()), &profile())
            .await
            .unwrap();
        assert_eq!(report.content_length, Some(5000));
        assert!(report.is_direct_media());
    }

    #[tokio::test]
    async fn test_probe_html_page_is_not_media() {
        let mut server = mockito::Server::new_async().await;
        let _head = server
            .mock("HEAD", "/watch")
            .with_status(200)
            .with_header("content-type", "text/html; charset=utf-8")
            .create_async()
            .await;

        let report = HttpProbe
            .probe(&format!("{}/watch", server.url()), &profile())
            .await
            .unwrap();
        assert!(!report.is_direct_media());
    }

    #[tokio::test]
    async fn test_probe_reports_missing_resource() {
        let mut server = mockito::Server::new_async().await;
        let _head = server.mock("HEAD", "/gone").with_status(404).create_async().await;
        let _get = server.mock("GET", "/gone").with_status(404).create_async().await;

        let err = HttpProbe
            .probe(&format!("{}/gone", server.url()), &profile())
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Extraction(_)));
    }
}
