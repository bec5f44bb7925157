//! Direct HTTP streaming to disk

use crate::core::progress::ProgressTracker;
use crate::download::profile::TlsMode;
use crate::download::strategy::{
    target_file_name, Capability, FetchedFile, StrategyKind, TransportJob, TransportStrategy,
};
use crate::error::MediaError;
use crate::utils::mime::ext_from_mime;
use async_trait::async_trait;
use futures_util::StreamExt;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::header::CONTENT_TYPE;
use std::num::NonZeroU32;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Bandwidth cap in bytes per second
pub struct Throttle {
    limiter: DefaultDirectRateLimiter,
    burst: NonZeroU32,
}

impl Throttle {
    /// `None` for a zero rate
    pub fn new(bytes_per_second: u64) -> Option<Self> {
        let rate = u32::try_from(bytes_per_second).unwrap_or(u32::MAX);
        let burst = NonZeroU32::new(rate)?;
        Some(Self {
            limiter: RateLimiter::direct(Quota::per_second(burst)),
            burst,
        })
    }

    /// Wait until `bytes` more may pass
    pub async fn consume(&self, bytes: usize) {
        let mut remaining = bytes as u64;
        while remaining > 0 {
            let step = remaining.min(u64::from(self.burst.get())) as u32;
            if let Some(cells) = NonZeroU32::new(step) {
                // step <= burst, so capacity is always sufficient
                let _ = self.limiter.until_n_ready(cells).await;
            }
            remaining -= u64::from(step);
        }
    }
}

/// Stream the response body of a plain GET into the destination directory
pub struct DirectHttpStrategy {
    tls: TlsMode,
    throttle: Option<Arc<Throttle>>,
}

impl DirectHttpStrategy {
    pub fn new(tls: TlsMode) -> Self {
        Self { tls, throttle: None }
    }

    /// Share a bandwidth cap with other downloads
    pub fn with_throttle(mut self, throttle: Option<Arc<Throttle>>) -> Self {
        self.throttle = throttle;
        self
    }
}

#[async_trait]
impl TransportStrategy for DirectHttpStrategy {
    fn name(&self) -> &str {
        match self.tls {
            TlsMode::Standard => "http",
            TlsMode::CappedTls12 => "http-tls1.2",
            TlsMode::CappedTls11 => "http-tls1.1",
            TlsMode::Unverified => "http-unverified",
        }
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Direct
    }

    fn capability(&self) -> Capability {
        Capability::WithProgress
    }

    fn tls_mode(&self) -> TlsMode {
        self.tls
    }

    async fn attempt(&self, job: &TransportJob<'_>) -> Result<FetchedFile, MediaError> {
        if self.tls != TlsMode::Standard {
            warn!(
                "Fetching {} with degraded transport security ({})",
                job.url,
                self.tls.trust()
            );
        }

        let client = job.profile.build_client()?;
        let response = client.get(job.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(MediaError::from_status(status, job.url));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let total = response.content_length();

        let mut name = target_file_name(job.url);
        if Path::new(&name).extension().is_none() {
            if let Some(mime) = &content_type {
                name = format!("{}.{}", name, ext_from_mime(mime));
            }
        }
        let path = job.dest_dir.join(&name);
        let partial = job.dest_dir.join(format!("{}.part", name));

        let mut file = File::create(&partial).await?;
        let mut tracker = ProgressTracker::new(job.progress.cloned(), total);
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            tracker.advance(chunk.len() as u64);
            if let Some(throttle) = &self.throttle {
                throttle.consume(chunk.len()).await;
            }
        }
        file.flush().await?;
        drop(file);

        if let Some(expected) = total {
            if tracker.bytes_done() < expected {
                return Err(MediaError::Transport(format!(
                    "Connection closed after {} of {} bytes",
                    tracker.bytes_done(),
                    expected
                )));
            }
        }

        tokio::fs::rename(&partial, &path).await?;
        debug!("Streamed {} bytes to {}", tracker.bytes_done(), path.display());

        Ok(FetchedFile { path, content_type })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::progress::{ProgressEvent, ProgressSink};
    use crate::download::profile::{RequestProfile, TransportSettings, TransportTrust};
    use std::sync::Mutex;

    fn profile() -> RequestProfile {
        RequestProfile::for_attempt(&TransportSettings::default(), 0, TlsMode::Standard)
    }

    #[tokio::test]
    async fn test_streams_body_to_file() {
        let mut server = mockito::Server::new_async().await;
        let body = vec![42u8; 64 * 1024];
        let _m = server
            .mock("GET", "/media/clip.mp4")
            .with_status(200)
            .with_header("content-type", "video/mp4")
            .with_body(&body)
            .create_async()
            .await;

        let root = tempfile::tempdir().unwrap();
        let seen: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink: ProgressSink = {
            let seen = seen.clone();
            Arc::new(move |event: ProgressEvent| seen.lock().unwrap().push(event))
        };
        let profile = profile();
        let url = format!("{}/media/clip.mp4", server.url());
        let job = TransportJob {
            url: &url,
            format: "direct",
            postprocess: None,
            dest_dir: root.path(),
            profile: &profile,
            progress: Some(&sink),
        };

        let fetched = DirectHttpStrategy::new(TlsMode::Standard)
            .attempt(&job)
            .await
            .unwrap();

        assert_eq!(fetched.path, root.path().join("clip.mp4"));
        assert_eq!(fetched.content_type.as_deref(), Some("video/mp4"));
        assert_eq!(std::fs::read(&fetched.path).unwrap().len(), body.len());
        assert!(!root.path().join("clip.mp4.part").exists());

        let events = seen.lock().unwrap();
        assert!(!events.is_empty());
        assert_eq!(events.last().unwrap().bytes_done, body.len() as u64);
    }

    #[tokio::test]
    async fn test_extension_from_content_type() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/render")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body("png")
            .create_async()
            .await;

        let root = tempfile::tempdir().unwrap();
        let profile = profile();
        let url = format!("{}/render", server.url());
        let job = TransportJob {
            url: &url,
            format: "direct",
            postprocess: None,
            dest_dir: root.path(),
            profile: &profile,
            progress: None,
        };

        let fetched = DirectHttpStrategy::new(TlsMode::Standard)
            .attempt(&job)
            .await
            .unwrap();
        assert_eq!(fetched.path.file_name().unwrap(), "render.png");
    }

    #[tokio::test]
    async fn test_status_errors_are_classified() {
        let mut server = mockito::Server::new_async().await;
        let _gone = server.mock("GET", "/gone.mp4").with_status(404).create_async().await;
        let _busy = server.mock("GET", "/busy.mp4").with_status(503).create_async().await;

        let root = tempfile::tempdir().unwrap();
        let profile = profile();
        let strategy = DirectHttpStrategy::new(TlsMode::Standard);

        for (path, retryable) in [("/gone.mp4", false), ("/busy.mp4", true)] {
            let url = format!("{}{}", server.url(), path);
            let job = TransportJob {
                url: &url,
                format: "direct",
                postprocess: None,
                dest_dir: root.path(),
                profile: &profile,
                progress: None,
            };
            let err = strategy.attempt(&job).await.unwrap_err();
            assert_eq!(err.is_retryable(), retryable, "{}", path);
        }
    }

    #[test]
    fn test_degraded_strategies_report_trust() {
        assert_eq!(DirectHttpStrategy::new(TlsMode::Standard).trust(), TransportTrust::Verified);
        assert_eq!(
            DirectHttpStrategy::new(TlsMode::CappedTls11).trust(),
            TransportTrust::Downgraded
        );
        let unverified = DirectHttpStrategy::new(TlsMode::Unverified);
        assert_eq!(unverified.trust(), TransportTrust::Unverified);
        assert_eq!(unverified.name(), "http-unverified");
    }

    #[tokio::test]
    async fn test_throttle_rejects_zero_and_passes_small_chunks() {
        assert!(Throttle::new(0).is_none());
        let throttle = Throttle::new(1024 * 1024).unwrap();
        tokio_test::assert_ready!(tokio_test::task::spawn(throttle.consume(0)).poll());
        throttle.consume(512).await;
    }
}
