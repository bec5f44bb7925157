//! In-process fakes for orchestration and service tests

use crate::core::media::{FormatDescriptor, MediaInfo};
use crate::core::orchestrator::Orchestrator;
use crate::download::accelerated::Accelerator;
use crate::download::chain::StrategyChain;
use crate::download::extractor::{Extractor, ExtractorStrategy};
use crate::download::probe::{MediaProbe, ProbeReport};
use crate::download::profile::{RequestProfile, TransportSettings};
use crate::download::retry::{RetryConfigBuilder, RetryExecutor};
use crate::download::strategy::TransportJob;
use crate::error::MediaError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Extractor that serves a 360p-1080p ladder titled after the `v=` parameter.
///
/// URLs containing `private` fail resolution, `broken` fail the fetch and
/// `stall` leave a partial file behind and never finish.
#[derive(Default)]
pub struct FakeExtractor {
    pub resolves: AtomicU32,
    pub stalled: AtomicU32,
    pub formats_seen: Mutex<Vec<String>>,
}

impl FakeExtractor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    fn name(&self) -> &str {
        "fake"
    }

    async fn resolve(&self, url: &str, _profile: &RequestProfile) -> Result<MediaInfo, MediaError> {
        self.resolves.fetch_add(1, Ordering::SeqCst);
        if url.contains("private") {
            return Err(MediaError::AccessDenied("Private video".to_string()));
        }
        let id = url.rsplit('=').next().unwrap_or("clip").to_string();
        Ok(MediaInfo {
            title: format!("My Clip: {}", id),
            uploader: Some("uploader".to_string()),
            duration: Some(42.0),
            id,
            formats: [360, 480, 720, 1080]
                .iter()
                .map(|h| FormatDescriptor {
                    format_id: format!("v{}", h),
                    ext: "mp4".to_string(),
                    height: Some(*h),
                    width: Some(h * 16 / 9),
                    vcodec: Some("avc1".to_string()),
                    acodec: Some("none".to_string()),
                    ..FormatDescriptor::default()
                })
                .collect(),
            ..MediaInfo::default()
        })
    }

    async fn fetch(
        &self,
        job: &TransportJob<'_>,
        _accelerator: Option<&Accelerator>,
    ) -> Result<PathBuf, MediaError> {
        self.formats_seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(job.format.to_string());
        if job.url.contains("broken") {
            return Err(MediaError::Extraction("Requested format is not available".to_string()));
        }
        if job.url.contains("stall") {
            std::fs::write(job.dest_dir.join("download [fake].mp4.part"), b"partial")?;
            self.stalled.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
        }
        let path = job.dest_dir.join("download [fake].mp4");
        std::fs::write(&path, format!("bytes of {}", job.url))?;
        Ok(path)
    }
}

/// Probe that reports every URL as an HTML page
pub struct PageProbe;

#[async_trait]
impl MediaProbe for PageProbe {
    async fn probe(&self, _url: &str, _profile: &RequestProfile) -> Result<ProbeReport, MediaError> {
        Ok(ProbeReport {
            content_type: Some("text/html".to_string()),
            content_length: None,
        })
    }
}

/// Orchestrator over the fakes with millisecond retry delays
pub fn test_orchestrator(extractor: Arc<FakeExtractor>, scratch_root: &Path) -> Orchestrator {
    let retry = RetryExecutor::with_config(
        RetryConfigBuilder::new()
            .base_delay(Duration::from_millis(1))
            .linear(Duration::from_millis(1))
            .jitter_factor(0.0)
            .build(),
    );
    let chain = StrategyChain::builder(TransportSettings::default())
        .retry(retry)
        .extractor(Arc::new(ExtractorStrategy::new(extractor.clone())))
        .build();
    Orchestrator::new(extractor, Arc::new(PageProbe), Arc::new(chain), scratch_root)
}

/// Number of entries directly under `root`
pub fn scratch_entries(root: &Path) -> usize {
    std::fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
}
