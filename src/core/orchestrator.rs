//! Single-download orchestration

use crate::core::format_selector::{pick_video_track, FormatSelection};
use crate::core::media::{MediaInfo, MediaRequest};
use crate::core::outcome::{Artifact, DownloadOutcome, TransportReport};
use crate::core::progress::{notify, Phase, ProgressEvent, ProgressSink};
use crate::download::chain::{ChainRequest, Route, StrategyChain};
use crate::download::extractor::{Extractor, YtDlpExtractor};
use crate::download::probe::{HttpProbe, MediaProbe};
use crate::download::profile::{RequestProfile, TlsMode, TransportSettings};
use crate::download::retry::RetryExecutor;
use crate::download::scratch::ScratchDir;
use crate::download::tools::{ToolKind, Toolbox};
use crate::error::MediaError;
use crate::utils::cache::MetadataCache;
use crate::utils::filename::{clean_filename, with_sequence_prefix};
use crate::utils::mime::{is_direct_media_mime, mime_from_path};
use crate::utils::url::has_direct_media_extension;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SCRATCH_PREFIX: &str = "mediafetch_";

/// Metadata of a source plus the route its download starts on
#[derive(Debug, Clone)]
pub struct Lookup {
    pub info: Arc<MediaInfo>,
    pub route: Route,
}

/// Turns a [`MediaRequest`] into a [`DownloadOutcome`]
pub struct Orchestrator {
    extractor: Arc<dyn Extractor>,
    probe: Arc<dyn MediaProbe>,
    chain: Arc<StrategyChain>,
    cache: MetadataCache,
    scratch_root: PathBuf,
}

impl Orchestrator {
    pub fn new(
        extractor: Arc<dyn Extractor>,
        probe: Arc<dyn MediaProbe>,
        chain: Arc<StrategyChain>,
        scratch_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            extractor,
            probe,
            chain,
            cache: MetadataCache::default(),
            scratch_root: scratch_root.into(),
        }
    }

    /// Build the standard pipeline over the tools found on this host
    pub fn from_toolbox(
        settings: TransportSettings,
        toolbox: &Toolbox,
        retry: RetryExecutor,
        scratch_root: impl Into<PathBuf>,
    ) -> Self {
        let binary = match toolbox.get(ToolKind::YtDlp) {
            Some(path) => path.to_path_buf(),
            None => {
                warn!("yt-dlp not found on PATH; only direct media URLs can be fetched");
                PathBuf::from(ToolKind::YtDlp.binary_name())
            }
        };
        if toolbox.get(ToolKind::Ffmpeg).is_none() {
            info!("ffmpeg not found; merging streams and mp3 conversion will fail");
        }

        let extractor: Arc<dyn Extractor> = Arc::new(
            YtDlpExtractor::new(binary)
                .with_ffmpeg(toolbox.get(ToolKind::Ffmpeg).map(Path::to_path_buf)),
        );
        let chain = StrategyChain::standard(settings, toolbox, extractor.clone(), retry);
        Self::new(extractor, Arc::new(HttpProbe), Arc::new(chain), scratch_root)
    }

    /// Share a metadata cache, e.g. between the info and download paths
    pub fn with_cache(mut self, cache: MetadataCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    /// Resolve metadata through the extractor, cached and retried
    pub async fn resolve(&self, url: &str) -> Result<Arc<MediaInfo>, MediaError> {
        if let Some(hit) = self.cache.get(url).await {
            debug!("Metadata cache hit for {}", url);
            return Ok(hit);
        }

        let settings = self.chain.settings();
        let info = self
            .chain
            .retry()
            .execute(|attempt| {
                let profile = RequestProfile::for_attempt(settings, attempt, TlsMode::Standard);
                let extractor = self.extractor.clone();
                async move { extractor.resolve(url, &profile).await }
            })
            .await?;

        let info = Arc::new(info);
        self.cache.insert(url, info.clone()).await;
        Ok(info)
    }

    /// Probe, then resolve: decides where the download starts
    pub async fn lookup(&self, url: &str) -> Result<Lookup, MediaError> {
        let profile = RequestProfile::for_attempt(self.chain.settings(), 0, TlsMode::Standard);
        match self.probe.probe(url, &profile).await {
            Ok(report) if report.is_direct_media() => {
                debug!("{} is direct media ({:?})", url, report.content_type);
                return Ok(Lookup {
                    info: Arc::new(MediaInfo::from_direct(
                        url,
                        report.content_type.as_deref(),
                        report.content_length,
                    )),
                    route: Route::DirectMedia,
                });
            }
            Ok(_) => {}
            Err(e) => debug!("Probe of {} failed: {}", url, e),
        }

        match self.resolve(url).await {
            Ok(info) => Ok(Lookup {
                info,
                route: Route::Extractor,
            }),
            Err(e) if e.is_tls() && has_direct_media_extension(url) => {
                warn!("Metadata lookup for {} failed on TLS; using fallback transports", url);
                Ok(Lookup {
                    info: Arc::new(MediaInfo::from_direct(url, None, None)),
                    route: Route::TlsFallback,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Metadata for the info endpoints
    pub async fn info(&self, request: &MediaRequest) -> Result<Arc<MediaInfo>, MediaError> {
        Ok(self.lookup(request.url()).await?.info)
    }

    pub async fn download(&self, request: &MediaRequest, progress: Option<ProgressSink>) -> DownloadOutcome {
        self.download_indexed(request, None, progress).await
    }

    /// Download with an optional sequence number prefixed to the file name
    pub async fn download_indexed(
        &self,
        request: &MediaRequest,
        index: Option<usize>,
        progress: Option<ProgressSink>,
    ) -> DownloadOutcome {
        match self.try_download(request, index, progress.as_ref()).await {
            Ok((artifact, transport)) => {
                info!(
                    "Downloaded {} ({} bytes) via {} [{}]",
                    artifact.file_name(),
                    artifact.byte_size(),
                    transport.strategy,
                    transport.trust
                );
                DownloadOutcome::Success {
                    artifact,
                    transport,
                }
            }
            Err(error) => {
                warn!("Download of {} failed: {}", request.url(), error);
                DownloadOutcome::failure(&error)
            }
        }
    }

    async fn try_download(
        &self,
        request: &MediaRequest,
        index: Option<usize>,
        progress: Option<&ProgressSink>,
    ) -> Result<(Artifact, TransportReport), MediaError> {
        notify(progress, ProgressEvent::phase(Phase::FetchingMetadata));
        let Lookup { info, route } = self.lookup(request.url()).await?;

        let selection = FormatSelection::resolve(request.format_hint(), &info.formats);
        if let Some(label) = selection.label {
            if let Some(track) = pick_video_track(&info.formats, label) {
                debug!(
                    "{} resolves to format {} ({})",
                    label,
                    track.format_id,
                    track.resolution().unwrap_or_else(|| "audio".to_string())
                );
            }
        }

        let scratch = ScratchDir::create(&self.scratch_root, SCRATCH_PREFIX)?;
        let run = self
            .chain
            .run(
                route,
                ChainRequest {
                    url: request.url(),
                    format: selection.expression.as_str(),
                    postprocess: selection.postprocess,
                    dest_dir: scratch.path(),
                    progress,
                },
            )
            .await;
        let success = match run {
            Ok(success) => success,
            Err(error) => {
                if let Err(e) = scratch.release() {
                    warn!("Failed to remove scratch directory: {}", e);
                }
                return Err(error);
            }
        };

        let final_path = normalized_path(&success.file.path, &info.title, index);
        if final_path != success.file.path {
            tokio::fs::rename(&success.file.path, &final_path).await?;
        }

        let container_mime = success
            .file
            .content_type
            .as_deref()
            .filter(|ct| is_direct_media_mime(ct))
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_string())
            .unwrap_or_else(|| mime_from_path(&final_path).to_string());

        let artifact = Artifact::new(scratch, final_path, container_mime)?;
        Ok((
            artifact,
            TransportReport {
                strategy: success.strategy,
                trust: success.trust,
                attempts: success.attempts,
            },
        ))
    }
}

/// Clean name for the fetched file, next to it in the scratch directory
fn normalized_path(fetched: &Path, title: &str, index: Option<usize>) -> PathBuf {
    let ext = fetched
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let title = if title.trim().is_empty() {
        fetched
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else {
        title.to_string()
    };

    let name = clean_filename(&title, &ext);
    let name = match index {
        Some(index) => with_sequence_prefix(index, &name),
        None => name,
    };
    fetched.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{scratch_entries, test_orchestrator, FakeExtractor};
    use crate::error::ErrorKind;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;
    use std::time::Duration;

    fn orchestrator(extractor: Arc<FakeExtractor>, root: &Path) -> Orchestrator {
        test_orchestrator(extractor, root)
    }

    #[tokio::test]
    async fn test_success_names_file_and_cleans_up_on_drop() {
        let root = tempfile::tempdir().unwrap();
        let extractor = FakeExtractor::new();
        let orchestrator = orchestrator(extractor.clone(), root.path());
        let request = MediaRequest::parse("https://video.example.com/watch?v=abc", Some("720p")).unwrap();

        let outcome = orchestrator.download_indexed(&request, Some(2), None).await;
        let (artifact, transport) = outcome.into_result().unwrap();

        assert_eq!(artifact.file_name(), "002_My_Clip_abc.mp4");
        assert_eq!(artifact.container_mime(), "video/mp4");
        assert!(artifact.byte_size() > 0);
        assert_eq!(transport.attempts, 1);
        assert_eq!(
            extractor.formats_seen.lock().unwrap()[0],
            "bestvideo[ext=mp4][height<=720]+bestaudio[ext=m4a]/best[height<=720]/best"
        );
        assert_eq!(scratch_entries(root.path()), 1);

        drop(artifact);
        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_failure_leaves_no_scratch() {
        let root = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(FakeExtractor::new(), root.path());
        let request = MediaRequest::parse("https://video.example.com/broken", None).unwrap();

        match orchestrator.download(&request, None).await {
            DownloadOutcome::Failure { kind, message } => {
                assert_eq!(kind, ErrorKind::FatalExtraction);
                assert!(message.contains("Requested format is not available"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_cancelled_download_removes_partial_files() {
        let root = tempfile::tempdir().unwrap();
        let extractor = FakeExtractor::new();
        let orchestrator = orchestrator(extractor.clone(), root.path());
        let request = MediaRequest::parse("https://video.example.com/stall?v=slow", None).unwrap();

        let cancelled = tokio::time::timeout(Duration::from_millis(500), orchestrator.download(&request, None)).await;

        assert!(cancelled.is_err());
        assert_eq!(extractor.stalled.load(Ordering::SeqCst), 1);
        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_metadata_failure_short_circuits() {
        let root = tempfile::tempdir().unwrap();
        let extractor = FakeExtractor::new();
        let orchestrator = orchestrator(extractor.clone(), root.path());
        let request = MediaRequest::parse("https://video.example.com/private", None).unwrap();

        let outcome = orchestrator.download(&request, None).await;
        assert!(!outcome.is_success());
        assert!(extractor.formats_seen.lock().unwrap().is_empty());
        // Fatal errors are not retried
        assert_eq!(extractor.resolves.load(Ordering::SeqCst), 1);
        assert_eq!(scratch_entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_metadata_is_cached() {
        let root = tempfile::tempdir().unwrap();
        let extractor = FakeExtractor::new();
        let orchestrator = orchestrator(extractor.clone(), root.path());
        let request = MediaRequest::parse("https://video.example.com/watch?v=abc", None).unwrap();

        let first = orchestrator.info(&request).await.unwrap();
        let second = orchestrator.info(&request).await.unwrap();
        assert_eq!(first.title, second.title);
        assert_eq!(extractor.resolves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_progress_reports_metadata_phase() {
        let root = tempfile::tempdir().unwrap();
        let orchestrator = orchestrator(FakeExtractor::new(), root.path());
        let request = MediaRequest::parse("https://video.example.com/watch?v=abc", None).unwrap();
        let phases: Arc<Mutex<Vec<Phase>>> = Arc::default();
        let sink: ProgressSink = {
            let phases = phases.clone();
            Arc::new(move |event: ProgressEvent| phases.lock().unwrap().push(event.phase))
        };

        let outcome = orchestrator.download(&request, Some(sink)).await;
        assert!(outcome.is_success());
        assert_eq!(phases.lock().unwrap().first(), Some(&Phase::FetchingMetadata));
    }

    #[test]
    fn test_normalized_path() {
        let fetched = Path::new("/scratch/Some Title [abc].MP4");
        assert_eq!(
            normalized_path(fetched, "Some: Title?", None),
            PathBuf::from("/scratch/Some_Title.mp4")
        );
        assert_eq!(
            normalized_path(fetched, "", Some(7)),
            PathBuf::from("/scratch/007_Some_Title_[abc].mp4")
        );
    }
}
