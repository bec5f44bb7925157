//! Ordered transport strategies and the single driver that walks them

use crate::core::format_selector::Postprocess;
use crate::core::progress::{notify, Phase, ProgressEvent, ProgressSink};
use crate::download::accelerated::{AcceleratedStrategy, Accelerator};
use crate::download::cli_tool::{CliToolStrategy, Fetcher};
use crate::download::direct::{DirectHttpStrategy, Throttle};
use crate::download::extractor::{Extractor, ExtractorStrategy};
use crate::download::profile::{RequestProfile, TlsMode, TransportSettings, TransportTrust};
use crate::download::retry::RetryExecutor;
use crate::download::strategy::{Capability, FetchedFile, StrategyKind, TransportJob, TransportStrategy};
use crate::download::tools::{ToolKind, Toolbox};
use crate::error::MediaError;
use crate::utils::url::has_direct_media_extension;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where the decision tree starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Probe reported a media content type
    DirectMedia,
    /// Page URL handed to the extractor
    Extractor,
    /// Metadata lookup already failed on TLS for a direct-media URL
    TlsFallback,
}

/// Input shared by every stage of one chain run
#[derive(Clone, Copy)]
pub struct ChainRequest<'a> {
    pub url: &'a str,
    pub format: &'a str,
    pub postprocess: Option<Postprocess>,
    pub dest_dir: &'a Path,
    pub progress: Option<&'a ProgressSink>,
}

/// A fetched file and how it was obtained
#[derive(Debug, Clone, PartialEq)]
pub struct ChainSuccess {
    pub file: FetchedFile,
    pub strategy: StrategyKind,
    pub trust: TransportTrust,
    /// Attempts spent in the stage that succeeded
    pub attempts: u32,
}

/// Fixed decision tree over transport strategies.
///
/// ```text
/// DirectMedia: direct
/// Extractor:   extractor (accelerated when aria2c is present)
/// on a TLS failure of a direct-media URL:
///              aria2c -> curl/wget -> verified HTTP
///              -> TLS 1.2 -> TLS 1.1 -> unverified   (opt-in)
/// ```
pub struct StrategyChain {
    settings: TransportSettings,
    retry: RetryExecutor,
    extractor: Option<Arc<dyn TransportStrategy>>,
    direct: Option<Arc<dyn TransportStrategy>>,
    fallback: Vec<Arc<dyn TransportStrategy>>,
    degraded: Vec<Arc<dyn TransportStrategy>>,
}

impl StrategyChain {
    pub fn builder(settings: TransportSettings) -> StrategyChainBuilder {
        StrategyChainBuilder {
            chain: StrategyChain {
                settings,
                retry: RetryExecutor::new(),
                extractor: None,
                direct: None,
                fallback: Vec::new(),
                degraded: Vec::new(),
            },
        }
    }

    /// Standard tree over the tools found on this host
    pub fn standard(
        settings: TransportSettings,
        toolbox: &Toolbox,
        extractor: Arc<dyn Extractor>,
        retry: RetryExecutor,
    ) -> Self {
        let throttle = settings
            .bandwidth_bps
            .and_then(Throttle::new)
            .map(Arc::new);
        let accelerator = toolbox
            .get(ToolKind::Aria2c)
            .map(|path| Accelerator::new(path, settings.accelerator_connections));
        let direct = |tls: TlsMode| -> Arc<dyn TransportStrategy> {
            Arc::new(DirectHttpStrategy::new(tls).with_throttle(throttle.clone()))
        };

        let mut builder = StrategyChain::builder(settings)
            .retry(retry)
            .extractor(Arc::new(
                ExtractorStrategy::new(extractor).with_accelerator(accelerator.clone()),
            ))
            .direct(direct(TlsMode::Standard));

        if let Some(accelerator) = accelerator {
            builder = builder.fallback(Arc::new(AcceleratedStrategy::new(accelerator)));
        }
        for fetcher in [Fetcher::Curl, Fetcher::Wget] {
            if let Some(path) = toolbox.get(fetcher.tool()) {
                builder = builder.fallback(Arc::new(CliToolStrategy::new(fetcher, path)));
            }
        }

        builder
            .fallback(direct(TlsMode::Standard))
            .degraded(direct(TlsMode::CappedTls12))
            .degraded(direct(TlsMode::CappedTls11))
            .degraded(direct(TlsMode::Unverified))
            .build()
    }

    pub fn settings(&self) -> &TransportSettings {
        &self.settings
    }

    pub fn retry(&self) -> &RetryExecutor {
        &self.retry
    }

    /// Walk the tree from `route` until a stage succeeds or the tree is exhausted
    pub async fn run(&self, route: Route, request: ChainRequest<'_>) -> Result<ChainSuccess, MediaError> {
        let primary = match route {
            Route::DirectMedia => Some(self.direct.as_ref().ok_or_else(|| {
                MediaError::ToolUnavailable("No direct transport configured".to_string())
            })?),
            Route::Extractor => Some(self.extractor.as_ref().ok_or_else(|| {
                MediaError::ToolUnavailable("No extractor configured".to_string())
            })?),
            Route::TlsFallback => None,
        };

        if let Some(strategy) = primary {
            match self.run_stage(strategy.as_ref(), &request, MediaError::is_retryable).await {
                Ok(success) => return Ok(success),
                Err(error) => {
                    let eligible = route == Route::DirectMedia || has_direct_media_extension(request.url);
                    if !(error.is_tls() && eligible) {
                        return Err(error);
                    }
                    warn!(
                        "{} failed on TLS for {}, entering fallback transports",
                        strategy.name(),
                        request.url
                    );
                }
            }
        }

        self.run_fallbacks(&request).await
    }

    async fn run_fallbacks(&self, request: &ChainRequest<'_>) -> Result<ChainSuccess, MediaError> {
        let mut stages: Vec<&Arc<dyn TransportStrategy>> = self.fallback.iter().collect();
        if self.settings.insecure_tls_fallback {
            stages.extend(self.degraded.iter());
        } else if !self.degraded.is_empty() {
            info!("Degraded TLS fallbacks disabled; enable insecure TLS fallback to allow them");
        }

        let mut last_error = None;
        for strategy in stages {
            // A TLS failure moves on to the next rung instead of repeating this one
            match self
                .run_stage(strategy.as_ref(), request, |e| e.is_retryable() && !e.is_tls())
                .await
            {
                Ok(success) => return Ok(success),
                Err(error) => {
                    warn!("Fallback {} failed: {}", strategy.name(), error);
                    last_error = Some(error);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            MediaError::Tls(format!("No fallback transport available for {}", request.url))
        }))
    }

    async fn run_stage<C>(
        &self,
        strategy: &dyn TransportStrategy,
        request: &ChainRequest<'_>,
        classify: C,
    ) -> Result<ChainSuccess, MediaError>
    where
        C: Fn(&MediaError) -> bool,
    {
        let trust = strategy.trust();
        if trust.is_degraded() {
            warn!(
                "Trying {} for {} with {} transport",
                strategy.name(),
                request.url,
                trust
            );
        } else {
            debug!("Trying {} for {}", strategy.name(), request.url);
        }
        if strategy.capability() == Capability::WithoutProgress {
            notify(request.progress, ProgressEvent::phase(Phase::Downloading));
        }

        let attempts = AtomicU32::new(0);
        let file = self
            .retry
            .execute_with_classifier(
                |attempt| {
                    attempts.store(attempt + 1, Ordering::Relaxed);
                    let profile = RequestProfile::for_attempt(&self.settings, attempt, strategy.tls_mode());
                    async move {
                        clear_dir(request.dest_dir)?;
                        let job = TransportJob {
                            url: request.url,
                            format: request.format,
                            postprocess: request.postprocess,
                            dest_dir: request.dest_dir,
                            profile: &profile,
                            progress: request.progress,
                        };
                        strategy.attempt(&job).await
                    }
                },
                classify,
            )
            .await?;

        let attempts = attempts.load(Ordering::Relaxed);
        info!(
            "{} fetched {} after {} attempt(s)",
            strategy.name(),
            request.url,
            attempts
        );
        Ok(ChainSuccess {
            file,
            strategy: strategy.kind(),
            trust,
            attempts,
        })
    }
}

/// Remove leftovers of a previous attempt
fn clear_dir(dir: &Path) -> Result<(), MediaError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            std::fs::remove_dir_all(&path)?;
        } else {
            std::fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Assembles a [`StrategyChain`]
pub struct StrategyChainBuilder {
    chain: StrategyChain,
}

impl StrategyChainBuilder {
    pub fn retry(mut self, retry: RetryExecutor) -> Self {
        self.chain.retry = retry;
        self
    }

    /// Primary stage for page URLs
    pub fn extractor(mut self, strategy: Arc<dyn TransportStrategy>) -> Self {
        self.chain.extractor = Some(strategy);
        self
    }

    /// Primary stage for probed media URLs
    pub fn direct(mut self, strategy: Arc<dyn TransportStrategy>) -> Self {
        self.chain.direct = Some(strategy);
        self
    }

    /// Append a verified fallback stage
    pub fn fallback(mut self, strategy: Arc<dyn TransportStrategy>) -> Self {
        self.chain.fallback.push(strategy);
        self
    }

    /// Append a degraded TLS stage, only run when insecure fallback is enabled
    pub fn degraded(mut self, strategy: Arc<dyn TransportStrategy>) -> Self {
        self.chain.degraded.push(strategy);
        self
    }

    pub fn build(self) -> StrategyChain {
        self.chain
    }
}
