//! Extractor collaborator: resolves sources and downloads selected streams

use crate::core::format_selector::Postprocess;
use crate::core::media::MediaInfo;
use crate::core::progress::{notify, Phase, ProgressEvent, ProgressSink, ProgressTracker};
use crate::download::accelerated::Accelerator;
use crate::download::profile::{RequestProfile, TlsMode};
use crate::download::scratch::ScratchDir;
use crate::download::strategy::{
    Capability, FetchedFile, StrategyKind, TransportJob, TransportStrategy,
};
use crate::download::tools::run_tool;
use crate::error::MediaError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

/// Marker prefixed to progress lines requested from the extractor
const PROGRESS_MARKER: &str = "mfprog";

/// Upper bound for a metadata lookup
const RESOLVE_LIMIT: Duration = Duration::from_secs(120);

/// Resolves a page URL into metadata and fetches the selected streams
#[async_trait]
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;

    /// Resolve metadata and available formats without downloading
    async fn resolve(&self, url: &str, profile: &RequestProfile) -> Result<MediaInfo, MediaError>;

    /// Download the selected streams into `job.dest_dir` and return the finished file
    async fn fetch(
        &self,
        job: &TransportJob<'_>,
        accelerator: Option<&Accelerator>,
    ) -> Result<PathBuf, MediaError>;
}

/// `yt-dlp` driven as a child process
#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    binary: PathBuf,
    ffmpeg: Option<PathBuf>,
}

impl YtDlpExtractor {
    /// Create a new extractor around the given binary
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            ffmpeg: None,
        }
    }

    /// Set ffmpeg location used for merging and transcoding
    pub fn with_ffmpeg(mut self, ffmpeg: Option<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn network_args(profile: &RequestProfile) -> Vec<String> {
        let mut args = vec![
            "--user-agent".to_string(),
            profile.user_agent().to_string(),
            "--socket-timeout".to_string(),
            profile.timeout().as_secs().max(1).to_string(),
        ];
        if let Some(proxy) = profile.proxy() {
            args.push("--proxy".to_string());
            args.push(proxy.to_string());
        }
        if profile.tls() == TlsMode::Unverified {
            args.push("--no-check-certificates".to_string());
        }
        if let Some(cookies) = profile.cookies() {
            args.extend(cookies.extractor_args());
        }
        args
    }

    /// Arguments of a metadata lookup
    pub fn resolve_args(url: &str, profile: &RequestProfile) -> Vec<String> {
        let mut args: Vec<String> = [
            "--dump-single-json",
            "--skip-download",
            "--no-playlist",
            "--no-warnings",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.extend(Self::network_args(profile));
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    /// Arguments of a download
    pub fn fetch_args(&self, job: &TransportJob<'_>, accelerator: Option<&Accelerator>) -> Vec<String> {
        let template = job.dest_dir.join("%(title).180B.%(ext)s");
        let mut args: Vec<String> = vec![
            "-f".to_string(),
            job.format.to_string(),
            "-o".to_string(),
            template.to_string_lossy().into_owned(),
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--no-mtime".to_string(),
            "--newline".to_string(),
            "--progress-template".to_string(),
            format!(
                "download:{} %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s %(progress.speed)s",
                PROGRESS_MARKER
            ),
            "--merge-output-format".to_string(),
            "mp4".to_string(),
        ];
        args.extend(Self::network_args(job.profile));

        if let Some(ffmpeg) = &self.ffmpeg {
            args.push("--ffmpeg-location".to_string());
            args.push(ffmpeg.to_string_lossy().into_owned());
        }

        if let Some(Postprocess::ExtractAudio {
            codec,
            bitrate_kbps,
        }) = job.postprocess
        {
            args.extend([
                "--extract-audio".to_string(),
                "--audio-format".to_string(),
                codec.to_string(),
                "--audio-quality".to_string(),
                format!("{}K", bitrate_kbps),
            ]);
        }

        if let Some(accelerator) = accelerator {
            args.push("--downloader".to_string());
            args.push(accelerator.binary().to_string_lossy().into_owned());
            args.push("--downloader-args".to_string());
            args.push(format!("aria2c:{}", accelerator.connection_args().join(" ")));
        }

        args.push("--".to_string());
        args.push(job.url.to_string());
        args
    }
}

#[async_trait]
impl Extractor for YtDlpExtractor {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    async fn resolve(&self, url: &str, profile: &RequestProfile) -> Result<MediaInfo, MediaError> {
        debug!("Resolving metadata for {}", url);
        let output = run_tool(&self.binary, Self::resolve_args(url, profile), RESOLVE_LIMIT).await?;

        if !output.status.success() {
            return Err(MediaError::from_tool_output(
                self.name(),
                &String::from_utf8_lossy(&output.stderr),
            ));
        }

        let info: MediaInfo = serde_json::from_slice(&output.stdout).map_err(|e| {
            MediaError::Extraction(format!("Unreadable metadata from {}: {}", self.name(), e))
        })?;
        info!("Resolved '{}' with {} formats", info.title, info.formats.len());
        Ok(info)
    }

    async fn fetch(
        &self,
        job: &TransportJob<'_>,
        accelerator: Option<&Accelerator>,
    ) -> Result<PathBuf, MediaError> {
        let args = self.fetch_args(job, accelerator);
        debug!("Running {} with {} arguments", self.name(), args.len());

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MediaError::ToolUnavailable(format!("Failed to start yt-dlp: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| MediaError::Generic("Failed to capture yt-dlp stdout".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| MediaError::Generic("Failed to capture yt-dlp stderr".to_string()))?;

        let stderr_task = tokio::spawn(async move {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf).await;
            buf
        });

        let mut tracker = ProgressTracker::new(job.progress.cloned(), None);
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines.next_line().await? {
            report_line(&mut tracker, job.progress, &line);
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(MediaError::from_tool_output(self.name(), &stderr));
        }

        ScratchDir::locate_in(job.dest_dir)
    }
}

/// Parsed extractor progress line
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorProgress {
    pub downloaded: u64,
    pub total: Option<u64>,
    pub speed: Option<f64>,
}

/// Parse a line produced by the progress template
pub fn parse_progress_line(line: &str) -> Option<ExtractorProgress> {
    let rest = line.trim().strip_prefix(PROGRESS_MARKER)?;
    let mut fields = rest.split_whitespace();

    let downloaded = parse_number(fields.next()?)? as u64;
    let total = fields.next().and_then(parse_number).map(|v| v as u64);
    let estimate = fields.next().and_then(parse_number).map(|v| v as u64);
    let speed = fields.next().and_then(parse_number);

    Some(ExtractorProgress {
        downloaded,
        total: total.or(estimate),
        speed,
    })
}

/// Forward one line of extractor output to the progress sink
fn report_line(tracker: &mut ProgressTracker, sink: Option<&ProgressSink>, line: &str) {
    if let Some(progress) = parse_progress_line(line) {
        tracker.update_with_rate(progress.downloaded, progress.total, progress.speed);
    } else if is_postprocess_line(line) {
        notify(sink, ProgressEvent::phase(Phase::Postprocessing));
    }
}

fn parse_number(field: &str) -> Option<f64> {
    if field == "NA" || field == "None" {
        return None;
    }
    field.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

fn is_postprocess_line(line: &str) -> bool {
    const STAGES: &[&str] = &["[Merger]", "[ExtractAudio]", "[VideoConvertor]", "[FixupM3u8]", "[FixupM4a]"];
    let line = line.trim_start();
    STAGES.iter().any(|stage| line.starts_with(stage))
}

/// Strategy that hands the whole download to the extractor
pub struct ExtractorStrategy {
    extractor: Arc<dyn Extractor>,
    accelerator: Option<Accelerator>,
}

impl ExtractorStrategy {
    pub fn new(extractor: Arc<dyn Extractor>) -> Self {
        Self {
            extractor,
            accelerator: None,
        }
    }

    /// Let the extractor delegate transfers to an accelerated downloader
    pub fn with_accelerator(mut self, accelerator: Option<Accelerator>) -> Self {
        self.accelerator = accelerator;
        self
    }
}

#[async_trait]
impl TransportStrategy for ExtractorStrategy {
    fn name(&self) -> &str {
        self.extractor.name()
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Extractor
    }

    fn capability(&self) -> Capability {
        Capability::WithProgress
    }

    async fn attempt(&self, job: &TransportJob<'_>) -> Result<FetchedFile, MediaError> {
        let path = self.extractor.fetch(job, self.accelerator.as_ref()).await?;
        Ok(FetchedFile {
            path,
            content_type: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::format_selector::{select_format, QualityLabel};
    use crate::download::profile::{CookieSource, TransportSettings};

    #[test]
    fn test_parse_progress_line() {
        let parsed = parse_progress_line("mfprog 1024 4096 NA 512.5").unwrap();
        assert_eq!(parsed.downloaded, 1024);
        assert_eq!(parsed.total, Some(4096));
        assert_eq!(parsed.speed, Some(512.5));

        let estimated = parse_progress_line("mfprog 10 NA 2000.0 NA").unwrap();
        assert_eq!(estimated.total, Some(2000));
        assert_eq!(estimated.speed, None);

        assert!(parse_progress_line("[youtube] abc: Downloading webpage").is_none());
        assert!(parse_progress_line("mfprog NA NA NA NA").is_none());
    }

    #[test]
    fn test_report_line_uses_extractor_speed() {
        let seen: Arc<std::sync::Mutex<Vec<ProgressEvent>>> = Arc::default();
        let sink: ProgressSink = {
            let seen = seen.clone();
            Arc::new(move |event: ProgressEvent| seen.lock().unwrap().push(event))
        };
        let mut tracker = ProgressTracker::new(Some(sink.clone()), None);

        for line in [
            "mfprog 1024 4096 NA 512.5",
            "mfprog 4096 4096 NA 2048.0",
            "mfprog 256 NA 8192.0 128.0",
            "[Merger] Merging formats into \"a.mp4\"",
            "[download] Destination: a.f140.m4a",
        ] {
            report_line(&mut tracker, Some(&sink), line);
        }

        let events = seen.lock().unwrap();
        let rates: Vec<Option<f64>> = events.iter().map(|e| e.rate).collect();
        assert_eq!(rates, vec![Some(512.5), Some(2048.0), Some(128.0), None]);
        assert_eq!(events[2].bytes_done, 256);
        assert_eq!(events[2].bytes_total, Some(8192));
        assert_eq!(events[3].phase, Phase::Postprocessing);
    }

    #[test]
    fn test_postprocess_detection() {
        assert!(is_postprocess_line("[Merger] Merging formats into \"a.mp4\""));
        assert!(is_postprocess_line("[ExtractAudio] Destination: a.mp3"));
        assert!(!is_postprocess_line("[download] 50.0% of 10MiB"));
    }

    #[test]
    fn test_resolve_args() {
        let profile = RequestProfile::for_attempt(&TransportSettings::default(), 0, TlsMode::Standard);
        let args = YtDlpExtractor::resolve_args("https://example.com/v", &profile);
        assert_eq!(args[0], "--dump-single-json");
        assert!(args.contains(&"--no-playlist".to_string()));
        assert_eq!(args[args.len() - 2], "--");
        assert_eq!(args.last().unwrap(), "https://example.com/v");
        assert!(!args.contains(&"--no-check-certificates".to_string()));
        assert!(!args.iter().any(|a| a.starts_with("--cookies")));

        let settings = TransportSettings {
            cookies: Some(CookieSource::Browser("firefox:default-release".to_string())),
            ..TransportSettings::default()
        };
        let profile = RequestProfile::for_attempt(&settings, 0, TlsMode::Standard);
        let joined = YtDlpExtractor::resolve_args("https://example.com/v", &profile).join(" ");
        assert!(joined.contains("--cookies-from-browser firefox:default-release"));

        let settings = TransportSettings {
            cookies: Some(CookieSource::File(PathBuf::from("/etc/mediafetch/cookies.txt"))),
            ..TransportSettings::default()
        };
        let profile = RequestProfile::for_attempt(&settings, 2, TlsMode::Standard);
        let args = YtDlpExtractor::resolve_args("https://example.com/v", &profile);
        let joined = args.join(" ");
        assert!(joined.contains("--cookies /etc/mediafetch/cookies.txt"));
        assert!(!joined.contains("--cookies-from-browser"));
        assert_eq!(args.last().unwrap(), "https://example.com/v");
    }

    #[test]
    fn test_fetch_args_for_mp3_with_accelerator() {
        let extractor = YtDlpExtractor::new("/usr/bin/yt-dlp")
            .with_ffmpeg(Some(PathBuf::from("/usr/bin/ffmpeg")));
        let settings = TransportSettings {
            proxy: Some("socks5://127.0.0.1:1080".to_string()),
            ..TransportSettings::default()
        };
        let profile = RequestProfile::for_attempt(&settings, 1, TlsMode::Standard);
        let expression = select_format(QualityLabel::AudioMp3);
        let dest = PathBuf::from("/tmp/scratch");
        let job = TransportJob {
            url: "https://example.com/v",
            format: expression.as_str(),
            postprocess: QualityLabel::AudioMp3.postprocess(),
            dest_dir: &dest,
            profile: &profile,
            progress: None,
        };
        let accelerator = Accelerator::new("/usr/bin/aria2c", 8);

        let args = extractor.fetch_args(&job, Some(&accelerator));
        let joined = args.join(" ");

        assert!(joined.contains("-f bestaudio/best"));
        assert!(joined.contains("--extract-audio --audio-format mp3 --audio-quality 192K"));
        assert!(joined.contains("--proxy socks5://127.0.0.1:1080"));
        assert!(joined.contains("--ffmpeg-location /usr/bin/ffmpeg"));
        assert!(joined.contains("--downloader /usr/bin/aria2c"));
        assert!(joined.contains("--downloader-args aria2c:-x 8 -s 8"));
        assert!(joined.contains("/tmp/scratch/%(title).180B.%(ext)s"));
        assert!(joined.contains("Edg/119"));
        assert_eq!(args.last().unwrap(), "https://example.com/v");
    }
}
