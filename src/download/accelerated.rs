//! Multi-connection downloads through aria2c

use crate::download::profile::TlsMode;
use crate::download::strategy::{
    target_file_name, Capability, FetchedFile, StrategyKind, TransportJob, TransportStrategy,
};
use crate::download::tools::{run_tool, TRANSFER_LIMIT};
use crate::error::MediaError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Location and connection count of the accelerated downloader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accelerator {
    binary: PathBuf,
    connections: u32,
}

impl Accelerator {
    pub fn new(binary: impl Into<PathBuf>, connections: u32) -> Self {
        Self {
            binary: binary.into(),
            connections: connections.clamp(1, 16),
        }
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn connections(&self) -> u32 {
        self.connections
    }

    /// Split and connection flags, also handed to the extractor
    pub fn connection_args(&self) -> Vec<String> {
        let n = self.connections.to_string();
        vec![
            "-x".to_string(),
            n.clone(),
            "-s".to_string(),
            n,
            "-k".to_string(),
            "1M".to_string(),
        ]
    }
}

/// Fetch the URL directly with aria2c
pub struct AcceleratedStrategy {
    accelerator: Accelerator,
}

impl AcceleratedStrategy {
    pub fn new(accelerator: Accelerator) -> Self {
        Self { accelerator }
    }

    pub fn args(&self, job: &TransportJob<'_>, file_name: &str) -> Vec<String> {
        let mut args = self.accelerator.connection_args();
        args.extend([
            "--dir".to_string(),
            job.dest_dir.to_string_lossy().into_owned(),
            "--out".to_string(),
            file_name.to_string(),
            "--user-agent".to_string(),
            job.profile.user_agent().to_string(),
            "--timeout".to_string(),
            job.profile.timeout().as_secs().max(1).to_string(),
            "--allow-overwrite=true".to_string(),
            "--auto-file-renaming=false".to_string(),
            "--console-log-level=warn".to_string(),
            "--summary-interval=0".to_string(),
        ]);
        if let Some(proxy) = job.profile.proxy() {
            args.push(format!("--all-proxy={}", proxy));
        }
        if job.profile.tls() == TlsMode::Unverified {
            args.push("--check-certificate=false".to_string());
        }
        args.push(job.url.to_string());
        args
    }
}

#[async_trait]
impl TransportStrategy for AcceleratedStrategy {
    fn name(&self) -> &str {
        "aria2c"
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Accelerated
    }

    fn capability(&self) -> Capability {
        Capability::WithoutProgress
    }

    async fn attempt(&self, job: &TransportJob<'_>) -> Result<FetchedFile, MediaError> {
        let file_name = target_file_name(job.url);
        debug!(
            "aria2c fetching {} with {} connections",
            job.url,
            self.accelerator.connections()
        );

        let output = run_tool(self.accelerator.binary(), self.args(job, &file_name), TRANSFER_LIMIT).await?;
        if !output.status.success() {
            // aria2c reports errors on stdout
            let mut diagnostics = String::from_utf8_lossy(&output.stderr).into_owned();
            diagnostics.push('\n');
            diagnostics.push_str(&String::from_utf8_lossy(&output.stdout));
            return Err(MediaError::from_tool_output(self.name(), &diagnostics));
        }

        let path = job.dest_dir.join(&file_name);
        if !path.is_file() {
            return Err(MediaError::Extraction("Downloaded file not found".to_string()));
        }
        Ok(FetchedFile {
            path,
            content_type: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::profile::{RequestProfile, TransportSettings};

    #[test]
    fn test_connection_args_clamped() {
        assert_eq!(Accelerator::new("aria2c", 0).connections(), 1);
        assert_eq!(Accelerator::new("aria2c", 64).connections(), 16);
        assert_eq!(
            Accelerator::new("aria2c", 4).connection_args().join(" "),
            "-x 4 -s 4 -k 1M"
        );
    }

    #[test]
    fn test_args_include_destination_and_url() {
        let settings = TransportSettings {
            proxy: Some("http://10.0.0.1:3128".to_string()),
            ..TransportSettings::default()
        };
        let profile = RequestProfile::for_attempt(&settings, 0, TlsMode::Standard);
        let dest = PathBuf::from("/tmp/scratch");
        let job = TransportJob {
            url: "https://cdn.example.com/clip.mp4",
            format: "best",
            postprocess: None,
            dest_dir: &dest,
            profile: &profile,
            progress: None,
        };
        let strategy = AcceleratedStrategy::new(Accelerator::new("/usr/bin/aria2c", 8));

        let args = strategy.args(&job, "clip.mp4");
        let joined = args.join(" ");
        assert!(joined.starts_with("-x 8 -s 8"));
        assert!(joined.contains("--dir /tmp/scratch --out clip.mp4"));
        assert!(joined.contains("--all-proxy=http://10.0.0.1:3128"));
        assert!(!joined.contains("--check-certificate=false"));
        assert_eq!(args.last().unwrap(), "https://cdn.example.com/clip.mp4");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_tool_is_classified() {
        let root = tempfile::tempdir().unwrap();
        let profile = RequestProfile::for_attempt(&TransportSettings::default(), 0, TlsMode::Standard);
        let job = TransportJob {
            url: "https://cdn.example.com/clip.mp4",
            format: "best",
            postprocess: None,
            dest_dir: root.path(),
            profile: &profile,
            progress: None,
        };
        // `false` on PATH ignores its arguments and exits 1
        let strategy = AcceleratedStrategy::new(Accelerator::new("false", 2));
        let err = strategy.attempt(&job).await.unwrap_err();
        assert!(matches!(err, MediaError::Extraction(_)));
    }
}
