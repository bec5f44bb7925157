//! Generic command line fetchers

use crate::download::profile::TlsMode;
use crate::download::strategy::{
    target_file_name, Capability, FetchedFile, StrategyKind, TransportJob, TransportStrategy,
};
use crate::download::tools::{run_tool, ToolKind, TRANSFER_LIMIT};
use crate::error::MediaError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Which fetcher a [`CliToolStrategy`] drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fetcher {
    Curl,
    Wget,
}

impl Fetcher {
    pub fn tool(&self) -> ToolKind {
        match self {
            Fetcher::Curl => ToolKind::Curl,
            Fetcher::Wget => ToolKind::Wget,
        }
    }
}

/// Save the URL with curl or wget
pub struct CliToolStrategy {
    fetcher: Fetcher,
    binary: PathBuf,
}

impl CliToolStrategy {
    pub fn new(fetcher: Fetcher, binary: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            binary: binary.into(),
        }
    }

    pub fn args(&self, job: &TransportJob<'_>, output: &Path) -> Vec<String> {
        let timeout = job.profile.timeout().as_secs().max(1).to_string();
        let output = output.to_string_lossy().into_owned();
        let insecure = job.profile.tls() == TlsMode::Unverified;

        let mut args: Vec<String> = match self.fetcher {
            Fetcher::Curl => {
                let mut args = vec![
                    "-L".to_string(),
                    "--fail".to_string(),
                    "-sS".to_string(),
                    "--connect-timeout".to_string(),
                    timeout,
                    "-A".to_string(),
                    job.profile.user_agent().to_string(),
                    "-o".to_string(),
                    output,
                ];
                if let Some(proxy) = job.profile.proxy() {
                    args.push("--proxy".to_string());
                    args.push(proxy.to_string());
                }
                if insecure {
                    args.push("--insecure".to_string());
                }
                args
            }
            Fetcher::Wget => {
                let mut args = vec![
                    "-q".to_string(),
                    format!("--timeout={}", timeout),
                    format!("--user-agent={}", job.profile.user_agent()),
                    "-O".to_string(),
                    output,
                ];
                if let Some(proxy) = job.profile.proxy() {
                    args.push("-e".to_string());
                    args.push("use_proxy=yes".to_string());
                    args.push("-e".to_string());
                    args.push(format!("https_proxy={}", proxy));
                }
                if insecure {
                    args.push("--no-check-certificate".to_string());
                }
                args
            }
        };
        args.push(job.url.to_string());
        args
    }
}

#[async_trait]
impl TransportStrategy for CliToolStrategy {
    fn name(&self) -> &str {
        self.fetcher.tool().binary_name()
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::CliTool
    }

    fn capability(&self) -> Capability {
        Capability::WithoutProgress
    }

    async fn attempt(&self, job: &TransportJob<'_>) -> Result<FetchedFile, MediaError> {
        let path = job.dest_dir.join(target_file_name(job.url));
        debug!("{} fetching {}", self.name(), job.url);

        let output = run_tool(&self.binary, self.args(job, &path), TRANSFER_LIMIT).await?;
        if !output.status.success() {
            return Err(MediaError::from_tool_output(
                self.name(),
                &String::from_utf8_lossy(&output.stderr),
            ));
        }

        let written = tokio::fs::metadata(&path).await.map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            return Err(MediaError::Extraction(format!("{} produced an empty file", self.name())));
        }
        Ok(FetchedFile {
            path,
            content_type: None,
        })
    }
}
