//! Transport strategy abstraction

use crate::core::format_selector::Postprocess;
use crate::core::progress::ProgressSink;
use crate::download::profile::{RequestProfile, TlsMode, TransportTrust};
use crate::error::MediaError;
use crate::utils::filename::{is_safe_filename, to_safe_filename};
use crate::utils::url::filename_from_url;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

/// Which strategy produced a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Extractor collaborator
    Extractor,
    /// Multi-connection external downloader
    Accelerated,
    /// Direct HTTP streaming
    Direct,
    /// Generic command line fetcher (curl, wget)
    CliTool,
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::Extractor => "extractor",
            StrategyKind::Accelerated => "accelerated",
            StrategyKind::Direct => "direct",
            StrategyKind::CliTool => "cli_tool",
        };
        f.write_str(name)
    }
}

/// Whether a strategy reports byte progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    WithProgress,
    WithoutProgress,
}

/// Everything a strategy needs for one attempt
pub struct TransportJob<'a> {
    pub url: &'a str,
    /// Format expression or explicit format id
    pub format: &'a str,
    pub postprocess: Option<Postprocess>,
    /// Directory the file must land in
    pub dest_dir: &'a Path,
    pub profile: &'a RequestProfile,
    pub progress: Option<&'a ProgressSink>,
}

/// File produced by a successful attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    pub path: PathBuf,
    pub content_type: Option<String>,
}

/// One way of getting bytes from a URL onto local disk
#[async_trait]
pub trait TransportStrategy: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    fn kind(&self) -> StrategyKind;

    fn capability(&self) -> Capability;

    /// TLS mode the attempt profile must carry
    fn tls_mode(&self) -> TlsMode {
        TlsMode::Standard
    }

    fn trust(&self) -> TransportTrust {
        self.tls_mode().trust()
    }

    /// Perform one attempt
    async fn attempt(&self, job: &TransportJob<'_>) -> Result<FetchedFile, MediaError>;
}

/// File name a non-extractor strategy writes to
pub fn target_file_name(url: &str) -> String {
    filename_from_url(url)
        .map(|name| to_safe_filename(&name, ""))
        .filter(|name| is_safe_filename(name))
        .unwrap_or_else(|| "download".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_file_name() {
        assert_eq!(target_file_name("https://cdn.example.com/media/clip%20one.mp4?sig=1"), "clip one.mp4");
        assert_eq!(target_file_name("https://cdn.example.com/"), "download");
    }

    #[test]
    fn test_strategy_kind_display() {
        assert_eq!(StrategyKind::CliTool.to_string(), "cli_tool");
        assert_eq!(
            serde_json::to_string(&StrategyKind::Accelerated).unwrap(),
            "\"accelerated\""
        );
    }
}
