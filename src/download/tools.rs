//! Discovery and invocation of external tools

use crate::error::MediaError;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, info};

/// Upper bound for a single transfer run by an external tool
pub const TRANSFER_LIMIT: Duration = Duration::from_secs(2 * 60 * 60);

/// External programs the transport chain can drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    YtDlp,
    Aria2c,
    Curl,
    Wget,
    Ffmpeg,
}

impl ToolKind {
    pub const ALL: [ToolKind; 5] = [
        ToolKind::YtDlp,
        ToolKind::Aria2c,
        ToolKind::Curl,
        ToolKind::Wget,
        ToolKind::Ffmpeg,
    ];

    pub fn binary_name(&self) -> &'static str {
        match self {
            ToolKind::YtDlp => "yt-dlp",
            ToolKind::Aria2c => "aria2c",
            ToolKind::Curl => "curl",
            ToolKind::Wget => "wget",
            ToolKind::Ffmpeg => "ffmpeg",
        }
    }
}

/// Paths of the tools found on this host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Toolbox {
    pub yt_dlp: Option<PathBuf>,
    pub aria2c: Option<PathBuf>,
    pub curl: Option<PathBuf>,
    pub wget: Option<PathBuf>,
    pub ffmpeg: Option<PathBuf>,
}

impl Toolbox {
    /// Look every tool up on `PATH`
    pub fn discover() -> Self {
        let mut toolbox = Self::default();
        for kind in ToolKind::ALL {
            let found = which::which(kind.binary_name()).ok();
            match &found {
                Some(path) => info!("Found {} at {}", kind.binary_name(), path.display()),
                None => debug!("{} not found on PATH", kind.binary_name()),
            }
            toolbox.set(kind, found);
        }
        toolbox
    }

    /// Override a tool location, e.g. from configuration
    pub fn with(mut self, kind: ToolKind, path: impl Into<PathBuf>) -> Self {
        self.set(kind, Some(path.into()));
        self
    }

    pub fn get(&self, kind: ToolKind) -> Option<&Path> {
        let slot = match kind {
            ToolKind::YtDlp => &self.yt_dlp,
            ToolKind::Aria2c => &self.aria2c,
            ToolKind::Curl => &self.curl,
            ToolKind::Wget => &self.wget,
            ToolKind::Ffmpeg => &self.ffmpeg,
        };
        slot.as_deref()
    }

    fn set(&mut self, kind: ToolKind, path: Option<PathBuf>) {
        let slot = match kind {
            ToolKind::YtDlp => &mut self.yt_dlp,
            ToolKind::Aria2c => &mut self.aria2c,
            ToolKind::Curl => &mut self.curl,
            ToolKind::Wget => &mut self.wget,
            ToolKind::Ffmpeg => &mut self.ffmpeg,
        };
        *slot = path;
    }
}

/// Run a tool to completion, capturing its output.
///
/// The child is killed if the returned future is dropped or `limit` elapses.
pub async fn run_tool<I, S>(program: &Path, args: I, limit: Duration) -> Result<Output, MediaError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let tool = program.display().to_string();
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| MediaError::ToolUnavailable(format!("Failed to start {}: {}", tool, e)))?;

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| MediaError::Generic(format!("Failed to capture stdout from {}", tool)))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| MediaError::Generic(format!("Failed to capture stderr from {}", tool)))?;

    let collect = async {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let (out, err) = tokio::join!(
            stdout_pipe.read_to_end(&mut stdout),
            stderr_pipe.read_to_end(&mut stderr)
        );
        out?;
        err?;
        let status = child.wait().await?;
        Ok::<Output, std::io::Error>(Output {
            status,
            stdout,
            stderr,
        })
    };

    match tokio::time::timeout(limit, collect).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(MediaError::Transport(format!(
            "{} timed out after {}s",
            tool,
            limit.as_secs()
        ))),
    }
}
