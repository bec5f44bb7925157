//! Results of download orchestration

use crate::download::profile::TransportTrust;
use crate::download::scratch::ScratchDir;
use crate::download::strategy::StrategyKind;
use crate::error::{ErrorKind, MediaError};
use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

/// Downloaded file together with the scratch directory that holds it.
///
/// Dropping or releasing the artifact deletes both.
#[derive(Debug)]
pub struct Artifact {
    path: PathBuf,
    byte_size: u64,
    container_mime: String,
    scratch: ScratchDir,
}

impl Artifact {
    /// Wrap a file that lives inside `scratch`
    pub fn new(scratch: ScratchDir, path: PathBuf, container_mime: impl Into<String>) -> Result<Self, MediaError> {
        let byte_size = std::fs::metadata(&path)?.len();
        Ok(Self {
            path,
            byte_size,
            container_mime: container_mime.into(),
            scratch,
        })
    }

    pub fn local_path(&self) -> &Path {
        &self.path
    }

    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    pub fn container_mime(&self) -> &str {
        &self.container_mime
    }

    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download".to_string())
    }

    /// Delete the file and its scratch directory now
    pub fn release(self) -> Result<(), MediaError> {
        self.scratch.release()?;
        Ok(())
    }

    /// Move the file to `dest` and delete the scratch directory
    pub async fn persist_to(self, dest: &Path) -> Result<PathBuf, MediaError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if tokio::fs::rename(&self.path, dest).await.is_err() {
            // Different filesystem
            tokio::fs::copy(&self.path, dest).await?;
        }
        if let Err(e) = self.scratch.release() {
            warn!("Failed to remove scratch directory: {}", e);
        }
        Ok(dest.to_path_buf())
    }

    /// Stream the file contents; the scratch directory goes away with the stream
    pub async fn into_stream(self) -> Result<ArtifactStream, MediaError> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(ArtifactStream {
            inner: ReaderStream::new(file),
            _artifact: self,
        })
    }
}

/// Byte stream over an [`Artifact`]
pub struct ArtifactStream {
    inner: ReaderStream<tokio::fs::File>,
    _artifact: Artifact,
}

impl Stream for ArtifactStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for ArtifactStream {
    fn drop(&mut self) {
        debug!("Artifact stream for {} closed", self._artifact.file_name());
    }
}

/// How an artifact was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TransportReport {
    pub strategy: StrategyKind,
    pub trust: TransportTrust,
    /// Attempts spent in the successful stage
    pub attempts: u32,
}

/// Result of one orchestration
#[derive(Debug)]
pub enum DownloadOutcome {
    Success {
        artifact: Artifact,
        transport: TransportReport,
    },
    Failure {
        kind: ErrorKind,
        /// Sanitized, single line
        message: String,
    },
}

impl DownloadOutcome {
    pub fn failure(error: &MediaError) -> Self {
        DownloadOutcome::Failure {
            kind: error.kind(),
            message: error.sanitized_message(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DownloadOutcome::Success { .. })
    }

    /// Convert into a `Result`, keeping the failure kind
    pub fn into_result(self) -> Result<(Artifact, TransportReport), (ErrorKind, String)> {
        match self {
            DownloadOutcome::Success {
                artifact,
                transport,
            } => Ok((artifact, transport)),
            DownloadOutcome::Failure { kind, message } => Err((kind, message)),
        }
    }
}

/// Outcomes of a batch, index-aligned with its input
pub type BatchResult = Vec<DownloadOutcome>;

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    fn artifact_with(contents: &[u8]) -> (tempfile::TempDir, Artifact) {
        let root = tempfile::tempdir().unwrap();
        let scratch = ScratchDir::create(root.path(), "mf_").unwrap();
        let path = scratch.path().join("clip.mp4");
        std::fs::write(&path, contents).unwrap();
        let artifact = Artifact::new(scratch, path, "video/mp4").unwrap();
        (root, artifact)
    }

    #[tokio::test]
    async fn test_stream_removes_scratch_when_finished() {
        let (_root, artifact) = artifact_with(b"0123456789");
        assert_eq!(artifact.byte_size(), 10);
        let dir = artifact.local_path().parent().unwrap().to_path_buf();

        let mut stream = artifact.into_stream().await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"0123456789");
        assert!(dir.exists());

        drop(stream);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_abandoned_stream_removes_scratch() {
        let (_root, artifact) = artifact_with(&[7u8; 4096]);
        let dir = artifact.local_path().parent().unwrap().to_path_buf();

        let mut stream = artifact.into_stream().await.unwrap();
        let _ = stream.next().await;
        drop(stream);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_persist_moves_file_out() {
        let (root, artifact) = artifact_with(b"data");
        let dir = artifact.local_path().parent().unwrap().to_path_buf();
        let dest = root.path().join("out").join("clip.mp4");

        let saved = artifact.persist_to(&dest).await.unwrap();
        assert_eq!(std::fs::read(&saved).unwrap(), b"data");
        assert!(!dir.exists());
    }

    #[test]
    fn test_failure_message_is_sanitized() {
        let err = MediaError::Extraction("\u{1b}[0;31mERROR:\u{1b}[0m Video unavailable\nmore".to_string());
        match DownloadOutcome::failure(&err) {
            DownloadOutcome::Failure { kind, message } => {
                assert_eq!(kind, ErrorKind::FatalExtraction);
                assert!(!message.contains('\u{1b}'));
                assert!(!message.contains('\n'));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
