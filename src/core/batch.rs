//! Batch downloads packaged into one archive

use crate::core::media::MediaRequest;
use crate::core::orchestrator::Orchestrator;
use crate::core::outcome::{Artifact, BatchResult, DownloadOutcome, TransportReport};
use crate::download::scratch::ScratchDir;
use crate::error::{ErrorKind, MediaError};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const DEFAULT_BATCH_CONCURRENCY: usize = 4;
pub const DEFAULT_MAX_BATCH: usize = 50;

/// One requested item; validated when it is processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchEntry {
    pub url: String,
    #[serde(default)]
    pub format: Option<String>,
}

impl BatchEntry {
    pub fn new(url: impl Into<String>, format: Option<String>) -> Self {
        Self {
            url: url.into(),
            format,
        }
    }
}

/// Per-item line of a packaged batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItemSummary {
    /// One-based position in the input
    pub index: usize,
    pub url: String,
    pub entry_name: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<TransportReport>,
}

/// Archive of a finished batch
#[derive(Debug)]
pub struct BatchPackage {
    pub archive: Artifact,
    pub items: Vec<BatchItemSummary>,
}

impl BatchPackage {
    pub fn failed(&self) -> usize {
        self.items.iter().filter(|item| !item.ok).count()
    }
}

/// Fans batch entries out to the orchestrator under a concurrency cap
pub struct BatchCoordinator {
    orchestrator: Arc<Orchestrator>,
    concurrency: usize,
    max_items: usize,
}

impl BatchCoordinator {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            concurrency: DEFAULT_BATCH_CONCURRENCY,
            max_items: DEFAULT_MAX_BATCH,
        }
    }

    /// Downloads in flight at once
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_max_items(mut self, max_items: usize) -> Self {
        self.max_items = max_items.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn max_items(&self) -> usize {
        self.max_items
    }

    fn check_size(&self, entries: &[BatchEntry]) -> Result<(), MediaError> {
        if entries.is_empty() {
            return Err(MediaError::InvalidInput("Batch contains no URLs".to_string()));
        }
        if entries.len() > self.max_items {
            return Err(MediaError::InvalidInput(format!(
                "Batch of {} items exceeds the limit of {}",
                entries.len(),
                self.max_items
            )));
        }
        Ok(())
    }

    /// Download every entry; outcomes come back in input order
    pub async fn run(&self, entries: &[BatchEntry]) -> Result<BatchResult, MediaError> {
        self.check_size(entries)?;
        info!(
            "Starting batch of {} items, {} at a time",
            entries.len(),
            self.concurrency
        );

        let outcomes = stream::iter(entries.iter().cloned().enumerate())
            .map(|(position, entry)| {
                let orchestrator = self.orchestrator.clone();
                async move {
                    match MediaRequest::parse(&entry.url, entry.format.as_deref()) {
                        Ok(request) => {
                            orchestrator
                                .download_indexed(&request, Some(position + 1), None)
                                .await
                        }
                        Err(error) => DownloadOutcome::failure(&error),
                    }
                }
            })
            .buffered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        Ok(outcomes)
    }

    /// Download every entry and pack successes and failure notes into one zip
    pub async fn download_batch(&self, entries: &[BatchEntry]) -> Result<BatchPackage, MediaError> {
        let outcomes = self.run(entries).await?;
        let urls: Vec<String> = entries.iter().map(|e| e.url.clone()).collect();

        let scratch = ScratchDir::create(self.orchestrator.scratch_root(), "mediafetch_batch_")?;
        let archive_path = scratch.path().join(archive_name(entries.len()));

        let target = archive_path.clone();
        let items = tokio::task::spawn_blocking(move || write_archive(&target, urls, outcomes))
            .await
            .map_err(|e| MediaError::Generic(format!("Archive task failed: {}", e)))??;

        let package = BatchPackage {
            archive: Artifact::new(scratch, archive_path, "application/zip")?,
            items,
        };
        info!(
            "Packed batch into {} ({} bytes, {} failed)",
            package.archive.file_name(),
            package.archive.byte_size(),
            package.failed()
        );
        Ok(package)
    }
}

/// Deterministic archive name for a batch of `count` items
pub fn archive_name(count: usize) -> String {
    format!("batch_{}_items.zip", count)
}

/// Archive entry name of a failed item
pub fn error_entry_name(index: usize) -> String {
    format!("{:03}_error.txt", index)
}

fn write_archive(
    path: &Path,
    urls: Vec<String>,
    outcomes: BatchResult,
) -> Result<Vec<BatchItemSummary>, MediaError> {
    let mut zip = ZipWriter::new(BufWriter::new(File::create(path)?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut items = Vec::with_capacity(outcomes.len());

    for (position, (url, outcome)) in urls.into_iter().zip(outcomes).enumerate() {
        let index = position + 1;
        let item = match outcome {
            DownloadOutcome::Success {
                artifact,
                transport,
            } => {
                let entry_name = artifact.file_name();
                zip.start_file(entry_name.as_str(), options)?;
                let mut source = File::open(artifact.local_path())?;
                std::io::copy(&mut source, &mut zip)?;
                drop(source);
                // Free the disk space as soon as the bytes are in the archive
                if let Err(e) = artifact.release() {
                    warn!("Failed to remove batch item scratch: {}", e);
                }
                BatchItemSummary {
                    index,
                    url,
                    entry_name,
                    ok: true,
                    kind: None,
                    message: None,
                    transport: Some(transport),
                }
            }
            DownloadOutcome::Failure { kind, message } => {
                let entry_name = error_entry_name(index);
                zip.start_file(entry_name.as_str(), options)?;
                write!(zip, "URL: {}\nKind: {}\nError: {}\n", url, kind, message)?;
                BatchItemSummary {
                    index,
                    url,
                    entry_name,
                    ok: false,
                    kind: Some(kind),
                    message: Some(message),
                    transport: None,
                }
            }
        };
        items.push(item);
    }

    let mut writer = zip.finish()?;
    writer.flush()?;
    Ok(items)
}
