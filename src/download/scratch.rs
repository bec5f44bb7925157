//! Per-invocation scratch directories

use crate::error::MediaError;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::TempDir;
use tracing::debug;
use walkdir::WalkDir;

/// Suffixes of files a tool leaves behind while still writing
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl", ".aria2", ".tmp", ".temp"];

/// Temporary directory exclusively owned by one download.
///
/// The directory and everything in it is removed when the value is released
/// or dropped, whichever happens first.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a fresh directory below `root`
    pub fn create(root: &Path, prefix: &str) -> Result<Self, MediaError> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new().prefix(prefix).tempdir_in(root)?;
        debug!("Allocated scratch directory {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Delete the directory now, reporting any IO error
    pub fn release(self) -> std::io::Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        debug!("Released scratch directory {}", path.display());
        Ok(())
    }

    /// Find the finished file a tool produced, newest first
    pub fn locate_artifact(&self) -> Result<PathBuf, MediaError> {
        Self::locate_in(self.path())
    }

    /// Same lookup for a directory the caller only borrows
    pub fn locate_in(dir: &Path) -> Result<PathBuf, MediaError> {
        let mut newest: Option<(SystemTime, PathBuf)> = None;

        for entry in WalkDir::new(dir).into_iter().filter_map(Result::ok) {
            if !entry.file_type().is_file() || is_partial(entry.path()) {
                continue;
            }
            let modified = entry
                .metadata()
                .ok()
                .and_then(|m| m.modified().ok())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            if newest.as_ref().map_or(true, |(seen, _)| modified >= *seen) {
                newest = Some((modified, entry.into_path()));
            }
        }

        newest
            .map(|(_, path)| path)
            .ok_or_else(|| MediaError::Extraction("Downloaded file not found".to_string()))
    }
}

fn is_partial(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    PARTIAL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}
