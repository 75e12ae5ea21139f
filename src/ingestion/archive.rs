//! Zip archive expansion.
//!
//! Entries are extracted one at a time into a private scratch directory, in central-directory
//! order, and each is opened through [`open_row_source`]. Only one extracted entry exists on disk
//! at a time. The archive handle and scratch directory are dropped once the entries run out, on
//! the first error, or when the expansion itself is dropped.

use std::collections::VecDeque;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, info, warn};
use zip::ZipArchive;

use crate::config::IngestionConfig;
use crate::error::{IngestionError, IngestionResult};

use super::factory::{is_archive_extension, open_row_source, FileFormat};
use super::source::RowSource;

/// One row source per item.
pub type SourceIter = Box<dyn Iterator<Item = IngestionResult<Box<dyn RowSource>>> + Send>;

/// Lazy iterator over the tabular entries of a zip archive.
pub struct ArchiveExpansion {
    path: PathBuf,
    sheet: Option<String>,
    config: IngestionConfig,
    archive: Option<ZipArchive<File>>,
    scratch: Option<TempDir>,
    pending: VecDeque<(usize, String)>,
    extracted: Option<PathBuf>,
}

impl ArchiveExpansion {
    /// Open the archive, create the scratch directory and list eligible entries.
    ///
    /// Directories and entries with an unrecognized extension are skipped here.
    pub fn open(path: impl AsRef<Path>, sheet: Option<&str>, config: &IngestionConfig) -> IngestionResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| IngestionError::acquisition(path, e))?;
        let mut archive = ZipArchive::new(file).map_err(|e| IngestionError::acquisition(path, e))?;
        let pending = eligible_entries(&mut archive).map_err(|e| IngestionError::acquisition(path, e))?;

        let scratch = match config.scratch_dir.as_deref() {
            Some(dir) => tempfile::Builder::new().prefix("archive-").tempdir_in(dir),
            None => tempfile::Builder::new().prefix("archive-").tempdir(),
        }
        .map_err(|e| IngestionError::acquisition(path, e))?;

        info!(
            path = %path.display(),
            entries = archive.len(),
            eligible = pending.len(),
            scratch = %scratch.path().display(),
            "archive opened"
        );
        Ok(Self {
            path: path.to_path_buf(),
            sheet: sheet.map(str::to_string),
            config: config.clone(),
            archive: Some(archive),
            scratch: Some(scratch),
            pending,
            extracted: None,
        })
    }

    /// Entries not yet handed out.
    pub fn remaining(&self) -> usize {
        self.pending.len()
    }

    /// `true` once the archive and scratch directory have been released.
    pub fn is_released(&self) -> bool {
        self.archive.is_none() && self.scratch.is_none()
    }

    fn extract(&mut self, index: usize, name: &str) -> IngestionResult<PathBuf> {
        let (Some(archive), Some(scratch)) = (self.archive.as_mut(), self.scratch.as_ref()) else {
            return Err(IngestionError::InvalidRequest {
                message: "archive already released".to_string(),
            });
        };
        let target = scratch.path().join(format!("{index}_{name}"));
        let mut entry = archive.by_index(index)?;
        let mut out = File::create(&target)?;
        let bytes = io::copy(&mut entry, &mut out)?;
        debug!(archive = %self.path.display(), entry = name, bytes, "entry extracted");
        Ok(target)
    }

    fn remove_extracted(&mut self) {
        if let Some(prev) = self.extracted.take() {
            if let Err(e) = std::fs::remove_file(&prev) {
                debug!(path = %prev.display(), error = %e, "could not remove extracted entry");
            }
        }
    }

    fn release(&mut self) {
        self.remove_extracted();
        self.pending.clear();
        self.archive = None;
        if let Some(dir) = self.scratch.take() {
            let shown = dir.path().display().to_string();
            if let Err(e) = dir.close() {
                warn!(scratch = %shown, error = %e, "failed to remove scratch directory");
            }
        }
    }
}

impl Iterator for ArchiveExpansion {
    type Item = IngestionResult<Box<dyn RowSource>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.remove_extracted();
        let Some((index, name)) = self.pending.pop_front() else {
            if !self.is_released() {
                debug!(archive = %self.path.display(), "archive exhausted");
                self.release();
            }
            return None;
        };

        let opened = self.extract(index, &name).and_then(|target| {
            self.extracted = Some(target.clone());
            open_row_source(&target, self.sheet.as_deref(), &self.config)
        });
        if opened.is_err() {
            warn!(archive = %self.path.display(), entry = %name, "archive entry failed; releasing archive");
            self.release();
        }
        Some(opened)
    }
}

impl Drop for ArchiveExpansion {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ArchiveExpansion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveExpansion")
            .field("path", &self.path)
            .field("remaining", &self.pending.len())
            .field("released", &self.is_released())
            .finish()
    }
}

fn eligible_entries(archive: &mut ZipArchive<File>) -> IngestionResult<VecDeque<(usize, String)>> {
    let mut pending = VecDeque::new();
    for index in 0..archive.len() {
        let entry = archive.by_index(index)?;
        if entry.is_dir() {
            continue;
        }
        let Some(name) = entry
            .enclosed_name()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
        else {
            warn!(entry = entry.name(), "skipping archive entry with unsafe path");
            continue;
        };
        if FileFormat::from_path(Path::new(&name)).is_none() {
            info!(entry = entry.name(), "skipping unsupported archive entry");
            continue;
        }
        pending.push_back((index, name));
    }
    Ok(pending)
}

/// Row sources for `path`: one per eligible entry when it is a zip archive, else exactly one.
///
/// A plain file is opened eagerly, so unsupported formats fail here.
pub fn extract_sources(path: impl AsRef<Path>, sheet: Option<&str>, config: &IngestionConfig) -> IngestionResult<SourceIter> {
    let path = path.as_ref();
    let is_archive = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(is_archive_extension);
    if is_archive {
        return Ok(Box::new(ArchiveExpansion::open(path, sheet, config)?));
    }
    let source = open_row_source(path, sheet, config)?;
    Ok(Box::new(std::iter::once(Ok(source))))
}
