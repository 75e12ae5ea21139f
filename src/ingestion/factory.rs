//! Reader selection.
//!
//! [`select_reader`] is a pure function of `(format, size, threshold)`; [`open_row_source`] applies
//! it to a path and opens the chosen implementation.

use std::path::Path;

use tracing::debug;

use crate::config::IngestionConfig;
use crate::error::{IngestionError, IngestionResult};

use super::cells::CellStreamRowSource;
use super::csv::DelimitedRowSource;
use super::excel::WorkbookRowSource;
use super::source::{ReaderKind, RowSource};

/// Recognized tabular formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    Csv,
    Tsv,
    Xls,
    Xlsb,
    Xlsx,
}

impl FileFormat {
    /// Parse a format from a file extension (case-insensitive, without the dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_uppercase().as_str() {
            "CSV" => Some(Self::Csv),
            "TSV" => Some(Self::Tsv),
            "XLS" => Some(Self::Xls),
            "XLSB" => Some(Self::Xlsb),
            "XLSX" => Some(Self::Xlsx),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension().and_then(|e| e.to_str()).and_then(Self::from_extension)
    }

    /// Binary spreadsheet formats carry named sheets.
    pub fn is_workbook(self) -> bool {
        matches!(self, Self::Xls | Self::Xlsb | Self::Xlsx)
    }
}

/// `true` for extensions handled by archive expansion.
pub fn is_archive_extension(ext: &str) -> bool {
    ext.eq_ignore_ascii_case("zip")
}

/// Facts about an input file that drive reader dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileClassification {
    /// Upper-cased extension, empty when the path has none.
    pub extension: String,
    pub is_archive_member: bool,
    pub size_bytes: u64,
}

impl FileClassification {
    /// Classify `path` from its extension and on-disk size.
    pub fn of(path: &Path, is_archive_member: bool) -> IngestionResult<Self> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_uppercase)
            .unwrap_or_default();
        let size_bytes = std::fs::metadata(path)
            .map_err(|e| IngestionError::acquisition(path, e))?
            .len();
        Ok(Self {
            extension,
            is_archive_member,
            size_bytes,
        })
    }

    pub fn format(&self) -> Option<FileFormat> {
        FileFormat::from_extension(&self.extension)
    }
}

/// Pick the reader implementation for a file.
///
/// | Format | Reader |
/// |---|---|
/// | CSV | [`ReaderKind::Delimited`] |
/// | TSV, XLS, XLSB | [`ReaderKind::CellStream`] |
/// | XLSX | [`ReaderKind::CellStream`] when `size_bytes >= xlsx_threshold`, else [`ReaderKind::InMemoryWorkbook`] |
pub fn select_reader(format: FileFormat, size_bytes: u64, xlsx_threshold: u64) -> ReaderKind {
    match format {
        FileFormat::Csv => ReaderKind::Delimited,
        FileFormat::Tsv | FileFormat::Xls | FileFormat::Xlsb => ReaderKind::CellStream,
        FileFormat::Xlsx if size_bytes >= xlsx_threshold => ReaderKind::CellStream,
        FileFormat::Xlsx => ReaderKind::InMemoryWorkbook,
    }
}

/// Open the right [`RowSource`] for `path`.
///
/// Fails with [`IngestionError::UnsupportedFormat`] for unknown extensions and with
/// [`IngestionError::ResourceAcquisition`] when the file cannot be opened or parsed.
pub fn open_row_source(
    path: impl AsRef<Path>,
    sheet: Option<&str>,
    config: &IngestionConfig,
) -> IngestionResult<Box<dyn RowSource>> {
    let path = path.as_ref();
    let Some(format) = FileFormat::from_path(path) else {
        return Err(unsupported(path));
    };
    let class = FileClassification::of(path, false)?;
    let kind = select_reader(format, class.size_bytes, config.xlsx_streaming_threshold_bytes);
    debug!(path = %path.display(), ?format, ?kind, size = class.size_bytes, "selected reader");

    Ok(match kind {
        ReaderKind::Delimited => Box::new(DelimitedRowSource::open(path)?),
        ReaderKind::CellStream => Box::new(CellStreamRowSource::open(path, format, sheet, config.row_buffer)?),
        ReaderKind::InMemoryWorkbook => Box::new(WorkbookRowSource::open(path, sheet)?),
    })
}

pub(crate) fn unsupported(path: &Path) -> IngestionError {
    IngestionError::UnsupportedFormat {
        extension: path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_string(),
        path: path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn extensions_are_case_insensitive() {
        assert_eq!(FileFormat::from_extension("csv"), Some(FileFormat::Csv));
        assert_eq!(FileFormat::from_extension("XlSx"), Some(FileFormat::Xlsx));
        assert_eq!(FileFormat::from_extension("txt"), None);
        assert!(is_archive_extension("ZIP"));
        assert!(!is_archive_extension("gz"));
    }

    #[test]
    fn dispatch_table() {
        assert_eq!(select_reader(FileFormat::Csv, 10 * MIB, MIB), ReaderKind::Delimited);
        assert_eq!(select_reader(FileFormat::Tsv, 0, MIB), ReaderKind::CellStream);
        assert_eq!(select_reader(FileFormat::Xls, 0, MIB), ReaderKind::CellStream);
        assert_eq!(select_reader(FileFormat::Xlsb, 0, MIB), ReaderKind::CellStream);
        assert_eq!(select_reader(FileFormat::Xlsx, MIB - 1, MIB), ReaderKind::InMemoryWorkbook);
        assert_eq!(select_reader(FileFormat::Xlsx, MIB, MIB), ReaderKind::CellStream);
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let err = open_row_source("notes.txt", None, &IngestionConfig::default()).unwrap_err();
        match err {
            IngestionError::UnsupportedFormat { extension, .. } => assert_eq!(extension, "txt"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn classification_reads_size_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.Csv");
        std::fs::write(&path, "x\n1\n").unwrap();
        let class = FileClassification::of(&path, true).unwrap();
        assert_eq!(class.extension, "CSV");
        assert_eq!(class.size_bytes, 4);
        assert!(class.is_archive_member);
        assert_eq!(class.format(), Some(FileFormat::Csv));
    }

    #[test]
    fn csv_opens_delimited_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("people.csv");
        std::fs::write(&path, "name\nAnn\n").unwrap();
        let src = open_row_source(&path, None, &IngestionConfig::default()).unwrap();
        assert_eq!(src.kind(), ReaderKind::Delimited);
        assert_eq!(src.headers(), &["name"]);
    }
}
