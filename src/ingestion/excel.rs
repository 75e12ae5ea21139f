//! Whole-sheet workbook reader and sheet-name pre-flight.

use std::path::Path;

use calamine::{open_workbook, open_workbook_auto, Data, Range, Reader, Xlsx};
use tracing::debug;

use crate::error::{IngestionError, IngestionResult};
use crate::types::Record;

use super::factory::FileFormat;
use super::source::{cell_text, is_blank_row, resolve_sheet, ReaderKind, RowSource, SourceCore, SourceState};

/// List the sheet names of a workbook (`.xls`, `.xlsx`, `.xlsb`), in workbook order.
///
/// Delimited text files have no sheets and yield an empty list.
pub fn list_sheet_names(path: impl AsRef<Path>) -> IngestionResult<Vec<String>> {
    let path = path.as_ref();
    match FileFormat::from_path(path) {
        Some(f) if f.is_workbook() => {
            let workbook = open_workbook_auto(path).map_err(|e| IngestionError::acquisition(path, e))?;
            Ok(workbook.sheet_names())
        }
        _ => Ok(Vec::new()),
    }
}

/// [`RowSource`] for small `.xlsx` files: the chosen sheet is loaded once and the workbook handle
/// is released straight away; rows are then served from the in-memory range.
pub struct WorkbookRowSource {
    core: SourceCore,
    sheet: String,
    range: Option<Range<Data>>,
    next_row: usize,
}

impl WorkbookRowSource {
    /// Open `path`, pick `sheet` (or the first sheet) and capture the first non-blank row as headers.
    pub fn open(path: impl AsRef<Path>, sheet: Option<&str>) -> IngestionResult<Self> {
        let path = path.as_ref();
        let (sheet, range) = load_range(path, sheet).map_err(|e| IngestionError::acquisition(path, e))?;

        let mut next_row = 0;
        let mut header_cells = Vec::new();
        while next_row < range.height() {
            let cells = row_cells(&range, next_row);
            next_row += 1;
            if !is_blank_row(&cells) {
                header_cells = cells;
                break;
            }
        }

        let core = SourceCore::new(path, &header_cells);
        debug!(path = %path.display(), sheet = %sheet, rows = range.height(), "workbook source opened");
        Ok(Self {
            core,
            sheet,
            range: Some(range),
            next_row,
        })
    }

    /// The sheet being read.
    pub fn sheet(&self) -> &str {
        &self.sheet
    }
}

fn load_range(path: &Path, sheet: Option<&str>) -> IngestionResult<(String, Range<Data>)> {
    let mut workbook: Xlsx<_> = open_workbook(path).map_err(calamine::Error::from)?;
    let sheet = resolve_sheet(&workbook.sheet_names(), sheet)?;
    let range = workbook.worksheet_range(&sheet).map_err(calamine::Error::from)?;
    Ok((sheet, range))
}

/// Cells of one row, padded on the left so column positions match the sheet's.
fn row_cells(range: &Range<Data>, row: usize) -> Vec<String> {
    let offset = range.start().map_or(0, |(_, col)| col as usize);
    std::iter::repeat_n(String::new(), offset)
        .chain((0..range.width()).map(|col| range.get((row, col)).map(cell_text).unwrap_or_default()))
        .collect()
}

impl RowSource for WorkbookRowSource {
    fn kind(&self) -> ReaderKind {
        ReaderKind::InMemoryWorkbook
    }

    fn path(&self) -> &Path {
        &self.core.path
    }

    fn headers(&self) -> &[String] {
        &self.core.headers
    }

    fn state(&self) -> SourceState {
        self.core.state
    }

    fn next_row(&mut self) -> Option<IngestionResult<Record>> {
        let Self {
            core, range, next_row, ..
        } = self;
        let range = range.as_ref()?;
        core.pull(|| {
            if *next_row >= range.height() {
                return None;
            }
            let cells = row_cells(range, *next_row);
            *next_row += 1;
            Some(Ok(cells))
        })
    }

    fn rows_read(&self) -> usize {
        self.core.rows_read
    }

    fn close(&mut self) {
        if self.core.mark_closed(ReaderKind::InMemoryWorkbook) {
            self.range = None;
        }
    }
}

impl Drop for WorkbookRowSource {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for WorkbookRowSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkbookRowSource")
            .field("core", &self.core)
            .field("sheet", &self.sheet)
            .field("loaded", &self.range.is_some())
            .field("next_row", &self.next_row)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimited_files_have_no_sheets() {
        assert!(list_sheet_names("people.csv").unwrap().is_empty());
        assert!(list_sheet_names("people.tsv").unwrap().is_empty());
    }

    #[test]
    fn unreadable_workbook_is_a_resource_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"not a zip container").unwrap();
        let err = WorkbookRowSource::open(&path, None).unwrap_err();
        assert!(matches!(err, IngestionError::ResourceAcquisition { .. }));
        assert!(list_sheet_names(&path).is_err());
    }
}
