//! The [`RowSource`] abstraction shared by every reader.
//!
//! A row source is a single-use, forward-only reader over one tabular input. It is created
//! `Ready` (file opened, sheet resolved, header row captured), moves to `Streaming` on the first
//! pull and ends `Closed`. Closing is idempotent and also happens on drop, so no exit path can
//! leak the underlying parser.
//!
//! Callers either pull rows one at a time with [`RowSource::next_row`] or hand the source over to
//! [`Rows`] (via `into_rows`), which closes it as soon as the stream is exhausted or fails.

use std::fmt;
use std::path::Path;
use std::sync::LazyLock;

use calamine::{Data, DataType};
use regex::Regex;
use tracing::debug;

use crate::error::{IngestionError, IngestionResult};
use crate::types::{Record, Value, DATE_TEXT_FORMAT};

static HEADER_NOISE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&nbsp;|[\n /:?#\[\]@!$&'*+,;=]+").expect("header noise pattern is valid"));

/// Which reader implementation backs a [`RowSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReaderKind {
    /// Comma-delimited text, read record by record.
    Delimited,
    /// Low-level cell reader running on a producer thread (TSV, XLS, XLSB, large XLSX).
    CellStream,
    /// Whole-sheet reader for small XLSX files.
    InMemoryWorkbook,
}

/// Lifecycle of a [`RowSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    /// Opened with headers captured; no row pulled yet.
    Ready,
    /// At least one row pulled.
    Streaming,
    /// Underlying resources released.
    Closed,
}

/// A streaming, single-pass reader over one tabular input.
pub trait RowSource: Send {
    fn kind(&self) -> ReaderKind;

    /// The file being read.
    fn path(&self) -> &Path;

    /// Normalized header row captured when the source was opened.
    fn headers(&self) -> &[String];

    fn state(&self) -> SourceState;

    /// Pull the next non-blank row, or `None` once the input is exhausted or the source is closed.
    ///
    /// Does not close the source at end of input; the caller owns the lifecycle in this mode.
    fn next_row(&mut self) -> Option<IngestionResult<Record>>;

    /// Number of records returned so far.
    fn rows_read(&self) -> usize;

    /// Release the underlying parser and file handles. Idempotent.
    fn close(&mut self);
}

impl dyn RowSource {
    /// Consume the source as an iterator that closes it on exhaustion or error.
    pub fn into_rows(self: Box<Self>) -> Rows {
        Rows { source: self, done: false }
    }
}

impl fmt::Debug for dyn RowSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RowSource")
            .field("kind", &self.kind())
            .field("path", &self.path())
            .field("state", &self.state())
            .field("headers", &self.headers().len())
            .finish()
    }
}

/// Lazy, finite, forward-only sequence of records from one [`RowSource`].
///
/// The source is closed when the sequence ends, when it yields an error (which is its last item)
/// and when the iterator is dropped early.
pub struct Rows {
    source: Box<dyn RowSource>,
    done: bool,
}

impl Rows {
    pub fn headers(&self) -> &[String] {
        self.source.headers()
    }

    pub fn path(&self) -> &Path {
        self.source.path()
    }

    pub fn state(&self) -> SourceState {
        self.source.state()
    }

    fn finish(&mut self) {
        self.done = true;
        self.source.close();
    }
}

impl Iterator for Rows {
    type Item = IngestionResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.source.next_row() {
            Some(Ok(record)) => Some(Ok(record)),
            Some(Err(e)) => {
                self.finish();
                Some(Err(e))
            }
            None => {
                self.finish();
                None
            }
        }
    }
}

impl Drop for Rows {
    fn drop(&mut self) {
        self.source.close();
    }
}

impl fmt::Debug for Rows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rows")
            .field("source", &self.source)
            .field("done", &self.done)
            .finish()
    }
}

/// Collapse `&nbsp;`, newlines, runs of spaces and URL-reserved characters to one space, then trim.
pub fn normalize_header(raw: &str) -> String {
    HEADER_NOISE.replace_all(raw, " ").trim().to_string()
}

/// `true` when every cell is empty or whitespace.
pub fn is_blank_row<S: AsRef<str>>(cells: &[S]) -> bool {
    cells.iter().all(|c| c.as_ref().trim().is_empty())
}

/// Pair headers and cells by position.
///
/// Cells are trimmed; a missing cell becomes `""`; a blank header drops its column.
pub fn build_record<S: AsRef<str>>(headers: &[String], cells: &[S]) -> Record {
    let mut record = Record::with_capacity(headers.len());
    for (idx, header) in headers.iter().enumerate() {
        if header.is_empty() {
            continue;
        }
        let raw = cells.get(idx).map(|c| c.as_ref().trim()).unwrap_or("");
        record.insert(header.clone(), Value::text(raw));
    }
    record
}

/// Header list, cursor and lifecycle shared by the concrete readers.
#[derive(Debug)]
pub(crate) struct SourceCore {
    pub(crate) path: std::path::PathBuf,
    pub(crate) headers: Vec<String>,
    pub(crate) state: SourceState,
    pub(crate) rows_read: usize,
}

impl SourceCore {
    pub(crate) fn new(path: &Path, header_cells: &[String]) -> Self {
        Self {
            path: path.to_path_buf(),
            headers: header_cells.iter().map(|h| normalize_header(h)).collect(),
            state: SourceState::Ready,
            rows_read: 0,
        }
    }

    /// Drive `next_cells` until a non-blank row (converted to a record), an error, or the end.
    pub(crate) fn pull(
        &mut self,
        mut next_cells: impl FnMut() -> Option<IngestionResult<Vec<String>>>,
    ) -> Option<IngestionResult<Record>> {
        if self.state == SourceState::Closed {
            return None;
        }
        self.state = SourceState::Streaming;
        loop {
            match next_cells()? {
                Err(e) => return Some(Err(e)),
                Ok(cells) if is_blank_row(&cells) => continue,
                Ok(cells) => {
                    let record = build_record(&self.headers, &cells);
                    if record.is_empty() {
                        continue;
                    }
                    self.rows_read += 1;
                    return Some(Ok(record));
                }
            }
        }
    }

    /// Mark closed; returns `false` when it already was.
    pub(crate) fn mark_closed(&mut self, kind: ReaderKind) -> bool {
        if self.state == SourceState::Closed {
            return false;
        }
        self.state = SourceState::Closed;
        debug!(path = %self.path.display(), ?kind, rows = self.rows_read, "row source closed");
        true
    }
}

/// Pick the requested sheet when present, else the first one.
pub(crate) fn resolve_sheet(names: &[String], wanted: Option<&str>) -> IngestionResult<String> {
    if let Some(name) = wanted.filter(|w| names.iter().any(|n| n == w)) {
        return Ok(name.to_string());
    }
    names.first().cloned().ok_or_else(|| IngestionError::InvalidRequest {
        message: "workbook has no sheets".to_string(),
    })
}

/// Render a spreadsheet cell as the raw text a delimited file would carry.
pub(crate) fn cell_text(c: &Data) -> String {
    match c {
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                (*f as i64).to_string()
            } else {
                f.to_string()
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => match c.as_datetime() {
            Some(naive) => naive.and_utc().format(DATE_TEXT_FORMAT).to_string(),
            None => dt.to_string(),
        },
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("{e:?}"),
        Data::Empty => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_are_normalized() {
        assert_eq!(normalize_header("  First&nbsp;Name "), "First Name");
        assert_eq!(normalize_header("price/unit"), "price unit");
        assert_eq!(normalize_header("Q1: sales?"), "Q1 sales");
        assert_eq!(normalize_header("a\nb"), "a b");
        assert_eq!(normalize_header("e-mail"), "e-mail");
    }

    #[test]
    fn blank_rows_are_whitespace_only() {
        assert!(is_blank_row(&["", "  ", "\t"]));
        assert!(is_blank_row::<&str>(&[]));
        assert!(!is_blank_row(&["", "x"]));
    }

    #[test]
    fn records_pair_positionally() {
        let headers = vec!["name".to_string(), String::new(), "age".to_string(), "city".to_string()];
        let r = build_record(&headers, &[" Ann ", "skipped", "41"]);
        assert_eq!(r.field_names().collect::<Vec<_>>(), vec!["name", "age", "city"]);
        assert_eq!(r.get("name"), Some(&Value::text("Ann")));
        assert_eq!(r.get("city"), Some(&Value::text("")));
    }

    #[test]
    fn sheet_resolution_falls_back_to_first() {
        let names = vec!["Summary".to_string(), "Data".to_string()];
        assert_eq!(resolve_sheet(&names, Some("Data")).unwrap(), "Data");
        assert_eq!(resolve_sheet(&names, Some("Missing")).unwrap(), "Summary");
        assert_eq!(resolve_sheet(&names, None).unwrap(), "Summary");
        assert!(resolve_sheet(&[], None).is_err());
    }

    #[test]
    fn spreadsheet_cells_render_as_text() {
        assert_eq!(cell_text(&Data::Float(30.0)), "30");
        assert_eq!(cell_text(&Data::Float(2.5)), "2.5");
        assert_eq!(cell_text(&Data::Int(-4)), "-4");
        assert_eq!(cell_text(&Data::Bool(true)), "true");
        assert_eq!(cell_text(&Data::Empty), "");
    }
}
