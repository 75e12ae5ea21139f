//! Low-level cell-stream reader.
//!
//! The parser runs on a dedicated producer thread and hands rows over a bounded channel, so at
//! most `row_buffer` rows are in flight no matter how large the file is. Dropping the receiving
//! side is the cancellation signal: the producer notices on its next send, stops parsing and
//! releases the workbook.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread::{self, JoinHandle};

use calamine::{open_workbook, Data, Reader, Xls, Xlsb, Xlsx};
use tracing::{debug, warn};

use crate::error::{IngestionError, IngestionResult};
use crate::types::Record;

use super::factory::FileFormat;
use super::source::{cell_text, is_blank_row, resolve_sheet, ReaderKind, RowSource, SourceCore, SourceState};

type RowMessage = IngestionResult<Vec<String>>;

/// [`RowSource`] backed by a producer thread running the format's cell-level reader.
///
/// Used for `.tsv`, `.xls`, `.xlsb` and large `.xlsx` inputs.
pub struct CellStreamRowSource {
    core: SourceCore,
    format: FileFormat,
    rows: Option<Receiver<RowMessage>>,
    producer: Option<JoinHandle<()>>,
}

impl CellStreamRowSource {
    /// Start the producer for `path` and wait for the header row.
    ///
    /// `row_buffer` bounds the rows queued between producer and consumer (minimum 1).
    pub fn open(path: impl AsRef<Path>, format: FileFormat, sheet: Option<&str>, row_buffer: usize) -> IngestionResult<Self> {
        let path = path.as_ref();
        let (tx, rx) = sync_channel::<RowMessage>(row_buffer.max(1));
        let owned_path = path.to_path_buf();
        let sheet = sheet.map(str::to_string);
        let producer = thread::Builder::new()
            .name("cell-stream".to_string())
            .spawn(move || produce(owned_path, format, sheet, tx))?;

        let mut source = Self {
            core: SourceCore::new(path, &[]),
            format,
            rows: Some(rx),
            producer: Some(producer),
        };

        match source.first_non_blank() {
            Ok(header_cells) => {
                source.core = SourceCore::new(path, &header_cells);
                debug!(path = %path.display(), ?format, headers = source.core.headers.len(), "cell stream opened");
                Ok(source)
            }
            Err(e) => {
                source.close();
                Err(IngestionError::acquisition(path, e))
            }
        }
    }

    pub fn format(&self) -> FileFormat {
        self.format
    }

    fn first_non_blank(&mut self) -> IngestionResult<Vec<String>> {
        let Some(rx) = self.rows.as_ref() else {
            return Ok(Vec::new());
        };
        for message in rx.iter() {
            let cells = message?;
            if !is_blank_row(&cells) {
                return Ok(cells);
            }
        }
        Ok(Vec::new())
    }
}

impl RowSource for CellStreamRowSource {
    fn kind(&self) -> ReaderKind {
        ReaderKind::CellStream
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
        let Self { core, rows, .. } = self;
        let rx = rows.as_ref()?;
        core.pull(|| rx.recv().ok())
    }

    fn rows_read(&self) -> usize {
        self.core.rows_read
    }

    fn close(&mut self) {
        if !self.core.mark_closed(ReaderKind::CellStream) {
            return;
        }
        // Disconnect first so a producer blocked on a full channel wakes up and exits.
        self.rows = None;
        if let Some(handle) = self.producer.take() {
            if handle.join().is_err() {
                warn!(path = %self.core.path.display(), "cell stream producer panicked");
            }
        }
    }
}

impl Drop for CellStreamRowSource {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for CellStreamRowSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellStreamRowSource")
            .field("core", &self.core)
            .field("format", &self.format)
            .field("producer_running", &self.producer.is_some())
            .finish()
    }
}

/// Send one row; `false` once the consumer has gone away.
fn emit(tx: &SyncSender<RowMessage>, cells: Vec<String>) -> bool {
    tx.send(Ok(cells)).is_ok()
}

fn produce(path: PathBuf, format: FileFormat, sheet: Option<String>, tx: SyncSender<RowMessage>) {
    let result = match format {
        FileFormat::Csv => stream_delimited(&path, b',', &tx),
        FileFormat::Tsv => stream_delimited(&path, b'\t', &tx),
        FileFormat::Xls => stream_xls(&path, sheet.as_deref(), &tx),
        FileFormat::Xlsb => stream_xlsb(&path, sheet.as_deref(), &tx),
        FileFormat::Xlsx => stream_xlsx(&path, sheet.as_deref(), &tx),
    };
    if let Err(e) = result {
        // The consumer may already be gone; nothing else to report to.
        let _ = tx.send(Err(e));
    }
}

fn stream_delimited(path: &Path, delimiter: u8, tx: &SyncSender<RowMessage>) -> IngestionResult<()> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_path(path)?;
    let mut record = csv::StringRecord::new();
    while reader.read_record(&mut record)? {
        if !emit(tx, record.iter().map(str::to_string).collect()) {
            break;
        }
    }
    Ok(())
}

fn stream_xls(path: &Path, sheet: Option<&str>, tx: &SyncSender<RowMessage>) -> IngestionResult<()> {
    let mut workbook: Xls<BufReader<File>> = open_workbook(path).map_err(calamine::Error::from)?;
    let sheet = resolve_sheet(&workbook.sheet_names(), sheet)?;
    let range = workbook.worksheet_range(&sheet).map_err(calamine::Error::from)?;
    drop(workbook);
    for row in range.rows() {
        if !emit(tx, row.iter().map(cell_text).collect()) {
            break;
        }
    }
    Ok(())
}

fn stream_xlsx(path: &Path, sheet: Option<&str>, tx: &SyncSender<RowMessage>) -> IngestionResult<()> {
    let mut workbook: Xlsx<BufReader<File>> = open_workbook(path).map_err(calamine::Error::from)?;
    let sheet = resolve_sheet(&workbook.sheet_names(), sheet)?;
    let mut cells = workbook
        .worksheet_cells_reader(&sheet)
        .map_err(calamine::Error::from)?;
    forward_cells(tx, || {
        Ok(cells.next_cell()?.map(|cell| {
            let (row, col) = cell.get_position();
            (row, col, Data::from(cell.get_value().clone()))
        }))
    })
}

fn stream_xlsb(path: &Path, sheet: Option<&str>, tx: &SyncSender<RowMessage>) -> IngestionResult<()> {
    let mut workbook: Xlsb<BufReader<File>> = open_workbook(path).map_err(calamine::Error::from)?;
    let sheet = resolve_sheet(&workbook.sheet_names(), sheet)?;
    let mut cells = workbook
        .worksheet_cells_reader(&sheet)
        .map_err(calamine::Error::from)?;
    forward_cells(tx, || {
        Ok(cells.next_cell()?.map(|cell| {
            let (row, col) = cell.get_position();
            (row, col, Data::from(cell.get_value().clone()))
        }))
    })
}

/// Drain a positioned cell stream into rows on `tx`; stops early once the receiver is gone.
fn forward_cells(
    tx: &SyncSender<RowMessage>,
    mut next_cell: impl FnMut() -> Result<Option<(u32, u32, Data)>, calamine::Error>,
) -> IngestionResult<()> {
    let mut rows = RowAssembler::default();
    while let Some((row, col, value)) = next_cell()? {
        if let Some(done) = rows.push(row, col, cell_text(&value)) {
            if !emit(tx, done) {
                return Ok(());
            }
        }
    }
    if let Some(done) = rows.finish() {
        emit(tx, done);
    }
    Ok(())
}

/// Groups a row-major stream of positioned cells into dense rows.
#[derive(Debug, Default)]
struct RowAssembler {
    current: Option<u32>,
    cells: Vec<String>,
}

impl RowAssembler {
    /// Add a cell; returns the previous row once a cell from a later row arrives.
    fn push(&mut self, row: u32, col: u32, text: String) -> Option<Vec<String>> {
        let completed = match self.current {
            Some(r) if r != row => Some(std::mem::take(&mut self.cells)),
            _ => None,
        };
        self.current = Some(row);
        let col = col as usize;
        if self.cells.len() <= col {
            self.cells.resize(col + 1, String::new());
        }
        self.cells[col] = text;
        completed
    }

    fn finish(&mut self) -> Option<Vec<String>> {
        self.current.take().map(|_| std::mem::take(&mut self.cells))
    }
}
