//! Comma-delimited text reader.

use std::fs::File;
use std::path::Path;

use csv::StringRecord;
use tracing::debug;

use crate::error::{IngestionError, IngestionResult};
use crate::types::Record;

use super::source::{ReaderKind, RowSource, SourceCore, SourceState};

/// [`RowSource`] over a UTF-8 delimited text file.
///
/// Rules:
///
/// - the first line is always the header row
/// - standard quoting (double-quote enclosure, doubled quote as escape)
/// - rows may be shorter or longer than the header; missing cells read as `""`
#[derive(Debug)]
pub struct DelimitedRowSource {
    core: SourceCore,
    reader: Option<csv::Reader<File>>,
    record: StringRecord,
}

impl DelimitedRowSource {
    /// Open a comma-delimited file and read its header row.
    pub fn open(path: impl AsRef<Path>) -> IngestionResult<Self> {
        Self::open_with_delimiter(path, b',')
    }

    /// Open a delimited file with a custom single-byte delimiter.
    pub fn open_with_delimiter(path: impl AsRef<Path>, delimiter: u8) -> IngestionResult<Self> {
        let path = path.as_ref();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_path(path)
            .map_err(|e| IngestionError::acquisition(path, e))?;

        let mut record = StringRecord::new();
        let header_cells: Vec<String> = match reader.read_record(&mut record) {
            Ok(true) => record.iter().map(str::to_string).collect(),
            Ok(false) => Vec::new(),
            Err(e) => return Err(IngestionError::acquisition(path, e)),
        };

        let core = SourceCore::new(path, &header_cells);
        debug!(path = %path.display(), headers = core.headers.len(), "delimited source opened");
        Ok(Self {
            core,
            reader: Some(reader),
            record,
        })
    }
}

impl RowSource for DelimitedRowSource {
    fn kind(&self) -> ReaderKind {
        ReaderKind::Delimited
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
        let Self { core, reader, record } = self;
        let reader = reader.as_mut()?;
        core.pull(|| match reader.read_record(record) {
            Ok(true) => Some(Ok(record.iter().map(str::to_string).collect())),
            Ok(false) => None,
            Err(e) => Some(Err(e.into())),
        })
    }

    fn rows_read(&self) -> usize {
        self.core.rows_read
    }

    fn close(&mut self) {
        if self.core.mark_closed(ReaderKind::Delimited) {
            self.reader = None;
        }
    }
}

impl Drop for DelimitedRowSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::types::Value;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn first_line_is_the_header_row() {
        let f = write_csv("name,age\nAlice,30\n");
        let mut src = DelimitedRowSource::open(f.path()).unwrap();
        assert_eq!(src.headers(), &["name", "age"]);
        assert_eq!(src.state(), SourceState::Ready);

        let row = src.next_row().unwrap().unwrap();
        assert_eq!(row.get("age"), Some(&Value::text("30")));
        assert_eq!(src.state(), SourceState::Streaming);
        assert!(src.next_row().is_none());
        assert_eq!(src.rows_read(), 1);
    }

    #[test]
    fn quoted_fields_and_short_rows() {
        let f = write_csv("a,b,c\n\"x, \"\"y\"\"\",2\n");
        let mut src = DelimitedRowSource::open(f.path()).unwrap();
        let row = src.next_row().unwrap().unwrap();
        assert_eq!(row.get("a"), Some(&Value::text("x, \"y\"")));
        assert_eq!(row.get("c"), Some(&Value::text("")));
    }

    #[test]
    fn blank_rows_are_skipped() {
        let f = write_csv("a,b\n , \n1,2\n,\n");
        let mut src = DelimitedRowSource::open(f.path()).unwrap();
        let row = src.next_row().unwrap().unwrap();
        assert_eq!(row.get("a"), Some(&Value::text("1")));
        assert!(src.next_row().is_none());
    }

    #[test]
    fn close_is_idempotent_and_stops_the_stream() {
        let f = write_csv("a\n1\n2\n");
        let mut src = DelimitedRowSource::open(f.path()).unwrap();
        src.close();
        src.close();
        assert_eq!(src.state(), SourceState::Closed);
        assert!(src.next_row().is_none());
    }

    #[test]
    fn missing_file_is_a_resource_error() {
        let err = DelimitedRowSource::open("definitely/not/here.csv").unwrap_err();
        assert!(matches!(err, IngestionError::ResourceAcquisition { .. }));
    }
}
