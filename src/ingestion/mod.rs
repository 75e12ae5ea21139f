//! Ingestion entrypoints and readers.
//!
//! Most callers should use [`ingest_from_path`] (from [`unified`]) which:
//!
//! - expands zip archives into one row source per tabular entry
//! - picks a reader by extension (and, for `.xlsx`, by file size)
//! - converts every record through the value-type system
//! - writes in fixed-size batches to a [`crate::store::DocumentStore`]
//! - optionally reports success/failure/alerts to an [`IngestionObserver`]
//!
//! Readers are also available directly:
//! - [`csv`]: comma-delimited text
//! - [`excel`]: small `.xlsx` workbooks, plus [`list_sheet_names`]
//! - [`cells`]: threaded cell-stream reader for `.tsv`, `.xls`, `.xlsb` and large `.xlsx`

pub mod archive;
pub mod cells;
pub mod csv;
pub mod excel;
pub mod factory;
pub mod observability;
pub mod source;
pub mod unified;

pub use archive::{extract_sources, ArchiveExpansion};
pub use excel::list_sheet_names;
pub use factory::{open_row_source, select_reader, FileClassification, FileFormat};
pub use observability::{
    CompositeObserver, FileObserver, IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats,
    TracingObserver,
};
pub use source::{ReaderKind, RowSource, Rows, SourceState};
pub use unified::{
    ingest_from_path, severity_for_error, stream_records, IngestionOptions, IngestionRequest, IngestionSummary,
    RecordStream,
};
