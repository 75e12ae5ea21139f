//! Unified ingestion entrypoints.
//!
//! Most callers should use [`ingest_from_path`], which streams a file (or every tabular entry of a
//! zip archive) through type conversion into a [`DocumentStore`] collection, or
//! [`stream_records`] when no store is involved.
//!
//! Pipeline: archive expansion → reader factory → row source → per-record conversion →
//! batched writes. Sources are consumed one after another, so at most one parser is open.

use std::error::Error as StdError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::batch::BatchWriter;
use crate::config::IngestionConfig;
use crate::error::{IngestionError, IngestionResult};
use crate::store::DocumentStore;
use crate::types::{FieldTypeMap, Record};
use crate::value_type::TypeSystem;

use super::archive::{extract_sources, SourceIter};
use super::observability::{IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats};
use super::source::Rows;

/// Outcome of [`ingest_from_path`].
pub type IngestionSummary = IngestionStats;

/// Options controlling unified ingestion behavior.
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct IngestionOptions {
    /// Sheet to read from workbooks; the first sheet when `None` or not present.
    pub sheet: Option<String>,
    pub config: IngestionConfig,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn IngestionObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: IngestionSeverity,
}

impl fmt::Debug for IngestionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionOptions")
            .field("sheet", &self.sheet)
            .field("config", &self.config)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            sheet: None,
            config: IngestionConfig::default(),
            observer: None,
            alert_at_or_above: IngestionSeverity::Critical,
        }
    }
}

/// Ingest `path` into `collection`.
///
/// When an observer is configured, this function reports:
///
/// - `on_success` with source/row/batch counts
/// - `on_failure` with a computed severity
/// - `on_alert` when that severity is >= `options.alert_at_or_above`
///
/// Batches flushed before a failure stay written.
///
/// # Examples
///
/// ```no_run
/// use tabular_ingest::ingestion::{ingest_from_path, IngestionOptions};
/// use tabular_ingest::store::InMemoryStore;
///
/// # fn main() -> Result<(), tabular_ingest::IngestionError> {
/// let store = InMemoryStore::new();
/// let summary = ingest_from_path("people.csv", "people", &store, &IngestionOptions::default())?;
/// println!("rows={} batches={}", summary.rows, summary.batches);
/// # Ok(())
/// # }
/// ```
///
/// ## Declared types and a smaller batch size
///
/// ```no_run
/// use std::sync::Arc;
///
/// use tabular_ingest::config::IngestionConfig;
/// use tabular_ingest::ingestion::{ingest_from_path, IngestionOptions, IngestionSeverity, TracingObserver};
/// use tabular_ingest::store::InMemoryStore;
/// use tabular_ingest::value_type::ValueType;
///
/// # fn main() -> Result<(), tabular_ingest::IngestionError> {
/// let opts = IngestionOptions {
///     sheet: Some("Orders".to_string()),
///     config: IngestionConfig::default()
///         .with_batch_size(500)
///         .with_field_type("placed_at", ValueType::Date),
///     observer: Some(Arc::new(TracingObserver)),
///     alert_at_or_above: IngestionSeverity::Error,
/// };
/// let store = InMemoryStore::new();
/// ingest_from_path("orders.zip", "orders", &store, &opts)?;
/// # Ok(())
/// # }
/// ```
pub fn ingest_from_path(
    path: impl AsRef<Path>,
    collection: &str,
    store: &dyn DocumentStore,
    options: &IngestionOptions,
) -> IngestionResult<IngestionSummary> {
    let path = path.as_ref();
    let ctx = IngestionContext {
        path: path.to_path_buf(),
        collection: Some(collection.to_string()),
        sheet: options.sheet.clone(),
    };

    let result = write_all(path, collection, store, options);

    if let Some(obs) = options.observer.as_ref() {
        match &result {
            Ok(stats) => obs.on_success(&ctx, *stats),
            Err(e) => {
                let sev = severity_for_error(e);
                obs.on_failure(&ctx, sev, e);
                if sev >= options.alert_at_or_above {
                    obs.on_alert(&ctx, sev, e);
                }
            }
        }
    }

    result
}

fn write_all(
    path: &Path,
    collection: &str,
    store: &dyn DocumentStore,
    options: &IngestionOptions,
) -> IngestionResult<IngestionSummary> {
    let mut records = stream_records(path, options)?;
    let writer = BatchWriter::new(store).with_batch_size(options.config.batch_size);
    let rows = writer.ingest(&mut records, collection)?;
    let summary = IngestionSummary {
        sources: records.sources_opened(),
        rows,
        batches: writer.metrics().snapshot().batches_flushed,
    };
    info!(
        path = %path.display(),
        collection,
        sources = summary.sources,
        rows = summary.rows,
        batches = summary.batches,
        "ingestion finished"
    );
    Ok(summary)
}

/// Stream converted records from `path` without persisting them.
///
/// Fails up front when the config is invalid, the format is unsupported or the file (or archive)
/// cannot be opened.
pub fn stream_records(path: impl AsRef<Path>, options: &IngestionOptions) -> IngestionResult<RecordStream> {
    options.config.validate()?;
    let types = TypeSystem::new(&options.config)?;
    let sources = extract_sources(path, options.sheet.as_deref(), &options.config)?;
    Ok(RecordStream {
        sources,
        current: None,
        types,
        field_types: options.config.field_types.clone(),
        infer: options.config.infer_types,
        opened: 0,
        done: false,
    })
}

/// Converted records from every source of one input, in order.
///
/// The first error ends the stream and releases the open source and any remaining archive
/// entries.
pub struct RecordStream {
    sources: SourceIter,
    current: Option<Rows>,
    types: TypeSystem,
    field_types: FieldTypeMap,
    infer: bool,
    opened: usize,
    done: bool,
}

impl RecordStream {
    /// Number of row sources opened so far.
    pub fn sources_opened(&self) -> usize {
        self.opened
    }

    /// Headers of the source currently being read.
    pub fn current_headers(&self) -> Option<&[String]> {
        self.current.as_ref().map(Rows::headers)
    }

    fn fail(&mut self, e: IngestionError) -> Option<IngestionResult<Record>> {
        self.done = true;
        self.current = None;
        self.sources = Box::new(std::iter::empty());
        Some(Err(e))
    }
}

impl Iterator for RecordStream {
    type Item = IngestionResult<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if let Some(rows) = self.current.as_mut() {
                match rows.next() {
                    Some(Ok(record)) => {
                        return Some(Ok(self.types.convert_record(record, &self.field_types, self.infer)));
                    }
                    Some(Err(e)) => return self.fail(e),
                    None => self.current = None,
                }
            }
            match self.sources.next() {
                Some(Ok(source)) => {
                    self.opened += 1;
                    self.current = Some(source.into_rows());
                }
                Some(Err(e)) => return self.fail(e),
                None => {
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

impl fmt::Debug for RecordStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStream")
            .field("current", &self.current)
            .field("opened", &self.opened)
            .field("done", &self.done)
            .finish()
    }
}

/// Severity of an ingestion failure.
pub fn severity_for_error(e: &IngestionError) -> IngestionSeverity {
    match e {
        IngestionError::Io(_) | IngestionError::Store(_) | IngestionError::ResourceAcquisition { .. } => {
            IngestionSeverity::Critical
        }
        IngestionError::Csv(err) => match err.kind() {
            ::csv::ErrorKind::Io(_) => IngestionSeverity::Critical,
            _ => IngestionSeverity::Error,
        },
        IngestionError::Excel(err) if error_chain_contains_io(err) => IngestionSeverity::Critical,
        IngestionError::Zip(zip::result::ZipError::Io(_)) => IngestionSeverity::Critical,
        IngestionError::Conversion(_) => IngestionSeverity::Warning,
        IngestionError::Excel(_)
        | IngestionError::Zip(_)
        | IngestionError::UnsupportedFormat { .. }
        | IngestionError::UnsupportedOperator { .. }
        | IngestionError::InvalidConfig { .. }
        | IngestionError::InvalidRequest { .. } => IngestionSeverity::Error,
    }
}

fn error_chain_contains_io(e: &(dyn StdError + 'static)) -> bool {
    let mut cur: Option<&(dyn StdError + 'static)> = Some(e);
    while let Some(err) = cur {
        if err.is::<std::io::Error>() {
            return true;
        }
        cur = err.source();
    }
    false
}

/// Owned ingestion request, e.g. for a job queue.
#[derive(Clone, Debug)]
pub struct IngestionRequest {
    pub path: PathBuf,
    pub collection: String,
    pub options: IngestionOptions,
}

impl IngestionRequest {
    /// Execute the request by calling [`ingest_from_path`].
    pub fn run(&self, store: &dyn DocumentStore) -> IngestionResult<IngestionSummary> {
        ingest_from_path(&self.path, &self.collection, store, &self.options)
    }
}
