use std::path::PathBuf;

use thiserror::Error;

/// Convenience result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Error type returned by ingestion, query and batch-write functions.
///
/// This is a single error enum shared across every reader, the archive expander, the query
/// builder and the batch writer.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Spreadsheet reader error.
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// Delimited-text reader error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Archive reader error.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The file extension is not a recognized tabular or archive format.
    #[error("unsupported file format '{extension}' ({})", path.display())]
    UnsupportedFormat { extension: String, path: PathBuf },

    /// The underlying parser could not be opened or initialized.
    #[error("failed to open {}: {source}", path.display())]
    ResourceAcquisition {
        path: PathBuf,
        #[source]
        source: Box<IngestionError>,
    },

    /// A value could not be coerced into its declared [`crate::value_type::ValueType`].
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// A rule used an operator outside the field type's supported set.
    #[error("operator '{operator}' is not supported for field '{field}' of type {value_type}")]
    UnsupportedOperator {
        field: String,
        operator: String,
        value_type: String,
    },

    /// The persistence boundary rejected an operation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An [`crate::config::IngestionConfig`] failed validation.
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },

    /// A request was malformed (e.g. copying a collection onto itself).
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
}

impl IngestionError {
    pub(crate) fn acquisition(path: impl Into<PathBuf>, source: impl Into<IngestionError>) -> Self {
        Self::ResourceAcquisition {
            path: path.into(),
            source: Box::new(source.into()),
        }
    }
}

/// A raw value could not be converted to the requested type.
///
/// Recoverable: ingestion keeps the raw value and moves on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot convert '{raw}' to {target}: {message}")]
pub struct ConversionError {
    /// Name of the target type (e.g. `NUMBER`).
    pub target: String,
    /// The offending raw value, rendered as text.
    pub raw: String,
    pub message: String,
}

impl ConversionError {
    pub fn new(target: impl Into<String>, raw: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            raw: raw.into(),
            message: message.into(),
        }
    }
}

/// Errors raised by a [`crate::store::DocumentStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// A lock guarding store state was poisoned by a panicking writer.
    #[error("store state poisoned")]
    Poisoned,

    /// Backend-specific failure.
    #[error("{0}")]
    Backend(String),
}
