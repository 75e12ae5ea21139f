//! Explicit configuration for readers, type conversion and batch writes.
//!
//! Nothing in this crate reads process-wide settings; callers build an [`IngestionConfig`]
//! (usually via [`Default`] or deserialization) and pass it down.

use std::path::PathBuf;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{IngestionError, IngestionResult};
use crate::types::FieldTypeMap;
use crate::value_type::ValueType;

/// Default number of records flushed per bulk insert.
pub const DEFAULT_BATCH_SIZE: usize = 5_000;

/// XLSX files at or above this size are read through the streaming cell reader.
pub const DEFAULT_XLSX_STREAMING_THRESHOLD: u64 = 1024 * 1024;

/// Characters stripped from numeric text before parsing: every space, `&nbsp;` entities,
/// trailing whitespace (including U+00A0) and thousands separators.
pub const DEFAULT_NUMBER_NOISE_PATTERN: &str = r" |&nbsp;|[ \s\x{00A0}]+$|,";

/// Ingestion configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestionConfig {
    /// Records per bulk insert. Must be greater than zero.
    pub batch_size: usize,
    /// Size threshold (bytes) routing `.xlsx` files to the streaming cell reader.
    pub xlsx_streaming_threshold_bytes: u64,
    /// Regex of noise removed from numeric text before parsing.
    pub number_noise_pattern: String,
    /// Priority list used when inferring the type of an undeclared cell.
    pub inference_order: Vec<ValueType>,
    /// Infer and convert undeclared fields. When `false` they stay as text.
    pub infer_types: bool,
    /// Declared field types; these win over inference.
    pub field_types: FieldTypeMap,
    /// Rows buffered between a cell-stream producer thread and its consumer.
    pub row_buffer: usize,
    /// Parent directory for archive extraction (system temp dir when `None`).
    pub scratch_dir: Option<PathBuf>,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            xlsx_streaming_threshold_bytes: DEFAULT_XLSX_STREAMING_THRESHOLD,
            number_noise_pattern: DEFAULT_NUMBER_NOISE_PATTERN.to_string(),
            inference_order: ValueType::INFERENCE_ORDER.to_vec(),
            infer_types: true,
            field_types: FieldTypeMap::default(),
            row_buffer: 1,
            scratch_dir: None,
        }
    }
}

impl IngestionConfig {
    /// Check the settings that would otherwise fail deep inside a reader or writer.
    pub fn validate(&self) -> IngestionResult<()> {
        if self.batch_size == 0 {
            return Err(IngestionError::InvalidConfig {
                message: "batch_size must be greater than zero".to_string(),
            });
        }
        if self.row_buffer == 0 {
            return Err(IngestionError::InvalidConfig {
                message: "row_buffer must be greater than zero".to_string(),
            });
        }
        if let Err(e) = Regex::new(&self.number_noise_pattern) {
            return Err(IngestionError::InvalidConfig {
                message: format!("number_noise_pattern: {e}"),
            });
        }
        if self.inference_order.contains(&ValueType::Geocode) {
            return Err(IngestionError::InvalidConfig {
                message: "GEOCODE cannot be inferred".to_string(),
            });
        }
        Ok(())
    }

    /// Builder-style override of [`Self::batch_size`].
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Declare the type of one field.
    pub fn with_field_type(mut self, field: impl Into<String>, value_type: ValueType) -> Self {
        self.field_types.insert(field, value_type);
        self
    }
}
