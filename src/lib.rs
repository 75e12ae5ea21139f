//! `tabular-ingest` streams tabular files into schema-less, typed records and writes them to a
//! document store in fixed-size batches.
//!
//! The primary entrypoint is [`ingestion::ingest_from_path`], which picks a reader from the file
//! extension, converts every cell through the [`value_type`] system and hands records to a
//! [`batch::BatchWriter`].
//!
//! ## What you can ingest
//!
//! - **Delimited text**: `.csv` (comma), `.tsv` (tab)
//! - **Workbooks**: `.xls`, `.xlsb`, `.xlsx` (first sheet unless one is named)
//! - **Archives**: `.zip` containing any mix of the above; other entries are skipped
//!
//! Large `.xlsx` files (1 MiB and up by default) and every `.tsv`/`.xls`/`.xlsb` are read by a
//! cell-stream reader on its own thread; rows are pulled one at a time, so memory stays bounded
//! by one batch regardless of file size.
//!
//! ## Value types
//!
//! Every cell starts as trimmed text. Fields with a declared [`value_type::ValueType`] are
//! converted to it; undeclared fields are inferred in priority order
//! (`Number, Boolean, Json, Document, NumberArray, StringArray, Date, String`). A value that
//! fails conversion keeps its raw text.
//!
//! ```no_run
//! use tabular_ingest::config::IngestionConfig;
//! use tabular_ingest::ingestion::{ingest_from_path, IngestionOptions};
//! use tabular_ingest::store::InMemoryStore;
//! use tabular_ingest::value_type::ValueType;
//!
//! # fn main() -> Result<(), tabular_ingest::IngestionError> {
//! let options = IngestionOptions {
//!     config: IngestionConfig::default().with_field_type("zip", ValueType::String),
//!     ..Default::default()
//! };
//! let store = InMemoryStore::new();
//! let summary = ingest_from_path("customers.xlsx", "customers", &store, &options)?;
//! println!("rows={}", summary.rows);
//! # Ok(())
//! # }
//! ```
//!
//! ## Querying
//!
//! Each [`query::Operator`] evaluates in memory and renders to a store-native [`query::Filter`];
//! both forms select the same documents.
//!
//! ```rust
//! use tabular_ingest::query::Operator;
//! use tabular_ingest::types::{Record, Value};
//!
//! let doc: Record = [("name", Value::text("Alice")), ("age", Value::Int64(30))]
//!     .into_iter()
//!     .collect();
//! let rhs = Value::text("al");
//!
//! assert!(Operator::StartsWith.evaluate(doc.get("name").unwrap(), &rhs));
//! assert!(Operator::StartsWith.to_fragment("name", &rhs).matches(&doc));
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: entrypoints, readers, reader factory, archive expansion, observers
//! - [`value_type`]: type conversion, validation and inference
//! - [`query`]: operators, filters and rule sets
//! - [`batch`]: batched write orchestration
//! - [`store`]: the persistence boundary and an in-memory store
//! - [`types`]: [`types::Value`], [`types::Record`], [`types::FieldTypeMap`]
//! - [`config`] / [`error`]

pub mod batch;
pub mod config;
pub mod error;
pub mod ingestion;
pub mod query;
pub mod store;
pub mod types;
pub mod value_type;

pub use error::{IngestionError, IngestionResult};
