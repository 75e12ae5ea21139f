//! Persistence boundary.
//!
//! The ingestion core only needs a handful of primitives from a document store; they are
//! captured by [`DocumentStore`]. [`InMemoryStore`] is a complete implementation for tests,
//! benches and callers without a real backend.

mod memory;

use crate::error::IngestionResult;
use crate::query::Filter;
use crate::types::Record;

pub use memory::InMemoryStore;

/// Name of the store-assigned document identifier field.
pub const ID_FIELD: &str = "_id";

/// Streaming cursor over a collection.
pub type RecordCursor<'a> = Box<dyn Iterator<Item = IngestionResult<Record>> + Send + 'a>;

/// Primitives the ingestion core requires from a document store.
pub trait DocumentStore: Send + Sync {
    /// Insert `records` into `collection` (created on demand); returns the number inserted.
    ///
    /// Documents without an [`ID_FIELD`] get a fresh identifier.
    fn bulk_insert(&self, collection: &str, records: Vec<Record>) -> IngestionResult<u64>;

    /// Drop `collection`. Dropping a missing collection is not an error.
    fn drop_collection(&self, collection: &str) -> IngestionResult<()>;

    /// Number of documents in `collection` (0 when it does not exist).
    fn count_all(&self, collection: &str) -> IngestionResult<u64>;

    /// Stream every document of `collection` in insertion order, optionally without [`ID_FIELD`].
    fn stream_all<'a>(&'a self, collection: &str, exclude_id: bool) -> IngestionResult<RecordCursor<'a>>;

    /// Documents matching `filter`.
    fn find(&self, collection: &str, filter: &Filter) -> IngestionResult<Vec<Record>>;

    /// Number of documents matching `filter`.
    fn count(&self, collection: &str, filter: &Filter) -> IngestionResult<u64> {
        Ok(self.find(collection, filter)?.len() as u64)
    }
}
