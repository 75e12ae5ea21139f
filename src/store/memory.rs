use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::error::{IngestionResult, StoreError};
use crate::query::Filter;
use crate::types::{Record, Value};

use super::{DocumentStore, RecordCursor, ID_FIELD};

/// Thread-safe in-memory [`DocumentStore`].
///
/// Identifiers are 24 hex digits from a process-local counter.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: Mutex<HashMap<String, Vec<Record>>>,
    next_id: AtomicU64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the existing collections, sorted.
    pub fn collection_names(&self) -> IngestionResult<Vec<String>> {
        let mut names: Vec<String> = self.lock()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<Record>>>, StoreError> {
        self.collections.lock().map_err(|_| StoreError::Poisoned)
    }

    fn fresh_id(&self) -> Value {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        Value::text(format!("{n:024x}"))
    }

    fn document_at(&self, collection: &str, index: usize) -> IngestionResult<Option<Record>> {
        let guard = self.lock()?;
        Ok(guard.get(collection).and_then(|docs| docs.get(index)).cloned())
    }
}

impl DocumentStore for InMemoryStore {
    fn bulk_insert(&self, collection: &str, records: Vec<Record>) -> IngestionResult<u64> {
        let inserted = records.len() as u64;
        let with_ids: Vec<Record> = records
            .into_iter()
            .map(|mut r| {
                if !r.contains(ID_FIELD) {
                    r.insert(ID_FIELD, self.fresh_id());
                }
                r
            })
            .collect();
        self.lock()?.entry(collection.to_string()).or_default().extend(with_ids);
        Ok(inserted)
    }

    fn drop_collection(&self, collection: &str) -> IngestionResult<()> {
        self.lock()?.remove(collection);
        Ok(())
    }

    fn count_all(&self, collection: &str) -> IngestionResult<u64> {
        Ok(self.lock()?.get(collection).map_or(0, |docs| docs.len() as u64))
    }

    fn stream_all<'a>(&'a self, collection: &str, exclude_id: bool) -> IngestionResult<RecordCursor<'a>> {
        let collection = collection.to_string();
        let mut index = 0usize;
        let mut failed = false;
        Ok(Box::new(std::iter::from_fn(move || {
            if failed {
                return None;
            }
            match self.document_at(&collection, index) {
                Ok(Some(mut doc)) => {
                    index += 1;
                    if exclude_id {
                        doc.remove(ID_FIELD);
                    }
                    Some(Ok(doc))
                }
                Ok(None) => None,
                Err(e) => {
                    failed = true;
                    Some(Err(e))
                }
            }
        })))
    }

    fn find(&self, collection: &str, filter: &Filter) -> IngestionResult<Vec<Record>> {
        let guard = self.lock()?;
        let filter = filter.compile();
        Ok(guard
            .get(collection)
            .map(|docs| docs.iter().filter(|d| filter.matches(d)).cloned().collect())
            .unwrap_or_default())
    }
}
