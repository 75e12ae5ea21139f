//! Batched writes against a [`DocumentStore`].
//!
//! All writes of one run go through a single [`BatchWriter`], one batch at a time and in arrival
//! order, so at most one batch of records is buffered regardless of input size.

mod observer;

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::DEFAULT_BATCH_SIZE;
use crate::error::{IngestionError, IngestionResult};
use crate::store::DocumentStore;
use crate::types::Record;

pub use observer::{BatchEvent, BatchMetrics, BatchMetricsSnapshot, BatchObserver, TracingBatchObserver};

/// Result of a collection copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyOutcome {
    pub inserted: u64,
    pub batches: u64,
    pub source_count: u64,
    pub target_count: u64,
    /// Post-copy count check; a mismatch is reported here rather than raised.
    pub sizes_match: bool,
}

/// Groups records into fixed-size batches and writes them sequentially.
pub struct BatchWriter<'s> {
    store: &'s dyn DocumentStore,
    batch_size: usize,
    observer: Option<Arc<dyn BatchObserver>>,
    metrics: Arc<BatchMetrics>,
}

impl<'s> BatchWriter<'s> {
    pub fn new(store: &'s dyn DocumentStore) -> Self {
        Self {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
            observer: None,
            metrics: Arc::new(BatchMetrics::new()),
        }
    }

    /// Set the batch size (0 is treated as 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn BatchObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn metrics(&self) -> Arc<BatchMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Write every record of `records` into `collection`; returns the number inserted.
    ///
    /// The first error from the stream stops the run; batches already flushed stay written.
    pub fn ingest<I>(&self, records: I, collection: &str) -> IngestionResult<u64>
    where
        I: IntoIterator<Item = IngestionResult<Record>>,
    {
        self.run(records, collection).map(|(rows, _)| rows)
    }

    /// Replace the contents of `target` with a copy of `source`.
    ///
    /// Drops `target`, streams `source` (without identifiers unless `keep_ids`) in batches and
    /// then compares the two counts.
    pub fn replace_collection_contents(&self, source: &str, target: &str, keep_ids: bool) -> IngestionResult<CopyOutcome> {
        ensure_distinct(source, target)?;
        self.store.drop_collection(target)?;
        self.emit(BatchEvent::CollectionDropped {
            collection: target.to_string(),
        });
        self.copy(source, target, !keep_ids)
    }

    /// Append every document of `source` to `destination` without dropping anything.
    pub fn append_collection_contents(&self, source: &str, destination: &str) -> IngestionResult<u64> {
        ensure_distinct(source, destination)?;
        let (rows, _) = self.run(self.store.stream_all(source, true)?, destination)?;
        Ok(rows)
    }

    fn copy(&self, source: &str, target: &str, exclude_id: bool) -> IngestionResult<CopyOutcome> {
        let (inserted, batches) = self.run(self.store.stream_all(source, exclude_id)?, target)?;
        let source_count = self.store.count_all(source)?;
        let target_count = self.store.count_all(target)?;
        let sizes_match = source_count == target_count;
        if sizes_match {
            info!(source_collection = source, target_collection = target, count = target_count, "collection copy verified");
        } else {
            warn!(
                source_collection = source,
                target_collection = target,
                source_count,
                target_count,
                "collection sizes differ after copy"
            );
        }
        self.emit(BatchEvent::SizeVerified {
            source: source.to_string(),
            target: target.to_string(),
            source_count,
            target_count,
            matched: sizes_match,
        });
        Ok(CopyOutcome {
            inserted,
            batches,
            source_count,
            target_count,
            sizes_match,
        })
    }

    fn run<I>(&self, records: I, collection: &str) -> IngestionResult<(u64, u64)>
    where
        I: IntoIterator<Item = IngestionResult<Record>>,
    {
        let started = Instant::now();
        self.metrics.begin_run();
        self.emit(BatchEvent::RunStarted {
            collection: collection.to_string(),
        });

        let mut buffer = Vec::with_capacity(self.batch_size);
        let mut rows = 0u64;
        let mut batches = 0u64;
        for record in records {
            buffer.push(record?);
            if buffer.len() >= self.batch_size {
                rows += self.flush(&mut buffer, collection, batches)?;
                batches += 1;
            }
        }
        if !buffer.is_empty() {
            rows += self.flush(&mut buffer, collection, batches)?;
            batches += 1;
        }

        let elapsed = started.elapsed();
        self.metrics.end_run(elapsed);
        self.emit(BatchEvent::RunFinished {
            collection: collection.to_string(),
            rows,
            batches,
            elapsed,
        });
        info!(collection, rows, batches, ?elapsed, "batched write finished");
        Ok((rows, batches))
    }

    fn flush(&self, buffer: &mut Vec<Record>, collection: &str, index: u64) -> IngestionResult<u64> {
        let batch = std::mem::replace(buffer, Vec::with_capacity(self.batch_size));
        let size = batch.len();
        let inserted = self.store.bulk_insert(collection, batch)?;
        self.metrics.on_batch(inserted);
        debug!(collection, index, size, "batch flushed");
        self.emit(BatchEvent::BatchFlushed {
            collection: collection.to_string(),
            index,
            size,
        });
        Ok(inserted)
    }

    fn emit(&self, event: BatchEvent) {
        if let Some(o) = self.observer.as_ref() {
            o.on_event(&event);
        }
    }
}

impl std::fmt::Debug for BatchWriter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchWriter")
            .field("batch_size", &self.batch_size)
            .field("observer_set", &self.observer.is_some())
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}

fn ensure_distinct(source: &str, target: &str) -> IngestionResult<()> {
    if source == target {
        return Err(IngestionError::InvalidRequest {
            message: format!("source and target collection are both '{source}'"),
        });
    }
    Ok(())
}
