use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::debug;

/// Events emitted by the [`super::BatchWriter`].
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    RunStarted { collection: String },
    BatchFlushed { collection: String, index: u64, size: usize },
    RunFinished { collection: String, rows: u64, batches: u64, elapsed: Duration },
    CollectionDropped { collection: String },
    SizeVerified { source: String, target: String, source_count: u64, target_count: u64, matched: bool },
}

/// Observer hook for batch events.
pub trait BatchObserver: Send + Sync {
    fn on_event(&self, event: &BatchEvent);
}

/// Forwards batch events to `tracing` at debug level.
#[derive(Debug, Default)]
pub struct TracingBatchObserver;

impl BatchObserver for TracingBatchObserver {
    fn on_event(&self, event: &BatchEvent) {
        debug!(?event, "batch event");
    }
}

/// Counters updated by the writer as it flushes; snapshot at any time.
#[derive(Debug, Default)]
pub struct BatchMetrics {
    run_id: AtomicU64,
    rows_written: AtomicU64,
    batches_flushed: AtomicU64,
    largest_batch: AtomicU64,
    elapsed_ns: AtomicU64,
}

impl BatchMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn begin_run(&self) {
        self.run_id.fetch_add(1, Ordering::SeqCst);
        self.rows_written.store(0, Ordering::SeqCst);
        self.batches_flushed.store(0, Ordering::SeqCst);
        self.largest_batch.store(0, Ordering::SeqCst);
        self.elapsed_ns.store(0, Ordering::SeqCst);
    }

    pub(crate) fn on_batch(&self, rows: u64) {
        self.rows_written.fetch_add(rows, Ordering::SeqCst);
        self.batches_flushed.fetch_add(1, Ordering::SeqCst);
        self.largest_batch.fetch_max(rows, Ordering::SeqCst);
    }

    pub(crate) fn end_run(&self, elapsed: Duration) {
        self.elapsed_ns
            .store(elapsed.as_nanos().min(u64::MAX as u128) as u64, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> BatchMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        BatchMetricsSnapshot {
            run_id: self.run_id.load(Ordering::SeqCst),
            rows_written: self.rows_written.load(Ordering::SeqCst),
            batches_flushed: self.batches_flushed.load(Ordering::SeqCst),
            largest_batch: self.largest_batch.load(Ordering::SeqCst),
            elapsed: (elapsed_ns > 0).then(|| Duration::from_nanos(elapsed_ns)),
        }
    }
}

/// Immutable snapshot of [`BatchMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchMetricsSnapshot {
    pub run_id: u64,
    pub rows_written: u64,
    pub batches_flushed: u64,
    pub largest_batch: u64,
    /// `None` while a run is in progress.
    pub elapsed: Option<Duration>,
}

impl fmt::Display for BatchMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "run_id={}, rows_written={}, batches={}, largest_batch={}, elapsed={:?}",
            self.run_id, self.rows_written, self.batches_flushed, self.largest_batch, self.elapsed
        )
    }
}
