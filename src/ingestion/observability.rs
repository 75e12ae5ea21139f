//! Outcome reporting for [`super::ingest_from_path`].
//!
//! Every ingestion ends in exactly one `on_success` or `on_failure` callback; failures at or above
//! the configured threshold additionally raise `on_alert`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde_json::json;
use tracing::{error, info, warn};

use crate::error::IngestionError;

/// How bad a failed ingestion is. Ordered, so thresholds compare with `>=`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IngestionSeverity {
    Info,
    /// Recoverable; e.g. a value that kept its raw form.
    Warning,
    /// The input was rejected (unsupported format, invalid config or rule).
    Error,
    /// Infrastructure failure: I/O, the store, or a parser that could not be opened.
    Critical,
}

impl IngestionSeverity {
    pub fn label(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

/// What was being ingested, and where to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionContext {
    pub path: PathBuf,
    /// Target collection; `None` for store-less streaming.
    pub collection: Option<String>,
    /// Requested workbook sheet, if any.
    pub sheet: Option<String>,
}

impl IngestionContext {
    fn collection_label(&self) -> &str {
        self.collection.as_deref().unwrap_or("-")
    }
}

/// Counts reported on success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestionStats {
    /// Row sources opened (archive entries count individually).
    pub sources: usize,
    pub rows: u64,
    pub batches: u64,
}

/// Receives ingestion outcomes.
pub trait IngestionObserver: Send + Sync {
    fn on_success(&self, _ctx: &IngestionContext, _stats: IngestionStats) {}

    fn on_failure(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _error: &IngestionError) {}

    /// Raised after `on_failure` when the severity meets the alert threshold.
    ///
    /// The default forwards to [`Self::on_failure`], so an observer that only implements that
    /// sees alerting failures twice.
    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.on_failure(ctx, severity, error)
    }
}

/// Forwards every callback to each child, in insertion order.
#[derive(Default, Clone)]
pub struct CompositeObserver {
    children: Vec<Arc<dyn IngestionObserver>>,
}

impl CompositeObserver {
    pub fn new(children: Vec<Arc<dyn IngestionObserver>>) -> Self {
        Self { children }
    }

    /// Builder-style [`Self::push`].
    pub fn with(mut self, child: Arc<dyn IngestionObserver>) -> Self {
        self.push(child);
        self
    }

    pub fn push(&mut self, child: Arc<dyn IngestionObserver>) {
        self.children.push(child);
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl std::fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeObserver").field("children", &self.children.len()).finish()
    }
}

impl IngestionObserver for CompositeObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        self.children.iter().for_each(|c| c.on_success(ctx, stats));
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.children.iter().for_each(|c| c.on_failure(ctx, severity, error));
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.children.iter().for_each(|c| c.on_alert(ctx, severity, error));
    }
}

/// Reports outcomes as `tracing` events: successes at `info`, failures at `warn`, alerts at `error`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl IngestionObserver for TracingObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        info!(
            path = %ctx.path.display(),
            collection = ctx.collection_label(),
            sheet = ctx.sheet.as_deref(),
            sources = stats.sources,
            rows = stats.rows,
            batches = stats.batches,
            "ingestion succeeded"
        );
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        warn!(
            path = %ctx.path.display(),
            collection = ctx.collection_label(),
            severity = severity.label(),
            %error,
            "ingestion failed"
        );
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        error!(
            path = %ctx.path.display(),
            collection = ctx.collection_label(),
            severity = severity.label(),
            %error,
            "ingestion alert"
        );
    }
}

/// Appends one JSON object per callback to a local file.
///
/// Each line carries `ts` (RFC 3339, UTC), `event` (`success`, `failure` or `alert`), `path` and
/// `collection`, plus the counts or the severity and error text.
/// Writing is best-effort: an unwritable log never fails an ingestion.
#[derive(Debug)]
pub struct FileObserver {
    log_path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileObserver {
    pub fn new(log_path: impl AsRef<Path>) -> Self {
        Self {
            log_path: log_path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn append(&self, ctx: &IngestionContext, event: &str, mut fields: serde_json::Value) {
        if let Some(obj) = fields.as_object_mut() {
            obj.insert("ts".into(), json!(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)));
            obj.insert("event".into(), json!(event));
            obj.insert("path".into(), json!(ctx.path.display().to_string()));
            obj.insert("collection".into(), json!(ctx.collection));
        }
        let _serialized = self.write_lock.lock().ok();
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .and_then(|mut f| writeln!(f, "{fields}"));
        if let Err(e) = written {
            warn!(log = %self.log_path.display(), error = %e, "could not append ingestion log line");
        }
    }
}

impl IngestionObserver for FileObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        self.append(
            ctx,
            "success",
            json!({ "sources": stats.sources, "rows": stats.rows, "batches": stats.batches }),
        );
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.append(
            ctx,
            "failure",
            json!({ "severity": severity.label(), "error": error.to_string() }),
        );
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestionError) {
        self.append(ctx, "alert", json!({ "severity": severity.label(), "error": error.to_string() }));
    }
}
