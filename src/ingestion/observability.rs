use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::error::IngestError;
use crate::normalize::RowRejection;
use crate::store::StoreError;

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestionSeverity {
    /// Informational event.
    Info,
    /// Warning-level event (bad client input, skipped rows).
    Warning,
    /// Error-level event (operation failed).
    Error,
    /// Critical error (I/O or store infrastructure failures).
    Critical,
}

impl IngestionSeverity {
    /// Severity of a failed batch.
    pub fn for_error(e: &IngestError) -> Self {
        match e {
            IngestError::Io(_) => Self::Critical,
            IngestError::Storage(StoreError::Unavailable { .. }) => Self::Critical,
            IngestError::Storage(_) => Self::Error,
            IngestError::SchemaMismatch { .. } => Self::Error,
            IngestError::Csv(err) => match err.kind() {
                ::csv::ErrorKind::Io(_) => Self::Critical,
                _ => Self::Warning,
            },
            #[cfg(feature = "excel")]
            IngestError::Excel(_) => Self::Warning,
            IngestError::Validation { .. } | IngestError::EmptyBatch | IngestError::NoValidRows { .. } => {
                Self::Warning
            }
        }
    }
}

/// Where a batch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestionFormat {
    /// JSON batch report.
    Json,
    /// CSV upload.
    Csv,
    /// Workbook upload.
    Excel,
    /// Typed records handed over in-process.
    Records,
}

/// Context about an ingestion attempt.
#[derive(Debug, Clone)]
pub struct IngestionContext {
    /// Caller-supplied label for the source (file name, endpoint, ...).
    pub source: String,
    pub format: IngestionFormat,
    /// Target table.
    pub table: String,
}

/// Stats reported on successful ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionStats {
    /// Distinct keys applied to the store.
    pub processed: usize,
    pub inserted: usize,
    pub updated: usize,
    /// Rows dropped by in-batch deduplication.
    pub collapsed: usize,
    /// Rows skipped by the normalizer.
    pub rejected: usize,
}

/// Observer interface for ingestion outcomes.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait IngestionObserver: Send + Sync {
    /// Called when a batch is applied.
    fn on_success(&self, _ctx: &IngestionContext, _stats: IngestionStats) {}

    /// Called once per skipped spreadsheet row.
    fn on_row_rejected(&self, _ctx: &IngestionContext, _rejection: &RowRejection) {}

    /// Called when a batch fails.
    fn on_failure(&self, _ctx: &IngestionContext, _severity: IngestionSeverity, _error: &IngestError) {}

    /// Called when a batch failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestError) {
        self.on_failure(ctx, severity, error)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn IngestionObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn IngestionObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl IngestionObserver for CompositeObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        for o in &self.observers {
            o.on_success(ctx, stats);
        }
    }

    fn on_row_rejected(&self, ctx: &IngestionContext, rejection: &RowRejection) {
        for o in &self.observers {
            o.on_row_rejected(ctx, rejection);
        }
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestError) {
        for o in &self.observers {
            o.on_failure(ctx, severity, error);
        }
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestError) {
        for o in &self.observers {
            o.on_alert(ctx, severity, error);
        }
    }
}

/// Logs ingestion events to stderr.
#[derive(Debug, Default)]
pub struct StdErrObserver;

impl IngestionObserver for StdErrObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        eprintln!(
            "[ingest][ok] format={:?} source={} table={} processed={} inserted={} updated={} collapsed={} rejected={}",
            ctx.format, ctx.source, ctx.table, stats.processed, stats.inserted, stats.updated, stats.collapsed, stats.rejected
        );
    }

    fn on_row_rejected(&self, ctx: &IngestionContext, rejection: &RowRejection) {
        eprintln!("[ingest][skip] source={} table={} {}", ctx.source, ctx.table, rejection);
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestError) {
        eprintln!(
            "[ingest][{:?}] format={:?} source={} table={} err={}",
            severity, ctx.format, ctx.source, ctx.table, error
        );
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestError) {
        eprintln!(
            "[ALERT][ingest][{:?}] format={:?} source={} table={} err={}",
            severity, ctx.format, ctx.source, ctx.table, error
        );
    }
}

/// Appends ingestion events to a local log file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are ignored.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append_line(&self, line: &str) {
        let _guard = self.lock.lock().ok();
        if let Ok(mut f) = OpenOptions::new().create(true).append(true).open(&self.path) {
            let _ = writeln!(f, "{} {line}", Utc::now().to_rfc3339());
        }
    }
}

impl IngestionObserver for FileObserver {
    fn on_success(&self, ctx: &IngestionContext, stats: IngestionStats) {
        self.append_line(&format!(
            "ok format={:?} source={} table={} processed={} rejected={}",
            ctx.format, ctx.source, ctx.table, stats.processed, stats.rejected
        ));
    }

    fn on_row_rejected(&self, ctx: &IngestionContext, rejection: &RowRejection) {
        self.append_line(&format!("skip source={} table={} {rejection}", ctx.source, ctx.table));
    }

    fn on_failure(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestError) {
        self.append_line(&format!(
            "fail severity={:?} format={:?} source={} table={} err={}",
            severity, ctx.format, ctx.source, ctx.table, error
        ));
    }

    fn on_alert(&self, ctx: &IngestionContext, severity: IngestionSeverity, error: &IngestError) {
        self.append_line(&format!(
            "ALERT severity={:?} format={:?} source={} table={} err={}",
            severity, ctx.format, ctx.source, ctx.table, error
        ));
    }
}
