//! Reporting hooks for the comparator.
//!
//! The comparator hands every event to a [`CompareReporter`]. The default
//! [`TracingReporter`] turns them into log lines; [`RecordingReporter`] keeps
//! them in memory so callers can assert on the exact mismatch records.

use std::sync::Mutex;

use tracing::{info, warn};

use super::types::{MismatchKind, MismatchRecord, TableCompareResult};
use super::window::ComparisonWindow;
use crate::snapshot::Checkpoint;

/// Receives comparison events as they happen.
pub trait CompareReporter: Send + Sync {
    /// A table with a non-empty checkpoint is about to be scanned.
    fn table_started(&self, _table: &str, _checkpoint: &Checkpoint) {}

    /// A table was skipped because both boundaries are zero.
    fn table_skipped(&self, _table: &str, _checkpoint: &Checkpoint) {}

    /// A window finished scanning.
    fn window_scanned(&self, _table: &str, _window: &ComparisonWindow, _rows: u64) {}

    /// A divergence was found.
    fn mismatch(&self, record: &MismatchRecord);

    /// A table finished scanning.
    fn table_finished(&self, result: &TableCompareResult);
}

/// Reporter that writes to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl CompareReporter for TracingReporter {
    fn table_started(&self, table: &str, checkpoint: &Checkpoint) {
        info!(
            "Comparing table {} (ids {}..{})",
            table, checkpoint.start_id, checkpoint.stop_id
        );
        if checkpoint.is_inverted() {
            warn!(
                "Table {} has startId {} > stopId {}, treating the range as empty",
                table, checkpoint.start_id, checkpoint.stop_id
            );
        }
    }

    fn table_skipped(&self, table: &str, _checkpoint: &Checkpoint) {
        warn!(
            "Skipping {} as start == stop == 0, please double check this table",
            table
        );
    }

    fn window_scanned(&self, table: &str, window: &ComparisonWindow, rows: u64) {
        tracing::debug!(
            "Table {}: window [{}, {}) compared {} rows",
            table, window.start, window.stop, rows
        );
    }

    fn mismatch(&self, record: &MismatchRecord) {
        match record.kind {
            MismatchKind::RowMissingInTarget => warn!(
                "Comparison failed at id {} for table {}: row missing in target",
                record.id(),
                record.table
            ),
            MismatchKind::RowMissingInSource => warn!(
                "Comparison failed at id {} for table {}: target row {} has no source counterpart",
                record.id(),
                record.table,
                record.target_id.unwrap_or_default()
            ),
            MismatchKind::HashMismatch => warn!(
                "Comparison failed at id {} for table {} based on hash",
                record.id(),
                record.table
            ),
        }
        warn!(
            "  source id: {} ({}), target id: {} ({}) for table {}",
            display_id(record.source_id),
            record.source_hash.as_deref().unwrap_or("NULL"),
            display_id(record.target_id),
            record.target_hash.as_deref().unwrap_or("NULL"),
            record.table
        );
    }

    fn table_finished(&self, result: &TableCompareResult) {
        if result.is_clean() {
            info!(
                "No issues found for table {} after comparing {} rows",
                result.table, result.rows_compared
            );
        } else {
            warn!("{} issues found for table {}", result.issues, result.table);
        }
    }
}

fn display_id(id: Option<i64>) -> String {
    id.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Event captured by [`RecordingReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEvent {
    /// Table scan started.
    Started { table: String },
    /// Table skipped.
    Skipped { table: String },
    /// Window scanned.
    Window {
        table: String,
        start: i64,
        stop: i64,
        rows: u64,
    },
    /// Divergence found.
    Mismatch(MismatchRecord),
    /// Table scan finished.
    Finished {
        table: String,
        rows: u64,
        issues: u64,
    },
}

/// Reporter that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<ReportEvent>>,
}

impl RecordingReporter {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All events in order.
    pub fn events(&self) -> Vec<ReportEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Only the mismatch records, in order.
    pub fn mismatches(&self) -> Vec<MismatchRecord> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ReportEvent::Mismatch(m) => Some(m),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: ReportEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl CompareReporter for RecordingReporter {
    fn table_started(&self, table: &str, _checkpoint: &Checkpoint) {
        self.push(ReportEvent::Started {
            table: table.to_string(),
        });
    }

    fn table_skipped(&self, table: &str, _checkpoint: &Checkpoint) {
        self.push(ReportEvent::Skipped {
            table: table.to_string(),
        });
    }

    fn window_scanned(&self, table: &str, window: &ComparisonWindow, rows: u64) {
        self.push(ReportEvent::Window {
            table: table.to_string(),
            start: window.start,
            stop: window.stop,
            rows,
        });
    }

    fn mismatch(&self, record: &MismatchRecord) {
        self.push(ReportEvent::Mismatch(record.clone()));
    }

    fn table_finished(&self, result: &TableCompareResult) {
        self.push(ReportEvent::Finished {
            table: result.table.clone(),
            rows: result.rows_compared,
            issues: result.issues,
        });
    }
}
