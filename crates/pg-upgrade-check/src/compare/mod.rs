//! Windowed row comparison between a source and a target database.
//!
//! For every configured table with a non-empty checkpoint, the comparator
//! walks `[startId, stopId)` in windows of at most `window_size` ids. Each
//! window runs the table's compare query on the source and then on the
//! target, and walks both ordered `(id, hash)` streams together:
//!
//! - **first_per_window** (default): rows are paired positionally. The first
//!   divergence is reported, the rest of the window is abandoned and the next
//!   window starts just past the larger of the two diverging ids.
//! - **strict**: the streams are merged by id and every divergence in the
//!   window is reported; windows tile the range without resyncing.
//!
//! Divergences never stop the run. A target row that cannot be read counts
//! as missing in the target. A compare query that fails to run, or a source
//! row that cannot be read, stops the run.

pub mod report;
pub mod types;
pub mod window;

pub use report::{CompareReporter, RecordingReporter, ReportEvent, TracingReporter};
pub use types::{
    CompareSummary, MismatchKind, MismatchRecord, TableCompareResult, TableStatus,
};
pub use window::{ComparisonWindow, WindowCursor};

use std::cmp::Ordering;
use std::time::Instant;

use futures::TryStreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{CompareMode, Config, TableSpec};
use crate::db::{cancellable, Database, RowHash, RowStream};
use crate::error::{CheckError, Result};
use crate::snapshot::{Checkpoint, SnapshotMap};

/// What one window produced.
#[derive(Debug, Default)]
struct WindowOutcome {
    rows: u64,
    mismatches: Vec<MismatchRecord>,
    resync_after: Option<i64>,
}

/// Next row from the target side of a window.
#[derive(Debug)]
enum TargetRead {
    Row(RowHash),
    Exhausted,
    Unreadable(CheckError),
}

/// Range comparator over two databases.
pub struct Comparator<'a> {
    config: &'a Config,
    source: &'a dyn Database,
    target: &'a dyn Database,
    reporter: &'a dyn CompareReporter,
    mode: CompareMode,
    window_size: i64,
    cancel: CancellationToken,
}

impl<'a> Comparator<'a> {
    /// Create a comparator using the config's compare settings.
    pub fn new(
        config: &'a Config,
        source: &'a dyn Database,
        target: &'a dyn Database,
        reporter: &'a dyn CompareReporter,
    ) -> Self {
        Self {
            config,
            source,
            target,
            reporter,
            mode: config.compare.mode,
            window_size: config.compare.window_size,
            cancel: CancellationToken::new(),
        }
    }

    /// Override the walk mode.
    pub fn with_mode(mut self, mode: CompareMode) -> Self {
        self.mode = mode;
        self
    }

    /// Abort in-flight queries when `token` is cancelled.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Compare every configured table against its checkpoint.
    ///
    /// Tables missing from the snapshot are treated as inactive.
    pub async fn run(&self, snapshot: &SnapshotMap) -> Result<CompareSummary> {
        let started = Instant::now();
        info!(
            "Comparing {} table(s) (mode: {}, window: {} ids)",
            self.config.tables.len(),
            self.mode,
            self.window_size
        );

        let mut summary = CompareSummary::new(self.mode);
        for (table, spec) in &self.config.tables {
            let checkpoint = match snapshot.get(table) {
                Some(checkpoint) => *checkpoint,
                None => {
                    debug!("Table {} is not in the snapshot", table);
                    Checkpoint::default()
                }
            };
            let result = self.compare_table(table, spec, checkpoint).await?;
            summary.add_table(result);
        }

        for (table, _) in snapshot.iter() {
            if !self.config.tables.contains_key(table) {
                debug!("Table {} is in the snapshot but not configured, ignoring", table);
            }
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Comparison finished: {} table(s) checked, {} with issues, {} skipped, {} rows, {} issue(s)",
            summary.tables_checked,
            summary.tables_with_issues,
            summary.tables_skipped,
            summary.total_rows,
            summary.total_issues
        );

        Ok(summary)
    }

    /// Compare one table over its checkpoint range.
    pub async fn compare_table(
        &self,
        table: &str,
        spec: &TableSpec,
        checkpoint: Checkpoint,
    ) -> Result<TableCompareResult> {
        if checkpoint.is_inactive() {
            self.reporter.table_skipped(table, &checkpoint);
            return Ok(TableCompareResult::skipped(table, checkpoint));
        }

        let started = Instant::now();
        let sql = spec.compare_sql(table)?;
        self.reporter.table_started(table, &checkpoint);

        let mut result = TableCompareResult::new(table, checkpoint);
        let mut cursor = WindowCursor::new(checkpoint, self.window_size);

        while let Some(window) = cursor.next_window() {
            let outcome = self.compare_window(table, &sql, &window).await?;

            result.windows += 1;
            result.rows_compared += outcome.rows;
            self.reporter.window_scanned(table, &window, outcome.rows);

            for mismatch in outcome.mismatches {
                self.reporter.mismatch(&mismatch);
                result.record(mismatch);
            }
            if let Some(id) = outcome.resync_after {
                cursor.resync(id, &window);
            }
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        self.reporter.table_finished(&result);
        Ok(result)
    }

    async fn compare_window(
        &self,
        table: &str,
        sql: &str,
        window: &ComparisonWindow,
    ) -> Result<WindowOutcome> {
        let mut source_rows = self.open(self.source, table, sql, window).await?;
        let mut target_rows = self.open(self.target, table, sql, window).await?;

        let outcome = match self.mode {
            CompareMode::FirstPerWindow => {
                self.walk_first_divergence(table, window, &mut source_rows, &mut target_rows)
                    .await
            }
            CompareMode::Strict => {
                self.walk_merged(table, window, &mut source_rows, &mut target_rows)
                    .await
            }
        };

        // Release both cursors before the next window opens new ones.
        drop(target_rows);
        drop(source_rows);

        outcome
    }

    /// Pair rows positionally and stop at the first divergence.
    async fn walk_first_divergence(
        &self,
        table: &str,
        window: &ComparisonWindow,
        source_rows: &mut RowStream,
        target_rows: &mut RowStream,
    ) -> Result<WindowOutcome> {
        let mut outcome = WindowOutcome::default();

        while let Some(source_row) = self.next_row(self.source, table, window, source_rows).await? {
            outcome.rows += 1;
            let target_row = match self.read_target(target_rows).await? {
                TargetRead::Row(row) => Some(row),
                TargetRead::Exhausted => None,
                TargetRead::Unreadable(e) => {
                    log_unreadable(table, window, source_row.id, &e);
                    None
                }
            };

            if let Some(mismatch) = MismatchRecord::classify(table, &source_row, target_row.as_ref())
            {
                outcome.resync_after = Some(mismatch.resync_id());
                outcome.mismatches.push(mismatch);
                break;
            }
        }

        Ok(outcome)
    }

    /// Merge both streams by id and report every divergence.
    async fn walk_merged(
        &self,
        table: &str,
        window: &ComparisonWindow,
        source_rows: &mut RowStream,
        target_rows: &mut RowStream,
    ) -> Result<WindowOutcome> {
        let mut outcome = WindowOutcome::default();
        let mut target_broken = false;
        let mut source = self.next_row(self.source, table, window, source_rows).await?;
        let mut target = self
            .merge_target(table, window, source.as_ref(), target_rows, &mut target_broken)
            .await?;

        loop {
            if target_broken {
                // The target stream cannot continue; the pending source row
                // is the last one this window can account for.
                if let Some(s) = source.take() {
                    outcome.rows += 1;
                    outcome
                        .mismatches
                        .push(MismatchRecord::missing_in_target(table, &s));
                }
                break;
            }

            match (source.take(), target.take()) {
                (None, None) => break,
                (Some(s), None) => {
                    outcome.rows += 1;
                    outcome
                        .mismatches
                        .push(MismatchRecord::missing_in_target(table, &s));
                    source = self.next_row(self.source, table, window, source_rows).await?;
                }
                (None, Some(t)) => {
                    outcome
                        .mismatches
                        .push(MismatchRecord::missing_in_source(table, &t));
                    target = self
                        .merge_target(table, window, None, target_rows, &mut target_broken)
                        .await?;
                }
                (Some(s), Some(t)) => match s.id.cmp(&t.id) {
                    Ordering::Less => {
                        outcome.rows += 1;
                        outcome
                            .mismatches
                            .push(MismatchRecord::missing_in_target(table, &s));
                        source = self.next_row(self.source, table, window, source_rows).await?;
                        target = Some(t);
                    }
                    Ordering::Greater => {
                        outcome
                            .mismatches
                            .push(MismatchRecord::missing_in_source(table, &t));
                        target = self
                            .merge_target(table, window, Some(&s), target_rows, &mut target_broken)
                            .await?;
                        source = Some(s);
                    }
                    Ordering::Equal => {
                        outcome.rows += 1;
                        if let Some(mismatch) = MismatchRecord::classify(table, &s, Some(&t)) {
                            outcome.mismatches.push(mismatch);
                        }
                        source = self.next_row(self.source, table, window, source_rows).await?;
                        target = self
                            .merge_target(table, window, source.as_ref(), target_rows, &mut target_broken)
                            .await?;
                    }
                },
            }
        }

        Ok(outcome)
    }

    async fn open(
        &self,
        db: &dyn Database,
        table: &str,
        sql: &str,
        window: &ComparisonWindow,
    ) -> Result<RowStream> {
        cancellable(
            &self.cancel,
            db.query_rows(table, sql, window.start, window.stop),
        )
        .await
        .map_err(|e| window_error(db, table, window, e))
    }

    /// Read the next target row, keeping decode failures apart from
    /// cancellation.
    async fn read_target(&self, rows: &mut RowStream) -> Result<TargetRead> {
        match cancellable(&self.cancel, rows.try_next()).await {
            Ok(Some(row)) => Ok(TargetRead::Row(row)),
            Ok(None) => Ok(TargetRead::Exhausted),
            Err(CheckError::Cancelled) => Err(CheckError::Cancelled),
            Err(e) => Ok(TargetRead::Unreadable(e)),
        }
    }

    /// Target read for the strict merge. An unreadable row sets `broken`
    /// and ends the target side of the window.
    async fn merge_target(
        &self,
        table: &str,
        window: &ComparisonWindow,
        pending_source: Option<&RowHash>,
        rows: &mut RowStream,
        broken: &mut bool,
    ) -> Result<Option<RowHash>> {
        match self.read_target(rows).await? {
            TargetRead::Row(row) => Ok(Some(row)),
            TargetRead::Exhausted => Ok(None),
            TargetRead::Unreadable(e) => {
                let id = pending_source.map(|s| s.id).unwrap_or(window.start);
                log_unreadable(table, window, id, &e);
                *broken = true;
                Ok(None)
            }
        }
    }

    async fn next_row(
        &self,
        db: &dyn Database,
        table: &str,
        window: &ComparisonWindow,
        rows: &mut RowStream,
    ) -> Result<Option<RowHash>> {
        cancellable(&self.cancel, rows.try_next())
            .await
            .map_err(|e| window_error(db, table, window, e))
    }
}

fn log_unreadable(table: &str, window: &ComparisonWindow, id: i64, err: &CheckError) {
    warn!(
        "Failed to read target row for table {} near id {} in window [{}, {}): {}",
        table, id, window.start, window.stop, err
    );
}

/// Attach table and window context to a database error.
fn window_error(
    db: &dyn Database,
    table: &str,
    window: &ComparisonWindow,
    err: CheckError,
) -> CheckError {
    match err {
        CheckError::Cancelled | CheckError::Query { .. } => err,
        other => CheckError::query(
            table,
            format!(
                "compare window [{}, {}) on {}",
                window.start,
                window.stop,
                db.name()
            ),
            other,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompareConfig, TableSpec};
    use crate::db::{IssuedQuery, MemoryDatabase};
    use std::collections::BTreeMap;

    const COMPARE: &str = "SELECT id, md5(%s::text) FROM %s WHERE id >= %d AND id < %d ORDER BY id";

    fn config(tables: &[&str]) -> Config {
        let tables: BTreeMap<String, TableSpec> = tables
            .iter()
            .map(|t| {
                (
                    t.to_string(),
                    TableSpec {
                        collect: "SELECT max(id) FROM %s".to_string(),
                        compare: COMPARE.to_string(),
                    },
                )
            })
            .collect();
        Config {
            tables,
            compare: CompareConfig::default(),
        }
    }

    fn snapshot(entries: &[(&str, i64, i64)]) -> SnapshotMap {
        let mut snapshot = SnapshotMap::new();
        for (table, start, stop) in entries {
            snapshot.set_start(table, *start);
            snapshot.set_stop(table, *stop);
        }
        snapshot
    }

    fn rows(ids: impl IntoIterator<Item = i64>) -> Vec<(i64, String)> {
        ids.into_iter().map(|id| (id, format!("h{}", id))).collect()
    }

    #[tokio::test]
    async fn test_inactive_table_issues_no_queries() {
        let config = config(&["t"]);
        let source = MemoryDatabase::new("source").with_rows("t", rows(1..=5));
        let target = MemoryDatabase::new("target").with_rows("t", rows(1..=5));
        let reporter = RecordingReporter::new();

        let summary = Comparator::new(&config, &source, &target, &reporter)
            .run(&snapshot(&[("t", 0, 0)]))
            .await
            .unwrap();

        assert!(source.issued().is_empty());
        assert!(target.issued().is_empty());
        assert_eq!(summary.tables_skipped, 1);
        assert_eq!(
            reporter.events(),
            vec![ReportEvent::Skipped { table: "t".into() }]
        );
    }

    #[tokio::test]
    async fn test_table_missing_from_snapshot_is_skipped() {
        let config = config(&["t", "u"]);
        let source = MemoryDatabase::new("source").with_rows("t", rows(1..=5));
        let target = MemoryDatabase::new("target").with_rows("t", rows(1..=5));
        let reporter = RecordingReporter::new();

        let summary = Comparator::new(&config, &source, &target, &reporter)
            .run(&snapshot(&[("t", 0, 6)]))
            .await
            .unwrap();

        assert_eq!(summary.table("u").unwrap().status, TableStatus::Skipped);
        assert!(source.windows("u").is_empty());
    }

    #[tokio::test]
    async fn test_identical_data_has_no_issues() {
        let config = config(&["t"]);
        let source = MemoryDatabase::new("source").with_rows("t", rows(0..2500));
        let target = MemoryDatabase::new("target").with_rows("t", rows(0..2500));
        let reporter = RecordingReporter::new();

        let summary = Comparator::new(&config, &source, &target, &reporter)
            .run(&snapshot(&[("t", 0, 2500)]))
            .await
            .unwrap();

        let result = summary.table("t").unwrap();
        assert_eq!(result.status, TableStatus::Passed);
        assert_eq!(result.rows_compared, 2500);
        assert_eq!(result.windows, 3);
        assert!(reporter.mismatches().is_empty());
    }

    #[tokio::test]
    async fn test_windows_issued_source_then_target() {
        let config = config(&["t"]);
        let source = MemoryDatabase::new("source").with_rows("t", rows(10..2010));
        let target = MemoryDatabase::new("target").with_rows("t", rows(10..2010));
        let reporter = RecordingReporter::new();

        Comparator::new(&config, &source, &target, &reporter)
            .run(&snapshot(&[("t", 10, 2010)]))
            .await
            .unwrap();

        assert_eq!(source.windows("t"), vec![(10, 1010), (1010, 2010)]);
        assert_eq!(target.windows("t"), vec![(10, 1010), (1010, 2010)]);
    }

    #[tokio::test]
    async fn test_missing_row_resyncs_past_it() {
        let config = config(&["t"]);
        let source = MemoryDatabase::new("source").with_rows("t", rows(0..3000));
        let target = MemoryDatabase::new("target").with_rows("t", rows(0..3000));
        target.remove("t", 50);
        let reporter = RecordingReporter::new();

        let summary = Comparator::new(&config, &source, &target, &reporter)
            .run(&snapshot(&[("t", 0, 3000)]))
            .await
            .unwrap();

        let windows = source.windows("t");
        assert_eq!(windows[0], (0, 1000));
        assert!(windows[1].0 >= 51);

        let mismatches = reporter.mismatches();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].kind, MismatchKind::RowMissingInTarget);
        assert_eq!(mismatches[0].source_id, Some(50));
        assert_eq!(mismatches[0].target_id, Some(51));
        assert_eq!(summary.total_issues, 1);
    }

    #[tokio::test]
    async fn test_only_first_divergence_per_window_is_reported() {
        let config = config(&["t"]);
        let source = MemoryDatabase::new("source").with_rows("t", rows(0..100));
        let target = MemoryDatabase::new("target").with_rows("t", rows(0..100));
        target.insert("t", 10, "changed");
        target.insert("t", 20, "changed");
        let reporter = RecordingReporter::new();

        let summary = Comparator::new(&config, &source, &target, &reporter)
            .run(&snapshot(&[("t", 0, 100)]))
            .await
            .unwrap();

        // the only window is also the final one, so the scan ends at id 10
        assert_eq!(summary.total_issues, 1);
        assert_eq!(reporter.mismatches()[0].kind, MismatchKind::HashMismatch);
        assert_eq!(source.windows("t"), vec![(0, 100)]);
    }

    #[tokio::test]
    async fn test_strict_mode_reports_every_divergence() {
        let config = config(&["t"]);
        let source = MemoryDatabase::new("source").with_rows("t", rows(0..100));
        let target = MemoryDatabase::new("target").with_rows("t", rows(0..100));
        target.insert("t", 10, "changed");
        target.remove("t", 20);
        target.insert("t", 150, "extra");
        source.insert("t", 150, "h150");
        target.insert("t", 99, "h99");
        target.insert("t", 95, "changed");
        let reporter = RecordingReporter::new();

        let summary = Comparator::new(&config, &source, &target, &reporter)
            .with_mode(CompareMode::Strict)
            .run(&snapshot(&[("t", 0, 100)]))
            .await
            .unwrap();

        let kinds: Vec<(MismatchKind, i64)> = reporter
            .mismatches()
            .iter()
            .map(|m| (m.kind, m.id()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (MismatchKind::HashMismatch, 10),
                (MismatchKind::RowMissingInTarget, 20),
                (MismatchKind::HashMismatch, 95),
            ]
        );
        assert_eq!(summary.table("t").unwrap().rows_compared, 100);
    }

    #[tokio::test]
    async fn test_strict_mode_extra_target_row() {
        let config = config(&["t"]);
        let source = MemoryDatabase::new("source").with_rows("t", rows([1, 2, 4]));
        let target = MemoryDatabase::new("target").with_rows("t", rows([1, 2, 3, 4]));
        let reporter = RecordingReporter::new();

        Comparator::new(&config, &source, &target, &reporter)
            .with_mode(CompareMode::Strict)
            .run(&snapshot(&[("t", 1, 10)]))
            .await
            .unwrap();

        let mismatches = reporter.mismatches();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].kind, MismatchKind::RowMissingInSource);
        assert_eq!(mismatches[0].target_id, Some(3));
        assert_eq!(mismatches[0].source_id, None);
    }

    #[tokio::test]
    async fn test_unreadable_target_row_counts_as_missing() {
        let config = config(&["t"]);
        let source = MemoryDatabase::new("source").with_rows("t", rows(1..=3));
        let target = MemoryDatabase::new("target")
            .with_rows("t", rows([1, 3]))
            .with_unreadable_row("t", 2);
        let reporter = RecordingReporter::new();

        let summary = Comparator::new(&config, &source, &target, &reporter)
            .run(&snapshot(&[("t", 1, 4)]))
            .await
            .unwrap();

        let mismatches = reporter.mismatches();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].kind, MismatchKind::RowMissingInTarget);
        assert_eq!(mismatches[0].source_id, Some(2));
        assert_eq!(mismatches[0].target_id, None);
        assert_eq!(summary.total_issues, 1);
    }

    #[tokio::test]
    async fn test_unreadable_target_row_resyncs_past_it() {
        let config = config(&["t"]);
        let source = MemoryDatabase::new("source").with_rows("t", rows(0..3000));
        let target = MemoryDatabase::new("target")
            .with_rows("t", rows(0..3000))
            .with_unreadable_row("t", 50);
        let reporter = RecordingReporter::new();

        let summary = Comparator::new(&config, &source, &target, &reporter)
            .run(&snapshot(&[("t", 0, 3000)]))
            .await
            .unwrap();

        assert_eq!(source.windows("t")[1].0, 51);
        assert_eq!(summary.total_issues, 1);
        assert_eq!(summary.table("t").unwrap().status, TableStatus::Failed);
    }

    #[tokio::test]
    async fn test_unreadable_target_row_in_strict_mode() {
        let config = config(&["t"]);
        let source = MemoryDatabase::new("source").with_rows("t", rows(1..=5));
        let target = MemoryDatabase::new("target")
            .with_rows("t", rows([1, 2, 4, 5]))
            .with_unreadable_row("t", 3);
        let reporter = RecordingReporter::new();

        let summary = Comparator::new(&config, &source, &target, &reporter)
            .with_mode(CompareMode::Strict)
            .run(&snapshot(&[("t", 1, 6)]))
            .await
            .unwrap();

        let mismatches = reporter.mismatches();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].kind, MismatchKind::RowMissingInTarget);
        assert_eq!(mismatches[0].source_id, Some(3));
        assert_eq!(summary.table("t").unwrap().rows_compared, 3);
    }

    #[tokio::test]
    async fn test_unreadable_source_row_aborts_run() {
        let config = config(&["t"]);
        let source = MemoryDatabase::new("source")
            .with_rows("t", rows([1, 3]))
            .with_unreadable_row("t", 2);
        let target = MemoryDatabase::new("target").with_rows("t", rows(1..=3));
        let reporter = RecordingReporter::new();

        let err = Comparator::new(&config, &source, &target, &reporter)
            .run(&snapshot(&[("t", 1, 4)]))
            .await
            .unwrap_err();

        assert!(matches!(err, CheckError::Query { ref phase, .. } if phase.contains("on source")));
    }

    #[tokio::test]
    async fn test_extra_target_row_in_default_mode_is_hash_mismatch() {
        let config = config(&["t"]);
        let source = MemoryDatabase::new("source").with_rows("t", rows([1, 2, 4]));
        let target = MemoryDatabase::new("target").with_rows("t", rows([1, 2, 3, 4]));
        let reporter = RecordingReporter::new();

        Comparator::new(&config, &source, &target, &reporter)
            .run(&snapshot(&[("t", 1, 10)]))
            .await
            .unwrap();

        let mismatches = reporter.mismatches();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].kind, MismatchKind::HashMismatch);
        assert_eq!(mismatches[0].source_id, Some(4));
        assert_eq!(mismatches[0].target_id, Some(3));
    }

    #[tokio::test]
    async fn test_null_hash_against_value_is_hash_mismatch() {
        let config = config(&["t"]);
        let source = MemoryDatabase::new("source").with_rows("t", rows(1..=3));
        let target = MemoryDatabase::new("target").with_rows("t", rows(1..=3));
        target.insert_null("t", 2);
        let reporter = RecordingReporter::new();

        Comparator::new(&config, &source, &target, &reporter)
            .run(&snapshot(&[("t", 1, 4)]))
            .await
            .unwrap();

        let mismatches = reporter.mismatches();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].kind, MismatchKind::HashMismatch);
        assert_eq!(mismatches[0].source_hash.as_deref(), Some("h2"));
        assert_eq!(mismatches[0].target_hash, None);
    }

    #[tokio::test]
    async fn test_null_hashes_on_both_sides_match() {
        let config = config(&["t"]);
        let source = MemoryDatabase::new("source").with_rows("t", rows(1..=3));
        let target = MemoryDatabase::new("target").with_rows("t", rows(1..=3));
        source.insert_null("t", 2);
        target.insert_null("t", 2);
        let reporter = RecordingReporter::new();

        let summary = Comparator::new(&config, &source, &target, &reporter)
            .run(&snapshot(&[("t", 1, 4)]))
            .await
            .unwrap();

        assert_eq!(summary.total_issues, 0);
    }

    #[tokio::test]
    async fn test_ids_at_the_top_of_the_range() {
        let config = config(&["t"]);
        let top = i64::MAX;
        let source = MemoryDatabase::new("source").with_rows("t", rows(top - 5..top));
        let target = MemoryDatabase::new("target").with_rows("t", rows([top - 5, top - 4, top - 2, top - 1]));
        let reporter = RecordingReporter::new();

        let summary = Comparator::new(&config, &source, &target, &reporter)
            .run(&snapshot(&[("t", top - 5, top)]))
            .await
            .unwrap();

        assert_eq!(source.windows("t"), vec![(top - 5, top)]);
        assert_eq!(summary.total_issues, 1);
        assert_eq!(reporter.mismatches()[0].id(), top - 3);
    }

    #[tokio::test]
    async fn test_divergent_table_does_not_stop_run() {
        let config = config(&["a", "b"]);
        let source = MemoryDatabase::new("source")
            .with_rows("a", rows(1..=5))
            .with_rows("b", rows(1..=5));
        let target = MemoryDatabase::new("target")
            .with_rows("a", rows([1, 2]))
            .with_rows("b", rows(1..=5));
        let reporter = RecordingReporter::new();

        let summary = Comparator::new(&config, &source, &target, &reporter)
            .run(&snapshot(&[("a", 1, 6), ("b", 1, 6)]))
            .await
            .unwrap();

        assert_eq!(summary.table("a").unwrap().status, TableStatus::Failed);
        assert_eq!(summary.table("b").unwrap().status, TableStatus::Passed);
        assert_eq!(summary.tables_checked, 2);
    }

    #[tokio::test]
    async fn test_query_failure_aborts_run() {
        let config = config(&["a", "b"]);
        let source = MemoryDatabase::new("source")
            .with_rows("a", rows(1..=5))
            .with_rows("b", rows(1..=5));
        let target = MemoryDatabase::new("target")
            .with_rows("a", rows(1..=5))
            .with_failing_compare("a");
        let reporter = RecordingReporter::new();

        let err = Comparator::new(&config, &source, &target, &reporter)
            .run(&snapshot(&[("a", 1, 6), ("b", 1, 6)]))
            .await
            .unwrap_err();

        assert!(matches!(err, CheckError::Query { ref table, .. } if table == "a"));
        assert!(source.windows("b").is_empty());
    }

    #[tokio::test]
    async fn test_repeat_runs_are_idempotent() {
        let config = config(&["t"]);
        let source = MemoryDatabase::new("source").with_rows("t", rows(0..2000));
        let target = MemoryDatabase::new("target").with_rows("t", rows(0..2000));
        target.remove("t", 700);
        target.insert("t", 1500, "changed");
        let reporter = RecordingReporter::new();
        let comparator = Comparator::new(&config, &source, &target, &reporter);
        let snap = snapshot(&[("t", 0, 2000)]);

        let first = comparator.run(&snap).await.unwrap();
        let second = comparator.run(&snap).await.unwrap();

        assert_eq!(first.total_issues, 2);
        assert_eq!(first.total_issues, second.total_issues);
        assert_eq!(first.total_rows, second.total_rows);
    }

    #[tokio::test]
    async fn test_cancelled_run_returns_cancelled() {
        let config = config(&["t"]);
        let source = MemoryDatabase::new("source").with_rows("t", rows(1..=5));
        let target = MemoryDatabase::new("target").with_rows("t", rows(1..=5));
        let reporter = RecordingReporter::new();
        let token = CancellationToken::new();
        token.cancel();

        let err = Comparator::new(&config, &source, &target, &reporter)
            .with_cancel(token)
            .run(&snapshot(&[("t", 1, 6)]))
            .await
            .unwrap_err();

        assert!(matches!(err, CheckError::Cancelled));
        assert_eq!(source.issued(), Vec::<IssuedQuery>::new());
    }
}
