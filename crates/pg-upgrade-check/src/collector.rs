//! Checkpoint collection around an upgrade window.
//!
//! The before-phase records each table's boundary id as `startId`; the
//! after-phase re-reads the same boundary into `stopId`. A failing collect
//! query degrades to a boundary of `0` so one broken table does not block the
//! rest, but a missing or already-present snapshot file stops the phase before
//! any query runs.

use std::path::Path;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{Config, TableSpec};
use crate::db::{cancellable, Database};
use crate::error::{CheckError, Result};
use crate::snapshot::{ensure_absent, ensure_present, SnapshotMap};

/// Runs collect queries against the source database.
pub struct Collector<'a> {
    config: &'a Config,
    source: &'a dyn Database,
    cancel: CancellationToken,
}

impl<'a> Collector<'a> {
    /// Create a collector for the configured tables.
    pub fn new(config: &'a Config, source: &'a dyn Database) -> Self {
        Self {
            config,
            source,
            cancel: CancellationToken::new(),
        }
    }

    /// Abort in-flight queries when `token` is cancelled.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Record start ids for every configured table into a new file at `out`.
    pub async fn run_before(&self, out: &Path) -> Result<SnapshotMap> {
        info!("Starting pre-upgrade stage");
        ensure_absent(out)?;

        let started = Instant::now();
        let mut snapshot = SnapshotMap::new();
        for (table, spec) in &self.config.tables {
            let start_id = self.collect(table, spec).await?;
            snapshot.set_start(table, start_id);
        }

        snapshot.save_new(out)?;
        info!(
            "Recorded start ids for {} table(s) in {} ({:.1}s)",
            snapshot.len(),
            out.display(),
            started.elapsed().as_secs_f64()
        );
        Ok(snapshot)
    }

    /// Load the snapshot at `before`, record stop ids and write the result
    /// to a new file at `after`.
    ///
    /// Tables configured but absent from the before-snapshot are skipped.
    pub async fn run_after(&self, before: &Path, after: &Path) -> Result<SnapshotMap> {
        info!("Starting post-upgrade stage");
        ensure_absent(after)?;
        ensure_present(before)?;

        let started = Instant::now();
        let mut snapshot = SnapshotMap::load(before)?;
        for (table, spec) in &self.config.tables {
            if !snapshot.contains(table) {
                warn!(
                    "Table {} is not in {}, skipping (was it added after the before stage?)",
                    table,
                    before.display()
                );
                continue;
            }
            let stop_id = self.collect(table, spec).await?;
            snapshot.set_stop(table, stop_id);
        }

        snapshot.save_new(after)?;
        info!(
            "Recorded stop ids for {} table(s) in {} ({:.1}s)",
            snapshot.len(),
            after.display(),
            started.elapsed().as_secs_f64()
        );
        Ok(snapshot)
    }

    /// Run one table's collect query.
    ///
    /// No row, NULL, or a query error all yield `0` with a warning.
    /// Cancellation is not degraded.
    pub async fn collect(&self, table: &str, spec: &TableSpec) -> Result<i64> {
        let sql = spec.collect_sql(table)?;
        info!("Fetching boundary for {}", table);

        match cancellable(&self.cancel, self.source.query_scalar(table, &sql)).await {
            Ok(Some(value)) => Ok(value),
            Ok(None) => {
                warn!("No rows found for table: {}, please double check", table);
                Ok(0)
            }
            Err(CheckError::Cancelled) => Err(CheckError::Cancelled),
            Err(e) => {
                warn!(
                    "Collect query failed for table {}, recording 0: {}",
                    table, e
                );
                Ok(0)
            }
        }
    }
}
