//! # pg-upgrade-check
//!
//! Data integrity checks around a PostgreSQL upgrade or replication cutover.
//!
//! The check runs in three stages:
//!
//! - **before**: record each table's boundary id on the source as `startId`
//! - **after**: record the boundary again as `stopId`
//! - **compare**: walk `[startId, stopId)` in windows of at most 1000 ids and
//!   compare `(id, hash)` rows between the source and the target
//!
//! ## Example
//!
//! ```rust,no_run
//! use pg_upgrade_check::{Comparator, Config, PgDatabase, SnapshotMap, TracingReporter};
//!
//! #[tokio::main]
//! async fn main() -> pg_upgrade_check::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let snapshot = SnapshotMap::load("data/after_ids.json")?;
//!     let source = PgDatabase::connect("source", "postgres://postgres@localhost:6000/postgres").await?;
//!     let target = PgDatabase::connect("target", "postgres://postgres@localhost:6001/postgres").await?;
//!
//!     let summary = Comparator::new(&config, &source, &target, &TracingReporter)
//!         .run(&snapshot)
//!         .await?;
//!     println!("{} issue(s)", summary.total_issues);
//!     Ok(())
//! }
//! ```

pub mod collector;
pub mod compare;
pub mod config;
pub mod db;
pub mod error;
pub mod query;
pub mod snapshot;

// Re-exports for convenient access
pub use collector::Collector;
pub use compare::{
    Comparator, CompareReporter, CompareSummary, MismatchKind, MismatchRecord,
    RecordingReporter, TableCompareResult, TableStatus, TracingReporter,
};
pub use config::{CompareConfig, CompareMode, Config, TableSpec};
pub use db::{Database, PgDatabase, RowHash};
#[cfg(any(test, feature = "test-util"))]
pub use db::MemoryDatabase;
pub use error::{CheckError, Result};
pub use snapshot::{Checkpoint, SnapshotMap};
