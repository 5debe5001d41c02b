//! Database access for checkpoint collection and comparison.
//!
//! The collector and comparator only need two capabilities from a database:
//!
//! - [`Database::query_scalar`]: run a single-value query (collect phase)
//! - [`Database::query_rows`]: stream ordered `(id, hash)` rows for an ID
//!   window (compare phase)
//!
//! [`PgDatabase`] implements them over a deadpool-postgres pool. With the
//! `test-util` feature, `MemoryDatabase` implements them over in-process
//! tables and records every issued query.

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod postgres;
pub mod tls;

#[cfg(any(test, feature = "test-util"))]
pub use memory::{IssuedQuery, MemoryDatabase, StopBound};
pub use postgres::PgDatabase;

use std::future::Future;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::{CheckError, Result};

/// One row from a compare query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowHash {
    /// Row identifier.
    pub id: i64,
    /// Content hash; `None` when the query produced NULL.
    pub hash: Option<String>,
}

impl RowHash {
    /// Create a row with a hash.
    pub fn new(id: i64, hash: impl Into<String>) -> Self {
        Self {
            id,
            hash: Some(hash.into()),
        }
    }

    /// Hash for display in logs.
    pub fn hash_display(&self) -> &str {
        self.hash.as_deref().unwrap_or("NULL")
    }
}

/// Ordered rows of one compare window. Dropping the stream releases the
/// underlying cursor and connection.
pub type RowStream = BoxStream<'static, Result<RowHash>>;

/// Read-only database capabilities used by the collector and comparator.
#[async_trait]
pub trait Database: Send + Sync {
    /// Label used in log lines ("source", "target").
    fn name(&self) -> &str;

    /// Run a query expected to yield at most one row with one integer column.
    ///
    /// Returns `Ok(None)` when the query produced no row or a NULL value.
    async fn query_scalar(&self, table: &str, sql: &str) -> Result<Option<i64>>;

    /// Run a compare query with `$1 = start` and `$2 = stop`.
    ///
    /// Rows arrive in the order the query produces them; callers rely on the
    /// query ordering by id ascending.
    async fn query_rows(&self, table: &str, sql: &str, start: i64, stop: i64)
        -> Result<RowStream>;

    /// Close the connection pool.
    async fn close(&self);
}

/// Race a database call against cancellation.
///
/// A cancelled token drops the in-flight future, which aborts the query.
pub async fn cancellable<T, F>(token: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(CheckError::Cancelled),
        result = fut => result,
    }
}
