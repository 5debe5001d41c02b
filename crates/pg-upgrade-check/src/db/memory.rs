//! In-memory implementation of [`Database`].
//!
//! Holds `(id, hash)` rows per table and answers collect queries with the
//! table's maximum id, the same way a `SELECT max(id) FROM %s` template would.
//! Every query is recorded so callers can assert on what was issued. Built
//! for tests and only compiled with the `test-util` feature.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use futures::stream;

use super::{Database, RowHash, RowStream};
use crate::error::{CheckError, Result};

/// How the upper window bound is applied to compare queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBound {
    /// `id >= $1 AND id < $2`
    #[default]
    Exclusive,
    /// `id BETWEEN $1 AND $2`
    Inclusive,
}

/// A query recorded by [`MemoryDatabase`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuedQuery {
    /// Collect query for a table.
    Scalar { table: String },
    /// Compare query for a table window.
    Rows { table: String, start: i64, stop: i64 },
}

#[derive(Debug, Default)]
struct Inner {
    tables: BTreeMap<String, BTreeMap<i64, Option<String>>>,
    scalars: BTreeMap<String, Option<i64>>,
    failing_collect: BTreeSet<String>,
    failing_compare: BTreeSet<String>,
    unreadable: BTreeSet<(String, i64)>,
    issued: Vec<IssuedQuery>,
}

/// In-process database for tests.
#[derive(Debug)]
pub struct MemoryDatabase {
    name: String,
    stop_bound: StopBound,
    inner: Mutex<Inner>,
}

impl MemoryDatabase {
    /// Create an empty database labelled `name`.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            stop_bound: StopBound::default(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Use the given upper-bound semantics for compare queries.
    pub fn with_stop_bound(mut self, stop_bound: StopBound) -> Self {
        self.stop_bound = stop_bound;
        self
    }

    /// Add rows with hashes to a table.
    pub fn with_rows<I, S>(self, table: &str, rows: I) -> Self
    where
        I: IntoIterator<Item = (i64, S)>,
        S: Into<String>,
    {
        for (id, hash) in rows {
            self.insert(table, id, hash);
        }
        self
    }

    /// Register a table with no rows.
    pub fn with_table(self, table: &str) -> Self {
        self.lock().tables.entry(table.to_string()).or_default();
        self
    }

    /// Answer the collect query for `table` with a fixed value instead of
    /// the maximum id.
    pub fn with_scalar(self, table: &str, value: Option<i64>) -> Self {
        self.lock().scalars.insert(table.to_string(), value);
        self
    }

    /// Make collect queries for `table` fail.
    pub fn with_failing_collect(self, table: &str) -> Self {
        self.lock().failing_collect.insert(table.to_string());
        self
    }

    /// Make compare queries for `table` fail.
    pub fn with_failing_compare(self, table: &str) -> Self {
        self.lock().failing_compare.insert(table.to_string());
        self
    }

    /// Make the row with `id` fail to decode when a compare stream reaches it.
    ///
    /// The stream yields rows before it normally, then the error in its place.
    pub fn with_unreadable_row(self, table: &str, id: i64) -> Self {
        {
            let mut inner = self.lock();
            inner
                .tables
                .entry(table.to_string())
                .or_default()
                .entry(id)
                .or_insert(None);
            inner.unreadable.insert((table.to_string(), id));
        }
        self
    }

    /// Insert or replace a row whose hash is NULL.
    pub fn insert_null(&self, table: &str, id: i64) {
        self.lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .insert(id, None);
    }

    /// Insert or replace a row.
    pub fn insert(&self, table: &str, id: i64, hash: impl Into<String>) {
        self.lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .insert(id, Some(hash.into()));
    }

    /// Remove a row.
    pub fn remove(&self, table: &str, id: i64) {
        if let Some(rows) = self.lock().tables.get_mut(table) {
            rows.remove(&id);
        }
    }

    /// Queries issued so far, in order.
    pub fn issued(&self) -> Vec<IssuedQuery> {
        self.lock().issued.clone()
    }

    /// Compare windows issued so far for a table.
    pub fn windows(&self, table: &str) -> Vec<(i64, i64)> {
        self.lock()
            .issued
            .iter()
            .filter_map(|q| match q {
                IssuedQuery::Rows {
                    table: t,
                    start,
                    stop,
                } if t == table => Some((*start, *stop)),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded queries.
    pub fn clear_issued(&self) {
        self.lock().issued.clear();
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking test thread cannot leave the maps half-updated.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    async fn query_scalar(&self, table: &str, _sql: &str) -> Result<Option<i64>> {
        let mut inner = self.lock();
        inner.issued.push(IssuedQuery::Scalar {
            table: table.to_string(),
        });

        if inner.failing_collect.contains(table) {
            return Err(CheckError::query(table, "collect", "relation does not exist"));
        }
        if let Some(value) = inner.scalars.get(table) {
            return Ok(*value);
        }

        Ok(inner
            .tables
            .get(table)
            .and_then(|rows| rows.keys().next_back().copied()))
    }

    async fn query_rows(
        &self,
        table: &str,
        _sql: &str,
        start: i64,
        stop: i64,
    ) -> Result<RowStream> {
        let mut inner = self.lock();
        inner.issued.push(IssuedQuery::Rows {
            table: table.to_string(),
            start,
            stop,
        });

        if inner.failing_compare.contains(table) {
            return Err(CheckError::query(
                table,
                format!("compare window [{}, {})", start, stop),
                "canceling statement due to statement timeout",
            ));
        }

        let in_window = |id: i64| match self.stop_bound {
            StopBound::Exclusive => id >= start && id < stop,
            StopBound::Inclusive => id >= start && id <= stop,
        };

        let unreadable = &inner.unreadable;
        let rows: Vec<Result<RowHash>> = inner
            .tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|(id, _)| in_window(**id))
                    .map(|(id, hash)| {
                        if unreadable.contains(&(table.to_string(), *id)) {
                            return Err(CheckError::Config(
                                "compare query returned a NULL id".to_string(),
                            ));
                        }
                        Ok(RowHash {
                            id: *id,
                            hash: hash.clone(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Box::pin(stream::iter(rows)))
    }

    async fn close(&self) {}
}
