//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::Result;
use crate::query::{parse_collect, parse_compare};

/// Largest ID span a single compare query may cover.
pub const MAX_WINDOW_SIZE: i64 = 1000;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Per-table query templates, keyed by table name.
    pub tables: BTreeMap<String, TableSpec>,

    /// Comparison behavior.
    #[serde(default)]
    pub compare: CompareConfig,
}

/// Query templates for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Single-value query returning the boundary ID. One `%s` for the table name.
    pub collect: String,

    /// Ordered `(id, hash)` rows for an ID window. Two `%s` for the table
    /// name and two `%d` (or `$1`/`$2`) for the window bounds.
    pub compare: String,
}

impl TableSpec {
    /// Render the collect query for `table`.
    pub fn collect_sql(&self, table: &str) -> Result<String> {
        parse_collect(&self.collect)?.render(table)
    }

    /// Render the compare query for `table`; bounds stay as `$1`/`$2`.
    pub fn compare_sql(&self, table: &str) -> Result<String> {
        parse_compare(&self.compare)?.render(table)
    }
}

/// Comparison behavior configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompareConfig {
    /// IDs per compare query (default and maximum: 1000).
    #[serde(default = "default_window_size")]
    pub window_size: i64,

    /// How divergences within a window are handled.
    #[serde(default)]
    pub mode: CompareMode,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            mode: CompareMode::default(),
        }
    }
}

/// How the comparator walks a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareMode {
    /// Stop at the first divergence, then resume the scan just past it.
    #[default]
    FirstPerWindow,

    /// Merge the two row streams by id and report every divergence.
    Strict,
}

impl std::fmt::Display for CompareMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompareMode::FirstPerWindow => write!(f, "first_per_window"),
            CompareMode::Strict => write!(f, "strict"),
        }
    }
}

fn default_window_size() -> i64 {
    MAX_WINDOW_SIZE
}
