//! Result types for range comparison.

use serde::{Deserialize, Serialize};

use crate::config::CompareMode;
use crate::db::RowHash;
use crate::snapshot::Checkpoint;

/// Why a row pair diverged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MismatchKind {
    /// Source row has no counterpart in the target.
    RowMissingInTarget,
    /// Target row has no counterpart in the source (strict mode only).
    RowMissingInSource,
    /// Same id on both sides, different content hash.
    HashMismatch,
}

impl std::fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MismatchKind::RowMissingInTarget => write!(f, "row-missing-in-target"),
            MismatchKind::RowMissingInSource => write!(f, "row-missing-in-source"),
            MismatchKind::HashMismatch => write!(f, "hash-mismatch"),
        }
    }
}

/// One detected divergence between source and target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MismatchRecord {
    /// Table the rows belong to.
    pub table: String,
    /// Classification.
    pub kind: MismatchKind,
    /// Source row id, if the source side had a row.
    pub source_id: Option<i64>,
    /// Target row id, if the target side had a row.
    pub target_id: Option<i64>,
    /// Source row hash.
    pub source_hash: Option<String>,
    /// Target row hash.
    pub target_hash: Option<String>,
}

impl MismatchRecord {
    /// Compare a source row against the target row paired with it.
    ///
    /// Returns `None` when both rows carry the same id and hash. A target that
    /// ran out of rows, or whose row is already past the source id, means the
    /// source row is missing in the target. Any other id or hash difference
    /// is a hash mismatch.
    pub fn classify(table: &str, source: &RowHash, target: Option<&RowHash>) -> Option<Self> {
        let kind = match target {
            None => MismatchKind::RowMissingInTarget,
            Some(t) if t.id > source.id => MismatchKind::RowMissingInTarget,
            Some(t) if t.id != source.id || t.hash != source.hash => MismatchKind::HashMismatch,
            Some(_) => return None,
        };

        Some(Self {
            table: table.to_string(),
            kind,
            source_id: Some(source.id),
            target_id: target.map(|t| t.id),
            source_hash: source.hash.clone(),
            target_hash: target.and_then(|t| t.hash.clone()),
        })
    }

    /// A source row with nothing to pair it with.
    pub fn missing_in_target(table: &str, source: &RowHash) -> Self {
        Self {
            table: table.to_string(),
            kind: MismatchKind::RowMissingInTarget,
            source_id: Some(source.id),
            target_id: None,
            source_hash: source.hash.clone(),
            target_hash: None,
        }
    }

    /// A target row with nothing to pair it with.
    pub fn missing_in_source(table: &str, target: &RowHash) -> Self {
        Self {
            table: table.to_string(),
            kind: MismatchKind::RowMissingInSource,
            source_id: None,
            target_id: Some(target.id),
            source_hash: None,
            target_hash: target.hash.clone(),
        }
    }

    /// The id the report is anchored on: the source id when there is one.
    pub fn id(&self) -> i64 {
        self.source_id.or(self.target_id).unwrap_or_default()
    }

    /// Id to resume scanning after: the larger of the two sides, so the scan
    /// always moves forward whichever side is ahead.
    pub fn resync_id(&self) -> i64 {
        match (self.source_id, self.target_id) {
            (Some(s), Some(t)) => s.max(t),
            (Some(id), None) | (None, Some(id)) => id,
            (None, None) => 0,
        }
    }
}

/// Per-table outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// Both boundaries were zero, nothing was queried.
    Skipped,
    /// Every compared row matched.
    Passed,
    /// At least one divergence was found.
    Failed,
}

/// Comparison result for a table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableCompareResult {
    /// Table name.
    pub table: String,
    /// Checkpoint start id.
    pub start_id: i64,
    /// Checkpoint stop id.
    pub stop_id: i64,
    /// Outcome.
    pub status: TableStatus,
    /// Compare windows scanned.
    pub windows: u64,
    /// Source rows walked.
    pub rows_compared: u64,
    /// Divergences counted.
    pub issues: u64,
    /// Divergence details.
    pub mismatches: Vec<MismatchRecord>,
    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl TableCompareResult {
    /// Start a result for a table about to be scanned.
    pub fn new(table: &str, checkpoint: Checkpoint) -> Self {
        Self {
            table: table.to_string(),
            start_id: checkpoint.start_id,
            stop_id: checkpoint.stop_id,
            status: TableStatus::Passed,
            windows: 0,
            rows_compared: 0,
            issues: 0,
            mismatches: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Result for a table that was not scanned.
    pub fn skipped(table: &str, checkpoint: Checkpoint) -> Self {
        Self {
            status: TableStatus::Skipped,
            ..Self::new(table, checkpoint)
        }
    }

    /// Count a divergence.
    pub fn record(&mut self, mismatch: MismatchRecord) {
        self.issues += 1;
        self.status = TableStatus::Failed;
        self.mismatches.push(mismatch);
    }

    /// Whether no divergence was found.
    pub fn is_clean(&self) -> bool {
        self.issues == 0
    }
}

/// Comparison result for all tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareSummary {
    /// How windows were walked.
    pub mode: CompareMode,
    /// Results for each table.
    pub tables: Vec<TableCompareResult>,
    /// Tables that were scanned.
    pub tables_checked: usize,
    /// Tables without divergences.
    pub tables_passed: usize,
    /// Tables with divergences.
    pub tables_with_issues: usize,
    /// Tables skipped (both boundaries zero).
    pub tables_skipped: usize,
    /// Source rows walked across all tables.
    pub total_rows: u64,
    /// Divergences across all tables.
    pub total_issues: u64,
    /// Total duration in milliseconds.
    pub duration_ms: u64,
}

impl CompareSummary {
    /// Create a new empty summary.
    pub fn new(mode: CompareMode) -> Self {
        Self {
            mode,
            tables: Vec::new(),
            tables_checked: 0,
            tables_passed: 0,
            tables_with_issues: 0,
            tables_skipped: 0,
            total_rows: 0,
            total_issues: 0,
            duration_ms: 0,
        }
    }

    /// Add a table result.
    pub fn add_table(&mut self, result: TableCompareResult) {
        match result.status {
            TableStatus::Skipped => self.tables_skipped += 1,
            TableStatus::Passed => {
                self.tables_checked += 1;
                self.tables_passed += 1;
            }
            TableStatus::Failed => {
                self.tables_checked += 1;
                self.tables_with_issues += 1;
            }
        }
        self.total_rows += result.rows_compared;
        self.total_issues += result.issues;
        self.tables.push(result);
    }

    /// Whether any table diverged.
    pub fn has_issues(&self) -> bool {
        self.total_issues > 0
    }

    /// Look up a table's result.
    pub fn table(&self, name: &str) -> Option<&TableCompareResult> {
        self.tables.iter().find(|t| t.table == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_matching_rows() {
        let s = RowHash::new(1, "a");
        assert!(MismatchRecord::classify("t", &s, Some(&RowHash::new(1, "a"))).is_none());
    }

    #[test]
    fn test_classify_exhausted_target() {
        let m = MismatchRecord::classify("t", &RowHash::new(3, "c"), None).unwrap();
        assert_eq!(m.kind, MismatchKind::RowMissingInTarget);
        assert_eq!(m.id(), 3);
        assert_eq!(m.resync_id(), 3);
    }

    #[test]
    fn test_classify_target_ahead() {
        let m = MismatchRecord::classify("t", &RowHash::new(3, "c"), Some(&RowHash::new(4, "d")))
            .unwrap();
        assert_eq!(m.kind, MismatchKind::RowMissingInTarget);
        assert_eq!(m.id(), 3);
        assert_eq!(m.resync_id(), 4);
    }

    #[test]
    fn test_classify_target_behind() {
        let m = MismatchRecord::classify("t", &RowHash::new(5, "e"), Some(&RowHash::new(4, "d")))
            .unwrap();
        assert_eq!(m.kind, MismatchKind::HashMismatch);
        assert_eq!(m.source_id, Some(5));
        assert_eq!(m.target_id, Some(4));
        assert_eq!(m.resync_id(), 5);
    }

    #[test]
    fn test_classify_hash_difference() {
        let m = MismatchRecord::classify("t", &RowHash::new(2, "b"), Some(&RowHash::new(2, "x")))
            .unwrap();
        assert_eq!(m.kind, MismatchKind::HashMismatch);
        assert_eq!(m.source_hash.as_deref(), Some("b"));
        assert_eq!(m.target_hash.as_deref(), Some("x"));
    }

    #[test]
    fn test_null_hash_differs_from_value() {
        let target = RowHash { id: 2, hash: None };
        let m = MismatchRecord::classify("t", &RowHash::new(2, "b"), Some(&target)).unwrap();
        assert_eq!(m.kind, MismatchKind::HashMismatch);
    }

    #[test]
    fn test_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&MismatchKind::RowMissingInTarget).unwrap();
        assert_eq!(json, "\"row-missing-in-target\"");
        assert_eq!(MismatchKind::HashMismatch.to_string(), "hash-mismatch");
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = CompareSummary::new(CompareMode::FirstPerWindow);
        summary.add_table(TableCompareResult::skipped("a", Checkpoint::new(0, 0)));

        let mut clean = TableCompareResult::new("b", Checkpoint::new(0, 5));
        clean.rows_compared = 5;
        summary.add_table(clean);

        let mut dirty = TableCompareResult::new("c", Checkpoint::new(0, 5));
        dirty.rows_compared = 3;
        dirty.record(MismatchRecord::missing_in_target("c", &RowHash::new(3, "x")));
        summary.add_table(dirty);

        assert_eq!(summary.tables_skipped, 1);
        assert_eq!(summary.tables_checked, 2);
        assert_eq!(summary.tables_passed, 1);
        assert_eq!(summary.tables_with_issues, 1);
        assert_eq!(summary.total_rows, 8);
        assert_eq!(summary.total_issues, 1);
        assert!(summary.has_issues());
        assert_eq!(summary.table("c").unwrap().status, TableStatus::Failed);
    }
}
