//! File-based snapshot of per-table ID checkpoints.
//!
//! The before-phase writes a fresh snapshot, the after-phase reads it back,
//! fills in `stopId` and writes a second file, and the compare phase reads
//! that one. Files are pretty-printed JSON readable only by their owner:
//!
//! ```json
//! {
//!   "orders": {
//!     "startId": 10,
//!     "stopId": 2010
//!   }
//! }
//! ```

use crate::error::{CheckError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// ID boundaries recorded for one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Boundary collected before the upgrade window.
    #[serde(default)]
    pub start_id: i64,

    /// Boundary collected after the upgrade window.
    #[serde(default)]
    pub stop_id: i64,
}

impl Checkpoint {
    /// Create a checkpoint from both boundaries.
    pub fn new(start_id: i64, stop_id: i64) -> Self {
        Self { start_id, stop_id }
    }

    /// A table with both boundaries at zero saw no relevant activity.
    pub fn is_inactive(&self) -> bool {
        self.start_id == 0 && self.stop_id == 0
    }

    /// Whether the range runs backwards.
    pub fn is_inverted(&self) -> bool {
        self.stop_id < self.start_id
    }

    /// Number of IDs covered by `[start_id, stop_id)`, zero when inverted.
    pub fn span(&self) -> i64 {
        self.stop_id.saturating_sub(self.start_id).max(0)
    }
}

/// Table name to checkpoint mapping; the unit of persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotMap {
    tables: BTreeMap<String, Checkpoint>,
}

impl SnapshotMap {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the before-phase boundary for a table (stop stays zero).
    pub fn set_start(&mut self, table: &str, start_id: i64) {
        self.tables
            .insert(table.to_string(), Checkpoint::new(start_id, 0));
    }

    /// Set the after-phase boundary on an existing entry.
    ///
    /// Returns false, leaving the map untouched, when the table was not part
    /// of the before-phase.
    pub fn set_stop(&mut self, table: &str, stop_id: i64) -> bool {
        match self.tables.get_mut(table) {
            Some(checkpoint) => {
                checkpoint.stop_id = stop_id;
                true
            }
            None => false,
        }
    }

    /// Get the checkpoint for a table.
    pub fn get(&self, table: &str) -> Option<&Checkpoint> {
        self.tables.get(table)
    }

    /// Whether the snapshot has an entry for a table.
    pub fn contains(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Iterate over entries in table name order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Checkpoint)> {
        self.tables.iter()
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Load a snapshot from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                CheckError::Precondition(format!("file is missing: {}", path.display()))
            } else {
                CheckError::snapshot(path, format!("error reading file: {}", e))
            }
        })?;

        serde_json::from_str(&content)
            .map_err(|e| CheckError::snapshot(path, format!("error parsing JSON: {}", e)))
    }

    /// Write the snapshot to a new file.
    ///
    /// Parent directories are created as needed. Fails with a precondition
    /// error if the file already exists; an existing baseline is never
    /// overwritten.
    pub fn save_new<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        ensure_absent(path)?;

        let content = serde_json::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = create_new_private(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::AlreadyExists {
                CheckError::Precondition(format!("file already exists: {}", path.display()))
            } else {
                CheckError::Io(e)
            }
        })?;
        file.write_all(content.as_bytes())?;
        file.sync_all()?;

        Ok(())
    }
}

/// Fail if a file that is about to be written already exists.
pub fn ensure_absent(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(CheckError::Precondition(format!(
            "file already exists: {}",
            path.display()
        )));
    }
    Ok(())
}

/// Fail if a file that is about to be read does not exist.
pub fn ensure_present(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(CheckError::Precondition(format!(
            "file is missing: {}",
            path.display()
        )));
    }
    Ok(())
}

#[cfg(unix)]
fn create_new_private(path: &Path) -> std::io::Result<std::fs::File> {
    use std::os::unix::fs::OpenOptionsExt;

    std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_new_private(path: &Path) -> std::io::Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
}
