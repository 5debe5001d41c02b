//! ID windows over a table's checkpoint range.

use crate::snapshot::Checkpoint;

/// One compare query's ID range, `[start, stop)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComparisonWindow {
    /// First id of the window.
    pub start: i64,
    /// Upper bound handed to the compare query.
    pub stop: i64,
    /// Whether this window ends at the checkpoint's stop id.
    pub last: bool,
}

/// Cursor that walks a checkpoint range in bounded windows.
///
/// Windows tile the range: each full window covers exactly `size` ids and the
/// final one runs to the stop id. After a divergence, [`resync`] moves the
/// next window's start just past the offending id instead.
///
/// [`resync`]: WindowCursor::resync
#[derive(Debug, Clone)]
pub struct WindowCursor {
    next_start: i64,
    stop_id: i64,
    size: i64,
    done: bool,
}

impl WindowCursor {
    /// Create a cursor over `[checkpoint.start_id, checkpoint.stop_id)`.
    pub fn new(checkpoint: Checkpoint, size: i64) -> Self {
        Self {
            next_start: checkpoint.start_id,
            stop_id: checkpoint.stop_id,
            size: size.max(1),
            done: false,
        }
    }

    /// Produce the next window, or `None` once the final window was handed out.
    pub fn next_window(&mut self) -> Option<ComparisonWindow> {
        if self.done {
            return None;
        }

        let start = self.next_start;
        // Saturates for ranges wider than i64 can hold; start + size then
        // stays below stop_id.
        if self.stop_id.saturating_sub(start) > self.size {
            self.next_start = start + self.size;
            Some(ComparisonWindow {
                start,
                stop: start + self.size,
                last: false,
            })
        } else {
            self.done = true;
            Some(ComparisonWindow {
                start,
                stop: self.stop_id,
                last: true,
            })
        }
    }

    /// Continue the scan just past `id` after a divergence inside `window`.
    ///
    /// The next window starts at `id + 1`, never before `window.start + 1`
    /// and never past the stop id. A divergence in the final window ends the
    /// scan.
    pub fn resync(&mut self, id: i64, window: &ComparisonWindow) {
        if self.done {
            return;
        }
        self.next_start = id
            .saturating_add(1)
            .max(window.start.saturating_add(1))
            .min(self.stop_id);
    }

    /// Start of the next window.
    pub fn next_start(&self) -> i64 {
        self.next_start
    }
}
