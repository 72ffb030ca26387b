//! [`StallGuard`] – repeated-goal detector.
//!
//! Frontier selection is deterministic, so when driving to a frontier does
//! not change the map (the goal is unreachable, or the sensor cannot see
//! past it) the planner picks the same cell again on the next cycle.  The
//! guard watches the stream of goal cells and reports when the last
//! `threshold` goals were all the same cell.
//!
//! # Example
//!
//! ```rust
//! use scout_runtime::stall_guard::StallGuard;
//! use scout_types::GridCell;
//!
//! let mut guard = StallGuard::new(3);
//! let cell = GridCell::new(4, 7);
//!
//! assert!(!guard.record(cell));
//! assert!(!guard.record(cell));
//! assert!(guard.record(cell)); // third repeat → stalled
//! ```

use std::collections::VecDeque;

use scout_types::GridCell;

/// Detects the planner issuing the same goal cell over and over.
///
/// A `threshold` of 0 disables detection.
#[derive(Debug, Clone)]
pub struct StallGuard {
    threshold: usize,
    history: VecDeque<GridCell>,
}

impl StallGuard {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold,
            history: VecDeque::with_capacity(threshold),
        }
    }

    /// Record that `cell` was just issued as a goal.
    ///
    /// Returns `true` when it completes a run of `threshold` identical goals.
    pub fn record(&mut self, cell: GridCell) -> bool {
        if self.threshold == 0 {
            return false;
        }
        self.history.push_back(cell);
        while self.history.len() > self.threshold {
            self.history.pop_front();
        }
        self.is_stalled()
    }

    /// `true` when the window is full and every entry is identical.
    pub fn is_stalled(&self) -> bool {
        if self.threshold == 0 || self.history.len() < self.threshold {
            return false;
        }
        let first = self.history[0];
        self.history.iter().all(|c| *c == first)
    }
}
