//! Frontier detection.
//!
//! A *frontier cell* is a free cell with at least one unknown cell among its
//! eight neighbours.  Neighbours outside the grid never count as unknown.
//!
//! Two discovery strategies are offered:
//!
//! * [`FrontierDetector::nearest_frontier`] – expanding-square ring search
//!   around a start cell.  Rings start at [`DEFAULT_MIN_SEARCH_RADIUS`] and
//!   grow by one cell per iteration; only the perimeter of each square is
//!   scanned and the first hit wins.  Cells closer than the minimum radius
//!   are never examined, and the first hit on a ring is not necessarily the
//!   Euclidean-closest cell on that ring.
//! * [`FrontierDetector::find_any_free_frontier`] – row-major raster scan of
//!   the whole grid, independent of the robot position.
//!
//! # Ring scan order
//!
//! For a square of radius `r` centred on `(row, col)`:
//!
//! 1. top row `row - r`, left → right,
//! 2. bottom row `row + r`, left → right,
//! 3. each interior row top → bottom: the left column cell, then the right
//!    column cell.
//!
//! Perimeter cells outside the grid are skipped, and rings that cannot reach
//! the grid are never walked.  The search gives up once a ring lies beyond
//! the grid on all four sides.

use scout_types::{CellState, GridCell};
use tracing::trace;

use crate::grid::OccupancyGrid;

/// Smallest ring radius examined by [`FrontierDetector::nearest_frontier`].
pub const DEFAULT_MIN_SEARCH_RADIUS: u32 = 4;

const NEIGHBOUR_OFFSETS: [(i64, i64); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Frontier queries over a borrowed [`OccupancyGrid`].
#[derive(Debug, Clone, Copy)]
pub struct FrontierDetector<'a> {
    grid: &'a OccupancyGrid,
    min_radius: u32,
}

impl<'a> FrontierDetector<'a> {
    pub fn new(grid: &'a OccupancyGrid) -> Self {
        Self {
            grid,
            min_radius: DEFAULT_MIN_SEARCH_RADIUS,
        }
    }

    /// Override the first ring radius.
    pub fn with_min_radius(mut self, min_radius: u32) -> Self {
        self.min_radius = min_radius;
        self
    }

    pub fn min_radius(&self) -> u32 {
        self.min_radius
    }

    /// `true` iff `(row, col)` is free and has an unknown 8-neighbour.
    ///
    /// Returns `false` for cells outside the grid.
    pub fn is_frontier(&self, row: i64, col: i64) -> bool {
        if !matches!(self.grid.cell_at(row, col), Ok(CellState::Free)) {
            return false;
        }
        NEIGHBOUR_OFFSETS.iter().any(|(dr, dc)| {
            matches!(
                self.grid.cell_at(row + dr, col + dc),
                Ok(CellState::Unknown)
            )
        })
    }

    /// Expanding-ring search for a frontier cell around `(from_row, from_col)`.
    ///
    /// The start cell may lie outside the grid, as far as `i64` reaches.
    /// Rings that cannot reach the grid are skipped and each ring only walks
    /// the part of its perimeter inside the grid.  Returns `None` when every
    /// ring that still touches the grid has been scanned without a hit.
    pub fn nearest_frontier(&self, from_row: i64, from_col: i64) -> Option<GridCell> {
        let (Some(last_row), Some(last_col)) = (self.last_row(), self.last_col()) else {
            return None;
        };

        // Chebyshev distance to the nearest and to the farthest grid cell.
        let near = axis_gap(from_row, last_row).max(axis_gap(from_col, last_col));
        let far = from_row
            .saturating_abs()
            .max(last_row.saturating_sub(from_row).saturating_abs())
            .max(from_col.saturating_abs())
            .max(last_col.saturating_sub(from_col).saturating_abs());

        let first = i64::from(self.min_radius).max(near);
        for radius in first..=far {
            if let Some(cell) = self.scan_ring(from_row, from_col, radius) {
                trace!(radius, row = cell.row, col = cell.col, "ring search hit");
                return Some(cell);
            }
        }
        trace!(far, "ring search exhausted");
        None
    }

    /// First frontier cell in row-major order, if any.
    pub fn find_any_free_frontier(&self) -> Option<GridCell> {
        self.frontiers().next()
    }

    /// Every frontier cell, in row-major order.
    pub fn all_frontiers(&self) -> Vec<GridCell> {
        self.frontiers().collect()
    }

    fn frontiers(&self) -> impl Iterator<Item = GridCell> + '_ {
        self.grid
            .cells()
            .filter(|(_, state)| *state == CellState::Free)
            .map(|(cell, _)| cell)
            .filter(|cell| self.is_frontier(cell.row, cell.col))
    }

    fn last_row(&self) -> Option<i64> {
        i64::try_from(self.grid.height()).ok()?.checked_sub(1).filter(|r| *r >= 0)
    }

    fn last_col(&self) -> Option<i64> {
        i64::try_from(self.grid.width()).ok()?.checked_sub(1).filter(|c| *c >= 0)
    }

    /// Scan the in-grid part of the square perimeter of `radius` around
    /// `(row, col)` in ring order.
    fn scan_ring(&self, row: i64, col: i64, radius: i64) -> Option<GridCell> {
        let (Some(last_row), Some(last_col)) = (self.last_row(), self.last_col()) else {
            return None;
        };
        if radius == 0 {
            return self.hit(row, col);
        }

        let top = row.saturating_sub(radius);
        let bottom = row.saturating_add(radius);
        let left = col.saturating_sub(radius);
        let right = col.saturating_add(radius);

        let columns = clamp_span(left, right, last_col);
        for r in [top, bottom] {
            if !(0..=last_row).contains(&r) {
                continue;
            }
            for c in columns.clone() {
                if let Some(cell) = self.hit(r, c) {
                    return Some(cell);
                }
            }
        }

        let sides: Vec<i64> = [left, right]
            .into_iter()
            .filter(|c| (0..=last_col).contains(c))
            .collect();
        if sides.is_empty() {
            return None;
        }
        for r in clamp_span(top.saturating_add(1), bottom.saturating_sub(1), last_row) {
            for &c in &sides {
                if let Some(cell) = self.hit(r, c) {
                    return Some(cell);
                }
            }
        }

        None
    }

    fn hit(&self, row: i64, col: i64) -> Option<GridCell> {
        self.is_frontier(row, col).then(|| GridCell::new(row, col))
    }
}

/// Distance from `at` to the index range `0..=last` along one axis.
fn axis_gap(at: i64, last: i64) -> i64 {
    if at < 0 {
        at.saturating_neg()
    } else {
        at.saturating_sub(last).max(0)
    }
}

/// `lo..=hi` clipped to `0..=last`; empty when they do not overlap.
fn clamp_span(lo: i64, hi: i64, last: i64) -> std::ops::RangeInclusive<i64> {
    lo.max(0)..=hi.min(last)
}
