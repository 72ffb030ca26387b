//! [`OccupancyGrid`] – typed, read-only view over one occupancy snapshot.
//!
//! A snapshot bundles the grid [`GridMetadata`], the world pose of pixel
//! `(0, 0)` and a row-major cell buffer (`index = row * width + col`).  Raw
//! wire values are decoded once at construction; anything other than
//! `-1`/`0`/`100` becomes [`CellState::Occupied`].
//!
//! Snapshots are never mutated.  Each exploration cycle fetches a new one and
//! drops the previous.

use scout_types::{CellState, GridCell, GridMetadata, Pose2D, ScoutError};

use crate::transform::{Quaternion, Vec3};

/// Wire form of an occupancy grid response.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct GridMessage {
    pub width: usize,
    pub height: usize,
    pub resolution: f64,
    pub origin_position: Vec3,
    pub origin_orientation: Quaternion,
    pub data: Vec<i8>,
}

/// One occupancy grid snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyGrid {
    metadata: GridMetadata,
    origin: Pose2D,
    cells: Vec<CellState>,
}

impl OccupancyGrid {
    /// Build a grid from raw wire values.
    ///
    /// # Errors
    ///
    /// Returns [`ScoutError::InvalidGrid`] when the resolution is not a
    /// positive finite number, a dimension does not fit a signed cell index,
    /// or the buffer length differs from `width * height`.
    pub fn new(metadata: GridMetadata, origin: Pose2D, raw: &[i8]) -> Result<Self, ScoutError> {
        if !(metadata.resolution.is_finite() && metadata.resolution > 0.0) {
            return Err(ScoutError::InvalidGrid(format!(
                "resolution must be positive, got {}",
                metadata.resolution
            )));
        }
        let cell_count = metadata
            .cell_count()
            .filter(|_| i64::try_from(metadata.width.max(metadata.height)).is_ok())
            .ok_or_else(|| {
                ScoutError::InvalidGrid(format!(
                    "{}x{} grid is too large to index",
                    metadata.width, metadata.height
                ))
            })?;
        if raw.len() != cell_count {
            return Err(ScoutError::InvalidGrid(format!(
                "expected {} cells for a {}x{} grid, got {}",
                cell_count,
                metadata.width,
                metadata.height,
                raw.len()
            )));
        }
        Ok(Self {
            metadata,
            origin,
            cells: raw.iter().copied().map(CellState::from_raw).collect(),
        })
    }

    /// Build a grid whose every cell has the same state.
    pub fn filled(
        metadata: GridMetadata,
        origin: Pose2D,
        state: CellState,
    ) -> Result<Self, ScoutError> {
        let cells = metadata.cell_count().ok_or_else(|| {
            ScoutError::InvalidGrid(format!(
                "{}x{} grid is too large to index",
                metadata.width, metadata.height
            ))
        })?;
        Self::new(metadata, origin, &vec![state.to_raw(); cells])
    }

    /// Decode a [`GridMessage`]; the origin heading is the yaw of its
    /// orientation quaternion.
    pub fn from_message(msg: &GridMessage) -> Result<Self, ScoutError> {
        let metadata = GridMetadata::new(msg.width, msg.height, msg.resolution);
        let origin = Pose2D::new(
            msg.origin_position.x,
            msg.origin_position.y,
            msg.origin_orientation.yaw(),
        );
        Self::new(metadata, origin, &msg.data)
    }

    /// Encode back to the wire form.
    pub fn to_message(&self) -> GridMessage {
        GridMessage {
            width: self.metadata.width,
            height: self.metadata.height,
            resolution: self.metadata.resolution,
            origin_position: Vec3::new(self.origin.x, self.origin.y, 0.0),
            origin_orientation: Quaternion::from_yaw(self.origin.theta),
            data: self.to_raw(),
        }
    }

    pub fn metadata(&self) -> &GridMetadata {
        &self.metadata
    }

    pub fn origin(&self) -> Pose2D {
        self.origin
    }

    pub fn width(&self) -> usize {
        self.metadata.width
    }

    pub fn height(&self) -> usize {
        self.metadata.height
    }

    /// `true` when `(row, col)` lies in `[0, height) × [0, width)`.
    pub fn in_bounds(&self, row: i64, col: i64) -> bool {
        row >= 0
            && col >= 0
            && (row as u64) < self.height() as u64
            && (col as u64) < self.width() as u64
    }

    /// State of the cell at `(row, col)`.
    ///
    /// # Errors
    ///
    /// Returns [`ScoutError::OutOfBounds`] outside the grid.
    pub fn cell_at(&self, row: i64, col: i64) -> Result<CellState, ScoutError> {
        if !self.in_bounds(row, col) {
            return Err(ScoutError::OutOfBounds {
                row,
                col,
                width: self.width(),
                height: self.height(),
            });
        }
        Ok(self.cells[row as usize * self.width() + col as usize])
    }

    /// Convenience wrapper around [`cell_at`][Self::cell_at] for a [`GridCell`].
    pub fn state(&self, cell: GridCell) -> Result<CellState, ScoutError> {
        self.cell_at(cell.row, cell.col)
    }

    /// Iterate `(cell, state)` in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (GridCell, CellState)> + '_ {
        let width = self.width();
        self.cells.iter().enumerate().map(move |(i, s)| {
            (GridCell::new((i / width) as i64, (i % width) as i64), *s)
        })
    }

    /// Number of cells in `state`.
    pub fn count(&self, state: CellState) -> usize {
        self.cells.iter().filter(|s| **s == state).count()
    }

    /// Fraction of cells that are not [`CellState::Unknown`]; `1.0` for an
    /// empty grid.
    pub fn known_fraction(&self) -> f64 {
        if self.cells.is_empty() {
            return 1.0;
        }
        1.0 - self.count(CellState::Unknown) as f64 / self.cells.len() as f64
    }

    /// Cell buffer in the canonical wire encoding.
    pub fn to_raw(&self) -> Vec<i8> {
        self.cells.iter().map(|s| s.to_raw()).collect()
    }
}
