//! `scout-types` – shared vocabulary of the Scout exploration stack.
//!
//! Every other crate speaks in these types: world and grid poses, grid
//! metadata, cell states, exploration goals, navigation outcomes, the event
//! wrapper published on the bus, and the single [`ScoutError`] enum.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Poses and cells
// ────────────────────────────────────────────────────────────────────────────

/// A rigid-body pose in the continuous world ("map") frame.
///
/// `x`/`y` are metres, `theta` is the heading in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose2D {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
}

impl Pose2D {
    pub fn new(x: f64, y: f64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    /// Euclidean distance between the positions of two poses (heading ignored).
    pub fn distance(&self, other: &Pose2D) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// A pose expressed in pixel coordinates of an occupancy grid.
///
/// `x` is the column index and `y` the row index.  Values may lie outside the
/// grid (e.g. a robot that has driven off the mapped area).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GridPose {
    pub x: i64,
    pub y: i64,
    pub theta: f64,
}

impl GridPose {
    pub fn new(x: i64, y: i64, theta: f64) -> Self {
        Self { x, y, theta }
    }

    /// Grid pose located at `cell`, with the given heading.
    pub fn from_cell(cell: GridCell, theta: f64) -> Self {
        Self::new(cell.col, cell.row, theta)
    }

    /// The `(row, col)` cell this pose sits in.
    pub fn to_cell(self) -> GridCell {
        GridCell::new(self.y, self.x)
    }
}

/// A `(row, col)` coordinate in an occupancy grid.
///
/// Signed so that search code can step past the grid edges without
/// wrap-around; bounds are checked by the grid itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridCell {
    pub row: i64,
    pub col: i64,
}

impl GridCell {
    pub fn new(row: i64, col: i64) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for GridCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Grid description
// ────────────────────────────────────────────────────────────────────────────

/// Grid dimensions in cells and the edge length of one cell in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridMetadata {
    pub width: usize,
    pub height: usize,
    pub resolution: f64,
}

impl GridMetadata {
    pub fn new(width: usize, height: usize, resolution: f64) -> Self {
        Self {
            width,
            height,
            resolution,
        }
    }

    /// Total number of cells (`width * height`), or `None` when the product
    /// overflows `usize`.
    pub fn cell_count(&self) -> Option<usize> {
        self.width.checked_mul(self.height)
    }
}

/// Occupancy state of a single grid cell.
///
/// The wire encoding is `-1` unknown, `0` free, `100` occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellState {
    Unknown,
    Free,
    Occupied,
}

impl CellState {
    pub const RAW_UNKNOWN: i8 = -1;
    pub const RAW_FREE: i8 = 0;
    pub const RAW_OCCUPIED: i8 = 100;

    /// Decode a wire value.  Anything outside `{-1, 0, 100}` is treated as
    /// occupied.
    pub fn from_raw(value: i8) -> Self {
        match value {
            Self::RAW_UNKNOWN => CellState::Unknown,
            Self::RAW_FREE => CellState::Free,
            _ => CellState::Occupied,
        }
    }

    /// Encode back to the canonical wire value.
    pub fn to_raw(self) -> i8 {
        match self {
            CellState::Unknown => Self::RAW_UNKNOWN,
            CellState::Free => Self::RAW_FREE,
            CellState::Occupied => Self::RAW_OCCUPIED,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Goals and outcomes
// ────────────────────────────────────────────────────────────────────────────

/// Which search produced a frontier goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrontierStrategy {
    /// Expanding-square ring search around the robot.
    Ring,
    /// Full row-major raster scan of the grid.
    Raster,
}

/// A world-frame navigation target produced by one planning cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplorationGoal {
    /// Monotonically increasing, starting at 1.
    pub sequence: u64,
    /// Target pose in the world frame.
    pub pose: Pose2D,
    /// The frontier cell the pose was derived from.
    pub cell: GridCell,
    pub strategy: FrontierStrategy,
}

/// Terminal status reported by the external navigation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalStatus {
    Succeeded,
    Aborted,
    TimedOut,
    Preempted,
}

/// Outcome of executing one goal, as seen by the exploration loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GoalOutcome {
    Succeeded,
    Aborted,
    TimedOut,
}

impl From<GoalStatus> for GoalOutcome {
    fn from(status: GoalStatus) -> Self {
        match status {
            GoalStatus::Succeeded => GoalOutcome::Succeeded,
            GoalStatus::Aborted | GoalStatus::Preempted => GoalOutcome::Aborted,
            GoalStatus::TimedOut => GoalOutcome::TimedOut,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Loop state and reporting
// ────────────────────────────────────────────────────────────────────────────

/// States of the exploration state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LoopState {
    Fetching,
    Planning,
    Driving,
    Complete,
    Failed,
}

impl LoopState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LoopState::Complete | LoopState::Failed)
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopState::Fetching => "FETCHING",
            LoopState::Planning => "PLANNING",
            LoopState::Driving => "DRIVING",
            LoopState::Complete => "COMPLETE",
            LoopState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// How an exploration run ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// No reachable frontier remains.
    Complete,
    /// Retries were exhausted or the run stalled.
    Failed { reason: String },
    /// Shutdown was requested before a terminal state was reached.
    Cancelled,
}

/// Summary returned to the caller when the exploration loop stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopReport {
    pub termination: Termination,
    /// Number of FETCHING → PLANNING passes that completed.
    pub cycles: u64,
    pub goals_issued: u64,
    pub goals_succeeded: u64,
}

// ────────────────────────────────────────────────────────────────────────────
// Events
// ────────────────────────────────────────────────────────────────────────────

/// Unified event wrapper for the exploration event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g. `"scout-runtime::explore_loop"`
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Wrap `payload` with a fresh id and the current time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    StateChanged { from: LoopState, to: LoopState },
    /// A fresh grid + pose pair fetched at the start of a cycle.  Cells use
    /// the wire encoding.
    Snapshot {
        cycle: u64,
        metadata: GridMetadata,
        origin: Pose2D,
        cells: Vec<i8>,
        robot: Pose2D,
    },
    GoalIssued(ExplorationGoal),
    GoalFinished { sequence: u64, outcome: GoalOutcome },
    RetryScheduled { stage: String, attempt: u32 },
    Finished(LoopReport),
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Global error type for grid queries, provider failures, navigation
/// transport errors, and configuration problems.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ScoutError {
    #[error("cell ({row}, {col}) is outside the {width}x{height} grid")]
    OutOfBounds {
        row: i64,
        col: i64,
        width: usize,
        height: usize,
    },

    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Occupancy grid unavailable: {0}")]
    GridUnavailable(String),

    #[error("Robot pose unavailable: {0}")]
    PoseUnavailable(String),

    #[error("Navigation service error: {0}")]
    Navigation(String),

    #[error("operation cancelled by shutdown")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_state_decodes_wire_values() {
        assert_eq!(CellState::from_raw(-1), CellState::Unknown);
        assert_eq!(CellState::from_raw(0), CellState::Free);
        assert_eq!(CellState::from_raw(100), CellState::Occupied);
    }

    #[test]
    fn unexpected_cell_values_decode_as_occupied() {
        for raw in [1_i8, 50, 99, 101, 127, -2, -128] {
            assert_eq!(CellState::from_raw(raw), CellState::Occupied, "raw={raw}");
        }
    }

    #[test]
    fn grid_pose_cell_mapping_swaps_axes() {
        let pose = GridPose::new(9, 5, 0.0);
        assert_eq!(pose.to_cell(), GridCell::new(5, 9));
        assert_eq!(GridPose::from_cell(GridCell::new(5, 9), 0.0), pose);
    }

    #[test]
    fn preempted_maps_to_aborted() {
        assert_eq!(GoalOutcome::from(GoalStatus::Preempted), GoalOutcome::Aborted);
        assert_eq!(GoalOutcome::from(GoalStatus::TimedOut), GoalOutcome::TimedOut);
        assert_eq!(GoalOutcome::from(GoalStatus::Succeeded), GoalOutcome::Succeeded);
    }

    #[test]
    fn terminal_states() {
        assert!(LoopState::Complete.is_terminal());
        assert!(LoopState::Failed.is_terminal());
        assert!(!LoopState::Driving.is_terminal());
        assert_eq!(LoopState::Fetching.to_string(), "FETCHING");
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "scout-runtime::explore_loop",
            EventPayload::GoalIssued(ExplorationGoal {
                sequence: 3,
                pose: Pose2D::new(0.45, 0.25, 0.0),
                cell: GridCell::new(5, 9),
                strategy: FrontierStrategy::Ring,
            }),
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        match back.payload {
            EventPayload::GoalIssued(goal) => assert_eq!(goal.sequence, 3),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn scout_error_display() {
        let err = ScoutError::OutOfBounds {
            row: 12,
            col: -1,
            width: 10,
            height: 10,
        };
        assert!(err.to_string().contains("(12, -1)"));
        assert!(ScoutError::GridUnavailable("timeout".into())
            .to_string()
            .contains("timeout"));
    }
}
