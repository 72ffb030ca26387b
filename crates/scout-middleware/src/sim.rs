//! In-process simulated world.
//!
//! [`SimWorld`] stands in for the map server, the pose estimator and the
//! navigation stack at once, so the exploration loop can be exercised
//! end-to-end without a robot:
//!
//! * It owns a ground-truth grid (free / occupied only) and a *revealed*
//!   grid that starts fully unknown.
//! * [`GridProvider::fetch_grid`] returns the revealed grid.
//! * [`NavigationService::send_goal`] teleports the robot onto the goal cell
//!   when that cell is free in the ground truth, then reveals every cell
//!   within `sensor_radius` that has an unobstructed line of sight.  Goals on
//!   occupied or off-map cells are aborted.
//! * Faults can be injected to exercise retry paths.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use scout_perception::transform::{Quaternion, Vec3, world_to_grid_continuous};
use scout_perception::{GridMessage, OccupancyGrid};
use scout_types::{CellState, GoalStatus, GridCell, GridMetadata, Pose2D, ScoutError};
use tracing::{debug, info};

use crate::adapter::{
    GoalHandle, GridProvider, NavGoal, NavigationService, PoseProvider, PoseRequest, StampedPose,
};

/// Tunables for [`SimWorld`].
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Visibility radius in cells.
    pub sensor_radius: f64,
    /// Delay before a goal's terminal status is reported.
    pub goal_latency: Duration,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            sensor_radius: 6.0,
            goal_latency: Duration::ZERO,
        }
    }
}

/// Outcome forced onto the next submitted goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedStatus {
    Report(GoalStatus),
    /// Never report a terminal status.
    Hang,
    /// Lose the connection while waiting for the result.
    Lost,
}

struct SimState {
    truth: Vec<CellState>,
    revealed: Vec<CellState>,
    robot: Pose2D,
    next_handle: u64,
    pending: HashMap<u64, ScriptedStatus>,
    script: VecDeque<ScriptedStatus>,
    failing_grid_fetches: u32,
    failing_pose_lookups: u32,
    failing_submissions: u32,
    hanging_submissions: u32,
    submitted: Vec<NavGoal>,
    cancelled: Vec<GoalHandle>,
}

/// Simulated map server + localisation + navigation stack.
pub struct SimWorld {
    metadata: GridMetadata,
    origin: Pose2D,
    config: SimConfig,
    state: Mutex<SimState>,
}

impl SimWorld {
    /// Build a world from a ground-truth grid.  Unknown cells in `truth` are
    /// treated as occupied.
    pub fn new(truth: &OccupancyGrid, start: Pose2D, config: SimConfig) -> Self {
        let metadata = *truth.metadata();
        let truth_cells = truth
            .cells()
            .map(|(_, s)| match s {
                CellState::Free => CellState::Free,
                _ => CellState::Occupied,
            })
            .collect::<Vec<_>>();
        let revealed = vec![CellState::Unknown; truth_cells.len()];
        let world = Self {
            metadata,
            origin: truth.origin(),
            config,
            state: Mutex::new(SimState {
                truth: truth_cells,
                revealed,
                robot: start,
                next_handle: 1,
                pending: HashMap::new(),
                script: VecDeque::new(),
                failing_grid_fetches: 0,
                failing_pose_lookups: 0,
                failing_submissions: 0,
                hanging_submissions: 0,
                submitted: Vec::new(),
                cancelled: Vec::new(),
            }),
        };
        {
            let mut state = world.state();
            if let Some(cell) = world.nearest_cell(start) {
                world.reveal_from(&mut state, cell);
            }
        }
        world
    }

    /// Parse a ground-truth map drawn in ASCII: `#` occupied, `.` free.
    /// The first non-empty line is grid row 0.
    ///
    /// # Errors
    ///
    /// [`ScoutError::InvalidGrid`] for ragged lines, unknown characters, or
    /// an empty map.
    pub fn from_ascii(
        text: &str,
        resolution: f64,
        origin: Pose2D,
        start: Pose2D,
        config: SimConfig,
    ) -> Result<Self, ScoutError> {
        let rows: Vec<&str> = text
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.is_empty())
            .collect();
        let width = rows.first().map(|r| r.chars().count()).unwrap_or(0);
        if width == 0 {
            return Err(ScoutError::InvalidGrid("ASCII map is empty".to_string()));
        }

        let mut raw = Vec::with_capacity(width * rows.len());
        for (row, line) in rows.iter().enumerate() {
            if line.chars().count() != width {
                return Err(ScoutError::InvalidGrid(format!(
                    "row {row} has {} columns, expected {width}",
                    line.chars().count()
                )));
            }
            for ch in line.chars() {
                raw.push(match ch {
                    '.' => CellState::RAW_FREE,
                    '#' => CellState::RAW_OCCUPIED,
                    other => {
                        return Err(ScoutError::InvalidGrid(format!(
                            "unexpected map character {other:?} in row {row}"
                        )));
                    }
                });
            }
        }

        let metadata = GridMetadata::new(width, rows.len(), resolution);
        let truth = OccupancyGrid::new(metadata, origin, &raw)?;
        Ok(Self::new(&truth, start, config))
    }

    // ── Inspection ───────────────────────────────────────────────────────────

    pub fn robot_pose(&self) -> Pose2D {
        self.state().robot
    }

    /// Snapshot of what has been observed so far.
    pub fn revealed_grid(&self) -> Result<OccupancyGrid, ScoutError> {
        let raw: Vec<i8> = self.state().revealed.iter().map(|s| s.to_raw()).collect();
        OccupancyGrid::new(self.metadata, self.origin, &raw)
    }

    /// Number of ground-truth free cells not yet observed.
    pub fn unrevealed_free_cells(&self) -> usize {
        let state = self.state();
        state
            .truth
            .iter()
            .zip(&state.revealed)
            .filter(|(t, r)| **t == CellState::Free && **r == CellState::Unknown)
            .count()
    }

    pub fn submitted_goals(&self) -> Vec<NavGoal> {
        self.state().submitted.clone()
    }

    pub fn cancelled_goals(&self) -> Vec<GoalHandle> {
        self.state().cancelled.clone()
    }

    // ── Fault injection ──────────────────────────────────────────────────────

    pub fn fail_next_grid_fetches(&self, n: u32) {
        self.state().failing_grid_fetches = n;
    }

    pub fn fail_next_pose_lookups(&self, n: u32) {
        self.state().failing_pose_lookups = n;
    }

    pub fn fail_next_goal_submissions(&self, n: u32) {
        self.state().failing_submissions = n;
    }

    /// Make the next `n` goal submissions never answer.
    pub fn hang_next_goal_submissions(&self, n: u32) {
        self.state().hanging_submissions = n;
    }

    /// Force the outcomes of the next goals, in order.  Once the script runs
    /// out, goals resolve from the ground truth again.
    pub fn script_goal_statuses(&self, statuses: impl IntoIterator<Item = ScriptedStatus>) {
        self.state().script.extend(statuses);
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn index(&self, cell: GridCell) -> Option<usize> {
        let in_grid = cell.row >= 0
            && cell.col >= 0
            && (cell.row as usize) < self.metadata.height
            && (cell.col as usize) < self.metadata.width;
        in_grid.then(|| cell.row as usize * self.metadata.width + cell.col as usize)
    }

    /// Cell containing `pose`, rounding to the nearest cell corner so goals
    /// placed exactly on a corner are not truncated into the neighbour.
    fn nearest_cell(&self, pose: Pose2D) -> Option<GridCell> {
        let (gx, gy) = world_to_grid_continuous(pose, self.origin, &self.metadata);
        let cell = GridCell::new(gy.round() as i64, gx.round() as i64);
        self.index(cell).map(|_| cell)
    }

    fn reveal_from(&self, state: &mut SimState, centre: GridCell) {
        let radius = self.config.sensor_radius.max(0.0);
        let reach = radius.ceil() as i64;
        let mut revealed = 0usize;
        for dr in -reach..=reach {
            for dc in -reach..=reach {
                if ((dr * dr + dc * dc) as f64).sqrt() > radius {
                    continue;
                }
                let target = GridCell::new(centre.row + dr, centre.col + dc);
                let Some(idx) = self.index(target) else {
                    continue;
                };
                if state.revealed[idx] == CellState::Unknown
                    && self.line_of_sight(state, centre, target)
                {
                    state.revealed[idx] = state.truth[idx];
                    revealed += 1;
                }
            }
        }
        debug!(row = centre.row, col = centre.col, revealed, "sim sensor sweep");
    }

    /// Bresenham walk from `from` to `to`; blocked when any cell strictly
    /// between them is occupied.
    fn line_of_sight(&self, state: &SimState, from: GridCell, to: GridCell) -> bool {
        let (mut r, mut c) = (from.row, from.col);
        let dr = (to.row - r).abs();
        let dc = (to.col - c).abs();
        let sr = if to.row >= r { 1 } else { -1 };
        let sc = if to.col >= c { 1 } else { -1 };
        let mut err = dc - dr;

        while (r, c) != (to.row, to.col) {
            let e2 = 2 * err;
            if e2 > -dr {
                err -= dr;
                c += sc;
            }
            if e2 < dc {
                err += dc;
                r += sr;
            }
            if (r, c) == (to.row, to.col) {
                break;
            }
            match self.index(GridCell::new(r, c)) {
                Some(idx) if state.truth[idx] == CellState::Free => {}
                _ => return false,
            }
        }
        true
    }

    fn resolve_goal(&self, state: &mut SimState, goal: &NavGoal) -> ScriptedStatus {
        let target = goal.to_pose2d();
        let reachable = self
            .nearest_cell(target)
            .filter(|cell| self.index(*cell).is_some_and(|i| state.truth[i] == CellState::Free));

        let status = match state.script.pop_front() {
            Some(ScriptedStatus::Report(status)) => status,
            Some(unresolved) => return unresolved,
            None if reachable.is_some() => GoalStatus::Succeeded,
            None => GoalStatus::Aborted,
        };

        if status == GoalStatus::Succeeded {
            match reachable {
                Some(cell) => {
                    state.robot = target;
                    self.reveal_from(state, cell);
                }
                None => return ScriptedStatus::Report(GoalStatus::Aborted),
            }
        }
        ScriptedStatus::Report(status)
    }

    fn take_hanging_submission(&self) -> bool {
        let mut state = self.state();
        if state.hanging_submissions == 0 {
            return false;
        }
        state.hanging_submissions -= 1;
        true
    }
}

#[async_trait]
impl GridProvider for SimWorld {
    async fn fetch_grid(&self) -> Result<GridMessage, ScoutError> {
        {
            let mut state = self.state();
            if state.failing_grid_fetches > 0 {
                state.failing_grid_fetches -= 1;
                return Err(ScoutError::GridUnavailable("simulated map server fault".to_string()));
            }
        }
        Ok(self.revealed_grid()?.to_message())
    }
}

#[async_trait]
impl PoseProvider for SimWorld {
    async fn lookup_pose(&self, request: &PoseRequest) -> Result<StampedPose, ScoutError> {
        let mut state = self.state();
        if state.failing_pose_lookups > 0 {
            state.failing_pose_lookups -= 1;
            return Err(ScoutError::PoseUnavailable(format!(
                "simulated TF fault looking up {} in {}",
                request.robot_frame, request.global_frame
            )));
        }
        let robot = state.robot;
        Ok(StampedPose {
            stamp: Utc::now(),
            position: Vec3::new(robot.x, robot.y, 0.0),
            orientation: Quaternion::from_yaw(robot.theta),
        })
    }
}

#[async_trait]
impl NavigationService for SimWorld {
    async fn send_goal(&self, goal: NavGoal) -> Result<GoalHandle, ScoutError> {
        if self.take_hanging_submission() {
            debug!(sequence = goal.sequence, "sim action server not answering");
            return std::future::pending().await;
        }
        let mut state = self.state();
        if state.failing_submissions > 0 {
            state.failing_submissions -= 1;
            return Err(ScoutError::Navigation("simulated action server unreachable".to_string()));
        }
        let handle = GoalHandle(state.next_handle);
        state.next_handle += 1;
        let status = self.resolve_goal(&mut state, &goal);
        info!(sequence = goal.sequence, handle = handle.0, ?status, "sim accepted goal");
        state.submitted.push(goal);
        state.pending.insert(handle.0, status);
        Ok(handle)
    }

    async fn wait_for_result(&self, handle: GoalHandle) -> Result<GoalStatus, ScoutError> {
        let status = self
            .state()
            .pending
            .get(&handle.0)
            .copied()
            .ok_or_else(|| ScoutError::Navigation(format!("unknown goal handle {}", handle.0)))?;

        if !self.config.goal_latency.is_zero() {
            tokio::time::sleep(self.config.goal_latency).await;
        }
        match status {
            ScriptedStatus::Report(status) => {
                self.state().pending.remove(&handle.0);
                Ok(status)
            }
            ScriptedStatus::Lost => {
                self.state().pending.remove(&handle.0);
                Err(ScoutError::Navigation(format!(
                    "lost contact while waiting on goal {}",
                    handle.0
                )))
            }
            ScriptedStatus::Hang => std::future::pending().await,
        }
    }

    async fn cancel_goal(&self, handle: GoalHandle) -> Result<(), ScoutError> {
        let mut state = self.state();
        state.pending.remove(&handle.0);
        state.cancelled.push(handle);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORRIDOR: &str = "\
##########
#........#
#.######.#
#........#
##########
";

    fn world(radius: f64) -> SimWorld {
        SimWorld::from_ascii(
            CORRIDOR,
            1.0,
            Pose2D::default(),
            Pose2D::new(1.0, 1.0, 0.0),
            SimConfig {
                sensor_radius: radius,
                ..SimConfig::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn from_ascii_rejects_ragged_rows() {
        let parse = |map: &str| {
            let start = Pose2D::default();
            SimWorld::from_ascii(map, 1.0, start, start, SimConfig::default())
        };
        let err = parse("...\n..\n");
        assert!(matches!(err, Err(ScoutError::InvalidGrid(_))));
        let err = parse("..x\n");
        assert!(matches!(err, Err(ScoutError::InvalidGrid(_))));
    }

    #[test]
    fn start_pose_reveals_surroundings() {
        let w = world(1.5);
        let grid = w.revealed_grid().unwrap();
        assert_eq!(grid.cell_at(1, 1).unwrap(), CellState::Free);
        assert_eq!(grid.cell_at(1, 2).unwrap(), CellState::Free);
        assert_eq!(grid.cell_at(0, 0).unwrap(), CellState::Occupied);
        assert_eq!(grid.cell_at(1, 5).unwrap(), CellState::Unknown);
    }

    #[test]
    fn walls_block_line_of_sight() {
        let w = world(3.0);
        let grid = w.revealed_grid().unwrap();
        // Row 3 lies behind the inner wall on row 2.
        assert_eq!(grid.cell_at(2, 2).unwrap(), CellState::Occupied);
        assert_eq!(grid.cell_at(3, 3).unwrap(), CellState::Unknown);
        // The open column at col 1 sees straight down.
        assert_eq!(grid.cell_at(3, 1).unwrap(), CellState::Free);
    }

    #[tokio::test]
    async fn reachable_goal_succeeds_and_moves_robot() {
        let w = world(2.0);
        let before = w.unrevealed_free_cells();
        let handle = w
            .send_goal(NavGoal::from_pose(1, "map", Pose2D::new(5.0, 1.0, 0.0)))
            .await
            .unwrap();
        assert_eq!(w.wait_for_result(handle).await.unwrap(), GoalStatus::Succeeded);
        assert_eq!(w.robot_pose(), Pose2D::new(5.0, 1.0, 0.0));
        assert!(w.unrevealed_free_cells() < before);
    }

    #[tokio::test]
    async fn goal_on_wall_is_aborted() {
        let w = world(2.0);
        let handle = w
            .send_goal(NavGoal::from_pose(1, "map", Pose2D::new(4.0, 2.0, 0.0)))
            .await
            .unwrap();
        assert_eq!(w.wait_for_result(handle).await.unwrap(), GoalStatus::Aborted);
        assert_eq!(w.robot_pose(), Pose2D::new(1.0, 1.0, 0.0));
    }

    #[tokio::test]
    async fn injected_faults_are_consumed() {
        let w = world(2.0);
        w.fail_next_grid_fetches(1);
        w.fail_next_pose_lookups(1);
        assert!(matches!(w.fetch_grid().await, Err(ScoutError::GridUnavailable(_))));
        assert!(w.fetch_grid().await.is_ok());

        let req = PoseRequest::latest("map", "base_link");
        assert!(matches!(w.lookup_pose(&req).await, Err(ScoutError::PoseUnavailable(_))));
        let pose = w.lookup_pose(&req).await.unwrap().to_pose2d();
        assert_eq!((pose.x, pose.y), (1.0, 1.0));
    }

    #[tokio::test]
    async fn hanging_submission_never_answers() {
        let w = world(2.0);
        w.hang_next_goal_submissions(1);
        let goal = NavGoal::from_pose(1, "map", Pose2D::new(5.0, 1.0, 0.0));
        let sent = tokio::time::timeout(Duration::from_millis(20), w.send_goal(goal.clone())).await;
        assert!(sent.is_err());
        assert!(w.submitted_goals().is_empty());
        assert!(w.send_goal(goal).await.is_ok());
    }

    #[tokio::test]
    async fn lost_result_is_a_transport_error() {
        let w = world(2.0);
        w.script_goal_statuses([ScriptedStatus::Lost]);
        let handle = w
            .send_goal(NavGoal::from_pose(1, "map", Pose2D::new(5.0, 1.0, 0.0)))
            .await
            .unwrap();
        assert!(matches!(w.wait_for_result(handle).await, Err(ScoutError::Navigation(_))));
        assert_eq!(w.robot_pose(), Pose2D::new(1.0, 1.0, 0.0));
    }

    #[tokio::test]
    async fn scripted_hang_never_resolves_until_cancelled() {
        let w = world(2.0);
        w.script_goal_statuses([ScriptedStatus::Hang]);
        let handle = w
            .send_goal(NavGoal::from_pose(1, "map", Pose2D::new(5.0, 1.0, 0.0)))
            .await
            .unwrap();
        let waited =
            tokio::time::timeout(Duration::from_millis(20), w.wait_for_result(handle)).await;
        assert!(waited.is_err());
        w.cancel_goal(handle).await.unwrap();
        assert_eq!(w.cancelled_goals(), vec![handle]);
    }
}
