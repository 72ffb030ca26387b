//! [`ExplorationPlanner`] – turns one grid + pose snapshot into the next goal.
//!
//! Each call to [`ExplorationPlanner::plan_next_goal`]:
//!
//! 1. converts the robot's world pose into grid coordinates,
//! 2. runs the expanding-ring frontier search from that cell,
//! 3. falls back to a full raster scan when the ring search comes up empty
//!    (configurable), and
//! 4. converts the chosen frontier cell back into a world pose with heading
//!    0 and stamps it with the next sequence number.
//!
//! When neither search finds a frontier the planner reports
//! [`PlanOutcome::Done`]: no free cell borders unknown space, so exploration
//! is complete.  The planner performs no I/O and never mutates its inputs.

use scout_perception::FrontierDetector;
use scout_perception::OccupancyGrid;
use scout_perception::frontier::DEFAULT_MIN_SEARCH_RADIUS;
use scout_perception::transform::{grid_to_world, world_to_grid};
use scout_types::{ExplorationGoal, FrontierStrategy, GridPose, Pose2D};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Planner tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// First ring radius of the nearest-frontier search, in cells.
    pub min_search_radius: u32,
    /// Run the raster scan when the ring search finds nothing.  Without it,
    /// frontiers closer than `min_search_radius` (e.g. on a grid smaller than
    /// twice that radius) end the exploration early.
    pub raster_fallback: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            min_search_radius: DEFAULT_MIN_SEARCH_RADIUS,
            raster_fallback: true,
        }
    }
}

/// Result of one planning pass.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    Goal(ExplorationGoal),
    /// No frontier remains.
    Done,
}

/// Frontier-based goal selection.  Owns the goal sequence counter.
#[derive(Debug, Clone)]
pub struct ExplorationPlanner {
    config: PlannerConfig,
    next_sequence: u64,
}

impl ExplorationPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            config,
            next_sequence: 1,
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Number of goals produced so far.
    pub fn goals_planned(&self) -> u64 {
        self.next_sequence - 1
    }

    /// Select the next exploration goal for a robot at `robot` on `grid`.
    pub fn plan_next_goal(&mut self, grid: &OccupancyGrid, robot: Pose2D) -> PlanOutcome {
        let origin = grid.origin();
        let metadata = grid.metadata();
        let start = world_to_grid(robot, origin, metadata).to_cell();
        let detector = FrontierDetector::new(grid).with_min_radius(self.config.min_search_radius);

        let found = detector
            .nearest_frontier(start.row, start.col)
            .map(|cell| (cell, FrontierStrategy::Ring))
            .or_else(|| {
                self.config
                    .raster_fallback
                    .then(|| detector.find_any_free_frontier())
                    .flatten()
                    .map(|cell| (cell, FrontierStrategy::Raster))
            });

        let Some((cell, strategy)) = found else {
            debug!(row = start.row, col = start.col, "no frontier left");
            return PlanOutcome::Done;
        };

        let world = grid_to_world(GridPose::from_cell(cell, 0.0), origin, metadata);
        let goal = ExplorationGoal {
            sequence: self.next_sequence,
            pose: Pose2D::new(world.x, world.y, 0.0),
            cell,
            strategy,
        };
        self.next_sequence += 1;

        debug!(
            sequence = goal.sequence,
            robot_row = start.row,
            robot_col = start.col,
            %cell,
            ?strategy,
            "frontier selected"
        );
        PlanOutcome::Goal(goal)
    }
}

impl Default for ExplorationPlanner {
    fn default() -> Self {
        Self::new(PlannerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scout_types::{CellState, GridCell, GridMetadata};
    use std::f64::consts::FRAC_PI_2;

    fn raw_grid(
        width: usize,
        height: usize,
        resolution: f64,
        origin: Pose2D,
        raw: &[i8],
    ) -> OccupancyGrid {
        OccupancyGrid::new(GridMetadata::new(width, height, resolution), origin, raw).unwrap()
    }

    /// 10x10 free grid whose only frontier is (row 5, col 9): the unknown
    /// cell (4, 9) is fenced off by walls at (3, 8), (3, 9), (4, 8), (5, 8).
    fn single_frontier_grid() -> Vec<i8> {
        let mut raw = vec![0_i8; 100];
        raw[4 * 10 + 9] = -1;
        for (r, c) in [(3, 8), (3, 9), (4, 8), (5, 8)] {
            raw[r * 10 + c] = 100;
        }
        raw
    }

    #[test]
    fn end_to_end_goal_in_world_frame() {
        let grid = raw_grid(10, 10, 0.05, Pose2D::default(), &single_frontier_grid());
        let mut planner = ExplorationPlanner::default();
        // World (0.26, 0.26) truncates to grid (5, 5).
        let robot = Pose2D::new(0.26, 0.26, 1.0);

        let PlanOutcome::Goal(goal) = planner.plan_next_goal(&grid, robot) else {
            panic!("expected a goal");
        };
        assert_eq!(goal.cell, GridCell::new(5, 9));
        assert_eq!(goal.strategy, FrontierStrategy::Ring);
        assert_eq!(goal.sequence, 1);
        assert!((goal.pose.x - 0.45).abs() < 1e-9, "x={}", goal.pose.x);
        assert!((goal.pose.y - 0.25).abs() < 1e-9, "y={}", goal.pose.y);
        assert_eq!(goal.pose.theta, 0.0);
    }

    #[test]
    fn sequence_numbers_increase() {
        let grid = raw_grid(10, 10, 0.05, Pose2D::default(), &single_frontier_grid());
        let mut planner = ExplorationPlanner::default();
        let robot = Pose2D::new(0.26, 0.26, 0.0);
        let seqs: Vec<u64> = (0..3)
            .map(|_| match planner.plan_next_goal(&grid, robot) {
                PlanOutcome::Goal(g) => g.sequence,
                PlanOutcome::Done => panic!("expected goal"),
            })
            .collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(planner.goals_planned(), 3);
    }

    #[test]
    fn fully_known_grid_is_done() {
        let grid = OccupancyGrid::filled(
            GridMetadata::new(12, 12, 0.1),
            Pose2D::default(),
            CellState::Free,
        )
        .unwrap();
        let mut planner = ExplorationPlanner::default();
        assert_eq!(planner.plan_next_goal(&grid, Pose2D::new(0.6, 0.6, 0.0)), PlanOutcome::Done);
        assert_eq!(planner.goals_planned(), 0);
    }

    #[test]
    fn small_grid_uses_raster_fallback() {
        // 5x5, unknown corner, robot in the middle: the first ring already
        // encloses the whole grid.
        let mut raw = vec![0_i8; 25];
        raw[0] = -1;
        let grid = raw_grid(5, 5, 1.0, Pose2D::default(), &raw);
        let robot = Pose2D::new(2.5, 2.5, 0.0);

        let mut planner = ExplorationPlanner::default();
        match planner.plan_next_goal(&grid, robot) {
            PlanOutcome::Goal(goal) => {
                assert_eq!(goal.cell, GridCell::new(0, 1));
                assert_eq!(goal.strategy, FrontierStrategy::Raster);
            }
            PlanOutcome::Done => panic!("raster fallback should find (0, 1)"),
        }

        let mut strict = ExplorationPlanner::new(PlannerConfig {
            raster_fallback: false,
            ..PlannerConfig::default()
        });
        assert_eq!(strict.plan_next_goal(&grid, robot), PlanOutcome::Done);
    }

    #[test]
    fn rotated_origin_goal_maps_back_onto_frontier_cell() {
        let origin = Pose2D::new(2.0, -1.0, FRAC_PI_2);
        let grid = raw_grid(10, 10, 0.5, origin, &single_frontier_grid());
        // Grid (x=5, y=5) → world: rotate (2.5, 2.5) by 90°, then translate.
        let robot = Pose2D::new(2.0 - 2.6, -1.0 + 2.6, 0.0);

        let mut planner = ExplorationPlanner::default();
        let PlanOutcome::Goal(goal) = planner.plan_next_goal(&grid, robot) else {
            panic!("expected a goal");
        };
        assert_eq!(goal.cell, GridCell::new(5, 9));
        // Cell (5, 9) is grid x = 9, y = 5 → (4.5, 2.5) m, rotated by 90°.
        assert!((goal.pose.x - (2.0 - 2.5)).abs() < 1e-9, "x={}", goal.pose.x);
        assert!((goal.pose.y - (-1.0 + 4.5)).abs() < 1e-9, "y={}", goal.pose.y);
    }

    #[test]
    fn robot_far_off_the_grid_still_plans() {
        let grid = raw_grid(10, 10, 0.05, Pose2D::default(), &single_frontier_grid());
        let mut planner = ExplorationPlanner::default();
        // 250 m to the right is 5000 cells beyond the right edge.
        let robot = Pose2D::new(250.0, 0.26, 0.0);
        let PlanOutcome::Goal(goal) = planner.plan_next_goal(&grid, robot) else {
            panic!("expected a goal");
        };
        assert_eq!(goal.cell, GridCell::new(5, 9));

        let known = OccupancyGrid::filled(
            GridMetadata::new(10, 10, 0.05),
            Pose2D::default(),
            CellState::Free,
        )
        .unwrap();
        for robot in [Pose2D::new(250.0, 0.0, 0.0), Pose2D::new(1e300, -1e300, 0.0)] {
            assert_eq!(planner.plan_next_goal(&known, robot), PlanOutcome::Done);
        }
    }

    #[test]
    fn planning_does_not_mutate_grid() {
        let grid = raw_grid(10, 10, 0.05, Pose2D::default(), &single_frontier_grid());
        let before = grid.clone();
        let mut planner = ExplorationPlanner::default();
        planner.plan_next_goal(&grid, Pose2D::new(0.26, 0.26, 0.0));
        assert_eq!(grid, before);
    }
}
