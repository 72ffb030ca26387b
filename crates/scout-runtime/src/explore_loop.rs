//! [`ExplorationLoop`] – the fetch → plan → drive state machine.
//!
//! ```text
//!            ┌──────────── Succeeded / Aborted / TimedOut ───────────┐
//!            ▼                                                       │
//!       FETCHING ──snapshot──▶ PLANNING ──goal──▶ DRIVING ───────────┘
//!        │   ▲                   │                  │
//!  retry └───┘                   └─Done─▶ COMPLETE  └─transport errors─▶ FAILED
//! ```
//!
//! * **FETCHING** pulls one grid snapshot and one robot pose.  Provider
//!   failures are retried after `retry_backoff` up to `max_fetch_retries`
//!   times, then the run fails.
//! * **PLANNING** runs the [`ExplorationPlanner`].  `Done` completes the run.
//! * **DRIVING** runs the [`GoalDriver`].  Every navigation outcome leads back
//!   to FETCHING; only transport errors count as failures.
//!
//! A single aborted or timed-out goal never ends the run.  Repeated ones can:
//! when the planner picks the same goal cell `stall_threshold` times in a row
//! the map is not changing, and the run fails instead of livelocking on an
//! unreachable frontier.  A threshold of 0 turns this off and leaves only
//! shutdown to stop such a run.
//!
//! Shutdown is checked at the top of every state and raced against every
//! suspension point, so a hanging provider or goal never delays it.  Any
//! in-flight goal is cancelled on the navigation service first.
//!
//! Progress is published on the [`EventBus`]; full grid snapshots are only
//! built when somebody is subscribed.

use std::sync::Arc;
use std::time::Duration;

use scout_middleware::{EventBus, GridProvider, NavigationService, PoseProvider, PoseRequest};
use scout_perception::OccupancyGrid;
use scout_types::{
    CellState, Event, EventPayload, ExplorationGoal, GoalOutcome, LoopReport, LoopState, Pose2D,
    ScoutError, Termination,
};
use tracing::{debug, info, instrument, warn};

use crate::goal_driver::GoalDriver;
use crate::planner::{ExplorationPlanner, PlanOutcome, PlannerConfig};
use crate::shutdown::ShutdownSignal;
use crate::stall_guard::StallGuard;

const EVENT_SOURCE: &str = "scout-runtime::explore_loop";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration bundle for [`ExplorationLoop`].
#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    pub planner: PlannerConfig,
    /// Retries of a failed grid/pose fetch before the run fails.
    pub max_fetch_retries: u32,
    /// Consecutive navigation transport failures tolerated.
    pub max_drive_failures: u32,
    /// Pause between retries.
    pub retry_backoff: Duration,
    /// Upper bound on a single goal.  `None` waits for the service.
    pub goal_timeout: Option<Duration>,
    /// Identical consecutive goal cells that count as a stall (0 = off).
    pub stall_threshold: usize,
    /// Frame the grid and goals are expressed in.
    pub global_frame: String,
    pub robot_frame: String,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            planner: PlannerConfig::default(),
            max_fetch_retries: 3,
            max_drive_failures: 3,
            retry_backoff: Duration::from_millis(500),
            goal_timeout: None,
            stall_threshold: 5,
            global_frame: "map".to_string(),
            robot_frame: "base_link".to_string(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ExplorationLoop
// ─────────────────────────────────────────────────────────────────────────────

/// Work carried from one state into the next.
enum Step {
    Fetching,
    Planning { grid: OccupancyGrid, robot: Pose2D },
    Driving(ExplorationGoal),
    Complete,
    Failed(String),
}

impl Step {
    fn state(&self) -> LoopState {
        match self {
            Step::Fetching => LoopState::Fetching,
            Step::Planning { .. } => LoopState::Planning,
            Step::Driving(_) => LoopState::Driving,
            Step::Complete => LoopState::Complete,
            Step::Failed(_) => LoopState::Failed,
        }
    }
}

/// Frontier exploration orchestrator.
///
/// Owns the planner (and with it the goal sequence counter), the retry
/// counters and the stall guard.  Consumed by [`ExplorationLoop::run`].
pub struct ExplorationLoop {
    grids: Arc<dyn GridProvider>,
    poses: Arc<dyn PoseProvider>,
    planner: ExplorationPlanner,
    driver: GoalDriver,
    stall_guard: StallGuard,
    bus: EventBus,
    shutdown: ShutdownSignal,
    config: LoopConfig,
    // ── per-run bookkeeping ───────────────────────────────────────────────────
    state: LoopState,
    fetch_failures: u32,
    drive_failures: u32,
    cycles: u64,
    goals_issued: u64,
    goals_succeeded: u64,
}

impl ExplorationLoop {
    pub fn new(
        config: LoopConfig,
        grids: Arc<dyn GridProvider>,
        poses: Arc<dyn PoseProvider>,
        navigation: Arc<dyn NavigationService>,
    ) -> Self {
        let driver = GoalDriver::new(navigation, config.global_frame.clone())
            .with_timeout(config.goal_timeout);
        Self {
            grids,
            poses,
            planner: ExplorationPlanner::new(config.planner.clone()),
            driver,
            stall_guard: StallGuard::new(config.stall_threshold),
            bus: EventBus::default(),
            shutdown: ShutdownSignal::never(),
            config,
            state: LoopState::Fetching,
            fetch_failures: 0,
            drive_failures: 0,
            cycles: 0,
            goals_issued: 0,
            goals_succeeded: 0,
        }
    }

    /// Publish progress on `bus` instead of a private one.
    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownSignal) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Run until COMPLETE, FAILED or shutdown.
    #[instrument(name = "exploration", skip_all)]
    pub async fn run(mut self) -> LoopReport {
        info!(
            global_frame = %self.config.global_frame,
            robot_frame = %self.config.robot_frame,
            min_search_radius = self.config.planner.min_search_radius,
            "exploration started"
        );

        let mut step = Step::Fetching;
        loop {
            if self.shutdown.is_triggered() {
                return self.finish(Termination::Cancelled);
            }

            let next = match step {
                Step::Fetching => self.fetch().await,
                Step::Planning { grid, robot } => Ok(self.plan(&grid, robot)),
                Step::Driving(goal) => self.drive(goal).await,
                Step::Complete => return self.finish(Termination::Complete),
                Step::Failed(reason) => return self.finish(Termination::Failed { reason }),
            };

            step = match next {
                Ok(step) => step,
                Err(_) => return self.finish(Termination::Cancelled),
            };
            self.enter(step.state());
        }
    }

    // ── FETCHING ──────────────────────────────────────────────────────────────

    async fn fetch(&mut self) -> Result<Step, ScoutError> {
        match self.fetch_snapshot().await {
            Ok((grid, robot)) => {
                self.fetch_failures = 0;
                self.cycles += 1;
                debug!(
                    cycle = self.cycles,
                    x = robot.x,
                    y = robot.y,
                    theta = robot.theta,
                    known = grid.known_fraction(),
                    occupied = grid.count(CellState::Occupied),
                    "snapshot fetched"
                );
                self.publish_snapshot(&grid, robot);
                Ok(Step::Planning { grid, robot })
            }
            Err(ScoutError::Cancelled) => Err(ScoutError::Cancelled),
            Err(e) => {
                self.fetch_failures += 1;
                if self.fetch_failures > self.config.max_fetch_retries {
                    return Ok(Step::Failed(format!(
                        "snapshot fetch failed {} times: {e}",
                        self.fetch_failures
                    )));
                }
                warn!(
                    attempt = self.fetch_failures,
                    max = self.config.max_fetch_retries,
                    error = %e,
                    "snapshot fetch failed; retrying"
                );
                self.publish(EventPayload::RetryScheduled {
                    stage: "fetch".to_string(),
                    attempt: self.fetch_failures,
                });
                self.backoff().await?;
                Ok(Step::Fetching)
            }
        }
    }

    /// One grid query followed by one pose query, abandoned on shutdown.
    async fn fetch_snapshot(&mut self) -> Result<(OccupancyGrid, Pose2D), ScoutError> {
        let grids = Arc::clone(&self.grids);
        let poses = Arc::clone(&self.poses);
        let request = PoseRequest::latest(
            self.config.global_frame.clone(),
            self.config.robot_frame.clone(),
        );

        let snapshot = async move {
            let grid = OccupancyGrid::from_message(&grids.fetch_grid().await?)?;
            let robot = poses.lookup_pose(&request).await?.to_pose2d();
            Ok::<_, ScoutError>((grid, robot))
        };

        tokio::select! {
            biased;
            _ = self.shutdown.triggered() => Err(ScoutError::Cancelled),
            res = snapshot => res,
        }
    }

    // ── PLANNING ──────────────────────────────────────────────────────────────

    fn plan(&mut self, grid: &OccupancyGrid, robot: Pose2D) -> Step {
        let goal = match self.planner.plan_next_goal(grid, robot) {
            PlanOutcome::Done => return Step::Complete,
            PlanOutcome::Goal(goal) => goal,
        };
        if self.stall_guard.record(goal.cell) {
            return Step::Failed(format!(
                "stalled: frontier {} selected {} times in a row",
                goal.cell, self.config.stall_threshold
            ));
        }
        Step::Driving(goal)
    }

    // ── DRIVING ───────────────────────────────────────────────────────────────

    async fn drive(&mut self, goal: ExplorationGoal) -> Result<Step, ScoutError> {
        self.goals_issued += 1;
        info!(
            sequence = goal.sequence,
            cell = %goal.cell,
            x = goal.pose.x,
            y = goal.pose.y,
            strategy = ?goal.strategy,
            "goal issued"
        );
        self.publish(EventPayload::GoalIssued(goal.clone()));

        match self.driver.execute_goal(&goal, &mut self.shutdown).await {
            Ok(outcome) => {
                self.drive_failures = 0;
                match outcome {
                    GoalOutcome::Succeeded => {
                        self.goals_succeeded += 1;
                        info!(sequence = goal.sequence, "goal reached");
                    }
                    GoalOutcome::Aborted => {
                        warn!(sequence = goal.sequence, "goal aborted; re-planning");
                    }
                    GoalOutcome::TimedOut => {
                        warn!(sequence = goal.sequence, "goal timed out; re-planning");
                    }
                }
                self.publish(EventPayload::GoalFinished {
                    sequence: goal.sequence,
                    outcome,
                });
                Ok(Step::Fetching)
            }
            Err(ScoutError::Cancelled) => Err(ScoutError::Cancelled),
            Err(e) => {
                self.drive_failures += 1;
                if self.drive_failures > self.config.max_drive_failures {
                    return Ok(Step::Failed(format!(
                        "navigation failed {} times in a row: {e}",
                        self.drive_failures
                    )));
                }
                warn!(
                    sequence = goal.sequence,
                    attempt = self.drive_failures,
                    max = self.config.max_drive_failures,
                    error = %e,
                    "navigation transport failed; retrying"
                );
                self.publish(EventPayload::RetryScheduled {
                    stage: "drive".to_string(),
                    attempt: self.drive_failures,
                });
                self.backoff().await?;
                Ok(Step::Fetching)
            }
        }
    }

    // ── helpers ───────────────────────────────────────────────────────────────

    async fn backoff(&mut self) -> Result<(), ScoutError> {
        tokio::select! {
            biased;
            _ = self.shutdown.triggered() => Err(ScoutError::Cancelled),
            _ = tokio::time::sleep(self.config.retry_backoff) => Ok(()),
        }
    }

    fn enter(&mut self, next: LoopState) {
        if next == self.state {
            return;
        }
        debug!(from = %self.state, to = %next, "state transition");
        self.publish(EventPayload::StateChanged { from: self.state, to: next });
        self.state = next;
    }

    fn publish(&self, payload: EventPayload) {
        self.bus.publish(Event::new(EVENT_SOURCE, payload));
    }

    fn publish_snapshot(&self, grid: &OccupancyGrid, robot: Pose2D) {
        if self.bus.receiver_count() == 0 {
            return;
        }
        self.publish(EventPayload::Snapshot {
            cycle: self.cycles,
            metadata: *grid.metadata(),
            origin: grid.origin(),
            cells: grid.to_raw(),
            robot,
        });
    }

    fn finish(self, termination: Termination) -> LoopReport {
        let report = LoopReport {
            termination,
            cycles: self.cycles,
            goals_issued: self.goals_issued,
            goals_succeeded: self.goals_succeeded,
        };
        match &report.termination {
            Termination::Complete => info!(
                cycles = report.cycles,
                goals = report.goals_issued,
                reached = report.goals_succeeded,
                "exploration complete"
            ),
            Termination::Failed { reason } => {
                warn!(%reason, cycles = report.cycles, "exploration failed")
            }
            Termination::Cancelled => info!(cycles = report.cycles, "exploration cancelled"),
        }
        self.publish(EventPayload::Finished(report.clone()));
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::shutdown_channel;
    use scout_middleware::{ScriptedStatus, SimConfig, SimWorld};
    use scout_types::GoalStatus;
    use tokio::sync::broadcast;

    const ROOM: &str = "\
############
#..........#
#..........#
#..........#
#..........#
#..........#
#..........#
############
";

    fn sim() -> Arc<SimWorld> {
        Arc::new(
            SimWorld::from_ascii(
                ROOM,
                1.0,
                Pose2D::default(),
                Pose2D::new(1.0, 1.0, 0.0),
                SimConfig {
                    sensor_radius: 3.0,
                    ..SimConfig::default()
                },
            )
            .unwrap(),
        )
    }

    fn fast_config() -> LoopConfig {
        LoopConfig {
            retry_backoff: Duration::from_millis(1),
            ..LoopConfig::default()
        }
    }

    fn exploration(world: &Arc<SimWorld>, config: LoopConfig) -> ExplorationLoop {
        ExplorationLoop::new(config, world.clone(), world.clone(), world.clone())
    }

    fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<EventPayload> {
        let mut out = Vec::new();
        while let Ok(event) = rx.try_recv() {
            out.push(event.payload);
        }
        out
    }

    #[test]
    fn default_config_values() {
        let config = LoopConfig::default();
        assert_eq!(config.max_fetch_retries, 3);
        assert_eq!(config.max_drive_failures, 3);
        assert_eq!(config.retry_backoff, Duration::from_millis(500));
        assert_eq!(config.goal_timeout, None);
        assert_eq!(config.stall_threshold, 5);
        assert_eq!(config.global_frame, "map");
        assert_eq!(config.robot_frame, "base_link");
    }

    #[tokio::test]
    async fn explores_room_to_completion() {
        let world = sim();
        assert!(world.unrevealed_free_cells() > 0);

        let report = exploration(&world, fast_config()).run().await;
        assert_eq!(report.termination, Termination::Complete);
        assert!(report.goals_issued > 0);
        assert_eq!(report.goals_issued, report.goals_succeeded);
        assert_eq!(report.cycles, report.goals_issued + 1);
        assert_eq!(world.unrevealed_free_cells(), 0);
        assert!(world.submitted_goals().iter().all(|g| g.frame_id == "map"));
    }

    #[tokio::test]
    async fn transient_fetch_failures_are_retried() {
        let world = sim();
        world.fail_next_grid_fetches(2);
        world.fail_next_pose_lookups(1);
        let report = exploration(&world, fast_config()).run().await;
        assert_eq!(report.termination, Termination::Complete);
    }

    #[tokio::test]
    async fn persistent_fetch_failure_fails_after_retries() {
        let world = sim();
        world.fail_next_grid_fetches(100);
        let exploration = exploration(
            &world,
            LoopConfig {
                max_fetch_retries: 2,
                ..fast_config()
            },
        );
        let mut rx = exploration.bus().subscribe();
        let report = exploration.run().await;

        assert!(matches!(report.termination, Termination::Failed { .. }));
        assert_eq!(report.cycles, 0);
        assert_eq!(report.goals_issued, 0);

        let retries = drain(&mut rx)
            .into_iter()
            .filter(|p| matches!(p, EventPayload::RetryScheduled { stage, .. } if stage == "fetch"))
            .count();
        assert_eq!(retries, 2);
    }

    #[tokio::test]
    async fn aborted_goal_is_replanned() {
        let world = sim();
        world.script_goal_statuses([ScriptedStatus::Report(GoalStatus::Aborted)]);
        let report = exploration(&world, fast_config()).run().await;
        assert_eq!(report.termination, Termination::Complete);
        assert_eq!(report.goals_succeeded, report.goals_issued - 1);
        // The unchanged map leads straight back to the same frontier.
        let goals = world.submitted_goals();
        assert_eq!(goals[0].to_pose2d(), goals[1].to_pose2d());
    }

    #[tokio::test]
    async fn timed_out_goal_is_cancelled_and_replanned() {
        let world = sim();
        world.script_goal_statuses([ScriptedStatus::Hang]);
        let report = exploration(
            &world,
            LoopConfig {
                goal_timeout: Some(Duration::from_millis(20)),
                ..fast_config()
            },
        )
        .run()
        .await;
        assert_eq!(report.termination, Termination::Complete);
        assert_eq!(world.cancelled_goals().len(), 1);
        assert_eq!(report.goals_succeeded, report.goals_issued - 1);
    }

    #[tokio::test]
    async fn shutdown_cancels_hanging_goal() {
        let world = sim();
        world.script_goal_statuses([ScriptedStatus::Hang]);
        let (trigger, signal) = shutdown_channel();
        let exploration = exploration(&world, fast_config()).with_shutdown(signal);

        let handle = tokio::spawn(exploration.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.trigger();

        let report = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop should stop promptly")
            .unwrap();
        assert_eq!(report.termination, Termination::Cancelled);
        assert_eq!(report.goals_issued, 1);
        assert_eq!(world.cancelled_goals().len(), 1);
    }

    #[tokio::test]
    async fn shutdown_before_start_does_nothing() {
        let world = sim();
        let (trigger, signal) = shutdown_channel();
        trigger.trigger();
        let report = exploration(&world, fast_config()).with_shutdown(signal).run().await;
        assert_eq!(report.termination, Termination::Cancelled);
        assert_eq!(report.cycles, 0);
        assert!(world.submitted_goals().is_empty());
    }

    #[tokio::test]
    async fn repeated_submission_failures_fail_the_run() {
        let world = sim();
        world.fail_next_goal_submissions(100);
        let report = exploration(&world, fast_config()).run().await;
        match report.termination {
            Termination::Failed { reason } => assert!(reason.contains("navigation"), "{reason}"),
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(report.goals_issued, 4);
        assert!(world.submitted_goals().is_empty());
    }

    #[tokio::test]
    async fn repeated_aborts_trip_the_stall_guard() {
        let world = sim();
        world.script_goal_statuses([ScriptedStatus::Report(GoalStatus::Aborted); 10]);
        let report = exploration(&world, fast_config()).run().await;
        match report.termination {
            Termination::Failed { reason } => assert!(reason.starts_with("stalled"), "{reason}"),
            other => panic!("expected stall, got {other:?}"),
        }
        assert_eq!(report.goals_issued, 4);
        assert_eq!(report.goals_succeeded, 0);
    }

    #[tokio::test]
    async fn lost_goal_status_is_cancelled_and_retried() {
        let world = sim();
        world.script_goal_statuses([ScriptedStatus::Lost]);
        let exploration = exploration(&world, fast_config()).with_bus(EventBus::new(4096));
        let mut rx = exploration.bus().subscribe();
        let report = exploration.run().await;

        assert_eq!(report.termination, Termination::Complete);
        assert_eq!(world.cancelled_goals().len(), 1);
        assert!(drain(&mut rx).iter().any(|p| matches!(
            p,
            EventPayload::RetryScheduled { stage, attempt: 1 } if stage == "drive"
        )));
    }

    #[tokio::test]
    async fn shutdown_interrupts_hanging_submission() {
        let world = sim();
        world.hang_next_goal_submissions(1);
        let (trigger, signal) = shutdown_channel();
        let handle = tokio::spawn(exploration(&world, fast_config()).with_shutdown(signal).run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.trigger();

        let report = tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("loop should stop promptly")
            .unwrap();
        assert_eq!(report.termination, Termination::Cancelled);
        assert_eq!(report.goals_issued, 1);
        assert!(world.submitted_goals().is_empty());
    }

    #[tokio::test]
    async fn zero_stall_threshold_tolerates_repeated_aborts() {
        let world = sim();
        world.script_goal_statuses([ScriptedStatus::Report(GoalStatus::Aborted); 10]);
        let report = exploration(
            &world,
            LoopConfig {
                stall_threshold: 0,
                ..fast_config()
            },
        )
        .run()
        .await;
        assert_eq!(report.termination, Termination::Complete);
        assert_eq!(report.goals_issued, report.goals_succeeded + 10);
    }

    #[tokio::test]
    async fn events_trace_the_state_machine() {
        let world = sim();
        let exploration = exploration(&world, fast_config()).with_bus(EventBus::new(4096));
        let mut rx = exploration.bus().subscribe();
        let report = exploration.run().await;
        let events = drain(&mut rx);

        let snapshots = events
            .iter()
            .filter(|p| matches!(p, EventPayload::Snapshot { .. }))
            .count() as u64;
        assert_eq!(snapshots, report.cycles);

        assert!(matches!(
            events.first(),
            Some(EventPayload::Snapshot { cycle: 1, .. })
        ));
        assert!(events.iter().any(|p| matches!(
            p,
            EventPayload::StateChanged {
                from: LoopState::Planning,
                to: LoopState::Complete
            }
        )));
        match events.last() {
            Some(EventPayload::Finished(r)) => assert_eq!(r, &report),
            other => panic!("expected Finished last, got {other:?}"),
        }
    }
}
