//! External collaborator seams.
//!
//! Scout never talks to a map server, a TF tree or a navigation stack
//! directly.  It talks to these three traits, and an adapter translates each
//! call into whatever protocol the outside world speaks.
//!
//! - [`GridProvider`] – request/response occupancy grid query.
//! - [`PoseProvider`] – pose of a named robot frame in a named global frame.
//! - [`NavigationService`] – asynchronous goal execution with terminal
//!   status reporting and cancellation.
//!
//! [`SimWorld`][crate::sim::SimWorld] implements all three in-process.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scout_perception::GridMessage;
use scout_perception::transform::{Quaternion, Vec3};
use scout_types::{GoalStatus, Pose2D, ScoutError};
use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Occupancy grid
// ────────────────────────────────────────────────────────────────────────────

/// Source of occupancy grid snapshots.
#[async_trait]
pub trait GridProvider: Send + Sync {
    /// Fetch the current map.
    ///
    /// Transient failures are reported as [`ScoutError::GridUnavailable`];
    /// the caller decides whether to retry.
    async fn fetch_grid(&self) -> Result<GridMessage, ScoutError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Robot pose
// ────────────────────────────────────────────────────────────────────────────

/// When the requested pose should be valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoseStamp {
    /// Most recent transform available.
    Latest,
    At(DateTime<Utc>),
}

/// Pose lookup request: `robot_frame` expressed in `global_frame`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoseRequest {
    pub global_frame: String,
    pub robot_frame: String,
    pub stamp: PoseStamp,
}

impl PoseRequest {
    pub fn latest(global_frame: impl Into<String>, robot_frame: impl Into<String>) -> Self {
        Self {
            global_frame: global_frame.into(),
            robot_frame: robot_frame.into(),
            stamp: PoseStamp::Latest,
        }
    }
}

/// 3-D position + orientation answer to a [`PoseRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StampedPose {
    pub stamp: DateTime<Utc>,
    pub position: Vec3,
    pub orientation: Quaternion,
}

impl StampedPose {
    /// Planar projection: `(x, y, yaw)`.  `z`, roll and pitch are dropped.
    pub fn to_pose2d(&self) -> Pose2D {
        Pose2D::new(self.position.x, self.position.y, self.orientation.yaw())
    }
}

/// Source of the robot's live pose estimate.
#[async_trait]
pub trait PoseProvider: Send + Sync {
    /// Failures are reported as [`ScoutError::PoseUnavailable`].
    async fn lookup_pose(&self, request: &PoseRequest) -> Result<StampedPose, ScoutError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Navigation
// ────────────────────────────────────────────────────────────────────────────

/// Goal submitted to the navigation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavGoal {
    pub sequence: u64,
    pub frame_id: String,
    pub position: Vec3,
    pub orientation: Quaternion,
}

impl NavGoal {
    /// Planar goal at `pose` in `frame_id`.
    pub fn from_pose(sequence: u64, frame_id: impl Into<String>, pose: Pose2D) -> Self {
        Self {
            sequence,
            frame_id: frame_id.into(),
            position: Vec3::new(pose.x, pose.y, 0.0),
            orientation: Quaternion::from_yaw(pose.theta),
        }
    }

    pub fn to_pose2d(&self) -> Pose2D {
        Pose2D::new(self.position.x, self.position.y, self.orientation.yaw())
    }
}

/// Opaque identifier of an accepted goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GoalHandle(pub u64);

/// Goal-execution service (path planning and control live behind it).
///
/// # Contract
///
/// * `send_goal` returns as soon as the goal is accepted.
/// * `wait_for_result` suspends until the goal reaches a terminal
///   [`GoalStatus`]; it must not busy-poll.  It may never resolve if the
///   service hangs, so callers bound it themselves when they need to.
/// * `cancel_goal` asks the service to stop pursuing the goal.  Cancelling an
///   unknown or finished goal is not an error.
///
/// Transport failures are reported as [`ScoutError::Navigation`].
#[async_trait]
pub trait NavigationService: Send + Sync {
    async fn send_goal(&self, goal: NavGoal) -> Result<GoalHandle, ScoutError>;

    async fn wait_for_result(&self, handle: GoalHandle) -> Result<GoalStatus, ScoutError>;

    async fn cancel_goal(&self, handle: GoalHandle) -> Result<(), ScoutError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn stamped_pose_projects_to_yaw() {
        let pose = StampedPose {
            stamp: Utc::now(),
            position: Vec3::new(1.5, -2.0, 0.3),
            orientation: Quaternion::from_yaw(FRAC_PI_2),
        };
        let p = pose.to_pose2d();
        assert_eq!((p.x, p.y), (1.5, -2.0));
        assert!((p.theta - FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn nav_goal_roundtrips_through_json() {
        let goal = NavGoal::from_pose(7, "map", Pose2D::new(0.45, 0.25, 0.0));
        let json = serde_json::to_string(&goal).unwrap();
        let back: NavGoal = serde_json::from_str(&json).unwrap();
        assert_eq!(back.sequence, 7);
        assert_eq!(back.frame_id, "map");
        assert_eq!(back.orientation, Quaternion::identity());
        assert!((back.to_pose2d().x - 0.45).abs() < 1e-12);
    }

    #[test]
    fn pose_request_latest() {
        let req = PoseRequest::latest("map", "base_link");
        assert_eq!(req.stamp, PoseStamp::Latest);
        assert_eq!(req.robot_frame, "base_link");
    }
}
