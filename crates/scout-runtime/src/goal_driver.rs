//! [`GoalDriver`] – thin adapter over the navigation service.
//!
//! Submits one [`ExplorationGoal`], suspends until the service reports a
//! terminal status, and maps that status onto a [`GoalOutcome`].  The driver
//! never retries; the exploration loop decides what happens next.
//!
//! Both the submission and the wait are raced against shutdown.  Once the
//! service has accepted the goal, anything that ends the wait early cancels
//! it on the service before returning:
//!
//! * the optional goal timeout → [`GoalOutcome::TimedOut`];
//! * a shutdown request → [`ScoutError::Cancelled`];
//! * a transport error while waiting → [`ScoutError::Navigation`].

use std::sync::Arc;
use std::time::Duration;

use scout_middleware::{GoalHandle, NavGoal, NavigationService};
use scout_types::{ExplorationGoal, GoalOutcome, ScoutError};
use tracing::{debug, instrument, warn};

use crate::shutdown::ShutdownSignal;

/// Executes exploration goals on a [`NavigationService`].
#[derive(Clone)]
pub struct GoalDriver {
    navigation: Arc<dyn NavigationService>,
    frame_id: String,
    timeout: Option<Duration>,
}

impl GoalDriver {
    /// `frame_id` is the global frame the goal poses are expressed in.
    pub fn new(navigation: Arc<dyn NavigationService>, frame_id: impl Into<String>) -> Self {
        Self {
            navigation,
            frame_id: frame_id.into(),
            timeout: None,
        }
    }

    /// Bound every goal by `timeout`.  `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Submit `goal` and wait for its outcome.
    ///
    /// # Errors
    ///
    /// * [`ScoutError::Navigation`] – the service could not accept the goal
    ///   or report its status.
    /// * [`ScoutError::Cancelled`] – `shutdown` fired first.
    #[instrument(skip_all, fields(sequence = goal.sequence, cell = %goal.cell))]
    pub async fn execute_goal(
        &self,
        goal: &ExplorationGoal,
        shutdown: &mut ShutdownSignal,
    ) -> Result<GoalOutcome, ScoutError> {
        if shutdown.is_triggered() {
            return Err(ScoutError::Cancelled);
        }

        let nav_goal = NavGoal::from_pose(goal.sequence, self.frame_id.clone(), goal.pose);
        let handle = tokio::select! {
            biased;
            _ = shutdown.triggered() => {
                warn!("shutdown while submitting goal");
                return Err(ScoutError::Cancelled);
            }
            handle = self.navigation.send_goal(nav_goal) => handle?,
        };
        debug!(handle = handle.0, x = goal.pose.x, y = goal.pose.y, "goal accepted");

        tokio::select! {
            biased;
            _ = shutdown.triggered() => {
                warn!(handle = handle.0, "shutdown while driving; cancelling goal");
                self.cancel(handle).await;
                Err(ScoutError::Cancelled)
            }
            outcome = self.wait_bounded(handle) => outcome,
        }
    }

    async fn wait_bounded(&self, handle: GoalHandle) -> Result<GoalOutcome, ScoutError> {
        let status = match self.timeout {
            None => self.navigation.wait_for_result(handle).await,
            Some(limit) => {
                match tokio::time::timeout(limit, self.navigation.wait_for_result(handle)).await {
                    Ok(status) => status,
                    Err(_) => {
                        warn!(handle = handle.0, ?limit, "goal timed out; cancelling");
                        self.cancel(handle).await;
                        return Ok(GoalOutcome::TimedOut);
                    }
                }
            }
        };
        match status {
            Ok(status) => Ok(status.into()),
            Err(e) => {
                warn!(handle = handle.0, error = %e, "lost goal status; cancelling");
                self.cancel(handle).await;
                Err(e)
            }
        }
    }

    /// Best-effort cancellation; a failure is logged, not propagated.
    async fn cancel(&self, handle: GoalHandle) {
        if let Err(e) = self.navigation.cancel_goal(handle).await {
            warn!(handle = handle.0, error = %e, "failed to cancel goal");
        }
    }
}
