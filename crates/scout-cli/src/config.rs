//! Run configuration – reads `scout.toml`.
//!
//! Every key is optional; a missing file means "all defaults".  `SCOUT_*`
//! environment variables override values from the file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use scout_middleware::SimConfig;
use scout_runtime::{LoopConfig, PlannerConfig};
use scout_types::{Pose2D, ScoutError};

/// Config file used when no path is given on the command line.
pub const DEFAULT_CONFIG_PATH: &str = "scout.toml";

/// Top-level `scout.toml` layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub explore: ExploreSection,
    #[serde(default)]
    pub sim: SimSection,
    #[serde(default)]
    pub debug: DebugSection,
}

/// `[explore]` – planner and loop tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExploreSection {
    #[serde(default = "default_min_search_radius")]
    pub min_search_radius: u32,
    #[serde(default = "default_true")]
    pub raster_fallback: bool,
    #[serde(default = "default_max_fetch_retries")]
    pub max_fetch_retries: u32,
    #[serde(default = "default_max_drive_failures")]
    pub max_drive_failures: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Unset means goals may take as long as the navigation stack needs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_timeout_secs: Option<f64>,
    #[serde(default = "default_stall_threshold")]
    pub stall_threshold: usize,
    #[serde(default = "default_global_frame")]
    pub global_frame: String,
    #[serde(default = "default_robot_frame")]
    pub robot_frame: String,
}

/// `[sim]` – the simulated world the CLI explores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimSection {
    /// ASCII map (`#` wall, `.` floor).  Unset uses the built-in floor plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<PathBuf>,
    #[serde(default = "default_resolution")]
    pub resolution: f64,
    #[serde(default)]
    pub origin_x: f64,
    #[serde(default)]
    pub origin_y: f64,
    #[serde(default)]
    pub origin_theta: f64,
    #[serde(default = "default_start_cell")]
    pub start_row: i64,
    #[serde(default = "default_start_cell")]
    pub start_col: i64,
    #[serde(default = "default_sensor_radius")]
    pub sensor_radius: f64,
    #[serde(default)]
    pub goal_latency_ms: u64,
}

/// `[debug]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugSection {
    /// Write one PNG per exploration cycle into this directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_dir: Option<PathBuf>,
}

fn default_min_search_radius() -> u32 {
    PlannerConfig::default().min_search_radius
}
fn default_true() -> bool {
    true
}
fn default_max_fetch_retries() -> u32 {
    3
}
fn default_max_drive_failures() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_stall_threshold() -> usize {
    5
}
fn default_global_frame() -> String {
    "map".to_string()
}
fn default_robot_frame() -> String {
    "base_link".to_string()
}
fn default_resolution() -> f64 {
    0.05
}
fn default_start_cell() -> i64 {
    1
}
fn default_sensor_radius() -> f64 {
    6.0
}

impl Default for ExploreSection {
    fn default() -> Self {
        Self {
            min_search_radius: default_min_search_radius(),
            raster_fallback: true,
            max_fetch_retries: default_max_fetch_retries(),
            max_drive_failures: default_max_drive_failures(),
            retry_backoff_ms: default_retry_backoff_ms(),
            goal_timeout_secs: None,
            stall_threshold: default_stall_threshold(),
            global_frame: default_global_frame(),
            robot_frame: default_robot_frame(),
        }
    }
}

impl Default for SimSection {
    fn default() -> Self {
        Self {
            map: None,
            resolution: default_resolution(),
            origin_x: 0.0,
            origin_y: 0.0,
            origin_theta: 0.0,
            start_row: default_start_cell(),
            start_col: default_start_cell(),
            sensor_radius: default_sensor_radius(),
            goal_latency_ms: 0,
        }
    }
}

impl Config {
    /// Reject values the runtime cannot represent.
    pub fn validate(&self) -> Result<(), ScoutError> {
        if let Some(secs) = self.explore.goal_timeout_secs
            && !(secs > 0.0 && Duration::try_from_secs_f64(secs).is_ok())
        {
            return Err(ScoutError::Config(format!(
                "explore.goal_timeout_secs must be a positive, representable duration, got {secs}"
            )));
        }
        if !(self.sim.resolution.is_finite() && self.sim.resolution > 0.0) {
            return Err(ScoutError::Config(format!(
                "sim.resolution must be a positive number, got {}",
                self.sim.resolution
            )));
        }
        if self.explore.global_frame.is_empty() || self.explore.robot_frame.is_empty() {
            return Err(ScoutError::Config("frame names must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn loop_config(&self) -> LoopConfig {
        let e = &self.explore;
        LoopConfig {
            planner: PlannerConfig {
                min_search_radius: e.min_search_radius,
                raster_fallback: e.raster_fallback,
            },
            max_fetch_retries: e.max_fetch_retries,
            max_drive_failures: e.max_drive_failures,
            retry_backoff: Duration::from_millis(e.retry_backoff_ms),
            goal_timeout: e
                .goal_timeout_secs
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok()),
            stall_threshold: e.stall_threshold,
            global_frame: e.global_frame.clone(),
            robot_frame: e.robot_frame.clone(),
        }
    }

    pub fn sim_config(&self) -> SimConfig {
        SimConfig {
            sensor_radius: self.sim.sensor_radius,
            goal_latency: Duration::from_millis(self.sim.goal_latency_ms),
        }
    }

    pub fn grid_origin(&self) -> Pose2D {
        Pose2D::new(self.sim.origin_x, self.sim.origin_y, self.sim.origin_theta)
    }
}

/// Load `path`, apply environment overrides and validate.  A missing file
/// yields the defaults.
pub fn load(path: &Path) -> Result<Config, ScoutError> {
    let mut cfg = load_from(path)?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(cfg)
}

/// Parse the file at `path`.  Returns `None` if it does not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, ScoutError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| ScoutError::Config(format!("failed to read {}: {e}", path.display())))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| ScoutError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// Apply `SCOUT_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SCOUT_MIN_RADIUS` | `explore.min_search_radius` |
/// | `SCOUT_MAX_FETCH_RETRIES` | `explore.max_fetch_retries` |
/// | `SCOUT_GOAL_TIMEOUT_SECS` | `explore.goal_timeout_secs` |
/// | `SCOUT_DEBUG_IMAGE_DIR` | `debug.image_dir` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("SCOUT_MIN_RADIUS")
        && let Ok(radius) = v.parse::<u32>()
    {
        cfg.explore.min_search_radius = radius;
    }
    if let Ok(v) = std::env::var("SCOUT_MAX_FETCH_RETRIES")
        && let Ok(retries) = v.parse::<u32>()
    {
        cfg.explore.max_fetch_retries = retries;
    }
    if let Ok(v) = std::env::var("SCOUT_GOAL_TIMEOUT_SECS")
        && let Ok(secs) = v.parse::<f64>()
    {
        cfg.explore.goal_timeout_secs = Some(secs);
    }
    if let Ok(v) = std::env::var("SCOUT_DEBUG_IMAGE_DIR")
        && !v.is_empty()
    {
        cfg.debug.image_dir = Some(PathBuf::from(v));
    }
}
