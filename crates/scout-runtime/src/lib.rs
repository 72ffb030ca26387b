//! `scout-runtime` – frontier exploration orchestration.
//!
//! # Modules
//!
//! - [`explore_loop`] – [`ExplorationLoop`][explore_loop::ExplorationLoop]:
//!   the FETCHING → PLANNING → DRIVING state machine with bounded retries,
//!   stall detection, shutdown handling and bus events.
//! - [`planner`] – [`ExplorationPlanner`][planner::ExplorationPlanner]:
//!   one grid + pose snapshot in, one world-frame goal (or `Done`) out.
//! - [`goal_driver`] – [`GoalDriver`][goal_driver::GoalDriver]: submits a
//!   goal to the navigation service and waits for its outcome, with an
//!   optional timeout.
//! - [`stall_guard`] – [`StallGuard`][stall_guard::StallGuard]: detects the
//!   planner selecting the same frontier over and over.
//! - [`shutdown`] – watch-channel shutdown trigger/signal pair.
//! - [`debug_image`] – optional bus subscriber that renders every snapshot
//!   to a PNG.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: global
//!   `tracing` subscriber with optional OTLP export.

pub mod debug_image;
pub mod explore_loop;
pub mod goal_driver;
pub mod planner;
pub mod shutdown;
pub mod stall_guard;
pub mod telemetry;

pub use debug_image::{DebugImageSink, render_snapshot};
pub use explore_loop::{ExplorationLoop, LoopConfig};
pub use goal_driver::GoalDriver;
pub use planner::{ExplorationPlanner, PlanOutcome, PlannerConfig};
pub use shutdown::{ShutdownSignal, ShutdownTrigger, shutdown_channel};
pub use stall_guard::StallGuard;
pub use telemetry::{TracerProviderGuard, init_tracing};
