//! `scout-middleware` – the boundary between Scout and the robot.
//!
//! # Modules
//!
//! - [`adapter`] – [`GridProvider`], [`PoseProvider`] and
//!   [`NavigationService`]: the traits every map server, localisation source
//!   and navigation stack adapter implements, plus their wire messages.
//! - [`bus`] – [`EventBus`]: broadcast channel carrying exploration events to
//!   optional observers (debug image writer, CLI progress output).
//! - [`sim`] – [`SimWorld`]: a ground-truth world that implements all three
//!   adapter traits in-process.

pub mod adapter;
pub mod bus;
pub mod sim;

pub use adapter::{
    GoalHandle, GridProvider, NavGoal, NavigationService, PoseProvider, PoseRequest, PoseStamp,
    StampedPose,
};
pub use bus::EventBus;
pub use sim::{ScriptedStatus, SimConfig, SimWorld};
