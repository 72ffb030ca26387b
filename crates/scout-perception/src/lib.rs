//! `scout-perception` – pure geometry and grid queries.
//!
//! Nothing in this crate performs I/O or retries; every function is a query
//! over values it is handed.
//!
//! # Modules
//!
//! - [`transform`] – world ↔ grid pose conversion under an arbitrary grid
//!   origin (translation + rotation), plus the [`Quaternion`][transform::Quaternion]
//!   yaw helpers used by pose and goal messages.
//! - [`grid`] – [`OccupancyGrid`][grid::OccupancyGrid]: decoded, bounds-checked
//!   view over one occupancy snapshot.
//! - [`frontier`] – [`FrontierDetector`][frontier::FrontierDetector]: frontier
//!   classification, expanding-ring nearest-frontier search, and raster scan.

pub mod frontier;
pub mod grid;
pub mod transform;

pub use frontier::FrontierDetector;
pub use grid::{GridMessage, OccupancyGrid};
