//! World ↔ grid coordinate transforms.
//!
//! An occupancy grid is placed in the world by its *origin pose*: the world
//! pose of the corner of pixel `(0, 0)`, including the rotation of the grid
//! axes relative to the world axes.  This module converts between
//!
//! * world poses ([`Pose2D`], metres / radians), and
//! * grid poses ([`GridPose`], integer pixel `x` = column, `y` = row).
//!
//! [`world_to_grid`] translates by `-origin`, rotates by `-origin.theta`,
//! scales by `1 / resolution` and truncates toward zero.  [`grid_to_world`]
//! is the inverse affine map.  Because of the truncation the round trip is
//! lossy: a world point comes back as the world position of the corner of the
//! cell it fell into.
//!
//! Robot poses and grid origins arrive on the wire as a position plus a
//! [`Quaternion`]; only the yaw is used.
//!
//! # Example
//!
//! ```rust
//! use scout_perception::transform::{grid_to_world, world_to_grid};
//! use scout_types::{GridMetadata, GridPose, Pose2D};
//!
//! let meta = GridMetadata::new(10, 10, 0.5);
//! let origin = Pose2D::new(1.0, 2.0, 0.0);
//!
//! let px = world_to_grid(Pose2D::new(2.2, 3.6, 0.0), origin, &meta);
//! assert_eq!(px, GridPose::new(2, 3, 0.0));
//!
//! let back = grid_to_world(px, origin, &meta);
//! assert!((back.x - 2.0).abs() < 1e-9 && (back.y - 3.5).abs() < 1e-9);
//! ```

use std::f64::consts::{PI, TAU};

use scout_types::{GridMetadata, GridPose, Pose2D};
use serde::{Deserialize, Serialize};

// ────────────────────────────────────────────────────────────────────────────
// Primitive types
// ────────────────────────────────────────────────────────────────────────────

/// A 3-D position vector as carried by pose and goal messages.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

/// A unit quaternion representing a 3-D rotation (w, x, y, z convention).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub w: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Quaternion {
    /// Create a quaternion.  The caller is responsible for providing a unit
    /// quaternion (|q| = 1).
    pub fn new(w: f64, x: f64, y: f64, z: f64) -> Self {
        Self { w, x, y, z }
    }

    /// The identity rotation.
    pub fn identity() -> Self {
        Self::new(1.0, 0.0, 0.0, 0.0)
    }

    /// Pure rotation of `yaw` radians about the Z axis (roll = pitch = 0).
    pub fn from_yaw(yaw: f64) -> Self {
        let half = yaw * 0.5;
        Self::new(half.cos(), 0.0, 0.0, half.sin())
    }

    /// Heading about the Z axis (ZYX Euler yaw), in (-π, π].
    ///
    /// Roll and pitch are discarded; a planar robot only cares about yaw.
    pub fn yaw(self) -> f64 {
        let siny_cosp = 2.0 * (self.w * self.z + self.x * self.y);
        let cosy_cosp = 1.0 - 2.0 * (self.y * self.y + self.z * self.z);
        siny_cosp.atan2(cosy_cosp)
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

/// Wrap an angle to (-π, π].
pub fn normalize_angle(theta: f64) -> f64 {
    let mut wrapped = theta.rem_euclid(TAU);
    if wrapped > PI {
        wrapped -= TAU;
    }
    wrapped
}

// ────────────────────────────────────────────────────────────────────────────
// World ↔ grid
// ────────────────────────────────────────────────────────────────────────────

/// Convert a world pose into the pixel pose of the grid described by
/// `origin` and `metadata`.
///
/// Both rotated components are computed from the *same* translated pair
/// `(dx, dy)`; x and y are truncated toward zero.
pub fn world_to_grid(world: Pose2D, origin: Pose2D, metadata: &GridMetadata) -> GridPose {
    let (gx, gy) = world_to_grid_continuous(world, origin, metadata);
    GridPose::new(
        gx.trunc() as i64,
        gy.trunc() as i64,
        normalize_angle(world.theta - origin.theta),
    )
}

/// Un-truncated grid coordinates `(x, y)` of a world position, in cells.
pub fn world_to_grid_continuous(
    world: Pose2D,
    origin: Pose2D,
    metadata: &GridMetadata,
) -> (f64, f64) {
    let dx = (world.x - origin.x) / metadata.resolution;
    let dy = (world.y - origin.y) / metadata.resolution;
    let (sin, cos) = (-origin.theta).sin_cos();
    (dx * cos - dy * sin, dx * sin + dy * cos)
}

/// Convert a pixel pose back into the world frame: scale by `resolution`,
/// rotate by `+origin.theta`, translate by `+origin`.
pub fn grid_to_world(grid: GridPose, origin: Pose2D, metadata: &GridMetadata) -> Pose2D {
    let sx = grid.x as f64 * metadata.resolution;
    let sy = grid.y as f64 * metadata.resolution;
    let (sin, cos) = origin.theta.sin_cos();

    Pose2D::new(
        sx * cos - sy * sin + origin.x,
        sx * sin + sy * cos + origin.y,
        normalize_angle(grid.theta + origin.theta),
    )
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
