//! Simulation settings and tuning constants.

use crate::collision::Aabb;
use crate::math::Vec2;
use std::f64::consts::PI;

// engine tuning constants

/// Constant padding applied to fat AABBs in the broad phase tree.
pub const AABB_MARGIN: f64 = 0.05;
/// How far ahead of a moving body its fat AABB is extended, in timesteps.
pub const VELOCITY_MULTIPLIER: f64 = 4.0;
/// Contact points closer than this merge into a single manifold point.
pub const CONTACT_MERGE_THRESHOLD: f64 = 0.005;
/// Maximum number of points in a contact manifold.
pub const MAX_CONTACT_POINT: usize = 2;
/// Maximum positional correction applied by one position-solver iteration.
pub const MAX_POSITION_CORRECTION: f64 = 0.2;

pub const GJK_MAX_ITERATION: usize = 20;
/// Squared distance below which the simplex is considered to contain the origin.
pub const GJK_TOLERANCE: f64 = 1.0e-13;
pub const EPA_MAX_ITERATION: usize = 32;
pub const EPA_TOLERANCE: f64 = 1.0e-6;
pub const SHAPE_CAST_MAX_ITERATION: usize = 20;
pub const SHAPE_CAST_TOLERANCE: f64 = 1.0e-4;

/// World-level simulation options.
///
/// The defaults are tuned for worlds measured in meters with bodies in the
/// 0.1 to 10 range.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde-types", derive(serde::Deserialize, serde::Serialize))]
pub struct WorldSettings {
    /// Reference fixed timestep. [`World::step`][crate::World::step] takes
    /// the actual dt; this is used by creation helpers and documentation.
    pub dt: f64,
    pub inv_dt: f64,

    pub apply_gravity: bool,
    pub gravity: Vec2,

    pub velocity_iterations: u32,
    pub position_iterations: u32,

    pub warm_starting: bool,
    /// Squared relative-velocity gate: impulses are carried across frames
    /// only while the bodies move slowly relative to each other.
    pub warm_starting_threshold: f64,

    /// Resolve penetration with the split position solver. When disabled,
    /// a Baumgarte term is folded into the velocity bias instead.
    pub position_correction: bool,
    pub position_correction_beta: f64,

    /// Penetration below this depth is left uncorrected.
    pub penetration_slop: f64,
    /// Approach speeds below this produce no restitution.
    pub restitution_slop: f64,

    /// Solve two-point manifolds as a single 2x2 LCP instead of
    /// point-by-point Gauss-Seidel.
    pub block_solve: bool,

    pub sleeping: bool,
    pub sleep_linear_tol: f64,
    pub sleep_angular_tol: f64,
    pub sleep_time_threshold: f64,

    /// Bodies whose origin leaves this region are destroyed.
    pub valid_region: Aabb,
}

impl Default for WorldSettings {
    fn default() -> Self {
        WorldSettings {
            dt: 1.0 / 60.0,
            inv_dt: 60.0,
            apply_gravity: true,
            gravity: Vec2::new(0.0, -10.0),
            velocity_iterations: 10,
            position_iterations: 3,
            warm_starting: true,
            warm_starting_threshold: 0.005 * 0.005,
            position_correction: true,
            position_correction_beta: 0.2,
            penetration_slop: 0.005,
            restitution_slop: 0.5,
            block_solve: true,
            sleeping: true,
            sleep_linear_tol: 0.01,
            sleep_angular_tol: 0.5 * PI / 180.0,
            sleep_time_threshold: 0.5,
            valid_region: Aabb::new(
                Vec2::new(f64::MIN, f64::MIN),
                Vec2::new(f64::MAX, f64::MAX),
            ),
        }
    }
}

/// Per-step timing data handed to constraint preparation.
#[derive(Clone, Copy, Debug)]
pub struct TimeStep {
    pub dt: f64,
    pub inv_dt: f64,
    pub velocity_iterations: u32,
    pub position_iterations: u32,
    pub warm_starting: bool,
}

impl TimeStep {
    pub(crate) fn new(dt: f64, settings: &WorldSettings) -> Self {
        TimeStep {
            dt,
            inv_dt: if dt > 0.0 { 1.0 / dt } else { 0.0 },
            velocity_iterations: settings.velocity_iterations,
            position_iterations: settings.position_iterations,
            warm_starting: settings.warm_starting,
        }
    }
}
