//! Per-depth refinement thresholds.
//!
//! Triangle size bounds shrink with depth; the minimum is additionally scaled
//! by the user intensity so that a higher intensity yields denser meshes.

use crate::tile::{tile_size_meters, MAX_DEPTH};
use crate::{GeoError, Result, WGS84_SEMI_MAJOR_AXIS};

/// Lowest accepted refinement intensity.
pub const MIN_INTENSITY: f64 = 1.0;

/// Highest accepted refinement intensity.
pub const MAX_INTENSITY: f64 = 16.0;

/// Maximum geometric error of a depth-0 tile, in meters.
///
/// Quarter of the equatorial circumference spread over a 65-sample height
/// grid of each of the two root tiles.
pub const LEVEL_ZERO_GEOMETRIC_ERROR: f64 =
    WGS84_SEMI_MAJOR_AXIS * 2.0 * std::f64::consts::PI * 0.25 / (65.0 * 2.0);

/// Smallest minimum triangle size, in meters.
const MIN_TRIANGLE_FLOOR_M: f64 = 1.0;

/// Longest triangle edge allowed before a split is forced, relative to the tile size.
const MAX_TRIANGLE_FACTOR: f64 = 1.5;

/// Divisor applied to the tile size (times intensity) for the minimum triangle size.
const MIN_TRIANGLE_DIVISOR: f64 = 8.0;

/// Passes allowed beyond those needed to shrink the largest triangle to the minimum.
const ITERATION_SLACK: u32 = 4;

/// Nominal vertical error bound for a depth in meters.
pub fn refinement_error_bound(level: u32) -> Result<f64> {
    if level > MAX_DEPTH {
        return Err(GeoError::InvalidDepth(level));
    }
    Ok(LEVEL_ZERO_GEOMETRIC_ERROR / f64::from(1u32 << level))
}

/// Refinement thresholds for every depth, derived from one intensity.
#[derive(Debug, Clone)]
pub struct RefinementTables {
    intensity: f64,
    min_triangle_size: Vec<f64>,
    max_triangle_size: Vec<f64>,
    error_bound: Vec<f64>,
    max_iterations: Vec<u32>,
}

impl RefinementTables {
    /// Build the tables for an intensity in `[1, 16]`.
    pub fn new(intensity: f64) -> Result<Self> {
        if !(MIN_INTENSITY..=MAX_INTENSITY).contains(&intensity) {
            return Err(GeoError::InvalidIntensity(intensity));
        }

        let depths = 0..=MAX_DEPTH;
        let mut min_triangle_size = Vec::with_capacity(depths.clone().count());
        let mut max_triangle_size = Vec::with_capacity(depths.clone().count());
        let mut error_bound = Vec::with_capacity(depths.clone().count());
        let mut max_iterations = Vec::with_capacity(depths.clone().count());

        for level in depths {
            let tile = tile_size_meters(level)?;
            let max = tile * MAX_TRIANGLE_FACTOR;
            let min = (tile / (MIN_TRIANGLE_DIVISOR * intensity)).max(MIN_TRIANGLE_FLOOR_M);
            max_triangle_size.push(max);
            min_triangle_size.push(min);
            error_bound.push(refinement_error_bound(level)?);
            // Longest-edge bisection shrinks the longest edge by sqrt(2) per pass
            let passes = (2.0 * (max / min).log2()).ceil().max(0.0) as u32;
            max_iterations.push(passes + ITERATION_SLACK);
        }

        Ok(Self {
            intensity,
            min_triangle_size,
            max_triangle_size,
            error_bound,
            max_iterations,
        })
    }

    /// Intensity the tables were built from.
    pub fn intensity(&self) -> f64 {
        self.intensity
    }

    fn slot(level: u32) -> usize {
        level.min(MAX_DEPTH) as usize
    }

    /// Triangles with a longest edge below this size (meters) are never split.
    pub fn min_triangle_size(&self, level: u32) -> f64 {
        self.min_triangle_size[Self::slot(level)]
    }

    /// Triangles with a longest edge above this size (meters) are always split.
    pub fn max_triangle_size(&self, level: u32) -> f64 {
        self.max_triangle_size[Self::slot(level)]
    }

    /// Nominal vertical error bound (meters).
    pub fn error_bound(&self, level: u32) -> f64 {
        self.error_bound[Self::slot(level)]
    }

    /// Cap on refinement passes over a block.
    ///
    /// Enough passes for a triangle of the maximum size to be bisected down
    /// to the minimum size, so the cap only stops runaway refinement.
    pub fn max_iterations(&self, level: u32) -> u32 {
        self.max_iterations[Self::slot(level)]
    }
}
