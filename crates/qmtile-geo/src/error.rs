//! Error types for tile math.

use thiserror::Error;

/// Errors produced by tile math and extent construction.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeoError {
    /// Depth outside the supported pyramid.
    #[error("Invalid depth {0} (must be 0-{})", crate::MAX_DEPTH)]
    InvalidDepth(u32),

    /// Tile column/row outside the grid of its depth.
    #[error("Tile ({x}, {y}) is outside the {columns}x{rows} grid of depth {level}")]
    TileOutOfRange {
        /// Depth of the tile.
        level: u32,
        /// Requested column.
        x: u32,
        /// Requested row.
        y: u32,
        /// Number of columns at this depth.
        columns: u32,
        /// Number of rows at this depth.
        rows: u32,
    },

    /// Extent bounds are inverted or not finite.
    #[error("Invalid extent: lon {min_lon}..{max_lon}, lat {min_lat}..{max_lat}")]
    InvalidExtent {
        /// West bound.
        min_lon: f64,
        /// East bound.
        max_lon: f64,
        /// South bound.
        min_lat: f64,
        /// North bound.
        max_lat: f64,
    },

    /// Refinement intensity outside the accepted range.
    #[error("Invalid refinement intensity {0} (must be {}-{})", crate::MIN_INTENSITY, crate::MAX_INTENSITY)]
    InvalidIntensity(f64),
}
