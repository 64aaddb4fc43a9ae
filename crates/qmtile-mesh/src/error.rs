//! Error types for mesh operations.

use qmtile_geo::TileIndices;
use thiserror::Error;

/// Errors that can occur while building, stitching or refining meshes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeshError {
    /// Two seams to be merged have different numbers of boundary edges.
    #[error("Seam mismatch: {this} boundary edges against {other}")]
    SeamMismatch {
        /// Edges on the receiving side.
        this: usize,
        /// Edges on the donor side.
        other: usize,
    },

    /// Paired seam edges do not share their endpoints.
    #[error("Seam edge pair {index} does not meet")]
    SeamMisaligned {
        /// Position of the pair along the seam.
        index: usize,
    },

    /// A split midpoint has no elevation sample.
    #[error("No elevation at split midpoint ({lon}, {lat}) in tile {tile}")]
    RefinementNan {
        /// Tile owning the triangle being split.
        tile: TileIndices,
        /// Midpoint longitude.
        lon: f64,
        /// Midpoint latitude.
        lat: f64,
    },

    /// Structural invariant violated or bad input buffers.
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),
}

impl MeshError {
    /// Create an invalid mesh error.
    pub fn invalid(message: impl Into<String>) -> Self {
        MeshError::InvalidMesh(message.into())
    }
}
