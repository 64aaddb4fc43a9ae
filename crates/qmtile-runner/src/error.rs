//! Error types for the tiling pipeline.

use qmtile_codec::CodecError;
use qmtile_dem::{DemError, SourceId};
use qmtile_geo::{GeoError, TileIndices};
use qmtile_mesh::MeshError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while generating terrain tiles.
#[derive(Debug, Error)]
pub enum TilerError {
    /// Bad input or configuration; raised before any tile is written.
    #[error("Input error: {0}")]
    Input(String),

    /// One elevation source could not be read and was excluded.
    #[error("Elevation source {source_id} degraded: {reason}")]
    SourceDegraded {
        /// Excluded source.
        source_id: SourceId,
        /// What went wrong.
        reason: String,
    },

    /// Two facing seams carry different numbers of edges.
    #[error("Seam mismatch between {this} and {other}: {detail}")]
    SeamMismatch {
        /// Tile on the kept side of the seam.
        this: TileIndices,
        /// Tile on the donor side.
        other: TileIndices,
        /// Underlying mesh error.
        detail: MeshError,
    },

    /// Refinement of a tile stopped at a split midpoint without elevation.
    #[error("Refinement of {tile} stopped at a midpoint without elevation")]
    RefinementNan {
        /// Tile that was not fully refined.
        tile: TileIndices,
    },

    /// Writing or reading a tile failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Some tiles of a depth could not be written.
    #[error("Depth {level} incomplete: {failed} tiles failed")]
    DepthIncomplete {
        /// Depth that was not checkpointed.
        level: u32,
        /// Number of tiles that failed.
        failed: usize,
    },

    /// Tile encoding or decoding failed.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Mesh operation failed.
    #[error("Mesh error: {0}")]
    Mesh(#[from] MeshError),

    /// Configuration file could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] serde_yaml::Error),

    /// Layer descriptor could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TilerError {
    /// Create an input error.
    pub fn input(message: impl Into<String>) -> Self {
        TilerError::Input(message.into())
    }

    /// Create an I/O error for a path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TilerError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<GeoError> for TilerError {
    fn from(e: GeoError) -> Self {
        TilerError::Input(e.to_string())
    }
}

impl From<DemError> for TilerError {
    fn from(e: DemError) -> Self {
        TilerError::Input(e.to_string())
    }
}
