//! Error types for the elevation crate.

use qmtile_geo::GeoError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when discovering, opening or sampling elevation rasters.
#[derive(Debug, Error)]
pub enum DemError {
    /// I/O error reading a file or directory.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TIFF decoding error.
    #[error("TIFF decode error: {0}")]
    TiffDecode(#[from] tiff::TiffError),

    /// Invalid GeoTIFF - missing or malformed georeferencing tags.
    #[error("Invalid GeoTIFF {path}: {reason}")]
    InvalidGeoTiff {
        /// File that failed.
        path: PathBuf,
        /// What is wrong with it.
        reason: String,
    },

    /// An input folder does not exist.
    #[error("Input folder not found: {0}")]
    MissingInput(PathBuf),

    /// No readable raster was found under the input folders.
    #[error("No readable elevation rasters found")]
    NoSources,

    /// Raster grid does not match its declared dimensions.
    #[error("Invalid raster: {0}")]
    InvalidRaster(String),

    /// Tile math error.
    #[error(transparent)]
    Geo(#[from] GeoError),
}
