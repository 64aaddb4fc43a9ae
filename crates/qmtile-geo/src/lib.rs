//! # qmtile-geo
//!
//! Geodetic tile math for quantized-mesh terrain pyramids.
//!
//! The tiling scheme is the two-root geodetic pyramid used by virtual-globe
//! clients: depth 0 holds two tiles covering the western and eastern
//! hemispheres, and every tile is quartered at the next depth. Rows are
//! numbered from the south (TMS order).
//!
//! ```
//! use qmtile_geo::{TileIndices, tile_size_meters};
//!
//! let west = TileIndices::new(0, 0, 0)?;
//! let extent = west.extent();
//! assert_eq!(extent.min_lon, -180.0);
//! assert_eq!(extent.max_lon, 0.0);
//! assert_eq!(west.children().len(), 4);
//! assert!(tile_size_meters(1)? < tile_size_meters(0)?);
//! # Ok::<(), qmtile_geo::GeoError>(())
//! ```

mod ellipsoid;
mod error;
mod extent;
mod refinement;
mod tile;

pub use ellipsoid::{
    geodetic_surface_normal, geodetic_to_ecef, planar_distance_meters, METERS_PER_DEGREE,
    WGS84_ECCENTRICITY_SQUARED, WGS84_SEMI_MAJOR_AXIS,
};
pub use error::GeoError;
pub use extent::{GeographicExtent, EPSILON_DEG};
pub use refinement::{
    refinement_error_bound, RefinementTables, LEVEL_ZERO_GEOMETRIC_ERROR, MAX_INTENSITY,
    MIN_INTENSITY,
};
pub use tile::{extent_of, tile_size_meters, TileIndices, TileRange, MAX_DEPTH};

/// Result type for geodesy operations.
pub type Result<T> = std::result::Result<T, GeoError>;
