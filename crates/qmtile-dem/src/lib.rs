//! # qmtile-dem
//!
//! Elevation input for terrain tiling.
//!
//! Normalized rasters (EPSG:4326 GeoTIFFs, or in-memory grids) are wrapped as
//! [`ElevationSource`]s and organized in an [`ElevationSourceIndex`], a
//! quad-tree that answers "which sources cover this extent" and blends
//! overlapping samples by an [`ElevationPriority`] policy. File-backed rasters
//! are opened lazily through a bounded LRU cache.
//!
//! For each tile being meshed, a [`TileRaster`] holds a small regular grid of
//! samples so refinement can evaluate its error bound without touching the
//! source rasters again.
//!
//! ## Example
//!
//! ```
//! use qmtile_dem::{ElevationSampler, ElevationSource, ElevationSourceIndex, IndexOptions, SourceId};
//! use qmtile_geo::GeographicExtent;
//!
//! let extent = GeographicExtent::new(0.0, 1.0, 0.0, 1.0)?;
//! let flat = ElevationSource::from_grid(SourceId(0), extent, 2, 2, vec![100.0; 4], None)?;
//! let index = ElevationSourceIndex::from_sources(vec![flat], IndexOptions::default())?;
//!
//! assert_eq!(index.sample(0.5, 0.5), Some(100.0));
//! assert_eq!(index.sample(5.0, 5.0), None);
//! # Ok::<(), qmtile_dem::DemError>(())
//! ```

mod cache;
mod error;
mod index;
mod raster;
mod source;
mod tile_raster;

pub use cache::{RasterCache, DEFAULT_CACHE_CAPACITY};
pub use error::DemError;
pub use index::{ElevationSourceIndex, IndexOptions, QUADTREE_MAX_DEPTH};
pub use raster::{Raster, RasterHeader};
pub use source::{ElevationSource, SourceId, SourceOrigin};
pub use tile_raster::{TileRaster, TileRasterSet, DEFAULT_RASTER_SIZE};

use serde::{Deserialize, Serialize};

/// Result type for elevation operations.
pub type Result<T> = std::result::Result<T, DemError>;

/// How a raster is sampled between pixel centers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    /// Weighted average of the 2x2 neighborhood.
    #[default]
    Bilinear,
    /// Value of the closest pixel.
    Nearest,
}

/// How samples from overlapping sources are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElevationPriority {
    /// Use the finest source that has data at the point.
    #[default]
    Resolution,
    /// Use the highest value among all sources with data at the point.
    Maximum,
}

/// Anything that can answer "elevation at (lon, lat)".
pub trait ElevationSampler {
    /// Elevation in meters, or `None` where there is no data.
    fn sample(&self, lon: f64, lat: f64) -> Option<f64>;
}

impl<F> ElevationSampler for F
where
    F: Fn(f64, f64) -> Option<f64>,
{
    fn sample(&self, lon: f64, lat: f64) -> Option<f64> {
        self(lon, lat)
    }
}
