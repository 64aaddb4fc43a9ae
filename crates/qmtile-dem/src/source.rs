//! Elevation sources: one normalized raster plus the metadata needed to rank it.

use crate::raster::{Raster, RasterHeader};
use crate::Result;
use qmtile_geo::GeographicExtent;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Stable identifier of a source within one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u32);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// Where the raster of a source lives.
#[derive(Debug, Clone)]
pub enum SourceOrigin {
    /// A GeoTIFF on disk, opened through the raster cache.
    File(PathBuf),
    /// A grid already held in memory.
    Memory(Arc<Raster>),
}

/// One elevation raster with its extent and native resolution.
#[derive(Debug, Clone)]
pub struct ElevationSource {
    id: SourceId,
    origin: SourceOrigin,
    header: RasterHeader,
    pixel_size_meters: (f64, f64),
}

impl ElevationSource {
    /// Describe a GeoTIFF on disk by reading only its header.
    pub fn from_file<P: AsRef<Path>>(id: SourceId, path: P) -> Result<Self> {
        let path = path.as_ref();
        let header = RasterHeader::read(path)?;
        Ok(Self::with_header(id, SourceOrigin::File(path.to_path_buf()), header))
    }

    /// Wrap an in-memory raster.
    pub fn from_raster(id: SourceId, raster: Raster) -> Self {
        let header = *raster.header();
        Self::with_header(id, SourceOrigin::Memory(Arc::new(raster)), header)
    }

    /// Build an in-memory source from a row-major grid (north row first).
    pub fn from_grid(
        id: SourceId,
        extent: GeographicExtent,
        width: u32,
        height: u32,
        data: Vec<f32>,
        no_data: Option<f32>,
    ) -> Result<Self> {
        let raster = Raster::from_grid(extent, width, height, data, no_data)?;
        Ok(Self::from_raster(id, raster))
    }

    fn with_header(id: SourceId, origin: SourceOrigin, header: RasterHeader) -> Self {
        Self {
            id,
            origin,
            pixel_size_meters: header.pixel_size_meters(),
            header,
        }
    }

    pub(crate) fn with_id(mut self, id: SourceId) -> Self {
        self.id = id;
        self
    }

    /// Identifier within the owning index.
    pub fn id(&self) -> SourceId {
        self.id
    }

    /// Where the raster lives.
    pub fn origin(&self) -> &SourceOrigin {
        &self.origin
    }

    /// Path on disk, if file-backed.
    pub fn path(&self) -> Option<&Path> {
        match &self.origin {
            SourceOrigin::File(path) => Some(path),
            SourceOrigin::Memory(_) => None,
        }
    }

    /// Geographic coverage.
    pub fn extent(&self) -> GeographicExtent {
        self.header.extent
    }

    /// Native pixel size in meters as `(x, y)`.
    pub fn pixel_size_meters(&self) -> (f64, f64) {
        self.pixel_size_meters
    }

    /// Native pixel area in square meters; smaller means finer.
    pub fn pixel_area(&self) -> f64 {
        self.pixel_size_meters.0 * self.pixel_size_meters.1
    }

    /// Declared no-data sentinel.
    pub fn no_data(&self) -> Option<f32> {
        self.header.no_data
    }
}

impl fmt::Display for ElevationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.origin {
            SourceOrigin::File(path) => write!(f, "{} ({})", self.id, path.display()),
            SourceOrigin::Memory(_) => write!(f, "{} (memory)", self.id),
        }
    }
}
