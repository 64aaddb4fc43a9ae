//! Per-tile regular sample grids used to evaluate refinement error.

use crate::{DemError, ElevationSampler, Result};
use qmtile_geo::{GeographicExtent, TileIndices, TileRange};
use std::collections::BTreeMap;

/// Default number of samples along each tile edge.
pub const DEFAULT_RASTER_SIZE: u32 = 65;

/// A `size` x `size` grid of elevation samples spanning one tile, edges included.
///
/// Row 0 is the southern edge. Missing samples are stored as NaN.
#[derive(Debug, Clone)]
pub struct TileRaster {
    tile: TileIndices,
    extent: GeographicExtent,
    size: u32,
    heights: Vec<f32>,
}

impl TileRaster {
    /// Sample `sampler` on the grid of `tile`.
    pub fn materialize<S: ElevationSampler + ?Sized>(
        tile: TileIndices,
        size: u32,
        sampler: &S,
    ) -> Result<Self> {
        Self::from_fn(tile, size, |lon, lat| sampler.sample(lon, lat))
    }

    /// Build the grid from an arbitrary elevation function.
    pub fn from_fn<F>(tile: TileIndices, size: u32, f: F) -> Result<Self>
    where
        F: Fn(f64, f64) -> Option<f64>,
    {
        if size < 2 {
            return Err(DemError::InvalidRaster(format!(
                "tile raster needs at least 2 samples per edge, got {size}"
            )));
        }
        let extent = tile.extent();
        let mut raster = Self {
            tile,
            extent,
            size,
            heights: Vec::with_capacity(size as usize * size as usize),
        };
        for j in 0..size {
            for i in 0..size {
                let (lon, lat) = raster.grid_point(i, j);
                let h = f(lon, lat).map(|v| v as f32).unwrap_or(f32::NAN);
                raster.heights.push(h);
            }
        }
        Ok(raster)
    }

    /// Tile this grid belongs to.
    pub fn tile(&self) -> TileIndices {
        self.tile
    }

    /// Extent of the tile.
    pub fn extent(&self) -> &GeographicExtent {
        &self.extent
    }

    /// Samples per edge.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Grid spacing in degrees as `(lon, lat)`.
    pub fn spacing(&self) -> (f64, f64) {
        let steps = f64::from(self.size - 1);
        (self.extent.width() / steps, self.extent.height() / steps)
    }

    /// Coordinate of grid node `(i, j)`. The last node lands exactly on the tile edge.
    pub fn grid_point(&self, i: u32, j: u32) -> (f64, f64) {
        let (dx, dy) = self.spacing();
        let last = self.size - 1;
        let lon = if i == last {
            self.extent.max_lon
        } else {
            self.extent.min_lon + f64::from(i) * dx
        };
        let lat = if j == last {
            self.extent.max_lat
        } else {
            self.extent.min_lat + f64::from(j) * dy
        };
        (lon, lat)
    }

    /// Elevation at grid node `(i, j)`, or `None` for no data.
    pub fn value(&self, i: u32, j: u32) -> Option<f64> {
        if i >= self.size || j >= self.size {
            return None;
        }
        let h = self.heights[j as usize * self.size as usize + i as usize];
        if h.is_nan() {
            None
        } else {
            Some(f64::from(h))
        }
    }

    /// Check if at least one node has data.
    pub fn has_data(&self) -> bool {
        self.heights.iter().any(|h| !h.is_nan())
    }

    /// Grid nodes with data inside `bounds`, as `(lon, lat, height)`.
    pub fn points_within<'a>(
        &'a self,
        bounds: &GeographicExtent,
    ) -> impl Iterator<Item = (f64, f64, f64)> + 'a {
        let (dx, dy) = self.spacing();
        let last = f64::from(self.size - 1);
        let index_range = |min: f64, max: f64, origin: f64, step: f64| {
            let lo = ((min - origin) / step).ceil().clamp(0.0, last) as u32;
            let hi = ((max - origin) / step).floor().clamp(0.0, last) as u32;
            (lo, hi)
        };
        let (i0, i1) = index_range(bounds.min_lon, bounds.max_lon, self.extent.min_lon, dx);
        let (j0, j1) = index_range(bounds.min_lat, bounds.max_lat, self.extent.min_lat, dy);
        let empty = !self.extent.intersects(bounds);

        (j0..=j1)
            .flat_map(move |j| (i0..=i1).map(move |i| (i, j)))
            .filter(move |_| !empty)
            .filter_map(move |(i, j)| {
                let (lon, lat) = self.grid_point(i, j);
                self.value(i, j).map(|h| (lon, lat, h))
            })
    }
}

impl ElevationSampler for TileRaster {
    /// Bilinear interpolation between grid nodes.
    ///
    /// No-data at the nearest node yields `None`; other missing nodes are
    /// dropped from the weighting.
    fn sample(&self, lon: f64, lat: f64) -> Option<f64> {
        if !self.extent.contains(lon, lat) {
            return None;
        }
        let (dx, dy) = self.spacing();
        let last = f64::from(self.size - 1);
        let fx = ((lon - self.extent.min_lon) / dx).clamp(0.0, last);
        let fy = ((lat - self.extent.min_lat) / dy).clamp(0.0, last);
        let nearest = self.value(fx.round() as u32, fy.round() as u32)?;

        let x0 = fx.floor() as u32;
        let y0 = fy.floor() as u32;
        let x1 = (x0 + 1).min(self.size - 1);
        let y1 = (y0 + 1).min(self.size - 1);
        let tx = fx - f64::from(x0);
        let ty = fy - f64::from(y0);

        let mut sum = 0.0;
        let mut weight = 0.0;
        for (x, y, w) in [
            (x0, y0, (1.0 - tx) * (1.0 - ty)),
            (x1, y0, tx * (1.0 - ty)),
            (x0, y1, (1.0 - tx) * ty),
            (x1, y1, tx * ty),
        ] {
            if let Some(v) = self.value(x, y) {
                sum += v * w;
                weight += w;
            }
        }
        if weight > f64::EPSILON {
            Some(sum / weight)
        } else {
            Some(nearest)
        }
    }
}

/// The tile rasters of one block and its halo, all at one depth.
#[derive(Debug, Clone)]
pub struct TileRasterSet {
    level: u32,
    rasters: BTreeMap<TileIndices, TileRaster>,
}

impl TileRasterSet {
    /// Create an empty set for a depth.
    pub fn new(level: u32) -> Self {
        Self {
            level,
            rasters: BTreeMap::new(),
        }
    }

    /// Materialize a raster for every tile of `range`.
    pub fn materialize<S: ElevationSampler + ?Sized>(
        range: &TileRange,
        size: u32,
        sampler: &S,
    ) -> Result<Self> {
        let mut set = Self::new(range.level);
        for tile in range.iter() {
            set.insert(TileRaster::materialize(tile, size, sampler)?);
        }
        Ok(set)
    }

    /// Depth of every raster in the set.
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Add or replace a raster.
    pub fn insert(&mut self, raster: TileRaster) {
        self.rasters.insert(raster.tile(), raster);
    }

    /// Raster of a tile.
    pub fn get(&self, tile: &TileIndices) -> Option<&TileRaster> {
        self.rasters.get(tile)
    }

    /// Number of rasters.
    pub fn len(&self) -> usize {
        self.rasters.len()
    }

    /// Check if the set holds no raster.
    pub fn is_empty(&self) -> bool {
        self.rasters.is_empty()
    }

    /// Tiles with a raster, in index order.
    pub fn tiles(&self) -> impl Iterator<Item = TileIndices> + '_ {
        self.rasters.keys().copied()
    }
}

impl ElevationSampler for TileRasterSet {
    fn sample(&self, lon: f64, lat: f64) -> Option<f64> {
        let owner = TileIndices::containing(self.level, lon, lat).ok();
        if let Some(value) = owner
            .and_then(|tile| self.rasters.get(&tile))
            .and_then(|raster| raster.sample(lon, lat))
        {
            return Some(value);
        }
        // Points on a shared edge also belong to the west/south neighbor
        self.rasters
            .values()
            .filter(|raster| raster.extent().contains(lon, lat))
            .find_map(|raster| raster.sample(lon, lat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn plane(lon: f64, lat: f64) -> Option<f64> {
        Some(2.0 * lon + 3.0 * lat)
    }

    #[test]
    fn test_grid_covers_tile_edges() {
        let tile = TileIndices::new(3, 5, 2).unwrap();
        let raster = TileRaster::from_fn(tile, 5, plane).unwrap();
        let extent = tile.extent();

        assert_eq!(raster.grid_point(0, 0), (extent.min_lon, extent.min_lat));
        assert_eq!(raster.grid_point(4, 4), (extent.max_lon, extent.max_lat));
        assert_relative_eq!(
            raster.value(4, 0).unwrap(),
            plane(extent.max_lon, extent.min_lat).unwrap(),
            max_relative = 1e-6
        );
        assert!(raster.has_data());
    }

    #[test]
    fn test_bilinear_reproduces_plane() {
        let tile = TileIndices::new(2, 1, 1).unwrap();
        let raster = TileRaster::from_fn(tile, 9, plane).unwrap();
        let (lon, lat) = tile.extent().center();
        let expected = plane(lon + 1.3, lat - 2.1).unwrap();
        assert_relative_eq!(raster.sample(lon + 1.3, lat - 2.1).unwrap(), expected, max_relative = 1e-5);
        assert!(raster.sample(lon + 90.0, lat).is_none());
    }

    #[test]
    fn test_rejects_degenerate_size() {
        let tile = TileIndices::new(0, 0, 0).unwrap();
        assert!(TileRaster::from_fn(tile, 1, plane).is_err());
    }

    #[test]
    fn test_missing_nearest_is_none() {
        let tile = TileIndices::new(1, 0, 0).unwrap();
        let extent = tile.extent();
        let raster = TileRaster::from_fn(tile, 3, |lon, _| (lon > extent.min_lon).then_some(10.0)).unwrap();
        assert!(raster.sample(extent.min_lon + 1.0, extent.min_lat + 1.0).is_none());
        assert_relative_eq!(raster.sample(extent.max_lon, extent.max_lat).unwrap(), 10.0);
    }

    #[test]
    fn test_points_within_bounds() {
        let tile = TileIndices::new(0, 0, 0).unwrap();
        // Spacing is 45 degrees
        let raster = TileRaster::from_fn(tile, 5, plane).unwrap();
        let bounds = GeographicExtent::new(-140.0, -40.0, -50.0, 50.0).unwrap();
        let points: Vec<_> = raster.points_within(&bounds).collect();
        // lon -135, -90, -45 and lat -45, 0, 45
        assert_eq!(points.len(), 9);
        assert!(points.iter().all(|&(lon, lat, _)| bounds.contains(lon, lat)));

        let outside = GeographicExtent::new(10.0, 20.0, 0.0, 10.0).unwrap();
        assert_eq!(raster.points_within(&outside).count(), 0);
    }

    #[test]
    fn test_set_samples_owner_and_shared_edges() {
        let range = TileRange::full(1).unwrap();
        let set = TileRasterSet::materialize(&range, 5, &plane).unwrap();
        assert_eq!(set.len(), 8);
        assert_relative_eq!(set.sample(-45.0, 0.0).unwrap(), plane(-45.0, 0.0).unwrap(), max_relative = 1e-6);
        assert_relative_eq!(set.sample(180.0, 90.0).unwrap(), plane(180.0, 90.0).unwrap(), max_relative = 1e-6);
    }
}
