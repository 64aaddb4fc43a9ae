//! Tile indices and tile ranges of the two-root geodetic pyramid.

use crate::ellipsoid::WGS84_SEMI_MAJOR_AXIS;
use crate::{GeoError, GeographicExtent, Result, EPSILON_DEG};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Deepest supported pyramid depth.
pub const MAX_DEPTH: u32 = 22;

/// Address of one tile: depth, column (from the antimeridian) and row (from the south pole).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileIndices {
    /// Depth in the pyramid.
    pub level: u32,
    /// Column, growing eastward.
    pub x: u32,
    /// Row, growing northward.
    pub y: u32,
}

impl fmt::Display for TileIndices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.level, self.x, self.y)
    }
}

impl TileIndices {
    /// Create tile indices, validating them against the grid of their depth.
    pub fn new(level: u32, x: u32, y: u32) -> Result<Self> {
        if level > MAX_DEPTH {
            return Err(GeoError::InvalidDepth(level));
        }
        let (columns, rows) = (Self::columns(level), Self::rows(level));
        if x >= columns || y >= rows {
            return Err(GeoError::TileOutOfRange {
                level,
                x,
                y,
                columns,
                rows,
            });
        }
        Ok(Self { level, x, y })
    }

    /// Number of tile columns at a depth (`2^(level+1)`).
    pub const fn columns(level: u32) -> u32 {
        2u32 << level
    }

    /// Number of tile rows at a depth (`2^level`).
    pub const fn rows(level: u32) -> u32 {
        1u32 << level
    }

    /// Edge length of every tile at a depth, in degrees.
    pub fn degrees(level: u32) -> f64 {
        180.0 / f64::from(Self::rows(level))
    }

    /// Geographic extent of this tile.
    ///
    /// Both bounds are computed from integer multiples of the tile size so
    /// that neighbors share bit-identical edges.
    pub fn extent(&self) -> GeographicExtent {
        let d = Self::degrees(self.level);
        GeographicExtent {
            min_lon: -180.0 + f64::from(self.x) * d,
            max_lon: -180.0 + f64::from(self.x + 1) * d,
            min_lat: -90.0 + f64::from(self.y) * d,
            max_lat: -90.0 + f64::from(self.y + 1) * d,
        }
    }

    /// Parent tile, or `None` for the two roots.
    pub fn parent(&self) -> Option<TileIndices> {
        if self.level == 0 {
            return None;
        }
        Some(TileIndices {
            level: self.level - 1,
            x: self.x / 2,
            y: self.y / 2,
        })
    }

    /// The four children in the order SW, SE, NW, NE.
    pub fn children(&self) -> [TileIndices; 4] {
        let level = self.level + 1;
        let (x, y) = (self.x * 2, self.y * 2);
        [
            TileIndices { level, x, y },
            TileIndices { level, x: x + 1, y },
            TileIndices { level, x, y: y + 1 },
            TileIndices {
                level,
                x: x + 1,
                y: y + 1,
            },
        ]
    }

    /// Tile of a depth that contains a coordinate.
    ///
    /// Coordinates on a shared edge belong to the east/north tile, except on
    /// the antimeridian and the north pole where the last column/row is used.
    pub fn containing(level: u32, lon: f64, lat: f64) -> Result<Self> {
        if level > MAX_DEPTH {
            return Err(GeoError::InvalidDepth(level));
        }
        let d = Self::degrees(level);
        let col = ((lon + 180.0) / d).floor().max(0.0) as u32;
        let row = ((lat + 90.0) / d).floor().max(0.0) as u32;
        Ok(Self {
            level,
            x: col.min(Self::columns(level) - 1),
            y: row.min(Self::rows(level) - 1),
        })
    }

    /// Neighbor offset by `(dx, dy)` tiles, if it exists.
    pub fn offset(&self, dx: i64, dy: i64) -> Option<TileIndices> {
        let x = i64::from(self.x) + dx;
        let y = i64::from(self.y) + dy;
        if x < 0 || y < 0 {
            return None;
        }
        TileIndices::new(self.level, x as u32, y as u32).ok()
    }
}

/// Extent of tile `(level, x, y)`, rejecting indices outside the pyramid.
pub fn extent_of(level: u32, x: u32, y: u32) -> Result<GeographicExtent> {
    Ok(TileIndices::new(level, x, y)?.extent())
}

/// Width of a tile at the equator in meters.
pub fn tile_size_meters(level: u32) -> Result<f64> {
    if level > MAX_DEPTH {
        return Err(GeoError::InvalidDepth(level));
    }
    Ok(2.0 * std::f64::consts::PI * WGS84_SEMI_MAJOR_AXIS / f64::from(TileIndices::columns(level)))
}

/// Inclusive rectangle of tiles at one depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileRange {
    /// Depth of every tile in the range.
    pub level: u32,
    /// West-most column.
    pub min_x: u32,
    /// East-most column.
    pub max_x: u32,
    /// South-most row.
    pub min_y: u32,
    /// North-most row.
    pub max_y: u32,
}

impl fmt::Display for TileRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/[{}..={}]/[{}..={}]",
            self.level, self.min_x, self.max_x, self.min_y, self.max_y
        )
    }
}

impl TileRange {
    /// Range covering every tile of a depth.
    pub fn full(level: u32) -> Result<Self> {
        if level > MAX_DEPTH {
            return Err(GeoError::InvalidDepth(level));
        }
        Ok(Self {
            level,
            min_x: 0,
            max_x: TileIndices::columns(level) - 1,
            min_y: 0,
            max_y: TileIndices::rows(level) - 1,
        })
    }

    /// Smallest range of tiles covering an extent.
    ///
    /// An extent ending exactly on a tile edge does not pull in the next tile.
    pub fn for_extent(level: u32, extent: &GeographicExtent) -> Result<Self> {
        let min = TileIndices::containing(level, extent.min_lon, extent.min_lat)?;
        let max = TileIndices::containing(
            level,
            (extent.max_lon - EPSILON_DEG).max(extent.min_lon),
            (extent.max_lat - EPSILON_DEG).max(extent.min_lat),
        )?;
        Ok(Self {
            level,
            min_x: min.x,
            max_x: max.x.max(min.x),
            min_y: min.y,
            max_y: max.y.max(min.y),
        })
    }

    /// Grow the range by `n` tiles on every side, clamped to the grid.
    pub fn expanded(&self, n: u32) -> TileRange {
        TileRange {
            level: self.level,
            min_x: self.min_x.saturating_sub(n),
            max_x: (self.max_x + n).min(TileIndices::columns(self.level) - 1),
            min_y: self.min_y.saturating_sub(n),
            max_y: (self.max_y + n).min(TileIndices::rows(self.level) - 1),
        }
    }

    /// Number of columns.
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    /// Number of rows.
    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    /// Number of tiles.
    pub fn len(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    /// A range always holds at least one tile.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Check if a tile belongs to the range.
    pub fn contains(&self, tile: &TileIndices) -> bool {
        tile.level == self.level
            && (self.min_x..=self.max_x).contains(&tile.x)
            && (self.min_y..=self.max_y).contains(&tile.y)
    }

    /// Tiles in row-major order, south row first.
    pub fn iter(&self) -> impl Iterator<Item = TileIndices> + '_ {
        (self.min_y..=self.max_y).flat_map(move |y| {
            (self.min_x..=self.max_x).map(move |x| TileIndices {
                level: self.level,
                x,
                y,
            })
        })
    }

    /// Union of the extents of all tiles in the range.
    pub fn extent(&self) -> GeographicExtent {
        let sw = TileIndices {
            level: self.level,
            x: self.min_x,
            y: self.min_y,
        }
        .extent();
        let ne = TileIndices {
            level: self.level,
            x: self.max_x,
            y: self.max_y,
        }
        .extent();
        sw.union(&ne)
    }

    /// Partition into sub-ranges of at most `block_size` x `block_size` tiles.
    pub fn blocks(&self, block_size: u32) -> Vec<TileRange> {
        let step = block_size.max(1);
        let mut blocks = Vec::new();
        let mut y = self.min_y;
        while y <= self.max_y {
            let max_y = (y + step - 1).min(self.max_y);
            let mut x = self.min_x;
            while x <= self.max_x {
                let max_x = (x + step - 1).min(self.max_x);
                blocks.push(TileRange {
                    level: self.level,
                    min_x: x,
                    max_x,
                    min_y: y,
                    max_y,
                });
                x = max_x + 1;
            }
            y = max_y + 1;
        }
        blocks
    }

    /// Range of the children of every tile in this range.
    pub fn children(&self) -> TileRange {
        TileRange {
            level: self.level + 1,
            min_x: self.min_x * 2,
            max_x: self.max_x * 2 + 1,
            min_y: self.min_y * 2,
            max_y: self.max_y * 2 + 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_root_tiles() {
        assert_eq!(TileIndices::columns(0), 2);
        assert_eq!(TileIndices::rows(0), 1);

        let west = extent_of(0, 0, 0).unwrap();
        assert_eq!(
            west,
            GeographicExtent::new(-180.0, 0.0, -90.0, 90.0).unwrap()
        );
        let east = extent_of(0, 1, 0).unwrap();
        assert_eq!(east, GeographicExtent::new(0.0, 180.0, -90.0, 90.0).unwrap());

        assert!(extent_of(0, 2, 0).is_err());
        assert!(extent_of(0, 0, 1).is_err());
        assert!(extent_of(MAX_DEPTH + 1, 0, 0).is_err());
    }

    #[test]
    fn test_children_partition_parent() {
        for level in [0u32, 1, 5, 12, MAX_DEPTH - 1] {
            let columns = TileIndices::columns(level);
            let rows = TileIndices::rows(level);
            let samples = [(0, 0), (columns - 1, rows - 1), (columns / 2, rows / 2)];
            for (x, y) in samples {
                let parent = TileIndices::new(level, x, y).unwrap();
                let pe = parent.extent();
                let children = parent.children();

                let mut union = children[0].extent();
                let mut area = 0.0;
                for child in &children {
                    assert_eq!(child.parent(), Some(parent));
                    let ce = child.extent();
                    union = union.union(&ce);
                    area += ce.area();
                }
                assert_eq!(union, pe);
                assert_relative_eq!(area, pe.area(), max_relative = 1e-12);

                for i in 0..4 {
                    for j in (i + 1)..4 {
                        let overlap = children[i]
                            .extent()
                            .intersection(&children[j].extent())
                            .map(|e| e.area())
                            .unwrap_or(0.0);
                        assert!(overlap <= EPSILON_DEG, "children {i} and {j} overlap");
                    }
                }
            }
        }
    }

    #[test]
    fn test_neighbors_share_edges() {
        let a = TileIndices::new(7, 100, 40).unwrap();
        let b = a.offset(1, 0).unwrap();
        let c = a.offset(0, 1).unwrap();
        assert_eq!(a.extent().max_lon, b.extent().min_lon);
        assert_eq!(a.extent().max_lat, c.extent().min_lat);
        assert!(TileIndices::new(0, 0, 0).unwrap().offset(-1, 0).is_none());
    }

    #[test]
    fn test_containing() {
        let t = TileIndices::containing(0, -10.0, 45.0).unwrap();
        assert_eq!((t.x, t.y), (0, 0));
        let t = TileIndices::containing(0, 180.0, 90.0).unwrap();
        assert_eq!((t.x, t.y), (1, 0));
        let t = TileIndices::containing(3, -180.0, -90.0).unwrap();
        assert_eq!((t.x, t.y), (0, 0));
    }

    #[test]
    fn test_tile_size_meters() {
        let s0 = tile_size_meters(0).unwrap();
        assert_relative_eq!(s0, 20_037_508.342789244, max_relative = 1e-9);
        assert_relative_eq!(tile_size_meters(1).unwrap(), s0 / 2.0);
        assert!(tile_size_meters(MAX_DEPTH + 1).is_err());
    }

    #[test]
    fn test_range_for_extent_and_blocks() {
        let extent = GeographicExtent::new(-10.0, 10.0, -10.0, 10.0).unwrap();
        let range = TileRange::for_extent(3, &extent).unwrap();
        // 22.5 degree tiles: columns 7..=8, rows 3..=4
        assert_eq!((range.min_x, range.max_x), (7, 8));
        assert_eq!((range.min_y, range.max_y), (3, 4));
        assert_eq!(range.len(), 4);

        let edge = GeographicExtent::new(0.0, 22.5, 0.0, 22.5).unwrap();
        let range = TileRange::for_extent(3, &edge).unwrap();
        assert_eq!(range.len(), 1);

        let full = TileRange::full(2).unwrap();
        let blocks = full.blocks(3);
        let covered: usize = blocks.iter().map(|b| b.len()).sum();
        assert_eq!(covered, full.len());
        assert!(blocks.iter().all(|b| b.width() <= 3 && b.height() <= 3));
    }

    #[test]
    fn test_range_expanded_is_clamped() {
        let range = TileRange {
            level: 1,
            min_x: 0,
            max_x: 0,
            min_y: 0,
            max_y: 0,
        };
        let grown = range.expanded(1);
        assert_eq!((grown.min_x, grown.max_x, grown.min_y, grown.max_y), (0, 1, 0, 1));
        assert_eq!(grown.iter().count(), 4);
        assert!(grown.contains(&TileIndices::new(1, 1, 1).unwrap()));
    }
}
