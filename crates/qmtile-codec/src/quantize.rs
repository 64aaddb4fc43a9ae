//! Conversion between half-edge meshes and quantized tiles.

use std::collections::HashMap;

use glam::DVec3;
use qmtile_geo::{
    geodetic_surface_normal, geodetic_to_ecef, GeographicExtent, TileIndices, EPSILON_DEG,
};
use qmtile_mesh::{HalfEdgeMesh, VertexId};
use tracing::warn;

use crate::oct::oct_encode;
use crate::{CodecError, Result, QUANTIZED_MAX};

/// Fixed-size header of a quantized-mesh tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizedMeshHeader {
    /// Earth-centered center of the tile at mid-height.
    pub center: DVec3,
    /// Lowest height in the tile, in meters.
    pub min_height: f32,
    /// Highest height in the tile, in meters.
    pub max_height: f32,
    /// Center of the bounding sphere.
    pub bounding_sphere_center: DVec3,
    /// Radius of the bounding sphere.
    pub bounding_sphere_radius: f64,
    /// Point used for horizon occlusion culling.
    pub horizon_occlusion_point: DVec3,
}

/// A tile in quantized form, ready to be written.
///
/// `u`, `v` and `heights` hold absolute values in `0..=32767`; the delta and
/// zig-zag coding is applied on the wire only.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedMeshTile {
    /// Tile header.
    pub header: QuantizedMeshHeader,
    /// Horizontal coordinate across the extent, west to east.
    pub u: Vec<u16>,
    /// Vertical coordinate across the extent, south to north.
    pub v: Vec<u16>,
    /// Height between the header's min and max.
    pub heights: Vec<u16>,
    /// Counter-clockwise triangle index triples.
    pub indices: Vec<u32>,
    /// Vertices on the west edge, south to north.
    pub west: Vec<u32>,
    /// Vertices on the south edge, west to east.
    pub south: Vec<u32>,
    /// Vertices on the east edge, south to north.
    pub east: Vec<u32>,
    /// Vertices on the north edge, west to east.
    pub north: Vec<u32>,
    /// Oct-encoded vertex normals.
    pub normals: Option<Vec<[u8; 2]>>,
}

impl QuantizedMeshTile {
    /// Number of vertices.
    pub fn vertex_count(&self) -> usize {
        self.u.len()
    }

    /// Number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Indices need 32 bits once there are more than 64Ki vertices.
    pub fn uses_32bit_indices(&self) -> bool {
        self.vertex_count() > 65_536
    }

    /// Check that every per-vertex array and index agrees with the vertex count.
    pub fn check(&self) -> Result<()> {
        let n = self.vertex_count();
        if self.v.len() != n || self.heights.len() != n {
            return Err(CodecError::invalid_tile(format!(
                "vertex arrays differ in length: u={}, v={}, heights={}",
                n,
                self.v.len(),
                self.heights.len()
            )));
        }
        if self.indices.len() % 3 != 0 {
            return Err(CodecError::invalid_tile(format!(
                "index count {} is not a multiple of 3",
                self.indices.len()
            )));
        }
        let lists = [&self.indices, &self.west, &self.south, &self.east, &self.north];
        if let Some(&bad) = lists.iter().flat_map(|l| l.iter()).find(|&&i| i as usize >= n) {
            return Err(CodecError::invalid_tile(format!(
                "index {bad} out of range for {n} vertices"
            )));
        }
        if let Some(normals) = &self.normals {
            if normals.len() != n {
                return Err(CodecError::invalid_tile(format!(
                    "{} normals for {} vertices",
                    normals.len(),
                    n
                )));
            }
        }
        Ok(())
    }

    /// Dequantized `(lon, lat, height)` of every vertex.
    ///
    /// Edge-list vertices are put exactly on the extent outline.
    pub fn positions(&self, extent: &GeographicExtent) -> Vec<(f64, f64, f64)> {
        let scale = f64::from(QUANTIZED_MAX);
        let min_h = f64::from(self.header.min_height);
        let range_h = f64::from(self.header.max_height) - min_h;
        let mut positions: Vec<(f64, f64, f64)> = (0..self.vertex_count())
            .map(|i| {
                let lon = extent.min_lon + f64::from(self.u[i]) / scale * extent.width();
                let lat = extent.min_lat + f64::from(self.v[i]) / scale * extent.height();
                let height = min_h + f64::from(self.heights[i]) / scale * range_h;
                (lon, lat, height)
            })
            .collect();
        for &i in &self.west {
            positions[i as usize].0 = extent.min_lon;
        }
        for &i in &self.east {
            positions[i as usize].0 = extent.max_lon;
        }
        for &i in &self.south {
            positions[i as usize].1 = extent.min_lat;
        }
        for &i in &self.north {
            positions[i as usize].1 = extent.max_lat;
        }
        positions
    }
}

fn quantize(value: f64, min: f64, range: f64) -> u16 {
    if range <= 0.0 || !value.is_finite() {
        return 0;
    }
    let max = f64::from(QUANTIZED_MAX);
    ((value - min) / range * max).round().clamp(0.0, max) as u16
}

/// Largest `f32` not above `value`.
fn f32_at_or_below(value: f64) -> f32 {
    let narrowed = value as f32;
    if f64::from(narrowed) <= value {
        narrowed
    } else if narrowed == 0.0 {
        -f32::from_bits(1)
    } else if narrowed > 0.0 {
        f32::from_bits(narrowed.to_bits() - 1)
    } else {
        f32::from_bits(narrowed.to_bits() + 1)
    }
}

/// Smallest `f32` not below `value`.
fn f32_at_or_above(value: f64) -> f32 {
    -f32_at_or_below(-value)
}

fn quantize_coordinate(value: f64, min: f64, max: f64) -> u16 {
    if (value - min).abs() <= EPSILON_DEG {
        0
    } else if (value - max).abs() <= EPSILON_DEG {
        QUANTIZED_MAX
    } else {
        quantize(value, min, max - min)
    }
}

/// Quantize a mesh over a tile extent.
///
/// Vertices are renumbered in order of first use by the triangles, which is
/// what the high-water-mark index coding needs; unreferenced vertices are
/// dropped. Missing heights are stored as the tile minimum.
pub fn encode(
    mesh: &HalfEdgeMesh,
    extent: &GeographicExtent,
    oct_normals: bool,
) -> Result<QuantizedMeshTile> {
    let mut order: Vec<VertexId> = Vec::with_capacity(mesh.vertex_count());
    let mut renumber: HashMap<VertexId, u32> = HashMap::with_capacity(mesh.vertex_count());
    let mut indices = Vec::with_capacity(mesh.triangle_count() * 3);
    for t in mesh.triangle_ids() {
        for v in mesh.triangle_vertices(t) {
            let next = order.len() as u32;
            let index = *renumber.entry(v).or_insert_with(|| {
                order.push(v);
                next
            });
            indices.push(index);
        }
    }

    let (min_height, max_height) = order
        .iter()
        .map(|&v| mesh.vertex(v).height)
        .filter(|h| h.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, h| match acc {
            None => Some((h, h)),
            Some((lo, hi)) => Some((lo.min(h), hi.max(h))),
        })
        .unwrap_or((0.0, 0.0));
    // Rounded outward so every height lies inside the stored f32 range
    let min_height = f32_at_or_below(min_height);
    let max_height = f32_at_or_above(max_height);
    let min_h = f64::from(min_height);
    let range_h = f64::from(max_height) - min_h;

    let mut tile = QuantizedMeshTile {
        header: header(mesh, &order, extent, min_h, f64::from(max_height)),
        u: Vec::with_capacity(order.len()),
        v: Vec::with_capacity(order.len()),
        heights: Vec::with_capacity(order.len()),
        indices,
        west: Vec::new(),
        south: Vec::new(),
        east: Vec::new(),
        north: Vec::new(),
        normals: None,
    };

    for &id in &order {
        let vertex = mesh.vertex(id);
        tile.u.push(quantize_coordinate(vertex.lon, extent.min_lon, extent.max_lon));
        tile.v.push(quantize_coordinate(vertex.lat, extent.min_lat, extent.max_lat));
        tile.heights.push(quantize(vertex.height, min_h, range_h));
    }

    for i in 0..order.len() {
        let index = i as u32;
        let (u, v) = (tile.u[i], tile.v[i]);
        if u == 0 {
            tile.west.push(index);
        }
        if u == QUANTIZED_MAX {
            tile.east.push(index);
        }
        if v == 0 {
            tile.south.push(index);
        }
        if v == QUANTIZED_MAX {
            tile.north.push(index);
        }
    }
    let (us, vs) = (&tile.u, &tile.v);
    tile.west.sort_by_key(|&i| (vs[i as usize], i));
    tile.east.sort_by_key(|&i| (vs[i as usize], i));
    tile.south.sort_by_key(|&i| (us[i as usize], i));
    tile.north.sort_by_key(|&i| (us[i as usize], i));

    if oct_normals {
        tile.normals = Some(vertex_normals(mesh, &order, &renumber));
    }
    Ok(tile)
}

fn ecef(lon: f64, lat: f64, height: f64, fallback: f64) -> DVec3 {
    geodetic_to_ecef(lon, lat, if height.is_finite() { height } else { fallback })
}

fn header(
    mesh: &HalfEdgeMesh,
    order: &[VertexId],
    extent: &GeographicExtent,
    min_height: f64,
    max_height: f64,
) -> QuantizedMeshHeader {
    let (center_lon, center_lat) = extent.center();
    let mid_height = (min_height + max_height) / 2.0;
    let center = geodetic_to_ecef(center_lon, center_lat, mid_height);

    let (lo, hi) = order
        .iter()
        .map(|&id| {
            let v = mesh.vertex(id);
            ecef(v.lon, v.lat, v.height, min_height)
        })
        .fold((DVec3::splat(f64::INFINITY), DVec3::splat(f64::NEG_INFINITY)), |(lo, hi), p| {
            (lo.min(p), hi.max(p))
        });
    let (sphere_center, radius) = if order.is_empty() {
        (center, 0.0)
    } else {
        ((lo + hi) / 2.0, (hi - lo).length() / 2.0)
    };

    QuantizedMeshHeader {
        center,
        min_height: min_height as f32,
        max_height: max_height as f32,
        bounding_sphere_center: sphere_center,
        bounding_sphere_radius: radius,
        horizon_occlusion_point: sphere_center
            + radius * geodetic_surface_normal(center_lon, center_lat),
    }
}

/// Average of the unit normals of the triangles around each vertex, in
/// Earth-centered coordinates.
fn vertex_normals(
    mesh: &HalfEdgeMesh,
    order: &[VertexId],
    renumber: &HashMap<VertexId, u32>,
) -> Vec<[u8; 2]> {
    let mut sums = vec![DVec3::ZERO; order.len()];
    for t in mesh.triangle_ids() {
        let ids = mesh.triangle_vertices(t);
        let [a, b, c] = ids.map(|id| {
            let v = mesh.vertex(id);
            ecef(v.lon, v.lat, v.height, 0.0)
        });
        let normal = (b - a).cross(c - a).normalize_or_zero();
        for id in ids {
            if let Some(&i) = renumber.get(&id) {
                sums[i as usize] += normal;
            }
        }
    }

    let mut fallbacks = 0usize;
    let normals = order
        .iter()
        .zip(sums)
        .map(|(&id, sum)| {
            let normal = sum.normalize_or_zero();
            if normal == DVec3::ZERO || !normal.is_finite() {
                fallbacks += 1;
                let v = mesh.vertex(id);
                oct_encode(geodetic_surface_normal(v.lon, v.lat))
            } else {
                oct_encode(normal)
            }
        })
        .collect();
    if fallbacks > 0 {
        warn!(fallbacks, "Vertices without a computable normal, using the surface up vector");
    }
    normals
}

/// Rebuild a mesh owned by `owner` from a quantized tile.
pub fn decode(
    tile: &QuantizedMeshTile,
    extent: &GeographicExtent,
    owner: TileIndices,
) -> Result<HalfEdgeMesh> {
    tile.check()?;
    let positions = tile.positions(extent);
    Ok(HalfEdgeMesh::from_triangles(&positions, &tile.indices, owner)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use qmtile_mesh::{BoundaryType, TileMeshBuilder};

    fn tile() -> TileIndices {
        TileIndices::new(3, 9, 5).unwrap()
    }

    #[test]
    fn test_seed_encodes_corners_on_every_edge() {
        let mesh = TileMeshBuilder::seed(tile(), [10.0, 20.0, 30.0, 40.0]);
        let q = encode(&mesh, &tile().extent(), false).unwrap();

        assert_eq!(q.vertex_count(), 4);
        assert_eq!(q.triangle_count(), 2);
        for list in [&q.west, &q.south, &q.east, &q.north] {
            assert_eq!(list.len(), 2);
        }
        assert_eq!(q.header.min_height, 10.0);
        assert_eq!(q.header.max_height, 40.0);
        assert!(q.heights.contains(&0));
        assert!(q.heights.contains(&QUANTIZED_MAX));
        assert!(q.normals.is_none());
    }

    #[test]
    fn test_first_use_order() {
        let mut mesh = TileMeshBuilder::seed(tile(), [0.0; 4]);
        let t = mesh.triangle_ids().next().unwrap();
        let he = mesh.longest_edge(t);
        let (lon, lat) = mesh.edge_midpoint(he);
        mesh.split_edge(he, lon, lat, 5.0).unwrap();
        mesh.add_vertex(0.0, 0.0, 999.0);

        let q = encode(&mesh, &tile().extent(), false).unwrap();
        assert_eq!(q.vertex_count(), 5);
        let mut highest = 0;
        for &i in &q.indices {
            assert!(i <= highest);
            if i == highest {
                highest += 1;
            }
        }
    }

    #[test]
    fn test_flat_tile_heights() {
        let mesh = TileMeshBuilder::seed(tile(), [100.0; 4]);
        let q = encode(&mesh, &tile().extent(), false).unwrap();
        assert_eq!(q.header.min_height, 100.0);
        assert_eq!(q.header.max_height, 100.0);
        assert!(q.heights.iter().all(|&h| h == 0));

        let decoded = decode(&q, &tile().extent(), tile()).unwrap();
        for v in decoded.vertex_ids() {
            assert_eq!(decoded.vertex(v).height, 100.0);
        }
    }

    #[test]
    fn test_nan_height_stored_as_minimum() {
        let mesh = TileMeshBuilder::seed(tile(), [f64::NAN, 20.0, 30.0, 40.0]);
        let q = encode(&mesh, &tile().extent(), false).unwrap();
        assert_eq!(q.header.min_height, 20.0);
        let decoded = decode(&q, &tile().extent(), tile()).unwrap();
        assert!(decoded
            .vertex_ids()
            .all(|v| decoded.vertex(v).height.is_finite()));
    }

    #[test]
    fn test_header_sphere_contains_vertices() {
        let mesh = TileMeshBuilder::seed(tile(), [0.0, 500.0, 1500.0, 250.0]);
        let q = encode(&mesh, &tile().extent(), false).unwrap();
        let h = q.header;
        for v in mesh.vertex_ids() {
            let vertex = mesh.vertex(v);
            let p = geodetic_to_ecef(vertex.lon, vertex.lat, vertex.height);
            assert!(p.distance(h.bounding_sphere_center) <= h.bounding_sphere_radius + 1e-6);
        }
        assert!(h.horizon_occlusion_point.length() > h.bounding_sphere_center.length());
    }

    #[test]
    fn test_decode_puts_edges_on_outline() {
        let t = tile();
        let e = t.extent();
        let mesh = TileMeshBuilder::seed(t, [1.0, 2.0, 3.0, 4.0]);
        let q = encode(&mesh, &e, false).unwrap();
        let decoded = decode(&q, &e, t).unwrap();
        decoded.validate().unwrap();
        for side in [
            BoundaryType::Left,
            BoundaryType::Right,
            BoundaryType::Up,
            BoundaryType::Down,
        ] {
            assert_eq!(decoded.boundary_edges(t, side).len(), 1);
        }
        let east: Vec<f64> = q.east.iter().map(|&i| q.positions(&e)[i as usize].0).collect();
        for lon in east {
            assert_eq!(lon, e.max_lon);
        }
    }

    #[test]
    fn test_normals_point_up_on_flat_tile() {
        let t = tile();
        let mesh = TileMeshBuilder::seed(t, [0.0; 4]);
        let q = encode(&mesh, &t.extent(), true).unwrap();
        let normals = q.normals.as_ref().unwrap();
        assert_eq!(normals.len(), 4);
        let (lon, lat) = t.extent().center();
        let up = geodetic_surface_normal(lon, lat);
        for &n in normals {
            let decoded = crate::oct::oct_decode(n);
            assert!(decoded.dot(up) > 0.9);
        }
    }

    #[test]
    fn test_check_rejects_bad_index() {
        let mesh = TileMeshBuilder::seed(tile(), [0.0; 4]);
        let mut q = encode(&mesh, &tile().extent(), false).unwrap();
        q.indices[0] = 17;
        assert!(matches!(q.check(), Err(CodecError::InvalidTile(_))));
    }

    #[test]
    fn test_narrow_range_at_altitude() {
        // Range far below the f32 spacing at this altitude
        let heights = [8848.000_1, 8848.000_2, 8848.000_3, 8848.000_15];
        let mesh = TileMeshBuilder::seed(tile(), heights);
        let q = encode(&mesh, &tile().extent(), false).unwrap();
        let min = f64::from(q.header.min_height);
        let max = f64::from(q.header.max_height);
        assert!(min <= 8848.000_1);
        assert!(max >= 8848.000_3);

        let half_step = (max - min) / f64::from(QUANTIZED_MAX) / 2.0;
        let decoded = decode(&q, &tile().extent(), tile()).unwrap();
        for (v, original) in decoded.vertex_ids().zip(heights) {
            assert!((decoded.vertex(v).height - original).abs() <= half_step + 1e-9);
        }
    }

    #[test]
    fn test_f32_bounds_enclose_value() {
        for value in [0.1, -0.1, 1.0e-50, -1.0e-50, 8848.000_1, -420.000_07, 0.0] {
            assert!(f64::from(f32_at_or_below(value)) <= value);
            assert!(f64::from(f32_at_or_above(value)) >= value);
        }
        assert_eq!(f32_at_or_below(100.0), 100.0);
        assert_eq!(f32_at_or_above(100.0), 100.0);
    }

    #[test]
    fn test_quantize_snaps_to_outline() {
        assert_eq!(quantize_coordinate(10.0 + 1e-12, 10.0, 20.0), 0);
        assert_eq!(quantize_coordinate(20.0 - 1e-12, 10.0, 20.0), QUANTIZED_MAX);
        assert_eq!(quantize_coordinate(15.0, 10.0, 20.0), 16384);
        assert_relative_eq!(f64::from(quantize(5.0, 0.0, 10.0)), 16384.0);
    }
}
