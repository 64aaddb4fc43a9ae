//! Two-triangle seed meshes.

use crate::HalfEdgeMesh;
use qmtile_dem::{ElevationSampler, TileRaster};
use qmtile_geo::TileIndices;
use tracing::debug;

/// Builds the seed mesh of one tile.
///
/// The seed is the tile rectangle cut along its SW-NE diagonal into the
/// CCW triangles (sw, se, ne) and (sw, ne, nw).
#[derive(Debug, Clone, Copy, Default)]
pub struct TileMeshBuilder;

impl TileMeshBuilder {
    /// Seed with explicit corner heights in the order SW, SE, NE, NW.
    pub fn seed(tile: TileIndices, heights: [f64; 4]) -> HalfEdgeMesh {
        let e = tile.extent();
        let mut mesh = HalfEdgeMesh::new();
        let sw = mesh.add_vertex(e.min_lon, e.min_lat, heights[0]);
        let se = mesh.add_vertex(e.max_lon, e.min_lat, heights[1]);
        let ne = mesh.add_vertex(e.max_lon, e.max_lat, heights[2]);
        let nw = mesh.add_vertex(e.min_lon, e.max_lat, heights[3]);
        mesh.add_triangle([sw, se, ne], tile, 0);
        mesh.add_triangle([sw, ne, nw], tile, 0);
        mesh.link_twins();
        mesh
    }

    /// Seed with corner heights sampled from `sampler`.
    ///
    /// Corners without data get `fallback`.
    pub fn from_sampler<S: ElevationSampler + ?Sized>(
        tile: TileIndices,
        sampler: &S,
        fallback: f64,
    ) -> HalfEdgeMesh {
        let e = tile.extent();
        let corners = [
            (e.min_lon, e.min_lat),
            (e.max_lon, e.min_lat),
            (e.max_lon, e.max_lat),
            (e.min_lon, e.max_lat),
        ];
        let heights = corners.map(|(lon, lat)| {
            sampler
                .sample(lon, lat)
                .filter(|h| !h.is_nan())
                .unwrap_or_else(|| {
                    debug!(tile = %tile, lon, lat, "no elevation at seed corner");
                    fallback
                })
        });
        Self::seed(tile, heights)
    }

    /// Seed from the corner nodes of a tile raster.
    pub fn from_raster(raster: &TileRaster, fallback: f64) -> HalfEdgeMesh {
        Self::from_sampler(raster.tile(), raster, fallback)
    }

    /// Seeds of the four children of a decoded parent mesh.
    ///
    /// Corner heights are interpolated on the parent surface.
    pub fn children_of(parent: &HalfEdgeMesh, tile: TileIndices, fallback: f64) -> [HalfEdgeMesh; 4] {
        let heights = |lon: f64, lat: f64| parent.height_at(lon, lat);
        tile.children()
            .map(|child| Self::from_sampler(child, &heights, fallback))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoundaryType;
    use approx::assert_relative_eq;

    #[test]
    fn test_from_raster_corners() {
        let tile = TileIndices::new(1, 2, 1).unwrap();
        let raster = TileRaster::from_fn(tile, 5, |lon, lat| Some(lon + lat)).unwrap();
        let mesh = TileMeshBuilder::from_raster(&raster, 0.0);
        let e = tile.extent();
        for v in mesh.vertex_ids() {
            let vertex = mesh.vertex(v);
            assert_relative_eq!(vertex.height, vertex.lon + vertex.lat, epsilon = 1e-3);
        }
        assert_eq!(mesh.position(crate::VertexId(0)), (e.min_lon, e.min_lat));
    }

    #[test]
    fn test_missing_corners_use_fallback() {
        let tile = TileIndices::new(0, 1, 0).unwrap();
        let none = |_: f64, _: f64| -> Option<f64> { None };
        let mesh = TileMeshBuilder::from_sampler(tile, &none, -5.0);
        assert!(mesh.vertex_ids().all(|v| mesh.vertex(v).height == -5.0));
    }

    #[test]
    fn test_children_of_parent() {
        let tile = TileIndices::new(0, 0, 0).unwrap();
        let parent = TileMeshBuilder::seed(tile, [0.0, 100.0, 100.0, 0.0]);
        let children = TileMeshBuilder::children_of(&parent, tile, 0.0);

        for (child, indices) in children.iter().zip(tile.children()) {
            child.validate().unwrap();
            assert_eq!(child.owners().into_iter().collect::<Vec<_>>(), vec![indices]);
            assert_eq!(child.boundary_edges(indices, BoundaryType::Up).len(), 1);
        }
        // SE child's east corners lie on the parent's east edge
        let se = &children[1];
        let heights: Vec<f64> = se.vertex_ids().map(|v| se.vertex(v).height).collect();
        assert_relative_eq!(heights[1], 100.0, epsilon = 1e-9);
        assert_relative_eq!(heights[0], 50.0, epsilon = 1e-9);
    }
}
