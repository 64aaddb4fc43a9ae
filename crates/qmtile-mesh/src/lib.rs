//! # qmtile-mesh
//!
//! Half-edge meshes for terrain tiles.
//!
//! A [`HalfEdgeMesh`] keeps vertices, half-edges and triangles in arenas
//! addressed by small integer ids. Removing an element only marks it
//! deleted; [`HalfEdgeMesh::compact`] sweeps the tombstones before a mesh is
//! serialized.
//!
//! Meshes of neighboring tiles are stitched along their shared seams so the
//! whole block can be refined as one surface: [`AdaptiveRefiner`] splits
//! triangles across shared edges at once, which keeps the surface free of
//! T-junctions, and [`HalfEdgeMesh::extract_tile`] cuts the refined block
//! back into per-tile meshes.
//!
//! ```
//! use qmtile_geo::TileIndices;
//! use qmtile_mesh::{BoundaryType, TileMeshBuilder};
//!
//! let tile = TileIndices::new(0, 0, 0)?;
//! let mut mesh = TileMeshBuilder::seed(tile, [100.0; 4]);
//! assert_eq!(mesh.triangle_count(), 2);
//! assert_eq!(mesh.boundary_edges(tile, BoundaryType::Left).len(), 1);
//!
//! let t = mesh.triangle_ids().next().unwrap();
//! let he = mesh.longest_edge(t);
//! let (lon, lat) = mesh.edge_midpoint(he);
//! let created = mesh.split_edge(he, lon, lat, 100.0)?;
//! assert_eq!(created.len(), 4);
//! mesh.validate()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod builder;
mod error;
mod mesh;
mod refine;
mod stitch;

pub use builder::TileMeshBuilder;
pub use error::MeshError;
pub use mesh::{
    barycentric, BoundaryType, HalfEdge, HalfEdgeId, HalfEdgeMesh, NanPolicy, SplitOutcome,
    Triangle, TriangleId, Vertex, VertexId,
};
pub use refine::{AdaptiveRefiner, RefineOptions, RefineStats};

/// Result type for mesh operations.
pub type Result<T> = std::result::Result<T, MeshError>;
