//! Cross-tile seam stitching and per-tile extraction.

use crate::mesh::{BoundaryType, HalfEdgeId, HalfEdgeMesh, VertexId};
use crate::{MeshError, Result};
use qmtile_geo::{TileIndices, EPSILON_DEG};
use std::collections::HashMap;

fn same_position(a: (f64, f64), b: (f64, f64)) -> bool {
    (a.0 - b.0).abs() <= EPSILON_DEG && (a.1 - b.1).abs() <= EPSILON_DEG
}

impl HalfEdgeMesh {
    /// Merge `other` into this mesh along a shared seam.
    ///
    /// `edges_self` and `edges_other` are the twinless boundary half-edges of
    /// the two sides, both sorted by position along the seam. They are paired
    /// index for index: the donor's endpoint vertices are identified with
    /// this mesh's vertices and each pair becomes twins. All other donor
    /// elements are copied in with fresh ids.
    ///
    /// Nothing is modified if the lists differ in length or a pair does not
    /// share its endpoints.
    pub fn merge_along_seam(
        &mut self,
        other: &HalfEdgeMesh,
        edges_self: &[HalfEdgeId],
        edges_other: &[HalfEdgeId],
    ) -> Result<()> {
        if edges_self.len() != edges_other.len() {
            return Err(MeshError::SeamMismatch {
                this: edges_self.len(),
                other: edges_other.len(),
            });
        }

        let mut identified = HashMap::new();
        for (index, (&ours, &theirs)) in edges_self.iter().zip(edges_other).enumerate() {
            let (a, b) = (self.half_edge(ours).start, self.end_vertex(ours));
            let (c, d) = (other.half_edge(theirs).start, other.end_vertex(theirs));
            let meets = same_position(other.position(c), self.position(b))
                && same_position(other.position(d), self.position(a));
            if !meets {
                return Err(MeshError::SeamMisaligned { index });
            }
            identified.insert(c, b);
            identified.insert(d, a);
        }

        let edge_map = self.copy_from(other, &identified);
        for (&ours, &theirs) in edges_self.iter().zip(edges_other) {
            if let Some(copied) = edge_map.get(&theirs) {
                self.set_twins(ours, *copied);
            }
        }
        Ok(())
    }

    /// Copy `other` into this mesh without stitching any seam.
    pub fn append(&mut self, other: &HalfEdgeMesh) {
        self.copy_from(other, &HashMap::new());
    }

    /// Copy the live elements of `other`, reusing `identified` vertices.
    ///
    /// Returns the id of each copied half-edge keyed by its id in `other`.
    fn copy_from(
        &mut self,
        other: &HalfEdgeMesh,
        identified: &HashMap<VertexId, VertexId>,
    ) -> HashMap<HalfEdgeId, HalfEdgeId> {
        let mut vertex_map = HashMap::new();
        for v in other.vertex_ids() {
            let mapped = match identified.get(&v) {
                Some(&ours) => ours,
                None => {
                    let vertex = other.vertex(v);
                    self.add_vertex(vertex.lon, vertex.lat, vertex.height)
                }
            };
            vertex_map.insert(v, mapped);
        }

        let mut edge_map = HashMap::new();
        for t in other.triangle_ids() {
            let source = other.triangle(t);
            let edges = other.triangle_half_edges(t);
            let vertices = other
                .triangle_vertices(t)
                .map(|v| vertex_map.get(&v).copied().unwrap_or(v));
            let copied = self.add_triangle(vertices, source.owner, source.split_depth);
            self.set_refine_checked(copied, source.refine_checked);
            for (old, new) in edges.into_iter().zip(self.triangle_half_edges(copied)) {
                edge_map.insert(old, new);
            }
        }

        for (&old, &new) in &edge_map {
            if let Some(twin) = other.half_edge(old).twin.and_then(|t| edge_map.get(&t)) {
                self.set_twins(new, *twin);
            }
        }
        edge_map
    }

    /// Distinct endpoints of a seam as `(lon, lat, height)`, in seam order.
    pub fn seam_points(&self, owner: TileIndices, side: BoundaryType) -> Vec<(f64, f64, f64)> {
        let mut points: Vec<(f64, f64, f64)> = Vec::new();
        for he in self.boundary_edges(owner, side) {
            for v in [self.half_edge(he).start, self.end_vertex(he)] {
                let vertex = self.vertex(v);
                let p = (vertex.lon, vertex.lat);
                if !points.iter().any(|q| same_position((q.0, q.1), p)) {
                    points.push((vertex.lon, vertex.lat, vertex.height));
                }
            }
        }
        let along = |p: &(f64, f64, f64)| if side.is_vertical() { p.1 } else { p.0 };
        points.sort_by(|a, b| along(a).total_cmp(&along(b)));
        points
    }

    /// Split seam edges so every point of `points` becomes a seam vertex.
    ///
    /// Points that already are vertices, or that fall outside the seam, are
    /// skipped. Returns the number of vertices inserted.
    pub fn insert_seam_points(
        &mut self,
        owner: TileIndices,
        side: BoundaryType,
        points: &[(f64, f64, f64)],
    ) -> Result<usize> {
        let along = |lon: f64, lat: f64| if side.is_vertical() { lat } else { lon };
        let mut inserted = 0;
        for &(lon, lat, height) in points {
            let edges = self.boundary_edges(owner, side);
            let target = along(lon, lat);
            let mut hit = None;
            for he in edges {
                let a = self.position(self.half_edge(he).start);
                let b = self.position(self.end_vertex(he));
                if same_position(a, (lon, lat)) || same_position(b, (lon, lat)) {
                    hit = None;
                    break;
                }
                let (lo, hi) = {
                    let (sa, sb) = (along(a.0, a.1), along(b.0, b.1));
                    (sa.min(sb), sa.max(sb))
                };
                if target > lo && target < hi {
                    hit = Some(he);
                }
            }
            if let Some(he) = hit {
                self.split_edge(he, lon, lat, height)?;
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Make two facing seams carry the same vertices.
    ///
    /// Each side receives the seam vertices only the other side has, with the
    /// other side's heights. Returns the number inserted into this mesh and
    /// into `other`.
    pub fn conform_seam(
        &mut self,
        seam: (TileIndices, BoundaryType),
        other: &mut HalfEdgeMesh,
        other_seam: (TileIndices, BoundaryType),
    ) -> Result<(usize, usize)> {
        let ours = self.seam_points(seam.0, seam.1);
        let theirs = other.seam_points(other_seam.0, other_seam.1);
        let into_self = self.insert_seam_points(seam.0, seam.1, &theirs)?;
        let into_other = other.insert_seam_points(other_seam.0, other_seam.1, &ours)?;
        Ok((into_self, into_other))
    }

    /// Standalone mesh of the triangles owned by `tile`.
    ///
    /// Twins across the tile outline are cut, so the result's seams become
    /// boundary edges again.
    pub fn extract_tile(&self, tile: TileIndices) -> HalfEdgeMesh {
        let mut out = HalfEdgeMesh::new();
        let mut vertex_map: HashMap<VertexId, VertexId> = HashMap::new();
        for t in self.triangle_ids() {
            let source = self.triangle(t);
            if source.owner != tile {
                continue;
            }
            let vertices = self.triangle_vertices(t).map(|v| {
                *vertex_map.entry(v).or_insert_with(|| {
                    let vertex = self.vertex(v);
                    out.add_vertex(vertex.lon, vertex.lat, vertex.height)
                })
            });
            let copied = out.add_triangle(vertices, tile, source.split_depth);
            out.set_refine_checked(copied, source.refine_checked);
        }
        out.link_twins();
        out
    }
}
