//! Arena half-edge mesh.

use crate::{MeshError, Result};
use qmtile_dem::ElevationSampler;
use qmtile_geo::{planar_distance_meters, GeographicExtent, TileIndices, EPSILON_DEG};
use qmtile_metrics::metric_defs;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::warn;

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident, $prefix:literal) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            /// Position in the arena.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

arena_id!(
    /// Index of a vertex in its mesh.
    VertexId,
    "v"
);
arena_id!(
    /// Index of a half-edge in its mesh.
    HalfEdgeId,
    "he"
);
arena_id!(
    /// Index of a triangle in its mesh.
    TriangleId,
    "t"
);

/// Which side of its owning tile a half-edge lies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoundaryType {
    /// West edge.
    Left,
    /// East edge.
    Right,
    /// North edge.
    Up,
    /// South edge.
    Down,
    /// Not on the tile outline.
    Interior,
}

impl BoundaryType {
    /// The side facing this one across a seam.
    pub fn opposite(self) -> BoundaryType {
        match self {
            BoundaryType::Left => BoundaryType::Right,
            BoundaryType::Right => BoundaryType::Left,
            BoundaryType::Up => BoundaryType::Down,
            BoundaryType::Down => BoundaryType::Up,
            BoundaryType::Interior => BoundaryType::Interior,
        }
    }

    /// Check if the seam runs north-south.
    pub fn is_vertical(self) -> bool {
        matches!(self, BoundaryType::Left | BoundaryType::Right)
    }
}

/// What to store when a split midpoint has no elevation sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NanPolicy {
    /// Store NaN as sampled.
    Keep,
    /// Use the mean of the split edge's endpoint heights.
    #[default]
    Interpolate,
    /// Refuse the split and report the tile.
    AbortTile,
}

/// A mesh vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    /// Longitude in degrees.
    pub lon: f64,
    /// Latitude in degrees.
    pub lat: f64,
    /// Height in meters.
    pub height: f64,
    /// One half-edge starting here.
    pub outgoing: Option<HalfEdgeId>,
    deleted: bool,
}

impl Vertex {
    /// Check if the vertex was deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

/// A directed edge owned by one triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HalfEdge {
    /// Vertex the edge starts at.
    pub start: VertexId,
    /// Next half-edge around the triangle.
    pub next: HalfEdgeId,
    /// Opposite half-edge of the neighboring triangle.
    pub twin: Option<HalfEdgeId>,
    /// Triangle this half-edge belongs to.
    pub triangle: TriangleId,
    /// Position relative to the owning tile outline.
    pub boundary: BoundaryType,
    deleted: bool,
}

impl HalfEdge {
    /// Check if the half-edge was deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

/// A mesh triangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    /// First half-edge of the 3-loop.
    pub edge: HalfEdgeId,
    /// Tile the triangle is emitted into.
    pub owner: TileIndices,
    /// Number of splits since the seed triangle.
    pub split_depth: u32,
    /// Set once refinement found the triangle accurate enough.
    pub refine_checked: bool,
    deleted: bool,
}

impl Triangle {
    /// Check if the triangle was deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

/// Result of splitting one triangle.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitOutcome {
    /// New midpoint vertex.
    pub vertex: VertexId,
    /// Triangles replacing the split ones (2 or 4).
    pub triangles: Vec<TriangleId>,
    /// The midpoint had no elevation sample.
    pub nan_midpoint: bool,
}

/// Triangle mesh with twin-linked half-edges.
///
/// Elements are never removed from the arenas while the mesh is edited, so
/// ids stay valid until [`HalfEdgeMesh::compact`].
#[derive(Debug, Clone, Default)]
pub struct HalfEdgeMesh {
    vertices: Vec<Vertex>,
    half_edges: Vec<HalfEdge>,
    triangles: Vec<Triangle>,
}

impl HalfEdgeMesh {
    /// Create an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a mesh from positions `(lon, lat, height)` and CCW index triples.
    ///
    /// Twins are linked wherever two triangles share an edge.
    pub fn from_triangles(
        positions: &[(f64, f64, f64)],
        indices: &[u32],
        owner: TileIndices,
    ) -> Result<Self> {
        if indices.len() % 3 != 0 {
            return Err(MeshError::invalid(format!(
                "index count {} is not a multiple of 3",
                indices.len()
            )));
        }
        let mut mesh = Self::new();
        for &(lon, lat, height) in positions {
            mesh.add_vertex(lon, lat, height);
        }
        for tri in indices.chunks_exact(3) {
            if let Some(&bad) = tri.iter().find(|&&i| i as usize >= positions.len()) {
                return Err(MeshError::invalid(format!(
                    "index {} out of range for {} vertices",
                    bad,
                    positions.len()
                )));
            }
            mesh.add_triangle([VertexId(tri[0]), VertexId(tri[1]), VertexId(tri[2])], owner, 0);
        }
        mesh.link_twins();
        Ok(mesh)
    }

    // ========================================================================
    // Access
    // ========================================================================

    /// Vertex by id.
    pub fn vertex(&self, id: VertexId) -> &Vertex {
        &self.vertices[id.index()]
    }

    /// Half-edge by id.
    pub fn half_edge(&self, id: HalfEdgeId) -> &HalfEdge {
        &self.half_edges[id.index()]
    }

    /// Triangle by id.
    pub fn triangle(&self, id: TriangleId) -> &Triangle {
        &self.triangles[id.index()]
    }

    /// Check if a triangle id refers to a live triangle.
    pub fn is_alive(&self, id: TriangleId) -> bool {
        self.triangles.get(id.index()).is_some_and(|t| !t.deleted)
    }

    /// Live vertex ids.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.deleted)
            .map(|(i, _)| VertexId(i as u32))
    }

    /// Live half-edge ids.
    pub fn half_edge_ids(&self) -> impl Iterator<Item = HalfEdgeId> + '_ {
        self.half_edges
            .iter()
            .enumerate()
            .filter(|(_, e)| !e.deleted)
            .map(|(i, _)| HalfEdgeId(i as u32))
    }

    /// Live triangle ids.
    pub fn triangle_ids(&self) -> impl Iterator<Item = TriangleId> + '_ {
        self.triangles
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.deleted)
            .map(|(i, _)| TriangleId(i as u32))
    }

    /// Number of live vertices.
    pub fn vertex_count(&self) -> usize {
        self.vertices.iter().filter(|v| !v.deleted).count()
    }

    /// Number of live half-edges.
    pub fn half_edge_count(&self) -> usize {
        self.half_edges.iter().filter(|e| !e.deleted).count()
    }

    /// Number of live triangles.
    pub fn triangle_count(&self) -> usize {
        self.triangles.iter().filter(|t| !t.deleted).count()
    }

    /// Check if the mesh has no live triangle.
    pub fn is_empty(&self) -> bool {
        self.triangle_count() == 0
    }

    /// Tiles owning at least one live triangle.
    pub fn owners(&self) -> BTreeSet<TileIndices> {
        self.triangles
            .iter()
            .filter(|t| !t.deleted)
            .map(|t| t.owner)
            .collect()
    }

    /// Vertex the half-edge ends at.
    pub fn end_vertex(&self, he: HalfEdgeId) -> VertexId {
        self.half_edge(self.half_edge(he).next).start
    }

    /// The three half-edges of a triangle, starting at its first one.
    pub fn triangle_half_edges(&self, t: TriangleId) -> [HalfEdgeId; 3] {
        let e0 = self.triangle(t).edge;
        let e1 = self.half_edge(e0).next;
        let e2 = self.half_edge(e1).next;
        [e0, e1, e2]
    }

    /// The three vertices of a triangle in CCW order.
    pub fn triangle_vertices(&self, t: TriangleId) -> [VertexId; 3] {
        self.triangle_half_edges(t)
            .map(|he| self.half_edge(he).start)
    }

    /// Longitude and latitude of a vertex.
    pub fn position(&self, v: VertexId) -> (f64, f64) {
        let v = self.vertex(v);
        (v.lon, v.lat)
    }

    /// Midpoint of a half-edge in degrees.
    pub fn edge_midpoint(&self, he: HalfEdgeId) -> (f64, f64) {
        let (a_lon, a_lat) = self.position(self.half_edge(he).start);
        let (b_lon, b_lat) = self.position(self.end_vertex(he));
        ((a_lon + b_lon) * 0.5, (a_lat + b_lat) * 0.5)
    }

    /// Squared edge length in degree space.
    pub fn edge_length_squared(&self, he: HalfEdgeId) -> f64 {
        let (a_lon, a_lat) = self.position(self.half_edge(he).start);
        let (b_lon, b_lat) = self.position(self.end_vertex(he));
        (b_lon - a_lon).powi(2) + (b_lat - a_lat).powi(2)
    }

    /// Horizontal edge length in meters.
    pub fn edge_length_meters(&self, he: HalfEdgeId) -> f64 {
        let (a_lon, a_lat) = self.position(self.half_edge(he).start);
        let (b_lon, b_lat) = self.position(self.end_vertex(he));
        planar_distance_meters(a_lon, a_lat, b_lon, b_lat)
    }

    /// Longest edge of a triangle, measured in lon/lat.
    ///
    /// Ties go to the earliest edge of the loop.
    pub fn longest_edge(&self, t: TriangleId) -> HalfEdgeId {
        let [e0, e1, e2] = self.triangle_half_edges(t);
        let mut best = e0;
        let mut best_len = self.edge_length_squared(e0);
        for he in [e1, e2] {
            let len = self.edge_length_squared(he);
            if len > best_len {
                best = he;
                best_len = len;
            }
        }
        best
    }

    /// Length in meters of the longest horizontal edge of a triangle.
    pub fn longest_edge_meters(&self, t: TriangleId) -> f64 {
        self.triangle_half_edges(t)
            .iter()
            .map(|&he| self.edge_length_meters(he))
            .fold(0.0, f64::max)
    }

    /// Planar area of a triangle in square degrees.
    pub fn triangle_area(&self, t: TriangleId) -> f64 {
        let [a, b, c] = self.triangle_vertices(t).map(|v| self.position(v));
        ((b.0 - a.0) * (c.1 - a.1) - (c.0 - a.0) * (b.1 - a.1)).abs() * 0.5
    }

    /// Lon/lat bounds of a triangle.
    pub fn triangle_bounds(&self, t: TriangleId) -> GeographicExtent {
        let [a, b, c] = self.triangle_vertices(t).map(|v| self.position(v));
        GeographicExtent {
            min_lon: a.0.min(b.0).min(c.0),
            max_lon: a.0.max(b.0).max(c.0),
            min_lat: a.1.min(b.1).min(c.1),
            max_lat: a.1.max(b.1).max(c.1),
        }
    }

    /// Height at a coordinate, interpolated on the triangle containing it.
    pub fn height_at(&self, lon: f64, lat: f64) -> Option<f64> {
        self.triangle_ids().find_map(|t| {
            let [a, b, c] = self.triangle_vertices(t).map(|v| *self.vertex(v));
            let (wa, wb, wc) = barycentric(
                (lon, lat),
                (a.lon, a.lat),
                (b.lon, b.lat),
                (c.lon, c.lat),
            )?;
            let inside = [wa, wb, wc].iter().all(|&w| w >= -1e-9);
            inside.then(|| wa * a.height + wb * b.height + wc * c.height)
        })
    }

    /// Twinless half-edges of `owner` on one side of its outline, sorted along the seam.
    pub fn boundary_edges(&self, owner: TileIndices, side: BoundaryType) -> Vec<HalfEdgeId> {
        let mut edges: Vec<(f64, HalfEdgeId)> = self
            .half_edge_ids()
            .filter(|&he| {
                let edge = self.half_edge(he);
                edge.twin.is_none()
                    && edge.boundary == side
                    && self.triangle(edge.triangle).owner == owner
            })
            .map(|he| {
                let (lon, lat) = self.edge_midpoint(he);
                (if side.is_vertical() { lat } else { lon }, he)
            })
            .collect();
        edges.sort_by(|a, b| a.0.total_cmp(&b.0));
        edges.into_iter().map(|(_, he)| he).collect()
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Add an isolated vertex.
    pub fn add_vertex(&mut self, lon: f64, lat: f64, height: f64) -> VertexId {
        let id = VertexId(self.vertices.len() as u32);
        self.vertices.push(Vertex {
            lon,
            lat,
            height,
            outgoing: None,
            deleted: false,
        });
        id
    }

    /// Add a triangle over existing vertices, given in CCW order.
    ///
    /// The new half-edges have no twins; see [`HalfEdgeMesh::link_twins`].
    pub fn add_triangle(
        &mut self,
        vertices: [VertexId; 3],
        owner: TileIndices,
        split_depth: u32,
    ) -> TriangleId {
        let t = TriangleId(self.triangles.len() as u32);
        let first = self.half_edges.len() as u32;
        let extent = owner.extent();
        for k in 0..3 {
            let start = vertices[k];
            let end = vertices[(k + 1) % 3];
            let boundary = classify(self.position(start), self.position(end), &extent);
            self.half_edges.push(HalfEdge {
                start,
                next: HalfEdgeId(first + ((k as u32 + 1) % 3)),
                twin: None,
                triangle: t,
                boundary,
                deleted: false,
            });
            self.vertices[start.index()].outgoing = Some(HalfEdgeId(first + k as u32));
        }
        self.triangles.push(Triangle {
            edge: HalfEdgeId(first),
            owner,
            split_depth,
            refine_checked: false,
            deleted: false,
        });
        t
    }

    /// Pair every twinless half-edge with its reverse, where one exists.
    pub fn link_twins(&mut self) {
        let mut open: HashMap<(VertexId, VertexId), HalfEdgeId> = HashMap::new();
        let ids: Vec<HalfEdgeId> = self
            .half_edge_ids()
            .filter(|&he| self.half_edge(he).twin.is_none())
            .collect();
        for he in ids {
            let key = (self.half_edge(he).start, self.end_vertex(he));
            match open.remove(&(key.1, key.0)) {
                Some(reverse) => self.set_twins(he, reverse),
                None => {
                    open.insert(key, he);
                }
            }
        }
    }

    /// Overwrite the height of a vertex.
    pub fn set_height(&mut self, v: VertexId, height: f64) {
        self.vertices[v.index()].height = height;
    }

    /// Set or clear the refinement flag of a triangle.
    pub fn set_refine_checked(&mut self, t: TriangleId, checked: bool) {
        self.triangles[t.index()].refine_checked = checked;
    }

    pub(crate) fn set_twins(&mut self, a: HalfEdgeId, b: HalfEdgeId) {
        self.half_edges[a.index()].twin = Some(b);
        self.half_edges[b.index()].twin = Some(a);
    }

    fn delete_triangle(&mut self, t: TriangleId) {
        for he in self.triangle_half_edges(t) {
            self.half_edges[he.index()].deleted = true;
        }
        self.triangles[t.index()].deleted = true;
    }

    // ========================================================================
    // Splitting
    // ========================================================================

    /// Split a half-edge at `(lon, lat)` with a new vertex of the given height.
    ///
    /// The triangle of `he` is replaced by two triangles; if `he` has a twin,
    /// the twin's triangle is split at the same vertex, so no T-junction is
    /// left behind. New triangles inherit the owner of the triangle they
    /// replace and are one split deeper.
    pub fn split_edge(
        &mut self,
        he: HalfEdgeId,
        lon: f64,
        lat: f64,
        height: f64,
    ) -> Result<Vec<TriangleId>> {
        self.insert_on_edge(he, lon, lat, height)
            .map(|(_, triangles)| triangles)
    }

    /// [`HalfEdgeMesh::split_edge`], also returning the inserted vertex.
    fn insert_on_edge(
        &mut self,
        he: HalfEdgeId,
        lon: f64,
        lat: f64,
        height: f64,
    ) -> Result<(VertexId, Vec<TriangleId>)> {
        let edge = *self
            .half_edges
            .get(he.index())
            .ok_or_else(|| MeshError::invalid(format!("unknown half-edge {he}")))?;
        if edge.deleted {
            return Err(MeshError::invalid(format!("half-edge {he} is deleted")));
        }

        let m = self.add_vertex(lon, lat, height);
        let (t1, t2, a_m, m_b) = self.split_side(he, m);
        let mut created = vec![t1, t2];

        if let Some(twin) = edge.twin {
            let (u1, u2, b_m, m_a) = self.split_side(twin, m);
            self.set_twins(a_m, m_a);
            self.set_twins(m_b, b_m);
            created.extend([u1, u2]);
        }
        Ok((m, created))
    }

    /// Replace the triangle of `ab` (a, b, c) by (a, m, c) and (m, b, c).
    ///
    /// Returns the two triangles and the half-edges a->m and m->b.
    fn split_side(
        &mut self,
        ab: HalfEdgeId,
        m: VertexId,
    ) -> (TriangleId, TriangleId, HalfEdgeId, HalfEdgeId) {
        let bc = self.half_edge(ab).next;
        let ca = self.half_edge(bc).next;
        let (a, b, c) = (
            self.half_edge(ab).start,
            self.half_edge(bc).start,
            self.half_edge(ca).start,
        );
        let (twin_bc, twin_ca) = (self.half_edge(bc).twin, self.half_edge(ca).twin);
        let parent = *self.triangle(self.half_edge(ab).triangle);

        self.delete_triangle(self.half_edge(ab).triangle);
        let t1 = self.add_triangle([a, m, c], parent.owner, parent.split_depth + 1);
        let t2 = self.add_triangle([m, b, c], parent.owner, parent.split_depth + 1);
        let [a_m, m_c, c_a] = self.triangle_half_edges(t1);
        let [m_b, b_c, c_m] = self.triangle_half_edges(t2);

        self.set_twins(m_c, c_m);
        if let Some(outer) = twin_ca {
            self.set_twins(c_a, outer);
        }
        if let Some(outer) = twin_bc {
            self.set_twins(b_c, outer);
        }
        (t1, t2, a_m, m_b)
    }

    /// Split a triangle at the midpoint of its longest edge.
    ///
    /// The midpoint height is sampled from `heights`. A missing sample is
    /// handled according to `policy`; with [`NanPolicy::AbortTile`] the mesh
    /// is left untouched and [`MeshError::RefinementNan`] is returned.
    pub fn split_triangle<S: ElevationSampler + ?Sized>(
        &mut self,
        t: TriangleId,
        heights: &S,
        policy: NanPolicy,
    ) -> Result<SplitOutcome> {
        if !self.is_alive(t) {
            return Err(MeshError::invalid(format!("triangle {t} is deleted")));
        }
        let he = self.longest_edge(t);
        let (lon, lat) = self.edge_midpoint(he);

        let sampled = heights.sample(lon, lat).filter(|h| !h.is_nan());
        let nan_midpoint = sampled.is_none();
        let height = match sampled {
            Some(h) => h,
            None => {
                let owner = self.triangle(t).owner;
                match policy {
                    NanPolicy::AbortTile => {
                        return Err(MeshError::RefinementNan {
                            tile: owner,
                            lon,
                            lat,
                        })
                    }
                    NanPolicy::Keep => {
                        warn!(tile = %owner, lon, lat, "no elevation at split midpoint, storing NaN");
                        f64::NAN
                    }
                    NanPolicy::Interpolate => {
                        let a = self.vertex(self.half_edge(he).start).height;
                        let b = self.vertex(self.end_vertex(he)).height;
                        warn!(tile = %owner, lon, lat, "no elevation at split midpoint, interpolating");
                        (a + b) * 0.5
                    }
                }
            }
        };
        if nan_midpoint {
            metrics::counter!(metric_defs::NAN_MIDPOINTS.name).increment(1);
        }

        let (vertex, triangles) = self.insert_on_edge(he, lon, lat, height)?;
        metrics::counter!(metric_defs::TRIANGLES_SPLIT.name).increment(triangles.len() as u64 / 2);
        Ok(SplitOutcome {
            vertex,
            triangles,
            nan_midpoint,
        })
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Drop deleted elements and renumber the survivors.
    ///
    /// Vertices no longer referenced by any triangle are dropped too.
    pub fn compact(&mut self) {
        let mut used = vec![false; self.vertices.len()];
        for e in self.half_edges.iter().filter(|e| !e.deleted) {
            used[e.start.index()] = true;
        }

        let mut vertex_map = vec![None; self.vertices.len()];
        let mut vertices = Vec::new();
        for (i, v) in self.vertices.iter().enumerate() {
            if used[i] && !v.deleted {
                vertex_map[i] = Some(VertexId(vertices.len() as u32));
                vertices.push(Vertex { outgoing: None, ..*v });
            }
        }

        let mut triangle_map = vec![None; self.triangles.len()];
        let mut count = 0u32;
        for (i, t) in self.triangles.iter().enumerate() {
            if !t.deleted {
                triangle_map[i] = Some(TriangleId(count));
                count += 1;
            }
        }

        let mut edge_map = vec![None; self.half_edges.len()];
        let mut count = 0u32;
        for (i, e) in self.half_edges.iter().enumerate() {
            if !e.deleted {
                edge_map[i] = Some(HalfEdgeId(count));
                count += 1;
            }
        }

        let mut half_edges = Vec::with_capacity(count as usize);
        for e in self.half_edges.iter().filter(|e| !e.deleted) {
            let (Some(start), Some(next), Some(triangle)) = (
                vertex_map[e.start.index()],
                edge_map[e.next.index()],
                triangle_map[e.triangle.index()],
            ) else {
                continue;
            };
            let id = HalfEdgeId(half_edges.len() as u32);
            vertices[start.index()].outgoing.get_or_insert(id);
            half_edges.push(HalfEdge {
                start,
                next,
                twin: e.twin.and_then(|t| edge_map[t.index()]),
                triangle,
                boundary: e.boundary,
                deleted: false,
            });
        }

        let triangles = self
            .triangles
            .iter()
            .filter(|t| !t.deleted)
            .filter_map(|t| {
                Some(Triangle {
                    edge: edge_map[t.edge.index()]?,
                    ..*t
                })
            })
            .collect();

        self.vertices = vertices;
        self.half_edges = half_edges;
        self.triangles = triangles;
    }

    /// Check the structural invariants of the mesh.
    pub fn validate(&self) -> Result<()> {
        for t in self.triangle_ids() {
            let [e0, e1, e2] = self.triangle_half_edges(t);
            if self.half_edge(e2).next != e0 {
                return Err(MeshError::invalid(format!("loop of {t} is not a triangle")));
            }
            for he in [e0, e1, e2] {
                let edge = self.half_edge(he);
                if edge.deleted || edge.triangle != t {
                    return Err(MeshError::invalid(format!("{he} does not belong to {t}")));
                }
            }
        }

        for he in self.half_edge_ids() {
            let edge = self.half_edge(he);
            if self.vertex(edge.start).deleted {
                return Err(MeshError::invalid(format!("{he} starts at a deleted vertex")));
            }
            match edge.twin {
                Some(twin) => {
                    let other = self.half_edge(twin);
                    if other.deleted || other.twin != Some(he) {
                        return Err(MeshError::invalid(format!("{he} and {twin} are not mutual twins")));
                    }
                    if other.start != self.end_vertex(he) || self.end_vertex(twin) != edge.start {
                        return Err(MeshError::invalid(format!("{he} and {twin} do not share endpoints")));
                    }
                }
                None if edge.boundary == BoundaryType::Interior => {
                    return Err(MeshError::invalid(format!("interior {he} has no twin")));
                }
                None => {}
            }
            let extent = self.triangle(edge.triangle).owner.extent();
            let expected = classify(
                self.position(edge.start),
                self.position(self.end_vertex(he)),
                &extent,
            );
            if expected != edge.boundary {
                return Err(MeshError::invalid(format!(
                    "{he} classified {:?}, expected {:?}",
                    edge.boundary, expected
                )));
            }
        }
        Ok(())
    }
}

/// Classify an edge against its tile outline.
///
/// An edge is on a side only if both endpoints lie on that same side.
fn classify(start: (f64, f64), end: (f64, f64), extent: &GeographicExtent) -> BoundaryType {
    let near = |a: f64, b: f64| (a - b).abs() <= EPSILON_DEG;
    if near(start.0, extent.min_lon) && near(end.0, extent.min_lon) {
        BoundaryType::Left
    } else if near(start.0, extent.max_lon) && near(end.0, extent.max_lon) {
        BoundaryType::Right
    } else if near(start.1, extent.max_lat) && near(end.1, extent.max_lat) {
        BoundaryType::Up
    } else if near(start.1, extent.min_lat) && near(end.1, extent.min_lat) {
        BoundaryType::Down
    } else {
        BoundaryType::Interior
    }
}

/// Barycentric weights of `p` in triangle `(a, b, c)`, or `None` if degenerate.
pub fn barycentric(
    p: (f64, f64),
    a: (f64, f64),
    b: (f64, f64),
    c: (f64, f64),
) -> Option<(f64, f64, f64)> {
    let det = (b.1 - c.1) * (a.0 - c.0) + (c.0 - b.0) * (a.1 - c.1);
    if det.abs() < f64::EPSILON * 1e-6 {
        return None;
    }
    let wa = ((b.1 - c.1) * (p.0 - c.0) + (c.0 - b.0) * (p.1 - c.1)) / det;
    let wb = ((c.1 - a.1) * (p.0 - c.0) + (a.0 - c.0) * (p.1 - c.1)) / det;
    Some((wa, wb, 1.0 - wa - wb))
}
