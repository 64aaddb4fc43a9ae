//! Error-driven adaptive refinement.

use crate::mesh::{barycentric, HalfEdgeMesh, NanPolicy, TriangleId};
use crate::{MeshError, Result};
use qmtile_dem::{ElevationSampler, TileRaster, TileRasterSet};
use qmtile_geo::{
    geodetic_surface_normal, geodetic_to_ecef, tile_size_meters, RefinementTables, TileIndices,
    TileRange,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Tunables of the refinement loop.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RefineOptions {
    /// Handling of split midpoints without elevation.
    pub nan_policy: NanPolicy,
    /// Depth from which the error bound is scaled by normal compatibility.
    pub normal_compat_depth: Option<u32>,
}

/// Outcome of one refinement run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefineStats {
    /// Passes executed.
    pub iterations: u32,
    /// Triangles split, counting both sides of joint splits.
    pub splits: usize,
    /// Split midpoints that had no elevation sample.
    pub nan_midpoints: usize,
    /// Tiles whose refinement stopped on a missing midpoint sample.
    pub aborted: Vec<TileIndices>,
}

/// Splits triangles until the mesh matches the elevation rasters within the
/// per-depth error bound.
#[derive(Debug, Clone)]
pub struct AdaptiveRefiner<'a> {
    tables: &'a RefinementTables,
    options: RefineOptions,
}

impl<'a> AdaptiveRefiner<'a> {
    /// Create a refiner over precomputed per-depth tables.
    pub fn new(tables: &'a RefinementTables, options: RefineOptions) -> Self {
        Self { tables, options }
    }

    /// Allowed vertical error for a triangle, in meters.
    ///
    /// The depth's nominal bound grows with the triangle's size relative to
    /// its tile and, past the configured depth, shrinks with the angle
    /// between the triangle and the ellipsoid surface.
    pub fn allowed_error(&self, mesh: &HalfEdgeMesh, t: TriangleId) -> f64 {
        let level = mesh.triangle(t).owner.level;
        let longest = mesh.longest_edge_meters(t);
        let relative = tile_size_meters(level)
            .map(|size| longest / size)
            .unwrap_or(0.0);
        let mut bound = self.tables.error_bound(level) * (1.0 + relative);
        if self
            .options
            .normal_compat_depth
            .is_some_and(|depth| level >= depth)
        {
            bound *= normal_compatibility(mesh, t);
        }
        bound
    }

    /// Decide whether a triangle has to be split.
    ///
    /// Triangles larger than the depth's maximum size always refine; ones
    /// below the minimum size never do. Otherwise the fitted plane is
    /// compared with the raster at the barycenter, then at every raster node
    /// inside the triangle. Triangles that pass are marked checked.
    pub fn must_refine(&self, mesh: &mut HalfEdgeMesh, t: TriangleId, raster: &TileRaster) -> bool {
        let level = mesh.triangle(t).owner.level;
        let longest = mesh.longest_edge_meters(t);
        if longest > self.tables.max_triangle_size(level) {
            return true;
        }
        if longest < self.tables.min_triangle_size(level) {
            mesh.set_refine_checked(t, true);
            return false;
        }

        let refine = self.exceeds_error(mesh, t, raster);
        if !refine {
            mesh.set_refine_checked(t, true);
        }
        refine
    }

    fn exceeds_error(&self, mesh: &HalfEdgeMesh, t: TriangleId, raster: &TileRaster) -> bool {
        let [a, b, c] = mesh.triangle_vertices(t).map(|v| *mesh.vertex(v));
        if [a.height, b.height, c.height].iter().any(|h| h.is_nan()) {
            return false;
        }
        let bound = self.allowed_error(mesh, t);
        let plane = |lon: f64, lat: f64| {
            barycentric((lon, lat), (a.lon, a.lat), (b.lon, b.lat), (c.lon, c.lat))
                .map(|(wa, wb, wc)| (wa * a.height + wb * b.height + wc * c.height, wa, wb, wc))
        };

        let center = ((a.lon + b.lon + c.lon) / 3.0, (a.lat + b.lat + c.lat) / 3.0);
        if let Some(h) = raster.sample(center.0, center.1) {
            let expected = (a.height + b.height + c.height) / 3.0;
            if (h - expected).abs() > bound {
                return true;
            }
        }

        raster
            .points_within(&mesh.triangle_bounds(t))
            .any(|(lon, lat, h)| match plane(lon, lat) {
                Some((expected, wa, wb, wc)) if wa.min(wb).min(wc) >= -1e-9 => {
                    (h - expected).abs() > bound
                }
                _ => false,
            })
    }

    /// Refine every triangle owned by a tile of `range` to a fixed point.
    ///
    /// Each pass tests the unchecked triangles and splits those that fail;
    /// the loop ends when a pass splits nothing or after the depth's
    /// iteration cap. Splits propagate into neighbors across shared edges,
    /// including neighbors outside `range`.
    pub fn refine_mesh(
        &self,
        mesh: &mut HalfEdgeMesh,
        range: &TileRange,
        rasters: &TileRasterSet,
    ) -> Result<RefineStats> {
        let max_iterations = self.tables.max_iterations(range.level);
        let mut stats = RefineStats::default();
        let mut aborted: BTreeSet<TileIndices> = BTreeSet::new();
        let mut converged = false;

        for _ in 0..max_iterations {
            stats.iterations += 1;
            let candidates: Vec<TriangleId> = mesh
                .triangle_ids()
                .filter(|&t| {
                    let tri = mesh.triangle(t);
                    !tri.refine_checked && range.contains(&tri.owner) && !aborted.contains(&tri.owner)
                })
                .collect();

            let mut splits = 0;
            for t in candidates {
                // Joint splits earlier in this pass may have replaced it
                if !mesh.is_alive(t) {
                    continue;
                }
                let owner = mesh.triangle(t).owner;
                if aborted.contains(&owner) {
                    continue;
                }
                let Some(raster) = rasters.get(&owner) else {
                    mesh.set_refine_checked(t, true);
                    continue;
                };
                if !self.must_refine(mesh, t, raster) {
                    continue;
                }
                match mesh.split_triangle(t, rasters, self.options.nan_policy) {
                    Ok(outcome) => {
                        splits += outcome.triangles.len() / 2;
                        if outcome.nan_midpoint {
                            stats.nan_midpoints += 1;
                        }
                    }
                    Err(MeshError::RefinementNan { tile, lon, lat }) => {
                        warn!(tile = %tile, lon, lat, "aborting refinement of tile without elevation");
                        stats.nan_midpoints += 1;
                        aborted.insert(tile);
                    }
                    Err(e) => return Err(e),
                }
            }

            stats.splits += splits;
            debug!(
                level = range.level,
                iteration = stats.iterations,
                splits,
                "refinement pass"
            );
            if splits == 0 {
                converged = true;
                break;
            }
        }
        if !converged {
            warn!(
                level = range.level,
                iterations = stats.iterations,
                "refinement stopped at the iteration cap"
            );
        }

        stats.aborted = aborted.into_iter().collect();
        Ok(stats)
    }
}

/// Cosine of the angle between a triangle's normal and the ellipsoid normal at its center.
fn normal_compatibility(mesh: &HalfEdgeMesh, t: TriangleId) -> f64 {
    let [a, b, c] = mesh.triangle_vertices(t).map(|v| *mesh.vertex(v));
    let pa = geodetic_to_ecef(a.lon, a.lat, a.height);
    let pb = geodetic_to_ecef(b.lon, b.lat, b.height);
    let pc = geodetic_to_ecef(c.lon, c.lat, c.height);
    let normal = (pb - pa).cross(pc - pa).normalize_or_zero();
    if normal == glam::DVec3::ZERO {
        return 1.0;
    }
    let up = geodetic_surface_normal((a.lon + b.lon + c.lon) / 3.0, (a.lat + b.lat + c.lat) / 3.0);
    normal.dot(up).abs()
}
