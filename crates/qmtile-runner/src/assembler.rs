//! Block assembly.
//!
//! A block of target tiles plus a one-tile halo goes through:
//!
//! 1. **LoadOrCreate**: every halo tile gets a mesh, from its stored tile if
//!    one exists, else from its parent's stored tile, else from the corner
//!    samples of its tile raster.
//! 2. **RowStitch**: tiles are merged west to east along vertical seams.
//! 3. **ColumnStitch**: rows are merged south to north along horizontal seams.
//! 4. **Refine**: triangles of the target tiles are refined as one surface.
//! 5. **Split**: the block is cut back into per-tile meshes.
//! 6. **Persist**: target tiles, and stored halo tiles the refinement touched,
//!    are encoded and written.
//!
//! A seam whose two sides cannot be matched is left open and reported.

use crate::{Result, TileStore, TilerConfig, TilerError};
use qmtile_codec::{encode, write_terrain};
use qmtile_dem::TileRasterSet;
use qmtile_geo::{RefinementTables, TileIndices, TileRange};
use qmtile_mesh::{AdaptiveRefiner, BoundaryType, HalfEdgeMesh, MeshError, TileMeshBuilder};
use qmtile_metrics::{metric_defs, TileLabels};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, debug_span, error, trace, warn};

/// Height given to seed corners without any elevation.
const MISSING_CORNER_HEIGHT: f64 = 0.0;

/// Where a tile's starting mesh came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedOrigin {
    /// Decoded from the tile's own stored file.
    Stored,
    /// Seeded from the stored mesh of the parent tile.
    Parent,
    /// Seeded from tile raster corners.
    Raster,
}

#[derive(Debug)]
struct BlockTile {
    tile: TileIndices,
    mesh: HalfEdgeMesh,
    origin: SeedOrigin,
}

/// Counters of one assembled block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockReport {
    /// Target tiles persisted.
    pub tiles_written: usize,
    /// Encoded bytes over all persisted tiles.
    pub bytes_written: usize,
    /// Stored halo tiles rewritten after refinement changed them.
    pub rewritten: Vec<TileIndices>,
    /// Seams sewn between neighbouring tiles.
    pub seams_stitched: usize,
    /// Seams left open because their vertex runs disagreed.
    pub seam_mismatches: usize,
    /// Edge bisections made while refining.
    pub splits: usize,
    /// Midpoints with no DEM coverage, given the edge-average height.
    pub nan_midpoints: usize,
    /// Tiles whose refinement stopped on a missing elevation sample.
    pub aborted: Vec<TileIndices>,
    /// Tiles that could not be written.
    pub failed: Vec<TileIndices>,
}

/// Per-tile meshes of a refined block, ready to persist.
#[derive(Debug)]
pub struct AssembledBlock {
    /// Target tiles in block order, then rewritten halo tiles.
    pub tiles: Vec<(TileIndices, HalfEdgeMesh)>,
    /// Counters gathered while assembling.
    pub report: BlockReport,
}

impl AssembledBlock {
    /// Mesh of one tile, if it is part of the output.
    pub fn mesh(&self, tile: TileIndices) -> Option<&HalfEdgeMesh> {
        self.tiles.iter().find(|(t, _)| *t == tile).map(|(_, m)| m)
    }
}

/// Builds, refines and writes blocks of tiles of one depth.
pub struct TileMatrixAssembler<'a> {
    config: &'a TilerConfig,
    store: &'a TileStore,
    refiner: AdaptiveRefiner<'a>,
}

impl<'a> TileMatrixAssembler<'a> {
    /// Assembler writing into `store` with the size tables of `tables`.
    pub fn new(config: &'a TilerConfig, store: &'a TileStore, tables: &'a RefinementTables) -> Self {
        Self {
            config,
            store,
            refiner: AdaptiveRefiner::new(tables, config.refine_options()),
        }
    }

    /// Build a block and write its tiles.
    ///
    /// `rasters` must cover the block expanded by one tile.
    pub fn assemble(&self, block: &TileRange, rasters: &TileRasterSet) -> Result<BlockReport> {
        let AssembledBlock { tiles, mut report } = self.build(block, rasters)?;
        let _span = debug_span!("persist", block = %block).entered();
        self.persist(&tiles, &mut report);
        Ok(report)
    }

    /// Run every stage except Persist.
    pub fn build(&self, block: &TileRange, rasters: &TileRasterSet) -> Result<AssembledBlock> {
        let halo = block.expanded(1);
        let mut report = BlockReport::default();

        let rows = {
            let _span = debug_span!("load_or_create", block = %block).entered();
            self.load_or_create(&halo, rasters)
        };
        let stored: BTreeMap<TileIndices, usize> = rows
            .iter()
            .flatten()
            .filter(|t| t.origin == SeedOrigin::Stored && !block.contains(&t.tile))
            .map(|t| (t.tile, t.mesh.triangle_count()))
            .collect();

        let row_meshes: Vec<(u32, HalfEdgeMesh)> = {
            let _span = debug_span!("row_stitch", block = %block).entered();
            rows.into_iter()
                .filter_map(|row| self.stitch_row(row, &mut report))
                .collect()
        };

        let mut mesh = {
            let _span = debug_span!("column_stitch", block = %block).entered();
            self.stitch_columns(row_meshes, &halo, &mut report)
        };

        {
            let _span = debug_span!("refine", block = %block).entered();
            let stats = self.refiner.refine_mesh(&mut mesh, block, rasters)?;
            debug!(
                iterations = stats.iterations,
                splits = stats.splits,
                nan_midpoints = stats.nan_midpoints,
                "refined block"
            );
            for &tile in &stats.aborted {
                let err = TilerError::RefinementNan { tile };
                error!(tile = %tile, error = %err, "tile left partially refined");
            }
            report.splits += stats.splits;
            report.nan_midpoints += stats.nan_midpoints;
            report.aborted.extend(stats.aborted);
        }

        let _span = debug_span!("split", block = %block).entered();
        mesh.compact();
        let mut tiles: Vec<(TileIndices, HalfEdgeMesh)> =
            block.iter().map(|tile| (tile, mesh.extract_tile(tile))).collect();
        for (tile, loaded_triangles) in stored {
            let extracted = mesh.extract_tile(tile);
            if extracted.triangle_count() != loaded_triangles {
                debug!(tile = %tile, "stored halo tile changed by refinement");
                report.rewritten.push(tile);
                tiles.push((tile, extracted));
            }
        }
        Ok(AssembledBlock { tiles, report })
    }

    // ========================================================================
    // LoadOrCreate
    // ========================================================================

    /// Starting meshes of every halo tile, grouped in rows from south to north.
    fn load_or_create(&self, halo: &TileRange, rasters: &TileRasterSet) -> Vec<Vec<BlockTile>> {
        let mut parents: HashMap<TileIndices, Option<[HalfEdgeMesh; 4]>> = HashMap::new();
        (halo.min_y..=halo.max_y)
            .map(|y| {
                (halo.min_x..=halo.max_x)
                    .map(|x| {
                        let tile = TileIndices {
                            level: halo.level,
                            x,
                            y,
                        };
                        self.seed_tile(tile, rasters, &mut parents)
                    })
                    .collect()
            })
            .collect()
    }

    fn seed_tile(
        &self,
        tile: TileIndices,
        rasters: &TileRasterSet,
        parents: &mut HashMap<TileIndices, Option<[HalfEdgeMesh; 4]>>,
    ) -> BlockTile {
        if self.store.contains(tile) {
            match self.store.load_mesh(tile) {
                Ok(mesh) => {
                    trace!(tile = %tile, "loaded stored tile");
                    return BlockTile {
                        tile,
                        mesh,
                        origin: SeedOrigin::Stored,
                    };
                }
                Err(e) => warn!(tile = %tile, error = %e, "ignoring unreadable stored tile"),
            }
        }

        if let Some(parent) = tile.parent().filter(|_| tile.level > self.config.min_depth) {
            let children = parents
                .entry(parent)
                .or_insert_with(|| self.parent_children(parent));
            if let Some(children) = children {
                let slot = (tile.x % 2 + 2 * (tile.y % 2)) as usize;
                return BlockTile {
                    tile,
                    mesh: children[slot].clone(),
                    origin: SeedOrigin::Parent,
                };
            }
        }

        let mesh = match rasters.get(&tile) {
            Some(raster) => TileMeshBuilder::from_raster(raster, MISSING_CORNER_HEIGHT),
            None => TileMeshBuilder::from_sampler(tile, rasters, MISSING_CORNER_HEIGHT),
        };
        BlockTile {
            tile,
            mesh,
            origin: SeedOrigin::Raster,
        }
    }

    /// Child seeds of a stored parent tile, or `None` if it is not on disk.
    fn parent_children(&self, parent: TileIndices) -> Option<[HalfEdgeMesh; 4]> {
        if !self.store.contains(parent) {
            return None;
        }
        match self.store.load_mesh(parent) {
            Ok(mesh) => Some(TileMeshBuilder::children_of(&mesh, parent, MISSING_CORNER_HEIGHT)),
            Err(e) => {
                warn!(tile = %parent, error = %e, "ignoring unreadable parent tile");
                None
            }
        }
    }

    // ========================================================================
    // Stitching
    // ========================================================================

    fn stitch_row(&self, row: Vec<BlockTile>, report: &mut BlockReport) -> Option<(u32, HalfEdgeMesh)> {
        let mut tiles = row.into_iter();
        let first = tiles.next()?;
        let y = first.tile.y;
        let mut mesh = first.mesh;
        let mut west = first.tile;
        for east in tiles {
            let mut other = east.mesh;
            let stitched = mesh
                .conform_seam((west, BoundaryType::Right), &mut other, (east.tile, BoundaryType::Left))
                .and_then(|_| {
                    let ours = mesh.boundary_edges(west, BoundaryType::Right);
                    let theirs = other.boundary_edges(east.tile, BoundaryType::Left);
                    mesh.merge_along_seam(&other, &ours, &theirs)
                });
            match stitched {
                Ok(()) => seam_stitched(report, 1),
                Err(detail) => {
                    seam_mismatch(report, west, east.tile, detail);
                    mesh.append(&other);
                }
            }
            west = east.tile;
        }
        Some((y, mesh))
    }

    fn stitch_columns(
        &self,
        rows: Vec<(u32, HalfEdgeMesh)>,
        halo: &TileRange,
        report: &mut BlockReport,
    ) -> HalfEdgeMesh {
        let mut rows = rows.into_iter();
        let Some((mut south_y, mut mesh)) = rows.next() else {
            return HalfEdgeMesh::new();
        };
        for (north_y, mut row) in rows {
            let mut ours = Vec::new();
            let mut theirs = Vec::new();
            let mut columns = 0;
            for x in halo.min_x..=halo.max_x {
                let south = TileIndices {
                    level: halo.level,
                    x,
                    y: south_y,
                };
                let north = TileIndices { y: north_y, ..south };
                if let Err(detail) =
                    mesh.conform_seam((south, BoundaryType::Up), &mut row, (north, BoundaryType::Down))
                {
                    seam_mismatch(report, south, north, detail);
                    continue;
                }
                let a = mesh.boundary_edges(south, BoundaryType::Up);
                let b = row.boundary_edges(north, BoundaryType::Down);
                if a.len() != b.len() {
                    let detail = MeshError::SeamMismatch {
                        this: a.len(),
                        other: b.len(),
                    };
                    seam_mismatch(report, south, north, detail);
                    continue;
                }
                ours.extend(a);
                theirs.extend(b);
                columns += 1;
            }

            match mesh.merge_along_seam(&row, &ours, &theirs) {
                Ok(()) => seam_stitched(report, columns),
                Err(detail) => {
                    let south = TileIndices {
                        level: halo.level,
                        x: halo.min_x,
                        y: south_y,
                    };
                    seam_mismatch(report, south, TileIndices { y: north_y, ..south }, detail);
                    mesh.append(&row);
                }
            }
            south_y = north_y;
        }
        mesh
    }

    // ========================================================================
    // Persist
    // ========================================================================

    fn persist(&self, tiles: &[(TileIndices, HalfEdgeMesh)], report: &mut BlockReport) {
        for (tile, mesh) in tiles {
            let labels = TileLabels::new(tile.level).to_labels();
            match self.write_tile(*tile, mesh) {
                Ok(bytes) => {
                    report.tiles_written += 1;
                    report.bytes_written += bytes;
                    metrics::counter!(metric_defs::TILES_WRITTEN.name, labels.as_slice()).increment(1);
                    metrics::histogram!(metric_defs::TILE_BYTES.name, labels.as_slice())
                        .record(bytes as f64);
                }
                Err(e) => {
                    error!(tile = %tile, error = %e, "failed to write tile");
                    report.failed.push(*tile);
                    metrics::counter!(metric_defs::TILES_FAILED.name, labels.as_slice()).increment(1);
                }
            }
        }
    }

    fn write_tile(&self, tile: TileIndices, mesh: &HalfEdgeMesh) -> Result<usize> {
        let quantized = encode(mesh, &tile.extent(), self.config.oct_normals)?;
        let bytes = write_terrain(&quantized)?;
        self.store.write(tile, &bytes)?;
        trace!(
            tile = %tile,
            vertices = quantized.vertex_count(),
            triangles = quantized.triangle_count(),
            bytes = bytes.len(),
            "wrote tile"
        );
        Ok(bytes.len())
    }
}

fn seam_stitched(report: &mut BlockReport, seams: usize) {
    report.seams_stitched += seams;
    metrics::counter!(metric_defs::SEAMS_STITCHED.name).increment(seams as u64);
}

fn seam_mismatch(report: &mut BlockReport, this: TileIndices, other: TileIndices, detail: MeshError) {
    let err = TilerError::SeamMismatch {
        this,
        other,
        detail,
    };
    error!(error = %err, "leaving seam open");
    report.seam_mismatches += 1;
    metrics::counter!(metric_defs::SEAM_MISMATCHES.name).increment(1);
}
