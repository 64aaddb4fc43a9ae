//! Depth-by-depth orchestration of a tiling run.

use crate::assembler::{BlockReport, TileMatrixAssembler};
use crate::layer::{AvailabilitySink, LayerDescriptor, LAYER_FILE};
use crate::{Result, TileStore, TilerConfig, TilerError};
use qmtile_dem::{ElevationSourceIndex, SourceId, TileRasterSet};
use qmtile_geo::{RefinementTables, TileIndices, TileRange};
use qmtile_metrics::metric_defs;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, info_span, warn};

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Summary of a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Tiles written per depth, rewritten halo tiles included.
    pub tiles_written: BTreeMap<u32, usize>,
    /// Encoded bytes over all written tiles.
    pub bytes_written: usize,
    /// Seams sewn between neighbouring tiles.
    pub seams_stitched: usize,
    /// Seams left open because their vertex runs disagreed.
    pub seam_mismatches: usize,
    /// Edge bisections made while refining.
    pub splits: usize,
    /// Midpoints with no DEM coverage, given the edge-average height.
    pub nan_midpoints: usize,
    /// Tiles whose refinement was abandoned after an edge fault.
    pub aborted_tiles: Vec<TileIndices>,
    /// Tiles that could not be written.
    pub failed_tiles: Vec<TileIndices>,
    /// DEM sources that failed to read and were skipped.
    pub degraded_sources: Vec<SourceId>,
    /// Deepest complete depth found on disk when resuming.
    pub resumed_from: Option<u32>,
}

impl RunReport {
    /// Tiles written over all depths.
    pub fn total_tiles(&self) -> usize {
        self.tiles_written.values().sum()
    }

    fn absorb(&mut self, level: u32, block: &BlockReport) {
        *self.tiles_written.entry(level).or_default() += block.tiles_written;
        self.bytes_written += block.bytes_written;
        self.seams_stitched += block.seams_stitched;
        self.seam_mismatches += block.seam_mismatches;
        self.splits += block.splits;
        self.nan_midpoints += block.nan_midpoints;
        self.aborted_tiles.extend(&block.aborted);
        self.failed_tiles.extend(&block.failed);
    }

    /// Log the summary at info level.
    pub fn log_summary(&self) {
        info!(
            tiles = self.total_tiles(),
            bytes = self.bytes_written,
            splits = self.splits,
            seams = self.seams_stitched,
            seam_mismatches = self.seam_mismatches,
            nan_midpoints = self.nan_midpoints,
            aborted = self.aborted_tiles.len(),
            failed = self.failed_tiles.len(),
            degraded_sources = self.degraded_sources.len(),
            "run complete"
        );
        for (level, tiles) in &self.tiles_written {
            info!(level, tiles, "depth summary");
        }
    }
}

/// Generates every depth of a tile pyramid from an elevation source index.
pub struct Tiler {
    config: TilerConfig,
    index: ElevationSourceIndex,
    tables: RefinementTables,
    store: TileStore,
}

impl Tiler {
    /// Validate the configuration and index the input folders.
    pub fn new(config: TilerConfig) -> Result<Self> {
        config.validate()?;
        let index = ElevationSourceIndex::build(&config.input_dirs, config.index_options())?;
        Self::with_index(config, index)
    }

    /// Run over an index built elsewhere.
    pub fn with_index(config: TilerConfig, index: ElevationSourceIndex) -> Result<Self> {
        config.validate()?;
        let tables = RefinementTables::new(config.intensity)?;
        let store = TileStore::new(&config.output_root);
        Ok(Self {
            config,
            index,
            tables,
            store,
        })
    }

    /// Validated configuration of the run.
    pub fn config(&self) -> &TilerConfig {
        &self.config
    }

    /// Index of every usable elevation source.
    pub fn index(&self) -> &ElevationSourceIndex {
        &self.index
    }

    /// Output tile tree.
    pub fn store(&self) -> &TileStore {
        &self.store
    }

    /// Tiles covering the data at each configured depth.
    pub fn depth_ranges(&self) -> Result<Vec<TileRange>> {
        let extent = self.index.data_extent();
        (self.config.min_depth..=self.config.max_depth)
            .map(|level| Ok(TileRange::for_extent(level, &extent)?))
            .collect()
    }

    /// Generate every configured depth.
    ///
    /// Each depth is cleared before it is generated, so a depth interrupted
    /// by a crash is redone from scratch. With `resume`, complete depths
    /// already on disk are kept and generation starts below the deepest one.
    pub fn run(&self) -> Result<RunReport> {
        let ranges = self.depth_ranges()?;
        let root = self.store.root();
        std::fs::create_dir_all(root).map_err(|e| TilerError::io(root, e))?;
        let layer_path = root.join(LAYER_FILE);
        let mut layer = LayerDescriptor::new(&self.index.data_extent(), self.config.oct_normals);
        let mut report = RunReport::default();

        let mut start = self.config.min_depth;
        if self.config.resume {
            if let Some(done) = self.store.highest_complete_depth(&ranges) {
                info!(level = done, "resuming below complete depth");
                report.resumed_from = Some(done);
                for range in ranges.iter().filter(|r| r.level <= done) {
                    layer.record(range);
                }
                start = done + 1;
            }
        }

        for range in ranges.iter().filter(|r| r.level >= start) {
            self.store.clear_depth(range.level)?;
            let failed = self.run_depth(range, &mut report)?;
            self.index.release_rasters();
            if failed > 0 {
                layer.save(&layer_path)?;
                return Err(TilerError::DepthIncomplete {
                    level: range.level,
                    failed,
                });
            }
            layer.record(range);
            layer.save(&layer_path)?;
        }
        layer.save(&layer_path)?;

        report.degraded_sources = self.index.degraded_sources();
        for &source_id in &report.degraded_sources {
            let err = TilerError::SourceDegraded {
                source_id,
                reason: "excluded after a failed read".to_string(),
            };
            warn!(error = %err, "run finished without a source");
        }
        Ok(report)
    }

    /// Generate one depth block by block. Returns the number of failed tiles.
    fn run_depth(&self, range: &TileRange, report: &mut RunReport) -> Result<usize> {
        let _span = info_span!("depth", level = range.level).entered();
        let assembler = TileMatrixAssembler::new(&self.config, &self.store, &self.tables);
        let blocks = range.blocks(self.config.block_size);
        info!(
            level = range.level,
            tiles = range.len(),
            blocks = blocks.len(),
            "generating depth"
        );

        let mut failed = 0;
        for (i, block) in blocks.iter().enumerate() {
            let started = Instant::now();
            let rasters =
                TileRasterSet::materialize(&block.expanded(1), self.config.raster_size, &self.index)?;
            let block_report = assembler.assemble(block, &rasters)?;
            drop(rasters);

            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            metrics::histogram!(metric_defs::BLOCK_DURATION.name).record(elapsed_ms);
            debug!(
                block = %block,
                tiles = block_report.tiles_written,
                splits = block_report.splits,
                elapsed_ms,
                "block done"
            );
            failed += block_report.failed.len();
            report.absorb(range.level, &block_report);

            let every = self.config.release_every_blocks;
            if every > 0 && (i + 1) % every as usize == 0 {
                self.check_memory();
            }
        }
        Ok(failed)
    }

    /// Release the raster cache when physical memory is above the threshold.
    fn check_memory(&self) {
        let Some(stats) = memory_stats::memory_stats() else {
            return;
        };
        let mib = stats.physical_mem as f64 / BYTES_PER_MIB;
        metrics::gauge!(metric_defs::PHYSICAL_MEMORY.name).set(mib);
        if mib > self.config.memory_release_mb as f64 {
            info!(
                physical_mb = mib,
                limit_mb = self.config.memory_release_mb,
                "memory above limit, releasing rasters"
            );
            self.index.release_rasters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qmtile_dem::{ElevationSource, IndexOptions};
    use qmtile_geo::GeographicExtent;

    fn constant_index(extent: GeographicExtent, height: f32) -> ElevationSourceIndex {
        let source =
            ElevationSource::from_grid(SourceId(0), extent, 4, 4, vec![height; 16], None).unwrap();
        ElevationSourceIndex::from_sources(vec![source], IndexOptions::default()).unwrap()
    }

    #[test]
    fn test_depth_ranges_follow_data() {
        let dir = tempfile::tempdir().unwrap();
        let config = TilerConfig {
            output_root: dir.path().to_path_buf(),
            min_depth: 1,
            max_depth: 3,
            ..Default::default()
        };
        let extent = GeographicExtent::new(10.0, 20.0, 40.0, 50.0).unwrap();
        let tiler = Tiler::with_index(config, constant_index(extent, 5.0)).unwrap();
        let ranges = tiler.depth_ranges().unwrap();
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[0].level, 1);
        for range in &ranges {
            assert!(range.extent().contains_extent(&extent));
        }
    }

    #[test]
    fn test_rejects_bad_config() {
        let extent = GeographicExtent::new(0.0, 1.0, 0.0, 1.0).unwrap();
        let config = TilerConfig {
            min_depth: 4,
            max_depth: 2,
            ..Default::default()
        };
        assert!(matches!(
            Tiler::with_index(config, constant_index(extent, 1.0)),
            Err(TilerError::Input(_))
        ));
    }

    #[test]
    fn test_report_absorbs_blocks() {
        let mut report = RunReport::default();
        let tile = TileIndices::new(1, 0, 0).unwrap();
        let block = BlockReport {
            tiles_written: 3,
            bytes_written: 600,
            seams_stitched: 4,
            failed: vec![tile],
            ..Default::default()
        };
        report.absorb(1, &block);
        report.absorb(1, &block);
        report.absorb(2, &block);
        assert_eq!(report.tiles_written[&1], 6);
        assert_eq!(report.total_tiles(), 9);
        assert_eq!(report.bytes_written, 1800);
        assert_eq!(report.failed_tiles.len(), 3);
    }
}
