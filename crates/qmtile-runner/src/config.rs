//! Tiler configuration.
//!
//! Loaded from YAML; every field has a default, so a minimal file only names
//! the input folders and the output root:
//!
//! ```yaml
//! input_dirs: [/data/dem]
//! output_root: /data/terrain
//! max_depth: 12
//! ```

use crate::{Result, TilerError};
use qmtile_dem::{ElevationPriority, IndexOptions, Interpolation, DEFAULT_CACHE_CAPACITY, DEFAULT_RASTER_SIZE};
use qmtile_geo::{MAX_DEPTH, MAX_INTENSITY, MIN_INTENSITY};
use qmtile_mesh::{NanPolicy, RefineOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings of one tiling run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TilerConfig {
    /// Folders searched recursively for elevation rasters.
    pub input_dirs: Vec<PathBuf>,
    /// Root of the `{L}/{X}/{Y}.terrain` output tree.
    pub output_root: PathBuf,
    /// First depth to generate.
    pub min_depth: u32,
    /// Last depth to generate.
    pub max_depth: u32,
    /// Blending of overlapping sources.
    pub priority: ElevationPriority,
    /// Sampling inside one source.
    pub interpolation: Interpolation,
    /// Write oct-encoded vertex normals.
    pub oct_normals: bool,
    /// Tiles per block edge.
    pub block_size: u32,
    /// Refinement intensity in `[1, 16]`.
    pub intensity: f64,
    /// No-data sentinel for rasters that do not declare one.
    pub no_data: Option<f32>,
    /// Continue from the highest complete depth already on disk.
    pub resume: bool,
    /// Samples per edge of each tile raster.
    pub raster_size: u32,
    /// Number of rasters kept open.
    pub cache_capacity: usize,
    /// Handling of split midpoints without elevation.
    pub nan_policy: NanPolicy,
    /// Depth from which the normal-compatibility factor applies.
    pub normal_compat_depth: Option<u32>,
    /// Physical memory in MiB above which the raster cache is released.
    pub memory_release_mb: u64,
    /// Check memory every this many blocks.
    pub release_every_blocks: u32,
}

impl Default for TilerConfig {
    fn default() -> Self {
        Self {
            input_dirs: Vec::new(),
            output_root: PathBuf::from("terrain"),
            min_depth: 0,
            max_depth: 10,
            priority: ElevationPriority::Resolution,
            interpolation: Interpolation::Bilinear,
            oct_normals: false,
            block_size: 8,
            intensity: 1.0,
            no_data: Some(-9999.0),
            resume: false,
            raster_size: DEFAULT_RASTER_SIZE,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            nan_policy: NanPolicy::Interpolate,
            normal_compat_depth: None,
            memory_release_mb: 4096,
            release_every_blocks: 16,
        }
    }
}

impl TilerConfig {
    /// Parse a YAML document.
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Load a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| TilerError::io(path, e))?;
        Self::from_yaml(&text)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.min_depth > self.max_depth {
            return Err(TilerError::input(format!(
                "min depth {} exceeds max depth {}",
                self.min_depth, self.max_depth
            )));
        }
        if self.max_depth > MAX_DEPTH {
            return Err(TilerError::input(format!(
                "max depth {} is outside 0-{MAX_DEPTH}",
                self.max_depth
            )));
        }
        if !(MIN_INTENSITY..=MAX_INTENSITY).contains(&self.intensity) {
            return Err(TilerError::input(format!(
                "intensity {} is outside {MIN_INTENSITY}-{MAX_INTENSITY}",
                self.intensity
            )));
        }
        if self.block_size == 0 {
            return Err(TilerError::input("block size must be at least 1"));
        }
        if self.raster_size < 2 {
            return Err(TilerError::input(format!(
                "raster size {} must be at least 2",
                self.raster_size
            )));
        }
        if self.cache_capacity == 0 {
            return Err(TilerError::input("cache capacity must be at least 1"));
        }
        Ok(())
    }

    /// Options for the elevation source index.
    pub fn index_options(&self) -> IndexOptions {
        IndexOptions {
            interpolation: self.interpolation,
            priority: self.priority,
            no_data: self.no_data,
            cache_capacity: self.cache_capacity,
        }
    }

    /// Options for the refinement loop.
    pub fn refine_options(&self) -> RefineOptions {
        RefineOptions {
            nan_policy: self.nan_policy,
            normal_compat_depth: self.normal_compat_depth,
        }
    }
}
