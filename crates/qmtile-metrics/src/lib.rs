//! Metrics infrastructure for the terrain tiler.
//!
//! Every metric recorded by the tiler is declared once here as a structured
//! [`Metric`] constant, so names never drift between the recording site and
//! dashboards. Recording goes through the `metrics` facade and is a no-op
//! until a recorder is installed.
//!
//! ```rust
//! use qmtile_metrics::{metric_defs, TileLabels};
//!
//! let labels = TileLabels::new(7).to_labels();
//! metrics::counter!(metric_defs::TILES_WRITTEN.name, &labels).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// ```rust
/// use qmtile_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const SPLITS: Metric = Metric::counter("qmtile.mesh.splits")
///     .with_description("Triangles split")
///     .with_unit(Unit::Count)
///     .with_labels(&["level"]);
///
/// assert_eq!(SPLITS.name, "qmtile.mesh.splits");
/// assert_eq!(SPLITS.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "qmtile.tiles.written").
    pub name: &'static str,
    /// The kind of metric.
    pub kind: MetricKind,
    /// Human-readable description.
    pub description: &'static str,
    /// The unit of measurement, if any.
    pub unit: Option<Unit>,
    /// Expected label keys.
    pub labels: &'static [&'static str],
}

impl Metric {
    /// Creates a new counter metric with the given name.
    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    /// Creates a new gauge metric with the given name.
    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    /// Creates a new histogram metric with the given name.
    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Sets the description for the metric.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit for the metric.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys for the metric.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description);
            }
            (MetricKind::Histogram, None) => {
                describe_histogram!(self.name, self.description);
            }
        }
    }
}

/// All metric definitions of the tiler.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Standard Label Keys
    // ========================================================================

    /// Labels present on all depth-scoped metrics.
    pub const LEVEL_LABELS: &[&str] = &["level"];

    // ========================================================================
    // Output
    // ========================================================================

    /// Tiles written to the output store.
    pub const TILES_WRITTEN: Metric = Metric::counter("qmtile.tiles.written")
        .with_description("Quantized-mesh tiles written")
        .with_unit(Unit::Count)
        .with_labels(LEVEL_LABELS);

    /// Encoded size of each written tile.
    pub const TILE_BYTES: Metric = Metric::histogram("qmtile.tiles.bytes")
        .with_description("Encoded tile size in bytes")
        .with_unit(Unit::Bytes)
        .with_labels(LEVEL_LABELS);

    /// Tiles whose write failed after the retry.
    pub const TILES_FAILED: Metric = Metric::counter("qmtile.tiles.failed")
        .with_description("Tiles that could not be written or were aborted")
        .with_unit(Unit::Count)
        .with_labels(LEVEL_LABELS);

    // ========================================================================
    // Mesh
    // ========================================================================

    /// Triangles replaced by a split.
    pub const TRIANGLES_SPLIT: Metric = Metric::counter("qmtile.mesh.triangles_split")
        .with_description("Triangles split during refinement")
        .with_unit(Unit::Count);

    /// Split midpoints whose elevation sample had no data.
    pub const NAN_MIDPOINTS: Metric = Metric::counter("qmtile.mesh.nan_midpoints")
        .with_description("Split midpoints without a valid elevation sample")
        .with_unit(Unit::Count);

    /// Seams merged between neighboring tiles.
    pub const SEAMS_STITCHED: Metric = Metric::counter("qmtile.mesh.seams_stitched")
        .with_description("Tile seams merged")
        .with_unit(Unit::Count);

    /// Seams left open because their boundaries did not match.
    pub const SEAM_MISMATCHES: Metric = Metric::counter("qmtile.mesh.seam_mismatches")
        .with_description("Tile seams left unstitched after a boundary mismatch")
        .with_unit(Unit::Count);

    // ========================================================================
    // Elevation Sources
    // ========================================================================

    /// Sources excluded after failing to open.
    pub const SOURCES_DEGRADED: Metric = Metric::counter("qmtile.sources.degraded")
        .with_description("Elevation sources excluded after a read failure")
        .with_unit(Unit::Count);

    /// Rasters evicted from the LRU cache.
    pub const RASTER_CACHE_EVICTIONS: Metric = Metric::counter("qmtile.sources.cache_evictions")
        .with_description("Open rasters evicted from the cache")
        .with_unit(Unit::Count);

    // ========================================================================
    // Runner
    // ========================================================================

    /// Wall-clock time to process one tile block.
    pub const BLOCK_DURATION: Metric = Metric::histogram("qmtile.runner.block_duration_ms")
        .with_description("Wall-clock time to assemble, refine and persist one block")
        .with_unit(Unit::Milliseconds)
        .with_labels(LEVEL_LABELS);

    /// Resident memory sampled by the memory monitor.
    pub const PHYSICAL_MEMORY: Metric = Metric::gauge("qmtile.runner.physical_memory")
        .with_description("Physical memory used by the process")
        .with_unit(Unit::Mebibytes);

    /// Every declared metric.
    pub const ALL: &[&Metric] = &[
        &TILES_WRITTEN,
        &TILE_BYTES,
        &TILES_FAILED,
        &TRIANGLES_SPLIT,
        &NAN_MIDPOINTS,
        &SEAMS_STITCHED,
        &SEAM_MISMATCHES,
        &SOURCES_DEGRADED,
        &RASTER_CACHE_EVICTIONS,
        &BLOCK_DURATION,
        &PHYSICAL_MEMORY,
    ];
}

/// Labels identifying the depth a metric was recorded at.
#[derive(Debug, Clone, Copy)]
pub struct TileLabels {
    /// Pyramid depth of the tile.
    pub level: u32,
}

impl TileLabels {
    /// Labels for a tile at `level`.
    pub fn new(level: u32) -> Self {
        Self { level }
    }

    /// Label pairs in the form the `metrics` macros accept.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("level", self.level.to_string())]
    }
}

/// Registers the description of every declared metric.
///
/// Call once at startup, after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tile_labels() {
        let labels = TileLabels::new(5).to_labels();
        assert_eq!(labels, vec![("level", "5".to_string())]);
    }

    #[test]
    fn test_metric_definitions() {
        assert_eq!(metric_defs::TILES_WRITTEN.name, "qmtile.tiles.written");
        assert_eq!(metric_defs::TILES_WRITTEN.kind, MetricKind::Counter);
        assert_eq!(metric_defs::TILE_BYTES.unit, Some(Unit::Bytes));
        assert_eq!(metric_defs::BLOCK_DURATION.kind, MetricKind::Histogram);
        assert_eq!(metric_defs::PHYSICAL_MEMORY.kind, MetricKind::Gauge);
    }

    #[test]
    fn test_metric_names_are_unique() {
        let mut names: Vec<_> = metric_defs::ALL.iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), metric_defs::ALL.len());
    }

    #[test]
    fn test_describe_without_recorder() {
        describe_metrics();
    }

    #[test]
    fn test_metric_kind_display() {
        assert_eq!(MetricKind::Counter.to_string(), "counter");
        assert_eq!(MetricKind::Histogram.as_str(), "histogram");
    }
}
