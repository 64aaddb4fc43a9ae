//! Quad-tree index over elevation sources with priority blending.

use crate::cache::{RasterCache, DEFAULT_CACHE_CAPACITY};
use crate::raster::Raster;
use crate::source::{ElevationSource, SourceId, SourceOrigin};
use crate::{DemError, ElevationPriority, ElevationSampler, Interpolation, Result};
use parking_lot::Mutex;
use qmtile_geo::GeographicExtent;
use qmtile_metrics::metric_defs;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Deepest level of the source quad-tree.
pub const QUADTREE_MAX_DEPTH: u32 = 6;

/// How the index samples and blends its sources.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndexOptions {
    /// Sampling inside one source.
    pub interpolation: Interpolation,
    /// Blending across overlapping sources.
    pub priority: ElevationPriority,
    /// Sentinel used for rasters that do not declare their own.
    pub no_data: Option<f32>,
    /// Maximum number of file-backed rasters kept open.
    pub cache_capacity: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            interpolation: Interpolation::Bilinear,
            priority: ElevationPriority::Resolution,
            no_data: Some(-9999.0),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

#[derive(Debug)]
struct QuadNode {
    extent: GeographicExtent,
    depth: u32,
    /// Indices into `sources` of sources stored at this node.
    sources: Vec<usize>,
    /// Arena indices of the SW, SE, NW, NE children.
    children: Option<[usize; 4]>,
}

impl QuadNode {
    fn new(extent: GeographicExtent, depth: u32) -> Self {
        Self {
            extent,
            depth,
            sources: Vec::new(),
            children: None,
        }
    }
}

/// Spatial index over elevation sources.
///
/// A source is stored at the shallowest node it fully covers, or at every
/// leaf it touches once [`QUADTREE_MAX_DEPTH`] is reached. Nodes live in an
/// arena and only reference their children.
#[derive(Debug)]
pub struct ElevationSourceIndex {
    sources: Vec<ElevationSource>,
    nodes: Vec<QuadNode>,
    options: IndexOptions,
    cache: RasterCache,
    degraded: Mutex<HashSet<SourceId>>,
}

impl ElevationSourceIndex {
    /// Discover every GeoTIFF under the given folders and index it.
    ///
    /// A missing folder is fatal. A file whose header cannot be read is
    /// logged and skipped.
    pub fn build<P: AsRef<Path>>(dirs: &[P], options: IndexOptions) -> Result<Self> {
        let mut paths = Vec::new();
        for dir in dirs {
            let dir = dir.as_ref();
            if !dir.is_dir() {
                return Err(DemError::MissingInput(dir.to_path_buf()));
            }
            collect_rasters(dir, &mut paths)?;
        }
        paths.sort();
        info!(files = paths.len(), "discovered elevation rasters");

        let headers: Vec<_> = paths
            .par_iter()
            .map(|path| (path, ElevationSource::from_file(SourceId(0), path)))
            .collect();

        let mut sources = Vec::with_capacity(headers.len());
        for (path, result) in headers {
            match result {
                Ok(source) => sources.push(source),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "excluding unreadable elevation source");
                    metrics::counter!(metric_defs::SOURCES_DEGRADED.name).increment(1);
                }
            }
        }
        Self::from_sources(sources, options)
    }

    /// Index an explicit set of sources. Source ids are reassigned by position.
    pub fn from_sources(sources: Vec<ElevationSource>, options: IndexOptions) -> Result<Self> {
        if sources.is_empty() {
            return Err(DemError::NoSources);
        }
        let sources: Vec<ElevationSource> = sources
            .into_iter()
            .enumerate()
            .map(|(i, s)| s.with_id(SourceId(i as u32)))
            .collect();

        let bounds = sources
            .iter()
            .map(|s| s.extent())
            .reduce(|a, b| a.union(&b))
            .ok_or(DemError::NoSources)?;

        let mut index = Self {
            nodes: vec![QuadNode::new(bounds, 0)],
            sources,
            options,
            cache: RasterCache::new(options.cache_capacity),
            degraded: Mutex::new(HashSet::new()),
        };
        for i in 0..index.sources.len() {
            let extent = index.sources[i].extent();
            insert(&mut index.nodes, 0, i, &extent);
        }
        debug!(
            sources = index.sources.len(),
            nodes = index.nodes.len(),
            "built elevation source quad-tree"
        );
        Ok(index)
    }

    /// Options the index was built with.
    pub fn options(&self) -> &IndexOptions {
        &self.options
    }

    /// All indexed sources.
    pub fn sources(&self) -> &[ElevationSource] {
        &self.sources
    }

    /// Union of all source extents.
    pub fn data_extent(&self) -> GeographicExtent {
        self.nodes[0].extent
    }

    /// Number of quad-tree nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Sources excluded after failing to open.
    pub fn degraded_sources(&self) -> Vec<SourceId> {
        let mut ids: Vec<_> = self.degraded.lock().iter().copied().collect();
        ids.sort();
        ids
    }

    /// Close every open raster. They are re-opened on demand.
    pub fn release_rasters(&self) {
        debug!(open = self.cache.len(), "releasing raster cache");
        self.cache.clear();
    }

    /// Raster cache used for file-backed sources.
    pub fn cache(&self) -> &RasterCache {
        &self.cache
    }

    /// All sources intersecting `extent`, finest resolution first.
    pub fn query(&self, extent: &GeographicExtent) -> Vec<&ElevationSource> {
        let mut found = Vec::new();
        let mut stack = vec![0usize];
        while let Some(n) = stack.pop() {
            let node = &self.nodes[n];
            if !node.extent.intersects(extent) {
                continue;
            }
            found.extend(
                node.sources
                    .iter()
                    .copied()
                    .filter(|&i| self.sources[i].extent().intersects(extent)),
            );
            if let Some(children) = node.children {
                stack.extend(children);
            }
        }
        found.sort_unstable();
        found.dedup();

        let mut result: Vec<&ElevationSource> = found.into_iter().map(|i| &self.sources[i]).collect();
        result.sort_by(|a, b| {
            a.pixel_area()
                .total_cmp(&b.pixel_area())
                .then_with(|| a.id().cmp(&b.id()))
        });
        result
    }

    /// Blend samples of `candidates` at a point according to the priority policy.
    ///
    /// With [`ElevationPriority::Resolution`] the finest candidate with data
    /// wins; coarser ones are only consulted where finer ones have no data.
    pub fn sample_from(&self, lon: f64, lat: f64, candidates: &[&ElevationSource]) -> Option<f64> {
        match self.options.priority {
            ElevationPriority::Resolution => {
                let mut ordered = candidates.to_vec();
                ordered.sort_by(|a, b| a.pixel_area().total_cmp(&b.pixel_area()));
                ordered
                    .into_iter()
                    .find_map(|source| self.sample_source(source, lon, lat))
            }
            ElevationPriority::Maximum => candidates
                .iter()
                .filter_map(|source| self.sample_source(source, lon, lat))
                .reduce(f64::max),
        }
    }

    /// Sample the blended elevation at a point.
    pub fn sample_point(&self, lon: f64, lat: f64) -> Option<f64> {
        let point = GeographicExtent {
            min_lon: lon,
            max_lon: lon,
            min_lat: lat,
            max_lat: lat,
        };
        let candidates = self.query(&point);
        self.sample_from(lon, lat, &candidates)
    }

    fn sample_source(&self, source: &ElevationSource, lon: f64, lat: f64) -> Option<f64> {
        if !source.extent().contains(lon, lat) {
            return None;
        }
        match source.origin() {
            SourceOrigin::Memory(raster) => raster.sample(lon, lat, self.options.interpolation),
            SourceOrigin::File(path) => {
                if self.degraded.lock().contains(&source.id()) {
                    return None;
                }
                match self.open(path) {
                    Ok(raster) => raster.sample(lon, lat, self.options.interpolation),
                    Err(e) => {
                        self.degrade(source, &e);
                        None
                    }
                }
            }
        }
    }

    fn open(&self, path: &Path) -> Result<std::sync::Arc<Raster>> {
        let no_data = self.options.no_data;
        self.cache
            .get_or_load(path, |p| Raster::from_file(p, no_data))
    }

    fn degrade(&self, source: &ElevationSource, error: &DemError) {
        if self.degraded.lock().insert(source.id()) {
            warn!(source = %source, error = %error, "elevation source degraded, excluding it");
            metrics::counter!(metric_defs::SOURCES_DEGRADED.name).increment(1);
        }
    }
}

impl ElevationSampler for ElevationSourceIndex {
    fn sample(&self, lon: f64, lat: f64) -> Option<f64> {
        self.sample_point(lon, lat)
    }
}

fn insert(nodes: &mut Vec<QuadNode>, n: usize, source: usize, extent: &GeographicExtent) {
    let (node_extent, depth) = (nodes[n].extent, nodes[n].depth);
    if !node_extent.intersects(extent) {
        return;
    }
    if extent.contains_extent(&node_extent) || depth >= QUADTREE_MAX_DEPTH {
        nodes[n].sources.push(source);
        return;
    }
    let children = match nodes[n].children {
        Some(children) => children,
        None => {
            let first = nodes.len();
            for quadrant in node_extent.quadrants() {
                nodes.push(QuadNode::new(quadrant, depth + 1));
            }
            let children = [first, first + 1, first + 2, first + 3];
            nodes[n].children = Some(children);
            children
        }
    };
    for child in children {
        insert(nodes, child, source, extent);
    }
}

fn collect_rasters(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_rasters(&path, out)?;
        } else if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("tif") || ext.eq_ignore_ascii_case("tiff"))
        {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constant(id: u32, extent: GeographicExtent, pixels: u32, value: f32) -> ElevationSource {
        let n = (pixels * pixels) as usize;
        ElevationSource::from_grid(SourceId(id), extent, pixels, pixels, vec![value; n], None).unwrap()
    }

    fn unit() -> GeographicExtent {
        GeographicExtent::new(0.0, 1.0, 0.0, 1.0).unwrap()
    }

    #[test]
    fn test_finest_source_wins() {
        // 4x4 pixels has a quarter of the pixel area of 2x2
        let coarse = constant(0, unit(), 2, 20.0);
        let fine = constant(1, unit(), 4, 10.0);
        assert!(fine.pixel_area() * 3.9 < coarse.pixel_area());

        let index = ElevationSourceIndex::from_sources(vec![coarse, fine], IndexOptions::default()).unwrap();
        assert_eq!(index.sample(0.5, 0.5), Some(10.0));

        // Insertion order does not matter
        let index = ElevationSourceIndex::from_sources(
            vec![constant(0, unit(), 4, 10.0), constant(1, unit(), 2, 20.0)],
            IndexOptions::default(),
        )
        .unwrap();
        assert_eq!(index.sample(0.5, 0.5), Some(10.0));
    }

    #[test]
    fn test_coarse_source_fills_gaps() {
        let coarse = constant(0, GeographicExtent::new(0.0, 2.0, 0.0, 2.0).unwrap(), 2, 20.0);
        let fine = constant(1, unit(), 8, 10.0);
        let index = ElevationSourceIndex::from_sources(vec![coarse, fine], IndexOptions::default()).unwrap();

        assert_eq!(index.sample(0.5, 0.5), Some(10.0));
        assert_eq!(index.sample(1.5, 1.5), Some(20.0));
        assert_eq!(index.sample(3.0, 3.0), None);
    }

    #[test]
    fn test_fine_no_data_falls_back() {
        let coarse = constant(0, unit(), 2, 20.0);
        let fine = constant(1, unit(), 4, -9999.0);
        let index = ElevationSourceIndex::from_sources(vec![coarse, fine], IndexOptions::default()).unwrap();
        // The in-memory fine source declares no sentinel, so the default one is not applied
        assert_eq!(index.sample(0.5, 0.5), Some(-9999.0));

        let fine = ElevationSource::from_grid(SourceId(1), unit(), 4, 4, vec![-9999.0; 16], Some(-9999.0)).unwrap();
        let index = ElevationSourceIndex::from_sources(
            vec![constant(0, unit(), 2, 20.0), fine],
            IndexOptions::default(),
        )
        .unwrap();
        assert_eq!(index.sample(0.5, 0.5), Some(20.0));
    }

    #[test]
    fn test_maximum_priority() {
        let options = IndexOptions {
            priority: ElevationPriority::Maximum,
            ..IndexOptions::default()
        };
        let index = ElevationSourceIndex::from_sources(
            vec![constant(0, unit(), 2, 20.0), constant(1, unit(), 4, 10.0)],
            options,
        )
        .unwrap();
        assert_eq!(index.sample(0.5, 0.5), Some(20.0));
    }

    #[test]
    fn test_query_finds_sources_across_tree() {
        let sources = vec![
            constant(0, GeographicExtent::new(0.0, 8.0, 0.0, 8.0).unwrap(), 2, 1.0),
            constant(1, GeographicExtent::new(0.0, 0.5, 0.0, 0.5).unwrap(), 2, 2.0),
            constant(2, GeographicExtent::new(7.0, 7.5, 7.0, 7.5).unwrap(), 2, 3.0),
        ];
        let index = ElevationSourceIndex::from_sources(sources, IndexOptions::default()).unwrap();
        assert!(index.node_count() > 1);
        assert_eq!(index.data_extent(), GeographicExtent::new(0.0, 8.0, 0.0, 8.0).unwrap());

        let near_origin = index.query(&GeographicExtent::new(0.1, 0.2, 0.1, 0.2).unwrap());
        let ids: Vec<_> = near_origin.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![SourceId(1), SourceId(0)]);

        let middle = index.query(&GeographicExtent::new(3.0, 4.0, 3.0, 4.0).unwrap());
        assert_eq!(middle.len(), 1);
        assert_eq!(middle[0].id(), SourceId(0));
    }

    #[test]
    fn test_empty_source_set_is_rejected() {
        assert!(matches!(
            ElevationSourceIndex::from_sources(Vec::new(), IndexOptions::default()),
            Err(DemError::NoSources)
        ));
    }

    #[test]
    fn test_missing_folder_is_fatal() {
        let result = ElevationSourceIndex::build(&["/definitely/not/here"], IndexOptions::default());
        assert!(matches!(result, Err(DemError::MissingInput(_))));
    }
}
