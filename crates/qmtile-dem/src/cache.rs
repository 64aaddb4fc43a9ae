//! Bounded LRU cache of open rasters.

use crate::raster::Raster;
use crate::Result;
use parking_lot::Mutex;
use qmtile_metrics::metric_defs;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Default maximum number of rasters kept open.
pub const DEFAULT_CACHE_CAPACITY: usize = 8;

/// LRU cache of decoded rasters keyed by path.
///
/// All access goes through [`RasterCache::get_or_load`], which holds a single
/// lock for lookup, load and eviction so the capacity bound is never exceeded.
#[derive(Debug)]
pub struct RasterCache {
    capacity: usize,
    retry_open: bool,
    state: Mutex<LruState>,
}

#[derive(Debug, Default)]
struct LruState {
    rasters: HashMap<PathBuf, Arc<Raster>>,
    /// Most recently used at the back.
    access_order: VecDeque<PathBuf>,
    evictions: u64,
}

impl LruState {
    fn touch(&mut self, path: &Path) {
        if let Some(pos) = self.access_order.iter().position(|p| p == path) {
            if let Some(p) = self.access_order.remove(pos) {
                self.access_order.push_back(p);
            }
        }
    }

    fn insert(&mut self, path: PathBuf, raster: Arc<Raster>, capacity: usize) {
        while self.rasters.len() >= capacity {
            let Some(oldest) = self.access_order.pop_front() else {
                break;
            };
            debug!(path = %oldest.display(), "evicting raster");
            self.rasters.remove(&oldest);
            self.evictions += 1;
            metrics::counter!(metric_defs::RASTER_CACHE_EVICTIONS.name).increment(1);
        }
        self.rasters.insert(path.clone(), raster);
        self.access_order.push_back(path);
    }
}

impl RasterCache {
    /// Create a cache holding at most `capacity` rasters (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            retry_open: true,
            state: Mutex::new(LruState::default()),
        }
    }

    /// Disable the single re-open attempt after a failed load.
    pub fn without_retry(mut self) -> Self {
        self.retry_open = false;
        self
    }

    /// Maximum number of open rasters.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of rasters currently open.
    pub fn len(&self) -> usize {
        self.state.lock().rasters.len()
    }

    /// Check if no raster is open.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total evictions since creation.
    pub fn evictions(&self) -> u64 {
        self.state.lock().evictions
    }

    /// Check if a path is currently open.
    pub fn contains(&self, path: &Path) -> bool {
        self.state.lock().rasters.contains_key(path)
    }

    /// Return the cached raster for `path`, loading it with `load` on a miss.
    ///
    /// A failed load is retried once when retries are enabled.
    pub fn get_or_load<F>(&self, path: &Path, load: F) -> Result<Arc<Raster>>
    where
        F: Fn(&Path) -> Result<Raster>,
    {
        let mut state = self.state.lock();
        if let Some(raster) = state.rasters.get(path).cloned() {
            state.touch(path);
            return Ok(raster);
        }

        let raster = match load(path) {
            Ok(raster) => raster,
            Err(e) if self.retry_open => {
                warn!(path = %path.display(), error = %e, "raster open failed, retrying once");
                load(path)?
            }
            Err(e) => return Err(e),
        };
        let raster = Arc::new(raster);
        state.insert(path.to_path_buf(), Arc::clone(&raster), self.capacity);
        Ok(raster)
    }

    /// Drop every open raster. Paths stay valid and are re-opened on demand.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.rasters.clear();
        state.access_order.clear();
    }
}

impl Default for RasterCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
