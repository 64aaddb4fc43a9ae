//! `layer.json` descriptor read by terrain clients.

use crate::{Result, TilerError};
use qmtile_geo::{GeographicExtent, TileRange};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name of the descriptor in the output root.
pub const LAYER_FILE: &str = "layer.json";

/// Receives the tile ranges produced for each depth.
pub trait AvailabilitySink {
    /// Record that every tile of `range` is available.
    fn record(&mut self, range: &TileRange);
}

/// Inclusive tile range as written in `available`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableRange {
    pub start_x: u32,
    pub end_x: u32,
    pub start_y: u32,
    pub end_y: u32,
}

impl From<&TileRange> for AvailableRange {
    fn from(range: &TileRange) -> Self {
        Self {
            start_x: range.min_x,
            end_x: range.max_x,
            start_y: range.min_y,
            end_y: range.max_y,
        }
    }
}

/// Tileset description in the quantized-mesh `layer.json` format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerDescriptor {
    pub tilejson: String,
    pub name: String,
    pub version: String,
    pub format: String,
    pub scheme: String,
    pub tiles: Vec<String>,
    pub projection: String,
    /// West, south, east, north in degrees.
    pub bounds: [f64; 4],
    pub minzoom: u32,
    pub maxzoom: u32,
    /// Ranges per depth, indexed by depth.
    pub available: Vec<Vec<AvailableRange>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,
}

impl LayerDescriptor {
    /// Empty descriptor for data covering `bounds`.
    pub fn new(bounds: &GeographicExtent, oct_normals: bool) -> Self {
        Self {
            tilejson: "2.1.0".to_string(),
            name: "terrain".to_string(),
            version: "1.0.0".to_string(),
            format: "quantized-mesh-1.0".to_string(),
            scheme: "tms".to_string(),
            tiles: vec!["{z}/{x}/{y}.terrain?v={version}".to_string()],
            projection: "EPSG:4326".to_string(),
            bounds: [bounds.min_lon, bounds.min_lat, bounds.max_lon, bounds.max_lat],
            minzoom: 0,
            maxzoom: 0,
            available: Vec::new(),
            extensions: if oct_normals {
                vec!["octvertexnormals".to_string()]
            } else {
                Vec::new()
            },
        }
    }

    /// Parse a descriptor written earlier.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| TilerError::io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Write the descriptor as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|e| TilerError::io(path, e))
    }
}

impl AvailabilitySink for LayerDescriptor {
    fn record(&mut self, range: &TileRange) {
        let level = range.level as usize;
        if self.available.len() <= level {
            self.available.resize(level + 1, Vec::new());
        }
        let entry = AvailableRange::from(range);
        if !self.available[level].contains(&entry) {
            self.available[level].push(entry);
        }
        if self.available.iter().filter(|ranges| !ranges.is_empty()).count() == 1 {
            self.minzoom = range.level;
            self.maxzoom = range.level;
        } else {
            self.minzoom = self.minzoom.min(range.level);
            self.maxzoom = self.maxzoom.max(range.level);
        }
    }
}
