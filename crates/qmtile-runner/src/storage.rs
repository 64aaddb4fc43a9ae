//! On-disk tile layout: `{root}/{L}/{X}/{Y}.terrain`.
//!
//! The tile files are the only checkpoint. A depth counts as complete when
//! every tile of its range exists.

use crate::{Result, TilerError};
use qmtile_codec::{decode, read_terrain};
use qmtile_geo::{TileIndices, TileRange};
use qmtile_mesh::HalfEdgeMesh;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// File extension of quantized-mesh tiles.
pub const TERRAIN_EXTENSION: &str = "terrain";

/// Tile files under one output root.
#[derive(Debug, Clone)]
pub struct TileStore {
    root: PathBuf,
}

impl TileStore {
    /// Store rooted at `root`. Nothing is created until a tile is written.
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Output root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder holding all tiles of a depth.
    pub fn depth_dir(&self, level: u32) -> PathBuf {
        self.root.join(level.to_string())
    }

    /// Path of one tile file.
    pub fn tile_path(&self, tile: TileIndices) -> PathBuf {
        self.depth_dir(tile.level)
            .join(tile.x.to_string())
            .join(format!("{}.{TERRAIN_EXTENSION}", tile.y))
    }

    /// Check if a tile file exists.
    pub fn contains(&self, tile: TileIndices) -> bool {
        self.tile_path(tile).is_file()
    }

    /// Write a tile all-or-nothing, retrying once.
    ///
    /// The bytes go to a temporary sibling first and are renamed into place,
    /// so an interrupted write never leaves a truncated tile behind.
    pub fn write(&self, tile: TileIndices, bytes: &[u8]) -> Result<()> {
        let path = self.tile_path(tile);
        match write_atomic(&path, bytes) {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!(tile = %tile, path = %path.display(), error = %first, "tile write failed, retrying");
                write_atomic(&path, bytes).map_err(|e| TilerError::io(&path, e))
            }
        }
    }

    /// Raw bytes of a tile.
    pub fn read(&self, tile: TileIndices) -> Result<Vec<u8>> {
        let path = self.tile_path(tile);
        fs::read(&path).map_err(|e| TilerError::io(&path, e))
    }

    /// Decode a stored tile into a mesh owned by that tile.
    pub fn load_mesh(&self, tile: TileIndices) -> Result<HalfEdgeMesh> {
        let quantized = read_terrain(&self.read(tile)?)?;
        Ok(decode(&quantized, &tile.extent(), tile)?)
    }

    /// Check if every tile of a range is on disk.
    pub fn is_depth_complete(&self, range: &TileRange) -> bool {
        range.iter().all(|tile| self.contains(tile))
    }

    /// Deepest depth such that it and every shallower one in `ranges` are complete.
    ///
    /// `ranges` must be ordered by increasing depth.
    pub fn highest_complete_depth<'a, I>(&self, ranges: I) -> Option<u32>
    where
        I: IntoIterator<Item = &'a TileRange>,
    {
        let mut highest = None;
        for range in ranges {
            if !self.is_depth_complete(range) {
                debug!(level = range.level, "depth incomplete");
                break;
            }
            highest = Some(range.level);
        }
        highest
    }

    /// Delete every tile of a depth.
    pub fn clear_depth(&self, level: u32) -> Result<()> {
        let dir = self.depth_dir(level);
        if dir.exists() {
            info!(level, path = %dir.display(), "clearing depth output");
            fs::remove_dir_all(&dir).map_err(|e| TilerError::io(&dir, e))?;
        }
        Ok(())
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension(format!("{TERRAIN_EXTENSION}.tmp"));
    let mut file = fs::File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);
    fs::rename(&tmp, path)
}
