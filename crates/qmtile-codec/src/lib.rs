//! # qmtile-codec
//!
//! Reading and writing terrain tiles in the quantized-mesh-1.0 format.
//!
//! A mesh is first quantized into a [`QuantizedMeshTile`] with [`encode`],
//! then serialized with [`write_terrain`]. Reading goes the other way with
//! [`read_terrain`] and [`decode`].
//!
//! ```
//! use qmtile_codec::{decode, encode, read_terrain, write_terrain};
//! use qmtile_geo::TileIndices;
//! use qmtile_mesh::TileMeshBuilder;
//!
//! let tile = TileIndices::new(0, 0, 0)?;
//! let mesh = TileMeshBuilder::seed(tile, [100.0; 4]);
//! let bytes = write_terrain(&encode(&mesh, &tile.extent(), false)?)?;
//!
//! let decoded = decode(&read_terrain(&bytes)?, &tile.extent(), tile)?;
//! assert_eq!(decoded.triangle_count(), 2);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod error;
mod oct;
mod quantize;
mod wire;

pub use error::CodecError;
pub use oct::{oct_decode, oct_encode};
pub use quantize::{decode, encode, QuantizedMeshHeader, QuantizedMeshTile};
pub use wire::{
    decode_high_water_mark, encode_high_water_mark, read_terrain, write_terrain, zigzag_decode,
    zigzag_encode, HEADER_SIZE,
};

/// Largest quantized coordinate or height value.
pub const QUANTIZED_MAX: u16 = 32767;

/// Extension id of oct-encoded per-vertex normals.
pub const OCT_NORMALS_EXTENSION_ID: u8 = 1;

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
