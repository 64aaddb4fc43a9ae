//! Byte layout of `.terrain` files.
//!
//! All values are little-endian.
//!
//! | Field                   | Size (bytes)        | Description                                   |
//! |-------------------------|---------------------|-----------------------------------------------|
//! | header                  | 88                  | Center, height range, bounding sphere, horizon |
//! | vertexCount             | 4                   | Number of vertices                            |
//! | u, v, height            | 3 x 2 x vertexCount | Zig-zag delta coded                           |
//! | padding                 | 0-3                 | Aligns the index data to the index width      |
//! | triangleCount           | 4                   | Number of triangles                           |
//! | indices                 | 3 x w x triCount    | High-water-mark coded, w = 2 or 4             |
//! | west/south/east/north   | 4 + w x count each  | Edge vertex lists                             |
//! | extensions              | rest                | `id: u8`, `length: u32`, `length` bytes       |

use bytes::{Buf, BufMut, BytesMut};
use glam::DVec3;

use crate::{CodecError, QuantizedMeshHeader, QuantizedMeshTile, Result, OCT_NORMALS_EXTENSION_ID};

/// Size of the fixed header in bytes.
pub const HEADER_SIZE: usize = 88;

// ============================================================================
// Integer coding
// ============================================================================

/// Map a signed delta onto an unsigned value, small magnitudes first.
pub fn zigzag_encode(value: i32) -> u16 {
    ((value << 1) ^ (value >> 31)) as u16
}

/// Inverse of [`zigzag_encode`].
pub fn zigzag_decode(value: u16) -> i32 {
    let value = i32::from(value);
    (value >> 1) ^ -(value & 1)
}

/// Code triangle indices as distances below the highest index seen so far.
///
/// Every index must be at most one above the highest seen before it, which
/// holds when vertices are numbered in order of first use.
pub fn encode_high_water_mark(indices: &[u32]) -> Result<Vec<u32>> {
    let mut highest = 0u32;
    indices
        .iter()
        .enumerate()
        .map(|(position, &index)| {
            if index > highest {
                return Err(CodecError::invalid_tile(format!(
                    "index {index} at position {position} skips past {highest}"
                )));
            }
            let code = highest - index;
            if code == 0 {
                highest += 1;
            }
            Ok(code)
        })
        .collect()
}

/// Inverse of [`encode_high_water_mark`].
pub fn decode_high_water_mark(codes: &[u32]) -> Result<Vec<u32>> {
    let mut highest = 0u32;
    codes
        .iter()
        .enumerate()
        .map(|(position, &code)| {
            let index = highest.checked_sub(code).ok_or_else(|| {
                CodecError::invalid_tile(format!(
                    "index code {code} at position {position} exceeds {highest}"
                ))
            })?;
            if code == 0 {
                highest += 1;
            }
            Ok(index)
        })
        .collect()
}

fn delta_encode(values: &[u16]) -> impl Iterator<Item = u16> + '_ {
    let mut previous = 0i32;
    values.iter().map(move |&value| {
        let value = i32::from(value);
        let delta = value - previous;
        previous = value;
        zigzag_encode(delta)
    })
}

// ============================================================================
// Writing
// ============================================================================

fn put_vec3(buf: &mut BytesMut, v: DVec3) {
    buf.put_f64_le(v.x);
    buf.put_f64_le(v.y);
    buf.put_f64_le(v.z);
}

fn put_index(buf: &mut BytesMut, index: u32, wide: bool) {
    if wide {
        buf.put_u32_le(index);
    } else {
        buf.put_u16_le(index as u16);
    }
}

/// Serialize a tile.
pub fn write_terrain(tile: &QuantizedMeshTile) -> Result<Vec<u8>> {
    tile.check()?;
    let n = tile.vertex_count();
    let wide = tile.uses_32bit_indices();
    let width = if wide { 4 } else { 2 };
    let edges = [&tile.west, &tile.south, &tile.east, &tile.north];
    let capacity = HEADER_SIZE
        + 4
        + 6 * n
        + 3
        + 4
        + width * tile.indices.len()
        + edges.iter().map(|e| 4 + width * e.len()).sum::<usize>()
        + tile.normals.as_ref().map_or(0, |normals| 5 + 2 * normals.len());
    let mut buf = BytesMut::with_capacity(capacity);

    let h = &tile.header;
    put_vec3(&mut buf, h.center);
    buf.put_f32_le(h.min_height);
    buf.put_f32_le(h.max_height);
    put_vec3(&mut buf, h.bounding_sphere_center);
    buf.put_f64_le(h.bounding_sphere_radius);
    put_vec3(&mut buf, h.horizon_occlusion_point);

    buf.put_u32_le(n as u32);
    for values in [&tile.u, &tile.v, &tile.heights] {
        for coded in delta_encode(values) {
            buf.put_u16_le(coded);
        }
    }

    while buf.len() % width != 0 {
        buf.put_u8(0);
    }
    buf.put_u32_le(tile.triangle_count() as u32);
    for code in encode_high_water_mark(&tile.indices)? {
        put_index(&mut buf, code, wide);
    }

    for edge in edges {
        buf.put_u32_le(edge.len() as u32);
        for &index in edge.iter() {
            put_index(&mut buf, index, wide);
        }
    }

    if let Some(normals) = &tile.normals {
        buf.put_u8(OCT_NORMALS_EXTENSION_ID);
        buf.put_u32_le((normals.len() * 2) as u32);
        for n in normals {
            buf.put_slice(n);
        }
    }

    Ok(buf.to_vec())
}

// ============================================================================
// Reading
// ============================================================================

/// Bounds-checked reader that reports offsets in errors.
struct Reader<'a> {
    buf: &'a [u8],
    total: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            buf: data,
            total: data.len(),
        }
    }

    fn offset(&self) -> usize {
        self.total - self.buf.remaining()
    }

    fn need(&self, bytes: usize, what: &str) -> Result<()> {
        if self.buf.remaining() < bytes {
            return Err(CodecError::decode_at(
                self.offset(),
                format!(
                    "{what} needs {bytes} bytes, {} remaining",
                    self.buf.remaining()
                ),
            ));
        }
        Ok(())
    }

    fn u8(&mut self, what: &str) -> Result<u8> {
        self.need(1, what)?;
        Ok(self.buf.get_u8())
    }

    fn u16(&mut self, what: &str) -> Result<u16> {
        self.need(2, what)?;
        Ok(self.buf.get_u16_le())
    }

    fn u32(&mut self, what: &str) -> Result<u32> {
        self.need(4, what)?;
        Ok(self.buf.get_u32_le())
    }

    fn f32(&mut self, what: &str) -> Result<f32> {
        self.need(4, what)?;
        Ok(self.buf.get_f32_le())
    }

    fn f64(&mut self, what: &str) -> Result<f64> {
        self.need(8, what)?;
        Ok(self.buf.get_f64_le())
    }

    fn vec3(&mut self, what: &str) -> Result<DVec3> {
        self.need(24, what)?;
        Ok(DVec3::new(
            self.buf.get_f64_le(),
            self.buf.get_f64_le(),
            self.buf.get_f64_le(),
        ))
    }

    fn index(&mut self, wide: bool, what: &str) -> Result<u32> {
        if wide {
            self.u32(what)
        } else {
            self.u16(what).map(u32::from)
        }
    }

    fn skip(&mut self, bytes: usize, what: &str) -> Result<()> {
        self.need(bytes, what)?;
        self.buf.advance(bytes);
        Ok(())
    }

    /// Read a `u32` count and check the data it announces can fit.
    fn count(&mut self, item_size: usize, what: &str) -> Result<usize> {
        let at = self.offset();
        let count = self.u32(what)? as usize;
        if count.saturating_mul(item_size) > self.buf.remaining() {
            return Err(CodecError::decode_at(
                at,
                format!("{what} of {count} does not fit in {} bytes", self.buf.remaining()),
            ));
        }
        Ok(count)
    }
}

/// Parse a tile written by [`write_terrain`].
///
/// Unknown extensions are skipped.
pub fn read_terrain(data: &[u8]) -> Result<QuantizedMeshTile> {
    let mut r = Reader::new(data);

    let header = QuantizedMeshHeader {
        center: r.vec3("header center")?,
        min_height: r.f32("minimum height")?,
        max_height: r.f32("maximum height")?,
        bounding_sphere_center: r.vec3("bounding sphere center")?,
        bounding_sphere_radius: r.f64("bounding sphere radius")?,
        horizon_occlusion_point: r.vec3("horizon occlusion point")?,
    };

    let n = r.count(6, "vertex count")?;
    let mut arrays = [Vec::with_capacity(n), Vec::with_capacity(n), Vec::with_capacity(n)];
    for values in &mut arrays {
        let mut current = 0i32;
        for _ in 0..n {
            current += zigzag_decode(r.u16("vertex data")?);
            let value = u16::try_from(current).map_err(|_| {
                CodecError::decode_at(r.offset() - 2, format!("vertex value {current} out of range"))
            })?;
            values.push(value);
        }
    }
    let [u, v, heights] = arrays;

    let wide = n > 65_536;
    let width = if wide { 4 } else { 2 };
    let padding = (width - r.offset() % width) % width;
    r.skip(padding, "index alignment")?;

    let triangles = r.count(3 * width, "triangle count")?;
    let codes = (0..triangles * 3)
        .map(|_| r.index(wide, "triangle indices"))
        .collect::<Result<Vec<_>>>()?;
    let indices = decode_high_water_mark(&codes)?;

    let mut edges: [Vec<u32>; 4] = Default::default();
    for (edge, name) in edges.iter_mut().zip(["west", "south", "east", "north"]) {
        let count = r.count(width, name)?;
        *edge = (0..count)
            .map(|_| r.index(wide, name))
            .collect::<Result<Vec<_>>>()?;
    }
    let [west, south, east, north] = edges;

    let mut normals = None;
    while r.buf.has_remaining() {
        let id = r.u8("extension id")?;
        let at = r.offset();
        let length = r.u32("extension length")? as usize;
        if id == OCT_NORMALS_EXTENSION_ID {
            if length != 2 * n {
                return Err(CodecError::decode_at(
                    at,
                    format!("normal extension of {length} bytes for {n} vertices"),
                ));
            }
            r.need(length, "vertex normals")?;
            let mut values = Vec::with_capacity(n);
            for _ in 0..n {
                values.push([r.buf.get_u8(), r.buf.get_u8()]);
            }
            normals = Some(values);
        } else {
            r.skip(length, "extension data")?;
        }
    }

    let tile = QuantizedMeshTile {
        header,
        u,
        v,
        heights,
        indices,
        west,
        south,
        east,
        north,
        normals,
    };
    tile.check()?;
    Ok(tile)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tile() -> QuantizedMeshTile {
        QuantizedMeshTile {
            header: QuantizedMeshHeader {
                center: DVec3::new(1.0, 2.0, 3.0),
                min_height: -10.0,
                max_height: 250.5,
                bounding_sphere_center: DVec3::new(4.0, 5.0, 6.0),
                bounding_sphere_radius: 7.0,
                horizon_occlusion_point: DVec3::new(8.0, 9.0, 10.0),
            },
            u: vec![0, 32767, 16000, 32767, 0],
            v: vec![0, 0, 20000, 32767, 32767],
            heights: vec![0, 100, 17, 32767, 5],
            indices: vec![0, 1, 2, 1, 3, 2, 3, 4, 2, 4, 0, 2],
            west: vec![0, 4],
            south: vec![0, 1],
            east: vec![1, 3],
            north: vec![4, 3],
            normals: None,
        }
    }

    #[test]
    fn test_zigzag() {
        assert_eq!(zigzag_encode(0), 0);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
        assert_eq!(zigzag_encode(-2), 3);
        for value in [-32767, -12345, -1, 0, 1, 999, 32767] {
            assert_eq!(zigzag_decode(zigzag_encode(value)), value);
        }
    }

    #[test]
    fn test_high_water_mark() {
        let indices = [0, 1, 2, 0, 2, 3, 3, 2, 4];
        let codes = encode_high_water_mark(&indices).unwrap();
        assert_eq!(codes, vec![0, 0, 0, 3, 1, 0, 1, 2, 0]);
        assert_eq!(decode_high_water_mark(&codes).unwrap(), indices);

        assert!(encode_high_water_mark(&[0, 2, 1]).is_err());
        assert!(decode_high_water_mark(&[0, 5]).is_err());
    }

    #[test]
    fn test_layout() {
        let tile = sample_tile();
        let bytes = write_terrain(&tile).unwrap();
        // Header, vertex count, vertex data, triangle count, indices, four edge lists.
        let expected = HEADER_SIZE + 4 + 6 * 5 + 4 + 2 * 12 + 4 * (4 + 2 * 2);
        assert_eq!(bytes.len(), expected);
        assert_eq!(&bytes[HEADER_SIZE..HEADER_SIZE + 4], &5u32.to_le_bytes());
        assert_eq!(read_terrain(&bytes).unwrap(), tile);
    }

    #[test]
    fn test_normals_extension() {
        let mut tile = sample_tile();
        tile.normals = Some(vec![[1, 2], [3, 4], [5, 6], [7, 8], [128, 255]]);
        let bytes = write_terrain(&tile).unwrap();
        assert_eq!(bytes[bytes.len() - 15], OCT_NORMALS_EXTENSION_ID);
        assert_eq!(read_terrain(&bytes).unwrap(), tile);
    }

    #[test]
    fn test_unknown_extension_skipped() {
        let tile = sample_tile();
        let mut bytes = write_terrain(&tile).unwrap();
        bytes.push(4);
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(b"{}\n");
        assert_eq!(read_terrain(&bytes).unwrap(), tile);
    }

    #[test]
    fn test_truncated_input() {
        let bytes = write_terrain(&sample_tile()).unwrap();
        let err = read_terrain(&bytes[..40]).unwrap_err();
        assert!(matches!(err, CodecError::Decode { offset: 32, .. }), "{err}");

        let err = read_terrain(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, CodecError::Decode { .. }), "{err}");
    }

    #[test]
    fn test_wide_indices_alignment() {
        let n = 65_537u32;
        let tile = QuantizedMeshTile {
            header: sample_tile().header,
            u: (0..n).map(|i| (i % 32768) as u16).collect(),
            v: (0..n).map(|i| (i / 32768) as u16).collect(),
            heights: vec![0; n as usize],
            indices: (0..n - 2).flat_map(|i| [i, i + 1, i + 2]).collect(),
            west: vec![0],
            south: vec![],
            east: vec![n - 1],
            north: vec![],
            normals: None,
        };
        assert!(tile.uses_32bit_indices());
        let bytes = write_terrain(&tile).unwrap();
        // 88 + 4 + 6n is even but not a multiple of 4.
        let vertex_end = HEADER_SIZE + 4 + 6 * n as usize;
        assert_eq!(vertex_end % 4, 2);
        assert_eq!(&bytes[vertex_end..vertex_end + 2], &[0, 0]);
        assert_eq!(read_terrain(&bytes).unwrap(), tile);
    }
}
