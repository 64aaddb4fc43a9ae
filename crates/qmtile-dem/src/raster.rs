//! A single normalized elevation raster.

use crate::{DemError, Interpolation, Result};
use qmtile_geo::{GeographicExtent, METERS_PER_DEGREE};
use std::path::Path;
use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;

/// GeoTIFF ModelPixelScale tag.
const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
/// GeoTIFF ModelTiepoint tag.
const TAG_MODEL_TIEPOINT: u16 = 33922;
/// GDAL_NODATA tag, stored as ASCII.
const TAG_GDAL_NODATA: u16 = 42113;

/// Values closer than this to the no-data sentinel count as missing.
const NO_DATA_TOLERANCE: f32 = 0.001;

/// Georeferencing of a raster, readable without decoding its pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterHeader {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Outer bounds of the pixel grid.
    pub extent: GeographicExtent,
    /// No-data sentinel, if the raster declares one.
    pub no_data: Option<f32>,
}

impl RasterHeader {
    /// Read the header of a GeoTIFF in EPSG:4326.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut decoder = open_decoder(path)?;
        read_header(&mut decoder, path)
    }

    /// Pixel size in degrees as `(lon, lat)`.
    pub fn pixel_size_degrees(&self) -> (f64, f64) {
        (
            self.extent.width() / f64::from(self.width),
            self.extent.height() / f64::from(self.height),
        )
    }

    /// Approximate pixel size in meters at the center of the raster as `(x, y)`.
    pub fn pixel_size_meters(&self) -> (f64, f64) {
        let (lon_deg, lat_deg) = self.pixel_size_degrees();
        let (_, center_lat) = self.extent.center();
        (
            lon_deg * METERS_PER_DEGREE * center_lat.to_radians().cos(),
            lat_deg * METERS_PER_DEGREE,
        )
    }
}

/// Elevation grid of one raster.
///
/// Pixels are stored row-major from the north-west corner; each value is
/// the elevation at the pixel center.
#[derive(Debug)]
pub struct Raster {
    data: Vec<f32>,
    header: RasterHeader,
}

impl Raster {
    /// Load a GeoTIFF, falling back to `default_no_data` when the file does not declare one.
    pub fn from_file<P: AsRef<Path>>(path: P, default_no_data: Option<f32>) -> Result<Self> {
        let path = path.as_ref();
        let mut decoder = open_decoder(path)?;
        let mut header = read_header(&mut decoder, path)?;
        if header.no_data.is_none() {
            header.no_data = default_no_data;
        }
        let data = decode_elevation_data(&mut decoder)?;
        Self::from_parts(data, header)
    }

    /// Build a raster from an in-memory grid (row-major, north row first).
    pub fn from_grid(
        extent: GeographicExtent,
        width: u32,
        height: u32,
        data: Vec<f32>,
        no_data: Option<f32>,
    ) -> Result<Self> {
        Self::from_parts(
            data,
            RasterHeader {
                width,
                height,
                extent,
                no_data,
            },
        )
    }

    fn from_parts(data: Vec<f32>, header: RasterHeader) -> Result<Self> {
        if header.width == 0 || header.height == 0 {
            return Err(DemError::InvalidRaster("raster has no pixels".to_string()));
        }
        let expected = header.width as usize * header.height as usize;
        if data.len() != expected {
            return Err(DemError::InvalidRaster(format!(
                "expected {} samples for {}x{}, got {}",
                expected,
                header.width,
                header.height,
                data.len()
            )));
        }
        Ok(Self { data, header })
    }

    /// Georeferencing of this raster.
    pub fn header(&self) -> &RasterHeader {
        &self.header
    }

    /// Geographic bounds.
    pub fn extent(&self) -> GeographicExtent {
        self.header.extent
    }

    /// Sample the elevation at a coordinate.
    ///
    /// Returns `None` outside the raster or when the nearest pixel is no-data.
    /// Bilinear interpolation ignores no-data neighbors and re-weights the rest.
    pub fn sample(&self, lon: f64, lat: f64, interpolation: Interpolation) -> Option<f64> {
        if !self.header.extent.contains(lon, lat) {
            return None;
        }
        let (fx, fy) = self.pixel_coords(lon, lat);
        let nearest = self.pixel(fx.round() as u32, fy.round() as u32)?;

        match interpolation {
            Interpolation::Nearest => Some(f64::from(nearest)),
            Interpolation::Bilinear => {
                let x0 = fx.floor() as u32;
                let y0 = fy.floor() as u32;
                let x1 = (x0 + 1).min(self.header.width - 1);
                let y1 = (y0 + 1).min(self.header.height - 1);
                let tx = fx - f64::from(x0);
                let ty = fy - f64::from(y0);

                let taps = [
                    (x0, y0, (1.0 - tx) * (1.0 - ty)),
                    (x1, y0, tx * (1.0 - ty)),
                    (x0, y1, (1.0 - tx) * ty),
                    (x1, y1, tx * ty),
                ];
                let mut sum = 0.0;
                let mut weight = 0.0;
                for (x, y, w) in taps {
                    if let Some(v) = self.pixel(x, y) {
                        sum += f64::from(v) * w;
                        weight += w;
                    }
                }
                if weight > f64::EPSILON {
                    Some(sum / weight)
                } else {
                    Some(f64::from(nearest))
                }
            }
        }
    }

    /// Fractional pixel coordinates of a point, clamped to the pixel-center grid.
    fn pixel_coords(&self, lon: f64, lat: f64) -> (f64, f64) {
        let (dx, dy) = self.header.pixel_size_degrees();
        let fx = (lon - self.header.extent.min_lon) / dx - 0.5;
        let fy = (self.header.extent.max_lat - lat) / dy - 0.5;
        (
            fx.clamp(0.0, f64::from(self.header.width - 1)),
            fy.clamp(0.0, f64::from(self.header.height - 1)),
        )
    }

    /// Pixel value, or `None` for no-data.
    fn pixel(&self, x: u32, y: u32) -> Option<f32> {
        let idx = y as usize * self.header.width as usize + x as usize;
        let value = *self.data.get(idx)?;
        if value.is_nan() {
            return None;
        }
        if let Some(no_data) = self.header.no_data {
            if (value - no_data).abs() < NO_DATA_TOLERANCE {
                return None;
            }
        }
        Some(value)
    }
}

fn open_decoder(path: &Path) -> Result<Decoder<std::io::BufReader<std::fs::File>>> {
    let file = std::fs::File::open(path)?;
    let decoder = Decoder::new(std::io::BufReader::new(file))?;

    // Normalized rasters can be large; allow up to 1 GB of decoded samples
    let mut limits = Limits::default();
    limits.decoding_buffer_size = 1024 * 1024 * 1024;
    limits.intermediate_buffer_size = 1024 * 1024 * 1024;
    limits.ifd_value_size = 1024 * 1024 * 1024;
    Ok(decoder.with_limits(limits))
}

/// Read dimensions, geotransform and no-data value from GeoTIFF tags.
fn read_header<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    path: &Path,
) -> Result<RasterHeader> {
    let (width, height) = decoder.dimensions()?;
    let invalid = |reason: &str| DemError::InvalidGeoTiff {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };

    let tiepoint = decoder
        .get_tag_f64_vec(Tag::Unknown(TAG_MODEL_TIEPOINT))
        .map_err(|_| invalid("missing ModelTiepoint tag"))?;
    let scale = decoder
        .get_tag_f64_vec(Tag::Unknown(TAG_MODEL_PIXEL_SCALE))
        .map_err(|_| invalid("missing ModelPixelScale tag"))?;
    if tiepoint.len() < 6 || scale.len() < 2 {
        return Err(invalid("truncated georeferencing tags"));
    }

    // Tiepoint: [i, j, k, x, y, z], pixel (i, j) maps to (x, y)
    let (tie_i, tie_j) = (tiepoint[0], tiepoint[1]);
    let (scale_x, scale_y) = (scale[0], scale[1]);
    if scale_x <= 0.0 || scale_y <= 0.0 {
        return Err(invalid("non-positive pixel scale"));
    }
    let min_lon = tiepoint[3] - tie_i * scale_x;
    let max_lat = tiepoint[4] + tie_j * scale_y;
    let extent = GeographicExtent::new(
        min_lon,
        min_lon + f64::from(width) * scale_x,
        max_lat - f64::from(height) * scale_y,
        max_lat,
    )
    .map_err(|e| invalid(&e.to_string()))?;

    let no_data = decoder
        .get_tag_ascii_string(Tag::Unknown(TAG_GDAL_NODATA))
        .ok()
        .and_then(|s| s.trim().trim_end_matches('\0').parse().ok());

    Ok(RasterHeader {
        width,
        height,
        extent,
        no_data,
    })
}

/// Decode elevation samples of any integer or float layout to `f32`.
fn decode_elevation_data<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<Vec<f32>> {
    let result = decoder.read_image()?;

    match result {
        DecodingResult::F32(data) => Ok(data),
        DecodingResult::F64(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I16(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I32(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U16(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U32(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U8(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I8(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::U64(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
        DecodingResult::I64(data) => Ok(data.into_iter().map(|v| v as f32).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp() -> Raster {
        // 4x2 pixels over lon 0..4, lat 0..2; value = 10 * column + row
        let extent = GeographicExtent::new(0.0, 4.0, 0.0, 2.0).unwrap();
        let data = (0..2)
            .flat_map(|row| (0..4).map(move |col| (10 * col + row) as f32))
            .collect();
        Raster::from_grid(extent, 4, 2, data, Some(-9999.0)).unwrap()
    }

    #[test]
    fn test_from_grid_checks_size() {
        let extent = GeographicExtent::new(0.0, 1.0, 0.0, 1.0).unwrap();
        assert!(Raster::from_grid(extent, 2, 2, vec![0.0; 3], None).is_err());
        assert!(Raster::from_grid(extent, 0, 2, vec![], None).is_err());
    }

    #[test]
    fn test_nearest_and_bilinear() {
        let r = ramp();
        // Center of pixel (col 1, row 0) is (1.5, 1.5)
        assert_eq!(r.sample(1.5, 1.5, Interpolation::Nearest), Some(10.0));
        assert_relative_eq!(r.sample(1.5, 1.5, Interpolation::Bilinear).unwrap(), 10.0);
        // Halfway between columns 1 and 2 on row 0
        assert_relative_eq!(r.sample(2.0, 1.5, Interpolation::Bilinear).unwrap(), 15.0);
        // Between rows
        assert_relative_eq!(r.sample(1.5, 1.0, Interpolation::Bilinear).unwrap(), 10.5);
        assert!(r.sample(5.0, 1.0, Interpolation::Bilinear).is_none());
    }

    #[test]
    fn test_no_data_nearest_is_reported() {
        let extent = GeographicExtent::new(0.0, 2.0, 0.0, 1.0).unwrap();
        let r = Raster::from_grid(extent, 2, 1, vec![-9999.0, 50.0], Some(-9999.0)).unwrap();
        // Nearest pixel is no-data
        assert!(r.sample(0.4, 0.5, Interpolation::Bilinear).is_none());
        // Nearest pixel is valid, the no-data neighbor is ignored
        assert_relative_eq!(r.sample(1.1, 0.5, Interpolation::Bilinear).unwrap(), 50.0);
    }

    #[test]
    fn test_pixel_size_meters() {
        let extent = GeographicExtent::new(0.0, 1.0, -0.5, 0.5).unwrap();
        let r = Raster::from_grid(extent, 10, 10, vec![0.0; 100], None).unwrap();
        let (mx, my) = r.header().pixel_size_meters();
        assert_relative_eq!(mx, METERS_PER_DEGREE / 10.0, max_relative = 1e-9);
        assert_relative_eq!(my, METERS_PER_DEGREE / 10.0, max_relative = 1e-9);
    }
}
