//! Integration tests for GeoTIFF discovery and sampling.

use approx::assert_relative_eq;
use qmtile_dem::{
    DemError, ElevationSampler, ElevationSourceIndex, IndexOptions, Raster, RasterHeader,
    SourceOrigin, TileRaster,
};
use qmtile_geo::TileIndices;
use std::fs::File;
use std::path::Path;
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;

/// Write a float GeoTIFF whose north-west corner is `(west, north)`.
fn write_geotiff(
    path: &Path,
    west: f64,
    north: f64,
    pixel: f64,
    width: u32,
    height: u32,
    value: impl Fn(u32, u32) -> f32,
    no_data: Option<&str>,
) {
    let data: Vec<f32> = (0..height)
        .flat_map(|row| (0..width).map(move |col| (row, col)))
        .map(|(row, col)| value(col, row))
        .collect();

    let file = File::create(path).unwrap();
    let mut encoder = TiffEncoder::new(file).unwrap();
    let mut image = encoder
        .new_image::<colortype::Gray32Float>(width, height)
        .unwrap();
    image
        .encoder()
        .write_tag(Tag::Unknown(33550), &[pixel, pixel, 0.0][..])
        .unwrap();
    image
        .encoder()
        .write_tag(Tag::Unknown(33922), &[0.0, 0.0, 0.0, west, north, 0.0][..])
        .unwrap();
    if let Some(no_data) = no_data {
        image
            .encoder()
            .write_tag(Tag::Unknown(42113), no_data)
            .unwrap();
    }
    image.write_data(&data).unwrap();
}

#[test]
fn test_geotiff_header_and_sampling() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ramp.tif");
    write_geotiff(&path, 10.0, 50.0, 0.5, 4, 4, |col, _| col as f32 * 100.0, Some("-32768"));

    let header = RasterHeader::read(&path).unwrap();
    assert_eq!((header.width, header.height), (4, 4));
    assert_relative_eq!(header.extent.min_lon, 10.0);
    assert_relative_eq!(header.extent.max_lon, 12.0);
    assert_relative_eq!(header.extent.min_lat, 48.0);
    assert_relative_eq!(header.extent.max_lat, 50.0);
    assert_eq!(header.no_data, Some(-32768.0));

    let raster = Raster::from_file(&path, None).unwrap();
    // Center of column 2
    let v = raster
        .sample(11.25, 49.0, qmtile_dem::Interpolation::Nearest)
        .unwrap();
    assert_relative_eq!(v, 200.0);
}

#[test]
fn test_build_discovers_nested_folders_and_skips_bad_files() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    std::fs::create_dir_all(&nested).unwrap();

    write_geotiff(&dir.path().join("coarse.tif"), 0.0, 2.0, 1.0, 2, 2, |_, _| 20.0, None);
    write_geotiff(&nested.join("fine.TIFF"), 0.0, 1.0, 0.25, 4, 4, |_, _| 10.0, None);
    std::fs::write(dir.path().join("broken.tif"), b"not a tiff").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"ignored").unwrap();

    let index = ElevationSourceIndex::build(&[dir.path()], IndexOptions::default()).unwrap();
    assert_eq!(index.sources().len(), 2);
    assert!(index
        .sources()
        .iter()
        .all(|s| matches!(s.origin(), SourceOrigin::File(_))));

    // Finer source wins where both cover the point
    assert_relative_eq!(index.sample(0.5, 0.5).unwrap(), 10.0);
    assert_relative_eq!(index.sample(1.5, 1.5).unwrap(), 20.0);
    assert!(index.cache().len() <= 2);

    index.release_rasters();
    assert!(index.cache().is_empty());
    assert_relative_eq!(index.sample(0.5, 0.5).unwrap(), 10.0);
}

#[test]
fn test_only_bad_files_is_no_sources() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("broken.tif"), b"garbage").unwrap();
    let result = ElevationSourceIndex::build(&[dir.path()], IndexOptions::default());
    assert!(matches!(result, Err(DemError::NoSources)));
}

#[test]
fn test_source_deleted_after_indexing_is_degraded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("gone.tif");
    write_geotiff(&path, 0.0, 1.0, 0.5, 2, 2, |_, _| 5.0, None);

    let index = ElevationSourceIndex::build(&[dir.path()], IndexOptions::default()).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert!(index.sample(0.5, 0.5).is_none());
    assert_eq!(index.degraded_sources().len(), 1);
}

#[test]
fn test_tile_raster_from_index() {
    let dir = tempfile::tempdir().unwrap();
    write_geotiff(&dir.path().join("flat.tif"), -180.0, 90.0, 45.0, 8, 4, |_, _| 100.0, None);
    let index = ElevationSourceIndex::build(&[dir.path()], IndexOptions::default()).unwrap();

    let tile = TileIndices::new(0, 0, 0).unwrap();
    let raster = TileRaster::materialize(tile, 9, &index).unwrap();
    for j in 0..9 {
        for i in 0..9 {
            assert_relative_eq!(raster.value(i, j).unwrap(), 100.0, max_relative = 1e-9);
        }
    }
}
