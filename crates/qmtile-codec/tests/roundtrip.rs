//! Encode, write, read and decode meshes and compare them with the input.

use approx::assert_abs_diff_eq;
use qmtile_codec::{decode, encode, read_terrain, write_terrain, QUANTIZED_MAX};
use qmtile_geo::{GeographicExtent, TileIndices};
use qmtile_mesh::{HalfEdgeMesh, TileMeshBuilder};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seed a tile and split random triangles at random interior points of their
/// longest edges.
fn random_mesh(tile: TileIndices, splits: usize, seed: u64) -> HalfEdgeMesh {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut mesh = TileMeshBuilder::seed(
        tile,
        [
            rng.gen_range(-400.0..4000.0),
            rng.gen_range(-400.0..4000.0),
            rng.gen_range(-400.0..4000.0),
            rng.gen_range(-400.0..4000.0),
        ],
    );
    for _ in 0..splits {
        let triangles: Vec<_> = mesh.triangle_ids().collect();
        let t = triangles[rng.gen_range(0..triangles.len())];
        let he = mesh.longest_edge(t);
        let (lon, lat) = mesh.edge_midpoint(he);
        mesh.split_edge(he, lon, lat, rng.gen_range(-400.0..4000.0))
            .unwrap();
    }
    mesh
}

fn half_steps(extent: &GeographicExtent, min: f32, max: f32) -> (f64, f64, f64) {
    let steps = f64::from(QUANTIZED_MAX);
    (
        extent.width() / steps / 2.0 + 1e-12,
        extent.height() / steps / 2.0 + 1e-12,
        (f64::from(max) - f64::from(min)) / steps / 2.0 + 1e-6,
    )
}

#[test]
fn test_roundtrip_error_within_half_step() {
    for (seed, tile) in [
        (1, TileIndices::new(0, 1, 0).unwrap()),
        (2, TileIndices::new(5, 40, 17).unwrap()),
        (3, TileIndices::new(12, 6000, 2900).unwrap()),
    ] {
        let extent = tile.extent();
        let mesh = random_mesh(tile, 60, seed);
        let quantized = encode(&mesh, &extent, true).unwrap();
        let bytes = write_terrain(&quantized).unwrap();
        let read = read_terrain(&bytes).unwrap();
        assert_eq!(read, quantized);

        let decoded = decode(&read, &extent, tile).unwrap();
        decoded.validate().unwrap();
        assert_eq!(decoded.triangle_count(), mesh.triangle_count());
        assert_eq!(decoded.vertex_count(), mesh.vertex_count());

        let (du, dv, dh) = half_steps(&extent, read.header.min_height, read.header.max_height);
        // Triangles keep their order and their vertex order.
        for (original, restored) in mesh.triangle_ids().zip(decoded.triangle_ids()) {
            for (a, b) in mesh
                .triangle_vertices(original)
                .into_iter()
                .zip(decoded.triangle_vertices(restored))
            {
                let a = mesh.vertex(a);
                let b = decoded.vertex(b);
                assert_abs_diff_eq!(a.lon, b.lon, epsilon = du);
                assert_abs_diff_eq!(a.lat, b.lat, epsilon = dv);
                assert_abs_diff_eq!(a.height, b.height, epsilon = dh);
            }
        }
    }
}

#[test]
fn test_flat_root_tile() {
    let tile = TileIndices::new(0, 0, 0).unwrap();
    let mesh = TileMeshBuilder::seed(tile, [100.0; 4]);
    let quantized = encode(&mesh, &tile.extent(), false).unwrap();
    let read = read_terrain(&write_terrain(&quantized).unwrap()).unwrap();

    assert_eq!(read.triangle_count(), 2);
    assert_eq!(read.vertex_count(), 4);
    assert_eq!(read.header.min_height, 100.0);
    assert_eq!(read.header.max_height, 100.0);
    for edge in [&read.west, &read.south, &read.east, &read.north] {
        assert_eq!(edge.len(), 2);
    }
}

#[test]
fn test_neighbors_share_seam_positions() {
    let west = TileIndices::new(6, 30, 20).unwrap();
    let east = TileIndices::new(6, 31, 20).unwrap();
    let shared = |lat: f64| 100.0 + lat * 3.0;
    let we = west.extent();
    let west_mesh = TileMeshBuilder::seed(
        west,
        [0.0, shared(we.min_lat), shared(we.max_lat), 0.0],
    );
    let east_mesh = TileMeshBuilder::seed(
        east,
        [shared(we.min_lat), 900.0, 900.0, shared(we.max_lat)],
    );

    let wq = encode(&west_mesh, &we, false).unwrap();
    let eq = encode(&east_mesh, &east.extent(), false).unwrap();
    let wp = wq.positions(&we);
    let ep = eq.positions(&east.extent());

    let west_seam: Vec<(f64, f64)> = wq.east.iter().map(|&i| (wp[i as usize].0, wp[i as usize].1)).collect();
    let east_seam: Vec<(f64, f64)> = eq.west.iter().map(|&i| (ep[i as usize].0, ep[i as usize].1)).collect();
    assert_eq!(west_seam, east_seam);
}
