use criterion::{black_box, criterion_group, criterion_main, Criterion};
use qmtile_codec::{decode, encode, read_terrain, write_terrain};
use qmtile_geo::TileIndices;
use qmtile_mesh::{HalfEdgeMesh, TileMeshBuilder};

fn refined_mesh(tile: TileIndices, splits: usize) -> HalfEdgeMesh {
    let mut mesh = TileMeshBuilder::seed(tile, [10.0, 250.0, 800.0, 40.0]);
    for i in 0..splits {
        let triangles: Vec<_> = mesh.triangle_ids().collect();
        let t = triangles[(i * 7919) % triangles.len()];
        let he = mesh.longest_edge(t);
        let (lon, lat) = mesh.edge_midpoint(he);
        mesh.split_edge(he, lon, lat, (lon * 13.0 + lat * 7.0).sin() * 500.0)
            .unwrap();
    }
    mesh
}

fn bench_encode(c: &mut Criterion) {
    let tile = TileIndices::new(8, 300, 140).unwrap();
    let mesh = refined_mesh(tile, 2000);
    let extent = tile.extent();
    c.bench_function("encode_write", |bencher| {
        bencher.iter(|| {
            let quantized = encode(black_box(&mesh), &extent, true).unwrap();
            black_box(write_terrain(&quantized).unwrap())
        })
    });
}

fn bench_decode(c: &mut Criterion) {
    let tile = TileIndices::new(8, 300, 140).unwrap();
    let mesh = refined_mesh(tile, 2000);
    let extent = tile.extent();
    let bytes = write_terrain(&encode(&mesh, &extent, true).unwrap()).unwrap();
    c.bench_function("read_decode", |bencher| {
        bencher.iter(|| {
            let quantized = read_terrain(black_box(&bytes)).unwrap();
            black_box(decode(&quantized, &extent, tile).unwrap())
        })
    });
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
