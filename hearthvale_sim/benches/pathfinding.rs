// Benchmarks for A* search and the bulk surface recompute.
//
// Run with: cargo bench -p hearthvale_sim
//
// The terrain is a deterministic rolling heightfield (no RNG) so numbers are
// comparable between runs. Each size is benched crossing the map corner to
// corner, plus one search that fails after exhausting its budget.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use hearthvale_sim::grid::VoxelGrid;
use hearthvale_sim::nav::ConnectionRegistry;
use hearthvale_sim::pathfinding::Pathfinder;
use hearthvale_sim::types::{CellKind, VoxelCoord, WorldPos};

/// Ground height at column (x, z); stays within one step of its neighbours.
fn height_at(x: i32, z: i32) -> i32 {
    let ridge = (x / 6) % 6;
    let ridge = if ridge <= 3 { ridge } else { 6 - ridge };
    ridge + (z / 5) % 2
}

fn build_terrain(side: u32) -> VoxelGrid {
    let mut grid = VoxelGrid::new(VoxelCoord::new(0, 0, 0), side, 16, side);
    let columns = (0..side as i32).flat_map(|x| (0..side as i32).map(move |z| (x, z)));
    let cells = columns
        .flat_map(|(x, z)| (0..=height_at(x, z)).map(move |y| VoxelCoord::new(x, y, z)))
        .map(|coord| (coord, CellKind::Solid));
    grid.load_terrain(cells);
    grid
}

fn stance(x: i32, z: i32) -> WorldPos {
    VoxelCoord::new(x, height_at(x, z) + 1, z).center()
}

fn bench_find_path(c: &mut Criterion) {
    let mut group = c.benchmark_group("find_path");
    let connections = ConnectionRegistry::new();

    for side in [32u32, 64, 128] {
        let grid = build_terrain(side);
        let pathfinder = Pathfinder {
            max_iterations: side * side,
            ..Pathfinder::default()
        };
        let far = side as i32 - 1;
        let start = stance(0, 0);
        let goal = stance(far, far);

        let id = BenchmarkId::new("corner_to_corner", side);
        group.bench_with_input(id, &side, |b, _| {
            b.iter(|| {
                let (from, to) = (black_box(start), black_box(goal));
                let path = pathfinder.find_path(&grid, &connections, from, to);
                black_box(path.map(|p| p.len()))
            });
        });
    }

    // Goal on a floating platform: the search runs out its expansion budget.
    let mut grid = build_terrain(64);
    let goal = VoxelCoord::new(40, 12, 40).center();
    grid.fill_box(
        VoxelCoord::new(38, 11, 38),
        VoxelCoord::new(42, 11, 42),
        CellKind::Solid,
    );
    let pathfinder = Pathfinder::default();
    let start = stance(0, 0);
    group.bench_function("exhausted_64", |b| {
        b.iter(|| black_box(pathfinder.find_path(&grid, &connections, black_box(start), goal)));
    });

    group.finish();
}

fn bench_recompute(c: &mut Criterion) {
    let mut group = c.benchmark_group("recompute_all");
    for side in [64u32, 128] {
        let mut grid = build_terrain(side);
        group.bench_with_input(BenchmarkId::from_parameter(side), &side, |b, _| {
            b.iter(|| grid.recompute_all());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_find_path, bench_recompute);
criterion_main!(benches);
