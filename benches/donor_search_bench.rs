use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;

use mesh_overset::prelude::*;
use mesh_overset::search::SpatialIndex;

/// Box grid `[lo, lo + n*h]^3` of hexes.
fn box_grid(tag: i32, lo: f64, h: f64, n: usize, overset: bool) -> GridData {
    let id = |i: usize, j: usize, k: usize| i + (n + 1) * (j + (n + 1) * k);
    let mut coords = Vec::with_capacity(3 * (n + 1).pow(3));
    let mut over = Vec::new();
    for k in 0..=n {
        for j in 0..=n {
            for i in 0..=n {
                coords.extend_from_slice(&[lo + h * i as f64, lo + h * j as f64, lo + h * k as f64]);
                if overset && [i, j, k].iter().any(|&c| c == 0 || c == n) {
                    over.push(id(i, j, k));
                }
            }
        }
    }
    let mut conn = Vec::with_capacity(8 * n.pow(3));
    for k in 0..n {
        for j in 0..n {
            for i in 0..n {
                conn.extend_from_slice(&[
                    id(i, j, k),
                    id(i + 1, j, k),
                    id(i + 1, j + 1, k),
                    id(i, j + 1, k),
                    id(i, j, k + 1),
                    id(i + 1, j, k + 1),
                    id(i + 1, j + 1, k + 1),
                    id(i, j + 1, k + 1),
                ]);
            }
        }
    }
    GridData {
        tag,
        node_coords: coords,
        cell_blocks: vec![CellBlockData::new(8, conn)],
        wall_nodes: Vec::new(),
        over_nodes: over,
    }
}

fn bench_point_queries(c: &mut Criterion) {
    let mut group = c.benchmark_group("adt_point_query");
    for &n in &[8usize, 16, 32] {
        let mut registry = GeometryRegistry::new();
        registry
            .register_grid(box_grid(0, 0.0, 10.0 / n as f64, n, false))
            .expect("valid grid");
        let index = SpatialIndex::build(&registry, 1e-9);
        let mut rng = SmallRng::seed_from_u64(42);
        let points: Vec<[f64; 3]> = (0..1024)
            .map(|_| [rng.gen_range(0.0..10.0), rng.gen_range(0.0..10.0), rng.gen_range(0.0..10.0)])
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(n), &points, |b, pts| {
            b.iter(|| {
                let mut hits = 0;
                for p in pts {
                    hits += index.find_cells_containing(black_box(p), None).len();
                }
                hits
            })
        });
    }
    group.finish();
}

fn bench_full_connectivity(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_connectivity");
    group.sample_size(10);
    for &n in &[8usize, 16] {
        group.bench_function(BenchmarkId::from_parameter(n), |b| {
            b.iter(|| {
                let mut g = OversetGroup::init(0, OversetConfig::default()).expect("config");
                g.register_grid(box_grid(0, 0.0, 10.0 / n as f64, n, false))
                    .expect("background");
                g.register_grid(box_grid(1, 3.0, 4.0 / n as f64, n, true))
                    .expect("block");
                g.preprocess(&NoComm).expect("preprocess");
                g.perform_full_connectivity(&NoComm).expect("connectivity")
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_point_queries, bench_full_connectivity);
criterion_main!(benches);
