#![allow(dead_code)]
use mesh_overset::prelude::*;
use std::collections::BTreeMap;

/// Node index of `(i, j, k)` in a box grid with `n` cells per axis.
pub fn node_id(n: [usize; 3], i: usize, j: usize, k: usize) -> usize {
    i + (n[0] + 1) * (j + (n[1] + 1) * k)
}

/// Hex cells of a box grid, keeping only cells accepted by `keep`.
/// Unreferenced nodes are dropped and the rest renumbered in order.
pub fn hex_grid(
    tag: i32,
    lo: [f64; 3],
    h: f64,
    n: [usize; 3],
    keep: impl Fn(usize, usize, usize) -> bool,
) -> GridData {
    let mut conn = Vec::new();
    for k in 0..n[2] {
        for j in 0..n[1] {
            for i in 0..n[0] {
                if !keep(i, j, k) {
                    continue;
                }
                conn.extend_from_slice(&[
                    node_id(n, i, j, k),
                    node_id(n, i + 1, j, k),
                    node_id(n, i + 1, j + 1, k),
                    node_id(n, i, j + 1, k),
                    node_id(n, i, j, k + 1),
                    node_id(n, i + 1, j, k + 1),
                    node_id(n, i + 1, j + 1, k + 1),
                    node_id(n, i, j + 1, k + 1),
                ]);
            }
        }
    }
    let total = (n[0] + 1) * (n[1] + 1) * (n[2] + 1);
    let mut used = vec![false; total];
    for &v in &conn {
        used[v] = true;
    }
    let mut renumber = vec![usize::MAX; total];
    let mut coords = Vec::new();
    let mut next = 0;
    for k in 0..=n[2] {
        for j in 0..=n[1] {
            for i in 0..=n[0] {
                let id = node_id(n, i, j, k);
                if used[id] {
                    renumber[id] = next;
                    next += 1;
                    coords.extend_from_slice(&[
                        lo[0] + h * i as f64,
                        lo[1] + h * j as f64,
                        lo[2] + h * k as f64,
                    ]);
                }
            }
        }
    }
    GridData {
        tag,
        node_coords: coords,
        cell_blocks: vec![CellBlockData::new(
            8,
            conn.into_iter().map(|v| renumber[v]).collect(),
        )],
        wall_nodes: Vec::new(),
        over_nodes: Vec::new(),
    }
}

/// Nodes of `data` whose coordinates satisfy `pred`.
pub fn nodes_where(data: &GridData, pred: impl Fn([f64; 3]) -> bool) -> Vec<usize> {
    data.node_coords
        .chunks_exact(3)
        .enumerate()
        .filter(|(_, c)| pred([c[0], c[1], c[2]]))
        .map(|(i, _)| i)
        .collect()
}

fn on_box_surface(p: [f64; 3], lo: [f64; 3], hi: [f64; 3]) -> bool {
    let eps = 1e-12;
    (0..3).any(|d| (p[d] - lo[d]).abs() < eps || (p[d] - hi[d]).abs() < eps)
}

/// Full box grid; with `overset` its outer surface is the overset boundary.
pub fn box_grid(tag: i32, lo: [f64; 3], h: f64, n: [usize; 3], overset: bool) -> GridData {
    let mut data = hex_grid(tag, lo, h, n, |_, _, _| true);
    if overset {
        let hi = [
            lo[0] + h * n[0] as f64,
            lo[1] + h * n[1] as f64,
            lo[2] + h * n[2] as f64,
        ];
        data.over_nodes = nodes_where(&data, |p| on_box_surface(p, lo, hi));
    }
    data
}

/// Background grid `[0, 10]^3` with unit cells.
pub fn background() -> GridData {
    box_grid(0, [0.0; 3], 1.0, [10; 3], false)
}

/// Refined grid `[3, 7]^3` with half-unit cells and an overset outer surface.
pub fn inner_block() -> GridData {
    box_grid(1, [3.0; 3], 0.5, [8; 3], true)
}

/// Body-fitted shell `[3, 7]^3` minus `(4, 6)^3`: wall on the inner
/// surface, overset boundary on the outer one.
pub fn shell() -> GridData {
    let mut data = hex_grid(1, [3.0; 3], 0.5, [8; 3], |i, j, k| {
        !((2..6).contains(&i) && (2..6).contains(&j) && (2..6).contains(&k))
    });
    data.wall_nodes = nodes_where(&data, |p| p.iter().all(|&x| (4.0..=6.0).contains(&x)));
    data.over_nodes = nodes_where(&data, |p| on_box_surface(p, [3.0; 3], [7.0; 3]));
    data
}

/// `data` translated by `by`.
pub fn shifted(data: &GridData, by: [f64; 3]) -> Vec<f64> {
    data.node_coords
        .chunks_exact(3)
        .flat_map(|c| [c[0] + by[0], c[1] + by[1], c[2] + by[2]])
        .collect()
}

/// Node index of a grid point at `p`, if any.
pub fn find_node(data: &GridData, p: [f64; 3]) -> Option<usize> {
    data.node_coords.chunks_exact(3).position(|c| {
        (c[0] - p[0]).abs() < 1e-12 && (c[1] - p[1]).abs() < 1e-12 && (c[2] - p[2]).abs() < 1e-12
    })
}

pub fn linear(p: [f64; 3], field: usize) -> f64 {
    1.0 + field as f64 + 2.0 * p[0] - p[1] + 0.5 * p[2]
}

pub fn linear_gradient(dim: usize, field: usize) -> f64 {
    [2.0, -1.0, 0.5][dim] * (1.0 + field as f64)
}

/// Nodal solution and gradient buffers holding a linear field.
pub struct NodalField {
    pub nfields: usize,
    pub coords: BTreeMap<GridTag, Vec<[f64; 3]>>,
    pub q: BTreeMap<GridTag, Vec<f64>>,
    pub dq: BTreeMap<GridTag, Vec<f64>>,
}

impl NodalField {
    pub fn linear(grids: &[&GridData], nfields: usize) -> Self {
        let mut field = NodalField {
            nfields,
            coords: BTreeMap::new(),
            q: BTreeMap::new(),
            dq: BTreeMap::new(),
        };
        for g in grids {
            let xyz: Vec<[f64; 3]> = g
                .node_coords
                .chunks_exact(3)
                .map(|c| [c[0], c[1], c[2]])
                .collect();
            let q = xyz
                .iter()
                .flat_map(|&p| (0..nfields).map(move |f| linear(p, f)))
                .collect();
            let dq = (0..xyz.len())
                .flat_map(|_| (0..3).flat_map(move |d| (0..nfields).map(move |f| linear_gradient(d, f))))
                .collect();
            let tag = GridTag(g.tag);
            field.coords.insert(tag, xyz);
            field.q.insert(tag, q);
            field.dq.insert(tag, dq);
        }
        field
    }

    pub fn value(&self, grid: GridTag, node: usize, field: usize) -> f64 {
        self.q[&grid][node * self.nfields + field]
    }

    pub fn set(&mut self, grid: GridTag, node: usize, value: f64) {
        let nf = self.nfields;
        for f in 0..nf {
            self.q.get_mut(&grid).unwrap()[node * nf + f] = value;
        }
        for k in 0..3 * nf {
            self.dq.get_mut(&grid).unwrap()[node * 3 * nf + k] = value;
        }
    }

    pub fn gradient(&self, grid: GridTag, node: usize, dim: usize, field: usize) -> f64 {
        self.dq[&grid][(node * 3 + dim) * self.nfields + field]
    }

    pub fn exact(&self, grid: GridTag, node: usize, field: usize) -> f64 {
        linear(self.coords[&grid][node], field)
    }
}

impl FieldAccess for NodalField {
    fn q_node(&mut self, grid: GridTag, node: usize, field: usize) -> Option<&mut f64> {
        let nf = self.nfields;
        self.q.get_mut(&grid)?.get_mut(node * nf + field)
    }

    fn dq_node(&mut self, grid: GridTag, node: usize, dim: usize, field: usize) -> Option<&mut f64> {
        let nf = self.nfields;
        self.dq.get_mut(&grid)?.get_mut((node * 3 + dim) * nf + field)
    }
}

/// Register `grids` and run a first full connectivity pass on one rank.
pub fn connected(config: OversetConfig, grids: &[&GridData]) -> (OversetGroup, ConnectivityReport) {
    let mut group = OversetGroup::init(0, config).unwrap();
    for g in grids {
        group.register_grid((*g).clone()).unwrap();
    }
    group.preprocess(&NoComm).unwrap();
    let report = group.perform_full_connectivity(&NoComm).unwrap();
    (group, report)
}

pub fn count(status: &[IblankStatus], which: IblankStatus) -> usize {
    status.iter().filter(|&&s| s == which).count()
}
