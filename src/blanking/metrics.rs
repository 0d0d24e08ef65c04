//! Per-grid quantities used to decide which grid cuts which.

use crate::geometry::shape::cell_volume;
use crate::overset_error::OversetError;
use crate::registry::Grid;
use std::collections::VecDeque;

/// Depth of nodes that are not connected to any overset boundary node.
pub const UNBOUNDED_DEPTH: u32 = u32::MAX;

/// Cell volumes, node resolutions and overset-boundary depths of one grid.
#[derive(Clone, Debug, PartialEq)]
pub struct GridMetrics {
    pub cell_volumes: Vec<f64>,
    /// Mean volume of the cells incident to each node.
    pub node_resolution: Vec<f64>,
    /// Node-cell-node graph distance to the nearest overset boundary node.
    pub node_depth: Vec<u32>,
}

impl GridMetrics {
    pub fn compute(grid: &Grid) -> Result<Self, OversetError> {
        let cell_volumes = (0..grid.ncells())
            .map(|c| cell_volume(grid.cell_type(c), &grid.cell_vertices(c)))
            .collect::<Result<Vec<_>, _>>()?;

        let node_resolution = (0..grid.nnodes())
            .map(|n| {
                let cells = grid.node_cells(n);
                if cells.is_empty() {
                    f64::INFINITY
                } else {
                    cells.iter().map(|&c| cell_volumes[c]).sum::<f64>() / cells.len() as f64
                }
            })
            .collect();

        Ok(Self {
            cell_volumes,
            node_resolution,
            node_depth: node_depth(grid),
        })
    }

    /// Smallest depth among a cell's nodes.
    pub fn cell_depth(&self, grid: &Grid, cell: usize) -> u32 {
        grid.cell_nodes(cell)
            .iter()
            .map(|&n| self.node_depth[n])
            .min()
            .unwrap_or(UNBOUNDED_DEPTH)
    }
}

fn node_depth(grid: &Grid) -> Vec<u32> {
    let mut depth = vec![UNBOUNDED_DEPTH; grid.nnodes()];
    let mut queue = VecDeque::new();
    for &n in grid.over_nodes() {
        if depth[n] != 0 {
            depth[n] = 0;
            queue.push_back(n);
        }
    }
    while let Some(n) = queue.pop_front() {
        let next = depth[n] + 1;
        for &c in grid.node_cells(n) {
            for &m in grid.cell_nodes(c) {
                if depth[m] > next {
                    depth[m] = next;
                    queue.push_back(m);
                }
            }
        }
    }
    depth
}
