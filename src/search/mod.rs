//! Spatial acceleration for donor candidate queries.

pub mod adt;

pub use adt::Adt;

use crate::geometry::Aabb;
use crate::registry::{GeometryRegistry, Grid, GridTag};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// A cell whose inflated bounding box contains a query point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellHit {
    pub grid: GridTag,
    pub cell: usize,
    pub bbox_volume: f64,
}

impl CellHit {
    /// Tie-break order: lower tag, then smaller box, then lower cell id.
    pub fn precedence(&self, other: &CellHit) -> Ordering {
        self.grid
            .cmp(&other.grid)
            .then(self.bbox_volume.total_cmp(&other.bbox_volume))
            .then(self.cell.cmp(&other.cell))
    }
}

fn cell_boxes(grid: &Grid, tolerance: f64) -> Vec<Aabb> {
    #[cfg(feature = "rayon")]
    {
        (0..grid.ncells())
            .into_par_iter()
            .map(|c| grid.cell_box(c).inflated(tolerance))
            .collect()
    }
    #[cfg(not(feature = "rayon"))]
    {
        (0..grid.ncells())
            .map(|c| grid.cell_box(c).inflated(tolerance))
            .collect()
    }
}

/// One alternating digital tree per registered grid.
#[derive(Clone, Debug, Default)]
pub struct SpatialIndex {
    trees: BTreeMap<GridTag, Adt>,
    tolerance: f64,
}

impl SpatialIndex {
    pub fn new(tolerance: f64) -> Self {
        Self {
            trees: BTreeMap::new(),
            tolerance,
        }
    }

    /// Build trees for every grid in the registry.
    pub fn build(registry: &GeometryRegistry, tolerance: f64) -> Self {
        let mut index = Self::new(tolerance);
        for grid in registry.grids() {
            index.insert_grid(grid);
        }
        index
    }

    pub fn insert_grid(&mut self, grid: &Grid) {
        let boxes = cell_boxes(grid, self.tolerance);
        log::debug!("spatial index: grid {} with {} cells", grid.tag(), boxes.len());
        self.trees.insert(grid.tag(), Adt::build(boxes));
    }

    /// Refresh boxes of a moved grid in place; rebuilds when the cell count
    /// changed.
    pub fn refresh_grid(&mut self, grid: &Grid) {
        let boxes = cell_boxes(grid, self.tolerance);
        let refreshed = self
            .trees
            .get_mut(&grid.tag())
            .is_some_and(|tree| tree.refresh(boxes.clone()));
        if !refreshed {
            self.trees.insert(grid.tag(), Adt::build(boxes));
        }
    }

    /// Bring the index in line with the registry: refresh `dirty` grids,
    /// insert new ones and drop grids no longer registered.
    pub fn sync(&mut self, registry: &GeometryRegistry, dirty: &BTreeSet<GridTag>) {
        self.trees.retain(|tag, _| registry.get(*tag).is_ok());
        for grid in registry.grids() {
            if !self.contains_grid(grid.tag()) {
                self.insert_grid(grid);
            } else if dirty.contains(&grid.tag()) {
                self.refresh_grid(grid);
            }
        }
    }

    pub fn contains_grid(&self, tag: GridTag) -> bool {
        self.trees.contains_key(&tag)
    }

    pub fn grid_bounds(&self, tag: GridTag) -> Option<Aabb> {
        self.trees.get(&tag).map(Adt::bounds)
    }

    /// Every cell, in any grid except `exclude`, whose inflated box contains
    /// `point`, in tie-break order.
    pub fn find_cells_containing(&self, point: &[f64; 3], exclude: Option<GridTag>) -> Vec<CellHit> {
        let mut hits = Vec::new();
        let mut scratch = Vec::new();
        for (&tag, tree) in &self.trees {
            if Some(tag) == exclude {
                continue;
            }
            scratch.clear();
            tree.query_point(point, &mut scratch);
            hits.extend(scratch.iter().map(|&cell| CellHit {
                grid: tag,
                cell,
                bbox_volume: tree.element_box(cell).volume(),
            }));
        }
        hits.sort_by(CellHit::precedence);
        hits
    }

    /// Cells of one grid whose inflated box contains `point`, in tie-break order.
    pub fn find_cells_in_grid(&self, tag: GridTag, point: &[f64; 3]) -> Vec<CellHit> {
        let Some(tree) = self.trees.get(&tag) else {
            return Vec::new();
        };
        let mut scratch = Vec::new();
        tree.query_point(point, &mut scratch);
        let mut hits: Vec<CellHit> = scratch
            .into_iter()
            .map(|cell| CellHit {
                grid: tag,
                cell,
                bbox_volume: tree.element_box(cell).volume(),
            })
            .collect();
        hits.sort_by(CellHit::precedence);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{CellBlockData, GridData};

    fn strip(tag: i32, x0: f64, n: usize) -> GridData {
        // A row of `n` unit hexes along x.
        let mut coords = Vec::new();
        for k in 0..2 {
            for j in 0..2 {
                for i in 0..=n {
                    coords.extend_from_slice(&[x0 + i as f64, j as f64, k as f64]);
                }
            }
        }
        let id = |i: usize, j: usize, k: usize| i + (n + 1) * (j + 2 * k);
        let mut conn = Vec::new();
        for i in 0..n {
            conn.extend_from_slice(&[
                id(i, 0, 0),
                id(i + 1, 0, 0),
                id(i + 1, 1, 0),
                id(i, 1, 0),
                id(i, 0, 1),
                id(i + 1, 0, 1),
                id(i + 1, 1, 1),
                id(i, 1, 1),
            ]);
        }
        GridData {
            tag,
            node_coords: coords,
            cell_blocks: vec![CellBlockData::new(8, conn)],
            ..GridData::default()
        }
    }

    #[test]
    fn hits_are_ordered_by_tag_then_cell() {
        let mut reg = GeometryRegistry::new();
        reg.register_grid(strip(5, 0.0, 4)).unwrap();
        reg.register_grid(strip(2, 0.5, 4)).unwrap();
        let index = SpatialIndex::build(&reg, 1e-9);
        let hits = index.find_cells_containing(&[2.0, 0.5, 0.5], None);
        let keys: Vec<(i32, usize)> = hits.iter().map(|h| (h.grid.0, h.cell)).collect();
        assert_eq!(keys, vec![(2, 1), (5, 1), (5, 2)]);

        let excluded = index.find_cells_containing(&[2.0, 0.5, 0.5], Some(GridTag(2)));
        assert!(excluded.iter().all(|h| h.grid == GridTag(5)));
    }

    #[test]
    fn sync_refreshes_moved_grid() {
        let mut reg = GeometryRegistry::new();
        let tag = reg.register_grid(strip(1, 0.0, 2)).unwrap();
        let mut index = SpatialIndex::build(&reg, 0.0);
        reg.take_dirty();
        reg.register_moving_grid_data(tag, crate::geometry::RigidMotion::translation([0.0, 5.0, 0.0]))
            .unwrap();
        reg.apply_rigid_motion(tag).unwrap();
        let dirty = reg.take_dirty();
        index.sync(&reg, &dirty);
        assert!(index.contains_grid(tag));
        assert!(!index.contains_grid(GridTag(7)));
        assert!(index.find_cells_containing(&[0.5, 0.5, 0.5], None).is_empty());
        assert_eq!(index.find_cells_in_grid(tag, &[0.5, 5.5, 0.5]).len(), 1);
        let b = index.grid_bounds(tag).unwrap();
        assert_eq!(b.min[1], 5.0);
    }

    #[test]
    fn refresh_rebuilds_when_cells_change() {
        let mut reg = GeometryRegistry::new();
        let tag = reg.register_grid(strip(1, 0.0, 2)).unwrap();
        let mut index = SpatialIndex::build(&reg, 0.0);
        reg.register_grid(strip(1, 0.0, 3)).unwrap();
        index.refresh_grid(reg.get(tag).unwrap());
        assert_eq!(index.find_cells_in_grid(tag, &[2.5, 0.5, 0.5]).len(), 1);
        assert_eq!(index.grid_bounds(tag).unwrap().max[0], 3.0);
    }
}
