//! Cartesian hole maps built from wall geometry.
//!
//! A hole map covers the padded bounding box of one body's wall patches with
//! a voxel grid. Voxels touched by a wall patch are [`Voxel::Wall`]; a
//! 6-connected flood fill from the map boundary marks [`Voxel::Outside`]; the
//! rest is [`Voxel::Inside`]. Points in inside voxels are cut.

use crate::geometry::Aabb;
use crate::registry::{Grid, GridTag};
use std::collections::VecDeque;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Voxel {
    Outside,
    Wall,
    Inside,
}

/// Voxel map of the region enclosed by one body's walls.
#[derive(Clone, Debug, PartialEq)]
pub struct HoleMap {
    tag: GridTag,
    origin: [f64; 3],
    spacing: [f64; 3],
    dims: [usize; 3],
    voxels: Vec<Voxel>,
}

impl HoleMap {
    /// Build the map for body `tag` from its wall patch boxes. Returns `None`
    /// when there are no patches.
    pub fn build(tag: GridTag, patches: &[Aabb], max_cells: usize) -> Option<Self> {
        let bounds = patches.iter().fold(Aabb::empty(), |acc, p| acc.union(p));
        if bounds.is_empty() {
            return None;
        }
        let extent = bounds.extent();
        let mut ds = patches
            .iter()
            .flat_map(|p| p.extent())
            .fold(0.0_f64, f64::max);
        if ds <= 0.0 {
            ds = extent.iter().copied().fold(0.0_f64, f64::max) / max_cells.max(3) as f64;
        }
        if ds <= 0.0 {
            return None;
        }
        let max_cells = max_cells.max(3);
        let mut dims = [0usize; 3];
        let mut spacing = [ds; 3];
        let mut origin = [0.0; 3];
        for d in 0..3 {
            let interior = ((extent[d] / ds).ceil() as usize).max(1);
            if interior + 2 > max_cells {
                dims[d] = max_cells;
                spacing[d] = (extent[d] / (max_cells - 2) as f64).max(f64::MIN_POSITIVE);
            } else {
                dims[d] = interior + 2;
            }
            origin[d] = bounds.min[d] - spacing[d];
        }
        let mut map = HoleMap {
            tag,
            origin,
            spacing,
            dims,
            voxels: vec![Voxel::Outside; dims[0] * dims[1] * dims[2]],
        };
        for p in patches {
            map.mark_wall(p);
        }
        map.flood_fill();
        Some(map)
    }

    pub fn tag(&self) -> GridTag {
        self.tag
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    #[inline]
    fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.dims[0] * (j + self.dims[1] * k)
    }

    fn axis_index(&self, d: usize, x: f64) -> Option<usize> {
        let f = ((x - self.origin[d]) / self.spacing[d]).floor();
        if f < 0.0 || f >= self.dims[d] as f64 {
            None
        } else {
            Some(f as usize)
        }
    }

    fn clamped_axis_index(&self, d: usize, x: f64) -> usize {
        let f = ((x - self.origin[d]) / self.spacing[d]).floor();
        f.clamp(0.0, (self.dims[d] - 1) as f64) as usize
    }

    fn mark_wall(&mut self, patch: &Aabb) {
        let mut lo = [0usize; 3];
        let mut hi = [0usize; 3];
        for d in 0..3 {
            // Shrink slightly so a patch lying on a voxel face claims one side only.
            let shrink = (1e-6 * self.spacing[d]).min(0.5 * (patch.max[d] - patch.min[d]));
            lo[d] = self.clamped_axis_index(d, patch.min[d] + shrink);
            hi[d] = self.clamped_axis_index(d, patch.max[d] - shrink);
        }
        for k in lo[2]..=hi[2] {
            for j in lo[1]..=hi[1] {
                for i in lo[0]..=hi[0] {
                    let idx = self.index(i, j, k);
                    self.voxels[idx] = Voxel::Wall;
                }
            }
        }
    }

    fn flood_fill(&mut self) {
        let [nx, ny, nz] = self.dims;
        let mut reached = vec![false; self.voxels.len()];
        let mut queue = VecDeque::new();
        for k in 0..nz {
            for j in 0..ny {
                for i in 0..nx {
                    let on_boundary =
                        i == 0 || j == 0 || k == 0 || i == nx - 1 || j == ny - 1 || k == nz - 1;
                    let idx = self.index(i, j, k);
                    if on_boundary && self.voxels[idx] != Voxel::Wall {
                        reached[idx] = true;
                        queue.push_back((i, j, k));
                    }
                }
            }
        }
        while let Some((i, j, k)) = queue.pop_front() {
            let neighbours = [
                (i.wrapping_sub(1), j, k),
                (i + 1, j, k),
                (i, j.wrapping_sub(1), k),
                (i, j + 1, k),
                (i, j, k.wrapping_sub(1)),
                (i, j, k + 1),
            ];
            for (a, b, c) in neighbours {
                if a >= nx || b >= ny || c >= nz {
                    continue;
                }
                let idx = self.index(a, b, c);
                if !reached[idx] && self.voxels[idx] != Voxel::Wall {
                    reached[idx] = true;
                    queue.push_back((a, b, c));
                }
            }
        }
        for (v, r) in self.voxels.iter_mut().zip(reached) {
            if *v != Voxel::Wall {
                *v = if r { Voxel::Outside } else { Voxel::Inside };
            }
        }
    }

    /// Voxel state at `p`; points outside the map are [`Voxel::Outside`].
    pub fn voxel_at(&self, p: &[f64; 3]) -> Voxel {
        match (
            self.axis_index(0, p[0]),
            self.axis_index(1, p[1]),
            self.axis_index(2, p[2]),
        ) {
            (Some(i), Some(j), Some(k)) => self.voxels[self.index(i, j, k)],
            _ => Voxel::Outside,
        }
    }

    /// Whether `p` lies in the enclosed region (not on the wall itself).
    #[inline]
    pub fn cuts(&self, p: &[f64; 3]) -> bool {
        self.voxel_at(p) == Voxel::Inside
    }

    pub fn inside_count(&self) -> usize {
        self.voxels.iter().filter(|&&v| v == Voxel::Inside).count()
    }
}

/// Wall patch boxes of a grid: registered wall faces when face data is
/// present, otherwise the wall nodes of every cell touching the wall with at
/// least three nodes.
pub fn wall_patches(grid: &Grid) -> Vec<Aabb> {
    if let Some(faces) = grid.faces() {
        if !faces.wall_faces.is_empty() {
            return faces
                .wall_faces
                .iter()
                .map(|&f| Aabb::from_points(faces.face_nodes(f).iter().map(|&n| &grid.nodes()[n])))
                .collect();
        }
    }
    if grid.wall_nodes().is_empty() {
        return Vec::new();
    }
    let mut is_wall = vec![false; grid.nnodes()];
    for &n in grid.wall_nodes() {
        is_wall[n] = true;
    }
    (0..grid.ncells())
        .filter_map(|c| {
            let wall: Vec<usize> = grid
                .cell_nodes(c)
                .iter()
                .copied()
                .filter(|&n| is_wall[n])
                .collect();
            (wall.len() >= 3).then(|| Aabb::from_points(wall.iter().map(|&n| &grid.nodes()[n])))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The six faces of `[lo, hi]^3`, each split into `n x n` patches.
    fn cube_patches(lo: f64, hi: f64, n: usize) -> Vec<Aabb> {
        let h = (hi - lo) / n as f64;
        let mut out = Vec::new();
        for a in 0..n {
            for b in 0..n {
                let (u0, u1) = (lo + a as f64 * h, lo + (a + 1) as f64 * h);
                let (v0, v1) = (lo + b as f64 * h, lo + (b + 1) as f64 * h);
                for plane in [lo, hi] {
                    out.push(Aabb::new([plane, u0, v0], [plane, u1, v1]));
                    out.push(Aabb::new([u0, plane, v0], [u1, plane, v1]));
                    out.push(Aabb::new([u0, v0, plane], [u1, v1, plane]));
                }
            }
        }
        out
    }

    #[test]
    fn closed_cube_encloses_its_centre() {
        let map = HoleMap::build(GridTag(1), &cube_patches(0.0, 4.0, 4), 64).unwrap();
        assert!(map.inside_count() > 0);
        assert!(map.cuts(&[2.0, 2.0, 2.0]));
        assert!(!map.cuts(&[5.0, 2.0, 2.0]));
        assert!(!map.cuts(&[-3.0, 2.0, 2.0]));
    }

    #[test]
    fn open_surface_encloses_nothing() {
        let mut patches = cube_patches(0.0, 4.0, 4);
        // Drop every patch on the x = 4 face.
        patches.retain(|p| !(p.min[0] == 4.0 && p.max[0] == 4.0));
        let map = HoleMap::build(GridTag(1), &patches, 64).unwrap();
        assert_eq!(map.inside_count(), 0);
        assert!(!map.cuts(&[2.0, 2.0, 2.0]));
    }

    #[test]
    fn resolution_is_capped() {
        let map = HoleMap::build(GridTag(0), &cube_patches(0.0, 100.0, 100), 16).unwrap();
        assert!(map.dims().iter().all(|&n| n <= 16));
        assert!(map.cuts(&[50.0, 50.0, 50.0]));
    }

    #[test]
    fn no_patches_no_map() {
        assert!(HoleMap::build(GridTag(0), &[], 64).is_none());
    }
}
