//! Geometry registry: per-grid coordinates, connectivity and boundary tags.
//!
//! The registry is the ground truth for every spatial query. Registration
//! validates index ranges only; geometric validity (orientation,
//! self-intersection) is the host's responsibility.

pub mod data;
pub mod grid;

pub use data::{CellBlockData, FaceBlockData, FaceData, FaceKind, GridData, GridType};
pub use grid::{FaceTopology, Grid};

use crate::geometry::RigidMotion;
use crate::overset_error::OversetError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Body tag identifying a grid across all ranks.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(transparent)]
pub struct GridTag(pub i32);

impl fmt::Display for GridTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for GridTag {
    fn from(v: i32) -> Self {
        GridTag(v)
    }
}

/// All grids registered on this rank, keyed by tag.
#[derive(Clone, Debug, Default)]
pub struct GeometryRegistry {
    grids: BTreeMap<GridTag, Grid>,
    dirty: BTreeSet<GridTag>,
}

impl GeometryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a grid. On error the previous registration for
    /// the tag, if any, is left untouched.
    pub fn register_grid(&mut self, data: GridData) -> Result<GridTag, OversetError> {
        let grid = Grid::from_data(data)?;
        let tag = grid.tag();
        if self.grids.insert(tag, grid).is_some() {
            log::debug!("grid {tag} re-registered; previous data replaced");
        }
        self.dirty.insert(tag);
        Ok(tag)
    }

    /// Attach face topology to a registered grid.
    pub fn register_face_data(&mut self, tag: GridTag, data: FaceData) -> Result<(), OversetError> {
        let grid = self
            .grids
            .get_mut(&tag)
            .ok_or(OversetError::UnknownGrid(tag))?;
        let mut staged = grid.clone();
        staged.set_faces(data)?;
        *grid = staged;
        self.dirty.insert(tag);
        Ok(())
    }

    /// Replace node coordinates of a deforming grid.
    pub fn update_coordinates(&mut self, tag: GridTag, coords: &[f64]) -> Result<(), OversetError> {
        self.grid_mut(tag)?.set_coordinates(coords)?;
        self.dirty.insert(tag);
        Ok(())
    }

    pub fn register_moving_grid_data(
        &mut self,
        tag: GridTag,
        motion: RigidMotion,
    ) -> Result<(), OversetError> {
        self.grid_mut(tag)?.set_motion(motion);
        Ok(())
    }

    /// Move a grid to its registered rigid position.
    pub fn apply_rigid_motion(&mut self, tag: GridTag) -> Result<(), OversetError> {
        if self.grid_mut(tag)?.apply_motion() {
            self.dirty.insert(tag);
        } else {
            log::debug!("grid {tag} has no motion data; coordinates unchanged");
        }
        Ok(())
    }

    pub fn get(&self, tag: GridTag) -> Result<&Grid, OversetError> {
        self.grids.get(&tag).ok_or(OversetError::UnknownGrid(tag))
    }

    fn grid_mut(&mut self, tag: GridTag) -> Result<&mut Grid, OversetError> {
        self.grids
            .get_mut(&tag)
            .ok_or(OversetError::UnknownGrid(tag))
    }

    pub fn grids(&self) -> impl Iterator<Item = &Grid> {
        self.grids.values()
    }

    pub fn tags(&self) -> impl Iterator<Item = GridTag> + '_ {
        self.grids.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }

    pub fn is_dirty(&self, tag: GridTag) -> bool {
        self.dirty.contains(&tag)
    }

    /// Tags whose geometry changed since the last call.
    pub fn take_dirty(&mut self) -> BTreeSet<GridTag> {
        std::mem::take(&mut self.dirty)
    }

    pub fn clear(&mut self) {
        self.grids.clear();
        self.dirty.clear();
    }
}
