//! Donor search and weight computation on the donor side.

use super::callbacks::SolverCallbacks;
use super::record::{DonorDof, ReceptorId};
use crate::config::{InterpolationMode, OversetConfig};
use crate::geometry::shape::{InverseMapOptions, locate};
use crate::overset_error::OversetError;
use crate::registry::{GeometryRegistry, Grid, GridTag};
use crate::search::SpatialIndex;
use crate::topology::iblank::{GridBlanking, IblankStatus};
use std::collections::{BTreeMap, HashMap};

/// A confirmed donor cell with its interpolation stencil.
#[derive(Clone, Debug, PartialEq)]
pub struct DonorCandidate {
    pub grid: GridTag,
    pub cell: usize,
    pub bbox_volume: f64,
    pub dofs: Vec<DonorDof>,
    pub weights: Vec<f64>,
    pub modal: bool,
}

/// Finds donor cells among this rank's grids.
///
/// One engine lives for one connectivity pass; modal conversions are cached
/// for its lifetime.
pub struct DonorEngine<'a> {
    registry: &'a GeometryRegistry,
    index: &'a SpatialIndex,
    blanking: &'a BTreeMap<GridTag, GridBlanking>,
    config: &'a OversetConfig,
    callbacks: Option<&'a dyn SolverCallbacks>,
    inverse: InverseMapOptions,
    modal_cache: HashMap<(GridTag, usize), Vec<f64>>,
    modal_conversions: usize,
}

impl<'a> DonorEngine<'a> {
    pub fn new(
        registry: &'a GeometryRegistry,
        index: &'a SpatialIndex,
        blanking: &'a BTreeMap<GridTag, GridBlanking>,
        config: &'a OversetConfig,
        callbacks: Option<&'a dyn SolverCallbacks>,
    ) -> Result<Self, OversetError> {
        if config.mode == InterpolationMode::HighOrder && callbacks.is_none() {
            return Err(OversetError::MissingCallbacks("high-order donor search"));
        }
        Ok(Self {
            registry,
            index,
            blanking,
            config,
            callbacks,
            inverse: InverseMapOptions::from(config),
            modal_cache: HashMap::new(),
            modal_conversions: 0,
        })
    }

    /// Number of `convert_to_modal` calls made by this engine.
    pub fn modal_conversions(&self) -> usize {
        self.modal_conversions
    }

    /// A donor cell must be FIELD and must not touch a hole.
    pub fn is_eligible(&self, grid: &Grid, cell: usize) -> bool {
        let Some(blank) = self.blanking.get(&grid.tag()) else {
            return false;
        };
        blank.cells[cell] == IblankStatus::Field
            && grid
                .cell_nodes(cell)
                .iter()
                .all(|&n| !blank.nodes[n].is_hole())
    }

    /// First confirmed donor for a receptor point, scanning candidates in
    /// tie-break order.
    pub fn find_donor(
        &mut self,
        receptor_grid: GridTag,
        receptor: &ReceptorId,
        xyz: &[f64; 3],
    ) -> Result<Option<DonorCandidate>, OversetError> {
        let registry = self.registry;
        for hit in self.index.find_cells_containing(xyz, Some(receptor_grid)) {
            let grid = registry.get(hit.grid)?;
            if !self.is_eligible(grid, hit.cell) {
                continue;
            }
            let found = match self.config.mode {
                InterpolationMode::Nodal => self.nodal_stencil(grid, hit.cell, xyz),
                InterpolationMode::HighOrder => {
                    self.high_order_stencil(grid, hit.cell, receptor_grid, receptor, xyz)?
                }
            };
            if let Some((dofs, weights, modal)) = found {
                self.check_weights(hit.grid, &weights, modal)?;
                return Ok(Some(DonorCandidate {
                    grid: hit.grid,
                    cell: hit.cell,
                    bbox_volume: hit.bbox_volume,
                    dofs,
                    weights,
                    modal,
                }));
            }
        }
        Ok(None)
    }

    fn nodal_stencil(
        &self,
        grid: &Grid,
        cell: usize,
        xyz: &[f64; 3],
    ) -> Option<(Vec<DonorDof>, Vec<f64>, bool)> {
        let (_, weights) = locate(grid.cell_type(cell), &grid.cell_vertices(cell), xyz, &self.inverse)?;
        let dofs = grid
            .cell_nodes(cell)
            .iter()
            .map(|&n| DonorDof::Node(n))
            .collect();
        Some((dofs, weights, false))
    }

    fn high_order_stencil(
        &mut self,
        grid: &Grid,
        cell: usize,
        receptor_grid: GridTag,
        receptor: &ReceptorId,
        xyz: &[f64; 3],
    ) -> Result<Option<(Vec<DonorDof>, Vec<f64>, bool)>, OversetError> {
        let cb = self
            .callbacks
            .ok_or(OversetError::MissingCallbacks("high-order donor search"))?;
        let tag = grid.tag();
        let Some(rst) = cb
            .donor_inclusion_test(tag, cell, xyz)
            .map_err(|e| OversetError::callback(tag, "donor_inclusion_test", e))?
        else {
            return Ok(None);
        };
        let npts = cb.nodes_per_cell(tag, cell);
        if npts == 0 {
            return Err(OversetError::CallbackFailure {
                grid: tag,
                callback: "nodes_per_cell",
                reason: format!("donor cell {cell} reports no solution points"),
            });
        }
        let modal = cb.requires_modal(tag, receptor_grid, receptor);
        let mut weights = vec![0.0; npts];
        if modal && !self.modal_cache.contains_key(&(tag, cell)) {
            let data = cb
                .convert_to_modal(tag, cell)
                .map_err(|e| OversetError::callback(tag, "convert_to_modal", e))?;
            self.modal_conversions += 1;
            self.modal_cache.insert((tag, cell), data);
        }
        let conversion = if modal {
            self.modal_cache.get(&(tag, cell)).map(Vec::as_slice)
        } else {
            None
        };
        cb.donor_frac(tag, cell, &rst, conversion, &mut weights)
            .map_err(|e| OversetError::callback(tag, "donor_frac", e))?;
        let dofs = (0..npts)
            .map(|index| DonorDof::CellPoint { cell, index })
            .collect();
        Ok(Some((dofs, weights, modal)))
    }

    fn check_weights(&self, grid: GridTag, weights: &[f64], modal: bool) -> Result<(), OversetError> {
        if let Some(w) = weights.iter().find(|w| !w.is_finite()) {
            return Err(OversetError::CallbackFailure {
                grid,
                callback: "donor_frac",
                reason: format!("non-finite weight {w}"),
            });
        }
        let tol = self.config.weight_tolerance;
        if !modal {
            let sum: f64 = weights.iter().sum();
            if (sum - 1.0).abs() > tol {
                return Err(OversetError::CallbackFailure {
                    grid,
                    callback: "donor_frac",
                    reason: format!("weights sum to {sum}, expected 1"),
                });
            }
            if weights.iter().any(|&w| w < -tol || w > 1.0 + tol) {
                log::warn!("non-convex interpolation weights from grid {grid}: {weights:?}");
            }
        }
        Ok(())
    }
}
