//! Access to solver-owned field buffers.

use crate::donor::record::{DonorDof, ReceptorId};
use crate::overset_error::OversetError;
use crate::registry::GridTag;

/// Which quantity an exchange moves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DataKind {
    Solution,
    Gradient,
}

impl DataKind {
    /// Values per receptor for `nfields` fields.
    pub fn width(self, nfields: usize) -> usize {
        match self {
            DataKind::Solution => nfields,
            DataKind::Gradient => 3 * nfields,
        }
    }

    /// `(dim, field)` of component `k` of a receptor's value block.
    /// Gradients are dimension-major.
    #[inline]
    pub fn component(self, nfields: usize, k: usize) -> (usize, usize) {
        match self {
            DataKind::Solution => (0, k),
            DataKind::Gradient => (k / nfields, k % nfields),
        }
    }
}

/// Mutable strided window over a grid's solution-point storage.
///
/// Entry `(cell, point, dim, field)` lives at
/// `cell * cell_stride + point * point_stride + dim * dim_stride + field * field_stride`.
#[derive(Debug)]
pub struct StridedView<'a> {
    pub data: &'a mut [f64],
    pub cell_stride: usize,
    pub point_stride: usize,
    pub dim_stride: usize,
    pub field_stride: usize,
}

impl StridedView<'_> {
    #[inline]
    fn offset(&self, cell: usize, point: usize, dim: usize, field: usize) -> usize {
        cell * self.cell_stride
            + point * self.point_stride
            + dim * self.dim_stride
            + field * self.field_stride
    }

    pub fn get(&self, cell: usize, point: usize, dim: usize, field: usize) -> Option<f64> {
        self.data.get(self.offset(cell, point, dim, field)).copied()
    }

    pub fn get_mut(&mut self, cell: usize, point: usize, dim: usize, field: usize) -> Option<&mut f64> {
        let i = self.offset(cell, point, dim, field);
        self.data.get_mut(i)
    }
}

/// Field accessors of the host solver.
///
/// Every method has a default that reports the accessor as missing; a solver
/// implements the ones its interpolation mode needs. When `q_spts` /
/// `dq_spts` return a view it is used instead of the per-point accessors.
pub trait FieldAccess {
    fn q_node(&mut self, _grid: GridTag, _node: usize, _field: usize) -> Option<&mut f64> {
        None
    }

    fn q_spt(&mut self, _grid: GridTag, _cell: usize, _point: usize, _field: usize) -> Option<&mut f64> {
        None
    }

    fn q_fpt(&mut self, _grid: GridTag, _face: usize, _point: usize, _field: usize) -> Option<&mut f64> {
        None
    }

    fn dq_node(&mut self, _grid: GridTag, _node: usize, _dim: usize, _field: usize) -> Option<&mut f64> {
        None
    }

    fn dq_spt(
        &mut self,
        _grid: GridTag,
        _cell: usize,
        _point: usize,
        _dim: usize,
        _field: usize,
    ) -> Option<&mut f64> {
        None
    }

    fn dq_fpt(
        &mut self,
        _grid: GridTag,
        _face: usize,
        _point: usize,
        _dim: usize,
        _field: usize,
    ) -> Option<&mut f64> {
        None
    }

    fn q_spts(&mut self, _grid: GridTag) -> Option<StridedView<'_>> {
        None
    }

    fn dq_spts(&mut self, _grid: GridTag) -> Option<StridedView<'_>> {
        None
    }
}

fn missing(grid: GridTag, accessor: &'static str, what: String) -> OversetError {
    OversetError::CallbackFailure {
        grid,
        callback: accessor,
        reason: format!("no value for {what}"),
    }
}

/// Read one component of a donor degree of freedom.
pub(crate) fn read_dof(
    fields: &mut dyn FieldAccess,
    kind: DataKind,
    grid: GridTag,
    dof: DonorDof,
    dim: usize,
    field: usize,
) -> Result<f64, OversetError> {
    match (kind, dof) {
        (DataKind::Solution, DonorDof::Node(n)) => fields
            .q_node(grid, n, field)
            .map(|v| *v)
            .ok_or_else(|| missing(grid, "q_node", format!("node {n}"))),
        (DataKind::Gradient, DonorDof::Node(n)) => fields
            .dq_node(grid, n, dim, field)
            .map(|v| *v)
            .ok_or_else(|| missing(grid, "dq_node", format!("node {n}"))),
        (DataKind::Solution, DonorDof::CellPoint { cell, index }) => {
            if let Some(view) = fields.q_spts(grid) {
                return view
                    .get(cell, index, 0, field)
                    .ok_or_else(|| missing(grid, "q_spts", format!("cell {cell} point {index}")));
            }
            fields
                .q_spt(grid, cell, index, field)
                .map(|v| *v)
                .ok_or_else(|| missing(grid, "q_spt", format!("cell {cell} point {index}")))
        }
        (DataKind::Gradient, DonorDof::CellPoint { cell, index }) => {
            if let Some(view) = fields.dq_spts(grid) {
                return view
                    .get(cell, index, dim, field)
                    .ok_or_else(|| missing(grid, "dq_spts", format!("cell {cell} point {index}")));
            }
            fields
                .dq_spt(grid, cell, index, dim, field)
                .map(|v| *v)
                .ok_or_else(|| missing(grid, "dq_spt", format!("cell {cell} point {index}")))
        }
    }
}

/// Write one component of a receptor value.
pub(crate) fn write_receptor(
    fields: &mut dyn FieldAccess,
    kind: DataKind,
    grid: GridTag,
    id: ReceptorId,
    dim: usize,
    field: usize,
    value: f64,
) -> Result<(), OversetError> {
    let slot = match (kind, id) {
        (DataKind::Solution, ReceptorId::Node(n)) => fields
            .q_node(grid, n, field)
            .ok_or_else(|| missing(grid, "q_node", format!("node {n}"))),
        (DataKind::Gradient, ReceptorId::Node(n)) => fields
            .dq_node(grid, n, dim, field)
            .ok_or_else(|| missing(grid, "dq_node", format!("node {n}"))),
        (DataKind::Solution, ReceptorId::CellPoint { cell, index }) => {
            if let Some(mut view) = fields.q_spts(grid) {
                let Some(v) = view.get_mut(cell, index, 0, field) else {
                    return Err(missing(grid, "q_spts", format!("cell {cell} point {index}")));
                };
                *v = value;
                return Ok(());
            }
            fields
                .q_spt(grid, cell, index, field)
                .ok_or_else(|| missing(grid, "q_spt", format!("cell {cell} point {index}")))
        }
        (DataKind::Gradient, ReceptorId::CellPoint { cell, index }) => {
            if let Some(mut view) = fields.dq_spts(grid) {
                let Some(v) = view.get_mut(cell, index, dim, field) else {
                    return Err(missing(grid, "dq_spts", format!("cell {cell} point {index}")));
                };
                *v = value;
                return Ok(());
            }
            fields
                .dq_spt(grid, cell, index, dim, field)
                .ok_or_else(|| missing(grid, "dq_spt", format!("cell {cell} point {index}")))
        }
        (DataKind::Solution, ReceptorId::FacePoint { face, index }) => fields
            .q_fpt(grid, face, index, field)
            .ok_or_else(|| missing(grid, "q_fpt", format!("face {face} point {index}"))),
        (DataKind::Gradient, ReceptorId::FacePoint { face, index }) => fields
            .dq_fpt(grid, face, index, dim, field)
            .ok_or_else(|| missing(grid, "dq_fpt", format!("face {face} point {index}"))),
    }?;
    *slot = value;
    Ok(())
}
