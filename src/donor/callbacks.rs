//! Solver-supplied callbacks for high-order receptors and donors.

use crate::donor::record::ReceptorId;
use crate::overset_error::CallbackError;
use crate::registry::GridTag;

/// Hooks through which the core learns about the solver's high-order
/// discretisation.
///
/// Point queries (`nodes_per_cell`, `receptor_nodes`, ...) describe where the
/// solver's solution and flux points are. `donor_inclusion_test` and
/// `donor_frac` replace the built-in linear inclusion test and weights.
/// Implementations must not call back into the connectivity group.
pub trait SolverCallbacks: Send {
    /// Number of solution points in `cell`.
    fn nodes_per_cell(&self, grid: GridTag, cell: usize) -> usize;

    /// Number of flux points on `face`.
    fn nodes_per_face(&self, grid: GridTag, face: usize) -> usize;

    /// Physical coordinates of the solution points of `cell`, written
    /// interleaved into `out` (`3 * nodes_per_cell` values).
    fn receptor_nodes(
        &self,
        grid: GridTag,
        cell: usize,
        out: &mut [f64],
    ) -> Result<(), CallbackError>;

    /// Physical coordinates of the flux points of `face`, interleaved.
    fn face_nodes(&self, grid: GridTag, face: usize, out: &mut [f64]) -> Result<(), CallbackError>;

    /// Reference coordinates of `xyz` in donor `cell`, or `None` if the cell
    /// does not contain the point.
    fn donor_inclusion_test(
        &self,
        grid: GridTag,
        cell: usize,
        xyz: &[f64; 3],
    ) -> Result<Option<[f64; 3]>, CallbackError>;

    /// Interpolation weights of the point at reference coordinates `rst`
    /// over the solution points of `cell`. When `modal` is present it holds
    /// the cell's conversion data from [`SolverCallbacks::convert_to_modal`].
    fn donor_frac(
        &self,
        grid: GridTag,
        cell: usize,
        rst: &[f64; 3],
        modal: Option<&[f64]>,
        weights: &mut [f64],
    ) -> Result<(), CallbackError>;

    /// Whether interpolating from `donor` into `receptor` needs a modal
    /// conversion of the donor basis.
    fn requires_modal(&self, _donor: GridTag, _receptor: GridTag, _point: &ReceptorId) -> bool {
        false
    }

    /// Modal conversion data of a donor cell; computed at most once per cell
    /// per connectivity pass.
    fn convert_to_modal(&self, grid: GridTag, cell: usize) -> Result<Vec<f64>, CallbackError> {
        let _ = cell;
        Err(CallbackError::new(format!(
            "modal conversion not supported for grid {grid}"
        )))
    }
}
