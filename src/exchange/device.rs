//! Device-resident field data.
//!
//! When the solver keeps its fields on an accelerator, the coordinator asks it
//! to stage donor data on the host before interpolating, and hands receptor
//! values back in batches instead of writing them through [`FieldAccess`].
//!
//! [`FieldAccess`]: super::field::FieldAccess

use super::field::DataKind;
use crate::donor::record::ReceptorId;
use crate::overset_error::CallbackError;
use crate::registry::GridTag;
use serde::{Deserialize, Serialize};

/// Opaque stream and event handles owned by the solver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandles {
    pub stream: u64,
    pub event: u64,
}

/// Host/device transfer hooks.
///
/// `values` slices hold `kind.width(nfields)` values per point, in the order
/// of `points`, gradients dimension-major.
pub trait DeviceCallbacks: Send {
    /// Make the data of `cells` of `grid` readable through the host field
    /// accessors.
    fn donor_data_from_device(
        &mut self,
        grid: GridTag,
        cells: &[usize],
        kind: DataKind,
        handles: &DeviceHandles,
    ) -> Result<(), CallbackError>;

    /// Write interpolated fringe values to the device.
    fn fringe_data_to_device(
        &mut self,
        grid: GridTag,
        points: &[ReceptorId],
        kind: DataKind,
        values: &[f64],
        handles: &DeviceHandles,
    ) -> Result<(), CallbackError>;

    /// Write solution values of newly unblanked points to the device.
    fn unblank_data_to_device(
        &mut self,
        grid: GridTag,
        points: &[ReceptorId],
        values: &[f64],
        handles: &DeviceHandles,
    ) -> Result<(), CallbackError>;
}
