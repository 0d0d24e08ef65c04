#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-overset
//!
//! mesh-overset is the connectivity and exchange core of an overset-grid
//! assembly: several independently generated grids overlap in space and are
//! coupled by interpolation instead of a single conforming mesh.
//!
//! ## Features
//! - Geometry registry for mixed tetrahedral, pyramid, prism and hexahedral grids, with rigid and deforming motion
//! - Alternating digital trees over cell bounding boxes for donor candidate queries
//! - Hole cutting from wall hole maps and overlap precedence, with fringe layering and node/cell/face iblank
//! - Donor search with built-in linear weights or solver-supplied high-order callbacks, including cached modal conversion
//! - Point-to-point exchange of interpolated solution values and gradients, on host or device buffers
//! - Pluggable communication backends (single rank, in-process threads, MPI)
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! mesh-overset = "0.4"
//! # Optional features:
//! # features = ["mpi-support","rayon"]
//! ```
//!
//! A host drives one [`OversetGroup`](connectivity::OversetGroup) per rank:
//! register grids, `preprocess`, `perform_full_connectivity`, then exchange
//! fields every step. The moving-grid cycle is `unblank_part1` /
//! `unblank_part2`, which keeps the previous donor version active until the
//! new one is complete.
//!
//! ## Determinism
//!
//! Candidate donors are ordered by grid tag, bounding-box volume and cell id,
//! and across ranks by donor rank as well, so repeated passes over the same
//! geometry produce identical donor sets.

pub mod adapter;
pub mod blanking;
pub mod config;
pub mod connectivity;
pub mod donor;
pub mod exchange;
pub mod geometry;
pub mod overset_error;
pub mod registry;
pub mod search;
pub mod topology;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::adapter::{AdapterProperties, GridAdapter};
    pub use crate::config::{CutPriority, InterpolationMode, OversetConfig};
    pub use crate::connectivity::{ConnectivityReport, ConnectivityState, OversetGroup};
    pub use crate::donor::{DonorDof, DonorRecord, Receptor, ReceptorId, SolverCallbacks};
    #[cfg(feature = "mpi-support")]
    pub use crate::exchange::communicator::MpiComm;
    pub use crate::exchange::communicator::{Communicator, NoComm, RayonComm};
    pub use crate::exchange::{DataKind, DeviceCallbacks, DeviceHandles, FieldAccess, StridedView};
    pub use crate::geometry::{Aabb, RigidMotion};
    pub use crate::overset_error::{CallbackError, OversetError};
    pub use crate::registry::{
        CellBlockData, FaceBlockData, FaceData, GeometryRegistry, GridData, GridTag, GridType,
    };
    pub use crate::topology::{CellType, GridBlanking, IblankStatus};
}
