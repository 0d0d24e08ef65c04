//! OversetError: unified error type for mesh-overset public APIs
//!
//! Every fallible operation of the connectivity core returns this type. Solver
//! callbacks report their own failures through [`CallbackError`], which the core
//! wraps into [`OversetError::CallbackFailure`] together with the grid and the
//! callback that failed.

use crate::connectivity::state::ConnectivityState;
use crate::donor::record::ReceptorId;
use crate::registry::GridTag;
use thiserror::Error;

/// Unified error type for overset connectivity operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum OversetError {
    /// Registration referenced an out-of-range node, cell or face index, or the
    /// arrays were inconsistent. The registration is discarded.
    #[error("invalid topology for grid {grid}: {reason}")]
    InvalidTopology { grid: GridTag, reason: String },
    /// A receptor point had candidate donors but none confirmed containment.
    #[error("no donor found for receptor {receptor:?} of grid {grid}")]
    NoDonorFound { grid: GridTag, receptor: ReceptorId },
    /// An exchange was requested before a connectivity pass completed.
    #[error("`{operation}` requires a connected group (current state: {state:?})")]
    NotConnected {
        operation: &'static str,
        state: ConnectivityState,
    },
    /// Any other lifecycle violation, including calls after `finish`.
    #[error("`{operation}` is not allowed in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: ConnectivityState,
    },
    /// A solver callback failed or produced invalid data; the pass was aborted.
    #[error("callback `{callback}` failed on grid {grid}: {reason}")]
    CallbackFailure {
        grid: GridTag,
        callback: &'static str,
        reason: String,
    },
    /// High-order mode requires a registered callback set.
    #[error("solver callbacks are required for {0}")]
    MissingCallbacks(&'static str),
    /// The grid tag is not registered on this rank.
    #[error("grid {0} is not registered")]
    UnknownGrid(GridTag),
    /// Transport-level failure talking to `neighbor`.
    #[error("communication with rank {neighbor} failed: {reason}")]
    CommError { neighbor: usize, reason: String },
    /// A message did not decode as the expected wire record.
    #[error("wire format error: {0}")]
    WireFormat(String),
    /// Degenerate geometry encountered while mapping a point.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    /// Configuration rejected by [`OversetConfig::validate`](crate::config::OversetConfig::validate).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Error reported by a solver callback.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CallbackError(pub String);

impl CallbackError {
    pub fn new(reason: impl Into<String>) -> Self {
        CallbackError(reason.into())
    }
}

impl OversetError {
    /// Wrap a callback error with the grid and callback name.
    pub(crate) fn callback(grid: GridTag, callback: &'static str, err: CallbackError) -> Self {
        OversetError::CallbackFailure {
            grid,
            callback,
            reason: err.0,
        }
    }

    pub(crate) fn topology(grid: GridTag, reason: impl Into<String>) -> Self {
        OversetError::InvalidTopology {
            grid,
            reason: reason.into(),
        }
    }
}
