//! Connectivity lifecycle and the distributed passes behind it.

pub mod group;
pub(crate) mod pass;
pub mod state;

pub use group::{ConnectivityReport, OversetGroup};
pub use pass::PartitionBox;
pub use state::ConnectivityState;
