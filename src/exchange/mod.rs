//! Message passing and field exchange.

pub mod collective;
pub mod communicator;
pub mod coordinator;
pub mod device;
pub mod field;
pub mod plan;
pub mod wire;

pub use communicator::{CommTag, Communicator, NoComm, RayonComm, Wait};
#[cfg(feature = "mpi-support")]
pub use communicator::MpiComm;
pub use device::{DeviceCallbacks, DeviceHandles};
pub use field::{DataKind, FieldAccess, StridedView};
pub use plan::ExchangePlan;
