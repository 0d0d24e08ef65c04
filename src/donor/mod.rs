//! Donor search and interpolation weights.

pub mod callbacks;
pub mod engine;
pub mod receptors;
pub mod record;

pub use callbacks::SolverCallbacks;
pub use engine::{DonorCandidate, DonorEngine};
pub use record::{DonorDof, DonorRecord, DonorSet, Receptor, ReceptorId};
