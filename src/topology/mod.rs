//! Topological vocabulary shared by the registry and the classifier.
//!
//! - [`cell_type`]: supported volume cell shapes and their face tables.
//! - [`iblank`]: blanking status of nodes, cells and faces.

pub mod cell_type;
pub mod iblank;

pub use cell_type::CellType;
pub use iblank::{GridBlanking, IblankStatus};
