//! Blanking classifier: hole maps, cut precedence and iblank propagation.

pub mod classifier;
pub mod hole_map;
pub mod metrics;

pub use classifier::{Precedence, cutter_wins};
pub use hole_map::{HoleMap, Voxel, wall_patches};
pub use metrics::{GridMetrics, UNBOUNDED_DEPTH};
