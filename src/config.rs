//! Connectivity configuration.
//!
//! [`OversetConfig`] collects the tolerances and policies used by the blanking
//! classifier and the donor engine. All fields have defaults, so a partial
//! serialized document only needs to name what it overrides.

use crate::overset_error::OversetError;
use serde::{Deserialize, Serialize};

/// Which points act as receptors and how donor weights are computed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InterpolationMode {
    /// Receptors are fringe nodes; weights are the donor cell's linear shape
    /// functions evaluated by the core.
    #[default]
    Nodal,
    /// Receptors are solution points of fringe cells and flux points of fringe
    /// faces; inclusion tests and weights come from [`SolverCallbacks`](crate::donor::callbacks::SolverCallbacks).
    HighOrder,
}

/// Precedence used when two grids could blank the same region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CutPriority {
    /// The grid with the finer local cell size wins; near-body grids win ties
    /// over background grids, then the lower tag wins.
    #[default]
    Resolution,
    /// The lower grid tag always wins.
    LowerTag,
}

/// Tolerances and policies for a connectivity group.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OversetConfig {
    pub mode: InterpolationMode,
    pub cut_priority: CutPriority,
    /// Number of node layers marked FRINGE around every hole.
    pub fringe_layers: usize,
    /// Minimum cell-layer distance from a grid's overset boundary for one of
    /// its cells to cut other grids.
    pub overlap_margin_layers: usize,
    /// Absolute inflation applied to every cell bounding box.
    pub box_tolerance: f64,
    /// Tolerance on reference coordinates for the built-in inclusion test.
    pub containment_tolerance: f64,
    /// Allowed deviation of the weight sum from one.
    pub weight_tolerance: f64,
    /// Relative difference below which two resolutions count as equal.
    pub resolution_tolerance: f64,
    /// Upper bound on hole-map voxels per axis.
    pub hole_map_max_cells: usize,
    pub newton_max_iterations: usize,
    pub newton_tolerance: f64,
}

impl Default for OversetConfig {
    fn default() -> Self {
        Self {
            mode: InterpolationMode::Nodal,
            cut_priority: CutPriority::Resolution,
            fringe_layers: 1,
            overlap_margin_layers: 1,
            box_tolerance: 1e-9,
            containment_tolerance: 1e-8,
            weight_tolerance: 1e-8,
            resolution_tolerance: 1e-6,
            hole_map_max_cells: 128,
            newton_max_iterations: 30,
            newton_tolerance: 1e-13,
        }
    }
}

impl OversetConfig {
    pub fn with_mode(mut self, mode: InterpolationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_cut_priority(mut self, priority: CutPriority) -> Self {
        self.cut_priority = priority;
        self
    }

    pub fn with_fringe_layers(mut self, layers: usize) -> Self {
        self.fringe_layers = layers;
        self
    }

    pub fn with_overlap_margin_layers(mut self, layers: usize) -> Self {
        self.overlap_margin_layers = layers;
        self
    }

    /// Reject settings the classifier cannot work with.
    pub fn validate(&self) -> Result<(), OversetError> {
        let positive = [
            ("box_tolerance", self.box_tolerance),
            ("containment_tolerance", self.containment_tolerance),
            ("weight_tolerance", self.weight_tolerance),
            ("resolution_tolerance", self.resolution_tolerance),
            ("newton_tolerance", self.newton_tolerance),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(OversetError::InvalidConfig(format!(
                    "{name} must be positive and finite, got {value}"
                )));
            }
        }
        if self.fringe_layers == 0 {
            return Err(OversetError::InvalidConfig(
                "fringe_layers must be at least 1".into(),
            ));
        }
        if self.hole_map_max_cells < 2 {
            return Err(OversetError::InvalidConfig(
                "hole_map_max_cells must be at least 2".into(),
            ));
        }
        if self.newton_max_iterations == 0 {
            return Err(OversetError::InvalidConfig(
                "newton_max_iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(OversetConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_zero_fringe_layers() {
        let cfg = OversetConfig::default().with_fringe_layers(0);
        assert!(matches!(cfg.validate(), Err(OversetError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_negative_tolerance() {
        let cfg = OversetConfig {
            weight_tolerance: -1.0,
            ..OversetConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
