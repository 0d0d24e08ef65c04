//! Rigid motion of a grid relative to its reference configuration.

use serde::{Deserialize, Serialize};

/// Grid velocity, rigid offset and rotation matrix (row-major).
///
/// The current position of a node with reference coordinates `x0` is
/// `rotation * x0 + offset`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RigidMotion {
    pub velocity: [f64; 3],
    pub offset: [f64; 3],
    pub rotation: [[f64; 3]; 3],
}

impl Default for RigidMotion {
    fn default() -> Self {
        Self {
            velocity: [0.0; 3],
            offset: [0.0; 3],
            rotation: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }
}

impl RigidMotion {
    pub fn translation(offset: [f64; 3]) -> Self {
        Self {
            offset,
            ..Self::default()
        }
    }

    /// Rotation by `angle` radians about the z axis.
    pub fn rotation_z(angle: f64) -> Self {
        let (s, c) = angle.sin_cos();
        Self {
            rotation: [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]],
            ..Self::default()
        }
    }

    #[inline]
    pub fn apply(&self, x0: &[f64; 3]) -> [f64; 3] {
        let r = &self.rotation;
        let mut out = self.offset;
        for i in 0..3 {
            out[i] += r[i][0] * x0[0] + r[i][1] * x0[1] + r[i][2] * x0[2];
        }
        out
    }
}
