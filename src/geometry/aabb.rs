//! Axis-aligned bounding boxes.

use serde::{Deserialize, Serialize};

/// An axis-aligned box `[min, max]` in 3D.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

impl Aabb {
    /// An inverted box that contains nothing; the identity for [`Aabb::union`].
    pub const fn empty() -> Self {
        Self {
            min: [f64::INFINITY; 3],
            max: [f64::NEG_INFINITY; 3],
        }
    }

    pub fn new(min: [f64; 3], max: [f64; 3]) -> Self {
        Self { min, max }
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a [f64; 3]>) -> Self {
        let mut b = Self::empty();
        for p in points {
            b.include_point(p);
        }
        b
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        (0..3).any(|d| self.min[d] > self.max[d])
    }

    #[inline]
    pub fn include_point(&mut self, p: &[f64; 3]) {
        for d in 0..3 {
            self.min[d] = self.min[d].min(p[d]);
            self.max[d] = self.max[d].max(p[d]);
        }
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        let mut out = *self;
        for d in 0..3 {
            out.min[d] = out.min[d].min(other.min[d]);
            out.max[d] = out.max[d].max(other.max[d]);
        }
        out
    }

    /// Grow the box by `eps` on every side.
    pub fn inflated(&self, eps: f64) -> Aabb {
        if self.is_empty() {
            return *self;
        }
        let mut out = *self;
        for d in 0..3 {
            out.min[d] -= eps;
            out.max[d] += eps;
        }
        out
    }

    /// Closed containment test.
    #[inline]
    pub fn contains(&self, p: &[f64; 3]) -> bool {
        (0..3).all(|d| p[d] >= self.min[d] && p[d] <= self.max[d])
    }

    /// Closed containment test after inflating by `eps`.
    #[inline]
    pub fn contains_with(&self, p: &[f64; 3], eps: f64) -> bool {
        (0..3).all(|d| p[d] >= self.min[d] - eps && p[d] <= self.max[d] + eps)
    }

    #[inline]
    pub fn overlaps(&self, other: &Aabb) -> bool {
        (0..3).all(|d| self.min[d] <= other.max[d] && other.min[d] <= self.max[d])
    }

    pub fn extent(&self) -> [f64; 3] {
        if self.is_empty() {
            return [0.0; 3];
        }
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    pub fn volume(&self) -> f64 {
        let e = self.extent();
        e[0] * e[1] * e[2]
    }

    pub fn center(&self) -> [f64; 3] {
        [
            0.5 * (self.min[0] + self.max[0]),
            0.5 * (self.min[1] + self.max[1]),
            0.5 * (self.min[2] + self.max[2]),
        ]
    }
}
