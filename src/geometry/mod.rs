//! Geometry utilities for overset assembly.
//!
//! This module provides bounding boxes, linear shape functions with their
//! inverse isoparametric map, and rigid-body motion of registered grids.

pub mod aabb;
pub mod motion;
pub mod shape;

pub use aabb::Aabb;
pub use motion::RigidMotion;
