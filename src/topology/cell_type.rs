//! Cell shapes accepted by the geometry registry.
//!
//! Vertex ordering follows the reference elements of [`crate::geometry::shape`]:
//! - Tetrahedron: `[v0, v1, v2, v3]`.
//! - Pyramid: quad base `[v0..v3]` and apex `v4`.
//! - Prism: bottom triangle `[v0, v1, v2]`, top triangle `[v3, v4, v5]`.
//! - Hexahedron: bottom face `[v0..v3]`, top face `[v4..v7]`.

use serde::{Deserialize, Serialize};

/// Volume cell types.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize)]
pub enum CellType {
    Tetrahedron,
    Pyramid,
    Prism,
    Hexahedron,
}

impl CellType {
    /// Infer the shape from the number of vertices per cell.
    pub fn from_vertex_count(nvert: usize) -> Option<Self> {
        match nvert {
            4 => Some(CellType::Tetrahedron),
            5 => Some(CellType::Pyramid),
            6 => Some(CellType::Prism),
            8 => Some(CellType::Hexahedron),
            _ => None,
        }
    }

    #[inline]
    pub fn vertex_count(self) -> usize {
        match self {
            CellType::Tetrahedron => 4,
            CellType::Pyramid => 5,
            CellType::Prism => 6,
            CellType::Hexahedron => 8,
        }
    }

    /// Local vertex indices of each face.
    pub fn faces(self) -> &'static [&'static [usize]] {
        match self {
            CellType::Tetrahedron => &TET_FACES,
            CellType::Pyramid => &PYRAMID_FACES,
            CellType::Prism => &PRISM_FACES,
            CellType::Hexahedron => &HEX_FACES,
        }
    }
}

const TET_FACES: [&[usize]; 4] = [&[0, 1, 2], &[0, 1, 3], &[1, 2, 3], &[0, 2, 3]];
const PYRAMID_FACES: [&[usize]; 5] = [
    &[0, 1, 2, 3],
    &[0, 1, 4],
    &[1, 2, 4],
    &[2, 3, 4],
    &[3, 0, 4],
];
const PRISM_FACES: [&[usize]; 5] = [
    &[0, 1, 2],
    &[3, 4, 5],
    &[0, 1, 4, 3],
    &[1, 2, 5, 4],
    &[2, 0, 3, 5],
];
const HEX_FACES: [&[usize]; 6] = [
    &[0, 1, 2, 3],
    &[4, 5, 6, 7],
    &[0, 1, 5, 4],
    &[1, 2, 6, 5],
    &[2, 3, 7, 6],
    &[3, 0, 4, 7],
];
