//! Registration payloads handed over by the host solver.

use serde::{Deserialize, Serialize};

/// One block of cells sharing a vertex count.
///
/// `conn` holds `nvert` node indices per cell, cell after cell.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CellBlockData {
    pub nvert: usize,
    pub conn: Vec<usize>,
}

impl CellBlockData {
    pub fn new(nvert: usize, conn: Vec<usize>) -> Self {
        Self { nvert, conn }
    }
}

/// Node and cell data of one grid partition.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GridData {
    /// Body tag of the grid.
    pub tag: i32,
    /// Interleaved `x, y, z` coordinates.
    pub node_coords: Vec<f64>,
    pub cell_blocks: Vec<CellBlockData>,
    /// Nodes on solid walls.
    pub wall_nodes: Vec<usize>,
    /// Nodes on the overset (outer) boundary.
    pub over_nodes: Vec<usize>,
}

/// Role of a grid when two grids tie on resolution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GridType {
    #[default]
    Background,
    NearBody,
}

/// One block of faces sharing a vertex count.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceBlockData {
    pub nvert: usize,
    pub conn: Vec<usize>,
}

impl FaceBlockData {
    pub fn new(nvert: usize, conn: Vec<usize>) -> Self {
        Self { nvert, conn }
    }
}

/// Face topology of one grid partition.
///
/// `face2cell` holds the two adjacent cells of each face, `-1` where a face
/// has no neighbour. `mpi_proc_rank[i]` and `mpi_face_id[i]` describe the
/// remote side of `mpi_faces[i]`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceData {
    pub grid_type: GridType,
    pub face_blocks: Vec<FaceBlockData>,
    pub face2cell: Vec<[i64; 2]>,
    pub cell2face: Vec<Vec<usize>>,
    pub over_faces: Vec<usize>,
    pub wall_faces: Vec<usize>,
    pub mpi_faces: Vec<usize>,
    pub mpi_proc_rank: Vec<usize>,
    pub mpi_face_id: Vec<usize>,
}

/// Classification of a registered face.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaceKind {
    #[default]
    Interior,
    Wall,
    Overset,
    MpiBoundary,
}
