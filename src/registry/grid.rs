//! Validated, queryable form of a registered grid.

use super::GridTag;
use super::data::{FaceData, FaceKind, GridData, GridType};
use crate::geometry::{Aabb, RigidMotion};
use crate::overset_error::OversetError;
use crate::topology::cell_type::CellType;

#[derive(Clone, Debug, PartialEq)]
struct CellBlock {
    cell_type: CellType,
    first_cell: usize,
    conn: Vec<usize>,
}

impl CellBlock {
    fn ncells(&self) -> usize {
        self.conn.len() / self.cell_type.vertex_count()
    }
}

/// Validated face topology.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceTopology {
    pub grid_type: GridType,
    face_offsets: Vec<usize>,
    face_conn: Vec<usize>,
    pub face2cell: Vec<[Option<usize>; 2]>,
    pub cell2face: Vec<Vec<usize>>,
    pub kinds: Vec<FaceKind>,
    pub wall_faces: Vec<usize>,
    pub over_faces: Vec<usize>,
    /// `(local face, neighbour rank, remote face id)`.
    pub mpi_links: Vec<(usize, usize, usize)>,
}

impl FaceTopology {
    pub fn nfaces(&self) -> usize {
        self.face2cell.len()
    }

    pub fn face_nodes(&self, face: usize) -> &[usize] {
        &self.face_conn[self.face_offsets[face]..self.face_offsets[face + 1]]
    }
}

/// A registered grid partition.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid {
    tag: GridTag,
    nodes: Vec<[f64; 3]>,
    reference_nodes: Vec<[f64; 3]>,
    blocks: Vec<CellBlock>,
    ncells: usize,
    node_cell_offsets: Vec<usize>,
    node_cell_list: Vec<usize>,
    wall_nodes: Vec<usize>,
    over_nodes: Vec<usize>,
    faces: Option<FaceTopology>,
    motion: Option<RigidMotion>,
}

impl Grid {
    /// Validate `data` and derive node-to-cell adjacency.
    pub fn from_data(data: GridData) -> Result<Self, OversetError> {
        let tag = GridTag(data.tag);
        if data.node_coords.len() % 3 != 0 {
            return Err(OversetError::topology(
                tag,
                format!(
                    "node coordinate array length {} is not a multiple of 3",
                    data.node_coords.len()
                ),
            ));
        }
        let nodes: Vec<[f64; 3]> = data
            .node_coords
            .chunks_exact(3)
            .map(|c| [c[0], c[1], c[2]])
            .collect();
        let nnodes = nodes.len();

        let mut blocks = Vec::with_capacity(data.cell_blocks.len());
        let mut ncells = 0;
        for (b, block) in data.cell_blocks.into_iter().enumerate() {
            let cell_type = CellType::from_vertex_count(block.nvert).ok_or_else(|| {
                OversetError::topology(
                    tag,
                    format!("cell block {b}: unsupported vertex count {}", block.nvert),
                )
            })?;
            if block.conn.len() % block.nvert != 0 {
                return Err(OversetError::topology(
                    tag,
                    format!(
                        "cell block {b}: connectivity length {} is not a multiple of {}",
                        block.conn.len(),
                        block.nvert
                    ),
                ));
            }
            if let Some(&bad) = block.conn.iter().find(|&&n| n >= nnodes) {
                return Err(OversetError::topology(
                    tag,
                    format!("cell block {b}: node {bad} out of range (nnodes = {nnodes})"),
                ));
            }
            let cb = CellBlock {
                cell_type,
                first_cell: ncells,
                conn: block.conn,
            };
            ncells += cb.ncells();
            blocks.push(cb);
        }
        check_indices(tag, "wall node", &data.wall_nodes, nnodes)?;
        check_indices(tag, "overset node", &data.over_nodes, nnodes)?;

        let mut grid = Grid {
            tag,
            reference_nodes: nodes.clone(),
            nodes,
            blocks,
            ncells,
            node_cell_offsets: Vec::new(),
            node_cell_list: Vec::new(),
            wall_nodes: data.wall_nodes,
            over_nodes: data.over_nodes,
            faces: None,
            motion: None,
        };
        grid.build_node_cells();
        Ok(grid)
    }

    fn build_node_cells(&mut self) {
        let mut counts = vec![0usize; self.nodes.len() + 1];
        for cell in 0..self.ncells {
            for &n in self.cell_nodes(cell) {
                counts[n + 1] += 1;
            }
        }
        for i in 0..self.nodes.len() {
            counts[i + 1] += counts[i];
        }
        let mut fill = counts.clone();
        let mut list = vec![0usize; counts[self.nodes.len()]];
        for cell in 0..self.ncells {
            for &n in self.cell_nodes(cell) {
                list[fill[n]] = cell;
                fill[n] += 1;
            }
        }
        self.node_cell_offsets = counts;
        self.node_cell_list = list;
    }

    /// Validate and attach face topology.
    pub(crate) fn set_faces(&mut self, data: FaceData) -> Result<(), OversetError> {
        let tag = self.tag;
        let nnodes = self.nodes.len();
        let mut face_offsets = vec![0usize];
        let mut face_conn = Vec::new();
        for (b, block) in data.face_blocks.iter().enumerate() {
            if block.nvert < 3 || block.conn.len() % block.nvert != 0 {
                return Err(OversetError::topology(
                    tag,
                    format!("face block {b}: invalid vertex count {}", block.nvert),
                ));
            }
            if let Some(&bad) = block.conn.iter().find(|&&n| n >= nnodes) {
                return Err(OversetError::topology(
                    tag,
                    format!("face block {b}: node {bad} out of range (nnodes = {nnodes})"),
                ));
            }
            for face in block.conn.chunks_exact(block.nvert) {
                face_conn.extend_from_slice(face);
                face_offsets.push(face_conn.len());
            }
        }
        let nfaces = face_offsets.len() - 1;
        if data.face2cell.len() != nfaces {
            return Err(OversetError::topology(
                tag,
                format!(
                    "face2cell has {} entries for {nfaces} faces",
                    data.face2cell.len()
                ),
            ));
        }
        let mut face2cell = Vec::with_capacity(nfaces);
        for (f, pair) in data.face2cell.iter().enumerate() {
            let mut out = [None; 2];
            for (side, &c) in pair.iter().enumerate() {
                if c < -1 || c >= self.ncells as i64 {
                    return Err(OversetError::topology(
                        tag,
                        format!("face {f}: cell {c} out of range (ncells = {})", self.ncells),
                    ));
                }
                if c >= 0 {
                    out[side] = Some(c as usize);
                }
            }
            face2cell.push(out);
        }
        if !data.cell2face.is_empty() && data.cell2face.len() != self.ncells {
            return Err(OversetError::topology(
                tag,
                format!(
                    "cell2face has {} entries for {} cells",
                    data.cell2face.len(),
                    self.ncells
                ),
            ));
        }
        for faces in &data.cell2face {
            check_indices(tag, "cell2face entry", faces, nfaces)?;
        }
        check_indices(tag, "overset face", &data.over_faces, nfaces)?;
        check_indices(tag, "wall face", &data.wall_faces, nfaces)?;
        check_indices(tag, "mpi face", &data.mpi_faces, nfaces)?;
        if data.mpi_proc_rank.len() != data.mpi_faces.len()
            || data.mpi_face_id.len() != data.mpi_faces.len()
        {
            return Err(OversetError::topology(
                tag,
                "mpi face rank/id arrays do not match the mpi face list",
            ));
        }

        let mut kinds = vec![FaceKind::Interior; nfaces];
        for &f in &data.wall_faces {
            kinds[f] = FaceKind::Wall;
        }
        for &f in &data.over_faces {
            kinds[f] = FaceKind::Overset;
        }
        for &f in &data.mpi_faces {
            kinds[f] = FaceKind::MpiBoundary;
        }
        let mpi_links = data
            .mpi_faces
            .iter()
            .zip(&data.mpi_proc_rank)
            .zip(&data.mpi_face_id)
            .map(|((&f, &r), &id)| (f, r, id))
            .collect();

        self.faces = Some(FaceTopology {
            grid_type: data.grid_type,
            face_offsets,
            face_conn,
            face2cell,
            cell2face: data.cell2face,
            kinds,
            wall_faces: data.wall_faces,
            over_faces: data.over_faces,
            mpi_links,
        });
        Ok(())
    }

    #[inline]
    pub fn tag(&self) -> GridTag {
        self.tag
    }

    #[inline]
    pub fn nnodes(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn ncells(&self) -> usize {
        self.ncells
    }

    pub fn nfaces(&self) -> usize {
        self.faces.as_ref().map_or(0, FaceTopology::nfaces)
    }

    pub fn nodes(&self) -> &[[f64; 3]] {
        &self.nodes
    }

    #[inline]
    pub fn node(&self, n: usize) -> [f64; 3] {
        self.nodes[n]
    }

    pub fn wall_nodes(&self) -> &[usize] {
        &self.wall_nodes
    }

    pub fn over_nodes(&self) -> &[usize] {
        &self.over_nodes
    }

    pub fn faces(&self) -> Option<&FaceTopology> {
        self.faces.as_ref()
    }

    /// Registered grid type. Without face data, a grid with overset
    /// boundary nodes is a near-body (minor) grid.
    pub fn grid_type(&self) -> GridType {
        match &self.faces {
            Some(f) => f.grid_type,
            None if !self.over_nodes.is_empty() => GridType::NearBody,
            None => GridType::Background,
        }
    }

    pub fn motion(&self) -> Option<&RigidMotion> {
        self.motion.as_ref()
    }

    fn block_of(&self, cell: usize) -> &CellBlock {
        let i = self.blocks.partition_point(|b| b.first_cell <= cell) - 1;
        &self.blocks[i]
    }

    /// Cell shape. Panics if `cell >= ncells()`.
    pub fn cell_type(&self, cell: usize) -> CellType {
        self.block_of(cell).cell_type
    }

    /// Node indices of a cell. Panics if `cell >= ncells()`.
    pub fn cell_nodes(&self, cell: usize) -> &[usize] {
        let b = self.block_of(cell);
        let nv = b.cell_type.vertex_count();
        let local = cell - b.first_cell;
        &b.conn[local * nv..(local + 1) * nv]
    }

    pub fn cell_vertices(&self, cell: usize) -> Vec<[f64; 3]> {
        self.cell_nodes(cell)
            .iter()
            .map(|&n| self.nodes[n])
            .collect()
    }

    pub fn cell_box(&self, cell: usize) -> Aabb {
        Aabb::from_points(self.cell_nodes(cell).iter().map(|&n| &self.nodes[n]))
    }

    /// Cells incident to a node.
    pub fn node_cells(&self, node: usize) -> &[usize] {
        &self.node_cell_list[self.node_cell_offsets[node]..self.node_cell_offsets[node + 1]]
    }

    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.nodes.iter())
    }

    pub(crate) fn set_coordinates(&mut self, coords: &[f64]) -> Result<(), OversetError> {
        if coords.len() != 3 * self.nodes.len() {
            return Err(OversetError::topology(
                self.tag,
                format!(
                    "coordinate update has {} values for {} nodes",
                    coords.len(),
                    self.nodes.len()
                ),
            ));
        }
        for (x, c) in self.nodes.iter_mut().zip(coords.chunks_exact(3)) {
            *x = [c[0], c[1], c[2]];
        }
        Ok(())
    }

    pub(crate) fn set_motion(&mut self, motion: RigidMotion) {
        self.motion = Some(motion);
    }

    /// Move nodes to `R * x0 + offset`; returns `false` without motion data.
    pub(crate) fn apply_motion(&mut self) -> bool {
        let Some(motion) = self.motion else {
            return false;
        };
        for (x, x0) in self.nodes.iter_mut().zip(&self.reference_nodes) {
            *x = motion.apply(x0);
        }
        true
    }
}

fn check_indices(
    tag: GridTag,
    what: &str,
    indices: &[usize],
    bound: usize,
) -> Result<(), OversetError> {
    match indices.iter().find(|&&i| i >= bound) {
        Some(&bad) => Err(OversetError::topology(
            tag,
            format!("{what} {bad} out of range (bound = {bound})"),
        )),
        None => Ok(()),
    }
}
