//! Iblank classification of nodes, cells and faces.

use serde::{Deserialize, Serialize};

/// Blanking status of a mesh entity.
///
/// Integer codes (see [`IblankStatus::code`]) follow the convention solvers
/// expect in their iblank arrays: hole `0`, field `1`, fringe `-1`, and
/// partition boundary `2`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IblankStatus {
    /// Normal computational point.
    #[default]
    Field,
    /// Removed from the solve; never interpolated.
    Hole,
    /// Overset receptor; receives interpolated data.
    Fringe,
    /// Face on an inter-partition boundary.
    MpiBoundary,
}

impl IblankStatus {
    #[inline]
    pub fn code(self) -> i32 {
        match self {
            IblankStatus::Hole => 0,
            IblankStatus::Field => 1,
            IblankStatus::Fringe => -1,
            IblankStatus::MpiBoundary => 2,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(IblankStatus::Hole),
            1 => Some(IblankStatus::Field),
            -1 => Some(IblankStatus::Fringe),
            2 => Some(IblankStatus::MpiBoundary),
            _ => None,
        }
    }

    #[inline]
    pub fn is_hole(self) -> bool {
        self == IblankStatus::Hole
    }
}

/// Iblank arrays for one grid.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GridBlanking {
    pub nodes: Vec<IblankStatus>,
    pub cells: Vec<IblankStatus>,
    pub faces: Vec<IblankStatus>,
}

impl GridBlanking {
    pub fn new(nnodes: usize, ncells: usize, nfaces: usize) -> Self {
        Self {
            nodes: vec![IblankStatus::Field; nnodes],
            cells: vec![IblankStatus::Field; ncells],
            faces: vec![IblankStatus::Field; nfaces],
        }
    }

    pub fn count(statuses: &[IblankStatus], status: IblankStatus) -> usize {
        statuses.iter().filter(|&&s| s == status).count()
    }

    pub fn node_codes(&self) -> Vec<i32> {
        self.nodes.iter().map(|s| s.code()).collect()
    }

    pub fn cell_codes(&self) -> Vec<i32> {
        self.cells.iter().map(|s| s.code()).collect()
    }

    pub fn face_codes(&self) -> Vec<i32> {
        self.faces.iter().map(|s| s.code()).collect()
    }
}
