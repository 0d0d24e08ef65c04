//! Receptor points, donor records and the versioned donor set.

use crate::registry::GridTag;
use serde::{Deserialize, Serialize};

/// A point that receives interpolated data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ReceptorId {
    /// A grid node (nodal mode).
    Node(usize),
    /// Solution point `index` of a cell (high-order mode).
    CellPoint { cell: usize, index: usize },
    /// Flux point `index` of a face (high-order mode).
    FacePoint { face: usize, index: usize },
}

impl ReceptorId {
    /// `(kind, a, b)` triple used on the wire.
    pub(crate) fn to_wire(self) -> (u32, u64, u64) {
        match self {
            ReceptorId::Node(n) => (0, n as u64, 0),
            ReceptorId::CellPoint { cell, index } => (1, cell as u64, index as u64),
            ReceptorId::FacePoint { face, index } => (2, face as u64, index as u64),
        }
    }

    pub(crate) fn from_wire(kind: u32, a: u64, b: u64) -> Option<Self> {
        let (a, b) = (a as usize, b as usize);
        match kind {
            0 => Some(ReceptorId::Node(a)),
            1 => Some(ReceptorId::CellPoint { cell: a, index: b }),
            2 => Some(ReceptorId::FacePoint { face: a, index: b }),
            _ => None,
        }
    }
}

/// A donor degree of freedom a weight applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DonorDof {
    /// Cell vertex (nodal mode).
    Node(usize),
    /// Solution point of the donor cell (high-order mode).
    CellPoint { cell: usize, index: usize },
}

/// Interpolation stencil for one receptor, held by the donor rank.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DonorRecord {
    pub receptor_rank: usize,
    /// Position of the receptor in its rank's receptor list.
    pub slot: usize,
    pub receptor_grid: GridTag,
    pub receptor: ReceptorId,
    pub donor_grid: GridTag,
    pub donor_cell: usize,
    pub dofs: Vec<DonorDof>,
    pub weights: Vec<f64>,
    /// Weights were computed against a modal conversion.
    pub modal: bool,
}

/// A receptor point known to its own rank.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Receptor {
    pub grid: GridTag,
    pub id: ReceptorId,
    pub xyz: [f64; 3],
    /// Rank holding the donor record, or `None` while unresolved.
    pub donor_rank: Option<usize>,
}

/// Donor-side records and receptor-side list of one connectivity version.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DonorSet {
    pub version: u64,
    /// Records for which this rank is the donor, ordered by
    /// `(receptor_rank, slot)`.
    pub records: Vec<DonorRecord>,
    /// Receptors owned by this rank; the index is the slot.
    pub receptors: Vec<Receptor>,
}

impl DonorSet {
    pub fn sort_records(&mut self) {
        self.records
            .sort_by_key(|r| (r.receptor_rank, r.slot));
    }

    pub fn unresolved(&self) -> impl Iterator<Item = &Receptor> {
        self.receptors.iter().filter(|r| r.donor_rank.is_none())
    }

    pub fn resolved_count(&self) -> usize {
        self.receptors
            .iter()
            .filter(|r| r.donor_rank.is_some())
            .count()
    }

    /// The record for a receptor slot of `rank`, when this rank is its donor.
    pub fn record_for(&self, rank: usize, slot: usize) -> Option<&DonorRecord> {
        self.records
            .binary_search_by_key(&(rank, slot), |r| (r.receptor_rank, r.slot))
            .ok()
            .map(|i| &self.records[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receptor_ids_survive_the_wire() {
        for id in [
            ReceptorId::Node(7),
            ReceptorId::CellPoint { cell: 3, index: 5 },
            ReceptorId::FacePoint { face: 11, index: 0 },
        ] {
            let (k, a, b) = id.to_wire();
            assert_eq!(ReceptorId::from_wire(k, a, b), Some(id));
        }
        assert_eq!(ReceptorId::from_wire(9, 0, 0), None);
    }

    #[test]
    fn record_lookup_by_slot() {
        let rec = |rank, slot| DonorRecord {
            receptor_rank: rank,
            slot,
            receptor_grid: GridTag(0),
            receptor: ReceptorId::Node(slot),
            donor_grid: GridTag(1),
            donor_cell: 0,
            dofs: vec![DonorDof::Node(0)],
            weights: vec![1.0],
            modal: false,
        };
        let mut set = DonorSet {
            records: vec![rec(1, 4), rec(0, 2), rec(0, 1)],
            ..DonorSet::default()
        };
        set.sort_records();
        assert_eq!(set.record_for(0, 2).map(|r| r.slot), Some(2));
        assert!(set.record_for(1, 2).is_none());
    }
}
