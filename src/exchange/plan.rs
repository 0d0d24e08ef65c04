//! Exchange plans derived from a committed donor set.

use crate::donor::record::DonorSet;
use itertools::Itertools;
use std::collections::BTreeMap;

/// Who sends what to whom for one connectivity version.
///
/// Both sides of every cross-rank pair order their lists by receptor slot,
/// so a message is a plain sequence of values with no per-entry header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExchangePlan {
    pub version: u64,
    /// Records whose receptor lives on this rank.
    pub local: Vec<usize>,
    /// Receptor rank -> record indices, in slot order.
    pub sends: BTreeMap<usize, Vec<usize>>,
    /// Donor rank -> receptor slots, ascending.
    pub recvs: BTreeMap<usize, Vec<usize>>,
}

impl ExchangePlan {
    pub fn build(rank: usize, set: &DonorSet) -> Self {
        let (local, remote): (Vec<_>, Vec<_>) = set
            .records
            .iter()
            .enumerate()
            .partition(|(_, r)| r.receptor_rank == rank);

        let sends = remote
            .into_iter()
            .sorted_by_key(|(_, r)| (r.receptor_rank, r.slot))
            .map(|(i, r)| (r.receptor_rank, i))
            .into_group_map()
            .into_iter()
            .collect();

        let recvs = set
            .receptors
            .iter()
            .enumerate()
            .filter_map(|(slot, r)| match r.donor_rank {
                Some(d) if d != rank => Some((d, slot)),
                _ => None,
            })
            .into_group_map()
            .into_iter()
            .collect();

        Self {
            version: set.version,
            local: local.into_iter().map(|(i, _)| i).collect(),
            sends,
            recvs,
        }
    }

    /// Number of records sent to `rank`.
    pub fn send_count(&self, rank: usize) -> usize {
        self.sends.get(&rank).map_or(0, Vec::len)
    }

    /// Number of receptors filled by `rank`.
    pub fn recv_count(&self, rank: usize) -> usize {
        self.recvs.get(&rank).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.sends.is_empty() && self.recvs.is_empty()
    }
}
