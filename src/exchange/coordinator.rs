//! Interpolate donor data and deliver it to receptors.
//!
//! One exchange moves one channel ([`DataKind`]) for one committed donor set:
//! post all receives, interpolate and send, fill same-rank receptors, then
//! wait for every receive and drain the sends. Every expected message must
//! arrive with the expected number of values before the channel counts as
//! complete.

use super::communicator::{CommTag, Communicator, Wait};
use super::device::{DeviceCallbacks, DeviceHandles};
use super::field::{DataKind, FieldAccess, read_dof, write_receptor};
use super::plan::ExchangePlan;
use super::wire::{self, KIND_VALUES, WireValue};
use crate::donor::record::{DonorRecord, DonorSet, ReceptorId};
use crate::overset_error::OversetError;
use crate::registry::GridTag;
use itertools::Itertools;
use std::collections::BTreeMap;

pub const SOLUTION_TAG: CommTag = CommTag::new(0x5100);
pub const GRADIENT_TAG: CommTag = CommTag::new(0x5200);
pub const UNBLANK_TAG: CommTag = CommTag::new(0x5300);

/// Where donor values come from and receptor values go.
pub(crate) trait Transport {
    /// Called once before any donor value is read.
    fn stage(&mut self, _records: &[DonorRecord], _kind: DataKind) -> Result<(), OversetError> {
        Ok(())
    }

    fn fields(&mut self) -> &mut dyn FieldAccess;

    /// Deliver one receptor's value block.
    fn deliver(
        &mut self,
        grid: GridTag,
        id: ReceptorId,
        kind: DataKind,
        nfields: usize,
        block: &[f64],
    ) -> Result<(), OversetError>;

    /// Called once after all receptor values were delivered.
    fn flush(&mut self, _kind: DataKind) -> Result<(), OversetError> {
        Ok(())
    }
}

/// Host-resident fields, written in place.
pub(crate) struct HostTransport<'f> {
    pub fields: &'f mut dyn FieldAccess,
}

impl Transport for HostTransport<'_> {
    fn fields(&mut self) -> &mut dyn FieldAccess {
        &mut *self.fields
    }

    fn deliver(
        &mut self,
        grid: GridTag,
        id: ReceptorId,
        kind: DataKind,
        nfields: usize,
        block: &[f64],
    ) -> Result<(), OversetError> {
        for (k, &v) in block.iter().enumerate() {
            let (dim, field) = kind.component(nfields, k);
            write_receptor(&mut *self.fields, kind, grid, id, dim, field, v)?;
        }
        Ok(())
    }
}

/// Device-resident fields: donor data is staged through the host accessors,
/// receptor values are batched per grid and handed to the device hooks.
pub(crate) struct DeviceTransport<'f> {
    pub fields: &'f mut dyn FieldAccess,
    pub device: &'f mut dyn DeviceCallbacks,
    pub handles: DeviceHandles,
    pub unblank: bool,
    pending: BTreeMap<GridTag, (Vec<ReceptorId>, Vec<f64>)>,
}

impl<'f> DeviceTransport<'f> {
    pub fn new(
        fields: &'f mut dyn FieldAccess,
        device: &'f mut dyn DeviceCallbacks,
        handles: DeviceHandles,
        unblank: bool,
    ) -> Self {
        Self {
            fields,
            device,
            handles,
            unblank,
            pending: BTreeMap::new(),
        }
    }
}

impl Transport for DeviceTransport<'_> {
    fn stage(&mut self, records: &[DonorRecord], kind: DataKind) -> Result<(), OversetError> {
        let by_grid = records
            .iter()
            .map(|r| (r.donor_grid, r.donor_cell))
            .sorted()
            .dedup()
            .into_group_map();
        for (grid, cells) in by_grid.into_iter().sorted_by_key(|(g, _)| *g) {
            self.device
                .donor_data_from_device(grid, &cells, kind, &self.handles)
                .map_err(|e| OversetError::callback(grid, "donor_data_from_device", e))?;
        }
        Ok(())
    }

    fn fields(&mut self) -> &mut dyn FieldAccess {
        &mut *self.fields
    }

    fn deliver(
        &mut self,
        grid: GridTag,
        id: ReceptorId,
        _kind: DataKind,
        _nfields: usize,
        block: &[f64],
    ) -> Result<(), OversetError> {
        let (ids, values) = self.pending.entry(grid).or_default();
        ids.push(id);
        values.extend_from_slice(block);
        Ok(())
    }

    fn flush(&mut self, kind: DataKind) -> Result<(), OversetError> {
        for (grid, (ids, values)) in std::mem::take(&mut self.pending) {
            let result = if self.unblank {
                self.device
                    .unblank_data_to_device(grid, &ids, &values, &self.handles)
                    .map_err(|e| OversetError::callback(grid, "unblank_data_to_device", e))
            } else {
                self.device
                    .fringe_data_to_device(grid, &ids, kind, &values, &self.handles)
                    .map_err(|e| OversetError::callback(grid, "fringe_data_to_device", e))
            };
            result?;
        }
        Ok(())
    }
}

fn interpolate(
    transport: &mut dyn Transport,
    record: &DonorRecord,
    kind: DataKind,
    nfields: usize,
    out: &mut [f64],
) -> Result<(), OversetError> {
    let fields = transport.fields();
    for (k, slot) in out.iter_mut().enumerate() {
        let (dim, field) = kind.component(nfields, k);
        let mut acc = 0.0;
        for (&dof, &w) in record.dofs.iter().zip(&record.weights) {
            acc += w * read_dof(fields, kind, record.donor_grid, dof, dim, field)?;
        }
        *slot = acc;
    }
    Ok(())
}

/// Run one exchange channel. Returns the number of receptors filled on this
/// rank.
pub(crate) fn exchange<C: Communicator>(
    comm: &C,
    tag: CommTag,
    set: &DonorSet,
    plan: &ExchangePlan,
    kind: DataKind,
    nfields: usize,
    transport: &mut dyn Transport,
) -> Result<usize, OversetError> {
    let width = kind.width(nfields);

    // 1) post receives
    let recvs: Vec<(usize, &Vec<usize>, C::RecvHandle)> = plan
        .recvs
        .iter()
        .map(|(&rank, slots)| (rank, slots, comm.irecv(rank, tag.as_u16())))
        .collect();

    // 2) interpolate every record this rank donates
    let mut values = vec![0.0; set.records.len() * width];
    let mut maybe_err = transport.stage(&set.records, kind).err();
    if maybe_err.is_none() {
        for (record, out) in set.records.iter().zip(values.chunks_exact_mut(width.max(1))) {
            if let Err(e) = interpolate(transport, record, kind, nfields, &mut out[..width]) {
                maybe_err = Some(e);
                break;
            }
        }
    }

    // 3) post sends; a failed rank sends empty messages so peers see a
    //    count mismatch instead of blocking
    let mut sends = Vec::with_capacity(plan.sends.len());
    for (&rank, idxs) in &plan.sends {
        let payload: Vec<WireValue> = if maybe_err.is_some() {
            Vec::new()
        } else {
            idxs.iter()
                .flat_map(|&i| &values[i * width..(i + 1) * width])
                .map(|&v| WireValue::new(v))
                .collect()
        };
        sends.push(comm.isend(rank, tag.as_u16(), &wire::pack(KIND_VALUES, &payload)));
    }

    // 4) same-rank receptors
    let mut filled = 0;
    if maybe_err.is_none() {
        for &i in &plan.local {
            let r = &set.records[i];
            let block = &values[i * width..(i + 1) * width];
            if let Err(e) = transport.deliver(r.receptor_grid, r.receptor, kind, nfields, block) {
                maybe_err = Some(e);
                break;
            }
            filled += 1;
        }
    }

    // 5) wait for all receives (no early return)
    let mut completed = 0;
    for (rank, slots, h) in recvs {
        let decoded = match h.wait() {
            Some(bytes) => wire::unpack::<WireValue>(KIND_VALUES, &bytes),
            None => Err(OversetError::CommError {
                neighbor: rank,
                reason: "value message never arrived".into(),
            }),
        };
        let incoming = match decoded {
            Ok(v) if v.len() == slots.len() * width => v,
            Ok(v) => {
                maybe_err.get_or_insert(OversetError::CommError {
                    neighbor: rank,
                    reason: format!(
                        "expected {} values, received {}",
                        slots.len() * width,
                        v.len()
                    ),
                });
                continue;
            }
            Err(e) => {
                maybe_err.get_or_insert(e);
                continue;
            }
        };
        completed += 1;
        if maybe_err.is_some() {
            continue;
        }
        for (&slot, chunk) in slots.iter().zip(incoming.chunks_exact(width.max(1))) {
            let Some(receptor) = set.receptors.get(slot) else {
                maybe_err = Some(OversetError::CommError {
                    neighbor: rank,
                    reason: format!("unknown receptor slot {slot}"),
                });
                break;
            };
            let block: Vec<f64> = chunk.iter().take(width).map(WireValue::get).collect();
            if let Err(e) = transport.deliver(receptor.grid, receptor.id, kind, nfields, &block) {
                maybe_err = Some(e);
                break;
            }
            filled += 1;
        }
    }

    // 6) always drain sends
    for s in sends {
        let _ = s.wait();
    }

    if let Some(e) = maybe_err {
        return Err(e);
    }
    if completed != plan.recvs.len() {
        return Err(OversetError::CommError {
            neighbor: comm.rank(),
            reason: format!("{completed} of {} value messages completed", plan.recvs.len()),
        });
    }
    transport.flush(kind)?;
    log::debug!(
        "rank {}: {kind:?} exchange v{} filled {filled} receptors",
        comm.rank(),
        set.version
    );
    Ok(filled)
}
