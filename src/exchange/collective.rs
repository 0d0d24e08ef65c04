//! Collective helpers built on [`Communicator`] point-to-point messages.
//!
//! Every helper posts all receives, then all sends, waits for every receive
//! without returning early, and always drains the send handles before
//! returning, even when a receive failed.

use super::communicator::{CommTag, Communicator, Wait};
use super::wire::{self, KIND_COUNT, KIND_STATUS, WireCount, WireStatus};
use crate::overset_error::OversetError;
use bytemuck::Pod;
use std::collections::BTreeMap;

fn recv_error(neighbor: usize, what: &str) -> OversetError {
    OversetError::CommError {
        neighbor,
        reason: format!("failed to receive {what} from rank {neighbor}"),
    }
}

/// Every rank contributes `local`; returns all contributions indexed by rank.
pub fn all_gather<C, T>(
    comm: &C,
    tag: CommTag,
    kind: u16,
    local: &[T],
) -> Result<Vec<Vec<T>>, OversetError>
where
    C: Communicator,
    T: Pod,
{
    let me = comm.rank();
    let size = comm.size().max(1);

    // 1) post all receives
    let recvs: Vec<(usize, C::RecvHandle)> = (0..size)
        .filter(|&r| r != me)
        .map(|r| (r, comm.irecv(r, tag.as_u16())))
        .collect();

    // 2) post all sends
    let payload = wire::pack(kind, local);
    let sends: Vec<C::SendHandle> = (0..size)
        .filter(|&r| r != me)
        .map(|r| comm.isend(r, tag.as_u16(), &payload))
        .collect();

    // 3) wait for all receives (no early return)
    let mut out: Vec<Vec<T>> = vec![Vec::new(); size];
    out[me.min(size - 1)] = local.to_vec();
    let mut maybe_err = None;
    for (r, h) in recvs {
        let decoded = match h.wait() {
            Some(bytes) => wire::unpack::<T>(kind, &bytes),
            None => Err(recv_error(r, "gather contribution")),
        };
        match decoded {
            Ok(v) => out[r] = v,
            Err(e) if maybe_err.is_none() => maybe_err = Some(e),
            Err(_) => {}
        }
    }

    // 4) always drain sends
    for s in sends {
        let _ = s.wait();
    }

    match maybe_err {
        Some(e) => Err(e),
        None => Ok(out),
    }
}

/// Personalised exchange: `outgoing[r]` goes to rank `r`. Counts travel on
/// `tag` to every rank, payloads on `tag + 1` only where the count is
/// non-zero. The local rank's entry is moved without messaging.
pub fn sparse_exchange<C, T>(
    comm: &C,
    tag: CommTag,
    kind: u16,
    outgoing: &BTreeMap<usize, Vec<T>>,
) -> Result<BTreeMap<usize, Vec<T>>, OversetError>
where
    C: Communicator,
    T: Pod,
{
    let me = comm.rank();
    let size = comm.size().max(1);
    let counts_tag = tag;
    let data_tag = tag.offset(1);

    // Stage 1: counts.
    let count_recvs: Vec<(usize, C::RecvHandle)> = (0..size)
        .filter(|&r| r != me)
        .map(|r| (r, comm.irecv(r, counts_tag.as_u16())))
        .collect();
    let mut count_sends = Vec::with_capacity(size);
    for r in (0..size).filter(|&r| r != me) {
        let n = outgoing.get(&r).map_or(0, Vec::len);
        let msg = wire::pack(KIND_COUNT, &[WireCount::new(n)]);
        count_sends.push(comm.isend(r, counts_tag.as_u16(), &msg));
    }
    let mut incoming_counts = BTreeMap::new();
    let mut maybe_err = None;
    for (r, h) in count_recvs {
        let decoded = match h.wait() {
            Some(bytes) => wire::unpack::<WireCount>(KIND_COUNT, &bytes).and_then(|v| {
                v.first().map(WireCount::get).ok_or_else(|| {
                    OversetError::WireFormat(format!("empty count message from rank {r}"))
                })
            }),
            None => Err(recv_error(r, "count")),
        };
        match decoded {
            Ok(n) => {
                incoming_counts.insert(r, n);
            }
            Err(e) if maybe_err.is_none() => maybe_err = Some(e),
            Err(_) => {}
        }
    }
    for s in count_sends {
        let _ = s.wait();
    }
    if let Some(e) = maybe_err {
        return Err(e);
    }

    // Stage 2: payloads.
    let data_recvs: Vec<(usize, usize, C::RecvHandle)> = incoming_counts
        .iter()
        .filter(|&(_, &n)| n > 0)
        .map(|(&r, &n)| (r, n, comm.irecv(r, data_tag.as_u16())))
        .collect();
    let mut data_sends = Vec::new();
    for (&r, items) in outgoing {
        if r == me || items.is_empty() || r >= size {
            continue;
        }
        data_sends.push(comm.isend(r, data_tag.as_u16(), &wire::pack(kind, items)));
    }
    let mut out = BTreeMap::new();
    if let Some(local) = outgoing.get(&me) {
        if !local.is_empty() {
            out.insert(me, local.clone());
        }
    }
    for (r, n, h) in data_recvs {
        let decoded = match h.wait() {
            Some(bytes) => wire::unpack::<T>(kind, &bytes).and_then(|v| {
                if v.len() == n {
                    Ok(v)
                } else {
                    Err(OversetError::CommError {
                        neighbor: r,
                        reason: format!("announced {n} records, received {}", v.len()),
                    })
                }
            }),
            None => Err(recv_error(r, "payload")),
        };
        match decoded {
            Ok(v) => {
                out.insert(r, v);
            }
            Err(e) if maybe_err.is_none() => maybe_err = Some(e),
            Err(_) => {}
        }
    }
    for s in data_sends {
        let _ = s.wait();
    }
    match maybe_err {
        Some(e) => Err(e),
        None => Ok(out),
    }
}

/// Agree across ranks on whether a phase succeeded. A rank that failed gets
/// its own error back; the others get a [`OversetError::CommError`] naming
/// the lowest failed rank.
pub fn agree<C, T>(comm: &C, tag: CommTag, local: Result<T, OversetError>) -> Result<T, OversetError>
where
    C: Communicator,
{
    let status = WireStatus::new(u32::from(local.is_err()));
    let all = all_gather(comm, tag, KIND_STATUS, &[status])?;
    let value = local?;
    if let Some(r) = all
        .iter()
        .position(|s| s.first().is_some_and(|s| s.code() != 0))
    {
        return Err(OversetError::CommError {
            neighbor: r,
            reason: format!("rank {r} aborted the connectivity pass"),
        });
    }
    Ok(value)
}
