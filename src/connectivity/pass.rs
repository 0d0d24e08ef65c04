//! The distributed blanking and donor passes.
//!
//! Every rank runs the same sequence of collectives. Local work that can fail
//! (callbacks, malformed replies) is followed by an [`agree`] so that either
//! every rank moves on or every rank returns an error; nothing computed here
//! is committed by the caller unless the whole pass succeeded.

use crate::blanking::classifier::{
    Precedence, classify_cells, classify_faces, cutter_wins, is_cutting_cell, mark_fringe,
    wall_cut,
};
use crate::blanking::{GridMetrics, HoleMap, wall_patches};
use crate::config::OversetConfig;
use crate::donor::callbacks::SolverCallbacks;
use crate::donor::engine::{DonorCandidate, DonorEngine};
use crate::donor::record::{DonorRecord, DonorSet, Receptor, ReceptorId};
use crate::exchange::collective::{agree, all_gather, sparse_exchange};
use crate::exchange::communicator::{CommTag, Communicator};
use crate::exchange::wire::{
    ACCEPT_NEW, KIND_ACCEPT, KIND_BOX, KIND_CUT_QUERY, KIND_CUT_REPLY, KIND_DONOR_QUERY,
    KIND_DONOR_REPLY, KIND_WALL_BOX, RETAIN_OLD, WireAccept, WireBox, WireCutQuery, WireCutReply,
    WireDonorQuery, WireDonorReply, WireWallBox,
};
use crate::geometry::Aabb;
use crate::geometry::shape::{InverseMapOptions, locate};
use crate::overset_error::OversetError;
use crate::registry::{GeometryRegistry, GridTag, GridType};
use crate::search::SpatialIndex;
use crate::topology::iblank::{GridBlanking, IblankStatus};
use std::collections::{BTreeMap, BTreeSet, HashMap};

const BOX_TAG: CommTag = CommTag::new(0x4F10);
const WALL_TAG: CommTag = CommTag::new(0x4F20);
const CUT_QUERY_TAG: CommTag = CommTag::new(0x4F30);
const CUT_REPLY_TAG: CommTag = CommTag::new(0x4F40);
const DONOR_QUERY_TAG: CommTag = CommTag::new(0x4F50);
const DONOR_REPLY_TAG: CommTag = CommTag::new(0x4F60);
const ACCEPT_TAG: CommTag = CommTag::new(0x4F70);
pub(crate) const AGREE_TAG: CommTag = CommTag::new(0x4F80);

/// Everything a pass reads from the owning group.
pub(crate) struct PassContext<'a> {
    pub registry: &'a GeometryRegistry,
    pub index: &'a SpatialIndex,
    pub metrics: &'a BTreeMap<GridTag, GridMetrics>,
    pub config: &'a OversetConfig,
    pub callbacks: Option<&'a dyn SolverCallbacks>,
}

/// Bounding box of a grid partition owned by some rank.
#[derive(Clone, Debug, PartialEq)]
pub struct PartitionBox {
    pub rank: usize,
    pub tag: GridTag,
    pub grid_type: GridType,
    /// Already inflated by the box tolerance.
    pub bbox: Aabb,
}

fn grid_type_code(t: GridType) -> u32 {
    match t {
        GridType::Background => 0,
        GridType::NearBody => 1,
    }
}

fn grid_type_from_code(code: u32) -> GridType {
    if code == 1 {
        GridType::NearBody
    } else {
        GridType::Background
    }
}

/// Ranks holding a partition of a grid other than `tag` whose box contains
/// `p`, ascending.
fn candidate_ranks(boxes: &[PartitionBox], tag: GridTag, p: &[f64; 3]) -> BTreeSet<usize> {
    boxes
        .iter()
        .filter(|b| b.tag != tag && b.bbox.contains(p))
        .map(|b| b.rank)
        .collect()
}

/// Share every partition's bounding box with every rank.
pub(crate) fn gather_boxes<C: Communicator>(
    ctx: &PassContext<'_>,
    comm: &C,
) -> Result<Vec<PartitionBox>, OversetError> {
    let local: Vec<WireBox> = ctx
        .registry
        .grids()
        .filter(|g| g.ncells() > 0)
        .map(|g| {
            let b = g.bounds().inflated(ctx.config.box_tolerance);
            WireBox::new(g.tag().0, grid_type_code(g.grid_type()), &b.min, &b.max)
        })
        .collect();
    let gathered = all_gather(comm, BOX_TAG, KIND_BOX, &local)?;
    Ok(gathered
        .into_iter()
        .enumerate()
        .flat_map(|(rank, boxes)| {
            boxes.into_iter().map(move |b| PartitionBox {
                rank,
                tag: GridTag(b.tag()),
                grid_type: grid_type_from_code(b.grid_type()),
                bbox: Aabb::new(b.min(), b.max()),
            })
        })
        .collect())
}

/// Hole maps of every body with wall geometry on any rank.
fn gather_hole_maps<C: Communicator>(
    ctx: &PassContext<'_>,
    comm: &C,
) -> Result<Vec<HoleMap>, OversetError> {
    let local: Vec<WireWallBox> = ctx
        .registry
        .grids()
        .flat_map(|g| {
            let tag = g.tag().0;
            wall_patches(g)
                .into_iter()
                .map(move |b| WireWallBox::new(tag, &b.min, &b.max))
        })
        .collect();
    let gathered = all_gather(comm, WALL_TAG, KIND_WALL_BOX, &local)?;
    let mut patches: BTreeMap<GridTag, Vec<Aabb>> = BTreeMap::new();
    for w in gathered.iter().flatten() {
        patches
            .entry(GridTag(w.tag()))
            .or_default()
            .push(Aabb::new(w.min(), w.max()));
    }
    Ok(patches
        .iter()
        .filter_map(|(&tag, p)| HoleMap::build(tag, p, ctx.config.hole_map_max_cells))
        .collect())
}

/// Whether some local grid other than the query's own has a cutting cell
/// containing the queried node and wins precedence there.
fn cuts_point(
    ctx: &PassContext<'_>,
    nodes: &BTreeMap<GridTag, Vec<IblankStatus>>,
    inverse: &InverseMapOptions,
    query: &WireCutQuery,
) -> bool {
    let receptor = Precedence {
        tag: GridTag(query.tag()),
        resolution: query.resolution(),
        grid_type: grid_type_from_code(query.grid_type()),
    };
    let p = query.xyz();
    let cfg = ctx.config;
    ctx.registry
        .grids()
        .filter(|g| g.tag() != receptor.tag)
        .any(|grid| {
            let (Some(metrics), Some(status)) =
                (ctx.metrics.get(&grid.tag()), nodes.get(&grid.tag()))
            else {
                return false;
            };
            ctx.index
                .find_cells_in_grid(grid.tag(), &p)
                .into_iter()
                .any(|hit| {
                    let cutter = Precedence {
                        tag: grid.tag(),
                        resolution: metrics.cell_volumes[hit.cell],
                        grid_type: grid.grid_type(),
                    };
                    is_cutting_cell(grid, metrics, status, hit.cell, cfg.overlap_margin_layers)
                        && cutter_wins(cfg.cut_priority, &receptor, &cutter, cfg.resolution_tolerance)
                        && locate(grid.cell_type(hit.cell), &grid.cell_vertices(hit.cell), &p, inverse)
                            .is_some()
                })
        })
}

/// Result of a blanking pass over this rank's grids.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct BlankingOutcome {
    pub blanking: BTreeMap<GridTag, GridBlanking>,
    pub wall_cut: usize,
    pub overlap_cut: usize,
}

/// Hole cutting, fringe marking and propagation to cells and faces.
pub(crate) fn blanking_pass<C: Communicator>(
    ctx: &PassContext<'_>,
    comm: &C,
    boxes: &[PartitionBox],
) -> Result<BlankingOutcome, OversetError> {
    let maps = gather_hole_maps(ctx, comm)?;

    let mut nodes: BTreeMap<GridTag, Vec<IblankStatus>> = BTreeMap::new();
    let mut wall = 0;
    for grid in ctx.registry.grids() {
        let mut status = vec![IblankStatus::Field; grid.nnodes()];
        wall += wall_cut(grid, &maps, &mut status);
        nodes.insert(grid.tag(), status);
    }

    // Overlap cut: ask the ranks whose boxes cover a node whether one of
    // their grids claims it.
    let mut queries: BTreeMap<usize, Vec<WireCutQuery>> = BTreeMap::new();
    for grid in ctx.registry.grids() {
        let (Some(status), Some(metrics)) = (nodes.get(&grid.tag()), ctx.metrics.get(&grid.tag()))
        else {
            continue;
        };
        let code = grid_type_code(grid.grid_type());
        // Overset boundary nodes are mandatory receptors and never overlap-cut.
        let mut mandatory = vec![false; grid.nnodes()];
        for &n in grid.over_nodes() {
            mandatory[n] = true;
        }
        for n in (0..grid.nnodes()).filter(|&n| !status[n].is_hole() && !mandatory[n]) {
            let p = grid.node(n);
            for rank in candidate_ranks(boxes, grid.tag(), &p) {
                queries.entry(rank).or_default().push(WireCutQuery::new(
                    n,
                    grid.tag().0,
                    code,
                    &p,
                    metrics.node_resolution[n],
                ));
            }
        }
    }
    let incoming = sparse_exchange(comm, CUT_QUERY_TAG, KIND_CUT_QUERY, &queries)?;

    let inverse = InverseMapOptions::from(ctx.config);
    let replies: BTreeMap<usize, Vec<WireCutReply>> = incoming
        .iter()
        .map(|(&src, qs)| {
            let cut = qs
                .iter()
                .filter(|q| cuts_point(ctx, &nodes, &inverse, q))
                .map(|q| WireCutReply::new(q.node(), q.tag()))
                .collect::<Vec<_>>();
            (src, cut)
        })
        .filter(|(_, cut)| !cut.is_empty())
        .collect();
    let incoming = sparse_exchange(comm, CUT_REPLY_TAG, KIND_CUT_REPLY, &replies)?;

    let finished = (|| -> Result<BlankingOutcome, OversetError> {
        let mut overlap = 0;
        for (&src, cut) in &incoming {
            for reply in cut {
                let tag = GridTag(reply.tag());
                let status = nodes
                    .get_mut(&tag)
                    .and_then(|s| s.get_mut(reply.node()))
                    .ok_or_else(|| OversetError::CommError {
                        neighbor: src,
                        reason: format!("cut reply for unknown node {} of grid {tag}", reply.node()),
                    })?;
                if !status.is_hole() {
                    *status = IblankStatus::Hole;
                    overlap += 1;
                }
            }
        }

        let mut blanking = BTreeMap::new();
        for grid in ctx.registry.grids() {
            let tag = grid.tag();
            let Some(mut status) = nodes.remove(&tag) else {
                continue;
            };
            let fringe = mark_fringe(grid, &mut status, ctx.config.fringe_layers, |n| {
                let p = grid.node(n);
                boxes.iter().any(|b| b.tag != tag && b.bbox.contains(&p))
            });
            let cells = classify_cells(grid, &status);
            let faces = classify_faces(grid, &status, &cells);
            log::debug!(
                "grid {tag}: {} hole / {fringe} fringe nodes",
                GridBlanking::count(&status, IblankStatus::Hole)
            );
            blanking.insert(
                tag,
                GridBlanking {
                    nodes: status,
                    cells,
                    faces,
                },
            );
        }
        Ok(BlankingOutcome {
            blanking,
            wall_cut: wall,
            overlap_cut: overlap,
        })
    })();
    agree(comm, AGREE_TAG, finished)
}

/// Donor-side state between the reply and accept stages, keyed by
/// `(receptor rank, slot)`.
type Pending = HashMap<(usize, usize), (GridTag, ReceptorId, DonorCandidate)>;

struct SearchOutcome {
    pending: Pending,
    replies: BTreeMap<usize, Vec<WireDonorReply>>,
    modal_conversions: usize,
}

fn search_donors(
    ctx: &PassContext<'_>,
    blanking: &BTreeMap<GridTag, GridBlanking>,
    incoming: &BTreeMap<usize, Vec<WireDonorQuery>>,
) -> Result<SearchOutcome, OversetError> {
    let mut engine = DonorEngine::new(ctx.registry, ctx.index, blanking, ctx.config, ctx.callbacks)?;
    let mut pending = Pending::new();
    let mut replies: BTreeMap<usize, Vec<WireDonorReply>> = BTreeMap::new();
    for (&src, queries) in incoming {
        for q in queries {
            let (kind, a, b) = q.id();
            let id = ReceptorId::from_wire(kind, a, b).ok_or_else(|| {
                OversetError::WireFormat(format!("unknown receptor kind {kind} from rank {src}"))
            })?;
            let tag = GridTag(q.tag());
            if let Some(found) = engine.find_donor(tag, &id, &q.xyz())? {
                replies.entry(src).or_default().push(WireDonorReply::new(
                    q.slot(),
                    found.grid.0,
                    found.cell,
                    found.bbox_volume,
                ));
                pending.insert((src, q.slot()), (tag, id, found));
            }
        }
    }
    Ok(SearchOutcome {
        pending,
        replies,
        modal_conversions: engine.modal_conversions(),
    })
}

fn build_records(
    incoming: &BTreeMap<usize, Vec<WireAccept>>,
    mut pending: Pending,
    previous: Option<&DonorSet>,
) -> Result<Vec<DonorRecord>, OversetError> {
    let mut records = Vec::new();
    for (&src, accepts) in incoming {
        for a in accepts {
            match a.action() {
                ACCEPT_NEW => {
                    let (receptor_grid, receptor, c) =
                        pending.remove(&(src, a.slot())).ok_or_else(|| OversetError::CommError {
                            neighbor: src,
                            reason: format!("slot {} accepted but never offered", a.slot()),
                        })?;
                    records.push(DonorRecord {
                        receptor_rank: src,
                        slot: a.slot(),
                        receptor_grid,
                        receptor,
                        donor_grid: c.grid,
                        donor_cell: c.cell,
                        dofs: c.dofs,
                        weights: c.weights,
                        modal: c.modal,
                    });
                }
                RETAIN_OLD => {
                    let old = previous
                        .and_then(|p| p.record_for(src, a.old_slot()))
                        .ok_or_else(|| OversetError::CommError {
                            neighbor: src,
                            reason: format!("no previous record for slot {}", a.old_slot()),
                        })?;
                    records.push(DonorRecord {
                        slot: a.slot(),
                        ..old.clone()
                    });
                }
                other => {
                    return Err(OversetError::WireFormat(format!(
                        "unknown accept action {other} from rank {src}"
                    )));
                }
            }
        }
    }
    records.sort_by_key(|r| (r.receptor_rank, r.slot));
    Ok(records)
}

/// Result of a donor pass. `set.version` is left for the caller to assign.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct DonorOutcome {
    pub set: DonorSet,
    pub unresolved: Vec<(GridTag, ReceptorId)>,
    pub retained: usize,
    pub modal_conversions: usize,
}

/// Find donors for `receptors` on all ranks.
///
/// With `previous`, a receptor that was resolved in that set but finds no
/// donor now keeps its old record.
pub(crate) fn donor_pass<C: Communicator>(
    ctx: &PassContext<'_>,
    comm: &C,
    boxes: &[PartitionBox],
    blanking: &BTreeMap<GridTag, GridBlanking>,
    mut receptors: Vec<Receptor>,
    previous: Option<&DonorSet>,
) -> Result<DonorOutcome, OversetError> {
    // 1) ship receptor points to every rank that might hold a donor
    let mut queries: BTreeMap<usize, Vec<WireDonorQuery>> = BTreeMap::new();
    for (slot, r) in receptors.iter().enumerate() {
        for rank in candidate_ranks(boxes, r.grid, &r.xyz) {
            queries
                .entry(rank)
                .or_default()
                .push(WireDonorQuery::new(slot, r.grid.0, r.id.to_wire(), &r.xyz));
        }
    }
    let incoming = sparse_exchange(comm, DONOR_QUERY_TAG, KIND_DONOR_QUERY, &queries)?;

    // 2) donor side: search and offer
    let search = agree(comm, AGREE_TAG, search_donors(ctx, blanking, &incoming))?;
    let offers = sparse_exchange(comm, DONOR_REPLY_TAG, KIND_DONOR_REPLY, &search.replies)?;

    // 3) receptor side: pick one offer per receptor
    let mut best: Vec<Option<(usize, WireDonorReply)>> = vec![None; receptors.len()];
    let mut stray = None;
    for (&rank, replies) in &offers {
        for reply in replies {
            let Some(entry) = best.get_mut(reply.slot()) else {
                stray = Some(rank);
                continue;
            };
            let key = (reply.donor_tag(), reply.volume(), rank, reply.cell());
            let better = match entry {
                None => true,
                Some((r0, b)) => key < (b.donor_tag(), b.volume(), *r0, b.cell()),
            };
            if better {
                *entry = Some((rank, *reply));
            }
        }
    }

    let prior: HashMap<(GridTag, ReceptorId), (usize, usize)> = previous
        .map(|p| {
            p.receptors
                .iter()
                .enumerate()
                .filter_map(|(slot, r)| r.donor_rank.map(|d| ((r.grid, r.id), (slot, d))))
                .collect()
        })
        .unwrap_or_default();

    let mut accepts: BTreeMap<usize, Vec<WireAccept>> = BTreeMap::new();
    let mut unresolved = Vec::new();
    let mut retained = 0;
    for (slot, r) in receptors.iter_mut().enumerate() {
        if let Some((rank, _)) = best[slot] {
            r.donor_rank = Some(rank);
            accepts.entry(rank).or_default().push(WireAccept::accept(slot));
        } else if let Some(&(old_slot, rank)) = prior.get(&(r.grid, r.id)) {
            r.donor_rank = Some(rank);
            retained += 1;
            accepts
                .entry(rank)
                .or_default()
                .push(WireAccept::retain(slot, old_slot));
        } else {
            unresolved.push((r.grid, r.id));
        }
    }
    let accepted = sparse_exchange(comm, ACCEPT_TAG, KIND_ACCEPT, &accepts)?;

    // 4) donor side: turn accepted offers into records
    let records = match stray {
        Some(rank) => Err(OversetError::CommError {
            neighbor: rank,
            reason: "donor reply for an unknown receptor slot".into(),
        }),
        None => build_records(&accepted, search.pending, previous),
    };
    let records = agree(comm, AGREE_TAG, records)?;

    if !unresolved.is_empty() {
        log::warn!(
            "rank {}: {} receptor points without a donor",
            comm.rank(),
            unresolved.len()
        );
    }
    Ok(DonorOutcome {
        set: DonorSet {
            version: 0,
            records,
            receptors,
        },
        unresolved,
        retained,
        modal_conversions: search.modal_conversions,
    })
}
