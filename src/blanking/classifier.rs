//! Local blanking rules.
//!
//! The distributed pass in [`crate::connectivity::pass`] decides *which* nodes
//! are cut; the functions here apply the per-grid rules around those
//! decisions: hole-map cuts, cutting-region membership, precedence, fringe
//! layering, and propagation from nodes to cells and faces.

use super::hole_map::HoleMap;
use super::metrics::GridMetrics;
use crate::config::CutPriority;
use crate::registry::{FaceKind, Grid, GridTag, GridType};
use crate::topology::iblank::IblankStatus;

/// What decides whether one grid may cut another at a point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Precedence {
    pub tag: GridTag,
    /// Local cell size (volume) at the point.
    pub resolution: f64,
    pub grid_type: GridType,
}

/// Whether `cutter` takes precedence over `receptor` at a point covered by
/// both grids.
///
/// Under [`CutPriority::Resolution`] the smaller cell wins. On a tie a
/// near-body grid beats a background grid, so a block enclosed by a
/// background of equal spacing cuts the background and not the reverse;
/// between grids of the same type the lower tag wins.
pub fn cutter_wins(
    priority: CutPriority,
    receptor: &Precedence,
    cutter: &Precedence,
    resolution_tolerance: f64,
) -> bool {
    if receptor.tag == cutter.tag {
        return false;
    }
    match priority {
        CutPriority::LowerTag => cutter.tag < receptor.tag,
        CutPriority::Resolution => {
            let (a, b) = (receptor.resolution, cutter.resolution);
            let scale = a.abs().max(b.abs());
            if (a - b).abs() > resolution_tolerance * scale {
                return b < a;
            }
            match (cutter.grid_type, receptor.grid_type) {
                (GridType::NearBody, GridType::Background) => true,
                (GridType::Background, GridType::NearBody) => false,
                _ => cutter.tag < receptor.tag,
            }
        }
    }
}

/// A cell cuts other grids when none of its nodes is a hole and all of them
/// lie at least `margin` layers away from the overset boundary.
pub fn is_cutting_cell(
    grid: &Grid,
    metrics: &GridMetrics,
    nodes: &[IblankStatus],
    cell: usize,
    margin: usize,
) -> bool {
    let margin = u32::try_from(margin).unwrap_or(u32::MAX);
    grid.cell_nodes(cell)
        .iter()
        .all(|&n| !nodes[n].is_hole() && metrics.node_depth[n] >= margin)
}

/// Mark nodes inside any hole map of a different body as holes. Returns the
/// number of newly cut nodes.
pub fn wall_cut(grid: &Grid, maps: &[HoleMap], nodes: &mut [IblankStatus]) -> usize {
    let mut cut = 0;
    for map in maps.iter().filter(|m| m.tag() != grid.tag()) {
        for (n, status) in nodes.iter_mut().enumerate() {
            if !status.is_hole() && map.cuts(&grid.node(n)) {
                *status = IblankStatus::Hole;
                cut += 1;
            }
        }
    }
    cut
}

fn node_neighbours<'a>(grid: &'a Grid, n: usize) -> impl Iterator<Item = usize> + 'a {
    grid.node_cells(n)
        .iter()
        .flat_map(move |&c| grid.cell_nodes(c).iter().copied())
        .filter(move |&m| m != n)
}

/// Mark `layers` layers of fringe nodes around holes and inward from the
/// overset boundary. Only nodes accepted by `is_candidate` become FRINGE;
/// rejected nodes stay FIELD and do not seed the next layer. Returns the
/// number of FRINGE nodes.
pub fn mark_fringe(
    grid: &Grid,
    nodes: &mut [IblankStatus],
    layers: usize,
    mut is_candidate: impl FnMut(usize) -> bool,
) -> usize {
    let mut front: Vec<usize> = Vec::new();
    let mut seeded = vec![false; nodes.len()];
    for &n in grid.over_nodes() {
        seeded[n] = true;
    }
    for n in 0..nodes.len() {
        if nodes[n].is_hole() {
            for m in node_neighbours(grid, n) {
                seeded[m] = true;
            }
        }
    }
    for n in 0..nodes.len() {
        if seeded[n] && nodes[n] == IblankStatus::Field && is_candidate(n) {
            nodes[n] = IblankStatus::Fringe;
            front.push(n);
        }
    }
    let mut total = front.len();
    for _ in 1..layers {
        let mut next = Vec::new();
        for &n in &front {
            for m in node_neighbours(grid, n) {
                if nodes[m] == IblankStatus::Field && is_candidate(m) {
                    nodes[m] = IblankStatus::Fringe;
                    next.push(m);
                }
            }
        }
        if next.is_empty() {
            break;
        }
        total += next.len();
        front = next;
    }
    total
}

/// Cell status from node status: HOLE iff all nodes are holes, FRINGE iff no
/// node is FIELD, FIELD otherwise.
pub fn classify_cells(grid: &Grid, nodes: &[IblankStatus]) -> Vec<IblankStatus> {
    (0..grid.ncells())
        .map(|c| {
            let cn = grid.cell_nodes(c);
            if cn.iter().all(|&n| nodes[n].is_hole()) {
                IblankStatus::Hole
            } else if cn.iter().all(|&n| nodes[n] != IblankStatus::Field) {
                IblankStatus::Fringe
            } else {
                IblankStatus::Field
            }
        })
        .collect()
}

/// Face status from node and cell status.
pub fn classify_faces(
    grid: &Grid,
    nodes: &[IblankStatus],
    cells: &[IblankStatus],
) -> Vec<IblankStatus> {
    let Some(faces) = grid.faces() else {
        return Vec::new();
    };
    (0..faces.nfaces())
        .map(|f| {
            let adjacent: Vec<IblankStatus> =
                faces.face2cell[f].iter().flatten().map(|&c| cells[c]).collect();
            if !adjacent.is_empty() && adjacent.iter().all(|s| s.is_hole()) {
                return IblankStatus::Hole;
            }
            match faces.kinds[f] {
                FaceKind::MpiBoundary => IblankStatus::MpiBoundary,
                FaceKind::Overset
                    if faces
                        .face_nodes(f)
                        .iter()
                        .any(|&n| nodes[n] == IblankStatus::Fringe) =>
                {
                    IblankStatus::Fringe
                }
                _ if adjacent.len() == 2
                    && adjacent.contains(&IblankStatus::Field)
                    && adjacent.iter().any(|&s| s != IblankStatus::Field) =>
                {
                    IblankStatus::Fringe
                }
                _ => IblankStatus::Field,
            }
        })
        .collect()
}

/// Combine the blanking at the current position with a provisional one: a
/// node stays a hole only if it is a hole in both.
pub fn union_nodes(current: &[IblankStatus], provisional: &[IblankStatus]) -> Vec<IblankStatus> {
    current
        .iter()
        .zip(provisional)
        .map(|(&cur, &prov)| if cur.is_hole() { prov } else { cur })
        .collect()
}
