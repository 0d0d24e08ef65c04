//! Receptor point collection.

use super::callbacks::SolverCallbacks;
use super::record::{Receptor, ReceptorId};
use crate::config::InterpolationMode;
use crate::overset_error::OversetError;
use crate::registry::{GeometryRegistry, Grid, GridTag};
use crate::topology::iblank::{GridBlanking, IblankStatus};
use std::collections::BTreeMap;

fn receptor(grid: GridTag, id: ReceptorId, xyz: [f64; 3]) -> Receptor {
    Receptor {
        grid,
        id,
        xyz,
        donor_rank: None,
    }
}

fn cell_points(
    cb: &dyn SolverCallbacks,
    grid: &Grid,
    cell: usize,
    out: &mut Vec<Receptor>,
) -> Result<(), OversetError> {
    let tag = grid.tag();
    let n = cb.nodes_per_cell(tag, cell);
    let mut xyz = vec![0.0; 3 * n];
    cb.receptor_nodes(tag, cell, &mut xyz)
        .map_err(|e| OversetError::callback(tag, "receptor_nodes", e))?;
    out.extend(xyz.chunks_exact(3).enumerate().map(|(index, p)| {
        receptor(tag, ReceptorId::CellPoint { cell, index }, [p[0], p[1], p[2]])
    }));
    Ok(())
}

fn face_points(
    cb: &dyn SolverCallbacks,
    grid: &Grid,
    face: usize,
    out: &mut Vec<Receptor>,
) -> Result<(), OversetError> {
    let tag = grid.tag();
    let n = cb.nodes_per_face(tag, face);
    let mut xyz = vec![0.0; 3 * n];
    cb.face_nodes(tag, face, &mut xyz)
        .map_err(|e| OversetError::callback(tag, "face_nodes", e))?;
    out.extend(xyz.chunks_exact(3).enumerate().map(|(index, p)| {
        receptor(tag, ReceptorId::FacePoint { face, index }, [p[0], p[1], p[2]])
    }));
    Ok(())
}

/// FRINGE points of every local grid: nodes in nodal mode, solution points
/// of FRINGE cells and flux points of FRINGE faces in high-order mode.
pub fn collect_fringe_receptors(
    registry: &GeometryRegistry,
    blanking: &BTreeMap<GridTag, GridBlanking>,
    mode: InterpolationMode,
    callbacks: Option<&dyn SolverCallbacks>,
) -> Result<Vec<Receptor>, OversetError> {
    let mut out = Vec::new();
    for grid in registry.grids() {
        let Some(blank) = blanking.get(&grid.tag()) else {
            continue;
        };
        match mode {
            InterpolationMode::Nodal => {
                out.extend(
                    (0..grid.nnodes())
                        .filter(|&n| blank.nodes[n] == IblankStatus::Fringe)
                        .map(|n| receptor(grid.tag(), ReceptorId::Node(n), grid.node(n))),
                );
            }
            InterpolationMode::HighOrder => {
                let cb = callbacks.ok_or(OversetError::MissingCallbacks("high-order receptors"))?;
                for cell in (0..grid.ncells()).filter(|&c| blank.cells[c] == IblankStatus::Fringe) {
                    cell_points(cb, grid, cell, &mut out)?;
                }
                for face in (0..blank.faces.len()).filter(|&f| blank.faces[f] == IblankStatus::Fringe) {
                    face_points(cb, grid, face, &mut out)?;
                }
            }
        }
    }
    Ok(out)
}

/// Points that are holes in `current` but not in `provisional`.
pub fn collect_unblank_receptors(
    registry: &GeometryRegistry,
    current: &BTreeMap<GridTag, GridBlanking>,
    provisional: &BTreeMap<GridTag, GridBlanking>,
    mode: InterpolationMode,
    callbacks: Option<&dyn SolverCallbacks>,
) -> Result<Vec<Receptor>, OversetError> {
    let mut out = Vec::new();
    for grid in registry.grids() {
        let (Some(cur), Some(prov)) = (current.get(&grid.tag()), provisional.get(&grid.tag()))
        else {
            continue;
        };
        match mode {
            InterpolationMode::Nodal => {
                out.extend(
                    (0..grid.nnodes())
                        .filter(|&n| cur.nodes[n].is_hole() && !prov.nodes[n].is_hole())
                        .map(|n| receptor(grid.tag(), ReceptorId::Node(n), grid.node(n))),
                );
            }
            InterpolationMode::HighOrder => {
                let cb = callbacks.ok_or(OversetError::MissingCallbacks("high-order receptors"))?;
                for cell in (0..grid.ncells())
                    .filter(|&c| cur.cells[c].is_hole() && !prov.cells[c].is_hole())
                {
                    cell_points(cb, grid, cell, &mut out)?;
                }
            }
        }
    }
    Ok(out)
}
