mod util;

use mesh_overset::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use util::*;

/// Two solution points per hex, at fixed offsets from the cell's low corner.
struct TwoPointSolver {
    cells: BTreeMap<GridTag, Vec<[[f64; 3]; 2]>>,
    fail_frac: Arc<AtomicBool>,
    reject_all: Arc<AtomicBool>,
    conversions: Arc<AtomicUsize>,
}

fn cell_boxes(data: &GridData) -> Vec<[[f64; 3]; 2]> {
    let block = &data.cell_blocks[0];
    block
        .conn
        .chunks_exact(block.nvert)
        .map(|cell| {
            let mut lo = [f64::INFINITY; 3];
            let mut hi = [f64::NEG_INFINITY; 3];
            for &n in cell {
                for d in 0..3 {
                    let x = data.node_coords[3 * n + d];
                    lo[d] = lo[d].min(x);
                    hi[d] = hi[d].max(x);
                }
            }
            [lo, hi]
        })
        .collect()
}

impl TwoPointSolver {
    fn new(grids: &[&GridData]) -> Self {
        Self {
            cells: grids
                .iter()
                .map(|g| (GridTag(g.tag), cell_boxes(g)))
                .collect(),
            fail_frac: Arc::new(AtomicBool::new(false)),
            reject_all: Arc::new(AtomicBool::new(false)),
            conversions: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn cell(&self, grid: GridTag, cell: usize) -> Result<[[f64; 3]; 2], CallbackError> {
        self.cells
            .get(&grid)
            .and_then(|c| c.get(cell))
            .copied()
            .ok_or_else(|| CallbackError::new(format!("no cell {cell} in grid {grid}")))
    }
}

impl SolverCallbacks for TwoPointSolver {
    fn nodes_per_cell(&self, _grid: GridTag, _cell: usize) -> usize {
        2
    }

    fn nodes_per_face(&self, _grid: GridTag, _face: usize) -> usize {
        0
    }

    fn receptor_nodes(&self, grid: GridTag, cell: usize, out: &mut [f64]) -> Result<(), CallbackError> {
        let [lo, _] = self.cell(grid, cell)?;
        for (p, offset) in [0.6, 0.7].into_iter().enumerate() {
            for d in 0..3 {
                out[3 * p + d] = lo[d] + offset;
            }
        }
        Ok(())
    }

    fn face_nodes(&self, _grid: GridTag, _face: usize, _out: &mut [f64]) -> Result<(), CallbackError> {
        Ok(())
    }

    fn donor_inclusion_test(
        &self,
        grid: GridTag,
        cell: usize,
        xyz: &[f64; 3],
    ) -> Result<Option<[f64; 3]>, CallbackError> {
        let [lo, hi] = self.cell(grid, cell)?;
        if self.reject_all.load(Ordering::SeqCst) {
            return Ok(None);
        }
        if (0..3).any(|d| xyz[d] < lo[d] - 1e-12 || xyz[d] > hi[d] + 1e-12) {
            return Ok(None);
        }
        Ok(Some(std::array::from_fn(|d| {
            2.0 * (xyz[d] - lo[d]) / (hi[d] - lo[d]) - 1.0
        })))
    }

    fn donor_frac(
        &self,
        grid: GridTag,
        _cell: usize,
        _rst: &[f64; 3],
        modal: Option<&[f64]>,
        weights: &mut [f64],
    ) -> Result<(), CallbackError> {
        if self.fail_frac.load(Ordering::SeqCst) {
            return Err(CallbackError::new(format!("basis unavailable on grid {grid}")));
        }
        let scale = modal.map_or(1.0, |m| m[0]);
        weights.fill(scale / weights.len() as f64);
        Ok(())
    }

    fn requires_modal(&self, donor: GridTag, _receptor: GridTag, _point: &ReceptorId) -> bool {
        donor == GridTag(1)
    }

    fn convert_to_modal(&self, _grid: GridTag, _cell: usize) -> Result<Vec<f64>, CallbackError> {
        self.conversions.fetch_add(1, Ordering::SeqCst);
        Ok(vec![1.0])
    }
}

fn high_order_group(solver: TwoPointSolver) -> OversetGroup {
    let cfg = OversetConfig::default().with_mode(InterpolationMode::HighOrder);
    let mut group = OversetGroup::init(0, cfg).unwrap();
    group.register_grid(background()).unwrap();
    group.register_grid(inner_block()).unwrap();
    group.set_callbacks(Box::new(solver)).unwrap();
    group.preprocess(&NoComm).unwrap();
    group
}

#[test]
fn fringe_cells_receive_solution_points() {
    let (bg, blk) = (background(), inner_block());
    let solver = TwoPointSolver::new(&[&bg, &blk]);
    let conversions = Arc::clone(&solver.conversions);
    let mut group = high_order_group(solver);
    let report = group.perform_full_connectivity(&NoComm).unwrap();

    // 56 fringe cells of the background, two points each, all served by the
    // refined block; both points of a cell fall into the same donor cell.
    assert_eq!(report.receptors, 112);
    assert_eq!(report.resolved, 112);
    assert_eq!(report.modal_conversions, 56);
    assert_eq!(conversions.load(Ordering::SeqCst), 56);

    let records = group.donor_records();
    assert!(records.iter().all(|r| r.modal && r.donor_grid == GridTag(1)));
    assert!(records.iter().all(|r| matches!(r.receptor, ReceptorId::CellPoint { .. })));
    assert!(records.iter().all(|r| r.dofs.len() == 2));
}

#[test]
fn callback_failure_keeps_the_active_version() {
    let (bg, blk) = (background(), inner_block());
    let solver = TwoPointSolver::new(&[&bg, &blk]);
    let fail = Arc::clone(&solver.fail_frac);
    let mut group = high_order_group(solver);
    group.perform_full_connectivity(&NoComm).unwrap();
    let records = group.donor_records().to_vec();

    fail.store(true, Ordering::SeqCst);
    let err = group.perform_full_connectivity(&NoComm).unwrap_err();
    assert!(matches!(
        err,
        OversetError::CallbackFailure {
            grid: GridTag(1),
            callback: "donor_frac",
            ..
        }
    ));
    assert_eq!(group.version(), 1);
    assert_eq!(group.state(), ConnectivityState::Connected);
    assert_eq!(group.donor_records(), records.as_slice());
}

#[test]
fn high_order_mode_needs_callbacks() {
    let cfg = OversetConfig::default().with_mode(InterpolationMode::HighOrder);
    let (bg, blk) = (background(), inner_block());
    let mut group = OversetGroup::init(0, cfg).unwrap();
    group.register_grid(bg).unwrap();
    group.register_grid(blk).unwrap();
    group.preprocess(&NoComm).unwrap();
    assert!(matches!(
        group.perform_full_connectivity(&NoComm),
        Err(OversetError::MissingCallbacks(_))
    ));
    assert_eq!(group.state(), ConnectivityState::Preprocessed);
}

/// Solution-point storage exposed as one strided buffer per grid.
struct SptField {
    q: BTreeMap<GridTag, Vec<f64>>,
}

impl FieldAccess for SptField {
    fn q_spts(&mut self, grid: GridTag) -> Option<StridedView<'_>> {
        let data = self.q.get_mut(&grid)?;
        Some(StridedView {
            data: data.as_mut_slice(),
            cell_stride: 2,
            point_stride: 1,
            dim_stride: 0,
            field_stride: 0,
        })
    }
}

#[test]
fn solution_points_exchange_through_strided_views() {
    let (bg, blk) = (background(), inner_block());
    let mut group = high_order_group(TwoPointSolver::new(&[&bg, &blk]));
    group.perform_full_connectivity(&NoComm).unwrap();

    // Constant 3.0 in the block; weights average two points.
    let mut field = SptField {
        q: BTreeMap::from([
            (GridTag(0), vec![0.0; 2 * 1000]),
            (GridTag(1), vec![3.0; 2 * 512]),
        ]),
    };
    let filled = group.exchange_solution(&NoComm, &mut field, 1).unwrap();
    assert_eq!(filled, 112);
    let bg_q = &field.q[&GridTag(0)];
    assert_eq!(bg_q.iter().filter(|&&v| (v - 3.0).abs() < 1e-12).count(), 112);
}

#[test]
fn points_without_confirmed_donor_stay_unresolved() {
    let (bg, blk) = (background(), inner_block());
    let solver = TwoPointSolver::new(&[&bg, &blk]);
    solver.reject_all.store(true, Ordering::SeqCst);
    let mut group = high_order_group(solver);
    let report = group.perform_full_connectivity(&NoComm).unwrap();

    // Every point has candidate cells in the block, none of them confirms.
    assert_eq!(report.receptors, 112);
    assert_eq!(report.resolved, 0);
    assert_eq!(report.unresolved.len(), 112);
    assert!(group.donor_records().is_empty());
    assert!(group.exchange_plan().unwrap().is_empty());

    let listed: BTreeSet<(GridTag, ReceptorId)> =
        group.unresolved().iter().map(|r| (r.grid, r.id)).collect();
    let reported: BTreeSet<(GridTag, ReceptorId)> = report.unresolved.iter().copied().collect();
    assert_eq!(listed, reported);
    assert_eq!(group.last_report(), Some(&report));

    let errors: Vec<OversetError> = report.no_donor_errors().collect();
    assert_eq!(errors.len(), 112);
    assert!(errors.iter().all(|e| matches!(
        e,
        OversetError::NoDonorFound {
            grid: GridTag(0),
            receptor: ReceptorId::CellPoint { .. }
        }
    )));

    let mut field = SptField {
        q: BTreeMap::from([
            (GridTag(0), vec![0.0; 2 * 1000]),
            (GridTag(1), vec![3.0; 2 * 512]),
        ]),
    };
    assert_eq!(group.exchange_solution(&NoComm, &mut field, 1).unwrap(), 0);
    assert!(field.q[&GridTag(0)].iter().all(|&v| v == 0.0));
}
