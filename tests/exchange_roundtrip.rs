mod util;

use mesh_overset::prelude::*;
use util::*;

#[test]
fn linear_solution_is_reproduced_at_receptors() {
    let (bg, blk) = (background(), inner_block());
    let (mut group, report) = connected(OversetConfig::default(), &[&bg, &blk]);
    let mut field = NodalField::linear(&[&bg, &blk], 2);

    // Refined-block receptors only read background donors.
    for &n in &blk.over_nodes {
        field.set(GridTag(1), n, -99.0);
    }
    let filled = group.exchange_solution(&NoComm, &mut field, 2).unwrap();
    assert_eq!(filled, report.resolved);

    for &n in &blk.over_nodes {
        for f in 0..2 {
            let got = field.value(GridTag(1), n, f);
            let want = field.exact(GridTag(1), n, f);
            assert!((got - want).abs() < 1e-9, "node {n} field {f}: {got} vs {want}");
        }
    }
    assert_eq!(group.state(), ConnectivityState::Connected);
}

#[test]
fn gradients_are_exchanged_dimension_major() {
    let (bg, blk) = (background(), inner_block());
    let (mut group, _) = connected(OversetConfig::default(), &[&bg, &blk]);
    let mut field = NodalField::linear(&[&bg, &blk], 2);
    for &n in &blk.over_nodes {
        field.set(GridTag(1), n, 0.0);
    }
    group.exchange_gradient(&NoComm, &mut field, 2).unwrap();
    for &n in &blk.over_nodes {
        for d in 0..3 {
            for f in 0..2 {
                let got = field.gradient(GridTag(1), n, d, f);
                assert!((got - linear_gradient(d, f)).abs() < 1e-9);
            }
        }
    }
}

#[test]
fn missing_accessor_fails_the_exchange() {
    struct Nothing;
    impl FieldAccess for Nothing {}

    let (bg, blk) = (background(), inner_block());
    let (mut group, _) = connected(OversetConfig::default(), &[&bg, &blk]);
    let err = group.exchange_solution(&NoComm, &mut Nothing, 1).unwrap_err();
    assert!(matches!(
        err,
        OversetError::CallbackFailure {
            callback: "q_node",
            ..
        }
    ));
    // The group stays usable.
    assert_eq!(group.state(), ConnectivityState::Connected);
}

#[test]
fn exchange_before_connectivity_is_rejected() {
    let mut group = OversetGroup::init(3, OversetConfig::default()).unwrap();
    group.register_grid(background()).unwrap();
    let mut field = NodalField::linear(&[&background()], 1);
    let err = group.exchange_solution(&NoComm, &mut field, 1).unwrap_err();
    assert!(matches!(err, OversetError::NotConnected { .. }));

    group.preprocess(&NoComm).unwrap();
    let err = group.exchange_gradient(&NoComm, &mut field, 1).unwrap_err();
    assert!(matches!(
        err,
        OversetError::NotConnected {
            state: ConnectivityState::Preprocessed,
            ..
        }
    ));
}

#[test]
fn device_exchange_batches_per_grid() {
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Log {
        staged: Vec<(GridTag, usize)>,
        fringe: Vec<(GridTag, usize, usize)>,
    }
    struct Device(Arc<Mutex<Log>>);
    impl DeviceCallbacks for Device {
        fn donor_data_from_device(
            &mut self,
            grid: GridTag,
            cells: &[usize],
            _kind: DataKind,
            _handles: &DeviceHandles,
        ) -> Result<(), CallbackError> {
            self.0.lock().unwrap().staged.push((grid, cells.len()));
            Ok(())
        }
        fn fringe_data_to_device(
            &mut self,
            grid: GridTag,
            points: &[ReceptorId],
            _kind: DataKind,
            values: &[f64],
            _handles: &DeviceHandles,
        ) -> Result<(), CallbackError> {
            self.0
                .lock()
                .unwrap()
                .fringe
                .push((grid, points.len(), values.len()));
            Ok(())
        }
        fn unblank_data_to_device(
            &mut self,
            _grid: GridTag,
            _points: &[ReceptorId],
            _values: &[f64],
            _handles: &DeviceHandles,
        ) -> Result<(), CallbackError> {
            Err(CallbackError::new("not expected"))
        }
    }

    let (bg, blk) = (background(), inner_block());
    let (mut group, _) = connected(OversetConfig::default(), &[&bg, &blk]);
    let log = Arc::new(Mutex::new(Log::default()));
    let handles = DeviceHandles { stream: 7, event: 9 };
    group
        .set_device(Box::new(Device(Arc::clone(&log))), handles)
        .unwrap();

    let mut field = NodalField::linear(&[&bg, &blk], 1);
    let filled = group.exchange_solution_device(&NoComm, &mut field, 1).unwrap();
    assert_eq!(filled, 98 + 386);

    let log = log.lock().unwrap();
    let staged: Vec<GridTag> = log.staged.iter().map(|&(g, _)| g).collect();
    assert_eq!(staged, vec![GridTag(0), GridTag(1)]);
    let mut fringe = log.fringe.clone();
    fringe.sort();
    assert_eq!(fringe, vec![(GridTag(0), 98, 98), (GridTag(1), 386, 386)]);
}

#[test]
fn device_exchange_without_hooks_is_an_error() {
    let (bg, blk) = (background(), inner_block());
    let (mut group, _) = connected(OversetConfig::default(), &[&bg, &blk]);
    let mut field = NodalField::linear(&[&bg, &blk], 1);
    let err = group
        .exchange_solution_device(&NoComm, &mut field, 1)
        .unwrap_err();
    assert_eq!(err, OversetError::MissingCallbacks("device exchange"));
}
