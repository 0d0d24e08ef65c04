mod util;

use mesh_overset::prelude::*;
use util::*;

struct RankOutcome {
    report: ConnectivityReport,
    filled: usize,
    max_error: f64,
}

/// Rank 0 owns the background, rank 1 the refined block.
fn run_rank(comm: &RayonComm) -> RankOutcome {
    let data = if comm.rank() == 0 { background() } else { inner_block() };
    let tag = GridTag(data.tag);
    let mut group = OversetGroup::init(0, OversetConfig::default()).unwrap();
    group.register_grid(data.clone()).unwrap();
    group.preprocess(comm).unwrap();
    let report = group.perform_full_connectivity(comm).unwrap();

    let mut field = NodalField::linear(&[&data], 1);
    let receptors: Vec<usize> = group
        .receptors()
        .iter()
        .filter_map(|r| match r.id {
            ReceptorId::Node(n) => Some(n),
            _ => None,
        })
        .collect();
    // Only block receptors are perturbed; their donors never read them.
    if comm.rank() == 1 {
        for &n in &receptors {
            field.set(tag, n, 42.0);
        }
    }
    let filled = group.exchange_solution(comm, &mut field, 1).unwrap();
    let max_error = if comm.rank() == 1 {
        receptors
            .iter()
            .map(|&n| (field.value(tag, n, 0) - field.exact(tag, n, 0)).abs())
            .fold(0.0, f64::max)
    } else {
        0.0
    };
    RankOutcome {
        report,
        filled,
        max_error,
    }
}

#[test]
fn two_ranks_match_the_single_rank_result() {
    let world = RayonComm::world(2);
    let outcomes: Vec<RankOutcome> = std::thread::scope(|s| {
        let handles: Vec<_> = world
            .iter()
            .map(|comm| s.spawn(move || run_rank(comm)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let (r0, r1) = (&outcomes[0].report, &outcomes[1].report);
    assert_eq!((r0.hole_nodes, r0.fringe_nodes), (27, 98));
    assert_eq!((r1.hole_nodes, r1.fringe_nodes), (0, 386));
    assert_eq!(r0.overlap_cut, 27);
    for o in &outcomes {
        assert_eq!(o.report.version, 1);
        assert_eq!(o.report.resolved, o.report.receptors);
        assert_eq!(o.filled, o.report.receptors);
    }
    assert!(outcomes[1].max_error < 1e-9);
}

#[test]
fn failing_rank_aborts_every_rank() {
    let world = RayonComm::world(2);
    let results: Vec<Result<ConnectivityReport, OversetError>> = std::thread::scope(|s| {
        let handles: Vec<_> = world
            .iter()
            .map(|comm| {
                s.spawn(move || {
                    let cfg = if comm.rank() == 1 {
                        // No callbacks: rank 1 fails while collecting receptors.
                        OversetConfig::default().with_mode(InterpolationMode::HighOrder)
                    } else {
                        OversetConfig::default()
                    };
                    let data = if comm.rank() == 0 { background() } else { inner_block() };
                    let mut group = OversetGroup::init(0, cfg).unwrap();
                    group.register_grid(data).unwrap();
                    group.preprocess(comm).unwrap();
                    let out = group.perform_full_connectivity(comm);
                    assert_eq!(group.version(), 0);
                    out
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(matches!(
        results[0],
        Err(OversetError::CommError { neighbor: 1, .. })
    ));
    assert!(matches!(results[1], Err(OversetError::MissingCallbacks(_))));
}
