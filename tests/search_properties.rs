use mesh_overset::geometry::Aabb;
use mesh_overset::geometry::shape::{InverseMapOptions, locate, shape_functions};
use mesh_overset::search::Adt;
use mesh_overset::topology::CellType;
use proptest::prelude::*;

fn arb_box() -> impl Strategy<Value = Aabb> {
    (
        prop::array::uniform3(-10.0f64..10.0),
        prop::array::uniform3(0.0f64..4.0),
    )
        .prop_map(|(lo, ext)| Aabb::new(lo, [lo[0] + ext[0], lo[1] + ext[1], lo[2] + ext[2]]))
}

proptest! {
    #[test]
    fn adt_point_query_matches_brute_force(
        boxes in prop::collection::vec(arb_box(), 0..60),
        p in prop::array::uniform3(-12.0f64..12.0),
    ) {
        let tree = Adt::build(boxes.clone());
        let mut got = Vec::new();
        tree.query_point(&p, &mut got);
        got.sort_unstable();
        let want: Vec<usize> = (0..boxes.len()).filter(|&i| boxes[i].contains(&p)).collect();
        prop_assert_eq!(got, want);
    }

    #[test]
    fn adt_box_query_matches_brute_force(
        boxes in prop::collection::vec(arb_box(), 0..60),
        q in arb_box(),
    ) {
        let tree = Adt::build(boxes.clone());
        let mut got = Vec::new();
        tree.query_box(&q, &mut got);
        got.sort_unstable();
        let want: Vec<usize> = (0..boxes.len()).filter(|&i| boxes[i].overlaps(&q)).collect();
        prop_assert_eq!(got, want);
    }

    #[test]
    fn shape_functions_partition_unity(rst in prop::array::uniform3(0.0f64..1.0)) {
        for ct in [CellType::Tetrahedron, CellType::Pyramid, CellType::Prism, CellType::Hexahedron] {
            let (w, _) = shape_functions(ct, &rst);
            prop_assert_eq!(w.len(), ct.vertex_count());
            let sum: f64 = w.iter().sum();
            prop_assert!((sum - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn hex_weights_reproduce_the_point(
        lo in prop::array::uniform3(-5.0f64..5.0),
        h in 0.1f64..3.0,
        frac in prop::array::uniform3(0.0f64..1.0),
    ) {
        let corner = |i: usize, j: usize, k: usize| {
            [lo[0] + h * i as f64, lo[1] + h * j as f64, lo[2] + h * k as f64]
        };
        let v = vec![
            corner(0, 0, 0), corner(1, 0, 0), corner(1, 1, 0), corner(0, 1, 0),
            corner(0, 0, 1), corner(1, 0, 1), corner(1, 1, 1), corner(0, 1, 1),
        ];
        let p = [lo[0] + h * frac[0], lo[1] + h * frac[1], lo[2] + h * frac[2]];
        let (_, w) = locate(CellType::Hexahedron, &v, &p, &InverseMapOptions::default())
            .expect("point inside the cell");
        let sum: f64 = w.iter().sum();
        prop_assert!((sum - 1.0).abs() < 1e-10);
        for d in 0..3 {
            let x: f64 = w.iter().zip(&v).map(|(wi, vi)| wi * vi[d]).sum();
            prop_assert!((x - p[d]).abs() < 1e-9 * (1.0 + h));
        }
    }
}
