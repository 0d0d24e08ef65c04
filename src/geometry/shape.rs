//! Shape functions and isoparametric mappings for 3D cells.
//!
//! The reference elements use the following vertex ordering:
//! - Tetrahedron: `[v0, v1, v2, v3]` with `(r, s, t)` in the unit tetrahedron.
//! - Pyramid: `[v0, v1, v2, v3, v4]` with `(r, s)` in `[0, 1]^2` and apex at `t = 1`.
//! - Prism: `[v0, v1, v2, v3, v4, v5]` with `(r, s)` in the unit triangle and `t` in `[0, 1]`.
//! - Hexahedron: `[v0, v1, v2, v3, v4, v5, v6, v7]` with `(r, s, t)` in `[0, 1]^3`.
//!
//! [`locate`] combines the inverse map with a reference-domain containment test
//! and is the built-in donor inclusion test used in nodal mode.

use crate::config::OversetConfig;
use crate::overset_error::OversetError;
use crate::topology::cell_type::CellType;

const EPS: f64 = 1e-14;

/// Parameters of the Newton inverse map and the containment test.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InverseMapOptions {
    pub max_iterations: usize,
    pub tolerance: f64,
    pub containment_tolerance: f64,
}

impl Default for InverseMapOptions {
    fn default() -> Self {
        InverseMapOptions::from(&OversetConfig::default())
    }
}

impl From<&OversetConfig> for InverseMapOptions {
    fn from(cfg: &OversetConfig) -> Self {
        Self {
            max_iterations: cfg.newton_max_iterations,
            tolerance: cfg.newton_tolerance,
            containment_tolerance: cfg.containment_tolerance,
        }
    }
}

/// Linear shape function values and reference gradients at `rst`.
pub fn shape_functions(cell_type: CellType, rst: &[f64; 3]) -> (Vec<f64>, Vec<[f64; 3]>) {
    let [r, s, t] = *rst;
    match cell_type {
        CellType::Tetrahedron => (
            vec![1.0 - r - s - t, r, s, t],
            vec![
                [-1.0, -1.0, -1.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
            ],
        ),
        CellType::Pyramid => {
            let tm = 1.0 - t;
            let rm = 1.0 - r;
            let sm = 1.0 - s;
            (
                vec![tm * rm * sm, tm * r * sm, tm * r * s, tm * rm * s, t],
                vec![
                    [-tm * sm, -tm * rm, -rm * sm],
                    [tm * sm, -tm * r, -r * sm],
                    [tm * s, tm * r, -r * s],
                    [-tm * s, tm * rm, -rm * s],
                    [0.0, 0.0, 1.0],
                ],
            )
        }
        CellType::Prism => {
            let rm = 1.0 - r - s;
            let tm = 1.0 - t;
            (
                vec![rm * tm, r * tm, s * tm, rm * t, r * t, s * t],
                vec![
                    [-tm, -tm, -rm],
                    [tm, 0.0, -r],
                    [0.0, tm, -s],
                    [-t, -t, rm],
                    [t, 0.0, r],
                    [0.0, t, s],
                ],
            )
        }
        CellType::Hexahedron => {
            let rm = 1.0 - r;
            let sm = 1.0 - s;
            let tm = 1.0 - t;
            (
                vec![
                    rm * sm * tm,
                    r * sm * tm,
                    r * s * tm,
                    rm * s * tm,
                    rm * sm * t,
                    r * sm * t,
                    r * s * t,
                    rm * s * t,
                ],
                vec![
                    [-sm * tm, -rm * tm, -rm * sm],
                    [sm * tm, -r * tm, -r * sm],
                    [s * tm, r * tm, -r * s],
                    [-s * tm, rm * tm, -rm * s],
                    [-sm * t, -rm * t, rm * sm],
                    [sm * t, -r * t, r * sm],
                    [s * t, r * t, r * s],
                    [-s * t, rm * t, rm * s],
                ],
            )
        }
    }
}

fn check_vertices(cell_type: CellType, vertices: &[[f64; 3]]) -> Result<(), OversetError> {
    if vertices.len() != cell_type.vertex_count() {
        return Err(OversetError::InvalidGeometry(format!(
            "vertex count mismatch for {cell_type:?}: expected {}, got {}",
            cell_type.vertex_count(),
            vertices.len()
        )));
    }
    Ok(())
}

/// Unsigned cell volume, from a tetrahedral decomposition.
pub fn cell_volume(cell_type: CellType, v: &[[f64; 3]]) -> Result<f64, OversetError> {
    check_vertices(cell_type, v)?;
    let vol = match cell_type {
        CellType::Tetrahedron => signed_volume(v[0], v[1], v[2], v[3]),
        CellType::Pyramid => {
            signed_volume(v[0], v[1], v[2], v[4]) + signed_volume(v[0], v[2], v[3], v[4])
        }
        CellType::Prism => {
            signed_volume(v[0], v[1], v[2], v[3])
                + signed_volume(v[1], v[4], v[2], v[3])
                + signed_volume(v[2], v[4], v[5], v[3])
        }
        CellType::Hexahedron => {
            signed_volume(v[0], v[1], v[3], v[4])
                + signed_volume(v[1], v[2], v[3], v[6])
                + signed_volume(v[1], v[3], v[4], v[6])
                + signed_volume(v[1], v[4], v[5], v[6])
                + signed_volume(v[3], v[4], v[6], v[7])
        }
    };
    Ok(vol.abs())
}

/// Map a point in reference coordinates to physical coordinates.
pub fn reference_to_physical(
    cell_type: CellType,
    vertices: &[[f64; 3]],
    rst: &[f64; 3],
) -> Result<[f64; 3], OversetError> {
    check_vertices(cell_type, vertices)?;
    let (weights, _) = shape_functions(cell_type, rst);
    let mut out = [0.0; 3];
    for (w, x) in weights.iter().zip(vertices) {
        out[0] += w * x[0];
        out[1] += w * x[1];
        out[2] += w * x[2];
    }
    Ok(out)
}

/// Jacobian `dx_i / dr_j`, row-major.
pub fn jacobian(
    cell_type: CellType,
    vertices: &[[f64; 3]],
    rst: &[f64; 3],
) -> Result<[f64; 9], OversetError> {
    check_vertices(cell_type, vertices)?;
    let (_, grads) = shape_functions(cell_type, rst);
    let mut jac = [0.0; 9];
    for (x, g) in vertices.iter().zip(grads.iter()) {
        for i in 0..3 {
            for j in 0..3 {
                jac[i * 3 + j] += x[i] * g[j];
            }
        }
    }
    Ok(jac)
}

fn reference_centroid(cell_type: CellType) -> [f64; 3] {
    match cell_type {
        CellType::Tetrahedron => [0.25, 0.25, 0.25],
        CellType::Pyramid => [0.5, 0.5, 0.25],
        CellType::Prism => [1.0 / 3.0, 1.0 / 3.0, 0.5],
        CellType::Hexahedron => [0.5, 0.5, 0.5],
    }
}

/// Map a physical point back to reference coordinates using Newton iteration.
///
/// Fails with [`OversetError::InvalidGeometry`] on a singular Jacobian or when
/// the iteration does not converge within `opts.max_iterations`.
pub fn physical_to_reference(
    cell_type: CellType,
    vertices: &[[f64; 3]],
    point: &[f64; 3],
    opts: &InverseMapOptions,
) -> Result<[f64; 3], OversetError> {
    check_vertices(cell_type, vertices)?;
    let mut rst = reference_centroid(cell_type);
    for _ in 0..opts.max_iterations {
        let mapped = reference_to_physical(cell_type, vertices, &rst)?;
        let residual = sub(mapped, *point);
        let inv = invert_3x3(jacobian(cell_type, vertices, &rst)?)?;
        let delta = mat_vec(&inv, residual);
        for d in 0..3 {
            rst[d] -= delta[d];
        }
        if norm(delta) <= opts.tolerance {
            return Ok(rst);
        }
    }
    Err(OversetError::InvalidGeometry(format!(
        "inverse map of {point:?} did not converge in {} iterations",
        opts.max_iterations
    )))
}

/// Whether `rst` lies in the closed reference element inflated by `tol`.
pub fn reference_contains(cell_type: CellType, rst: &[f64; 3], tol: f64) -> bool {
    let [r, s, t] = *rst;
    let unit = |x: f64| x >= -tol && x <= 1.0 + tol;
    match cell_type {
        CellType::Tetrahedron => r >= -tol && s >= -tol && t >= -tol && r + s + t <= 1.0 + tol,
        CellType::Prism => r >= -tol && s >= -tol && r + s <= 1.0 + tol && unit(t),
        CellType::Pyramid | CellType::Hexahedron => unit(r) && unit(s) && unit(t),
    }
}

/// Built-in inclusion test: reference coordinates and nodal weights of `point`
/// in the cell, or `None` if the point is outside or the map breaks down.
pub fn locate(
    cell_type: CellType,
    vertices: &[[f64; 3]],
    point: &[f64; 3],
    opts: &InverseMapOptions,
) -> Option<([f64; 3], Vec<f64>)> {
    let rst = match physical_to_reference(cell_type, vertices, point, opts) {
        Ok(rst) => rst,
        Err(e) => {
            log::debug!("inverse map rejected candidate: {e}");
            return None;
        }
    };
    if !reference_contains(cell_type, &rst, opts.containment_tolerance) {
        return None;
    }
    let (weights, _) = shape_functions(cell_type, &rst);
    Some((rst, weights))
}

pub(crate) fn invert_3x3(mat: [f64; 9]) -> Result<[f64; 9], OversetError> {
    let det = mat[0] * (mat[4] * mat[8] - mat[5] * mat[7])
        - mat[1] * (mat[3] * mat[8] - mat[5] * mat[6])
        + mat[2] * (mat[3] * mat[7] - mat[4] * mat[6]);
    if !det.is_finite() || det.abs() <= EPS {
        return Err(OversetError::InvalidGeometry("degenerate jacobian".into()));
    }
    let inv_det = 1.0 / det;
    Ok([
        (mat[4] * mat[8] - mat[5] * mat[7]) * inv_det,
        (mat[2] * mat[7] - mat[1] * mat[8]) * inv_det,
        (mat[1] * mat[5] - mat[2] * mat[4]) * inv_det,
        (mat[5] * mat[6] - mat[3] * mat[8]) * inv_det,
        (mat[0] * mat[8] - mat[2] * mat[6]) * inv_det,
        (mat[2] * mat[3] - mat[0] * mat[5]) * inv_det,
        (mat[3] * mat[7] - mat[4] * mat[6]) * inv_det,
        (mat[1] * mat[6] - mat[0] * mat[7]) * inv_det,
        (mat[0] * mat[4] - mat[1] * mat[3]) * inv_det,
    ])
}

pub(crate) fn mat_vec(m: &[f64; 9], v: [f64; 3]) -> [f64; 3] {
    [
        m[0] * v[0] + m[1] * v[1] + m[2] * v[2],
        m[3] * v[0] + m[4] * v[1] + m[5] * v[2],
        m[6] * v[0] + m[7] * v[1] + m[8] * v[2],
    ]
}

fn signed_volume(a: [f64; 3], b: [f64; 3], c: [f64; 3], d: [f64; 3]) -> f64 {
    dot(sub(b, a), cross(sub(c, a), sub(d, a))) / 6.0
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-10
    }

    fn unit_hex(scale: f64, origin: [f64; 3]) -> Vec<[f64; 3]> {
        let corners = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [0.0, 1.0, 1.0],
        ];
        corners
            .iter()
            .map(|c| {
                [
                    origin[0] + scale * c[0],
                    origin[1] + scale * c[1],
                    origin[2] + scale * c[2],
                ]
            })
            .collect()
    }

    #[test]
    fn weights_form_partition_of_unity() {
        let rst = [0.2, 0.3, 0.4];
        for ct in [
            CellType::Tetrahedron,
            CellType::Pyramid,
            CellType::Prism,
            CellType::Hexahedron,
        ] {
            let (w, _) = shape_functions(ct, &rst);
            assert_eq!(w.len(), ct.vertex_count());
            assert!(approx(w.iter().sum::<f64>(), 1.0));
        }
    }

    #[test]
    fn hex_volume_and_mapping() {
        let v = unit_hex(2.0, [1.0, 0.0, -1.0]);
        assert!(approx(cell_volume(CellType::Hexahedron, &v).unwrap(), 8.0));
        let x = reference_to_physical(CellType::Hexahedron, &v, &[0.5, 0.5, 0.5]).unwrap();
        assert!(approx(x[0], 2.0) && approx(x[1], 1.0) && approx(x[2], 0.0));
    }

    #[test]
    fn inverse_map_recovers_reference_point() {
        let v = unit_hex(0.5, [3.0, 3.0, 3.0]);
        let opts = InverseMapOptions::default();
        let p = [3.1, 3.2, 3.45];
        let rst = physical_to_reference(CellType::Hexahedron, &v, &p, &opts).unwrap();
        assert!(approx(rst[0], 0.2) && approx(rst[1], 0.4) && approx(rst[2], 0.9));
    }

    #[test]
    fn locate_rejects_outside_points() {
        let v = unit_hex(1.0, [0.0; 3]);
        let opts = InverseMapOptions::default();
        assert!(locate(CellType::Hexahedron, &v, &[1.5, 0.5, 0.5], &opts).is_none());
        let (_, w) = locate(CellType::Hexahedron, &v, &[1.0, 0.5, 0.5], &opts).unwrap();
        assert!(approx(w.iter().sum::<f64>(), 1.0));
    }

    #[test]
    fn tet_locate_and_volume() {
        let v = [
            [0.0, 0.0, 0.0],
            [1.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 1.0],
        ];
        assert!(approx(
            cell_volume(CellType::Tetrahedron, &v).unwrap(),
            1.0 / 6.0
        ));
        let opts = InverseMapOptions::default();
        let (rst, w) = locate(CellType::Tetrahedron, &v, &[0.1, 0.2, 0.3], &opts).unwrap();
        assert!(approx(rst[0], 0.1) && approx(w[0], 0.4));
        assert!(locate(CellType::Tetrahedron, &v, &[0.5, 0.5, 0.5], &opts).is_none());
    }

    #[test]
    fn degenerate_cell_is_reported() {
        let v = [[0.0; 3]; 4];
        let opts = InverseMapOptions::default();
        assert!(matches!(
            physical_to_reference(CellType::Tetrahedron, &v, &[0.0; 3], &opts),
            Err(OversetError::InvalidGeometry(_))
        ));
    }
}
