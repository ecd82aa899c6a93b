//! Geometry kernel for linear simplex elements.
//!
//! Signed volumes, shape-function gradients, element quality and the
//! characteristic lengths used by the critical time step. The sign of
//! the volume is kept: a negative value marks an inverted element and
//! must never be silently absolute-valued.

use rayon::prelude::*;

use crate::constants::*;

/// Signed measure of one element: area in 2D, volume in 3D.
#[cfg(not(feature = "three_d"))]
pub fn element_volume(coord: &[Vector], conn: &Conn) -> f64 {
    let p0 = coord[conn[0]];
    let p1 = coord[conn[1]];
    let p2 = coord[conn[2]];
    0.5 * ((p1[0] - p0[0]) * (p2[1] - p0[1]) - (p2[0] - p0[0]) * (p1[1] - p0[1]))
}

#[cfg(feature = "three_d")]
pub fn element_volume(coord: &[Vector], conn: &Conn) -> f64 {
    let p0 = coord[conn[0]];
    let d1 = sub(coord[conn[1]], p0);
    let d2 = sub(coord[conn[2]], p0);
    let d3 = sub(coord[conn[3]], p0);
    // triple product / 6
    (d1[0] * (d2[1] * d3[2] - d2[2] * d3[1]) - d1[1] * (d2[0] * d3[2] - d2[2] * d3[0])
        + d1[2] * (d2[0] * d3[1] - d2[1] * d3[0]))
        / 6.0
}

#[cfg(feature = "three_d")]
fn sub(a: Vector, b: Vector) -> Vector {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

/// Fill the per-element signed volumes.
pub fn compute_volume(coord: &[Vector], connectivity: &[Conn], volume: &mut [f64]) {
    for (e, conn) in connectivity.iter().enumerate() {
        volume[e] = element_volume(coord, conn);
    }
}

/// Nodal volume share: each node receives 1/NODES_PER_ELEM of the volume
/// of every incident element.
pub fn compute_volume_n(connectivity: &[Conn], volume: &[f64], volume_n: &mut [f64]) {
    volume_n.fill(0.0);
    for (e, conn) in connectivity.iter().enumerate() {
        let share = volume[e] / NODES_PER_ELEM as f64;
        for &n in conn {
            volume_n[n] += share;
        }
    }
}

/// Shape-function spatial gradients of the linear simplex.
///
/// The gradient of the basis function of vertex i is the inward normal
/// of the opposite facet divided by (NDIMS * volume); here it is
/// evaluated through the inverse edge matrix, which is the same thing.
/// `shpdy` is only written in 3D.
#[allow(unused_variables)]
pub fn compute_shape_fn(
    coord: &[Vector],
    connectivity: &[Conn],
    volume: &[f64],
    shpdx: &mut [ShapeFn],
    shpdy: &mut [ShapeFn],
    shpdz: &mut [ShapeFn],
) {
    #[cfg(not(feature = "three_d"))]
    for (e, conn) in connectivity.iter().enumerate() {
        let inv2a = 1.0 / (2.0 * volume[e]);
        for i in 0..NODES_PER_ELEM {
            let j = conn[(i + 1) % 3];
            let k = conn[(i + 2) % 3];
            shpdx[e][i] = (coord[j][1] - coord[k][1]) * inv2a;
            shpdz[e][i] = (coord[k][0] - coord[j][0]) * inv2a;
        }
    }

    #[cfg(feature = "three_d")]
    for (e, conn) in connectivity.iter().enumerate() {
        use nalgebra::{Matrix3, Vector3};
        let p0 = coord[conn[0]];
        let d1 = sub(coord[conn[1]], p0);
        let d2 = sub(coord[conn[2]], p0);
        let d3 = sub(coord[conn[3]], p0);
        let jt = Matrix3::from_columns(&[
            Vector3::from(d1),
            Vector3::from(d2),
            Vector3::from(d3),
        ]);
        let inv = jt.try_inverse().unwrap_or_else(Matrix3::zeros);
        // rows of inv are the gradients of N1..N3; N0 closes the partition
        for d in 0..NDIMS {
            let g1 = inv[(0, d)];
            let g2 = inv[(1, d)];
            let g3 = inv[(2, d)];
            let g0 = -(g1 + g2 + g3);
            let out = match d {
                0 => &mut shpdx[e],
                1 => &mut shpdy[e],
                _ => &mut shpdz[e],
            };
            out[0] = g0;
            out[1] = g1;
            out[2] = g2;
            out[3] = g3;
        }
    }
}

/// Element centroid.
pub fn elem_center(coord: &[Vector], conn: &Conn) -> Vector {
    let mut c = [0.0; NDIMS];
    for &n in conn {
        for d in 0..NDIMS {
            c[d] += coord[n][d];
        }
    }
    for d in 0..NDIMS {
        c[d] /= NODES_PER_ELEM as f64;
    }
    c
}

fn distance(a: Vector, b: Vector) -> f64 {
    let mut s = 0.0;
    for d in 0..NDIMS {
        s += (a[d] - b[d]) * (a[d] - b[d]);
    }
    s.sqrt()
}

/// Measure of a boundary facet: edge length in 2D, triangle area in 3D.
pub fn facet_measure(coord: &[Vector], facet: &Facet) -> f64 {
    #[cfg(not(feature = "three_d"))]
    {
        distance(coord[facet[0]], coord[facet[1]])
    }
    #[cfg(feature = "three_d")]
    {
        let d1 = sub(coord[facet[1]], coord[facet[0]]);
        let d2 = sub(coord[facet[2]], coord[facet[0]]);
        let cx = d1[1] * d2[2] - d1[2] * d2[1];
        let cy = d1[2] * d2[0] - d1[0] * d2[2];
        let cz = d1[0] * d2[1] - d1[1] * d2[0];
        0.5 * (cx * cx + cy * cy + cz * cz).sqrt()
    }
}

/// Facet normal scaled by the facet measure, oriented away from
/// `inside`, a point in the interior of the adjacent element.
pub fn facet_normal_outward(coord: &[Vector], facet: &Facet, inside: Vector) -> Vector {
    #[cfg(not(feature = "three_d"))]
    let mut n = {
        let p0 = coord[facet[0]];
        let p1 = coord[facet[1]];
        [p1[1] - p0[1], -(p1[0] - p0[0])]
    };
    #[cfg(feature = "three_d")]
    let mut n = {
        let d1 = sub(coord[facet[1]], coord[facet[0]]);
        let d2 = sub(coord[facet[2]], coord[facet[0]]);
        [
            0.5 * (d1[1] * d2[2] - d1[2] * d2[1]),
            0.5 * (d1[2] * d2[0] - d1[0] * d2[2]),
            0.5 * (d1[0] * d2[1] - d1[1] * d2[0]),
        ]
    };

    let mut mid = [0.0; NDIMS];
    for &p in facet.iter() {
        for d in 0..NDIMS {
            mid[d] += coord[p][d];
        }
    }
    let mut dot = 0.0;
    for d in 0..NDIMS {
        mid[d] /= NODES_PER_FACET as f64;
        dot += n[d] * (mid[d] - inside[d]);
    }
    if dot < 0.0 {
        for c in n.iter_mut() {
            *c = -*c;
        }
    }
    n
}

/// Smallest altitude of the element, the length scale of the CFL bound:
/// NDIMS * volume / (largest facet measure).
pub fn element_min_altitude(coord: &[Vector], conn: &Conn) -> f64 {
    let vol = element_volume(coord, conn);
    let mut max_facet: f64 = 0.0;
    for facet_nodes in NODE_OF_FACET.iter() {
        let mut facet = [0usize; NODES_PER_FACET];
        for (j, &loc) in facet_nodes.iter().enumerate() {
            facet[j] = conn[loc];
        }
        max_facet = max_facet.max(facet_measure(coord, &facet));
    }
    if max_facet == 0.0 {
        return 0.0;
    }
    NDIMS as f64 * vol / max_facet
}

/// Element quality: ratio of inscribed to circumscribed radius,
/// normalized so the regular simplex scores 1. Nonpositive for
/// degenerate or inverted elements.
#[cfg(not(feature = "three_d"))]
pub fn element_quality(coord: &[Vector], conn: &Conn) -> f64 {
    let area = element_volume(coord, conn);
    let a = distance(coord[conn[0]], coord[conn[1]]);
    let b = distance(coord[conn[1]], coord[conn[2]]);
    let c = distance(coord[conn[2]], coord[conn[0]]);
    let denom = (a + b + c) * a * b * c;
    if denom == 0.0 {
        return 0.0;
    }
    // 2 r_in / R_circ with r_in = 2A/(a+b+c), R_circ = abc/(4A)
    16.0 * area * area.abs() / denom
}

#[cfg(feature = "three_d")]
pub fn element_quality(coord: &[Vector], conn: &Conn) -> f64 {
    use nalgebra::{Matrix3, Vector3};
    let vol = element_volume(coord, conn);
    if vol <= 0.0 {
        return -1.0;
    }

    let mut surf = 0.0;
    for facet_nodes in NODE_OF_FACET.iter() {
        let mut facet = [0usize; NODES_PER_FACET];
        for (j, &loc) in facet_nodes.iter().enumerate() {
            facet[j] = conn[loc];
        }
        surf += facet_measure(coord, &facet);
    }
    let r_in = 3.0 * vol / surf;

    // circumcenter from 2 (p_i - p_0) . c = |p_i|^2 - |p_0|^2
    let p0 = Vector3::from(coord[conn[0]]);
    let mut rows = [Vector3::zeros(); 3];
    let mut rhs = Vector3::zeros();
    for i in 0..3 {
        let pi = Vector3::from(coord[conn[i + 1]]);
        rows[i] = 2.0 * (pi - p0);
        rhs[i] = pi.norm_squared() - p0.norm_squared();
    }
    let m = Matrix3::from_rows(&[rows[0].transpose(), rows[1].transpose(), rows[2].transpose()]);
    let center = match m.try_inverse() {
        Some(inv) => inv * rhs,
        None => return 0.0,
    };
    let r_circ = (center - p0).norm();
    if r_circ == 0.0 {
        return 0.0;
    }
    3.0 * r_in / r_circ
}

/// The worst element quality over the mesh and where it occurs.
pub fn worst_elem_quality(coord: &[Vector], connectivity: &[Conn]) -> (f64, usize) {
    let worst = if connectivity.len() > 1000 {
        connectivity
            .par_iter()
            .enumerate()
            .map(|(e, conn)| (element_quality(coord, conn), e))
            .min_by(|a, b| a.0.partial_cmp(&b.0).expect("quality is finite"))
    } else {
        connectivity
            .iter()
            .enumerate()
            .map(|(e, conn)| (element_quality(coord, conn), e))
            .min_by(|a, b| a.0.partial_cmp(&b.0).expect("quality is finite"))
    };
    worst.unwrap_or((1.0, 0))
}
