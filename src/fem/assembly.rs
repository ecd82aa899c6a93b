//! Element-to-node assembly: lumped mass, strain rate, internal and
//! body forces, and the conductive diffusion right-hand side.
//!
//! Element loops read prior-step values and accumulate into per-node
//! arrays serially.

use crate::constants::*;
use crate::material::MatProps;
use crate::mesh::geometry::{elem_center, facet_normal_outward};

/// Lumped mass and thermal capacitance: each node receives a
/// 1/NODES_PER_ELEM share of rho V (resp. rho cp V) from every
/// incident element.
pub fn compute_mass(
    connectivity: &[Conn],
    volume: &[f64],
    mattype: &[usize],
    mat: &MatProps,
    mass: &mut [f64],
    tmass: &mut [f64],
) {
    mass.fill(0.0);
    tmass.fill(0.0);
    for (e, conn) in connectivity.iter().enumerate() {
        let m = mattype[e];
        let share = mat.rho(m) * volume[e] / NODES_PER_ELEM as f64;
        let tshare = share * mat.cp(m);
        for &n in conn {
            mass[n] += share;
            tmass[n] += tshare;
        }
    }
}

/// Strain rate from nodal velocities: edot = (grad v + grad v^T) / 2,
/// in Voigt order.
#[allow(unused_variables)]
pub fn update_strain_rate(
    connectivity: &[Conn],
    vel: &[Vector],
    shpdx: &[ShapeFn],
    shpdy: &[ShapeFn],
    shpdz: &[ShapeFn],
    strain_rate: &mut [Tensor],
) {
    for (e, conn) in connectivity.iter().enumerate() {
        let mut rate = [0.0; NSTR];
        #[cfg(not(feature = "three_d"))]
        {
            for i in 0..NODES_PER_ELEM {
                let v = vel[conn[i]];
                rate[0] += shpdx[e][i] * v[0]; // xx
                rate[1] += shpdz[e][i] * v[1]; // zz
                rate[2] += 0.5 * (shpdz[e][i] * v[0] + shpdx[e][i] * v[1]); // xz
            }
        }
        #[cfg(feature = "three_d")]
        {
            for i in 0..NODES_PER_ELEM {
                let v = vel[conn[i]];
                rate[0] += shpdx[e][i] * v[0]; // xx
                rate[1] += shpdy[e][i] * v[1]; // yy
                rate[2] += shpdz[e][i] * v[2]; // zz
                rate[3] += 0.5 * (shpdy[e][i] * v[0] + shpdx[e][i] * v[1]); // xy
                rate[4] += 0.5 * (shpdz[e][i] * v[0] + shpdx[e][i] * v[2]); // xz
                rate[5] += 0.5 * (shpdz[e][i] * v[1] + shpdy[e][i] * v[2]); // yz
            }
        }
        strain_rate[e] = rate;
    }
}

/// Nodal force: internal force -B^T sigma V plus the gravity body
/// force, accumulated over the elements.
#[allow(unused_variables)]
pub fn update_force(
    connectivity: &[Conn],
    volume: &[f64],
    stress: &[Tensor],
    mattype: &[usize],
    mat: &MatProps,
    gravity: f64,
    shpdx: &[ShapeFn],
    shpdy: &[ShapeFn],
    shpdz: &[ShapeFn],
    force: &mut [Vector],
) {
    for f in force.iter_mut() {
        *f = [0.0; NDIMS];
    }
    for (e, conn) in connectivity.iter().enumerate() {
        let vol = volume[e];
        let s = stress[e];
        let buoy = mat.rho(mattype[e]) * gravity * vol / NODES_PER_ELEM as f64;
        #[cfg(not(feature = "three_d"))]
        {
            for i in 0..NODES_PER_ELEM {
                let f = &mut force[conn[i]];
                f[0] -= (s[0] * shpdx[e][i] + s[2] * shpdz[e][i]) * vol;
                f[1] -= (s[2] * shpdx[e][i] + s[1] * shpdz[e][i]) * vol + buoy;
            }
        }
        #[cfg(feature = "three_d")]
        {
            for i in 0..NODES_PER_ELEM {
                let f = &mut force[conn[i]];
                f[0] -= (s[0] * shpdx[e][i] + s[3] * shpdy[e][i] + s[4] * shpdz[e][i]) * vol;
                f[1] -= (s[3] * shpdx[e][i] + s[1] * shpdy[e][i] + s[5] * shpdz[e][i]) * vol;
                f[2] -= (s[4] * shpdx[e][i] + s[5] * shpdy[e][i] + s[2] * shpdz[e][i]) * vol
                    + buoy;
            }
        }
    }
}

/// Wrinkler foundation on the bottom boundary: a restoring pressure
/// p_comp - (rho + delta_rho) g (z + zlength) pushing on every bottom
/// facet, which balances the lithostatic load when the bottom sits at
/// its reference depth.
pub fn apply_winkler_foundation(
    coord: &[Vector],
    connectivity: &[Conn],
    bottom_facets: &[(usize, usize)],
    mattype: &[usize],
    mat: &MatProps,
    gravity: f64,
    delta_rho: f64,
    compensation_pressure: f64,
    zlength: f64,
    force: &mut [Vector],
) {
    for &(e, f) in bottom_facets {
        let conn = &connectivity[e];
        let mut facet = [0usize; NODES_PER_FACET];
        for (j, &loc) in NODE_OF_FACET[f].iter().enumerate() {
            facet[j] = conn[loc];
        }

        let zcenter = facet
            .iter()
            .map(|&n| coord[n][NDIMS - 1])
            .sum::<f64>()
            / NODES_PER_FACET as f64;
        let rho = mat.rho(mattype[e]) + delta_rho;
        let p = compensation_pressure - rho * gravity * (zcenter + zlength);

        // outward normal scaled by the facet measure; the foundation
        // pushes inward
        let normal = facet_normal_outward(coord, &facet, elem_center(coord, conn));
        for &n in &facet {
            for d in 0..NDIMS {
                force[n][d] -= p * normal[d] / NODES_PER_FACET as f64;
            }
        }
    }
}

/// Conductive diffusion right-hand side: accumulates
/// kappa V D T into `tdot`, with D_ij the inner product of the
/// shape-function gradients of nodes i and j.
#[allow(unused_variables)]
pub fn assemble_diffusion(
    connectivity: &[Conn],
    volume: &[f64],
    mattype: &[usize],
    mat: &MatProps,
    shpdx: &[ShapeFn],
    shpdy: &[ShapeFn],
    shpdz: &[ShapeFn],
    temperature: &[f64],
    tdot: &mut [f64],
) {
    tdot.fill(0.0);
    let mut d = [[0.0; NODES_PER_ELEM]; NODES_PER_ELEM];
    for (e, conn) in connectivity.iter().enumerate() {
        let kv = mat.k(mattype[e]) * volume[e];
        for i in 0..NODES_PER_ELEM {
            for j in 0..NODES_PER_ELEM {
                #[cfg(not(feature = "three_d"))]
                {
                    d[i][j] = shpdx[e][i] * shpdx[e][j] + shpdz[e][i] * shpdz[e][j];
                }
                #[cfg(feature = "three_d")]
                {
                    d[i][j] = shpdx[e][i] * shpdx[e][j]
                        + shpdy[e][i] * shpdy[e][j]
                        + shpdz[e][i] * shpdz[e][j];
                }
            }
        }
        for i in 0..NODES_PER_ELEM {
            let mut diffusion = 0.0;
            for j in 0..NODES_PER_ELEM {
                diffusion += d[i][j] * temperature[conn[j]];
            }
            tdot[conn[i]] += diffusion * kv;
        }
    }
}
