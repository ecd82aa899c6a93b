//! Explicit dynamic updates and the critical time step.

use rayon::prelude::*;

use crate::constants::*;
use crate::material::MatProps;
use crate::mesh::geometry::element_min_altitude;

fn sgn(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Velocity update with local non-viscous damping:
/// F <- F - damping * |F| * sgn(v), then v += dt F / (m s).
///
/// The inertial scaling s multiplies the nodal mass here instead of
/// being baked into the stored mass array, so the mass field keeps its
/// physical rho V lumping.
pub fn update_velocity(
    mass: &[f64],
    force: &[Vector],
    damping_factor: f64,
    inertial_scaling: f64,
    dt: f64,
    vel: &mut [Vector],
) {
    for (n, v) in vel.iter_mut().enumerate() {
        let m = mass[n] * inertial_scaling;
        if m <= 0.0 {
            continue;
        }
        for d in 0..NDIMS {
            let f = force[n][d] - damping_factor * force[n][d].abs() * sgn(v[d]);
            v[d] += dt * f / m;
        }
    }
}

/// Move the nodes with the material: x += v dt.
pub fn update_coordinate(vel: &[Vector], dt: f64, coord: &mut [Vector]) {
    for (n, p) in coord.iter_mut().enumerate() {
        for d in 0..NDIMS {
            p[d] += vel[n][d] * dt;
        }
    }
}

/// Jaumann stress rotation: sigma += dt (W sigma - sigma W) with
/// W the spin tensor of the current velocity field.
#[allow(unused_variables)]
pub fn rotate_stress(
    connectivity: &[Conn],
    vel: &[Vector],
    shpdx: &[ShapeFn],
    shpdy: &[ShapeFn],
    shpdz: &[ShapeFn],
    dt: f64,
    stress: &mut [Tensor],
) {
    #[cfg(not(feature = "three_d"))]
    for (e, conn) in connectivity.iter().enumerate() {
        // w = (dvx/dz - dvz/dx) / 2
        let mut w = 0.0;
        for i in 0..NODES_PER_ELEM {
            let v = vel[conn[i]];
            w += 0.5 * (shpdz[e][i] * v[0] - shpdx[e][i] * v[1]);
        }
        let s = stress[e];
        stress[e][0] += 2.0 * w * s[2] * dt;
        stress[e][1] -= 2.0 * w * s[2] * dt;
        stress[e][2] += w * (s[1] - s[0]) * dt;
    }

    #[cfg(feature = "three_d")]
    for (e, conn) in connectivity.iter().enumerate() {
        use nalgebra::Matrix3;
        let mut wxy = 0.0;
        let mut wxz = 0.0;
        let mut wyz = 0.0;
        for i in 0..NODES_PER_ELEM {
            let v = vel[conn[i]];
            wxy += 0.5 * (shpdy[e][i] * v[0] - shpdx[e][i] * v[1]);
            wxz += 0.5 * (shpdz[e][i] * v[0] - shpdx[e][i] * v[2]);
            wyz += 0.5 * (shpdz[e][i] * v[1] - shpdy[e][i] * v[2]);
        }
        let w = Matrix3::new(0.0, wxy, wxz, -wxy, 0.0, wyz, -wxz, -wyz, 0.0);
        let t = stress[e];
        let s = Matrix3::new(
            t[0], t[3], t[4], //
            t[3], t[1], t[5], //
            t[4], t[5], t[2],
        );
        let ds = (w * s - s * w) * dt;
        stress[e][0] += ds[(0, 0)];
        stress[e][1] += ds[(1, 1)];
        stress[e][2] += ds[(2, 2)];
        stress[e][3] += ds[(0, 1)];
        stress[e][4] += ds[(0, 2)];
        stress[e][5] += ds[(1, 2)];
    }
}

/// Explicit Euler temperature update from the assembled diffusion RHS,
/// with the surface clamped to the prescribed temperature.
pub fn update_temperature(
    bcflag: &[u32],
    tdot: &[f64],
    tmass: &[f64],
    surface_temperature: f64,
    dt: f64,
    temperature: &mut [f64],
) {
    for (n, t) in temperature.iter_mut().enumerate() {
        if bcflag[n] & BOUNDZ1 != 0 {
            *t = surface_temperature;
        } else if tmass[n] > 0.0 {
            *t -= tdot[n] * dt / tmass[n];
        }
    }
}

/// Critical time step: dt_fraction times the smallest of the elastic
/// bound h/c (with the P-wave speed slowed by the inertial scaling)
/// and the diffusive bound h^2 / (2 NDIMS kappa) over the elements.
pub fn compute_dt(
    coord: &[Vector],
    connectivity: &[Conn],
    mattype: &[usize],
    mat: &MatProps,
    inertial_scaling: f64,
    dt_fraction: f64,
    has_thermal_diffusion: bool,
) -> f64 {
    let elem_dt = |(e, conn): (usize, &Conn)| -> f64 {
        let h = element_min_altitude(coord, conn);
        if h <= 0.0 {
            return f64::MAX;
        }
        let m = mattype[e];
        let rho = mat.rho(m) * inertial_scaling;
        let pwave = ((mat.bulkm(m) + 4.0 * mat.shearm(m) / 3.0) / rho).sqrt();
        let dt_elastic = h / pwave;
        if has_thermal_diffusion {
            let kappa = mat.therm_diff(m);
            let dt_thermal = h * h / (2.0 * NDIMS as f64 * kappa);
            dt_elastic.min(dt_thermal)
        } else {
            dt_elastic
        }
    };

    let min_dt = if connectivity.len() > 1000 {
        connectivity
            .par_iter()
            .enumerate()
            .map(elem_dt)
            .reduce(|| f64::MAX, f64::min)
    } else {
        connectivity
            .iter()
            .enumerate()
            .map(elem_dt)
            .fold(f64::MAX, f64::min)
    };
    dt_fraction * min_dt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Param;
    use approx::assert_relative_eq;

    fn mat_props() -> MatProps {
        let cfg = r#"
            [sim]
            max_steps = 1
            output_step_interval = 1

            [mesh]
            xlength = 1e4
            ylength = 1e4
            zlength = 1e4
            resolution = 1e3

            [mat]
            rheology_type = "elastic"
            rho0 = [3300.0]
            bulk_modulus = [1e11]
            shear_modulus = [7e10]
        "#;
        MatProps::new(&Param::from_toml_str(cfg).unwrap().mat)
    }

    #[test]
    fn velocity_update_without_damping() {
        let mass = vec![2.0];
        let mut force = vec![[0.0; NDIMS]];
        force[0][0] = 10.0;
        let mut vel = vec![[0.0; NDIMS]];
        update_velocity(&mass, &force, 0.0, 1.0, 0.5, &mut vel);
        assert_relative_eq!(vel[0][0], 2.5);
    }

    #[test]
    fn damping_opposes_the_current_velocity() {
        let mass = vec![1.0];
        let mut force = vec![[0.0; NDIMS]];
        force[0][0] = 10.0;

        // moving with the force: damping removes 80% of it
        let mut vel = vec![[0.0; NDIMS]];
        vel[0][0] = 1.0;
        update_velocity(&mass, &force, 0.8, 1.0, 1.0, &mut vel);
        assert_relative_eq!(vel[0][0], 1.0 + 2.0);

        // moving against the force: damping boosts it
        let mut vel = vec![[0.0; NDIMS]];
        vel[0][0] = -1.0;
        update_velocity(&mass, &force, 0.8, 1.0, 1.0, &mut vel);
        assert_relative_eq!(vel[0][0], -1.0 + 18.0);

        // at rest: the raw force acts
        let mut vel = vec![[0.0; NDIMS]];
        update_velocity(&mass, &force, 0.8, 1.0, 1.0, &mut vel);
        assert_relative_eq!(vel[0][0], 10.0);
    }

    #[test]
    fn inertial_scaling_slows_the_response() {
        let mass = vec![1.0];
        let mut force = vec![[0.0; NDIMS]];
        force[0][0] = 10.0;
        let mut vel = vec![[0.0; NDIMS]];
        update_velocity(&mass, &force, 0.0, 1e5, 1.0, &mut vel);
        assert_relative_eq!(vel[0][0], 1e-4);
    }

    #[cfg(not(feature = "three_d"))]
    #[test]
    fn rigid_rotation_preserves_principal_stresses() {
        // one unit triangle spinning rigidly about the origin
        let coord: Vec<Vector> = vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
        let connectivity: Vec<Conn> = vec![[0, 1, 2]];
        let mut volume = vec![0.0];
        crate::mesh::geometry::compute_volume(&coord, &connectivity, &mut volume);
        let mut shpdx = vec![[0.0; NODES_PER_ELEM]];
        let mut shpdy = vec![[0.0; NODES_PER_ELEM]];
        let mut shpdz = vec![[0.0; NODES_PER_ELEM]];
        crate::mesh::geometry::compute_shape_fn(
            &coord,
            &connectivity,
            &volume,
            &mut shpdx,
            &mut shpdy,
            &mut shpdz,
        );

        // v = omega x r = omega (-z, x)
        let omega = 1e-3;
        let vel: Vec<Vector> = coord.iter().map(|p| [-omega * p[1], omega * p[0]]).collect();

        let mut stress = vec![[0.0; NSTR]];
        stress[0][0] = 2e6;
        stress[0][1] = -1e6;
        let mean0 = crate::material::trace(&stress[0]);
        let j2_0 = crate::material::second_invariant(&stress[0]);

        let dt = 1e-2;
        for _ in 0..100 {
            rotate_stress(&connectivity, &vel, &shpdx, &shpdy, &shpdz, dt, &mut stress);
        }

        // the invariants survive the rotation to first order in dt
        assert_relative_eq!(crate::material::trace(&stress[0]), mean0, max_relative = 1e-6);
        assert_relative_eq!(
            crate::material::second_invariant(&stress[0]),
            j2_0,
            max_relative = 1e-3
        );
        // while the components themselves have rotated
        assert!((stress[0][2]).abs() > 1e3);
    }

    #[test]
    fn surface_temperature_is_clamped() {
        let bcflag = vec![BOUNDZ1, 0];
        let tdot = vec![1e6, 1e6];
        let tmass = vec![1e3, 1e3];
        let mut temperature = vec![900.0, 900.0];
        update_temperature(&bcflag, &tdot, &tmass, 273.0, 1.0, &mut temperature);
        assert_eq!(temperature[0], 273.0);
        assert_relative_eq!(temperature[1], 900.0 - 1e3);
    }

    #[cfg(not(feature = "three_d"))]
    #[test]
    fn critical_dt_scales_with_resolution_and_scaling() {
        let mat = mat_props();
        let coord: Vec<Vector> = vec![[0.0, 0.0], [1e3, 0.0], [0.0, 1e3]];
        let connectivity: Vec<Conn> = vec![[0, 1, 2]];

        let dt1 = compute_dt(&coord, &connectivity, &[0], &mat, 1.0, 1.0, false);
        let dt_scaled = compute_dt(&coord, &connectivity, &[0], &mat, 1e4, 1.0, false);
        // slowing the P-wave by sqrt(s) stretches dt by the same factor
        assert_relative_eq!(dt_scaled, dt1 * 100.0, max_relative = 1e-12);

        // h = 1e3/sqrt(2), c = sqrt((K + 4G/3)/rho)
        let c = ((1e11 + 4.0 * 7e10 / 3.0) / 3300.0_f64).sqrt();
        assert_relative_eq!(dt1, 1e3 / 2.0_f64.sqrt() / c, max_relative = 1e-12);

        // the thermal bound is far from binding at geologic diffusivity
        let dt_thermal = compute_dt(&coord, &connectivity, &[0], &mat, 1.0, 1.0, true);
        assert_relative_eq!(dt_thermal, dt1, max_relative = 1e-12);

        let dt_frac = compute_dt(&coord, &connectivity, &[0], &mat, 1.0, 0.5, false);
        assert_relative_eq!(dt_frac, 0.5 * dt1, max_relative = 1e-12);
    }
}
