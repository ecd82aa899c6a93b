//! Initial state: lithostatic stress, weak-zone plastic strain seed and
//! the initial geotherm.

use std::fs;
use std::path::Path;

use crate::config::Param;
use crate::constants::*;
use crate::error::{Result, SolverError};
use crate::material::MatProps;
use crate::mesh::geometry::elem_center;

/// Reference pressure at depth (z <= 0).
pub fn ref_pressure(param: &Param, mat: &MatProps, z: f64) -> Result<f64> {
    match param.control.ref_pressure_option {
        0 => Ok(-mat.rho(0) * param.control.gravity * z),
        1 => Err(SolverError::UnknownOption(
            "ref_pressure_option 1 (PREM) is not available in this build".into(),
        )),
        other => Err(SolverError::UnknownOption(format!(
            "unknown ref_pressure_option: {}",
            other
        ))),
    }
}

/// Lithostatic initial condition: isotropic stress -p(z) at each
/// element centroid and the matching elastic strain -p/(K NDIMS).
/// Returns the compensation pressure at the domain bottom.
pub fn initial_stress_state(
    param: &Param,
    mat: &MatProps,
    coord: &[Vector],
    connectivity: &[Conn],
    mattype: &[usize],
    stress: &mut [Tensor],
    strain: &mut [Tensor],
) -> Result<f64> {
    if param.control.gravity == 0.0 {
        return Ok(0.0);
    }

    for (e, conn) in connectivity.iter().enumerate() {
        let center = elem_center(coord, conn);
        let p = ref_pressure(param, mat, center[NDIMS - 1])?;
        let ks = mat.bulkm(mattype[e]);
        for i in 0..NDIMS {
            stress[e][i] = -p;
            strain[e][i] = -p / ks / NDIMS as f64;
        }
    }

    ref_pressure(param, mat, -param.mesh.zlength)
}

/// Weak zone shapes, evaluated at element centroids.
///
/// The planar zone is a slab of the given half width around a plane
/// through `center`, restricted to a depth (and, in 3D, y) window; the
/// ellipsoidal zone is the interior of the ellipsoid with the given
/// semi-axes; the Gaussian zone is a ball of radius 4 sigma whose
/// seeded value falls off as exp(-r^2 / 2 sigma^2).
#[derive(Debug, Clone)]
pub enum WeakZone {
    Empty,
    Planar {
        center: Vector,
        /// tan(azimuth), the in-plane rotation toward y (3D)
        az: f64,
        /// cot(inclination)
        incl: f64,
        halfwidth: f64,
        #[cfg(feature = "three_d")]
        ymin: f64,
        #[cfg(feature = "three_d")]
        ymax: f64,
        zmin: f64,
        zmax: f64,
    },
    Ellipsoidal {
        center: Vector,
        semi_axis2: Vector,
    },
    Gaussian {
        center: Vector,
        std_dev: f64,
    },
}

impl WeakZone {
    pub fn from_param(param: &Param) -> Result<Self> {
        let ic = &param.ic;
        let mut center = [0.0; NDIMS];
        center[0] = ic.weakzone_xcenter * param.mesh.xlength;
        #[cfg(feature = "three_d")]
        {
            center[1] = ic.weakzone_ycenter * param.ylength();
        }
        center[NDIMS - 1] = -ic.weakzone_zcenter * param.mesh.zlength;

        match ic.weakzone_option {
            0 => Ok(WeakZone::Empty),
            1 => Ok(WeakZone::Planar {
                center,
                az: (ic.weakzone_azimuth * DEG2RAD).tan(),
                incl: 1.0 / (ic.weakzone_inclination * DEG2RAD).tan(),
                halfwidth: ic.weakzone_halfwidth * param.mesh.resolution,
                #[cfg(feature = "three_d")]
                ymin: ic.weakzone_y_min * param.ylength(),
                #[cfg(feature = "three_d")]
                ymax: ic.weakzone_y_max * param.ylength(),
                zmin: -ic.weakzone_depth_max * param.mesh.zlength,
                zmax: -ic.weakzone_depth_min * param.mesh.zlength,
            }),
            2 => {
                let mut semi_axis2 = [0.0; NDIMS];
                semi_axis2[0] = ic.weakzone_xsemi_axis * ic.weakzone_xsemi_axis;
                #[cfg(feature = "three_d")]
                {
                    semi_axis2[1] = ic.weakzone_ysemi_axis * ic.weakzone_ysemi_axis;
                }
                semi_axis2[NDIMS - 1] = ic.weakzone_zsemi_axis * ic.weakzone_zsemi_axis;
                Ok(WeakZone::Ellipsoidal { center, semi_axis2 })
            }
            3 => Ok(WeakZone::Gaussian {
                center,
                std_dev: ic.weakzone_standard_deviation,
            }),
            other => Err(SolverError::UnknownOption(format!(
                "unknown weakzone_option: {}",
                other
            ))),
        }
    }

    pub fn contains(&self, x: &Vector) -> bool {
        match self {
            WeakZone::Empty => false,
            WeakZone::Planar {
                center,
                az,
                incl,
                halfwidth,
                #[cfg(feature = "three_d")]
                ymin,
                #[cfg(feature = "three_d")]
                ymax,
                zmin,
                zmax,
            } => {
                let z = x[NDIMS - 1];
                if z <= *zmin || z >= *zmax {
                    return false;
                }
                #[cfg(feature = "three_d")]
                if x[1] <= *ymin || x[1] >= *ymax {
                    return false;
                }
                let dist = x[0] - center[0] + incl * (z - center[NDIMS - 1]);
                #[cfg(feature = "three_d")]
                let dist = dist - az * (x[1] - center[1]);
                #[cfg(not(feature = "three_d"))]
                let _ = az;
                dist.abs() < *halfwidth
            }
            WeakZone::Ellipsoidal { center, semi_axis2 } => {
                let mut r = 0.0;
                for d in 0..NDIMS {
                    r += (x[d] - center[d]) * (x[d] - center[d]) / semi_axis2[d];
                }
                r < 1.0
            }
            WeakZone::Gaussian { center, std_dev } => {
                let mut r2 = 0.0;
                for d in 0..NDIMS {
                    r2 += (x[d] - center[d]) * (x[d] - center[d]);
                }
                r2 < 16.0 * std_dev * std_dev
            }
        }
    }

    /// Seeded amplitude at `x`: 1 except for the Gaussian fall-off.
    pub fn value(&self, x: &Vector) -> f64 {
        match self {
            WeakZone::Gaussian { center, std_dev } => {
                let mut r2 = 0.0;
                for d in 0..NDIMS {
                    r2 += (x[d] - center[d]) * (x[d] - center[d]);
                }
                (-r2 / (2.0 * std_dev * std_dev)).exp()
            }
            _ => 1.0,
        }
    }
}

/// Seed plastic strain inside the configured weak zone.
pub fn initial_weak_zone(
    param: &Param,
    coord: &[Vector],
    connectivity: &[Conn],
    plstrain: &mut [f64],
) -> Result<()> {
    let zone = WeakZone::from_param(param)?;
    for (e, conn) in connectivity.iter().enumerate() {
        let center = elem_center(coord, conn);
        if zone.contains(&center) {
            plstrain[e] = param.ic.weakzone_plstrain * zone.value(&center);
        }
    }
    Ok(())
}

/// Initial geotherm.
pub fn initial_temperature(
    param: &Param,
    mat: &MatProps,
    coord: &[Vector],
    temperature: &mut [f64],
) -> Result<()> {
    let t_top = param.bc.surface_temperature;
    let t_bot = param.bc.mantle_temperature;

    match param.ic.temperature_option {
        0 => {
            // oceanic half-space cooling
            let age = param.ic.oceanic_plate_age_in_yr * YEAR2SEC;
            let diffusivity = mat.k(0) / mat.rho(0) / mat.cp(0);
            let scale = (4.0 * diffusivity * age).sqrt();
            for (i, p) in coord.iter().enumerate() {
                let w = -p[NDIMS - 1] / scale;
                temperature[i] = t_top + (t_bot - t_top) * erf(w);
            }
            Ok(())
        }
        1 => {
            // continental geotherm: steady state with a radiogenic upper
            // crust plus the transient Fourier series truncated at 100 terms
            let pi = std::f64::consts::PI;
            let dens_c = mat.rho(param.ic.mattype_crust);
            let dens_m = mat.rho(param.ic.mattype_mantle);
            let cond_c = mat.k(param.ic.mattype_crust);
            let cond_m = mat.k(param.ic.mattype_mantle);
            // the transient decay time is defined with a nominal
            // 1000 J/kg/K heat capacity, not the material table's value
            let diff_m = cond_m / 1000.0 / dens_m;

            let age = param.ic.continental_plate_age_in_yr * YEAR2SEC;
            let hs = param.ic.radiogenic_heating_of_crust;
            let hr = param.ic.radiogenic_folding_depth;
            let hc = param.ic.radiogenic_crustal_thickness;
            let hl = param.ic.lithospheric_thickness;

            let tr = dens_c * hs * hr * hr / cond_c * (1.0 - (-hc / hr).exp()).exp();
            let q_m = (t_bot - t_top - tr) / (hc / cond_c + (hl - hc) / cond_m);
            let tm = t_top + (q_m / cond_c) * hc + tr;
            let tau_d = hl * hl / (pi * pi * diff_m);

            for (i, p) in coord.iter().enumerate() {
                let y = -p[NDIMS - 1];
                let tss = if y <= hc {
                    t_top + (q_m / cond_c) * y
                        + (dens_c * hs * hr * hr / cond_c) * (1.0 - (-y / hr).exp()).exp()
                } else {
                    tm + (q_m / cond_m) * (y - hc)
                };

                let mut tt = 0.0;
                let mut pp = -1.0;
                for k in 1..101 {
                    let an = k as f64;
                    pp = -pp;
                    tt += pp / an * (-an * an * age / tau_d).exp()
                        * (pi * an * (hl - y) / hl).sin();
                }

                let mut t = tss + 2.0 / pi * (t_bot - t_top) * tt;
                if t > t_bot || y >= hl {
                    t = t_bot;
                }
                if y == 0.0 {
                    t = t_top;
                }
                temperature[i] = t;
            }
            Ok(())
        }
        90 => read_external_temperature(
            &param.ic.temperature_filename,
            coord.len(),
            temperature,
        ),
        other => Err(SolverError::UnknownOption(format!(
            "unknown ic.temperature_option: {}",
            other
        ))),
    }
}

/// Nodal temperatures from a raw little-endian f64 file.
fn read_external_temperature<P: AsRef<Path>>(
    path: P,
    nnode: usize,
    temperature: &mut [f64],
) -> Result<()> {
    let bytes = fs::read(&path)?;
    if bytes.len() != nnode * 8 {
        return Err(SolverError::Config(format!(
            "temperature file '{}' holds {} values, mesh has {} nodes",
            path.as_ref().display(),
            bytes.len() / 8,
            nnode
        )));
    }
    for (i, chunk) in bytes.chunks_exact(8).enumerate() {
        temperature[i] = f64::from_le_bytes(chunk.try_into().expect("8-byte chunk"));
    }
    Ok(())
}

/// Error function. Maclaurin series up to |x| < 3.2, asymptotic
/// expansion of erfc beyond; both branches are accurate to well below
/// the 1e-9 level the geotherms care about.
pub fn erf(x: f64) -> f64 {
    let ax = x.abs();
    if ax < 3.2 {
        let mut term = x;
        let mut sum = x;
        let x2 = x * x;
        for n in 1..200 {
            let nf = n as f64;
            term *= -x2 / nf;
            let contrib = term / (2.0 * nf + 1.0);
            sum += contrib;
            if contrib.abs() < 1e-17 * sum.abs().max(1e-300) {
                break;
            }
        }
        2.0 / std::f64::consts::PI.sqrt() * sum
    } else {
        // erfc(ax) ~ exp(-ax^2)/(ax sqrt(pi)) (1 - 1/(2x^2) + 3/(4x^4) - ...)
        let x2 = ax * ax;
        let mut term = 1.0;
        let mut sum = 1.0;
        for n in 1..12 {
            let next = term * -(2.0 * n as f64 - 1.0) / (2.0 * x2);
            if next.abs() > term.abs() {
                break;
            }
            term = next;
            sum += term;
        }
        let erfc = (-x2).exp() / (ax * std::f64::consts::PI.sqrt()) * sum;
        (1.0 - erfc) * x.signum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::create_new_mesh;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn param(extra: &str) -> Param {
        let cfg = format!(
            r#"
            [sim]
            max_steps = 1
            output_step_interval = 1

            [mesh]
            xlength = 1e4
            ylength = 1e4
            zlength = 6e3
            resolution = 1e3

            [mat]
            rheology_type = "elastic"
            rho0 = [3300.0]
            bulk_modulus = [1e11]
            shear_modulus = [7e10]

            {}
            "#,
            extra
        );
        Param::from_toml_str(&cfg).expect("valid test config")
    }

    #[test]
    fn erf_reference_values() {
        assert_abs_diff_eq!(erf(0.0), 0.0);
        assert_abs_diff_eq!(erf(0.5), 0.5204998778130465, epsilon = 1e-12);
        assert_abs_diff_eq!(erf(1.0), 0.8427007929497149, epsilon = 1e-12);
        assert_abs_diff_eq!(erf(2.0), 0.9953222650189527, epsilon = 1e-12);
        assert_abs_diff_eq!(erf(4.0), 0.9999999845827421, epsilon = 1e-12);
        assert_abs_diff_eq!(erf(-1.0), -0.8427007929497149, epsilon = 1e-12);
        assert_abs_diff_eq!(erf(8.0), 1.0, epsilon = 1e-15);
    }

    #[cfg(not(feature = "three_d"))]
    #[test]
    fn lithostatic_stress_matches_depth() {
        let p = param("");
        let mat = MatProps::new(&p.mat);
        let mesh = create_new_mesh(&p).unwrap();
        let ne = mesh.nelem();
        let mut stress = vec![[0.0; NSTR]; ne];
        let mut strain = vec![[0.0; NSTR]; ne];
        let comp = initial_stress_state(
            &p,
            &mat,
            &mesh.coord,
            &mesh.connectivity,
            &vec![0; ne],
            &mut stress,
            &mut strain,
        )
        .unwrap();

        assert_relative_eq!(comp, 3300.0 * 10.0 * 6e3, max_relative = 1e-12);

        for (e, conn) in mesh.connectivity.iter().enumerate() {
            let c = elem_center(&mesh.coord, conn);
            let expected = -3300.0 * 10.0 * (-c[NDIMS - 1]);
            assert_relative_eq!(stress[e][0], expected, max_relative = 1e-10);
            assert_relative_eq!(stress[e][1], expected, max_relative = 1e-10);
            assert_abs_diff_eq!(stress[e][2], 0.0);
            assert_relative_eq!(
                strain[e][0],
                expected / 1e11 / NDIMS as f64,
                max_relative = 1e-10
            );
        }
    }

    #[cfg(not(feature = "three_d"))]
    #[test]
    fn ellipsoidal_weak_zone_tags_inside_elements_only() {
        let p = param(
            r#"
            [ic]
            weakzone_option = 2
            weakzone_plstrain = 0.5
            weakzone_xcenter = 0.5
            weakzone_zcenter = 0.5
            weakzone_xsemi_axis = 2e3
            weakzone_zsemi_axis = 5e2
            "#,
        );
        let mesh = create_new_mesh(&p).unwrap();
        let ne = mesh.nelem();
        let mut plstrain = vec![0.0; ne];
        initial_weak_zone(&p, &mesh.coord, &mesh.connectivity, &mut plstrain).unwrap();

        let mut inside_count = 0;
        for (e, conn) in mesh.connectivity.iter().enumerate() {
            let c = elem_center(&mesh.coord, conn);
            let r = (c[0] - 5e3) * (c[0] - 5e3) / 4e6 + (c[1] + 3e3) * (c[1] + 3e3) / 25e4;
            if r < 1.0 {
                inside_count += 1;
                assert_eq!(plstrain[e], 0.5, "inside element must carry the seed");
            } else {
                assert_eq!(plstrain[e], 0.0, "outside element must stay pristine");
            }
        }
        assert!(inside_count > 0, "the ellipsoid must cover some centroids");
    }

    #[cfg(not(feature = "three_d"))]
    #[test]
    fn planar_weak_zone_respects_depth_window() {
        let p = param(
            r#"
            [ic]
            weakzone_option = 1
            weakzone_plstrain = 0.2
            weakzone_inclination = 90.0
            weakzone_halfwidth = 0.6
            weakzone_depth_min = 0.1
            weakzone_depth_max = 0.6
            "#,
        );
        let mesh = create_new_mesh(&p).unwrap();
        let ne = mesh.nelem();
        let mut plstrain = vec![0.0; ne];
        initial_weak_zone(&p, &mesh.coord, &mesh.connectivity, &mut plstrain).unwrap();

        for (e, conn) in mesh.connectivity.iter().enumerate() {
            let c = elem_center(&mesh.coord, conn);
            if plstrain[e] > 0.0 {
                assert!((c[0] - 5e3).abs() < 0.6 * 1e3, "x {} outside the slab", c[0]);
                let depth = -c[1];
                assert!(depth > 0.1 * 6e3 && depth < 0.6 * 6e3);
            }
        }
    }

    #[test]
    fn gaussian_zone_value_falls_off() {
        let zone = WeakZone::Gaussian {
            center: [0.0; NDIMS],
            std_dev: 100.0,
        };
        let origin = [0.0; NDIMS];
        assert_relative_eq!(zone.value(&origin), 1.0);

        let mut at_sigma = [0.0; NDIMS];
        at_sigma[0] = 100.0;
        assert_relative_eq!(zone.value(&at_sigma), (-0.5f64).exp(), max_relative = 1e-12);
        assert!(zone.contains(&at_sigma));

        let mut beyond = [0.0; NDIMS];
        beyond[0] = 500.0; // past the 4 sigma bound
        assert!(!zone.contains(&beyond));
    }

    #[cfg(not(feature = "three_d"))]
    #[test]
    fn oceanic_halfspace_profile() {
        let p = param(
            r#"
            [ic]
            temperature_option = 0
            oceanic_plate_age_in_yr = 1e6
            "#,
        );
        let mat = MatProps::new(&p.mat);
        let mesh = create_new_mesh(&p).unwrap();
        let mut temperature = vec![0.0; mesh.nnode()];
        initial_temperature(&p, &mat, &mesh.coord, &mut temperature).unwrap();

        let diffusivity = 3.3 / (3300.0 * 1000.0);
        let scale = (4.0 * diffusivity * 1e6 * YEAR2SEC).sqrt();
        for (i, pnt) in mesh.coord.iter().enumerate() {
            let expected = 273.0 + (1600.0 - 273.0) * erf(-pnt[NDIMS - 1] / scale);
            assert_abs_diff_eq!(temperature[i], expected, epsilon = 1e-9);
        }
        // surface cold, bottom approaching the mantle temperature
        let t_min = temperature.iter().cloned().fold(f64::MAX, f64::min);
        let t_max = temperature.iter().cloned().fold(f64::MIN, f64::max);
        assert_abs_diff_eq!(t_min, 273.0);
        assert!(t_max > 500.0 && t_max <= 1600.0);
    }

    #[cfg(not(feature = "three_d"))]
    #[test]
    fn continental_geotherm_is_bounded_and_monotone_at_the_ends() {
        let p = param(
            r#"
            [ic]
            temperature_option = 1
            continental_plate_age_in_yr = 100e6
            lithospheric_thickness = 5e3
            radiogenic_crustal_thickness = 2e3
            radiogenic_folding_depth = 1e3
            "#,
        );
        let mat = MatProps::new(&p.mat);
        let mesh = create_new_mesh(&p).unwrap();
        let mut temperature = vec![0.0; mesh.nnode()];
        initial_temperature(&p, &mat, &mesh.coord, &mut temperature).unwrap();

        for (i, pnt) in mesh.coord.iter().enumerate() {
            let depth = -pnt[NDIMS - 1];
            assert!(
                (273.0..=1600.0).contains(&temperature[i]),
                "T {} out of bounds at depth {}",
                temperature[i],
                depth
            );
            if depth == 0.0 {
                assert_eq!(temperature[i], 273.0);
            }
            if depth >= 5e3 {
                assert_eq!(temperature[i], 1600.0, "below the lithosphere T = T_mantle");
            }
        }
    }

    #[test]
    fn unknown_weakzone_option_is_rejected() {
        let p = param("[ic]\nweakzone_option = 7\n");
        assert!(WeakZone::from_param(&p).is_err());
    }
}
