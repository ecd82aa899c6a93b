//! Material properties and rheology.
//!
//! Implements the constitutive update for all supported rheologies:
//! elastic, viscous, Maxwell viscoelastic, elasto-plastic
//! (Mohr-Coulomb with tension cut-off) and elasto-visco-plastic.
//! Plastic parameters weaken piecewise-linearly with accumulated
//! plastic strain.

use crate::constants::*;
use crate::error::{Result, SolverError};

/// Rheology of the whole model, shared by all materials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rheology {
    #[default]
    Elastic,
    Viscous,
    Maxwell,
    ElastoPlastic,
    ElastoViscoPlastic,
}

impl Rheology {
    /// Parse the `mat.rheology_type` config string.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "elastic" => Ok(Rheology::Elastic),
            "viscous" => Ok(Rheology::Viscous),
            "maxwell" => Ok(Rheology::Maxwell),
            "elasto-plastic" => Ok(Rheology::ElastoPlastic),
            "elasto-viscous-plastic" => Ok(Rheology::ElastoViscoPlastic),
            other => Err(SolverError::UnknownOption(format!(
                "unknown rheology: '{}'",
                other
            ))),
        }
    }
}

/// Per-material parameter table plus the shared rheology and limits.
///
/// All accessors take a material index; the caller maps elements to
/// materials.
#[derive(Debug, Clone)]
pub struct MatProps {
    pub rheol: Rheology,
    pub nmat: usize,

    pub visc_min: f64,
    pub visc_max: f64,
    pub tension_max: f64,
    pub therm_diff_max: f64,

    rho0: Vec<f64>,
    alpha: Vec<f64>,
    bulk_modulus: Vec<f64>,
    shear_modulus: Vec<f64>,
    visc_exponent: Vec<f64>,
    visc_coefficient: Vec<f64>,
    visc_activation_energy: Vec<f64>,
    heat_capacity: Vec<f64>,
    therm_cond: Vec<f64>,
    pls0: Vec<f64>,
    pls1: Vec<f64>,
    cohesion0: Vec<f64>,
    cohesion1: Vec<f64>,
    friction_angle0: Vec<f64>,
    friction_angle1: Vec<f64>,
    dilation_angle0: Vec<f64>,
    dilation_angle1: Vec<f64>,
}

impl MatProps {
    pub fn new(mat: &crate::config::MatParam) -> Self {
        Self {
            rheol: mat.rheol,
            nmat: mat.num_material,
            visc_min: mat.min_viscosity,
            visc_max: mat.max_viscosity,
            tension_max: mat.max_tension,
            therm_diff_max: mat.max_thermal_diffusivity,
            rho0: mat.rho0.clone(),
            alpha: mat.alpha.clone(),
            bulk_modulus: mat.bulk_modulus.clone(),
            shear_modulus: mat.shear_modulus.clone(),
            visc_exponent: mat.visc_exponent.clone(),
            visc_coefficient: mat.visc_coefficient.clone(),
            visc_activation_energy: mat.visc_activation_energy.clone(),
            heat_capacity: mat.heat_capacity.clone(),
            therm_cond: mat.therm_cond.clone(),
            pls0: mat.pls0.clone(),
            pls1: mat.pls1.clone(),
            cohesion0: mat.cohesion0.clone(),
            cohesion1: mat.cohesion1.clone(),
            friction_angle0: mat.friction_angle0.clone(),
            friction_angle1: mat.friction_angle1.clone(),
            dilation_angle0: mat.dilation_angle0.clone(),
            dilation_angle1: mat.dilation_angle1.clone(),
        }
    }

    pub fn rho(&self, m: usize) -> f64 {
        self.rho0[m]
    }

    pub fn alpha(&self, m: usize) -> f64 {
        self.alpha[m]
    }

    pub fn bulkm(&self, m: usize) -> f64 {
        self.bulk_modulus[m]
    }

    pub fn shearm(&self, m: usize) -> f64 {
        self.shear_modulus[m]
    }

    pub fn cp(&self, m: usize) -> f64 {
        self.heat_capacity[m]
    }

    pub fn k(&self, m: usize) -> f64 {
        self.therm_cond[m]
    }

    /// Thermal diffusivity k/(rho cp), capped by `max_thermal_diffusivity`.
    pub fn therm_diff(&self, m: usize) -> f64 {
        let kappa = self.k(m) / (self.rho(m) * self.cp(m));
        kappa.min(self.therm_diff_max)
    }

    /// Cohesion, friction angle and dilation angle (radians) weakened by
    /// the accumulated plastic strain: the initial values up to `pls0`,
    /// linear in between, saturated at `pls1`.
    pub fn plastic_props(&self, m: usize, plstrain: f64) -> (f64, f64, f64) {
        let (p0, p1) = (self.pls0[m], self.pls1[m]);
        let f = if plstrain <= p0 {
            0.0
        } else if plstrain >= p1 || p1 <= p0 {
            1.0
        } else {
            (plstrain - p0) / (p1 - p0)
        };
        let lerp = |a: f64, b: f64| a + (b - a) * f;
        let c = lerp(self.cohesion0[m], self.cohesion1[m]);
        let phi = lerp(self.friction_angle0[m], self.friction_angle1[m]) * DEG2RAD;
        let psi = lerp(self.dilation_angle0[m], self.dilation_angle1[m]) * DEG2RAD;
        (c, phi, psi)
    }

    /// Power-law creep viscosity at temperature `t` (K) for the given
    /// strain rate, clamped to [visc_min, visc_max].
    ///
    /// eta = 1/2 A^(-1/n) edot_II^((1-n)/n) exp(E / (n R T))
    pub fn visc(&self, m: usize, t: f64, strain_rate: &Tensor) -> f64 {
        let n = self.visc_exponent[m];
        let a = self.visc_coefficient[m];
        let e_act = self.visc_activation_energy[m];

        let edot_ii = second_invariant(strain_rate);
        if edot_ii <= 0.0 {
            return self.visc_max;
        }
        let eta = 0.5
            * a.powf(-1.0 / n)
            * edot_ii.powf((1.0 - n) / n)
            * (e_act / (n * GAS_CONSTANT * t)).exp();
        eta.clamp(self.visc_min, self.visc_max)
    }

    /// Advance the stress of one element over `dt`.
    ///
    /// `strain` accumulates the total strain, `plstrain` the scalar
    /// plastic strain. `t` is the element-averaged temperature, used by
    /// the creep law.
    pub fn update_stress(
        &self,
        m: usize,
        dt: f64,
        t: f64,
        strain_rate: &Tensor,
        strain: &mut Tensor,
        stress: &mut Tensor,
        plstrain: &mut f64,
    ) {
        let mut de = [0.0; NSTR];
        for i in 0..NSTR {
            de[i] = strain_rate[i] * dt;
            strain[i] += de[i];
        }

        match self.rheol {
            Rheology::Elastic => self.elastic(m, &de, stress),
            Rheology::Viscous => self.viscous(m, t, strain_rate, strain, stress),
            Rheology::Maxwell => {
                self.maxwell(m, dt, t, strain_rate, &de, stress);
            }
            Rheology::ElastoPlastic => {
                let mut trial = *stress;
                self.elastic(m, &de, &mut trial);
                let dpls = self.return_map(m, *plstrain, &mut trial);
                *stress = trial;
                *plstrain += dpls;
            }
            Rheology::ElastoViscoPlastic => {
                let mut relaxed = *stress;
                self.maxwell(m, dt, t, strain_rate, &de, &mut relaxed);

                let mut mapped = *stress;
                self.elastic(m, &de, &mut mapped);
                let dpls = self.return_map(m, *plstrain, &mut mapped);

                // keep whichever branch carries less deviatoric stress
                if second_invariant(&relaxed) < second_invariant(&mapped) {
                    *stress = relaxed;
                } else {
                    *stress = mapped;
                    *plstrain += dpls;
                }
            }
        }
    }

    /// d_sigma = 2 G de' + K tr(de) I
    fn elastic(&self, m: usize, de: &Tensor, stress: &mut Tensor) {
        let g = self.shearm(m);
        let k = self.bulkm(m);
        let tr = trace(de);
        for i in 0..NDIMS {
            stress[i] += 2.0 * g * (de[i] - tr / NDIMS as f64) + k * tr;
        }
        for i in NDIMS..NSTR {
            stress[i] += 2.0 * g * de[i];
        }
    }

    /// sigma = 2 eta edot' - p I with p = -K tr(strain).
    fn viscous(&self, m: usize, t: f64, edot: &Tensor, strain: &Tensor, stress: &mut Tensor) {
        let eta = self.visc(m, t, edot);
        let k = self.bulkm(m);
        let tr_rate = trace(edot);
        let mean = k * trace(strain);
        for i in 0..NDIMS {
            stress[i] = 2.0 * eta * (edot[i] - tr_rate / NDIMS as f64) + mean;
        }
        for i in NDIMS..NSTR {
            stress[i] = 2.0 * eta * edot[i];
        }
    }

    /// Elastic increment with the deviatoric part relaxed over the
    /// Maxwell time: s <- (s + 2 G de') / (1 + dt G / (2 eta)).
    fn maxwell(
        &self,
        m: usize,
        dt: f64,
        t: f64,
        edot: &Tensor,
        de: &Tensor,
        stress: &mut Tensor,
    ) {
        let g = self.shearm(m);
        let k = self.bulkm(m);
        let eta = self.visc(m, t, edot);
        let relax = 1.0 / (1.0 + dt * g / (2.0 * eta));

        let tr_de = trace(de);
        let old_mean = trace(stress) / NDIMS as f64;
        let mean = old_mean + k * tr_de;
        for i in 0..NDIMS {
            let dev = stress[i] - old_mean;
            stress[i] = (dev + 2.0 * g * (de[i] - tr_de / NDIMS as f64)) * relax + mean;
        }
        for i in NDIMS..NSTR {
            stress[i] = (stress[i] + 2.0 * g * de[i]) * relax;
        }
    }

    /// Mohr-Coulomb return mapping in principal-stress space with a
    /// tension cut-off and non-associated flow (dilation angle psi).
    /// Returns the plastic strain increment; the stress is mapped back
    /// onto the yield surface in place.
    fn return_map(&self, m: usize, plstrain: f64, stress: &mut Tensor) -> f64 {
        let (cohesion, phi, psi) = self.plastic_props(m, plstrain);
        let nphi = (1.0 + phi.sin()) / (1.0 - phi.sin());
        let npsi = (1.0 + psi.sin()) / (1.0 - psi.sin());
        let amc = 2.0 * cohesion * nphi.sqrt();

        // apex-limited tension cut-off
        let tension_cutoff = if nphi > 1.0 {
            self.tension_max.min(amc / (nphi - 1.0))
        } else {
            self.tension_max
        };

        let (mut p, vecs) = principal_directions(stress);
        // tension positive; p[0] most compressive, p[NDIMS-1] least
        let fs = p[0] - p[NDIMS - 1] * nphi + amc;
        let ft = p[NDIMS - 1] - tension_cutoff;
        if fs > 0.0 && ft < 0.0 {
            return 0.0; // inside the yield surface
        }

        let g = self.shearm(m);
        let k = self.bulkm(m);
        let a1 = k + 4.0 * g / 3.0;
        let a2 = k - 2.0 * g / 3.0;

        // which side of the corner between the shear and tensile surfaces
        let pa = (1.0 + nphi * nphi).sqrt() + nphi;
        let ps = tension_cutoff * nphi - amc;
        let h = p[NDIMS - 1] - tension_cutoff + pa * (p[0] - ps);

        let mut dep = [0.0; NDIMS];
        if h < 0.0 {
            // shear failure
            let alam = fs / (a1 - a2 * npsi + a1 * nphi * npsi - a2 * nphi);
            p[0] -= alam * (a1 - a2 * npsi);
            #[cfg(feature = "three_d")]
            {
                p[1] -= alam * a2 * (1.0 - npsi);
            }
            p[NDIMS - 1] -= alam * (a2 - a1 * npsi);
            dep[0] = alam;
            dep[NDIMS - 1] = -alam * npsi;
        } else {
            // tensile failure
            let alam = ft / a1;
            p[0] -= alam * a2;
            #[cfg(feature = "three_d")]
            {
                p[1] -= alam * a2;
            }
            p[NDIMS - 1] -= alam * a1;
            dep[NDIMS - 1] = alam;
        }

        compose_from_principal(&p, &vecs, stress);

        // second invariant of the deviatoric plastic strain increment
        let mean: f64 = dep.iter().sum::<f64>() / NDIMS as f64;
        let sum2: f64 = dep.iter().map(|d| (d - mean) * (d - mean)).sum();
        (0.5 * sum2).sqrt()
    }
}

/// Trace of a Voigt-stored symmetric tensor.
pub fn trace(t: &Tensor) -> f64 {
    t[..NDIMS].iter().sum()
}

/// sqrt(J2) of the deviatoric part: sqrt(1/2 s:s).
pub fn second_invariant(t: &Tensor) -> f64 {
    let mean = trace(t) / NDIMS as f64;
    let mut s2 = 0.0;
    for i in 0..NDIMS {
        s2 += 0.5 * (t[i] - mean) * (t[i] - mean);
    }
    for i in NDIMS..NSTR {
        s2 += t[i] * t[i];
    }
    s2.sqrt()
}

/// Principal values (ascending) and unit directions (one per column).
#[cfg(not(feature = "three_d"))]
fn principal_directions(t: &Tensor) -> ([f64; NDIMS], [[f64; NDIMS]; NDIMS]) {
    let (sxx, szz, sxz) = (t[0], t[1], t[2]);
    let center = 0.5 * (sxx + szz);
    let radius = (0.25 * (sxx - szz) * (sxx - szz) + sxz * sxz).sqrt();
    let vals = [center - radius, center + radius];

    let mut vecs = [[1.0, 0.0], [0.0, 1.0]];
    if sxz.abs() > 1e-30 * radius.max(1.0) {
        for (k, &lam) in vals.iter().enumerate() {
            // (sxx - lam) vx + sxz vz = 0  =>  v = (sxz, lam - sxx)
            let vx = sxz;
            let vz = lam - sxx;
            let norm = (vx * vx + vz * vz).sqrt();
            vecs[k] = [vx / norm, vz / norm];
        }
    } else if sxx > szz {
        vecs = [[0.0, 1.0], [1.0, 0.0]];
    }
    (vals, vecs)
}

#[cfg(feature = "three_d")]
fn principal_directions(t: &Tensor) -> ([f64; NDIMS], [[f64; NDIMS]; NDIMS]) {
    use nalgebra::Matrix3;
    // Voigt {xx, yy, zz, xy, xz, yz}
    let m = Matrix3::new(
        t[0], t[3], t[4], //
        t[3], t[1], t[5], //
        t[4], t[5], t[2],
    );
    let eig = m.symmetric_eigen();
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| {
        eig.eigenvalues[a]
            .partial_cmp(&eig.eigenvalues[b])
            .expect("eigenvalues are finite")
    });
    let mut vals = [0.0; 3];
    let mut vecs = [[0.0; 3]; 3];
    for (k, &i) in order.iter().enumerate() {
        vals[k] = eig.eigenvalues[i];
        let col = eig.eigenvectors.column(i);
        vecs[k] = [col[0], col[1], col[2]];
    }
    (vals, vecs)
}

/// Rebuild the Voigt tensor from principal values and directions.
#[cfg(not(feature = "three_d"))]
fn compose_from_principal(p: &[f64; NDIMS], vecs: &[[f64; NDIMS]; NDIMS], out: &mut Tensor) {
    out[0] = p[0] * vecs[0][0] * vecs[0][0] + p[1] * vecs[1][0] * vecs[1][0];
    out[1] = p[0] * vecs[0][1] * vecs[0][1] + p[1] * vecs[1][1] * vecs[1][1];
    out[2] = p[0] * vecs[0][0] * vecs[0][1] + p[1] * vecs[1][0] * vecs[1][1];
}

#[cfg(feature = "three_d")]
fn compose_from_principal(p: &[f64; NDIMS], vecs: &[[f64; NDIMS]; NDIMS], out: &mut Tensor) {
    let entry = |i: usize, j: usize| -> f64 {
        (0..3).map(|k| p[k] * vecs[k][i] * vecs[k][j]).sum()
    };
    out[0] = entry(0, 0);
    out[1] = entry(1, 1);
    out[2] = entry(2, 2);
    out[3] = entry(0, 1);
    out[4] = entry(0, 2);
    out[5] = entry(1, 2);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Param;
    use approx::assert_relative_eq;

    fn props(rheology: &str) -> MatProps {
        let cfg = format!(
            r#"
            [sim]
            max_steps = 1
            output_step_interval = 1

            [mesh]
            xlength = 1e4
            ylength = 1e4
            zlength = 1e4
            resolution = 1e3

            [mat]
            rheology_type = "{}"
            rho0 = [3300.0]
            bulk_modulus = [1e11]
            shear_modulus = [7e10]
            cohesion0 = [4.4e7]
            cohesion1 = [4.4e6]
            friction_angle0 = [30.0]
            friction_angle1 = [5.0]
            pls0 = [0.0]
            pls1 = [0.1]
            "#,
            rheology
        );
        let param = Param::from_toml_str(&cfg).expect("valid test config");
        MatProps::new(&param.mat)
    }

    #[test]
    fn elastic_isotropic_strain_gives_pressure() {
        let mat = props("elastic");
        let e0 = 1e-4;
        let mut strain = [0.0; NSTR];
        let mut stress = [0.0; NSTR];
        let mut pls = 0.0;

        // uniform isotropic strain rate, applied over one unit step
        let mut edot = [0.0; NSTR];
        for i in 0..NDIMS {
            edot[i] = e0;
        }
        mat.update_stress(0, 1.0, 300.0, &edot, &mut strain, &mut stress, &mut pls);

        // deviatoric part of an isotropic strain is zero, so
        // sigma = K tr(eps) I
        let expected = 1e11 * e0 * NDIMS as f64;
        for i in 0..NDIMS {
            assert_relative_eq!(stress[i], expected, max_relative = 1e-12);
        }
        for i in NDIMS..NSTR {
            assert_relative_eq!(stress[i], 0.0);
        }
        assert_eq!(pls, 0.0, "elastic update must not accumulate plastic strain");
    }

    #[test]
    fn elastic_update_is_subdivision_independent() {
        let mat = props("elastic");
        let mut edot = [0.0; NSTR];
        edot[0] = 3e-5;
        edot[NSTR - 1] = -1e-5;

        let run = |substeps: usize| -> Tensor {
            let mut strain = [0.0; NSTR];
            let mut stress = [0.0; NSTR];
            let mut pls = 0.0;
            let dt = 1.0 / substeps as f64;
            for _ in 0..substeps {
                mat.update_stress(0, dt, 300.0, &edot, &mut strain, &mut stress, &mut pls);
            }
            stress
        };

        let once = run(1);
        let many = run(7);
        for i in 0..NSTR {
            assert_relative_eq!(once[i], many[i], max_relative = 1e-12);
        }
    }

    #[test]
    fn maxwell_deviatoric_stress_relaxes() {
        let mat = props("maxwell");
        let g = 7e10;
        let edot = [0.0; NSTR];
        let mut strain = [0.0; NSTR];
        let mut pls = 0.0;

        let mut stress = [0.0; NSTR];
        stress[NSTR - 1] = 1e6; // pure shear

        // zero strain rate: eta clamps to visc_max
        let eta = mat.visc_max;
        let dt = 2.0 * eta / g; // one relaxation factor of 1/2
        mat.update_stress(0, dt, 300.0, &edot, &mut strain, &mut stress, &mut pls);

        assert_relative_eq!(stress[NSTR - 1], 0.5e6, max_relative = 1e-12);
        for i in 0..NDIMS {
            assert_relative_eq!(stress[i], 0.0, epsilon = 1.0);
        }
    }

    #[test]
    fn weakening_is_piecewise_linear_and_monotone() {
        let mat = props("elasto-plastic");

        let (c_start, _, _) = mat.plastic_props(0, 0.0);
        assert_eq!(c_start, 4.4e7);

        let (c_end, phi_end, _) = mat.plastic_props(0, 0.1);
        assert_eq!(c_end, 4.4e6);
        assert_relative_eq!(phi_end, 5.0 * DEG2RAD);

        let (c_beyond, _, _) = mat.plastic_props(0, 5.0);
        assert_eq!(c_beyond, 4.4e6, "cohesion clamps at the saturated value");

        let (c_half, _, _) = mat.plastic_props(0, 0.05);
        assert_relative_eq!(c_half, 0.5 * (4.4e7 + 4.4e6), max_relative = 1e-12);

        let mut last = f64::INFINITY;
        for i in 0..20 {
            let (c, _, _) = mat.plastic_props(0, i as f64 * 0.01);
            assert!(c <= last, "cohesion must be non-increasing in plastic strain");
            last = c;
        }
    }

    #[test]
    fn return_map_brings_stress_back_to_yield() {
        let mat = props("elasto-plastic");

        // differential stress well beyond the Mohr-Coulomb strength
        let mut stress = [0.0; NSTR];
        stress[0] = -4e8;

        let dpls = mat.return_map(0, 0.0, &mut stress);
        assert!(dpls > 0.0, "yielding must accumulate plastic strain");

        // the mapped stress sits on the yield surface the map used
        // (the one evaluated at the pre-update plastic strain)
        let (c, phi, _) = mat.plastic_props(0, 0.0);
        let nphi = (1.0 + phi.sin()) / (1.0 - phi.sin());
        let amc = 2.0 * c * nphi.sqrt();
        let (p, _) = super::principal_directions(&stress);
        let fs = p[0] - p[NDIMS - 1] * nphi + amc;
        assert_relative_eq!(fs, 0.0, epsilon = 1e-6 * amc);
    }

    #[test]
    fn return_map_leaves_elastic_state_alone() {
        let mat = props("elasto-plastic");
        let mut stress = [0.0; NSTR];
        stress[0] = -2e6;
        stress[1] = -1e6;
        let before = stress;
        let dpls = mat.return_map(0, 0.0, &mut stress);
        assert_eq!(dpls, 0.0);
        assert_eq!(stress, before);
    }

    #[test]
    fn tension_cutoff_caps_tensile_stress() {
        let mat = props("elasto-plastic");
        let mut stress = [0.0; NSTR];
        // strong uniaxial tension, way above any cut-off
        stress[0] = -1e8;
        stress[1] = 2e9;
        let dpls = mat.return_map(0, 0.0, &mut stress);
        assert!(dpls > 0.0);
        let (p, _) = super::principal_directions(&stress);
        let (c, phi, _) = mat.plastic_props(0, 0.0);
        let nphi = (1.0 + phi.sin()) / (1.0 - phi.sin());
        let cutoff = mat.tension_max.min(2.0 * c * nphi.sqrt() / (nphi - 1.0));
        assert!(
            p[NDIMS - 1] <= cutoff * (1.0 + 1e-9),
            "tensile principal stress {} exceeds cut-off {}",
            p[NDIMS - 1],
            cutoff
        );
    }

    #[test]
    fn viscosity_is_clamped() {
        let mat = props("viscous");
        let mut edot = [0.0; NSTR];

        // vanishing strain rate: upper clamp
        let eta0 = mat.visc(0, 1000.0, &edot);
        assert_eq!(eta0, mat.visc_max);

        // enormous strain rate at high temperature: lower clamp
        edot[NSTR - 1] = 1.0;
        let eta1 = mat.visc(0, 2000.0, &edot);
        assert_eq!(eta1, mat.visc_min);

        // geologic strain rate stays within the clamps
        edot[NSTR - 1] = 1e-15;
        let eta2 = mat.visc(0, 1500.0, &edot);
        assert!(eta2 >= mat.visc_min && eta2 <= mat.visc_max);
    }

    #[test]
    fn principal_directions_recompose() {
        let mut t = [0.0; NSTR];
        t[0] = -3e6;
        t[1] = 1e6;
        t[NSTR - 1] = 2e6;
        let (p, v) = super::principal_directions(&t);
        assert!(p[0] <= p[NDIMS - 1]);
        let mut back = [0.0; NSTR];
        super::compose_from_principal(&p, &v, &mut back);
        for i in 0..NSTR {
            assert_relative_eq!(back[i], t[i], max_relative = 1e-10, epsilon = 1e-4);
        }
    }
}
