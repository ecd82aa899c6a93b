//! Simulation configuration.
//!
//! Reads a TOML config file (key = value grouped in sections) and
//! validates it into a [`Param`] that the rest of the crate consumes.
//! Key names, defaults and validation rules follow the solver's
//! documented configuration surface.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::{Result, SolverError};
use crate::material::Rheology;

/// Top-level parameter block, one field per config section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Param {
    #[serde(default)]
    pub sim: Sim,
    pub mesh: MeshParam,
    #[serde(default)]
    pub control: Control,
    #[serde(default)]
    pub bc: Bc,
    pub mat: MatParam,
    #[serde(default)]
    pub ic: Ic,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Sim {
    /// Prefix for the output files.
    pub modelname: String,
    /// Max. number of time steps.
    pub max_steps: Option<u64>,
    /// Max. model time (in years).
    pub max_time_in_yr: Option<f64>,
    /// Output every N steps.
    pub output_step_interval: Option<u64>,
    /// Output every N model years.
    pub output_time_interval_in_yr: Option<f64>,
}

impl Default for Sim {
    fn default() -> Self {
        Self {
            modelname: "model".to_string(),
            max_steps: None,
            max_time_in_yr: None,
            output_step_interval: None,
            output_time_interval_in_yr: None,
        }
    }
}

impl Sim {
    pub fn step_limit(&self) -> u64 {
        self.max_steps.unwrap_or(u64::MAX)
    }

    pub fn time_limit_in_yr(&self) -> f64 {
        self.max_time_in_yr.unwrap_or(f64::MAX)
    }

    pub fn output_step_interval(&self) -> u64 {
        self.output_step_interval.unwrap_or(u64::MAX)
    }

    pub fn output_time_interval_in_yr(&self) -> f64 {
        self.output_time_interval_in_yr.unwrap_or(f64::MAX)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MeshParam {
    /// Length of x (in meters).
    pub xlength: f64,
    /// Length of y (in meters), 3D only.
    pub ylength: Option<f64>,
    /// Length of z (in meters).
    pub zlength: f64,
    /// Target spatial resolution (in meters).
    pub resolution: f64,
    /// Smallest tolerated element size, as a fraction of resolution^NDIMS.
    #[serde(default = "default_smallest_size")]
    pub smallest_size: f64,
    /// Remeshing trigger: worst tolerated element quality.
    #[serde(default = "default_min_quality")]
    pub min_quality: f64,
    /// How often (in steps) the mesh quality is checked.
    #[serde(default = "default_quality_check_interval")]
    pub quality_check_step_interval: u64,
    /// Restore the bottom boundary to its initial depth when remeshing.
    #[serde(default = "default_true")]
    pub restoring_bottom: bool,
}

fn default_smallest_size() -> f64 {
    0.01
}
fn default_min_quality() -> f64 {
    0.4
}
fn default_quality_check_interval() -> u64 {
    10
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Control {
    /// Magnitude of gravity (in m/s^2).
    pub gravity: f64,
    /// Scaling factor for inertia (a large number makes the run quasi-static).
    pub inertial_scaling: f64,
    /// Local non-viscous damping factor (0-1).
    pub damping_factor: f64,
    /// Fraction of the critical time step actually taken.
    pub dt_fraction: f64,
    /// 0: lithostatic pressure from the density of material 0.
    /// 1: reference pressure from the PREM model.
    pub ref_pressure_option: i32,
    /// Solve the heat equation each step.
    pub has_thermal_diffusion: bool,
}

impl Default for Control {
    fn default() -> Self {
        Self {
            gravity: 10.0,
            inertial_scaling: 1e5,
            damping_factor: 0.8,
            dt_fraction: 0.5,
            ref_pressure_option: 0,
            has_thermal_diffusion: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Bc {
    /// Surface temperature (in Kelvin).
    pub surface_temperature: f64,
    /// Mantle temperature (in Kelvin).
    pub mantle_temperature: f64,
    /// Magnitude of the boundary velocity (in m/s).
    pub max_vbc_val: f64,
    /// Support the bottom boundary with a Wrinkler foundation.
    #[serde(rename = "wrinkler_foundation")]
    pub has_winkler_foundation: bool,
    /// Excess density of the bottom foundation (in kg/m^3).
    #[serde(rename = "wrinkler_delta_rho")]
    pub winkler_delta_rho: f64,
}

impl Default for Bc {
    fn default() -> Self {
        Self {
            surface_temperature: 273.0,
            mantle_temperature: 1600.0,
            max_vbc_val: 1e-9,
            has_winkler_foundation: true,
            winkler_delta_rho: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatParam {
    /// One of 'elastic', 'viscous', 'maxwell', 'elasto-plastic',
    /// 'elasto-viscous-plastic'.
    pub rheology_type: String,
    #[serde(skip)]
    pub rheol: Rheology,
    /// Number of material types.
    #[serde(default = "default_num_material")]
    pub num_material: usize,
    #[serde(default = "default_visc_max")]
    pub max_viscosity: f64,
    #[serde(default = "default_visc_min")]
    pub min_viscosity: f64,
    #[serde(default = "default_tension_max")]
    pub max_tension: f64,
    #[serde(default = "default_therm_diff_max")]
    pub max_thermal_diffusivity: f64,

    /// Density at 0 Pa and 273 K (kg/m^3), one entry per material.
    #[serde(default = "default_rho0")]
    pub rho0: Vec<f64>,
    /// Volumetric thermal expansion (1/K).
    #[serde(default = "default_alpha")]
    pub alpha: Vec<f64>,
    /// Bulk modulus (Pa).
    #[serde(default = "default_bulk_modulus")]
    pub bulk_modulus: Vec<f64>,
    /// Shear modulus (Pa).
    #[serde(default = "default_shear_modulus")]
    pub shear_modulus: Vec<f64>,
    /// Power-law exponent of dislocation creep.
    #[serde(default = "default_visc_exponent")]
    pub visc_exponent: Vec<f64>,
    /// Pre-exponent coefficient of dislocation creep.
    #[serde(default = "default_visc_coefficient")]
    pub visc_coefficient: Vec<f64>,
    /// Activation energy of dislocation creep (J/mol).
    #[serde(default = "default_visc_activation_energy")]
    pub visc_activation_energy: Vec<f64>,
    /// Isobaric heat capacity (J/kg/K).
    #[serde(default = "default_heat_capacity")]
    pub heat_capacity: Vec<f64>,
    /// Thermal conductivity (W/m/K).
    #[serde(default = "default_therm_cond")]
    pub therm_cond: Vec<f64>,
    /// Plastic strain where weakening starts.
    #[serde(default = "default_pls0")]
    pub pls0: Vec<f64>,
    /// Plastic strain where weakening saturates.
    #[serde(default = "default_pls1")]
    pub pls1: Vec<f64>,
    /// Cohesion before weakening (Pa).
    #[serde(default = "default_cohesion0")]
    pub cohesion0: Vec<f64>,
    /// Cohesion after weakening saturates (Pa).
    #[serde(default = "default_cohesion1")]
    pub cohesion1: Vec<f64>,
    /// Friction angle before weakening (degrees).
    #[serde(default = "default_friction_angle0")]
    pub friction_angle0: Vec<f64>,
    /// Friction angle after weakening saturates (degrees).
    #[serde(default = "default_friction_angle1")]
    pub friction_angle1: Vec<f64>,
    /// Dilation angle before weakening (degrees).
    #[serde(default = "default_dilation_angle0")]
    pub dilation_angle0: Vec<f64>,
    /// Dilation angle after weakening saturates (degrees).
    #[serde(default = "default_dilation_angle1")]
    pub dilation_angle1: Vec<f64>,
}

fn default_num_material() -> usize {
    1
}
fn default_visc_max() -> f64 {
    1e24
}
fn default_visc_min() -> f64 {
    1e18
}
fn default_tension_max() -> f64 {
    1e9
}
fn default_therm_diff_max() -> f64 {
    5e-6
}
fn default_rho0() -> Vec<f64> {
    vec![3210.0]
}
fn default_alpha() -> Vec<f64> {
    vec![3e-5]
}
fn default_bulk_modulus() -> Vec<f64> {
    vec![128.2e9]
}
fn default_shear_modulus() -> Vec<f64> {
    vec![80.5e9]
}
fn default_visc_exponent() -> Vec<f64> {
    vec![3.05]
}
fn default_visc_coefficient() -> Vec<f64> {
    vec![1.25e-1]
}
fn default_visc_activation_energy() -> Vec<f64> {
    vec![3.76e5]
}
fn default_heat_capacity() -> Vec<f64> {
    vec![1000.0]
}
fn default_therm_cond() -> Vec<f64> {
    vec![3.3]
}
fn default_pls0() -> Vec<f64> {
    vec![0.0]
}
fn default_pls1() -> Vec<f64> {
    vec![0.1]
}
fn default_cohesion0() -> Vec<f64> {
    vec![4.4e7]
}
fn default_cohesion1() -> Vec<f64> {
    vec![4.4e6]
}
fn default_friction_angle0() -> Vec<f64> {
    vec![30.0]
}
fn default_friction_angle1() -> Vec<f64> {
    vec![5.0]
}
fn default_dilation_angle0() -> Vec<f64> {
    vec![0.0]
}
fn default_dilation_angle1() -> Vec<f64> {
    vec![0.0]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Ic {
    /// 0: no weak zone; 1: planar; 2: ellipsoidal; 3: Gaussian point.
    pub weakzone_option: i32,
    /// Plastic strain seeded inside the weak zone.
    pub weakzone_plstrain: f64,
    /// Azimuth of the planar zone (degrees), 3D only.
    pub weakzone_azimuth: f64,
    /// Inclination of the planar zone from horizontal (degrees).
    pub weakzone_inclination: f64,
    /// Half width of the planar zone, in multiples of the resolution.
    pub weakzone_halfwidth: f64,
    /// Extent of the planar zone, as fractions of ylength (3D only).
    pub weakzone_y_min: f64,
    pub weakzone_y_max: f64,
    /// Depth window of the planar zone, as fractions of zlength.
    pub weakzone_depth_min: f64,
    pub weakzone_depth_max: f64,
    /// Zone center, as fractions of the domain lengths.
    pub weakzone_xcenter: f64,
    pub weakzone_ycenter: f64,
    pub weakzone_zcenter: f64,
    /// Semi-axes of the ellipsoidal zone (in meters).
    pub weakzone_xsemi_axis: f64,
    pub weakzone_ysemi_axis: f64,
    pub weakzone_zsemi_axis: f64,
    /// Standard deviation of the Gaussian zone (in meters).
    pub weakzone_standard_deviation: f64,

    /// 0: oceanic half-space cooling; 1: continental geotherm;
    /// 90: nodal temperatures read from a file.
    pub temperature_option: i32,
    /// Binary file of nodal temperatures, for temperature_option = 90.
    pub temperature_filename: String,
    pub oceanic_plate_age_in_yr: f64,
    pub continental_plate_age_in_yr: f64,
    /// Thickness of the radiogenic upper crust (m).
    pub radiogenic_crustal_thickness: f64,
    /// e-folding depth of radiogenic heating (m).
    pub radiogenic_folding_depth: f64,
    /// Radiogenic heat production of the crust (W/kg).
    pub radiogenic_heating_of_crust: f64,
    /// Thermal lithosphere thickness (m).
    pub lithospheric_thickness: f64,
    /// Material indices used by the continental geotherm.
    pub mattype_crust: usize,
    pub mattype_mantle: usize,
}

impl Default for Ic {
    fn default() -> Self {
        Self {
            weakzone_option: 1,
            weakzone_plstrain: 0.1,
            weakzone_azimuth: 0.0,
            weakzone_inclination: 90.0,
            weakzone_halfwidth: 1.5,
            weakzone_y_min: 0.0,
            weakzone_y_max: 1.0,
            weakzone_depth_min: 0.0,
            weakzone_depth_max: 0.5,
            weakzone_xcenter: 0.5,
            weakzone_ycenter: 0.5,
            weakzone_zcenter: 0.5,
            weakzone_xsemi_axis: 1e3,
            weakzone_ysemi_axis: 1e3,
            weakzone_zsemi_axis: 1e3,
            weakzone_standard_deviation: 1e3,
            temperature_option: 0,
            temperature_filename: String::new(),
            oceanic_plate_age_in_yr: 60e6,
            continental_plate_age_in_yr: 100e6,
            radiogenic_crustal_thickness: 40e3,
            radiogenic_folding_depth: 10e3,
            radiogenic_heating_of_crust: 9.6e-10,
            lithospheric_thickness: 100e3,
            mattype_crust: 0,
            mattype_mantle: 0,
        }
    }
}

impl Param {
    /// Load and validate a configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(&path).map_err(|e| {
            SolverError::Config(format!(
                "cannot read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let mut param: Param = toml::from_str(contents)
            .map_err(|e| SolverError::Config(format!("cannot parse config: {}", e)))?;
        param.validate()?;
        Ok(param)
    }

    fn validate(&mut self) -> Result<()> {
        // Stopping condition and output cadence need at least one bound each.
        if self.sim.max_steps.is_none() && self.sim.max_time_in_yr.is_none() {
            return Err(SolverError::Config(
                "must provide either sim.max_steps or sim.max_time_in_yr".into(),
            ));
        }
        if self.sim.output_step_interval.is_none()
            && self.sim.output_time_interval_in_yr.is_none()
        {
            return Err(SolverError::Config(
                "must provide either sim.output_step_interval or \
                 sim.output_time_interval_in_yr"
                    .into(),
            ));
        }

        if cfg!(feature = "three_d") && self.mesh.ylength.is_none() {
            return Err(SolverError::Config("mesh.ylength is required in 3D".into()));
        }
        if self.mesh.xlength <= 0.0 || self.mesh.zlength <= 0.0 || self.mesh.resolution <= 0.0
        {
            return Err(SolverError::Config(
                "mesh.xlength, mesh.zlength and mesh.resolution must be positive".into(),
            ));
        }

        if self.control.damping_factor < 0.0 || self.control.damping_factor > 1.0 {
            return Err(SolverError::Config(
                "control.damping_factor must be between 0 and 1".into(),
            ));
        }

        if self.bc.has_winkler_foundation && self.control.gravity == 0.0 {
            self.bc.has_winkler_foundation = false;
            eprintln!("Warning: no gravity, Wrinkler foundation is turned off.");
        }

        self.mat.rheol = Rheology::parse(&self.mat.rheology_type)?;

        let nmat = self.mat.num_material;
        let arrays: [(&str, usize); 17] = [
            ("mat.rho0", self.mat.rho0.len()),
            ("mat.alpha", self.mat.alpha.len()),
            ("mat.bulk_modulus", self.mat.bulk_modulus.len()),
            ("mat.shear_modulus", self.mat.shear_modulus.len()),
            ("mat.visc_exponent", self.mat.visc_exponent.len()),
            ("mat.visc_coefficient", self.mat.visc_coefficient.len()),
            (
                "mat.visc_activation_energy",
                self.mat.visc_activation_energy.len(),
            ),
            ("mat.heat_capacity", self.mat.heat_capacity.len()),
            ("mat.therm_cond", self.mat.therm_cond.len()),
            ("mat.pls0", self.mat.pls0.len()),
            ("mat.pls1", self.mat.pls1.len()),
            ("mat.cohesion0", self.mat.cohesion0.len()),
            ("mat.cohesion1", self.mat.cohesion1.len()),
            ("mat.friction_angle0", self.mat.friction_angle0.len()),
            ("mat.friction_angle1", self.mat.friction_angle1.len()),
            ("mat.dilation_angle0", self.mat.dilation_angle0.len()),
            ("mat.dilation_angle1", self.mat.dilation_angle1.len()),
        ];
        for (name, len) in arrays {
            if len != nmat {
                return Err(SolverError::Config(format!(
                    "{} must have {} entries (mat.num_material), found {}",
                    name, nmat, len
                )));
            }
        }

        // these index the material arrays directly
        if self.ic.mattype_crust >= nmat {
            return Err(SolverError::Config(format!(
                "ic.mattype_crust ({}) must be smaller than mat.num_material ({})",
                self.ic.mattype_crust, nmat
            )));
        }
        if self.ic.mattype_mantle >= nmat {
            return Err(SolverError::Config(format!(
                "ic.mattype_mantle ({}) must be smaller than mat.num_material ({})",
                self.ic.mattype_mantle, nmat
            )));
        }

        Ok(())
    }

    /// y extent; 0 in 2D where it only shows up in products.
    pub fn ylength(&self) -> f64 {
        self.mesh.ylength.unwrap_or(0.0)
    }

    /// Area (2D) or volume (3D) of the undeformed domain.
    pub fn domain_measure(&self) -> f64 {
        if cfg!(feature = "three_d") {
            self.mesh.xlength * self.ylength() * self.mesh.zlength
        } else {
            self.mesh.xlength * self.mesh.zlength
        }
    }
}
