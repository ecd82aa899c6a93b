use std::env;
use std::process;

use terradyn::{Param, Simulation};

const HELP: &str = "\
Usage: terradyn config_file

The config file is TOML, keys grouped in sections:

[sim]
  modelname                     Prefix for the output files
  max_steps                     Max. number of time steps
  max_time_in_yr                Max. time (in years)
  output_step_interval          Output every N steps
  output_time_interval_in_yr    Output every N model years

[mesh]
  xlength, ylength, zlength     Domain size (m); ylength for 3D only
  resolution                    Spatial resolution (m)
  smallest_size                 Smallest tolerated element size fraction
  min_quality                   Remeshing trigger quality
  quality_check_step_interval   Steps between mesh quality checks
  restoring_bottom              Restore the bottom depth when remeshing

[control]
  gravity                       Gravity magnitude (m/s^2)
  inertial_scaling              Quasi-static inertia scaling factor
  damping_factor                Force damping factor (0-1)
  dt_fraction                   Fraction of the critical time step
  ref_pressure_option           0: lithostatic from material 0
  has_thermal_diffusion         Solve the heat equation

[bc]
  surface_temperature           Surface temperature (K)
  mantle_temperature            Mantle temperature (K)
  max_vbc_val                   Boundary velocity magnitude (m/s)
  wrinkler_foundation           Support the bottom with a foundation
  wrinkler_delta_rho            Excess foundation density (kg/m^3)

[mat]
  rheology_type                 'elastic', 'viscous', 'maxwell',
                                'elasto-plastic' or
                                'elasto-viscous-plastic'
  num_material                  Number of material types
  min_viscosity, max_viscosity  Viscosity clamps (Pa s)
  max_tension                   Tension cut-off (Pa)
  max_thermal_diffusivity       Diffusivity cap (m^2/s)
  rho0, alpha, bulk_modulus, shear_modulus, visc_exponent,
  visc_coefficient, visc_activation_energy, heat_capacity, therm_cond,
  pls0, pls1, cohesion0, cohesion1, friction_angle0, friction_angle1,
  dilation_angle0, dilation_angle1
                                Per-material arrays [v0, v1, ...] of
                                length num_material

[ic]
  weakzone_option               0: none, 1: planar, 2: ellipsoidal,
                                3: Gaussian
  weakzone_* parameters, temperature_option (0: oceanic half-space,
  1: continental geotherm, 90: from file), oceanic_plate_age_in_yr,
  continental geotherm parameters
";

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() == 2 && (args[1] == "-h" || args[1] == "--help") {
        print!("{}", HELP);
        return;
    }
    if args.len() != 2 {
        eprintln!("Usage: {} config_file", args.first().map(String::as_str).unwrap_or("terradyn"));
        process::exit(-1);
    }

    let param = match Param::from_file(&args[1]) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };

    let result = Simulation::new(param).and_then(|mut sim| sim.run());
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}
