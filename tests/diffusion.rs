//! Thermal initial condition and the explicit diffusion update.

#![cfg(not(feature = "three_d"))]

use approx::assert_abs_diff_eq;
use terradyn::constants::*;
use terradyn::ic::erf;
use terradyn::{Param, Simulation};

const CONFIG: &str = r#"
[sim]
max_steps = 5
output_step_interval = 100000

[control]
gravity = 0.0

[mesh]
xlength = 1e4
zlength = 1e4
resolution = 1e3

[bc]
surface_temperature = 273.0
mantle_temperature = 1600.0
max_vbc_val = 0.0

[mat]
rheology_type = "elastic"
rho0 = [3300.0]
heat_capacity = [1000.0]
therm_cond = [3.3]

[ic]
weakzone_option = 0
temperature_option = 0
oceanic_plate_age_in_yr = 1e6
"#;

#[test]
fn initial_geotherm_is_the_halfspace_cooling_profile() {
    let param = Param::from_toml_str(CONFIG).unwrap();
    let sim = Simulation::new(param).unwrap();

    let diffusivity = 3.3 / (3300.0 * 1000.0);
    let scale = (4.0 * diffusivity * 1e6 * YEAR2SEC).sqrt();
    for (n, p) in sim.var.mesh.coord.iter().enumerate() {
        let expected = 273.0 + (1600.0 - 273.0) * erf(-p[NDIMS - 1] / scale);
        assert_abs_diff_eq!(sim.var.temperature[n], expected, epsilon = 1e-6);
    }
}

#[test]
fn surface_temperature_is_clamped_every_step() {
    let param = Param::from_toml_str(CONFIG).unwrap();
    let mut sim = Simulation::new(param).unwrap();

    for _ in 0..5 {
        sim.step().unwrap();
        for (n, &flag) in sim.var.bcflag.iter().enumerate() {
            if flag & BOUNDZ1 != 0 {
                assert_eq!(
                    sim.var.temperature[n], 273.0,
                    "surface node {} drifted off the clamp",
                    n
                );
            }
        }
        // diffusion stays inside the physical bounds
        for &t in &sim.var.temperature {
            assert!(
                (272.9..=1600.1).contains(&t),
                "temperature {} escaped the profile bounds",
                t
            );
        }
    }
}

#[test]
fn quiescent_state_stays_quiescent() {
    // zero gravity, zero boundary velocity, uniform temperature:
    // nothing may move or change
    let cfg = CONFIG
        .replace("surface_temperature = 273.0", "surface_temperature = 600.0")
        .replace("mantle_temperature = 1600.0", "mantle_temperature = 600.0")
        .replace("max_steps = 5", "max_steps = 12");
    let param = Param::from_toml_str(&cfg).unwrap();
    let mut sim = Simulation::new(param).unwrap();
    let coord0 = sim.var.mesh.coord.clone();

    for _ in 0..12 {
        sim.step().unwrap();
    }

    for (n, p) in sim.var.mesh.coord.iter().enumerate() {
        assert_abs_diff_eq!(p[0], coord0[n][0], epsilon = 1e-9);
        assert_abs_diff_eq!(p[1], coord0[n][1], epsilon = 1e-9);
    }
    for v in &sim.var.vel {
        assert_abs_diff_eq!(v[0], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(v[1], 0.0, epsilon = 1e-12);
    }
    for s in &sim.var.stress {
        for &c in s.iter() {
            assert_abs_diff_eq!(c, 0.0, epsilon = 1e-9);
        }
    }
    for &t in &sim.var.temperature {
        assert_abs_diff_eq!(t, 600.0, epsilon = 1e-9);
    }
}
