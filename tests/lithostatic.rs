//! A gravity-loaded elastic box initialized with lithostatic stress
//! must stay put.

#![cfg(not(feature = "three_d"))]

use approx::assert_relative_eq;
use terradyn::constants::*;
use terradyn::simulation::element_centroid;
use terradyn::{Param, Simulation};

const CONFIG: &str = r#"
[sim]
max_steps = 1
output_step_interval = 100000

[mesh]
xlength = 4e4
zlength = 1e4
resolution = 1e3

[control]
gravity = 10.0

[bc]
max_vbc_val = 0.0

[mat]
rheology_type = "elastic"
rho0 = [3300.0]
bulk_modulus = [1e11]
shear_modulus = [7e10]

[ic]
weakzone_option = 0
"#;

#[test]
fn one_step_stays_in_lithostatic_equilibrium() {
    let param = Param::from_toml_str(CONFIG).unwrap();
    let mut sim = Simulation::new(param).unwrap();
    let coord0 = sim.var.mesh.coord.clone();

    sim.step().unwrap();

    let mut max_disp: f64 = 0.0;
    for (p0, p1) in coord0.iter().zip(sim.var.mesh.coord.iter()) {
        let dx = p1[0] - p0[0];
        let dz = p1[1] - p0[1];
        max_disp = max_disp.max((dx * dx + dz * dz).sqrt());
    }
    assert!(
        max_disp < 1e-3,
        "equilibrium box moved by {} m in one step",
        max_disp
    );

    // the stress stays lithostatic
    for e in 0..sim.var.mesh.nelem() {
        let c = element_centroid(&sim.var, e);
        let expected = -3300.0 * 10.0 * (-c[1]);
        let s = sim.var.stress[e];
        assert_relative_eq!(s[0], expected, max_relative = 1e-6);
        assert_relative_eq!(s[1], expected, max_relative = 1e-6);
        assert!(
            s[2].abs() < 1e-6 * expected.abs(),
            "shear stress {} appeared out of nowhere",
            s[2]
        );
    }
}

#[test]
fn lumped_mass_conserves_total_mass() {
    let param = Param::from_toml_str(CONFIG).unwrap();
    let sim = Simulation::new(param).unwrap();

    let elem_total: f64 = sim.var.volume.iter().map(|v| 3300.0 * v).sum();
    let node_total: f64 = sim.var.mass.iter().sum();
    assert_relative_eq!(elem_total, node_total, max_relative = 1e-12);

    // and the nodal volume shares add up the same way
    let vol_total: f64 = sim.var.volume.iter().sum();
    let vol_n_total: f64 = sim.var.volume_n.iter().sum();
    assert_relative_eq!(vol_total, vol_n_total, max_relative = 1e-12);
}

#[test]
fn boundary_flags_are_the_or_of_incident_segments() {
    let param = Param::from_toml_str(CONFIG).unwrap();
    let sim = Simulation::new(param).unwrap();

    let mut expected = vec![0u32; sim.var.mesh.nnode()];
    for (s, seg) in sim.var.mesh.segment.iter().enumerate() {
        for &n in seg {
            expected[n] |= sim.var.mesh.segflag[s];
        }
    }
    assert_eq!(expected, sim.var.bcflag);

    // corners carry two flags, the interior none
    assert!(sim
        .var
        .bcflag
        .iter()
        .any(|&f| f == (BOUNDX0 | BOUNDZ0)));
    assert!(sim.var.bcflag.iter().any(|&f| f == 0));
}

#[test]
fn stress_is_stored_in_fixed_voigt_order() {
    // {xx, zz, xz}: a pure horizontal load only enters component 0
    let param = Param::from_toml_str(CONFIG).unwrap();
    let sim = Simulation::new(param).unwrap();
    assert_eq!(NSTR, 3);
    assert_eq!(sim.var.stress[0].len(), NSTR);
}
