//! Remeshing triggers and the full rebuild-and-transfer pipeline.

#![cfg(not(feature = "three_d"))]

use terradyn::constants::*;
use terradyn::{bad_mesh_quality, remesh, MeshQualityVerdict, Param, Simulation};

const CONFIG: &str = r#"
[sim]
max_steps = 10
output_step_interval = 100000

[mesh]
xlength = 1e4
zlength = 1e4
resolution = 1e3

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
fn displaced_bottom_node_trips_the_quality_check() {
    let param = Param::from_toml_str(CONFIG).unwrap();
    let mut sim = Simulation::new(param).unwrap();

    // a pristine mesh is fine
    assert_eq!(
        bad_mesh_quality(&sim.param, &sim.var),
        MeshQualityVerdict::Good
    );

    // push one bottom node half a resolution below the restored depth
    let node = sim
        .var
        .bcflag
        .iter()
        .position(|&f| f == BOUNDZ0)
        .expect("a mid-bottom node exists");
    sim.var.mesh.coord[node][1] = -1e4 - 0.5 * 1e3;

    match bad_mesh_quality(&sim.param, &sim.var) {
        MeshQualityVerdict::BottomDrift { node: n, z } => {
            assert_eq!(n, node);
            assert_eq!(z, -1.05e4);
        }
        other => panic!("expected a bottom-drift verdict, got {:?}", other),
    }
}

#[test]
fn squashed_element_trips_the_quality_check() {
    let param = Param::from_toml_str(CONFIG).unwrap();
    let mut sim = Simulation::new(param).unwrap();

    // drag an interior node onto a neighbor: its elements turn to slivers
    let (node, target) = interior_neighbor_pair(&sim);
    let t = sim.var.mesh.coord[target];
    sim.var.mesh.coord[node] = [t[0] + 1.0, t[1]];

    match bad_mesh_quality(&sim.param, &sim.var) {
        MeshQualityVerdict::WorstElement { quality, .. } => {
            assert!(quality < sim.param.mesh.min_quality);
        }
        other => panic!("expected a worst-element verdict, got {:?}", other),
    }
}

#[test]
fn remeshing_repairs_tiny_elements_and_restores_the_bottom() {
    let param = Param::from_toml_str(CONFIG).unwrap();
    let mut sim = Simulation::new(param).unwrap();

    let smallest_vol = sim.param.mesh.smallest_size * 1e3f64.powi(2);
    let old_nseg_side = sim
        .var
        .mesh
        .segflag
        .iter()
        .filter(|&&f| f != BOUNDZ0)
        .count();
    let t_min = min_of(&sim.var.temperature);
    let t_max = max_of(&sim.var.temperature);

    // mark a far-away element so the transfer has something to carry
    let marked = sim.var.mesh.nelem() - 1;
    sim.var.plstrain[marked] = 0.7;

    // collapse one interior node onto a neighbor: tiny elements appear
    let (node, target) = interior_neighbor_pair(&sim);
    let t = sim.var.mesh.coord[target];
    sim.var.mesh.coord[node] = [t[0] + 1.0, t[1]];

    remesh(&sim.param, &mut sim.var).expect("remeshing succeeds");

    // no tiny element survived the repair
    let min_vol = sim.var.volume.iter().cloned().fold(f64::MAX, f64::min);
    assert!(
        min_vol >= smallest_vol,
        "element of volume {} below the tolerated {}",
        min_vol,
        smallest_vol
    );

    // the side boundary is untouched; the bottom was rebuilt
    let new_nseg_side = sim
        .var
        .mesh
        .segflag
        .iter()
        .filter(|&&f| f != BOUNDZ0)
        .count();
    assert_eq!(new_nseg_side, old_nseg_side);
    assert!(sim.var.mesh.segflag.iter().any(|&f| f == BOUNDZ0));

    // every bottom node sits exactly at the restored depth
    for (n, &flag) in sim.var.bcflag.iter().enumerate() {
        if flag & BOUNDZ0 != 0 {
            assert_eq!(
                sim.var.mesh.coord[n][1], -1e4,
                "bottom node {} not restored",
                n
            );
        }
    }

    // element fields moved by nearest neighbor: values are a subset
    for &p in &sim.var.plstrain {
        assert!(p == 0.0 || p == 0.7, "plastic strain {} invented", p);
    }
    assert!(
        sim.var.plstrain.iter().any(|&p| p == 0.7),
        "the marked plastic strain was lost"
    );

    // nodal fields stay inside the old bounds
    for &t in &sim.var.temperature {
        assert!(t >= t_min - 1e-9 && t <= t_max + 1e-9);
    }

    // the rebuilt mesh is immediately steppable
    sim.step().expect("stepping after remeshing");
}

fn interior_neighbor_pair(sim: &Simulation) -> (usize, usize) {
    for (n, &flag) in sim.var.bcflag.iter().enumerate() {
        if flag != 0 {
            continue;
        }
        for &e in &sim.var.support[n] {
            for &m in &sim.var.mesh.connectivity[e] {
                if m != n && sim.var.bcflag[m] == 0 {
                    return (n, m);
                }
            }
        }
    }
    panic!("no adjacent interior node pair in the mesh");
}

fn min_of(v: &[f64]) -> f64 {
    v.iter().cloned().fold(f64::MAX, f64::min)
}

fn max_of(v: &[f64]) -> f64 {
    v.iter().cloned().fold(f64::MIN, f64::max)
}
