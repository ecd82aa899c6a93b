//! The simulation state and the explicit time-stepping driver.
//!
//! A single [`State`] owns every mesh and field array; each step is a
//! sequential pipeline over elements and nodes. Remeshing swaps whole
//! arrays in and out of this struct.

use crate::config::Param;
use crate::constants::*;
use crate::error::{Result, SolverError};
use crate::fem::{
    apply_vbcs, apply_winkler_foundation, assemble_diffusion, compute_dt, compute_mass,
    create_boundary_facets, create_boundary_flags, create_support, rotate_stress,
    update_coordinate, update_force, update_strain_rate, update_temperature, update_velocity,
};
use crate::ic;
use crate::material::MatProps;
use crate::mesh::{
    compute_shape_fn, compute_volume, compute_volume_n, create_new_mesh, elem_center, Mesh,
};
use crate::output::write_output;
use crate::remesh::{bad_mesh_quality, remesh, MeshQualityVerdict};

/// Everything the solver owns: the mesh, per-node and per-element
/// fields, derived arrays and the simulation clock.
#[derive(Debug)]
pub struct State {
    pub time: f64,
    pub dt: f64,
    pub steps: u64,
    pub frame: u64,

    pub mesh: Mesh,
    /// Material index of each element.
    pub mattype: Vec<usize>,

    // derived mesh state, rebuilt after every remeshing
    pub bcflag: Vec<u32>,
    /// (element, local facet, boundary flag) for every boundary segment.
    pub bfacets: Vec<(usize, usize, u32)>,
    /// Elements incident to each node.
    pub support: Vec<Vec<usize>>,
    pub volume: Vec<f64>,
    pub volume_old: Vec<f64>,
    pub volume_n: Vec<f64>,
    pub mass: Vec<f64>,
    pub tmass: Vec<f64>,
    pub shpdx: Vec<ShapeFn>,
    pub shpdy: Vec<ShapeFn>,
    pub shpdz: Vec<ShapeFn>,

    // primary fields
    pub temperature: Vec<f64>,
    pub tdot: Vec<f64>,
    pub vel: Vec<Vector>,
    pub force: Vec<Vector>,
    pub strain_rate: Vec<Tensor>,
    pub strain: Vec<Tensor>,
    pub stress: Vec<Tensor>,
    pub plstrain: Vec<f64>,

    pub mat: MatProps,
    pub compensation_pressure: f64,
}

/// What a time step asks of the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Ok,
    /// An element went nonpositive; the mesh must be rebuilt before the
    /// next step.
    RemeshNeeded,
}

impl State {
    fn allocate(mesh: Mesh, mat: MatProps) -> Self {
        let nn = mesh.nnode();
        let ne = mesh.nelem();
        Self {
            time: 0.0,
            dt: 0.0,
            steps: 0,
            frame: 0,
            mesh,
            mattype: vec![0; ne],
            bcflag: Vec::new(),
            bfacets: Vec::new(),
            support: Vec::new(),
            volume: vec![0.0; ne],
            volume_old: vec![0.0; ne],
            volume_n: vec![0.0; nn],
            mass: vec![0.0; nn],
            tmass: vec![0.0; nn],
            shpdx: vec![[0.0; NODES_PER_ELEM]; ne],
            shpdy: vec![[0.0; NODES_PER_ELEM]; ne],
            shpdz: vec![[0.0; NODES_PER_ELEM]; ne],
            temperature: vec![0.0; nn],
            tdot: vec![0.0; nn],
            vel: vec![[0.0; NDIMS]; nn],
            force: vec![[0.0; NDIMS]; nn],
            strain_rate: vec![[0.0; NSTR]; ne],
            strain: vec![[0.0; NSTR]; ne],
            stress: vec![[0.0; NSTR]; ne],
            plstrain: vec![0.0; ne],
            mat,
            compensation_pressure: 0.0,
        }
    }

    /// Resize and recompute everything derived from the mesh arrays.
    /// Field arrays (temperature, velocity, stress, strain, plstrain,
    /// mattype) are left untouched and must already have the right
    /// lengths.
    pub fn rebuild_derived(&mut self, param: &Param) -> Result<()> {
        let nn = self.mesh.nnode();
        let ne = self.mesh.nelem();

        self.volume.resize(ne, 0.0);
        self.volume_old.resize(ne, 0.0);
        self.volume_n.resize(nn, 0.0);
        self.mass.resize(nn, 0.0);
        self.tmass.resize(nn, 0.0);
        self.shpdx.resize(ne, [0.0; NODES_PER_ELEM]);
        self.shpdy.resize(ne, [0.0; NODES_PER_ELEM]);
        self.shpdz.resize(ne, [0.0; NODES_PER_ELEM]);
        self.tdot.resize(nn, 0.0);
        self.force.resize(nn, [0.0; NDIMS]);
        self.strain_rate.resize(ne, [0.0; NSTR]);

        self.bcflag =
            create_boundary_flags(nn, &self.mesh.segment, &self.mesh.segflag);
        self.bfacets =
            create_boundary_facets(&self.mesh.connectivity, &self.mesh.segment, &self.mesh.segflag)?;
        self.support = create_support(&self.mesh.connectivity, nn);

        compute_volume(&self.mesh.coord, &self.mesh.connectivity, &mut self.volume);
        if let Some((e, &v)) = self
            .volume
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.partial_cmp(b.1).expect("volumes are finite"))
        {
            if v <= 0.0 {
                return Err(SolverError::MeshInvariant(format!(
                    "element {} has nonpositive volume {:.3e} after mesh construction",
                    e, v
                )));
            }
        }
        self.volume_old.copy_from_slice(&self.volume);
        compute_volume_n(&self.mesh.connectivity, &self.volume, &mut self.volume_n);
        compute_mass(
            &self.mesh.connectivity,
            &self.volume,
            &self.mattype,
            &self.mat,
            &mut self.mass,
            &mut self.tmass,
        );
        compute_shape_fn(
            &self.mesh.coord,
            &self.mesh.connectivity,
            &self.volume,
            &mut self.shpdx,
            &mut self.shpdy,
            &mut self.shpdz,
        );

        update_strain_rate(
            &self.mesh.connectivity,
            &self.vel,
            &self.shpdx,
            &self.shpdy,
            &self.shpdz,
            &mut self.strain_rate,
        );
        self.compute_forces(param);
        Ok(())
    }

    /// Internal + body force assembly, including the bottom foundation.
    fn compute_forces(&mut self, param: &Param) {
        update_force(
            &self.mesh.connectivity,
            &self.volume,
            &self.stress,
            &self.mattype,
            &self.mat,
            param.control.gravity,
            &self.shpdx,
            &self.shpdy,
            &self.shpdz,
            &mut self.force,
        );
        if param.bc.has_winkler_foundation {
            let bottom: Vec<(usize, usize)> = self
                .bfacets
                .iter()
                .filter(|&&(_, _, flag)| flag == BOUNDZ0)
                .map(|&(e, f, _)| (e, f))
                .collect();
            apply_winkler_foundation(
                &self.mesh.coord,
                &self.mesh.connectivity,
                &bottom,
                &self.mattype,
                &self.mat,
                param.control.gravity,
                param.bc.winkler_delta_rho,
                self.compensation_pressure,
                param.mesh.zlength,
                &mut self.force,
            );
        }
    }

    /// Element-averaged nodal temperature, the input to the creep law.
    fn elem_temperature(&self, e: usize) -> f64 {
        let conn = &self.mesh.connectivity[e];
        conn.iter().map(|&n| self.temperature[n]).sum::<f64>() / NODES_PER_ELEM as f64
    }
}

/// The driver: owns the parameters, the state and the output cadence.
pub struct Simulation {
    pub param: Param,
    pub var: State,
    wall_start: std::time::Instant,
}

impl Simulation {
    /// Build the initial mesh, allocate the state and apply the initial
    /// and boundary conditions.
    pub fn new(param: Param) -> Result<Self> {
        let mesh = create_new_mesh(&param)?;
        let mat = MatProps::new(&param.mat);
        let mut var = State::allocate(mesh, mat);

        var.compensation_pressure = ic::initial_stress_state(
            &param,
            &var.mat,
            &var.mesh.coord,
            &var.mesh.connectivity,
            &var.mattype,
            &mut var.stress,
            &mut var.strain,
        )?;
        ic::initial_weak_zone(&param, &var.mesh.coord, &var.mesh.connectivity, &mut var.plstrain)?;
        ic::initial_temperature(&param, &var.mat, &var.mesh.coord, &mut var.temperature)?;

        var.rebuild_derived(&param)?;
        apply_vbcs(&var.bcflag, param.bc.max_vbc_val, &mut var.vel);

        var.dt = compute_dt(
            &var.mesh.coord,
            &var.mesh.connectivity,
            &var.mattype,
            &var.mat,
            param.control.inertial_scaling,
            param.control.dt_fraction,
            param.control.has_thermal_diffusion,
        );

        Ok(Self {
            param,
            var,
            wall_start: std::time::Instant::now(),
        })
    }

    /// One explicit step over all elements and nodes.
    pub fn step(&mut self) -> Result<StepStatus> {
        let param = &self.param;
        let var = &mut self.var;

        var.steps += 1;
        var.time += var.dt;

        if param.control.has_thermal_diffusion {
            assemble_diffusion(
                &var.mesh.connectivity,
                &var.volume,
                &var.mattype,
                &var.mat,
                &var.shpdx,
                &var.shpdy,
                &var.shpdz,
                &var.temperature,
                &mut var.tdot,
            );
            update_temperature(
                &var.bcflag,
                &var.tdot,
                &var.tmass,
                param.bc.surface_temperature,
                var.dt,
                &mut var.temperature,
            );
        }

        apply_vbcs(&var.bcflag, param.bc.max_vbc_val, &mut var.vel);
        update_strain_rate(
            &var.mesh.connectivity,
            &var.vel,
            &var.shpdx,
            &var.shpdy,
            &var.shpdz,
            &mut var.strain_rate,
        );

        for e in 0..var.mesh.nelem() {
            let t_elem = var.elem_temperature(e);
            let m = var.mattype[e];
            let rate = var.strain_rate[e];
            var.mat.update_stress(
                m,
                var.dt,
                t_elem,
                &rate,
                &mut var.strain[e],
                &mut var.stress[e],
                &mut var.plstrain[e],
            );
        }

        var.compute_forces(param);
        update_velocity(
            &var.mass,
            &var.force,
            param.control.damping_factor,
            param.control.inertial_scaling,
            var.dt,
            &mut var.vel,
        );
        apply_vbcs(&var.bcflag, param.bc.max_vbc_val, &mut var.vel);

        // move the mesh and refresh the geometry-derived arrays
        update_coordinate(&var.vel, var.dt, &mut var.mesh.coord);
        std::mem::swap(&mut var.volume, &mut var.volume_old);
        compute_volume(&var.mesh.coord, &var.mesh.connectivity, &mut var.volume);
        let min_vol = var.volume.iter().cloned().fold(f64::MAX, f64::min);
        if min_vol <= 0.0 {
            if param.mesh.quality_check_step_interval < u64::MAX {
                return Ok(StepStatus::RemeshNeeded);
            }
            return Err(SolverError::NumericInstability(format!(
                "nonpositive element volume {:.3e} at step {}; \
                 the time step is too large for the deformation",
                min_vol, var.steps
            )));
        }
        compute_volume_n(&var.mesh.connectivity, &var.volume, &mut var.volume_n);
        compute_mass(
            &var.mesh.connectivity,
            &var.volume,
            &var.mattype,
            &var.mat,
            &mut var.mass,
            &mut var.tmass,
        );
        compute_shape_fn(
            &var.mesh.coord,
            &var.mesh.connectivity,
            &var.volume,
            &mut var.shpdx,
            &mut var.shpdy,
            &mut var.shpdz,
        );

        // dt computation is expensive and drifts slowly
        if var.steps % 10 == 0 {
            var.dt = compute_dt(
                &var.mesh.coord,
                &var.mesh.connectivity,
                &var.mattype,
                &var.mat,
                param.control.inertial_scaling,
                param.control.dt_fraction,
                param.control.has_thermal_diffusion,
            );
        }

        rotate_stress(
            &var.mesh.connectivity,
            &var.vel,
            &var.shpdx,
            &var.shpdy,
            &var.shpdz,
            var.dt,
            &mut var.stress,
        );

        Ok(StepStatus::Ok)
    }

    /// Run until the step or time limit, writing output frames and
    /// remeshing when the mesh degrades.
    pub fn run(&mut self) -> Result<()> {
        self.write_frame()?;
        self.var.frame += 1;

        let max_steps = self.param.sim.step_limit();
        let max_time = self.param.sim.time_limit_in_yr() * YEAR2SEC;

        loop {
            let status = self.step()?;

            let check_due = self.param.mesh.quality_check_step_interval < u64::MAX
                && self.var.steps % self.param.mesh.quality_check_step_interval == 0;
            if status == StepStatus::RemeshNeeded
                || (check_due && self.mesh_degraded())
            {
                remesh(&self.param, &mut self.var)?;
            }

            let step_due = self.var.steps
                == self.var.frame.saturating_mul(self.param.sim.output_step_interval());
            let time_due = self.var.time
                > self.var.frame as f64
                    * self.param.sim.output_time_interval_in_yr()
                    * YEAR2SEC;
            if step_due || time_due {
                self.write_frame()?;
                println!(
                    "  Output # {}, step = {}, time = {:.6e} yr, dt = {:.6e} yr.",
                    self.var.frame,
                    self.var.steps,
                    self.var.time / YEAR2SEC,
                    self.var.dt / YEAR2SEC
                );
                self.var.frame += 1;
            }

            if self.var.steps >= max_steps || self.var.time > max_time {
                return Ok(());
            }
        }
    }

    fn mesh_degraded(&self) -> bool {
        match bad_mesh_quality(&self.param, &self.var) {
            MeshQualityVerdict::Good => false,
            MeshQualityVerdict::WorstElement { elem, quality } => {
                println!("Worst mesh quality = {:.4} at element #{}.", quality, elem);
                true
            }
            MeshQualityVerdict::BottomDrift { node, z } => {
                println!("Node {} is too far from the bottom: z = {:.4e}", node, z);
                true
            }
        }
    }

    fn write_frame(&self) -> Result<()> {
        write_output(
            &self.param,
            &self.var,
            self.wall_start.elapsed().as_secs_f64(),
        )
    }
}

/// Spot checks used by the scenario tests.
pub fn domain_x_extent(state: &State) -> (f64, f64) {
    let mut lo = f64::INFINITY;
    let mut hi = f64::NEG_INFINITY;
    for p in &state.mesh.coord {
        lo = lo.min(p[0]);
        hi = hi.max(p[0]);
    }
    (lo, hi)
}

/// Centroid of an element of the current mesh.
pub fn element_centroid(state: &State, e: usize) -> Vector {
    elem_center(&state.mesh.coord, &state.mesh.connectivity[e])
}
