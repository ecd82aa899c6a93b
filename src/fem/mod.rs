//! Finite-element assembly, boundary handling and the explicit
//! time integrator.

pub mod assembly;
pub mod boundary;
pub mod integrator;

pub use assembly::{
    apply_winkler_foundation, assemble_diffusion, compute_mass, update_force, update_strain_rate,
};
pub use boundary::{
    apply_vbcs, create_boundary_facets, create_boundary_flags, create_support,
};
pub use integrator::{
    compute_dt, rotate_stress, update_coordinate, update_temperature, update_velocity,
};
