//! Lagrangian explicit finite-element solver for long-timescale
//! geodynamic continuum mechanics on an unstructured simplicial mesh.
//!
//! The mesh moves with the material; when it degrades it is rebuilt
//! and the fields are transferred to the new mesh. Built for 2D
//! triangles by default, for 3D tetrahedra with the `three_d` feature.

pub mod config;
pub mod constants;
pub mod error;
pub mod fem;
pub mod ic;
pub mod material;
pub mod mesh;
pub mod output;
pub mod remesh;
pub mod simulation;

pub use config::Param;
pub use error::{Result, SolverError};
pub use material::{MatProps, Rheology};
pub use mesh::Mesh;
pub use remesh::{bad_mesh_quality, remesh, MeshQualityVerdict};
pub use simulation::{Simulation, State, StepStatus};
