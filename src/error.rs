//! Error types for the solver.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SolverError>;

#[derive(Error, Debug)]
pub enum SolverError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("mesh invariant violated: {0}")]
    MeshInvariant(String),

    #[error("unknown option: {0}")]
    UnknownOption(String),

    #[error("numeric instability: {0}")]
    NumericInstability(String),

    #[error("remeshing failed: {0}")]
    Remeshing(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SolverError {
    /// Process exit code for the binary: configuration and runtime
    /// failures all map to 1, matching the documented interface.
    pub fn exit_code(&self) -> i32 {
        1
    }
}
