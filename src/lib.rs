mod backend;
mod boundary;
mod config;
mod error;
mod fdm;
mod field;
mod grid;
mod grid_data;
mod solver;
mod stages;
mod stepper;
mod vec3;

pub use backend::{ComputeBackend, CpuBackend};
pub use boundary::{apply_corners, set_boundary, BoundaryPolicy, FieldKind};
pub use config::{FdmSolverConfig, FluidParams, GridConfig, SimConfig};
pub use error::{SimError, SimResult};
pub use fdm::{sample_system, FdmSolver, FdmSystem, MatrixRow};
pub use field::{Field, VelocityField};
pub use grid::{Grid, MIN_FLUID_AXIS};
pub use grid_data::{
    apply_gravity, build_grid, grid_divergence, grid_gradient, grid_laplacian, BoundingBox,
    Centering, DataKind, GridData, GridGeometry, GridSample, GridSystemData, GRAVITY_EPSILON,
};
pub use solver::{diffusion_diagonal, jacobi_solve, poisson_diagonal, JacobiSolver};
pub use stages::{advect, diffuse, divergence_field, divergence_norm, project, StageContext};
pub use stepper::{FluidStepper, PingPong};
pub use vec3::Vec3;
