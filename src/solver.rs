use crate::backend::{ComputeBackend, CpuBackend};
use crate::boundary::{BoundaryPolicy, FieldKind};
use crate::error::{check_len, SimError, SimResult};
use crate::field::Field;
use crate::grid::Grid;

/// Diagonal of the implicit diffusion system, `1 + 2·dims·coeff`.
pub fn diffusion_diagonal(grid: &Grid, coeff: f32) -> f32 {
    1.0 + 2.0 * grid.dimension_count() as f32 * coeff
}

/// Diagonal of the unit pressure Laplacian, `2·dims`.
pub fn poisson_diagonal(grid: &Grid) -> f32 {
    2.0 * grid.dimension_count() as f32
}

/// Fixed-count Jacobi relaxation over a wrapped grid.
///
/// All sweeps always run; there is no convergence check here. The boundary
/// policy is applied after every sweep.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JacobiSolver {
    pub iterations: usize,
    pub policy: BoundaryPolicy,
    pub warm_start: bool,
}

impl JacobiSolver {
    pub fn new(iterations: usize, policy: BoundaryPolicy) -> Self {
        Self {
            iterations,
            policy,
            warm_start: false,
        }
    }

    pub fn with_warm_start(mut self, warm_start: bool) -> Self {
        self.warm_start = warm_start;
        self
    }

    #[allow(clippy::too_many_arguments)]
    pub fn solve<B: ComputeBackend>(
        &self,
        backend: &B,
        grid: &Grid,
        kind: FieldKind,
        x: &mut B::Buffer,
        b: &B::Buffer,
        scratch: &mut B::Buffer,
        diam: f32,
        coeff: f32,
    ) -> SimResult<()> {
        if diam == 0.0 || !diam.is_finite() {
            return Err(SimError::ZeroDiagonal(diam));
        }
        check_len("jacobi x", grid.size(), backend.buffer_len(x))?;
        check_len("jacobi b", grid.size(), backend.buffer_len(b))?;
        check_len("jacobi scratch", grid.size(), backend.buffer_len(scratch))?;

        if !self.warm_start {
            backend.fill(x, 0.0);
        }
        let inv_diam = 1.0 / diam;
        for _ in 0..self.iterations {
            self.sweep(backend, grid, kind, x, b, scratch, inv_diam, coeff);
        }
        tracing::trace!(
            iterations = self.iterations,
            diam,
            coeff,
            ?kind,
            "jacobi solve"
        );
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn sweep<B: ComputeBackend>(
        &self,
        backend: &B,
        grid: &Grid,
        kind: FieldKind,
        x: &mut B::Buffer,
        b: &B::Buffer,
        scratch: &mut B::Buffer,
        inv_diam: f32,
        coeff: f32,
    ) {
        backend.linear_solve(grid, x, b, scratch, coeff, inv_diam);
        std::mem::swap(x, scratch);
        apply_policy(backend, grid, self.policy, kind, x);
    }
}

pub(crate) fn apply_policy<B: ComputeBackend>(
    backend: &B,
    grid: &Grid,
    policy: BoundaryPolicy,
    kind: FieldKind,
    buffer: &mut B::Buffer,
) {
    match policy {
        BoundaryPolicy::CornersOnly => backend.set_corners(grid, buffer),
        BoundaryPolicy::Walls => backend.set_boundary(grid, kind, buffer),
    }
}

pub fn jacobi_solve(
    kind: FieldKind,
    x0: &Field,
    b: &Field,
    diam: f32,
    coeff: f32,
    iterations: usize,
) -> SimResult<Field> {
    let grid = b.grid();
    check_len("jacobi x0", grid.size(), x0.as_slice().len())?;
    let backend = CpuBackend::new();
    let mut x = x0.as_slice().to_vec();
    let rhs = b.as_slice().to_vec();
    let mut scratch = backend.alloc(grid.size());
    JacobiSolver::new(iterations, BoundaryPolicy::CornersOnly).solve(
        &backend,
        &grid,
        kind,
        &mut x,
        &rhs,
        &mut scratch,
        diam,
        coeff,
    )?;
    Field::from_data(grid, x)
}
