use crate::backend::{ComputeBackend, CpuBackend};
use crate::boundary::FieldKind;
use crate::error::SimResult;
use crate::field::{Field, VelocityField};
use crate::grid::Grid;
use crate::solver::{apply_policy, diffusion_diagonal, poisson_diagonal, JacobiSolver};

pub struct StageContext<'a, B: ComputeBackend> {
    pub backend: &'a B,
    pub grid: Grid,
    pub dt: f32,
    pub solver: JacobiSolver,
}

impl<B: ComputeBackend> Clone for StageContext<'_, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B: ComputeBackend> Copy for StageContext<'_, B> {}

/// Implicit diffusion of `input` into `out` with `coeff = dt·rate`.
pub fn diffuse<B: ComputeBackend>(
    ctx: StageContext<'_, B>,
    kind: FieldKind,
    out: &mut B::Buffer,
    input: &B::Buffer,
    scratch: &mut B::Buffer,
    rate: f32,
) -> SimResult<()> {
    let coeff = ctx.dt * rate;
    let diam = diffusion_diagonal(&ctx.grid, coeff);
    // No sweeps means no diffusion, not a cleared field.
    if ctx.solver.warm_start || ctx.solver.iterations == 0 {
        ctx.backend.copy(input, out);
    }
    if ctx.solver.iterations == 0 {
        return Ok(());
    }
    ctx.solver
        .solve(ctx.backend, &ctx.grid, kind, out, input, scratch, diam, coeff)
}

pub fn project<B: ComputeBackend>(
    ctx: StageContext<'_, B>,
    velocity: &mut [B::Buffer],
    divergence: &mut B::Buffer,
    pressure: &mut B::Buffer,
    scratch: &mut B::Buffer,
) -> SimResult<()> {
    let backend = ctx.backend;
    let grid = &ctx.grid;
    let policy = ctx.solver.policy;

    backend.divergence_pressure(grid, velocity, divergence, pressure);
    apply_policy(backend, grid, policy, FieldKind::Scalar, divergence);

    ctx.solver.solve(
        backend,
        grid,
        FieldKind::Scalar,
        pressure,
        divergence,
        scratch,
        poisson_diagonal(grid),
        1.0,
    )?;

    backend.gradient_pressure(grid, velocity, pressure);
    for (axis, component) in velocity.iter_mut().enumerate() {
        apply_policy(backend, grid, policy, FieldKind::velocity(axis), component);
    }
    Ok(())
}

/// Semi-Lagrangian transport of `previous` along `velocity` into `out`.
pub fn advect<B: ComputeBackend>(
    ctx: StageContext<'_, B>,
    kind: FieldKind,
    out: &mut B::Buffer,
    previous: &B::Buffer,
    velocity: &[B::Buffer],
) {
    let dt_scaled = ctx.grid.interior_scale().map(|n| ctx.dt * n);
    ctx.backend
        .advect(&ctx.grid, out, previous, velocity, dt_scaled);
    apply_policy(ctx.backend, &ctx.grid, ctx.solver.policy, kind, out);
}

/// Discrete divergence of `velocity` with the same scaling the projection uses.
pub fn divergence_field(velocity: &VelocityField) -> Field {
    let grid = velocity.grid();
    let backend = CpuBackend::new();
    let components: Vec<Vec<f32>> = velocity
        .components()
        .iter()
        .map(|component| component.as_slice().to_vec())
        .collect();
    let mut divergence = backend.alloc(grid.size());
    let mut pressure = backend.alloc(grid.size());
    backend.divergence_pressure(&grid, &components, &mut divergence, &mut pressure);
    let mut field = Field::new(grid, 0.0);
    field.as_mut_slice().copy_from_slice(&divergence);
    field
}

pub fn divergence_norm(velocity: &VelocityField) -> f32 {
    divergence_field(velocity).sum_squares()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::BoundaryPolicy;

    fn assert_close(a: f32, b: f32, tol: f32) {
        assert!(
            (a - b).abs() <= tol,
            "expected {a} to be within {tol} of {b}"
        );
    }

    fn ctx(backend: &CpuBackend, grid: Grid, iterations: usize) -> StageContext<'_, CpuBackend> {
        StageContext {
            backend,
            grid,
            dt: 0.1,
            solver: JacobiSolver::new(iterations, BoundaryPolicy::CornersOnly),
        }
    }

    fn components(velocity: &VelocityField) -> Vec<Vec<f32>> {
        velocity
            .components()
            .iter()
            .map(|c| c.as_slice().to_vec())
            .collect()
    }

    #[test]
    fn diffuse_spreads_a_spike_and_keeps_mass() {
        let backend = CpuBackend::new();
        let grid = Grid::new_2d(9, 9).unwrap();
        let mut input = backend.alloc(grid.size());
        input[grid.idx(4, 4, 0)] = 1.0;
        let mut out = backend.alloc(grid.size());
        let mut scratch = backend.alloc(grid.size());
        diffuse(ctx(&backend, grid, 20), FieldKind::Scalar, &mut out, &input, &mut scratch, 1.0)
            .unwrap();
        assert!(out[grid.idx(4, 4, 0)] < 1.0);
        assert!(out[grid.idx(5, 4, 0)] > 0.0);
        let total: f32 = out.iter().sum();
        assert_close(total, 1.0, 1e-3);
    }

    #[test]
    fn diffuse_without_sweeps_copies_its_input() {
        let backend = CpuBackend::new();
        let grid = Grid::new_2d(6, 6).unwrap();
        let input: Vec<f32> = (0..grid.size()).map(|i| i as f32 * 0.5).collect();
        let mut out = backend.alloc(grid.size());
        let mut scratch = backend.alloc(grid.size());
        diffuse(ctx(&backend, grid, 0), FieldKind::Scalar, &mut out, &input, &mut scratch, 2.0)
            .unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn projection_removes_a_gradient_field() {
        let backend = CpuBackend::new();
        let grid = Grid::new_2d(16, 16).unwrap();
        let k = std::f32::consts::TAU / 16.0;
        // Pure gradient of a periodic potential: entirely divergent.
        let velocity = VelocityField::from_fn(grid, |x, y, _| {
            [
                (k * x as f32).cos() * (k * y as f32).sin(),
                (k * x as f32).sin() * (k * y as f32).cos(),
                0.0,
            ]
        });
        let before = divergence_norm(&velocity);
        let mut v = components(&velocity);
        let mut divergence = backend.alloc(grid.size());
        let mut pressure = backend.alloc(grid.size());
        let mut scratch = backend.alloc(grid.size());
        project(ctx(&backend, grid, 40), &mut v, &mut divergence, &mut pressure, &mut scratch)
            .unwrap();
        let projected = VelocityField::from_components(
            v.into_iter()
                .map(|data| Field::from_data(grid, data).unwrap())
                .collect(),
        )
        .unwrap();
        let after = divergence_norm(&projected);
        assert!(after < 0.5 * before, "divergence {before} -> {after}");
    }

    #[test]
    fn zero_velocity_is_left_alone() {
        let backend = CpuBackend::new();
        let grid = Grid::new_3d(5, 5, 5).unwrap();
        let mut v = vec![backend.alloc(grid.size()); 3];
        let mut divergence = backend.alloc(grid.size());
        let mut pressure = backend.alloc(grid.size());
        let mut scratch = backend.alloc(grid.size());
        project(ctx(&backend, grid, 10), &mut v, &mut divergence, &mut pressure, &mut scratch)
            .unwrap();
        assert!(v.iter().flatten().all(|value| *value == 0.0));
    }

    #[test]
    fn advect_moves_profile_downstream() {
        let backend = CpuBackend::new();
        let grid = Grid::new_2d(12, 12).unwrap();
        let previous: Vec<f32> = (0..grid.size())
            .map(|i| if grid.coords(i).0 == 4 { 1.0 } else { 0.0 })
            .collect();
        // dt·(nx-2)·u = 0.1·10·1 = one cell per step.
        let velocity = vec![vec![1.0; grid.size()], backend.alloc(grid.size())];
        let mut out = backend.alloc(grid.size());
        advect(ctx(&backend, grid, 0), FieldKind::Scalar, &mut out, &previous, &velocity);
        assert_close(out[grid.idx(5, 6, 0)], 1.0, 1e-5);
        assert_close(out[grid.idx(4, 6, 0)], 0.0, 1e-5);
    }
}
