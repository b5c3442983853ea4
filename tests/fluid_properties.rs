use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stable_fluids::{
    apply_corners, divergence_norm, poisson_diagonal, project, sample_system, BoundaryPolicy,
    ComputeBackend, CpuBackend, FdmSolver, FdmSolverConfig, Field, FieldKind, FluidParams,
    FluidStepper, Grid, JacobiSolver, SimError, StageContext, VelocityField, MIN_FLUID_AXIS,
};

fn assert_close(a: f32, b: f32, tol: f32) {
    assert!(
        (a - b).abs() <= tol,
        "expected {a} to be within {tol} of {b}"
    );
}

fn still_params(boundary: BoundaryPolicy) -> FluidParams {
    FluidParams {
        dt: 0.1,
        diffusion: 0.0,
        viscosity: 0.0,
        iterations: 10,
        boundary,
        warm_start: false,
    }
}

/// Periodic velocity built from a few low-frequency modes with seeded random
/// amplitudes and phases.
fn smooth_random_velocity(grid: Grid, seed: u64) -> VelocityField {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut modes = Vec::new();
    for _ in 0..6 {
        let m = rng.gen_range(1..=3) as f32;
        let n = rng.gen_range(1..=3) as f32;
        let ax: f32 = rng.gen_range(-1.0..1.0);
        let ay: f32 = rng.gen_range(-1.0..1.0);
        let phase: f32 = rng.gen_range(0.0..std::f32::consts::TAU);
        modes.push((m, n, ax, ay, phase));
    }
    let (nx, ny) = (grid.nx() as f32, grid.ny() as f32);
    VelocityField::from_fn(grid, move |x, y, _| {
        let mut v = [0.0, 0.0, 0.0];
        for &(m, n, ax, ay, phase) in &modes {
            let arg = std::f32::consts::TAU * (m * x as f32 / nx + n * y as f32 / ny) + phase;
            v[0] += ax * arg.sin();
            v[1] += ay * arg.cos();
        }
        v
    })
}

fn blob(grid: Grid, lo: usize, hi: usize) -> Field {
    Field::from_fn(grid, |x, y, z| {
        let inside = |c: usize| (lo..=hi).contains(&c);
        if inside(x) && inside(y) && (!grid.is_3d() || inside(z)) {
            1.0 + 0.25 * ((x + 2 * y + 3 * z) % 4) as f32
        } else {
            0.0
        }
    })
}

#[test]
fn still_density_is_conserved_without_diffusion() {
    let grid = Grid::new_2d(16, 12).unwrap();
    let mut stepper = FluidStepper::new(grid, still_params(BoundaryPolicy::CornersOnly)).unwrap();
    let initial = blob(grid, 2, 9);
    stepper.set_density(&initial).unwrap();
    for _ in 0..10 {
        stepper.step().unwrap();
    }
    let density = stepper.density().unwrap();
    for (after, before) in density.as_slice().iter().zip(initial.as_slice()) {
        assert_close(*after, *before, 1e-6);
    }
}

#[test]
fn still_density_is_conserved_in_3d() {
    let grid = Grid::new_3d(8, 8, 8).unwrap();
    let mut stepper = FluidStepper::new(grid, still_params(BoundaryPolicy::CornersOnly)).unwrap();
    let initial = blob(grid, 2, 5);
    stepper.set_density(&initial).unwrap();
    for _ in 0..5 {
        stepper.step().unwrap();
    }
    assert_close(stepper.density().unwrap().sum(), initial.sum(), 1e-4);
    assert_eq!(stepper.velocity().unwrap().max_abs(), 0.0);
}

#[test]
fn divergence_shrinks_with_more_pressure_iterations() {
    let grid = Grid::new_2d(32, 32).unwrap();
    let backend = CpuBackend::new();
    let velocity = smooth_random_velocity(grid, 0x5eed);
    let before = divergence_norm(&velocity);
    assert!(before > 0.0);

    let mut previous = f32::INFINITY;
    for iterations in [0, 5, 10, 20] {
        let mut buffers: Vec<Vec<f32>> = velocity
            .components()
            .iter()
            .map(|c| c.as_slice().to_vec())
            .collect();
        let mut divergence = backend.alloc(grid.size());
        let mut pressure = backend.alloc(grid.size());
        let mut scratch = backend.alloc(grid.size());
        let ctx = StageContext {
            backend: &backend,
            grid,
            dt: 0.1,
            solver: JacobiSolver::new(iterations, BoundaryPolicy::CornersOnly),
        };
        project(ctx, &mut buffers, &mut divergence, &mut pressure, &mut scratch).unwrap();
        let projected = VelocityField::from_components(
            buffers
                .into_iter()
                .map(|data| Field::from_data(grid, data).unwrap())
                .collect(),
        )
        .unwrap();
        let after = divergence_norm(&projected);
        assert!(
            after <= previous * (1.0 + 1e-3) + 1e-6,
            "divergence rose to {after} at {iterations} iterations (was {previous})"
        );
        previous = after;
    }
    assert!(previous < 0.9 * before, "divergence {before} -> {previous}");
}

#[test]
fn corners_match_neighbor_mean_for_any_field() {
    let grid = Grid::new_2d(9, 7).unwrap();
    let mut rng = StdRng::seed_from_u64(11);
    let mut data: Vec<f32> = (0..grid.size()).map(|_| rng.gen_range(-5.0..5.0)).collect();
    apply_corners(&grid, &mut data);
    let at = |x: usize, y: usize| data[grid.idx(x, y, 0)];
    let (mx, my) = (grid.nx() - 1, grid.ny() - 1);
    assert_close(at(0, 0), 0.5 * (at(1, 0) + at(0, 1)), 1e-6);
    assert_close(at(mx, 0), 0.5 * (at(mx - 1, 0) + at(mx, 1)), 1e-6);
    assert_close(at(0, my), 0.5 * (at(1, my) + at(0, my - 1)), 1e-6);
    assert_close(at(mx, my), 0.5 * (at(mx - 1, my) + at(mx, my - 1)), 1e-6);
}

#[test]
fn jacobi_sweep_keeps_a_solved_system() {
    let grid = Grid::new_2d(10, 10).unwrap();
    let backend = CpuBackend::new();
    let diam = poisson_diagonal(&grid);
    // With diagonal 2·dims + 1 and unit coupling, x = b = const is exact.
    let shifted = diam + 1.0;
    let mut x = vec![2.0; grid.size()];
    let b = vec![2.0; grid.size()];
    let mut scratch = backend.alloc(grid.size());
    JacobiSolver::new(1, BoundaryPolicy::CornersOnly).sweep(
        &backend,
        &grid,
        FieldKind::Scalar,
        &mut x,
        &b,
        &mut scratch,
        1.0 / shifted,
        1.0,
    );
    for value in &x {
        assert_close(*value, 2.0, 1e-6);
    }

    let (grid, mut system) = sample_system().unwrap();
    system.x = (0..8).map(|i| i as f32).collect();
    let solver = FdmSolver::new(grid, FdmSolverConfig::default()).unwrap();
    let relaxed = solver.relax(&system).unwrap();
    for (after, before) in relaxed.iter().zip(&system.x) {
        assert_close(*after, *before, 1e-5);
    }
}

#[test]
fn l2_norm_of_first_integers() {
    let grid = Grid::for_system(11, 1, 1).unwrap();
    let solver = FdmSolver::new(grid, FdmSolverConfig::default()).unwrap();
    let values: Vec<f32> = (0..=10).map(|i| i as f32).collect();
    assert_eq!(solver.l2_norm(&values).unwrap(), 385.0);
}

#[test]
fn fdm_sample_system_converges() {
    let (grid, mut system) = sample_system().unwrap();
    assert_eq!(grid.size(), 8);
    let solver = FdmSolver::new(grid, FdmSolverConfig::default()).unwrap();
    assert!(solver.solve(&mut system).unwrap());
    let residual = solver.residual(&system.b, &system.x, &system.a).unwrap();
    assert!(solver.l2_norm(&residual).unwrap() < 0.5);
}

#[test]
fn addressing_wraps_around() {
    let grid = Grid::new_2d(13, 5).unwrap();
    assert_eq!(grid.ix(-1, 0, 0), grid.ix(12, 0, 0));
    assert_eq!(grid.ix(-14, -1, 0), grid.ix(12, 4, 0));
}

#[test]
fn boundary_policies_diverge_on_uniform_flow() {
    let grid = Grid::new_2d(12, 12).unwrap();
    let wind = VelocityField::from_fn(grid, |_, _, _| [0.5, 0.0, 0.0]);
    let density = blob(grid, 3, 8);

    let mut open = FluidStepper::new(grid, still_params(BoundaryPolicy::CornersOnly)).unwrap();
    open.set_velocity(&wind).unwrap();
    open.set_density(&density).unwrap();
    open.step().unwrap();
    let open_velocity = open.velocity().unwrap();
    for y in 0..grid.ny() as i64 {
        assert_close(open_velocity.component(0).get(0, y, 0), 0.5, 1e-5);
    }

    let mut walled = FluidStepper::new(grid, still_params(BoundaryPolicy::Walls)).unwrap();
    walled.set_velocity(&wind).unwrap();
    walled.set_density(&density).unwrap();
    walled.step().unwrap();
    let vx = walled.velocity().unwrap().component(0).clone();
    let rho = walled.density().unwrap();
    for y in 1..grid.ny() as i64 - 1 {
        assert_close(vx.get(0, y, 0), -vx.get(1, y, 0), 1e-6);
        assert_close(rho.get(0, y, 0), rho.get(1, y, 0), 1e-6);
    }
}

#[test]
fn stepper_rejects_grids_below_the_fluid_minimum() {
    let params = still_params(BoundaryPolicy::CornersOnly);
    for (nx, ny, nz) in [(2, 2, 2), (1, 4, 1), (5, 2, 1), (4, 4, 2)] {
        let grid = Grid::for_system(nx, ny, nz).unwrap();
        match FluidStepper::new(grid, params) {
            Err(SimError::InvalidDimension { value, min, .. }) => {
                assert!(value < min);
                assert_eq!(min, MIN_FLUID_AXIS);
            }
            Err(other) => panic!("{nx}x{ny}x{nz}: unexpected error {other}"),
            Ok(_) => panic!("{nx}x{ny}x{nz}: accepted"),
        }
    }

    let mut stepper = FluidStepper::new(Grid::new_2d(6, 6).unwrap(), params).unwrap();
    assert!(stepper.resize(Grid::for_system(2, 2, 2).unwrap()).is_err());
    stepper.step().unwrap();
}

#[test]
fn zero_iterations_keep_injected_density() {
    let grid = Grid::new_2d(8, 8).unwrap();
    let params = FluidParams {
        iterations: 0,
        ..still_params(BoundaryPolicy::CornersOnly)
    };
    let mut stepper = FluidStepper::new(grid, params).unwrap();
    stepper.add_density_at(4, 4, 5.0);
    stepper.step().unwrap();
    let density = stepper.density().unwrap();
    assert_close(density.sum(), 5.0, 1e-5);
    assert_close(density.get(4, 4, 0), 5.0, 1e-5);
}
