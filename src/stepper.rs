use crate::backend::{ComputeBackend, CpuBackend};
use crate::boundary::FieldKind;
use crate::config::FluidParams;
use crate::error::{check_len, SimResult};
use crate::field::{Field, VelocityField};
use crate::grid::Grid;
use crate::solver::JacobiSolver;
use crate::stages::{advect, diffuse, project, StageContext};

/// Two buffers with swappable front/back roles. Stages read the front and
/// write the back; `swap` publishes the result.
#[derive(Clone, Debug)]
pub struct PingPong<T> {
    buffers: [T; 2],
    front: usize,
}

impl<T> PingPong<T> {
    pub fn new(front: T, back: T) -> Self {
        Self {
            buffers: [front, back],
            front: 0,
        }
    }

    pub fn front(&self) -> &T {
        &self.buffers[self.front]
    }

    pub fn front_mut(&mut self) -> &mut T {
        &mut self.buffers[self.front]
    }

    pub fn back(&self) -> &T {
        &self.buffers[1 - self.front]
    }

    pub fn back_mut(&mut self) -> &mut T {
        &mut self.buffers[1 - self.front]
    }

    pub fn split(&mut self) -> (&T, &mut T) {
        let (first, second) = self.buffers.split_at_mut(1);
        if self.front == 0 {
            (&first[0], &mut second[0])
        } else {
            (&second[0], &mut first[0])
        }
    }

    pub fn swap(&mut self) {
        self.front = 1 - self.front;
    }
}

pub struct FluidStepper<B: ComputeBackend = CpuBackend> {
    backend: B,
    grid: Grid,
    params: FluidParams,
    velocity: PingPong<Vec<B::Buffer>>,
    density: PingPong<B::Buffer>,
    divergence: B::Buffer,
    pressure: B::Buffer,
    scratch: B::Buffer,
    steps: u64,
}

impl FluidStepper<CpuBackend> {
    pub fn new(grid: Grid, params: FluidParams) -> SimResult<Self> {
        Self::with_backend(CpuBackend::new(), grid, params)
    }
}

impl<B: ComputeBackend> FluidStepper<B> {
    pub fn with_backend(backend: B, grid: Grid, params: FluidParams) -> SimResult<Self> {
        params.validate()?;
        grid.check_fluid_axes()?;
        let velocity = PingPong::new(
            alloc_components(&backend, &grid),
            alloc_components(&backend, &grid),
        );
        let density = PingPong::new(backend.alloc(grid.size()), backend.alloc(grid.size()));
        let divergence = backend.alloc(grid.size());
        let pressure = backend.alloc(grid.size());
        let scratch = backend.alloc(grid.size());
        tracing::debug!(
            backend = backend.name(),
            nx = grid.nx(),
            ny = grid.ny(),
            nz = grid.nz(),
            "fluid stepper allocated"
        );
        Ok(Self {
            backend,
            grid,
            params,
            velocity,
            density,
            divergence,
            pressure,
            scratch,
            steps: 0,
        })
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    pub fn params(&self) -> &FluidParams {
        &self.params
    }

    pub fn set_params(&mut self, params: FluidParams) -> SimResult<()> {
        params.validate()?;
        self.params = params;
        Ok(())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn step_count(&self) -> u64 {
        self.steps
    }

    fn solver(&self) -> JacobiSolver {
        JacobiSolver::new(self.params.iterations, self.params.boundary)
            .with_warm_start(self.params.warm_start)
    }

    pub fn step(&mut self) -> SimResult<()> {
        let _span = tracing::trace_span!("fluid_step", step = self.steps).entered();
        let ctx = StageContext {
            backend: &self.backend,
            grid: self.grid,
            dt: self.params.dt,
            solver: self.solver(),
        };
        let dims = self.grid.dimension_count();

        {
            let (front, back) = self.velocity.split();
            for axis in 0..dims {
                diffuse(
                    ctx,
                    FieldKind::velocity(axis),
                    &mut back[axis],
                    &front[axis],
                    &mut self.scratch,
                    self.params.viscosity,
                )?;
            }
        }
        self.velocity.swap();
        tracing::trace!("diffused velocity");

        project(
            ctx,
            self.velocity.front_mut(),
            &mut self.divergence,
            &mut self.pressure,
            &mut self.scratch,
        )?;

        {
            let (front, back) = self.velocity.split();
            for axis in 0..dims {
                advect(ctx, FieldKind::velocity(axis), &mut back[axis], &front[axis], front);
            }
        }
        self.velocity.swap();
        tracing::trace!("advected velocity");

        project(
            ctx,
            self.velocity.front_mut(),
            &mut self.divergence,
            &mut self.pressure,
            &mut self.scratch,
        )?;

        {
            let (front, back) = self.density.split();
            diffuse(
                ctx,
                FieldKind::Scalar,
                back,
                front,
                &mut self.scratch,
                self.params.diffusion,
            )?;
        }
        self.density.swap();

        {
            let (front, back) = self.density.split();
            advect(ctx, FieldKind::Scalar, back, front, self.velocity.front());
        }
        self.density.swap();
        tracing::trace!("transported density");

        self.steps += 1;
        Ok(())
    }

    pub fn add_density_at(&mut self, x: i64, y: i64, amount: f32) {
        self.add_density_at_3d(x, y, 0, amount);
    }

    pub fn add_density_at_3d(&mut self, x: i64, y: i64, z: i64, amount: f32) {
        let index = self.grid.ix(x, y, z);
        self.backend.add_at(self.density.front_mut(), index, amount);
    }

    pub fn add_velocity_at(&mut self, x: i64, y: i64, dx: f32, dy: f32) {
        let index = self.grid.ix(x, y, 0);
        let front = self.velocity.front_mut();
        self.backend.add_at(&mut front[0], index, dx);
        self.backend.add_at(&mut front[1], index, dy);
    }

    /// On a 2D grid `dz` is dropped.
    pub fn add_velocity_at_3d(&mut self, x: i64, y: i64, z: i64, delta: [f32; 3]) {
        let index = self.grid.ix(x, y, z);
        let front = self.velocity.front_mut();
        for (component, amount) in front.iter_mut().zip(delta) {
            self.backend.add_at(component, index, amount);
        }
    }

    pub fn density(&self) -> SimResult<Field> {
        self.download(self.density.front())
    }

    pub fn velocity(&self) -> SimResult<VelocityField> {
        let components = self
            .velocity
            .front()
            .iter()
            .map(|buffer| self.download(buffer))
            .collect::<SimResult<Vec<_>>>()?;
        VelocityField::from_components(components)
    }

    pub fn set_density(&mut self, density: &Field) -> SimResult<()> {
        self.backend
            .upload(self.density.front_mut(), density.as_slice())
    }

    pub fn set_velocity(&mut self, velocity: &VelocityField) -> SimResult<()> {
        check_len(
            "velocity components",
            self.grid.dimension_count(),
            velocity.components().len(),
        )?;
        let front = self.velocity.front_mut();
        for (buffer, component) in front.iter_mut().zip(velocity.components()) {
            self.backend.upload(buffer, component.as_slice())?;
        }
        Ok(())
    }

    pub fn resize(&mut self, grid: Grid) -> SimResult<()> {
        grid.check_fluid_axes()?;
        let backend = &self.backend;
        self.velocity = PingPong::new(
            alloc_components(backend, &grid),
            alloc_components(backend, &grid),
        );
        self.density = PingPong::new(backend.alloc(grid.size()), backend.alloc(grid.size()));
        self.divergence = backend.alloc(grid.size());
        self.pressure = backend.alloc(grid.size());
        self.scratch = backend.alloc(grid.size());
        self.grid = grid;
        self.steps = 0;
        tracing::debug!(nx = grid.nx(), ny = grid.ny(), nz = grid.nz(), "fluid stepper resized");
        Ok(())
    }

    fn download(&self, buffer: &B::Buffer) -> SimResult<Field> {
        let mut data = vec![0.0; self.grid.size()];
        self.backend.download(buffer, &mut data)?;
        Field::from_data(self.grid, data)
    }
}

fn alloc_components<B: ComputeBackend>(backend: &B, grid: &Grid) -> Vec<B::Buffer> {
    (0..grid.dimension_count())
        .map(|_| backend.alloc(grid.size()))
        .collect()
}
