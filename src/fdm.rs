use crate::backend::{ComputeBackend, CpuBackend};
use crate::config::FdmSolverConfig;
use crate::error::{check_len, SimError, SimResult};
use crate::grid::Grid;
use serde::{Deserialize, Serialize};

/// Upper half of a symmetric 7-point stencil row. The left, down and back
/// entries of row `i` are the right, up and forward entries of the neighbouring
/// rows.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatrixRow {
    pub center: f32,
    pub right: f32,
    pub up: f32,
    pub forward: f32,
}

impl MatrixRow {
    pub const fn new(center: f32, right: f32, up: f32, forward: f32) -> Self {
        Self {
            center,
            right,
            up,
            forward,
        }
    }

    pub fn coefficient(&self, axis: usize) -> f32 {
        match axis {
            0 => self.right,
            1 => self.up,
            _ => self.forward,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FdmSystem {
    pub a: Vec<MatrixRow>,
    pub x: Vec<f32>,
    pub b: Vec<f32>,
}

impl FdmSystem {
    pub fn new(a: Vec<MatrixRow>, x: Vec<f32>, b: Vec<f32>) -> SimResult<Self> {
        check_len("fdm x", a.len(), x.len())?;
        check_len("fdm b", a.len(), b.len())?;
        Ok(Self { a, x, b })
    }

    pub fn len(&self) -> usize {
        self.a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }
}

/// The 2×2×2 system whose exact solution is `x = [0, 1, ..., 7]`, starting from
/// a zero guess.
pub fn sample_system() -> SimResult<(Grid, FdmSystem)> {
    let grid = Grid::for_system(2, 2, 2)?;
    let mut a = vec![MatrixRow::new(10.0, 0.0, 0.0, 0.0); grid.size()];
    a[0] = MatrixRow::new(10.0, 1.0, 1.0, 0.0);
    a[1] = MatrixRow::new(10.0, 0.0, 2.0, 0.0);
    a[2] = MatrixRow::new(10.0, 1.0, 0.0, 5.0);
    a[3] = MatrixRow::new(10.0, 0.0, 0.0, 5.0);
    let b = vec![3.0, 16.0, 53.0, 69.0, 40.0, 50.0, 70.0, 85.0];
    let system = FdmSystem::new(a, vec![0.0; grid.size()], b)?;
    Ok((grid, system))
}

pub struct FdmSolver<B: ComputeBackend = CpuBackend> {
    backend: B,
    grid: Grid,
    config: FdmSolverConfig,
}

impl FdmSolver<CpuBackend> {
    pub fn new(grid: Grid, config: FdmSolverConfig) -> SimResult<Self> {
        Self::with_backend(CpuBackend::new(), grid, config)
    }
}

impl<B: ComputeBackend> FdmSolver<B> {
    pub fn with_backend(backend: B, grid: Grid, config: FdmSolverConfig) -> SimResult<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            grid,
            config,
        })
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    pub fn config(&self) -> &FdmSolverConfig {
        &self.config
    }

    pub fn mvm(&self, x: &[f32], a: &[MatrixRow]) -> SimResult<Vec<f32>> {
        check_len("fdm matrix", self.grid.size(), a.len())?;
        let matrix = self.backend.alloc_matrix(a);
        let x = self.upload(x)?;
        let mut result = self.backend.alloc(self.grid.size());
        self.backend.mvm(&self.grid, &matrix, &x, &mut result);
        self.download(&result)
    }

    pub fn residual(&self, b: &[f32], x: &[f32], a: &[MatrixRow]) -> SimResult<Vec<f32>> {
        check_len("fdm matrix", self.grid.size(), a.len())?;
        let matrix = self.backend.alloc_matrix(a);
        let x = self.upload(x)?;
        let b = self.upload(b)?;
        let mut result = self.backend.alloc(self.grid.size());
        self.backend
            .residual(&self.grid, &matrix, &x, &b, &mut result);
        self.download(&result)
    }

    pub fn relax(&self, system: &FdmSystem) -> SimResult<Vec<f32>> {
        self.check_system(system)?;
        let matrix = self.backend.alloc_matrix(&system.a);
        let x = self.upload(&system.x)?;
        let b = self.upload(&system.b)?;
        let mut result = self.backend.alloc(self.grid.size());
        self.backend.relax(
            &self.grid,
            &matrix,
            &x,
            &b,
            &mut result,
            self.config.relaxation_weight,
        );
        self.download(&result)
    }

    /// Relaxes `system.x` in place until the squared residual drops below the
    /// threshold or the iteration budget runs out. Returns whether the final
    /// residual is below the threshold.
    pub fn solve(&self, system: &mut FdmSystem) -> SimResult<bool> {
        self.check_system(system)?;
        let backend = &self.backend;
        let grid = &self.grid;
        let n = grid.size();

        let matrix = backend.alloc_matrix(&system.a);
        let mut x = self.upload(&system.x)?;
        let b = self.upload(&system.b)?;
        let mut next = backend.alloc(n);
        let mut residual = backend.alloc(n);
        let mut work = backend.alloc(n);

        let mut iterations = 0;
        for i in 0..self.config.max_iterations {
            backend.relax(grid, &matrix, &x, &b, &mut next, self.config.relaxation_weight);
            std::mem::swap(&mut x, &mut next);
            iterations = i + 1;

            if i != 0 && i % self.config.check_interval == 0 {
                backend.residual(grid, &matrix, &x, &b, &mut residual);
                let norm = self.l2_norm_resident(&residual, &mut work)?;
                tracing::trace!(iteration = i, residual = norm, "fdm residual");
                if norm < self.config.threshold {
                    break;
                }
            }
        }

        backend.residual(grid, &matrix, &x, &b, &mut residual);
        let norm = self.l2_norm_resident(&residual, &mut work)?;
        backend.download(&x, &mut system.x)?;

        let converged = norm < self.config.threshold;
        tracing::debug!(iterations, residual = norm, converged, "fdm solve finished");
        Ok(converged)
    }

    /// Sum of squares of `vector`. No square root is taken.
    pub fn l2_norm(&self, vector: &[f32]) -> SimResult<f32> {
        let buffer = self.upload_any(vector)?;
        let mut work = self.backend.alloc(vector.len());
        self.l2_norm_resident(&buffer, &mut work)
    }

    /// Tree reduction that folds the upper `floor(len/2)` elements onto the
    /// lower `ceil(len/2)` until one element remains.
    pub fn sum(&self, vector: &[f32]) -> SimResult<f32> {
        let mut buffer = self.upload_any(vector)?;
        self.sum_resident(&mut buffer, vector.len())
    }

    fn l2_norm_resident(&self, vector: &B::Buffer, work: &mut B::Buffer) -> SimResult<f32> {
        self.backend.pairwise_mult(vector, work);
        let len = self.backend.buffer_len(work);
        self.sum_resident(work, len)
    }

    fn sum_resident(&self, buffer: &mut B::Buffer, len: usize) -> SimResult<f32> {
        if len == 0 {
            return Ok(0.0);
        }
        let mut length = len;
        while length > 1 {
            let half = (length + 1) / 2;
            self.backend.sum_pass(buffer, length, half);
            length = half;
        }
        self.backend.read_at(buffer, 0)
    }

    fn check_system(&self, system: &FdmSystem) -> SimResult<()> {
        check_len("fdm matrix", self.grid.size(), system.a.len())?;
        check_len("fdm x", self.grid.size(), system.x.len())?;
        check_len("fdm b", self.grid.size(), system.b.len())?;
        if let Some(row) = system
            .a
            .iter()
            .find(|row| row.center == 0.0 || !row.center.is_finite())
        {
            return Err(SimError::ZeroDiagonal(row.center));
        }
        Ok(())
    }

    fn upload(&self, data: &[f32]) -> SimResult<B::Buffer> {
        check_len("fdm vector", self.grid.size(), data.len())?;
        self.upload_any(data)
    }

    fn upload_any(&self, data: &[f32]) -> SimResult<B::Buffer> {
        let mut buffer = self.backend.alloc(data.len());
        self.backend.upload(&mut buffer, data)?;
        Ok(buffer)
    }

    fn download(&self, buffer: &B::Buffer) -> SimResult<Vec<f32>> {
        let mut out = vec![0.0; self.backend.buffer_len(buffer)];
        self.backend.download(buffer, &mut out)?;
        Ok(out)
    }
}
