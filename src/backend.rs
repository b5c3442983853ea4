use crate::boundary::{self, FieldKind};
use crate::error::{check_len, SimError, SimResult};
use crate::fdm::MatrixRow;
use crate::field::{fill_indexed, map_indexed, sample_linear, should_parallel};
use crate::grid::Grid;
use rayon::prelude::*;

/// Device-side kernel contract used by the fluid stages and the FDM solver.
///
/// Every kernel call is one barrier-separated phase: it returns once its output
/// buffer is complete, and it only reads from its input buffers. Buffers stay
/// resident on the backend between calls; host transfers happen only through
/// [`ComputeBackend::upload`], [`ComputeBackend::download`] and
/// [`ComputeBackend::read_at`].
pub trait ComputeBackend: Send + Sync {
    type Buffer: Send + Sync;
    type MatrixBuffer: Send + Sync;

    fn name(&self) -> &'static str;

    fn alloc(&self, len: usize) -> Self::Buffer;
    fn alloc_matrix(&self, rows: &[MatrixRow]) -> Self::MatrixBuffer;
    fn buffer_len(&self, buffer: &Self::Buffer) -> usize;
    fn upload(&self, buffer: &mut Self::Buffer, data: &[f32]) -> SimResult<()>;
    fn download(&self, buffer: &Self::Buffer, out: &mut [f32]) -> SimResult<()>;
    fn read_at(&self, buffer: &Self::Buffer, index: usize) -> SimResult<f32>;
    fn fill(&self, buffer: &mut Self::Buffer, value: f32);
    fn copy(&self, src: &Self::Buffer, dst: &mut Self::Buffer);
    fn add_at(&self, buffer: &mut Self::Buffer, index: usize, amount: f32);

    /// One Jacobi sweep over every cell:
    /// `result = (b + coeff * sum(neighbours of value)) * inv_diam`.
    fn linear_solve(
        &self,
        grid: &Grid,
        value: &Self::Buffer,
        b: &Self::Buffer,
        result: &mut Self::Buffer,
        coeff: f32,
        inv_diam: f32,
    );
    fn set_corners(&self, grid: &Grid, value: &mut Self::Buffer);
    fn set_boundary(&self, grid: &Grid, kind: FieldKind, value: &mut Self::Buffer);
    /// Writes the scaled negative divergence of `velocity` and zeroes `pressure`.
    fn divergence_pressure(
        &self,
        grid: &Grid,
        velocity: &[Self::Buffer],
        divergence: &mut Self::Buffer,
        pressure: &mut Self::Buffer,
    );
    fn gradient_pressure(&self, grid: &Grid, velocity: &mut [Self::Buffer], pressure: &Self::Buffer);
    /// Semi-Lagrangian backtrace of `previous` along `velocity`. `dt_scaled` is the
    /// time step already converted to cells per unit velocity on each axis.
    fn advect(
        &self,
        grid: &Grid,
        out: &mut Self::Buffer,
        previous: &Self::Buffer,
        velocity: &[Self::Buffer],
        dt_scaled: [f32; 3],
    );

    fn mvm(&self, grid: &Grid, a: &Self::MatrixBuffer, x: &Self::Buffer, result: &mut Self::Buffer);
    fn residual(
        &self,
        grid: &Grid,
        a: &Self::MatrixBuffer,
        x: &Self::Buffer,
        b: &Self::Buffer,
        result: &mut Self::Buffer,
    );
    fn relax(
        &self,
        grid: &Grid,
        a: &Self::MatrixBuffer,
        x: &Self::Buffer,
        b: &Self::Buffer,
        result: &mut Self::Buffer,
        weight: f32,
    );
    /// `result[i] = x[i] * x[i]`.
    fn pairwise_mult(&self, x: &Self::Buffer, result: &mut Self::Buffer);
    /// One halving pass: `buffer[i] += buffer[i + half_length]` for
    /// `i + half_length < length`.
    fn sum_pass(&self, buffer: &mut Self::Buffer, length: usize, half_length: usize);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        Self
    }
}

fn off_diagonal(grid: &Grid, a: &[MatrixRow], x: &[f32], index: usize) -> f32 {
    let mut sum = 0.0;
    for axis in 0..3 {
        if let Some(next) = grid.neighbor_in_bounds(index, axis, true) {
            sum += a[index].coefficient(axis) * x[next];
        }
        if let Some(prev) = grid.neighbor_in_bounds(index, axis, false) {
            sum += a[prev].coefficient(axis) * x[prev];
        }
    }
    sum
}

impl ComputeBackend for CpuBackend {
    type Buffer = Vec<f32>;
    type MatrixBuffer = Vec<MatrixRow>;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn alloc(&self, len: usize) -> Vec<f32> {
        vec![0.0; len]
    }

    fn alloc_matrix(&self, rows: &[MatrixRow]) -> Vec<MatrixRow> {
        rows.to_vec()
    }

    fn buffer_len(&self, buffer: &Vec<f32>) -> usize {
        buffer.len()
    }

    fn upload(&self, buffer: &mut Vec<f32>, data: &[f32]) -> SimResult<()> {
        check_len("upload", buffer.len(), data.len())?;
        buffer.copy_from_slice(data);
        Ok(())
    }

    fn download(&self, buffer: &Vec<f32>, out: &mut [f32]) -> SimResult<()> {
        check_len("download", buffer.len(), out.len())?;
        out.copy_from_slice(buffer);
        Ok(())
    }

    fn read_at(&self, buffer: &Vec<f32>, index: usize) -> SimResult<f32> {
        buffer
            .get(index)
            .copied()
            .ok_or_else(|| SimError::InvalidParameter {
                name: "index",
                reason: format!("{index} is outside a buffer of length {}", buffer.len()),
            })
    }

    fn fill(&self, buffer: &mut Vec<f32>, value: f32) {
        buffer.fill(value);
    }

    fn copy(&self, src: &Vec<f32>, dst: &mut Vec<f32>) {
        dst.copy_from_slice(src);
    }

    fn add_at(&self, buffer: &mut Vec<f32>, index: usize, amount: f32) {
        buffer[index] += amount;
    }

    fn linear_solve(
        &self,
        grid: &Grid,
        value: &Vec<f32>,
        b: &Vec<f32>,
        result: &mut Vec<f32>,
        coeff: f32,
        inv_diam: f32,
    ) {
        let dims = grid.dimension_count();
        fill_indexed(result, |i| {
            let mut neighbors = 0.0;
            for axis in 0..dims {
                neighbors += value[grid.wrapped_neighbor(i, axis, true)];
                neighbors += value[grid.wrapped_neighbor(i, axis, false)];
            }
            (b[i] + coeff * neighbors) * inv_diam
        });
    }

    fn set_corners(&self, grid: &Grid, value: &mut Vec<f32>) {
        boundary::apply_corners(grid, value);
    }

    fn set_boundary(&self, grid: &Grid, kind: FieldKind, value: &mut Vec<f32>) {
        boundary::set_boundary(grid, kind, value);
    }

    fn divergence_pressure(
        &self,
        grid: &Grid,
        velocity: &[Vec<f32>],
        divergence: &mut Vec<f32>,
        pressure: &mut Vec<f32>,
    ) {
        let scale = grid.interior_scale();
        fill_indexed(divergence, |i| {
            let mut sum = 0.0;
            for (axis, component) in velocity.iter().enumerate() {
                let forward = component[grid.wrapped_neighbor(i, axis, true)];
                let backward = component[grid.wrapped_neighbor(i, axis, false)];
                sum += (forward - backward) / scale[axis];
            }
            -0.5 * sum
        });
        pressure.fill(0.0);
    }

    fn gradient_pressure(&self, grid: &Grid, velocity: &mut [Vec<f32>], pressure: &Vec<f32>) {
        let scale = grid.interior_scale();
        for (axis, component) in velocity.iter_mut().enumerate() {
            map_indexed(component, |i, v| {
                let forward = pressure[grid.wrapped_neighbor(i, axis, true)];
                let backward = pressure[grid.wrapped_neighbor(i, axis, false)];
                v - 0.5 * (forward - backward) * scale[axis]
            });
        }
    }

    fn advect(
        &self,
        grid: &Grid,
        out: &mut Vec<f32>,
        previous: &Vec<f32>,
        velocity: &[Vec<f32>],
        dt_scaled: [f32; 3],
    ) {
        let dims = grid.dimension_count();
        let upper = grid.dims().map(|n| n as f32 - 1.5);
        fill_indexed(out, |i| {
            let (x, y, z) = grid.coords(i);
            let mut pos = [x as f32, y as f32, z as f32];
            for axis in 0..dims {
                let traced = pos[axis] - dt_scaled[axis] * velocity[axis][i];
                pos[axis] = traced.clamp(0.5, upper[axis]);
            }
            sample_linear(grid, previous, pos)
        });
    }

    fn mvm(&self, grid: &Grid, a: &Vec<MatrixRow>, x: &Vec<f32>, result: &mut Vec<f32>) {
        fill_indexed(result, |i| a[i].center * x[i] + off_diagonal(grid, a, x, i));
    }

    fn residual(
        &self,
        grid: &Grid,
        a: &Vec<MatrixRow>,
        x: &Vec<f32>,
        b: &Vec<f32>,
        result: &mut Vec<f32>,
    ) {
        fill_indexed(result, |i| {
            b[i] - (a[i].center * x[i] + off_diagonal(grid, a, x, i))
        });
    }

    fn relax(
        &self,
        grid: &Grid,
        a: &Vec<MatrixRow>,
        x: &Vec<f32>,
        b: &Vec<f32>,
        result: &mut Vec<f32>,
        weight: f32,
    ) {
        fill_indexed(result, |i| {
            let jacobi = (b[i] - off_diagonal(grid, a, x, i)) / a[i].center;
            (1.0 - weight) * x[i] + weight * jacobi
        });
    }

    fn pairwise_mult(&self, x: &Vec<f32>, result: &mut Vec<f32>) {
        fill_indexed(result, |i| x[i] * x[i]);
    }

    fn sum_pass(&self, buffer: &mut Vec<f32>, length: usize, half_length: usize) {
        let (low, high) = buffer[..length].split_at_mut(half_length);
        if should_parallel(high.len()) {
            low.par_iter_mut()
                .zip(high.par_iter())
                .for_each(|(acc, value)| *acc += *value);
        } else {
            for (acc, value) in low.iter_mut().zip(high.iter()) {
                *acc += *value;
            }
        }
    }
}
