use crate::error::{check_len, SimError, SimResult};
use crate::grid::Grid;
use rayon::prelude::*;
use std::sync::OnceLock;

const PAR_THRESHOLD_DEFAULT: usize = 65_536;
const PAR_MIN_WORK_PER_THREAD: usize = 4096;

fn parallel_threshold() -> usize {
    static THRESHOLD: OnceLock<usize> = OnceLock::new();
    *THRESHOLD.get_or_init(|| {
        std::env::var("FLUID_PAR_THRESHOLD")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(PAR_THRESHOLD_DEFAULT)
    })
}

pub(crate) fn should_parallel(len: usize) -> bool {
    if len < parallel_threshold() {
        return false;
    }
    let threads = rayon::current_num_threads().max(1);
    len / threads >= PAR_MIN_WORK_PER_THREAD
}

pub(crate) fn fill_indexed(out: &mut [f32], f: impl Fn(usize) -> f32 + Sync) {
    if should_parallel(out.len()) {
        out.par_iter_mut().enumerate().for_each(|(i, value)| {
            *value = f(i);
        });
    } else {
        for (i, value) in out.iter_mut().enumerate() {
            *value = f(i);
        }
    }
}

pub(crate) fn map_indexed(out: &mut [f32], f: impl Fn(usize, f32) -> f32 + Sync) {
    if should_parallel(out.len()) {
        out.par_iter_mut().enumerate().for_each(|(i, value)| {
            *value = f(i, *value);
        });
    } else {
        for (i, value) in out.iter_mut().enumerate() {
            *value = f(i, *value);
        }
    }
}

pub(crate) fn sum_slice(data: &[f32]) -> f32 {
    if should_parallel(data.len()) {
        data.par_iter().sum()
    } else {
        data.iter().sum()
    }
}

/// Bilinear (2D) or trilinear (3D) sample at a position in cell-index units.
/// Integer lattice points are clamped into the grid.
pub(crate) fn sample_linear(grid: &Grid, data: &[f32], pos: [f32; 3]) -> f32 {
    let at = |x: i64, y: i64, z: i64| {
        let (cx, cy, cz) = grid.clamp_coord(x, y, z);
        data[grid.idx(cx, cy, cz)]
    };
    let x0 = pos[0].floor() as i64;
    let y0 = pos[1].floor() as i64;
    let sx = pos[0] - x0 as f32;
    let sy = pos[1] - y0 as f32;
    let plane = |z: i64| {
        let v00 = at(x0, y0, z);
        let v10 = at(x0 + 1, y0, z);
        let v01 = at(x0, y0 + 1, z);
        let v11 = at(x0 + 1, y0 + 1, z);
        lerp(lerp(v00, v10, sx), lerp(v01, v11, sx), sy)
    };
    if !grid.is_3d() {
        return plane(0);
    }
    let z0 = pos[2].floor() as i64;
    let sz = pos[2] - z0 as f32;
    lerp(plane(z0), plane(z0 + 1), sz)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    (1.0 - t) * a + t * b
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    grid: Grid,
    data: Vec<f32>,
}

impl Field {
    pub fn new(grid: Grid, fill: f32) -> Self {
        let data = vec![fill; grid.size()];
        Self { grid, data }
    }

    pub fn from_data(grid: Grid, data: Vec<f32>) -> SimResult<Self> {
        check_len("field data", grid.size(), data.len())?;
        Ok(Self { grid, data })
    }

    pub fn from_fn(grid: Grid, f: impl Fn(usize, usize, usize) -> f32 + Sync) -> Self {
        let mut data = vec![0.0; grid.size()];
        fill_indexed(&mut data, |i| {
            let (x, y, z) = grid.coords(i);
            f(x, y, z)
        });
        Self { grid, data }
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    pub fn get(&self, x: i64, y: i64, z: i64) -> f32 {
        self.data[self.grid.ix(x, y, z)]
    }

    pub fn set(&mut self, x: i64, y: i64, z: i64, value: f32) {
        let index = self.grid.ix(x, y, z);
        self.data[index] = value;
    }

    pub fn add_at(&mut self, x: i64, y: i64, z: i64, amount: f32) {
        let index = self.grid.ix(x, y, z);
        self.data[index] += amount;
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn sample_linear(&self, pos: [f32; 3]) -> f32 {
        sample_linear(&self.grid, &self.data, pos)
    }

    pub fn fill_with_index(&mut self, f: impl Fn(usize, usize, usize) -> f32 + Sync) {
        let grid = self.grid;
        fill_indexed(&mut self.data, |i| {
            let (x, y, z) = grid.coords(i);
            f(x, y, z)
        });
    }

    pub fn sum(&self) -> f32 {
        sum_slice(&self.data)
    }

    pub fn sum_squares(&self) -> f32 {
        if should_parallel(self.data.len()) {
            self.data.par_iter().map(|value| value * value).sum()
        } else {
            self.data.iter().map(|value| value * value).sum()
        }
    }

    pub fn max_abs(&self) -> f32 {
        if should_parallel(self.data.len()) {
            self.data
                .par_iter()
                .map(|value| value.abs())
                .reduce(|| 0.0_f32, f32::max)
        } else {
            self.data
                .iter()
                .map(|value| value.abs())
                .fold(0.0_f32, f32::max)
        }
    }

    pub fn min_max(&self) -> (f32, f32) {
        let mut iter = self.data.iter().filter(|value| value.is_finite());
        let Some(first) = iter.next() else {
            return (0.0, 0.0);
        };
        iter.fold((*first, *first), |(lo, hi), value| (lo.min(*value), hi.max(*value)))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VelocityField {
    components: Vec<Field>,
}

impl VelocityField {
    pub fn zeros(grid: Grid) -> Self {
        let components = (0..grid.dimension_count())
            .map(|_| Field::new(grid, 0.0))
            .collect();
        Self { components }
    }

    pub fn from_fn(grid: Grid, f: impl Fn(usize, usize, usize) -> [f32; 3] + Sync) -> Self {
        let components = (0..grid.dimension_count())
            .map(|axis| Field::from_fn(grid, |x, y, z| f(x, y, z)[axis]))
            .collect();
        Self { components }
    }

    pub fn from_components(components: Vec<Field>) -> SimResult<Self> {
        let Some(first) = components.first() else {
            return Err(SimError::InvalidParameter {
                name: "components",
                reason: "velocity needs at least one component".to_string(),
            });
        };
        let grid = first.grid();
        check_len("velocity components", grid.dimension_count(), components.len())?;
        for component in &components {
            check_len("velocity component", grid.size(), component.as_slice().len())?;
        }
        Ok(Self { components })
    }

    pub fn grid(&self) -> Grid {
        self.components[0].grid()
    }

    pub fn components(&self) -> &[Field] {
        &self.components
    }

    pub fn component(&self, axis: usize) -> &Field {
        &self.components[axis]
    }

    pub fn component_mut(&mut self, axis: usize) -> &mut Field {
        &mut self.components[axis]
    }

    pub fn max_abs(&self) -> f32 {
        self.components
            .iter()
            .map(Field::max_abs)
            .fold(0.0_f32, f32::max)
    }

    pub fn energy(&self) -> f32 {
        self.components.iter().map(Field::sum_squares).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f32, b: f32, tol: f32) {
        assert!(
            (a - b).abs() <= tol,
            "expected {a} to be within {tol} of {b}"
        );
    }

    #[test]
    fn from_fn_maps_coords() {
        let grid = Grid::new_2d(4, 3).unwrap();
        let field = Field::from_fn(grid, |x, y, _| (x + y * 10) as f32);
        assert_close(field.get(2, 1, 0), 12.0, 1e-6);
        assert_close(field.get(-1, 0, 0), 3.0, 1e-6);
    }

    #[test]
    fn sample_linear_hits_lattice_points() {
        let grid = Grid::new_2d(4, 4).unwrap();
        let field = Field::from_fn(grid, |x, y, _| (x + y * 4) as f32);
        assert_close(field.sample_linear([2.0, 1.0, 0.0]), 6.0, 1e-6);
        assert_close(field.sample_linear([1.5, 1.0, 0.0]), 5.5, 1e-6);
        assert_close(field.sample_linear([1.0, 1.5, 0.0]), 7.0, 1e-6);
    }

    #[test]
    fn trilinear_sample_blends_planes() {
        let grid = Grid::new_3d(3, 3, 3).unwrap();
        let field = Field::from_fn(grid, |_, _, z| z as f32 * 2.0);
        assert_close(field.sample_linear([1.0, 1.0, 0.25]), 0.5, 1e-6);
    }

    #[test]
    fn from_data_checks_length() {
        let grid = Grid::new_2d(3, 3).unwrap();
        assert!(Field::from_data(grid, vec![0.0; 8]).is_err());
        assert!(Field::from_data(grid, vec![0.0; 9]).is_ok());
    }

    #[test]
    fn min_max_reports_bounds() {
        let grid = Grid::new_2d(3, 3).unwrap();
        let field = Field::from_fn(grid, |x, y, _| (x + y * 3) as f32 - 1.0);
        assert_eq!(field.min_max(), (-1.0, 7.0));
    }

    #[test]
    fn velocity_has_one_component_per_axis() {
        let grid = Grid::new_3d(3, 4, 5).unwrap();
        let velocity = VelocityField::from_fn(grid, |_, _, _| [1.0, -2.0, 0.5]);
        assert_eq!(velocity.components().len(), 3);
        assert_close(velocity.max_abs(), 2.0, 1e-6);
        assert_close(velocity.energy(), 60.0 * 5.25, 1e-3);
    }
}
