use crate::error::{SimError, SimResult};

/// Smallest axis length for which corners have two distinct interior neighbours.
pub const MIN_FLUID_AXIS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Grid {
    nx: usize,
    ny: usize,
    nz: usize,
}

impl Grid {
    pub fn new_2d(nx: usize, ny: usize) -> SimResult<Self> {
        check_axis("x", nx, MIN_FLUID_AXIS)?;
        check_axis("y", ny, MIN_FLUID_AXIS)?;
        Ok(Self { nx, ny, nz: 1 })
    }

    pub fn new_3d(nx: usize, ny: usize, nz: usize) -> SimResult<Self> {
        check_axis("x", nx, MIN_FLUID_AXIS)?;
        check_axis("y", ny, MIN_FLUID_AXIS)?;
        check_axis("z", nz, MIN_FLUID_AXIS)?;
        Ok(Self { nx, ny, nz })
    }

    /// Grid for a standalone linear system. Only empty axes are rejected, so tiny
    /// systems such as `2×2×2` are allowed.
    pub fn for_system(nx: usize, ny: usize, nz: usize) -> SimResult<Self> {
        check_axis("x", nx, 1)?;
        check_axis("y", ny, 1)?;
        check_axis("z", nz, 1)?;
        Ok(Self { nx, ny, nz })
    }

    /// Fails unless every active axis meets [`MIN_FLUID_AXIS`]. A grid made by
    /// [`Grid::for_system`] may be too small for the fluid stages.
    pub fn check_fluid_axes(&self) -> SimResult<()> {
        check_axis("x", self.nx, MIN_FLUID_AXIS)?;
        check_axis("y", self.ny, MIN_FLUID_AXIS)?;
        if self.is_3d() {
            check_axis("z", self.nz, MIN_FLUID_AXIS)?;
        }
        Ok(())
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn nz(&self) -> usize {
        self.nz
    }

    pub fn dims(&self) -> [usize; 3] {
        [self.nx, self.ny, self.nz]
    }

    pub fn is_3d(&self) -> bool {
        self.nz > 1
    }

    pub fn dimension_count(&self) -> usize {
        if self.is_3d() {
            3
        } else {
            2
        }
    }

    pub fn size(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    pub fn ix(&self, x: i64, y: i64, z: i64) -> usize {
        let x = x.rem_euclid(self.nx as i64) as usize;
        let y = y.rem_euclid(self.ny as i64) as usize;
        let z = z.rem_euclid(self.nz as i64) as usize;
        (z * self.ny + y) * self.nx + x
    }

    pub fn idx(&self, x: usize, y: usize, z: usize) -> usize {
        debug_assert!(x < self.nx && y < self.ny && z < self.nz);
        (z * self.ny + y) * self.nx + x
    }

    pub fn coords(&self, index: usize) -> (usize, usize, usize) {
        debug_assert!(index < self.size());
        let x = index % self.nx;
        let y = (index / self.nx) % self.ny;
        let z = index / (self.nx * self.ny);
        (x, y, z)
    }

    pub fn wrapped_neighbor(&self, index: usize, axis: usize, forward: bool) -> usize {
        let (x, y, z) = self.coords(index);
        let step = if forward { 1 } else { -1 };
        let (mut cx, mut cy, mut cz) = (x as i64, y as i64, z as i64);
        match axis {
            0 => cx += step,
            1 => cy += step,
            _ => cz += step,
        }
        self.ix(cx, cy, cz)
    }

    pub fn neighbor_in_bounds(&self, index: usize, axis: usize, forward: bool) -> Option<usize> {
        let (x, y, z) = self.coords(index);
        let coord = [x, y, z][axis];
        let len = self.dims()[axis];
        let moved = if forward {
            (coord + 1 < len).then(|| coord + 1)?
        } else {
            coord.checked_sub(1)?
        };
        let mut c = [x, y, z];
        c[axis] = moved;
        Some(self.idx(c[0], c[1], c[2]))
    }

    /// Number of interior cells along each axis, used to convert normalised
    /// velocities into cell units. The unused third axis reports 1 on 2D grids.
    pub fn interior_scale(&self) -> [f32; 3] {
        let z = if self.is_3d() {
            (self.nz - 2) as f32
        } else {
            1.0
        };
        [(self.nx - 2) as f32, (self.ny - 2) as f32, z]
    }

    pub fn clamp_coord(&self, x: i64, y: i64, z: i64) -> (usize, usize, usize) {
        let cx = x.clamp(0, self.nx as i64 - 1) as usize;
        let cy = y.clamp(0, self.ny as i64 - 1) as usize;
        let cz = z.clamp(0, self.nz as i64 - 1) as usize;
        (cx, cy, cz)
    }
}

fn check_axis(axis: &'static str, value: usize, min: usize) -> SimResult<()> {
    if value < min {
        return Err(SimError::InvalidDimension { axis, value, min });
    }
    Ok(())
}
