use crate::grid::Grid;
use serde::{Deserialize, Serialize};

/// Role of a field during boundary handling. The numeric codes match the kernel
/// `type` parameter: 0 scalar, 1..=3 the velocity component along x, y, z.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Scalar,
    VelocityX,
    VelocityY,
    VelocityZ,
}

impl FieldKind {
    pub fn from_type_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Scalar),
            1 => Some(Self::VelocityX),
            2 => Some(Self::VelocityY),
            3 => Some(Self::VelocityZ),
            _ => None,
        }
    }

    pub fn type_code(self) -> u32 {
        match self {
            Self::Scalar => 0,
            Self::VelocityX => 1,
            Self::VelocityY => 2,
            Self::VelocityZ => 3,
        }
    }

    pub fn velocity(axis: usize) -> Self {
        match axis {
            0 => Self::VelocityX,
            1 => Self::VelocityY,
            _ => Self::VelocityZ,
        }
    }

    pub fn axis(self) -> Option<usize> {
        match self {
            Self::Scalar => None,
            Self::VelocityX => Some(0),
            Self::VelocityY => Some(1),
            Self::VelocityZ => Some(2),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Only the grid corners are rewritten; edges keep their wrapped stencil values.
    #[default]
    CornersOnly,
    /// Solid walls: edges copy their inward neighbour, velocity negated on the
    /// walls normal to its own axis, then corners.
    Walls,
}

impl BoundaryPolicy {
    pub fn apply(self, grid: &Grid, kind: FieldKind, data: &mut [f32]) {
        match self {
            Self::CornersOnly => apply_corners(grid, data),
            Self::Walls => set_boundary(grid, kind, data),
        }
    }
}

/// Sets every grid corner to the mean of its axis-adjacent neighbours.
pub fn apply_corners(grid: &Grid, data: &mut [f32]) {
    debug_assert_eq!(data.len(), grid.size());
    let [nx, ny, nz] = grid.dims();
    let zs: &[usize] = if grid.is_3d() { &[0, nz - 1] } else { &[0] };
    for &z in zs {
        for y in [0, ny - 1] {
            for x in [0, nx - 1] {
                let mut sum = 0.0;
                let mut count = 0.0;
                let inward = |c: usize, len: usize| if c == 0 { 1 } else { len - 2 };
                sum += data[grid.idx(inward(x, nx), y, z)];
                sum += data[grid.idx(x, inward(y, ny), z)];
                count += 2.0;
                if grid.is_3d() {
                    sum += data[grid.idx(x, y, inward(z, nz))];
                    count += 1.0;
                }
                data[grid.idx(x, y, z)] = sum / count;
            }
        }
    }
}

/// Wall boundary: copy (Neumann) across every face, negating the velocity
/// component on the faces normal to its axis, then average the corners.
pub fn set_boundary(grid: &Grid, kind: FieldKind, data: &mut [f32]) {
    debug_assert_eq!(data.len(), grid.size());
    let [nx, ny, nz] = grid.dims();
    let sign = |axis: usize| if kind.axis() == Some(axis) { -1.0 } else { 1.0 };
    for z in 0..nz {
        for y in 1..ny - 1 {
            data[grid.idx(0, y, z)] = sign(0) * data[grid.idx(1, y, z)];
            data[grid.idx(nx - 1, y, z)] = sign(0) * data[grid.idx(nx - 2, y, z)];
        }
    }
    for z in 0..nz {
        for x in 1..nx - 1 {
            data[grid.idx(x, 0, z)] = sign(1) * data[grid.idx(x, 1, z)];
            data[grid.idx(x, ny - 1, z)] = sign(1) * data[grid.idx(x, ny - 2, z)];
        }
    }
    if grid.is_3d() {
        for y in 1..ny - 1 {
            for x in 1..nx - 1 {
                data[grid.idx(x, y, 0)] = sign(2) * data[grid.idx(x, y, 1)];
                data[grid.idx(x, y, nz - 1)] = sign(2) * data[grid.idx(x, y, nz - 2)];
            }
        }
    }
    apply_corners(grid, data);
}
