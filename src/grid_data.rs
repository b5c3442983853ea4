use crate::error::{SimError, SimResult};
use crate::vec3::Vec3;
use serde::{Deserialize, Serialize};

pub const GRAVITY_EPSILON: f32 = 1e-3;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Centering {
    CellCentered,
    VertexCentered,
    /// Staggered (MAC) storage: one component per axis on the faces normal to it.
    FaceCentered,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Scalar,
    Vector,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    pub fn size(&self) -> Vec3 {
        self.max.sub(self.min)
    }

    pub fn center(&self) -> Vec3 {
        self.min.add(self.max).scale(0.5)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridGeometry {
    pub resolution: [usize; 3],
    pub spacing: Vec3,
    pub origin: Vec3,
}

impl GridGeometry {
    pub fn new(resolution: [usize; 3], spacing: Vec3, origin: Vec3) -> SimResult<Self> {
        for (axis, n) in ["x", "y", "z"].into_iter().zip(resolution) {
            if n == 0 {
                return Err(SimError::InvalidDimension {
                    axis,
                    value: n,
                    min: 1,
                });
            }
        }
        for v in spacing.to_array() {
            if !(v.is_finite() && v > 0.0) {
                return Err(SimError::InvalidParameter {
                    name: "spacing",
                    reason: format!("must be finite and > 0, got {v}"),
                });
            }
        }
        Ok(Self {
            resolution,
            spacing,
            origin,
        })
    }

    pub fn bounding_box(&self) -> BoundingBox {
        let extent = Vec3::new(
            self.resolution[0] as f32,
            self.resolution[1] as f32,
            self.resolution[2] as f32,
        )
        .mul(self.spacing);
        BoundingBox {
            min: self.origin,
            max: self.origin.add(extent),
        }
    }

    pub fn cell_center(&self) -> Vec3 {
        self.origin.add(self.spacing.scale(0.5))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum GridSample {
    Scalar(f32),
    Vector(Vec3),
}

impl GridSample {
    pub fn scalar(self) -> Option<f32> {
        match self {
            Self::Scalar(v) => Some(v),
            Self::Vector(_) => None,
        }
    }

    pub fn vector(self) -> Option<Vec3> {
        match self {
            Self::Vector(v) => Some(v),
            Self::Scalar(_) => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GridData {
    centering: Centering,
    kind: DataKind,
    geometry: GridGeometry,
    channels: Vec<Vec<f32>>,
}

/// Allocates zeroed storage for one layout. Face-centered scalars do not exist.
pub fn build_grid(
    centering: Centering,
    kind: DataKind,
    geometry: GridGeometry,
) -> SimResult<GridData> {
    if centering == Centering::FaceCentered && kind == DataKind::Scalar {
        return Err(SimError::InvalidCentering(centering));
    }
    let mut grid = GridData {
        centering,
        kind,
        geometry,
        channels: Vec::new(),
    };
    grid.allocate();
    Ok(grid)
}

fn product(size: [usize; 3]) -> usize {
    size[0] * size[1] * size[2]
}

fn linear_index(size: [usize; 3], i: usize, j: usize, k: usize) -> usize {
    (k * size[1] + j) * size[0] + i
}

impl GridData {
    fn allocate(&mut self) {
        let count = match self.kind {
            DataKind::Scalar => 1,
            DataKind::Vector => 3,
        };
        self.channels = (0..count)
            .map(|channel| vec![0.0; product(self.channel_size(channel))])
            .collect();
    }

    pub fn centering(&self) -> Centering {
        self.centering
    }

    pub fn kind(&self) -> DataKind {
        self.kind
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    /// Lattice size of the stored samples. For face-centered data this is the
    /// cell resolution; see [`GridData::face_size`] for the per-axis arrays.
    pub fn data_size(&self) -> [usize; 3] {
        let r = self.geometry.resolution;
        match self.centering {
            Centering::CellCentered | Centering::FaceCentered => r,
            Centering::VertexCentered => [r[0] + 1, r[1] + 1, r[2] + 1],
        }
    }

    pub fn data_origin(&self) -> Vec3 {
        match self.centering {
            Centering::CellCentered | Centering::FaceCentered => self.geometry.cell_center(),
            Centering::VertexCentered => self.geometry.origin,
        }
    }

    /// Size of the face array holding the component along `axis`: one extra
    /// sample along that axis.
    pub fn face_size(&self, axis: usize) -> [usize; 3] {
        let mut size = self.geometry.resolution;
        size[axis] += 1;
        size
    }

    pub fn face_origin(&self, axis: usize) -> Vec3 {
        let half = self.geometry.spacing.scale(0.5).with_axis(axis, 0.0);
        self.geometry.origin.add(half)
    }

    fn channel_size(&self, channel: usize) -> [usize; 3] {
        match self.centering {
            Centering::FaceCentered => self.face_size(channel),
            _ => self.data_size(),
        }
    }

    pub fn resize(&mut self, geometry: GridGeometry) {
        self.geometry = geometry;
        self.allocate();
    }

    pub fn channel(&self, channel: usize) -> &[f32] {
        &self.channels[channel]
    }

    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        &mut self.channels[channel]
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn fill(&mut self, value: f32) {
        for channel in &mut self.channels {
            channel.fill(value);
        }
    }

    pub fn face_at(&self, axis: usize, i: usize, j: usize, k: usize) -> SimResult<f32> {
        if self.centering != Centering::FaceCentered {
            return Err(SimError::InvalidCentering(self.centering));
        }
        let size = self.face_size(axis);
        check_point(size, i, j, k)?;
        Ok(self.channels[axis][linear_index(size, i, j, k)])
    }

    pub fn set(&mut self, i: usize, j: usize, k: usize, value: GridSample) -> SimResult<()> {
        let size = self.data_size();
        check_point(size, i, j, k)?;
        let index = linear_index(size, i, j, k);
        match (self.kind, self.centering, value) {
            (DataKind::Scalar, _, GridSample::Scalar(v)) => self.channels[0][index] = v,
            (DataKind::Vector, Centering::FaceCentered, _) => {
                return Err(SimError::InvalidCentering(self.centering));
            }
            (DataKind::Vector, _, GridSample::Vector(v)) => {
                for (channel, value) in self.channels.iter_mut().zip(v.to_array()) {
                    channel[index] = value;
                }
            }
            _ => {
                return Err(SimError::InvalidParameter {
                    name: "value",
                    reason: format!("{value:?} does not match {:?} data", self.kind),
                });
            }
        }
        Ok(())
    }

    /// Sample at lattice point `(i, j, k)` of [`GridData::data_size`]. Face-centered
    /// data reports the cell-centre velocity, the mean of the two faces per axis.
    pub fn sample(&self, i: usize, j: usize, k: usize) -> SimResult<GridSample> {
        let size = self.data_size();
        check_point(size, i, j, k)?;
        let index = linear_index(size, i, j, k);
        Ok(match (self.kind, self.centering) {
            (DataKind::Scalar, _) => GridSample::Scalar(self.channels[0][index]),
            (DataKind::Vector, Centering::FaceCentered) => {
                let mut v = [0.0; 3];
                for (axis, out) in v.iter_mut().enumerate() {
                    let size = self.face_size(axis);
                    let mut next = [i, j, k];
                    next[axis] += 1;
                    let lo = self.channels[axis][linear_index(size, i, j, k)];
                    let hi = self.channels[axis][linear_index(size, next[0], next[1], next[2])];
                    *out = 0.5 * (lo + hi);
                }
                GridSample::Vector(v.into())
            }
            (DataKind::Vector, _) => GridSample::Vector(Vec3::new(
                self.channels[0][index],
                self.channels[1][index],
                self.channels[2][index],
            )),
        })
    }

    fn require_scalar(&self) -> SimResult<()> {
        if self.kind != DataKind::Scalar {
            return Err(SimError::InvalidParameter {
                name: "data",
                reason: "operator needs scalar data".to_string(),
            });
        }
        Ok(())
    }
}

fn check_point(size: [usize; 3], i: usize, j: usize, k: usize) -> SimResult<()> {
    if i < size[0] && j < size[1] && k < size[2] {
        Ok(())
    } else {
        Err(SimError::InvalidParameter {
            name: "index",
            reason: format!("({i}, {j}, {k}) is outside {size:?}"),
        })
    }
}

#[derive(Clone, Debug)]
pub struct GridSystemData {
    geometry: GridGeometry,
    velocity: GridData,
    scalar_data: Vec<GridData>,
    vector_data: Vec<GridData>,
}

impl GridSystemData {
    pub fn new(geometry: GridGeometry) -> SimResult<Self> {
        let velocity = build_grid(Centering::FaceCentered, DataKind::Vector, geometry)?;
        Ok(Self {
            geometry,
            velocity,
            scalar_data: Vec::new(),
            vector_data: Vec::new(),
        })
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.geometry.bounding_box()
    }

    pub fn velocity(&self) -> &GridData {
        &self.velocity
    }

    pub fn velocity_mut(&mut self) -> &mut GridData {
        &mut self.velocity
    }

    pub fn scalar_data_count(&self) -> usize {
        self.scalar_data.len()
    }

    pub fn vector_data_count(&self) -> usize {
        self.vector_data.len()
    }

    pub fn add_scalar_data(&mut self, centering: Centering) -> SimResult<usize> {
        let layer = build_grid(centering, DataKind::Scalar, self.geometry)?;
        self.scalar_data.push(layer);
        Ok(self.scalar_data.len() - 1)
    }

    pub fn add_vector_data(&mut self, centering: Centering) -> SimResult<usize> {
        let layer = build_grid(centering, DataKind::Vector, self.geometry)?;
        self.vector_data.push(layer);
        Ok(self.vector_data.len() - 1)
    }

    pub fn scalar_data_at(&self, index: usize) -> Option<&GridData> {
        self.scalar_data.get(index)
    }

    pub fn scalar_data_at_mut(&mut self, index: usize) -> Option<&mut GridData> {
        self.scalar_data.get_mut(index)
    }

    pub fn vector_data_at(&self, index: usize) -> Option<&GridData> {
        self.vector_data.get(index)
    }

    pub fn vector_data_at_mut(&mut self, index: usize) -> Option<&mut GridData> {
        self.vector_data.get_mut(index)
    }

    pub fn resize(&mut self, geometry: GridGeometry) {
        self.geometry = geometry;
        self.velocity.resize(geometry);
        for layer in self.scalar_data.iter_mut().chain(self.vector_data.iter_mut()) {
            layer.resize(geometry);
        }
    }
}

/// Adds `dt·g` to every face component whose gravity exceeds [`GRAVITY_EPSILON`].
pub fn apply_gravity(velocity: &mut GridData, gravity: Vec3, dt: f32) -> SimResult<()> {
    if velocity.centering() != Centering::FaceCentered {
        return Err(SimError::InvalidCentering(velocity.centering()));
    }
    if gravity.length_squared() <= GRAVITY_EPSILON {
        return Ok(());
    }
    for axis in 0..3 {
        let g = gravity.axis(axis);
        if g.abs() > GRAVITY_EPSILON {
            let delta = dt * g;
            for value in velocity.channel_mut(axis) {
                *value += delta;
            }
        }
    }
    Ok(())
}

fn clamped(size: [usize; 3], i: usize, j: usize, k: usize, axis: usize, step: isize) -> usize {
    let mut p = [i, j, k];
    p[axis] = (p[axis] as isize + step).clamp(0, size[axis] as isize - 1) as usize;
    linear_index(size, p[0], p[1], p[2])
}

/// Central-difference gradient of scalar data, one-sided at the edges through
/// clamped indices. Output is vector data with the same centering.
pub fn grid_gradient(data: &GridData) -> SimResult<GridData> {
    data.require_scalar()?;
    let mut out = build_grid(data.centering(), DataKind::Vector, *data.geometry())?;
    let size = data.data_size();
    let spacing = data.geometry().spacing;
    let src = data.channel(0);
    for axis in 0..3 {
        let inv = 0.5 / spacing.axis(axis);
        let dst = out.channel_mut(axis);
        for k in 0..size[2] {
            for j in 0..size[1] {
                for i in 0..size[0] {
                    let hi = src[clamped(size, i, j, k, axis, 1)];
                    let lo = src[clamped(size, i, j, k, axis, -1)];
                    dst[linear_index(size, i, j, k)] = (hi - lo) * inv;
                }
            }
        }
    }
    Ok(out)
}

/// Seven-point Laplacian with zero-gradient edges.
pub fn grid_laplacian(data: &GridData) -> SimResult<GridData> {
    data.require_scalar()?;
    let mut out = build_grid(data.centering(), DataKind::Scalar, *data.geometry())?;
    let size = data.data_size();
    let spacing = data.geometry().spacing;
    let src = data.channel(0);
    let dst = out.channel_mut(0);
    for k in 0..size[2] {
        for j in 0..size[1] {
            for i in 0..size[0] {
                let center = src[linear_index(size, i, j, k)];
                let mut sum = 0.0;
                for axis in 0..3 {
                    let h = spacing.axis(axis);
                    let hi = src[clamped(size, i, j, k, axis, 1)];
                    let lo = src[clamped(size, i, j, k, axis, -1)];
                    sum += (hi - 2.0 * center + lo) / (h * h);
                }
                dst[linear_index(size, i, j, k)] = sum;
            }
        }
    }
    Ok(out)
}

/// Cell-centered divergence of face-centered velocity.
pub fn grid_divergence(velocity: &GridData) -> SimResult<GridData> {
    if velocity.centering() != Centering::FaceCentered {
        return Err(SimError::InvalidCentering(velocity.centering()));
    }
    let geometry = *velocity.geometry();
    let mut out = build_grid(Centering::CellCentered, DataKind::Scalar, geometry)?;
    let size = geometry.resolution;
    let dst = out.channel_mut(0);
    for k in 0..size[2] {
        for j in 0..size[1] {
            for i in 0..size[0] {
                let mut sum = 0.0;
                for axis in 0..3 {
                    let face = velocity.face_size(axis);
                    let mut next = [i, j, k];
                    next[axis] += 1;
                    let lo = velocity.channel(axis)[linear_index(face, i, j, k)];
                    let hi = velocity.channel(axis)[linear_index(face, next[0], next[1], next[2])];
                    sum += (hi - lo) / geometry.spacing.axis(axis);
                }
                dst[linear_index(size, i, j, k)] = sum;
            }
        }
    }
    Ok(out)
}
