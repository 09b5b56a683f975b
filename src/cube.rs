use ndarray::Array3;
use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Sub};
use std::str::FromStr;
use std::sync::Arc;

/// Type alias for the rank-3 dense arrays used as feature maps throughout the engine
pub type Cube = Array3<f64>;

/// A feature map frozen for dispatch: single writer while accumulating, many
/// readers once handed to downstream edges.
pub type SharedCube = Arc<Cube>;

/// A componentwise integer 3-vector.
///
/// Used for every piece of 3D geometry in the engine: feature-map shapes,
/// kernel windows, strides, and fields of view. Arithmetic is componentwise;
/// `ZERO` doubles as the "not yet computed" sentinel during graph
/// initialization, since every valid geometry value is positive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vec3i {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl Vec3i {
    pub const ZERO: Vec3i = Vec3i { x: 0, y: 0, z: 0 };
    pub const ONE: Vec3i = Vec3i { x: 1, y: 1, z: 1 };

    pub fn new(x: usize, y: usize, z: usize) -> Self {
        Vec3i { x, y, z }
    }

    /// Shape of a cube as a `Vec3i`.
    pub fn of(cube: &Cube) -> Self {
        let (x, y, z) = cube.dim();
        Vec3i { x, y, z }
    }

    /// The dimension tuple accepted by `ndarray` constructors.
    pub fn to_dim(self) -> (usize, usize, usize) {
        (self.x, self.y, self.z)
    }

    /// Number of elements in a cube of this shape.
    pub fn volume(self) -> usize {
        self.x * self.y * self.z
    }

    /// Linear index of `(x, y, z)` in a cube of this shape, in the standard
    /// row-major layout `ndarray` uses for freshly allocated arrays.
    pub fn linear_index(self, x: usize, y: usize, z: usize) -> usize {
        (x * self.y + y) * self.z + z
    }

    /// Inverse of [`linear_index`](Self::linear_index).
    pub fn from_linear_index(self, index: usize) -> (usize, usize, usize) {
        let z = index % self.z;
        let y = (index / self.z) % self.y;
        let x = index / (self.y * self.z);
        (x, y, z)
    }
}

impl Add for Vec3i {
    type Output = Vec3i;

    fn add(self, rhs: Vec3i) -> Vec3i {
        Vec3i::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3i {
    type Output = Vec3i;

    fn sub(self, rhs: Vec3i) -> Vec3i {
        Vec3i::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul for Vec3i {
    type Output = Vec3i;

    fn mul(self, rhs: Vec3i) -> Vec3i {
        Vec3i::new(self.x * rhs.x, self.y * rhs.y, self.z * rhs.z)
    }
}

impl Mul<usize> for Vec3i {
    type Output = Vec3i;

    fn mul(self, rhs: usize) -> Vec3i {
        Vec3i::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl From<(usize, usize, usize)> for Vec3i {
    fn from(t: (usize, usize, usize)) -> Self {
        Vec3i::new(t.0, t.1, t.2)
    }
}

impl std::fmt::Display for Vec3i {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{},{}", self.x, self.y, self.z)
    }
}

impl FromStr for Vec3i {
    type Err = String;

    /// Parses the `"x,y,z"` form used in textual option values.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(format!("expected three comma-separated integers, got `{}`", s));
        }
        let parse = |p: &str| {
            p.parse::<usize>()
                .map_err(|_| format!("invalid integer `{}` in `{}`", p, s))
        };
        Ok(Vec3i::new(parse(parts[0])?, parse(parts[1])?, parse(parts[2])?))
    }
}
