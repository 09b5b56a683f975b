use crate::cube::{Cube, Vec3i};
use crate::error::NetworkError;
use ndarray::Zip;

/// A learnable convolution kernel with its optimizer state.
///
/// Holds the weight cube, a momentum cube of the same shape, and the SGD
/// hyperparameters. The two cubes keep identical shapes for the lifetime of
/// the filter.
///
/// # Fields
///
/// - `weights` - The kernel values
/// - `momentum` - The running momentum buffer
/// - `eta` - Learning rate
/// - `mu` - Momentum factor; `0` reduces the update to plain SGD
/// - `lambda` - L2 weight-decay coefficient; `0` disables decay
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    weights: Cube,
    momentum: Cube,
    eta: f64,
    mu: f64,
    lambda: f64,
}

impl Filter {
    /// Creates a zero-valued filter of the given kernel shape.
    ///
    /// # Parameters
    ///
    /// - `size` - Kernel shape
    /// - `eta` - Learning rate
    /// - `mu` - Momentum factor
    /// - `lambda` - Weight-decay coefficient
    pub fn new(size: Vec3i, eta: f64, mu: f64, lambda: f64) -> Self {
        Filter {
            weights: Cube::zeros(size.to_dim()),
            momentum: Cube::zeros(size.to_dim()),
            eta,
            mu,
            lambda,
        }
    }

    pub fn weights(&self) -> &Cube {
        &self.weights
    }

    /// Replaces the kernel values and clears the momentum buffer.
    pub fn set_weights(&mut self, weights: Cube) {
        self.momentum = Cube::zeros(weights.dim());
        self.weights = weights;
    }

    /// Applies one momentum-SGD step in place:
    ///
    /// ```text
    /// V <- mu * V - eta * (dW + lambda * W)
    /// W <- W + V
    /// ```
    pub fn update(&mut self, gradient: &Cube) {
        debug_assert_eq!(self.weights.dim(), gradient.dim());
        let (eta, mu, lambda) = (self.eta, self.mu, self.lambda);
        Zip::from(&mut self.momentum)
            .and(&self.weights)
            .and(gradient)
            .for_each(|v, &w, &g| *v = mu * *v - eta * (g + lambda * w));
        self.weights += &self.momentum;
    }

    pub fn set_eta(&mut self, eta: f64) {
        self.eta = eta;
    }

    pub fn set_momentum(&mut self, mu: f64) {
        self.mu = mu;
    }

    pub fn set_weight_decay(&mut self, lambda: f64) {
        self.lambda = lambda;
    }
}

/// A learnable scalar bias with its optimizer state.
///
/// The scalar analogue of [`Filter`]: value, momentum, and the same
/// hyperparameter triple, with the same update rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bias {
    value: f64,
    momentum: f64,
    eta: f64,
    mu: f64,
    lambda: f64,
}

impl Bias {
    /// Creates a zero-valued bias.
    pub fn new(eta: f64, mu: f64, lambda: f64) -> Self {
        Bias {
            value: 0.0,
            momentum: 0.0,
            eta,
            mu,
            lambda,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn set_value(&mut self, value: f64) {
        self.value = value;
        self.momentum = 0.0;
    }

    /// Applies one momentum-SGD step in place, mirroring [`Filter::update`].
    pub fn update(&mut self, gradient: f64) {
        self.momentum = self.mu * self.momentum - self.eta * (gradient + self.lambda * self.value);
        self.value += self.momentum;
    }

    pub fn set_eta(&mut self, eta: f64) {
        self.eta = eta;
    }

    pub fn set_momentum(&mut self, mu: f64) {
        self.mu = mu;
    }

    pub fn set_weight_decay(&mut self, lambda: f64) {
        self.lambda = lambda;
    }
}

/// Encodes a sequence of real values as the persisted blob form: each value
/// 8 little-endian bytes, concatenated in order.
pub(crate) fn reals_to_bytes(values: impl Iterator<Item = f64>) -> Vec<u8> {
    let mut bytes = Vec::new();
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decodes a persisted blob of exactly `count` real values.
pub(crate) fn reals_from_bytes(bytes: &[u8], count: usize) -> Result<Vec<f64>, NetworkError> {
    if bytes.len() != count * 8 {
        return Err(NetworkError::Config(format!(
            "parameter blob holds {} bytes, expected {} for {} values",
            bytes.len(),
            count * 8,
            count
        )));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|chunk| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(chunk);
            f64::from_le_bytes(raw)
        })
        .collect())
}

/// Encodes the weight cubes of a filter store as one blob, filters in order,
/// each cube's values in the standard row-major layout.
pub(crate) fn filters_to_bytes(filters: &[Filter]) -> Vec<u8> {
    reals_to_bytes(filters.iter().flat_map(|f| f.weights().iter().copied()))
}

/// Decodes a filter blob into `count` weight cubes of shape `size`.
pub(crate) fn cubes_from_bytes(
    bytes: &[u8],
    count: usize,
    size: Vec3i,
) -> Result<Vec<Cube>, NetworkError> {
    let values = reals_from_bytes(bytes, count * size.volume())?;
    values
        .chunks_exact(size.volume())
        .map(|chunk| {
            Cube::from_shape_vec(size.to_dim(), chunk.to_vec())
                .map_err(|e| NetworkError::Config(format!("malformed filter blob: {}", e)))
        })
        .collect()
}
