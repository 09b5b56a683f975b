use crate::error::NetworkError;
use crate::options::Options;
use ndarray::Array1;
use ndarray_rand::RandomExt;
use rand_distr::{Normal, Uniform};

/// Initializer enum, supporting zero, constant, uniform and gaussian fills
///
/// Selected by the `init` option of a record whose parameter blob (`filters`
/// or `biases`) is absent, and used to produce the initial parameter values.
///
/// # Variants
///
/// - `Zero` - fills with `0.0`
/// - `Constant` - fills with a fixed `value`
/// - `Uniform` - samples from `[lower, upper)`
/// - `Gaussian` - samples from a normal distribution with `mean` and `sigma`
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Initializer {
    Zero,
    Constant { value: f64 },
    Uniform { lower: f64, upper: f64 },
    Gaussian { mean: f64, sigma: f64 },
}

impl Initializer {
    /// Resolves an initializer from an option record.
    ///
    /// Reads the `init` key plus the parameter keys of the named variant:
    /// `value` for `constant` (required), `lower`/`upper` for `uniform`
    /// (default `-0.1`/`0.1`), `mean`/`sigma` for `gaussian` (default
    /// `0.0`/`0.01`).
    ///
    /// # Parameters
    ///
    /// * `options` - The record naming the initializer
    ///
    /// # Returns
    ///
    /// - `Ok(Initializer)` - The configured initializer
    /// - `Err(NetworkError::Config)` - If `init` is absent, names an unknown
    ///   initializer, or its parameters are inconsistent
    pub fn from_options(options: &Options) -> Result<Self, NetworkError> {
        let name = options.require_str("init")?;
        match name {
            "zero" => Ok(Initializer::Zero),
            "constant" => Ok(Initializer::Constant {
                value: options.require_real("value")?,
            }),
            "uniform" => {
                let lower = options.optional_real("lower", -0.1)?;
                let upper = options.optional_real("upper", 0.1)?;
                if !(lower < upper) {
                    return Err(NetworkError::Config(format!(
                        "uniform initializer needs lower < upper, got [{}, {})",
                        lower, upper
                    )));
                }
                Ok(Initializer::Uniform { lower, upper })
            }
            "gaussian" => {
                let mean = options.optional_real("mean", 0.0)?;
                let sigma = options.optional_real("sigma", 0.01)?;
                if !sigma.is_finite() || sigma < 0.0 {
                    return Err(NetworkError::Config(format!(
                        "gaussian initializer needs a non-negative finite sigma, got {}",
                        sigma
                    )));
                }
                Ok(Initializer::Gaussian { mean, sigma })
            }
            other => Err(NetworkError::Config(format!(
                "unknown initializer: {}",
                other
            ))),
        }
    }

    /// Produces `n` initial parameter values.
    ///
    /// # Parameters
    ///
    /// * `n` - Number of values to produce
    ///
    /// # Returns
    ///
    /// - `Ok(Vec<f64>)` - The filled buffer
    /// - `Err(NetworkError::Config)` - If the distribution parameters are invalid
    pub fn fill(&self, n: usize) -> Result<Vec<f64>, NetworkError> {
        match *self {
            Initializer::Zero => Ok(vec![0.0; n]),
            Initializer::Constant { value } => Ok(vec![value; n]),
            Initializer::Uniform { lower, upper } => {
                Ok(Array1::random(n, Uniform::new(lower, upper)).to_vec())
            }
            Initializer::Gaussian { mean, sigma } => {
                let dist = Normal::new(mean, sigma).map_err(|e| {
                    NetworkError::Config(format!("invalid gaussian initializer: {}", e))
                })?;
                Ok(Array1::random(n, dist).to_vec())
            }
        }
    }
}
