use crate::cube::Cube;
use crate::error::NetworkError;
use ndarray::Zip;

/// Transfer function enum, supporting Linear, Logistic, Tanh and Rectifier
///
/// A transfer node applies one of these per channel, folding the channel's
/// scalar bias into the nonlinearity: the applied function is `phi(x + b)`.
/// The gradient side expresses the derivative in terms of the post-activation
/// output, so only the forward result has to be retained between passes.
///
/// # Variants
///
/// - `Linear` - identity: `x + b`. Derivative is 1.
/// - `Logistic` - sigmoid `1 / (1 + e^-(x + b))`, with derivative `f * (1 - f)`.
/// - `Tanh` - hyperbolic tangent of `x + b`, with derivative `1 - f^2`.
/// - `Rectifier` - `max(x + b, 0)`, with derivative 1 where the output is
///   positive and 0 elsewhere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransferFunction {
    Linear,
    Logistic,
    Tanh,
    Rectifier,
}

impl TransferFunction {
    /// Resolves a transfer function from its option-record name.
    ///
    /// # Parameters
    ///
    /// * `name` - The value of the `function` node option
    ///
    /// # Returns
    ///
    /// - `Ok(TransferFunction)` - The named function
    /// - `Err(NetworkError::Config)` - If the name is not recognized
    pub fn from_name(name: &str) -> Result<Self, NetworkError> {
        match name {
            "linear" => Ok(TransferFunction::Linear),
            "logistic" | "logistics" | "sigmoid" => Ok(TransferFunction::Logistic),
            "tanh" => Ok(TransferFunction::Tanh),
            "rectifier" | "rectify_linear" | "relu" => Ok(TransferFunction::Rectifier),
            other => Err(NetworkError::Config(format!(
                "unknown transfer function: {}",
                other
            ))),
        }
    }

    /// Applies `phi(x + bias)` to the feature map in place.
    pub fn apply(&self, feature: &mut Cube, bias: f64) {
        match self {
            TransferFunction::Linear => {
                feature.par_mapv_inplace(|x| x + bias);
            }
            TransferFunction::Logistic => {
                feature.par_mapv_inplace(|x| 1.0 / (1.0 + (-(x + bias)).exp()));
            }
            TransferFunction::Tanh => {
                feature.par_mapv_inplace(|x| (x + bias).tanh());
            }
            TransferFunction::Rectifier => {
                feature.par_mapv_inplace(|x| (x + bias).max(0.0));
            }
        }
    }

    /// Multiplies the gradient element-wise by `phi'`, evaluated from the
    /// retained post-activation output of the matching forward pass.
    pub fn apply_grad(&self, grad: &mut Cube, output: &Cube) {
        match self {
            TransferFunction::Linear => {
                // phi' = 1
            }
            TransferFunction::Logistic => {
                Zip::from(grad)
                    .and(output)
                    .par_for_each(|g, &f| *g *= f * (1.0 - f));
            }
            TransferFunction::Tanh => {
                Zip::from(grad)
                    .and(output)
                    .par_for_each(|g, &f| *g *= 1.0 - f * f);
            }
            TransferFunction::Rectifier => {
                Zip::from(grad)
                    .and(output)
                    .par_for_each(|g, &f| *g *= if f > 0.0 { 1.0 } else { 0.0 });
            }
        }
    }
}
