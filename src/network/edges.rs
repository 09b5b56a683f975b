use super::filter::{cubes_from_bytes, filters_to_bytes, Filter};
use super::{EdgeId, GroupId, NodeId};
use crate::convolution::{convolve_sparse, convolve_sparse_flipped, convolve_sparse_inverse};
use crate::cube::{Cube, SharedCube, Vec3i};
use crate::error::NetworkError;
use crate::init::Initializer;
use crate::options::{OptionValue, Options};
use crate::pooling::{max_pool_backprop, max_pool_sparse};
use ndarray::Array3;

/// Identity edge: forwards copies of its input in both directions.
///
/// The copy keeps downstream accumulation from ever aliasing an upstream
/// buffer that other edges still read.
#[derive(Debug, Default)]
pub(crate) struct IdentityEdge;

impl IdentityEdge {
    pub(crate) fn forward(&self, feature: &Cube) -> Cube {
        feature.clone()
    }

    pub(crate) fn backward(&self, grad: &Cube) -> Cube {
        grad.clone()
    }
}

/// Max-pooling edge.
///
/// Retains the argmax cube and the input shape between the forward pass and
/// the matching backward pass; backward consumes them.
#[derive(Debug)]
pub(crate) struct MaxPoolingEdge {
    window: Vec3i,
    stride: Vec3i,
    input_size: Option<Vec3i>,
    indices: Option<Array3<usize>>,
}

impl MaxPoolingEdge {
    pub(crate) fn new(window: Vec3i, stride: Vec3i) -> Self {
        MaxPoolingEdge {
            window,
            stride,
            input_size: None,
            indices: None,
        }
    }

    pub(crate) fn forward(&mut self, feature: &Cube) -> Result<Cube, NetworkError> {
        self.input_size = Some(Vec3i::of(feature));
        let (values, indices) = max_pool_sparse(feature, self.window, self.stride)?;
        self.indices = Some(indices);
        Ok(values)
    }

    pub(crate) fn backward(&mut self, grad: &Cube) -> Result<Cube, NetworkError> {
        let input_size = self.input_size.take().ok_or_else(|| {
            NetworkError::ProtocolViolation(
                "pooling backward without a matching forward".to_string(),
            )
        })?;
        let indices = self.indices.take().ok_or_else(|| {
            NetworkError::ProtocolViolation(
                "pooling backward without a matching forward".to_string(),
            )
        })?;
        if (self.window - Vec3i::ONE) * self.stride + Vec3i::of(grad) != input_size {
            return Err(NetworkError::ShapeMismatch(format!(
                "pooling gradient of shape {} does not match forward input {}",
                Vec3i::of(grad),
                input_size
            )));
        }
        max_pool_backprop(input_size, grad, &indices)
    }
}

/// Convolution edge.
///
/// Holds a non-owning handle to a [`Filter`] in its edge group's store and the
/// dilation fixed at graph init. The forward input is retained as a shared
/// buffer until backward consumes it for the weight gradient.
#[derive(Debug)]
pub(crate) struct FilterEdge {
    stride: Vec3i,
    pub(crate) group: GroupId,
    pub(crate) index: usize,
    last_input: Option<SharedCube>,
}

impl FilterEdge {
    pub(crate) fn new(stride: Vec3i, group: GroupId, index: usize) -> Self {
        FilterEdge {
            stride,
            group,
            index,
            last_input: None,
        }
    }

    pub(crate) fn forward(
        &mut self,
        feature: &SharedCube,
        filter: &Filter,
    ) -> Result<Cube, NetworkError> {
        if self.last_input.is_some() {
            return Err(NetworkError::ProtocolViolation(
                "convolution forward for a new sample before the previous backward completed"
                    .to_string(),
            ));
        }
        self.last_input = Some(SharedCube::clone(feature));
        convolve_sparse(feature, filter.weights(), self.stride)
    }

    /// Computes the upstream gradient and, as a side effect, applies the
    /// weight-gradient update to the shared filter.
    pub(crate) fn backward(
        &mut self,
        grad: &Cube,
        filter: &mut Filter,
    ) -> Result<Cube, NetworkError> {
        let last_input = self.last_input.take().ok_or_else(|| {
            NetworkError::ProtocolViolation(
                "convolution backward without a retained forward input".to_string(),
            )
        })?;
        let grad_weights = convolve_sparse_flipped(&last_input, grad, self.stride)?;
        let grad_input = convolve_sparse_inverse(grad, filter.weights(), self.stride)?;
        filter.update(&grad_weights);
        Ok(grad_input)
    }
}

/// The kernel variants an individual edge can carry.
#[derive(Debug)]
pub(crate) enum EdgeKernel {
    Identity(IdentityEdge),
    MaxPooling(MaxPoolingEdge),
    Convolution(FilterEdge),
}

/// An oriented connection from one channel of an upstream node group to one
/// channel of a downstream node group.
#[derive(Debug)]
pub(crate) struct Edge {
    pub(crate) src: NodeId,
    pub(crate) src_channel: usize,
    pub(crate) dst: NodeId,
    pub(crate) dst_channel: usize,
    pub(crate) kernel: EdgeKernel,
}

/// Kind of an edge group, carrying the convolution filter store when present.
#[derive(Debug)]
pub(crate) enum EdgeGroupKind {
    Identity,
    MaxPooling,
    Convolution { filters: Vec<Filter> },
}

/// A named collection of edges wiring two node groups.
///
/// Records the declared window and stride for the geometry passes, and the
/// `in_stride`/`in_fsize` those passes compute. Convolution groups own one
/// filter per `(src_channel, dst_channel)` pair; pooling and identity groups
/// wire channels diagonally and own no parameters.
#[derive(Debug)]
pub(crate) struct EdgeGroup {
    pub(crate) name: String,
    pub(crate) src: NodeId,
    pub(crate) dst: NodeId,
    pub(crate) window: Vec3i,
    pub(crate) stride: Vec3i,
    pub(crate) in_stride: Vec3i,
    pub(crate) in_fsize: Vec3i,
    pub(crate) kind: EdgeGroupKind,
    pub(crate) options: Options,
    pub(crate) edges: Vec<EdgeId>,
}

impl EdgeGroup {
    /// Builds the group record from its option bag. The concrete kernels are
    /// instantiated later, once the geometry passes have fixed `in_stride`.
    pub(crate) fn from_options(
        options: &Options,
        src: NodeId,
        dst: NodeId,
    ) -> Result<Self, NetworkError> {
        let name = options.require_str("name")?.to_string();
        let (kind, window, stride) = match options.require_str("type")? {
            "conv" => (
                EdgeGroupKind::Convolution {
                    filters: Vec::new(),
                },
                options.require_vec3("size")?,
                options.optional_vec3("stride", Vec3i::ONE)?,
            ),
            "max_filter" => (
                EdgeGroupKind::MaxPooling,
                options.require_vec3("size")?,
                options.require_vec3("stride")?,
            ),
            "dummy" => (EdgeGroupKind::Identity, Vec3i::ONE, Vec3i::ONE),
            other => {
                return Err(NetworkError::Config(format!(
                    "unknown edge type: {}",
                    other
                )))
            }
        };
        Ok(EdgeGroup {
            name,
            src,
            dst,
            window,
            stride,
            in_stride: Vec3i::ZERO,
            in_fsize: Vec3i::ZERO,
            kind,
            options: options.clone(),
            edges: Vec::new(),
        })
    }

    /// Populates the filter store of a convolution group: one filter per
    /// `(src_channel, dst_channel)` pair in row-major order, loaded from the
    /// `filters` blob when present and from the named initializer otherwise.
    pub(crate) fn build_filters(&mut self, n: usize, m: usize) -> Result<(), NetworkError> {
        let EdgeGroupKind::Convolution { filters } = &mut self.kind else {
            return Ok(());
        };

        let eta = self.options.optional_real("eta", 0.1)?;
        let mu = self.options.optional_real("momentum", 0.0)?;
        let lambda = self.options.optional_real("weight_decay", 0.0)?;

        let count = n * m;
        let cubes = if self.options.contains("filters") {
            cubes_from_bytes(self.options.require_bytes("filters")?, count, self.window)?
        } else {
            let values = Initializer::from_options(&self.options)?
                .fill(count * self.window.volume())?;
            values
                .chunks_exact(self.window.volume())
                .map(|chunk| {
                    Cube::from_shape_vec(self.window.to_dim(), chunk.to_vec()).map_err(|e| {
                        NetworkError::Config(format!("malformed initializer fill: {}", e))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        filters.clear();
        for weights in cubes {
            let mut filter = Filter::new(self.window, eta, mu, lambda);
            filter.set_weights(weights);
            filters.push(filter);
        }
        Ok(())
    }

    pub(crate) fn set_eta(&mut self, eta: f64) {
        if let EdgeGroupKind::Convolution { filters } = &mut self.kind {
            self.options.push("eta", OptionValue::Real(eta));
            for filter in filters {
                filter.set_eta(eta);
            }
        }
    }

    pub(crate) fn set_momentum(&mut self, mu: f64) {
        if let EdgeGroupKind::Convolution { filters } = &mut self.kind {
            self.options.push("momentum", OptionValue::Real(mu));
            for filter in filters {
                filter.set_momentum(mu);
            }
        }
    }

    pub(crate) fn set_weight_decay(&mut self, lambda: f64) {
        if let EdgeGroupKind::Convolution { filters } = &mut self.kind {
            self.options
                .push("weight_decay", OptionValue::Real(lambda));
            for filter in filters {
                filter.set_weight_decay(lambda);
            }
        }
    }

    /// Echoes the construction-time record, with the current filter state
    /// written back into the `filters` blob for convolution groups.
    pub(crate) fn serialize(&self) -> Options {
        let mut options = self.options.clone();
        if let EdgeGroupKind::Convolution { filters } = &self.kind {
            options.push("filters", OptionValue::Bytes(filters_to_bytes(filters)));
        }
        options
    }
}
