use super::filter::{reals_from_bytes, reals_to_bytes, Bias};
use super::{EdgeId, GroupId};
use crate::cube::{Cube, SharedCube, Vec3i};
use crate::error::NetworkError;
use crate::init::Initializer;
use crate::options::{OptionValue, Options};
use crate::transfer::TransferFunction;

/// The behavioral variants of a node group.
///
/// # Variants
///
/// - `Input` - no in-edges; receives feature maps from the caller and
///   dispatches them; a sink on backward
/// - `Sum` - accumulates arrivals element-wise and forwards the sum
/// - `Transfer` - like `Sum`, but applies a per-channel nonlinearity with a
///   learnable bias after accumulation, and updates the bias on backward
#[derive(Debug)]
pub(crate) enum NodeKind {
    Input,
    Sum,
    Transfer {
        function: TransferFunction,
        biases: Vec<Bias>,
    },
}

/// A group of `size` parallel feature-map channels plus its wiring, its
/// per-pass accumulation state, and the geometry the init passes compute.
///
/// Channel `i` accumulates forward arrivals in `features[i]` and backward
/// arrivals in `gradients[i]`; `received[i]` counts arrivals within the
/// current pass and is zero between passes. `retained[i]` holds the
/// post-dispatch feature map where one is needed later: transfer channels
/// keep theirs until the matching backward consumes it, and terminal channels
/// keep theirs for collection by the caller.
#[derive(Debug)]
pub(crate) struct NodeGroup {
    pub(crate) name: String,
    pub(crate) size: usize,
    pub(crate) kind: NodeKind,
    pub(crate) in_edges: Vec<Vec<EdgeId>>,
    pub(crate) out_edges: Vec<Vec<EdgeId>>,
    pub(crate) in_groups: Vec<GroupId>,
    pub(crate) out_groups: Vec<GroupId>,
    pub(crate) received: Vec<usize>,
    pub(crate) features: Vec<Option<Cube>>,
    pub(crate) gradients: Vec<Option<Cube>>,
    pub(crate) retained: Vec<Option<SharedCube>>,
    pub(crate) fov: Vec3i,
    pub(crate) stride: Vec3i,
    pub(crate) fsize: Vec3i,
    pub(crate) options: Options,
}

impl NodeGroup {
    /// Builds a node group from its option bag, dispatching on the `type` key.
    pub(crate) fn from_options(options: &Options) -> Result<Self, NetworkError> {
        let name = options.require_str("name")?.to_string();
        let size = options.require_usize("size")?;
        if size == 0 {
            return Err(NetworkError::Config(format!(
                "node group `{}` has zero channels",
                name
            )));
        }

        let kind = match options.require_str("type")? {
            "input" => NodeKind::Input,
            "sum" => NodeKind::Sum,
            "transfer" => NodeKind::Transfer {
                function: TransferFunction::from_name(options.require_str("function")?)?,
                biases: Self::build_biases(options, size)?,
            },
            other => {
                return Err(NetworkError::Config(format!(
                    "unknown node type: {}",
                    other
                )))
            }
        };

        Ok(NodeGroup {
            name,
            size,
            kind,
            in_edges: vec![Vec::new(); size],
            out_edges: vec![Vec::new(); size],
            in_groups: Vec::new(),
            out_groups: Vec::new(),
            received: vec![0; size],
            features: vec![None; size],
            gradients: vec![None; size],
            retained: vec![None; size],
            fov: Vec3i::ZERO,
            stride: Vec3i::ZERO,
            fsize: Vec3i::ZERO,
            options: options.clone(),
        })
    }

    /// One bias per channel, loaded from the `biases` blob when present, from
    /// the named initializer when one is given, and zero otherwise.
    fn build_biases(options: &Options, size: usize) -> Result<Vec<Bias>, NetworkError> {
        let eta = options.optional_real("eta", 0.1)?;
        let mu = options.optional_real("momentum", 0.0)?;
        let lambda = options.optional_real("weight_decay", 0.0)?;

        let values = if options.contains("biases") {
            reals_from_bytes(options.require_bytes("biases")?, size)?
        } else if options.contains("init") {
            Initializer::from_options(options)?.fill(size)?
        } else {
            vec![0.0; size]
        };

        Ok(values
            .into_iter()
            .map(|v| {
                let mut bias = Bias::new(eta, mu, lambda);
                bias.set_value(v);
                bias
            })
            .collect())
    }

    pub(crate) fn is_input(&self) -> bool {
        matches!(self.kind, NodeKind::Input)
    }

    /// Accumulates one forward arrival on a channel.
    ///
    /// Returns the completed accumulator once every expected in-arrival has
    /// been summed (`Some`), and `None` while the channel is still filling.
    /// Input nodes expect exactly one external arrival per channel per pass.
    pub(crate) fn accumulate_forward(
        &mut self,
        channel: usize,
        cube: Cube,
    ) -> Result<Option<Cube>, NetworkError> {
        self.check_channel(channel)?;
        let expected = match self.kind {
            NodeKind::Input => 1,
            _ => self.in_edges[channel].len(),
        };
        Self::accumulate(
            &self.name,
            channel,
            expected,
            &mut self.received[channel],
            &mut self.features[channel],
            cube,
        )
    }

    /// Accumulates one backward arrival on a channel. A terminal channel (no
    /// out-edges) fires on its first arrival.
    pub(crate) fn accumulate_backward(
        &mut self,
        channel: usize,
        grad: Cube,
    ) -> Result<Option<Cube>, NetworkError> {
        self.check_channel(channel)?;
        let expected = self.out_edges[channel].len().max(1);
        Self::accumulate(
            &self.name,
            channel,
            expected,
            &mut self.received[channel],
            &mut self.gradients[channel],
            grad,
        )
    }

    fn accumulate(
        name: &str,
        channel: usize,
        expected: usize,
        received: &mut usize,
        buffer: &mut Option<Cube>,
        cube: Cube,
    ) -> Result<Option<Cube>, NetworkError> {
        if *received >= expected {
            return Err(NetworkError::ProtocolViolation(format!(
                "channel {} of node group `{}` received more contributions than its fan of {}",
                channel, name, expected
            )));
        }
        match buffer {
            None => *buffer = Some(cube),
            Some(acc) => {
                if acc.dim() != cube.dim() {
                    return Err(NetworkError::ShapeMismatch(format!(
                        "channel {} of node group `{}` accumulated {} against {}",
                        channel,
                        name,
                        Vec3i::of(acc),
                        Vec3i::of(&cube)
                    )));
                }
                *acc += &cube;
            }
        }
        *received += 1;
        if *received == expected {
            *received = 0;
            Ok(buffer.take())
        } else {
            Ok(None)
        }
    }

    /// The retained feature map of a terminal channel, for collection after a
    /// forward pass.
    pub(crate) fn collect_output(&self, channel: usize) -> Result<SharedCube, NetworkError> {
        self.retained[channel].clone().ok_or_else(|| {
            NetworkError::ProtocolViolation(format!(
                "channel {} of node group `{}` has no feature map to collect",
                channel, self.name
            ))
        })
    }

    pub(crate) fn set_eta(&mut self, eta: f64) {
        if let NodeKind::Transfer { biases, .. } = &mut self.kind {
            self.options.push("eta", OptionValue::Real(eta));
            for bias in biases {
                bias.set_eta(eta);
            }
        }
    }

    pub(crate) fn set_momentum(&mut self, mu: f64) {
        if let NodeKind::Transfer { biases, .. } = &mut self.kind {
            self.options.push("momentum", OptionValue::Real(mu));
            for bias in biases {
                bias.set_momentum(mu);
            }
        }
    }

    pub(crate) fn set_weight_decay(&mut self, lambda: f64) {
        if let NodeKind::Transfer { biases, .. } = &mut self.kind {
            self.options
                .push("weight_decay", OptionValue::Real(lambda));
            for bias in biases {
                bias.set_weight_decay(lambda);
            }
        }
    }

    /// Echoes the construction-time record, with the current bias state
    /// written back into the `biases` blob for transfer groups.
    pub(crate) fn serialize(&self) -> Options {
        let mut options = self.options.clone();
        if let NodeKind::Transfer { biases, .. } = &self.kind {
            options.push(
                "biases",
                OptionValue::Bytes(reals_to_bytes(biases.iter().map(|b| b.value()))),
            );
        }
        options
    }

    fn check_channel(&self, channel: usize) -> Result<(), NetworkError> {
        if channel >= self.size {
            return Err(NetworkError::ProtocolViolation(format!(
                "channel {} out of range for node group `{}` of size {}",
                channel, self.name, self.size
            )));
        }
        Ok(())
    }
}
