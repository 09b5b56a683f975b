use super::edges::{
    Edge, EdgeGroup, EdgeGroupKind, EdgeKernel, FilterEdge, IdentityEdge, MaxPoolingEdge,
};
use super::nodes::{NodeGroup, NodeKind};
use super::{EdgeId, GroupId, NodeId};
use crate::cube::{Cube, SharedCube, Vec3i};
use crate::error::{IoError, NetworkError};
use crate::options::Options;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use tracing::{debug, trace};

/// A convolutional dataflow graph.
///
/// The network owns every node group, edge group, and individual edge in flat
/// arenas; all cross-references between them are indices, so the graph's
/// lifetime dominates everything it wires together. Construction follows a
/// fixed recipe: node groups are created first, edge-group records second,
/// then two fixpoint passes compute each node group's sampling stride (from
/// the inputs) and field of view plus feature-map size (from the outputs),
/// and finally the concrete edge kernels are instantiated with the dilation
/// those passes fixed.
///
/// `forward` and `backward` are blocking, single-threaded passes over one
/// sample. Backward mutates every learnable parameter in place; a `forward`
/// for the next sample must not start before the matching `backward` has
/// completed, because convolution edges retain their forward input until
/// backward consumes it.
///
/// # Examples
/// ```rust,ignore
/// use voxelflow::prelude::*;
/// use std::collections::HashMap;
///
/// let nodes = vec![
///     Options::new()
///         .with_str("name", "in")
///         .with_str("type", "input")
///         .with_uint("size", 1),
///     Options::new()
///         .with_str("name", "out")
///         .with_str("type", "transfer")
///         .with_str("function", "linear")
///         .with_uint("size", 1),
/// ];
/// let edges = vec![Options::new()
///     .with_str("name", "conv1")
///     .with_str("type", "conv")
///     .with_str("input", "in")
///     .with_str("output", "out")
///     .with_vec3("size", Vec3i::new(2, 2, 2))
///     .with_str("init", "uniform")];
///
/// let mut net = Network::new(&nodes, &edges, Vec3i::new(1, 1, 1))?;
/// let sample = HashMap::from([("in".to_string(), vec![Cube::zeros((2, 2, 2))])]);
/// let prediction = net.forward(sample)?;
/// ```
pub struct Network {
    nodes: Vec<NodeGroup>,
    node_index: AHashMap<String, NodeId>,
    groups: Vec<EdgeGroup>,
    group_index: AHashMap<String, GroupId>,
    edges: Vec<Edge>,
    inputs: Vec<NodeId>,
    outputs: Vec<NodeId>,
}

/// The serializable description of a network: one option record per node
/// group and one per edge group, in construction order, with the learned
/// parameter blobs written back in.
///
/// Reconstructing a network from its own `NetworkSpec` (with the same output
/// size) reproduces the parameter state bit for bit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub nodes: Vec<Options>,
    pub edges: Vec<Options>,
}

impl NetworkSpec {
    /// Saves the description to a JSON file at the specified path.
    ///
    /// # Parameters
    ///
    /// * `path` - File path where the description will be saved
    ///
    /// # Returns
    ///
    /// - `Ok(())` - Description successfully saved to file
    /// - `Err(IoError::Io)` - File creation or write operation failed
    /// - `Err(IoError::Json)` - Serialization to JSON failed
    pub fn save_to_path(&self, path: &str) -> Result<(), IoError> {
        let file = File::create(path).map_err(IoError::Io)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(IoError::Json)?;
        writer.flush().map_err(IoError::Io)?;
        Ok(())
    }

    /// Loads a description from a JSON file at the specified path.
    ///
    /// # Parameters
    ///
    /// * `path` - File path from which to load the description
    ///
    /// # Returns
    ///
    /// - `Ok(Self)` - Successfully loaded description
    /// - `Err(IoError::Io)` - File not found or read operation failed
    /// - `Err(IoError::Json)` - The file does not hold a valid description
    pub fn load_from_path(path: &str) -> Result<Self, IoError> {
        let reader = BufReader::new(File::open(path).map_err(IoError::Io)?);
        serde_json::from_reader(reader).map_err(IoError::Json)
    }
}

impl Network {
    /// Builds a network from its node and edge records and the output
    /// feature-map size the geometry should be solved for.
    ///
    /// # Parameters
    ///
    /// - `node_options` - One record per node group
    /// - `edge_options` - One record per edge group
    /// - `outsz` - Spatial size of the output feature maps
    ///
    /// # Returns
    ///
    /// - `Ok(Network)` - The initialized network
    /// - `Err(NetworkError::Config)` - A record is malformed or inconsistent
    /// - `Err(NetworkError::ShapeMismatch)` - The declared topology admits no
    ///   consistent geometry
    pub fn new(
        node_options: &[Options],
        edge_options: &[Options],
        outsz: Vec3i,
    ) -> Result<Self, NetworkError> {
        let mut net = Network {
            nodes: Vec::new(),
            node_index: AHashMap::new(),
            groups: Vec::new(),
            group_index: AHashMap::new(),
            edges: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        };
        for options in node_options {
            net.add_node_group(options)?;
        }
        for options in edge_options {
            net.add_edge_group(options)?;
        }
        net.init(outsz)?;
        net.create_edges()?;
        Ok(net)
    }

    /// Builds a network from a serialized description.
    pub fn from_spec(spec: &NetworkSpec, outsz: Vec3i) -> Result<Self, NetworkError> {
        Network::new(&spec.nodes, &spec.edges, outsz)
    }

    fn add_node_group(&mut self, options: &Options) -> Result<(), NetworkError> {
        let node = NodeGroup::from_options(options)?;
        if self.node_index.contains_key(&node.name) {
            return Err(NetworkError::Config(format!(
                "duplicate node group name: {}",
                node.name
            )));
        }
        let id = self.nodes.len();
        self.node_index.insert(node.name.clone(), id);
        if node.is_input() {
            self.inputs.push(id);
        }
        self.nodes.push(node);
        Ok(())
    }

    fn add_edge_group(&mut self, options: &Options) -> Result<(), NetworkError> {
        let src = self.lookup_node(options.require_str("input")?)?;
        let dst = self.lookup_node(options.require_str("output")?)?;
        if self.nodes[dst].is_input() {
            return Err(NetworkError::Config(format!(
                "edge group `{}` targets input node group `{}`",
                options.require_str("name")?,
                self.nodes[dst].name
            )));
        }
        let group = EdgeGroup::from_options(options, src, dst)?;
        if self.group_index.contains_key(&group.name) {
            return Err(NetworkError::Config(format!(
                "duplicate edge group name: {}",
                group.name
            )));
        }
        let id = self.groups.len();
        self.group_index.insert(group.name.clone(), id);
        self.nodes[src].out_groups.push(id);
        self.nodes[dst].in_groups.push(id);
        self.groups.push(group);
        Ok(())
    }

    /// Solves the graph geometry: output node groups are derived, strides are
    /// propagated forward from the inputs, and fields of view backward from
    /// the outputs. Every node group must come out with positive geometry.
    fn init(&mut self, outsz: Vec3i) -> Result<(), NetworkError> {
        for (id, node) in self.nodes.iter().enumerate() {
            if node.out_groups.is_empty() {
                self.outputs.push(id);
            }
        }
        if self.inputs.is_empty() {
            return Err(NetworkError::Config(
                "network has no input node groups".to_string(),
            ));
        }
        if self.outputs.is_empty() {
            return Err(NetworkError::Config(
                "network has no output node groups".to_string(),
            ));
        }

        for id in self.inputs.clone() {
            self.stride_pass(id, Vec3i::ONE)?;
        }
        for id in self.outputs.clone() {
            self.fov_pass(id, Vec3i::ONE, outsz)?;
        }

        for node in &self.nodes {
            if node.stride == Vec3i::ZERO || node.fov == Vec3i::ZERO {
                return Err(NetworkError::ShapeMismatch(format!(
                    "node group `{}` is not connected between inputs and outputs",
                    node.name
                )));
            }
            debug!(
                "node group `{}`: fov {}, stride {}, fsize {}",
                node.name, node.fov, node.stride, node.fsize
            );
        }
        for group in &self.groups {
            trace!(
                "edge group `{}`: window {}, stride {}, in_stride {}, in_fsize {}",
                group.name,
                group.window,
                group.stride,
                group.in_stride,
                group.in_fsize
            );
        }
        Ok(())
    }

    /// Forward fixpoint: a node group's sampling stride is the product of the
    /// edge strides on any path from an input; every path must agree.
    fn stride_pass(&mut self, id: NodeId, stride: Vec3i) -> Result<(), NetworkError> {
        let node = &mut self.nodes[id];
        if node.stride != Vec3i::ZERO {
            if node.stride != stride {
                return Err(NetworkError::ShapeMismatch(format!(
                    "node group `{}` reached with stride {} after {}",
                    node.name, stride, node.stride
                )));
            }
            return Ok(());
        }
        node.stride = stride;
        for gid in node.out_groups.clone() {
            self.groups[gid].in_stride = stride;
            let next = stride * self.groups[gid].stride;
            let dst = self.groups[gid].dst;
            self.stride_pass(dst, next)?;
        }
        Ok(())
    }

    /// Backward fixpoint: fields of view and feature-map sizes grow from the
    /// outputs toward the inputs; every path must agree exactly.
    fn fov_pass(&mut self, id: NodeId, fov: Vec3i, fsize: Vec3i) -> Result<(), NetworkError> {
        {
            let node = &self.nodes[id];
            if node.fov != Vec3i::ZERO {
                if node.fov != fov || node.fsize != fsize {
                    return Err(NetworkError::ShapeMismatch(format!(
                        "node group `{}` reached with fov {} / fsize {} after fov {} / fsize {}",
                        node.name, fov, fsize, node.fov, node.fsize
                    )));
                }
                return Ok(());
            }
        }
        for gid in self.nodes[id].out_groups.clone() {
            self.groups[gid].in_fsize = fsize;
        }
        self.nodes[id].fov = fov;
        self.nodes[id].fsize = fsize;
        for gid in self.nodes[id].in_groups.clone() {
            let (window, stride, in_stride, src) = {
                let group = &self.groups[gid];
                (group.window, group.stride, group.in_stride, group.src)
            };
            let next_fov = (fov - Vec3i::ONE) * stride + window;
            let next_fsize = (window - Vec3i::ONE) * in_stride + fsize;
            self.fov_pass(src, next_fov, next_fsize)?;
        }
        Ok(())
    }

    /// Instantiates the concrete edge kernels now that every edge group's
    /// dilation (`in_stride`) is known: a full cartesian product of
    /// convolution edges, or a diagonal of pooling/identity edges.
    fn create_edges(&mut self) -> Result<(), NetworkError> {
        for gid in 0..self.groups.len() {
            let (src, dst, window, in_stride) = {
                let group = &self.groups[gid];
                (group.src, group.dst, group.window, group.in_stride)
            };
            let n = self.nodes[src].size;
            let m = self.nodes[dst].size;

            if matches!(self.groups[gid].kind, EdgeGroupKind::Convolution { .. }) {
                self.groups[gid].build_filters(n, m)?;
                let mut k = 0;
                for i in 0..n {
                    for j in 0..m {
                        let kernel = EdgeKernel::Convolution(FilterEdge::new(in_stride, gid, k));
                        self.attach_edge(gid, src, i, dst, j, kernel);
                        k += 1;
                    }
                }
            } else {
                let identity = matches!(self.groups[gid].kind, EdgeGroupKind::Identity);
                self.require_diagonal(gid, n, m)?;
                for i in 0..n {
                    let kernel = if identity {
                        EdgeKernel::Identity(IdentityEdge)
                    } else {
                        EdgeKernel::MaxPooling(MaxPoolingEdge::new(window, in_stride))
                    };
                    self.attach_edge(gid, src, i, dst, i, kernel);
                }
            }
        }
        Ok(())
    }

    fn require_diagonal(&self, gid: GroupId, n: usize, m: usize) -> Result<(), NetworkError> {
        if n != m {
            return Err(NetworkError::Config(format!(
                "edge group `{}` wires channels one-to-one but connects node groups of sizes {} and {}",
                self.groups[gid].name, n, m
            )));
        }
        Ok(())
    }

    fn attach_edge(
        &mut self,
        gid: GroupId,
        src: NodeId,
        src_channel: usize,
        dst: NodeId,
        dst_channel: usize,
        kernel: EdgeKernel,
    ) {
        let eid = self.edges.len();
        self.edges.push(Edge {
            src,
            src_channel,
            dst,
            dst_channel,
            kernel,
        });
        self.groups[gid].edges.push(eid);
        self.nodes[src].out_edges[src_channel].push(eid);
        self.nodes[dst].in_edges[dst_channel].push(eid);
    }

    fn lookup_node(&self, name: &str) -> Result<NodeId, NetworkError> {
        self.node_index.get(name).copied().ok_or_else(|| {
            NetworkError::Config(format!("edge references unknown node group: {}", name))
        })
    }

    /// Runs one forward pass.
    ///
    /// # Parameters
    ///
    /// * `inputs` - One entry per input node group, each carrying one cube per
    ///   channel
    ///
    /// # Returns
    ///
    /// - `Ok(map)` - One entry per output node group: the post-activation
    ///   feature-map vector, shared by reference with the network's state.
    ///   Callers must not hold the references across subsequent passes.
    /// - `Err(NetworkError)` - The inputs do not match the input node groups,
    ///   or a kernel rejected a feature-map shape
    pub fn forward(
        &mut self,
        inputs: HashMap<String, Vec<Cube>>,
    ) -> Result<HashMap<String, Vec<SharedCube>>, NetworkError> {
        trace!("forward pass over {} input node groups", inputs.len());
        if inputs.len() != self.inputs.len() {
            return Err(NetworkError::ProtocolViolation(format!(
                "expected {} input node groups, got {}",
                self.inputs.len(),
                inputs.len()
            )));
        }
        for (name, cubes) in inputs {
            let id = *self.node_index.get(&name).ok_or_else(|| {
                NetworkError::ProtocolViolation(format!("unknown input node group: {}", name))
            })?;
            if !self.nodes[id].is_input() {
                return Err(NetworkError::ProtocolViolation(format!(
                    "node group `{}` is not an input",
                    name
                )));
            }
            if cubes.len() != self.nodes[id].size {
                return Err(NetworkError::ProtocolViolation(format!(
                    "input `{}` carries {} channels, the node group has {}",
                    name,
                    cubes.len(),
                    self.nodes[id].size
                )));
            }
            for (channel, cube) in cubes.into_iter().enumerate() {
                self.node_forward(id, channel, cube)?;
            }
        }

        let mut result = HashMap::new();
        for &id in &self.outputs {
            let node = &self.nodes[id];
            let maps = (0..node.size)
                .map(|channel| node.collect_output(channel))
                .collect::<Result<Vec<_>, _>>()?;
            result.insert(node.name.clone(), maps);
        }
        Ok(result)
    }

    /// Runs one backward pass, updating every learnable parameter in place.
    ///
    /// # Parameters
    ///
    /// * `gradients` - One entry per output node group, each carrying one
    ///   gradient cube per channel
    ///
    /// # Returns
    ///
    /// - `Ok(map)` - One empty entry per input node group; the pass's effect
    ///   is the in-place parameter update
    /// - `Err(NetworkError)` - The gradients do not match the output node
    ///   groups, or the accumulation protocol was violated
    pub fn backward(
        &mut self,
        gradients: HashMap<String, Vec<Cube>>,
    ) -> Result<HashMap<String, Vec<Cube>>, NetworkError> {
        trace!("backward pass over {} output node groups", gradients.len());
        if gradients.len() != self.outputs.len() {
            return Err(NetworkError::ProtocolViolation(format!(
                "expected {} output node groups, got {}",
                self.outputs.len(),
                gradients.len()
            )));
        }
        for (name, grads) in gradients {
            let id = *self.node_index.get(&name).ok_or_else(|| {
                NetworkError::ProtocolViolation(format!("unknown output node group: {}", name))
            })?;
            if !self.outputs.contains(&id) {
                return Err(NetworkError::ProtocolViolation(format!(
                    "node group `{}` is not an output",
                    name
                )));
            }
            if grads.len() != self.nodes[id].size {
                return Err(NetworkError::ProtocolViolation(format!(
                    "gradient `{}` carries {} channels, the node group has {}",
                    name,
                    grads.len(),
                    self.nodes[id].size
                )));
            }
            for (channel, grad) in grads.into_iter().enumerate() {
                self.node_backward(id, channel, grad)?;
            }
        }

        let mut result = HashMap::new();
        for &id in &self.inputs {
            result.insert(self.nodes[id].name.clone(), Vec::new());
        }
        Ok(result)
    }

    /// Delivers one forward arrival to a node-group channel; when the channel
    /// completes, applies the transfer hook and fires the out-edges.
    fn node_forward(
        &mut self,
        id: NodeId,
        channel: usize,
        cube: Cube,
    ) -> Result<(), NetworkError> {
        let Some(mut buffer) = self.nodes[id].accumulate_forward(channel, cube)? else {
            return Ok(());
        };
        let node = &mut self.nodes[id];
        if let NodeKind::Transfer { function, biases } = &node.kind {
            function.apply(&mut buffer, biases[channel].value());
        }
        let shared = SharedCube::new(buffer);
        // transfer channels keep their map for backward, terminal channels for collection
        let retain = matches!(node.kind, NodeKind::Transfer { .. })
            || node.out_edges[channel].is_empty();
        node.retained[channel] = retain.then(|| SharedCube::clone(&shared));
        for eid in node.out_edges[channel].clone() {
            self.edge_forward(eid, &shared)?;
        }
        Ok(())
    }

    /// Delivers one backward arrival to a node-group channel; when the channel
    /// completes, applies the transfer gradient hook, updates the channel
    /// bias, and fires the in-edges. Input groups absorb gradients silently.
    fn node_backward(
        &mut self,
        id: NodeId,
        channel: usize,
        grad: Cube,
    ) -> Result<(), NetworkError> {
        if self.nodes[id].is_input() {
            return Ok(());
        }
        let Some(mut buffer) = self.nodes[id].accumulate_backward(channel, grad)? else {
            return Ok(());
        };
        let node = &mut self.nodes[id];
        match &mut node.kind {
            NodeKind::Transfer { function, biases } => {
                let output = node.retained[channel].take().ok_or_else(|| {
                    NetworkError::ProtocolViolation(format!(
                        "backward before forward on channel {} of node group `{}`",
                        channel, node.name
                    ))
                })?;
                function.apply_grad(&mut buffer, &output);
                biases[channel].update(buffer.sum());
            }
            _ => {
                node.retained[channel] = None;
            }
        }
        let shared = SharedCube::new(buffer);
        for eid in node.in_edges[channel].clone() {
            self.edge_backward(eid, &shared)?;
        }
        Ok(())
    }

    fn edge_forward(&mut self, eid: EdgeId, feature: &SharedCube) -> Result<(), NetworkError> {
        let (dst, channel, output) = {
            let edge = &mut self.edges[eid];
            let output = match &mut edge.kernel {
                EdgeKernel::Identity(kernel) => kernel.forward(feature.as_ref()),
                EdgeKernel::MaxPooling(kernel) => kernel.forward(feature.as_ref())?,
                EdgeKernel::Convolution(kernel) => {
                    let EdgeGroupKind::Convolution { filters } = &self.groups[kernel.group].kind
                    else {
                        return Err(NetworkError::ProtocolViolation(
                            "convolution edge without a filter store".to_string(),
                        ));
                    };
                    kernel.forward(feature, &filters[kernel.index])?
                }
            };
            (edge.dst, edge.dst_channel, output)
        };
        self.node_forward(dst, channel, output)
    }

    fn edge_backward(&mut self, eid: EdgeId, grad: &SharedCube) -> Result<(), NetworkError> {
        let (src, channel, output) = {
            let edge = &mut self.edges[eid];
            let output = match &mut edge.kernel {
                EdgeKernel::Identity(kernel) => kernel.backward(grad.as_ref()),
                EdgeKernel::MaxPooling(kernel) => kernel.backward(grad.as_ref())?,
                EdgeKernel::Convolution(kernel) => {
                    let EdgeGroupKind::Convolution { filters } =
                        &mut self.groups[kernel.group].kind
                    else {
                        return Err(NetworkError::ProtocolViolation(
                            "convolution edge without a filter store".to_string(),
                        ));
                    };
                    kernel.backward(grad.as_ref(), &mut filters[kernel.index])?
                }
            };
            (edge.src, edge.src_channel, output)
        };
        self.node_backward(src, channel, output)
    }

    /// Broadcasts a new learning rate to every filter and bias.
    pub fn set_eta(&mut self, eta: f64) {
        for group in &mut self.groups {
            group.set_eta(eta);
        }
        for node in &mut self.nodes {
            node.set_eta(eta);
        }
    }

    /// Broadcasts a new momentum factor to every filter and bias.
    pub fn set_momentum(&mut self, mu: f64) {
        for group in &mut self.groups {
            group.set_momentum(mu);
        }
        for node in &mut self.nodes {
            node.set_momentum(mu);
        }
    }

    /// Broadcasts a new weight-decay coefficient to every filter and bias.
    pub fn set_weight_decay(&mut self, lambda: f64) {
        for group in &mut self.groups {
            group.set_weight_decay(lambda);
        }
        for node in &mut self.nodes {
            node.set_weight_decay(lambda);
        }
    }

    /// The input-side field of view solved at construction time: the extent
    /// of the input window that influences a single output cell.
    pub fn fov(&self) -> Vec3i {
        self.nodes[self.inputs[0]].fov
    }

    /// Serializes the network back into its construction records, with the
    /// learned `filters` and `biases` blobs overwritten from current state.
    pub fn serialize(&self) -> NetworkSpec {
        NetworkSpec {
            nodes: self.nodes.iter().map(|n| n.serialize()).collect(),
            edges: self.groups.iter().map(|g| g.serialize()).collect(),
        }
    }
}
