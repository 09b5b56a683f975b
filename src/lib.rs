//! # voxelflow - A Dataflow Engine for Sparse 3D Convolutional Networks
//!
//! voxelflow is a single-threaded engine for dense image-to-image
//! convolutional networks over volumetric data. A network is a directed
//! acyclic graph whose vertices (node groups) hold multi-channel 3D feature
//! maps and whose edges apply a parameterized transformation between them:
//! sparse (dilated) convolution, max pooling, or identity pass-through.
//!
//! ## Overview
//!
//! The engine supports a forward pass, producing output feature maps from
//! input feature maps, and a backward pass, which propagates gradients and
//! updates every learnable parameter in place via SGD with momentum and
//! weight decay. Training-loop control (batching, schedules, validation) is
//! out of scope; the engine exposes per-sample passes and hyperparameter
//! setters.
//!
//! The defining trick is the geometry solved at construction time: pooling
//! does not subsample its output. Instead, the declared pooling stride is
//! propagated *forward* through the graph so that every downstream kernel
//! runs with a matching dilation (`in_stride`), and fields of view are
//! propagated *backward* from the outputs. Downstream convolutions therefore
//! see exactly the receptive-field arithmetic of a fully dense network
//! without any feature-map copying.
//!
//! ## Architecture
//!
//! - [`cube`] - the rank-3 feature-map type and componentwise 3-vector
//! - [`convolution`] - the sparse convolution kernel and its two adjoints
//! - [`pooling`] - max pooling with argmax tracking and its backprop
//! - [`transfer`] - the transfer-function family applied by transfer nodes
//! - [`init`] - parameter initializers (zero, constant, uniform, gaussian)
//! - [`options`] - the typed option records networks are built from
//! - [`network`] - node groups, edge groups, parameters, and the graph
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use voxelflow::prelude::*;
//! use std::collections::HashMap;
//!
//! // in -> conv(2x2x2) -> out, solved for 1x1x1 output maps
//! let nodes = vec![
//!     Options::new()
//!         .with_str("name", "in")
//!         .with_str("type", "input")
//!         .with_uint("size", 1),
//!     Options::new()
//!         .with_str("name", "out")
//!         .with_str("type", "transfer")
//!         .with_str("function", "linear")
//!         .with_uint("size", 1),
//! ];
//! let edges = vec![Options::new()
//!     .with_str("name", "conv1")
//!     .with_str("type", "conv")
//!     .with_str("input", "in")
//!     .with_str("output", "out")
//!     .with_vec3("size", Vec3i::new(2, 2, 2))
//!     .with_str("init", "uniform")];
//!
//! let mut net = Network::new(&nodes, &edges, Vec3i::new(1, 1, 1))?;
//! assert_eq!(net.fov(), Vec3i::new(2, 2, 2));
//!
//! // one training sample
//! let sample = HashMap::from([("in".to_string(), vec![Cube::zeros((2, 2, 2))])]);
//! let prediction = net.forward(sample)?;
//! let grads = HashMap::from([("out".to_string(), vec![Cube::ones((1, 1, 1))])]);
//! net.backward(grads)?;
//!
//! // persist the learned parameters
//! net.serialize().save_to_path("net.json")?;
//! ```

/// Module that contains the feature-map cube type and integer 3-vectors
pub mod cube;

/// Module that contains error types for network construction, propagation and persistence
pub mod error;

/// Module that contains the sparse 3D convolution kernel and its adjoints
///
/// Three pure functions cover one convolution edge's needs: the forward
/// product, the weight gradient, and the input gradient. All three take the
/// same sparsity stride (dilation), which the graph fixes per edge during
/// initialization.
pub mod convolution;

/// Module that contains sparse max pooling and its backpropagation
pub mod pooling;

/// Module that contains the transfer functions applied by transfer node groups
pub mod transfer;

/// Module that contains the parameter initializer family
pub mod init;

/// Module that contains the typed option records used to describe networks
pub mod options;

/// Module that contains the dataflow graph: node groups, edge groups,
/// learnable parameters, and the forward/backward drivers
pub mod network;

/// Module `prelude` re-exports the most commonly used types from this crate.
pub mod prelude;
