use std::collections::HashMap;
use voxelflow::prelude::*;

/// Two-layer convolutional network with uniform-initialized filters.
fn two_layer_spec() -> (Vec<Options>, Vec<Options>) {
    let nodes = vec![
        Options::new()
            .with_str("name", "in")
            .with_str("type", "input")
            .with_uint("size", 1),
        Options::new()
            .with_str("name", "mid")
            .with_str("type", "transfer")
            .with_str("function", "tanh")
            .with_uint("size", 2),
        Options::new()
            .with_str("name", "out")
            .with_str("type", "transfer")
            .with_str("function", "linear")
            .with_uint("size", 1),
    ];
    let edges = vec![
        Options::new()
            .with_str("name", "c1")
            .with_str("type", "conv")
            .with_str("input", "in")
            .with_str("output", "mid")
            .with_vec3("size", Vec3i::new(3, 3, 3))
            .with_str("init", "uniform"),
        Options::new()
            .with_str("name", "c2")
            .with_str("type", "conv")
            .with_str("input", "mid")
            .with_str("output", "out")
            .with_vec3("size", Vec3i::new(2, 2, 2))
            .with_str("init", "uniform"),
    ];
    (nodes, edges)
}

#[test]
fn test_serialize_reconstruct_is_a_fixpoint() {
    let (nodes, edges) = two_layer_spec();
    let outsz = Vec3i::new(1, 1, 1);
    let net = Network::new(&nodes, &edges, outsz).unwrap();

    let first = net.serialize();
    let rebuilt = Network::from_spec(&first, outsz).unwrap();
    let second = rebuilt.serialize();

    // the echoed records, parameter blobs included, are bit-identical
    assert_eq!(first, second);
}

#[test]
fn test_serialized_blob_sizes() {
    let (nodes, edges) = two_layer_spec();
    let net = Network::new(&nodes, &edges, Vec3i::new(1, 1, 1)).unwrap();
    let spec = net.serialize();

    // 1x2 filters of 27 values each, 8 bytes per value
    let c1 = spec
        .edges
        .iter()
        .find(|o| o.require_str("name").unwrap() == "c1")
        .unwrap();
    assert_eq!(c1.require_bytes("filters").unwrap().len(), 2 * 27 * 8);

    // one bias per channel
    let mid = spec
        .nodes
        .iter()
        .find(|o| o.require_str("name").unwrap() == "mid")
        .unwrap();
    assert_eq!(mid.require_bytes("biases").unwrap().len(), 2 * 8);
}

#[test]
fn test_hyperparameter_setters_are_observable() {
    let (nodes, edges) = two_layer_spec();
    let mut net = Network::new(&nodes, &edges, Vec3i::new(1, 1, 1)).unwrap();

    net.set_eta(0.05);
    net.set_momentum(0.9);
    net.set_weight_decay(0.01);

    let spec = net.serialize();
    for record in spec.edges.iter().filter(|o| {
        o.require_str("type").unwrap() == "conv"
    }) {
        assert_eq!(record.require_real("eta").unwrap(), 0.05);
        assert_eq!(record.require_real("momentum").unwrap(), 0.9);
        assert_eq!(record.require_real("weight_decay").unwrap(), 0.01);
    }
    for record in spec.nodes.iter().filter(|o| {
        o.require_str("type").unwrap() == "transfer"
    }) {
        assert_eq!(record.require_real("eta").unwrap(), 0.05);
        assert_eq!(record.require_real("momentum").unwrap(), 0.9);
        assert_eq!(record.require_real("weight_decay").unwrap(), 0.01);
    }
}

#[test]
fn test_new_eta_drives_subsequent_updates() {
    let (nodes, edges) = two_layer_spec();
    let outsz = Vec3i::new(1, 1, 1);
    let mut net = Network::new(&nodes, &edges, outsz).unwrap();
    net.set_eta(0.0);

    let before = net.serialize();
    let input = Cube::from_shape_fn((4, 4, 4), |(x, y, z)| ((x + y + z) as f64).sin());
    net.forward(HashMap::from([("in".to_string(), vec![input])]))
        .unwrap();
    net.backward(HashMap::from([(
        "out".to_string(),
        vec![Cube::ones((1, 1, 1))],
    )]))
    .unwrap();

    // a zero learning rate makes the whole backward pass a parameter no-op
    assert_eq!(net.serialize(), before);
}

#[test]
fn test_spec_file_roundtrip() {
    let (nodes, edges) = two_layer_spec();
    let net = Network::new(&nodes, &edges, Vec3i::new(1, 1, 1)).unwrap();
    let spec = net.serialize();

    let path = std::env::temp_dir().join("voxelflow_spec_roundtrip.json");
    let path = path.to_str().unwrap();
    spec.save_to_path(path).unwrap();

    let loaded = NetworkSpec::load_from_path(path).unwrap();
    assert_eq!(loaded, spec);

    std::fs::remove_file(path).ok();
}

#[test]
fn test_trained_parameters_survive_reconstruction() {
    let (nodes, edges) = two_layer_spec();
    let outsz = Vec3i::new(1, 1, 1);
    let mut net = Network::new(&nodes, &edges, outsz).unwrap();

    // one training step perturbs filters and biases away from their init
    let input = Cube::from_shape_fn((4, 4, 4), |(x, y, z)| ((x * 2 + y * 3 + z) as f64).cos());
    net.forward(HashMap::from([("in".to_string(), vec![input.clone()])]))
        .unwrap();
    net.backward(HashMap::from([(
        "out".to_string(),
        vec![Cube::ones((1, 1, 1))],
    )]))
    .unwrap();
    let trained = net.serialize();

    // a reconstructed network carries the trained state and computes with it
    let mut rebuilt = Network::from_spec(&trained, outsz).unwrap();
    let a = net
        .forward(HashMap::from([("in".to_string(), vec![input.clone()])]))
        .unwrap();
    let b = rebuilt
        .forward(HashMap::from([("in".to_string(), vec![input])]))
        .unwrap();
    assert_eq!(a["out"][0].as_ref(), b["out"][0].as_ref());
}
