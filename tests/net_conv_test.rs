use approx::assert_abs_diff_eq;
use std::collections::HashMap;
use voxelflow::prelude::*;

fn reals_to_blob(values: &[f64]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn blob_to_reals(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(8)
        .map(|chunk| f64::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

fn filters_of(spec: &NetworkSpec, edge: &str) -> Vec<f64> {
    let record = spec
        .edges
        .iter()
        .find(|o| o.require_str("name").unwrap() == edge)
        .unwrap();
    blob_to_reals(record.require_bytes("filters").unwrap())
}

/// in -> conv(2x2x2, all-one weights) -> out(linear), solved for 1x1x1 output
fn single_convolution() -> Network {
    let nodes = vec![
        Options::new()
            .with_str("name", "in")
            .with_str("type", "input")
            .with_uint("size", 1),
        Options::new()
            .with_str("name", "out")
            .with_str("type", "transfer")
            .with_str("function", "linear")
            .with_uint("size", 1),
    ];
    let edges = vec![Options::new()
        .with_str("name", "conv1")
        .with_str("type", "conv")
        .with_str("input", "in")
        .with_str("output", "out")
        .with_vec3("size", Vec3i::new(2, 2, 2))
        .with_bytes("filters", reals_to_blob(&[1.0; 8]))];
    Network::new(&nodes, &edges, Vec3i::new(1, 1, 1)).unwrap()
}

#[test]
fn test_single_convolution_forward() {
    let mut net = single_convolution();
    assert_eq!(net.fov(), Vec3i::new(2, 2, 2));

    let input = Cube::from_shape_fn((2, 2, 2), |(x, y, z)| (x + 2 * y + 4 * z) as f64);
    let result = net
        .forward(HashMap::from([("in".to_string(), vec![input])]))
        .unwrap();

    // all-one kernel over values 0..7 sums to 28
    assert_eq!(result["out"][0].dim(), (1, 1, 1));
    assert_abs_diff_eq!(result["out"][0][[0, 0, 0]], 28.0, epsilon = 1e-12);
}

#[test]
fn test_single_convolution_weight_update() {
    let mut net = single_convolution();
    let input = Cube::from_shape_fn((2, 2, 2), |(x, y, z)| (x + 2 * y + 4 * z) as f64);

    net.forward(HashMap::from([("in".to_string(), vec![input.clone()])]))
        .unwrap();
    net.backward(HashMap::from([(
        "out".to_string(),
        vec![Cube::ones((1, 1, 1))],
    )]))
    .unwrap();

    // with a unit output gradient, dW equals the input: W <- 1 - 0.1 * C
    let spec = net.serialize();
    let weights = filters_of(&spec, "conv1");
    assert_eq!(weights.len(), 8);
    for x in 0..2 {
        for y in 0..2 {
            for z in 0..2 {
                let linear = (x * 2 + y) * 2 + z;
                assert_abs_diff_eq!(
                    weights[linear],
                    1.0 - 0.1 * input[[x, y, z]],
                    epsilon = 1e-12
                );
            }
        }
    }

    // the output bias saw the raw unit gradient
    let out = spec
        .nodes
        .iter()
        .find(|o| o.require_str("name").unwrap() == "out")
        .unwrap();
    let biases = blob_to_reals(out.require_bytes("biases").unwrap());
    assert_abs_diff_eq!(biases[0], -0.1, epsilon = 1e-12);
}

/// Cartesian wiring: a 2-channel input and a 3-channel output are joined by
/// 2x3 unit point filters, so every output is the sum of all inputs.
#[test]
fn test_cartesian_wiring() {
    let nodes = vec![
        Options::new()
            .with_str("name", "in")
            .with_str("type", "input")
            .with_uint("size", 2),
        Options::new()
            .with_str("name", "out")
            .with_str("type", "transfer")
            .with_str("function", "linear")
            .with_uint("size", 3),
    ];
    let edges = vec![Options::new()
        .with_str("name", "mix")
        .with_str("type", "conv")
        .with_str("input", "in")
        .with_str("output", "out")
        .with_vec3("size", Vec3i::new(1, 1, 1))
        .with_bytes("filters", reals_to_blob(&[1.0; 6]))];
    let mut net = Network::new(&nodes, &edges, Vec3i::new(1, 1, 1)).unwrap();

    let result = net
        .forward(HashMap::from([(
            "in".to_string(),
            vec![
                Cube::from_elem((1, 1, 1), 2.0),
                Cube::from_elem((1, 1, 1), 3.0),
            ],
        )]))
        .unwrap();

    assert_eq!(result["out"].len(), 3);
    for channel in &result["out"] {
        assert_abs_diff_eq!(channel[[0, 0, 0]], 5.0, epsilon = 1e-12);
    }
}

#[test]
fn test_backward_before_forward_is_rejected() {
    let mut net = single_convolution();
    let result = net.backward(HashMap::from([(
        "out".to_string(),
        vec![Cube::ones((1, 1, 1))],
    )]));
    assert!(matches!(result, Err(NetworkError::ProtocolViolation(_))));
}

#[test]
fn test_double_backward_is_rejected() {
    let mut net = single_convolution();
    let input = Cube::from_shape_fn((2, 2, 2), |(x, y, z)| (x + y + z) as f64);
    net.forward(HashMap::from([("in".to_string(), vec![input])]))
        .unwrap();

    let grads = HashMap::from([("out".to_string(), vec![Cube::ones((1, 1, 1))])]);
    net.backward(grads.clone()).unwrap();
    assert!(matches!(
        net.backward(grads),
        Err(NetworkError::ProtocolViolation(_))
    ));
}

#[test]
fn test_forward_without_intervening_backward_is_rejected() {
    let mut net = single_convolution();
    let sample = HashMap::from([(
        "in".to_string(),
        vec![Cube::from_shape_fn((2, 2, 2), |(x, y, z)| (x + y + z) as f64)],
    )]);

    net.forward(sample.clone()).unwrap();
    // the convolution edge still holds the retained input of sample one
    assert!(matches!(
        net.forward(sample),
        Err(NetworkError::ProtocolViolation(_))
    ));
}

#[test]
fn test_mismatched_inputs_are_rejected() {
    let mut net = single_convolution();

    // wrong node name
    let result = net.forward(HashMap::from([(
        "bogus".to_string(),
        vec![Cube::zeros((2, 2, 2))],
    )]));
    assert!(matches!(result, Err(NetworkError::ProtocolViolation(_))));

    // wrong channel count
    let result = net.forward(HashMap::from([(
        "in".to_string(),
        vec![Cube::zeros((2, 2, 2)), Cube::zeros((2, 2, 2))],
    )]));
    assert!(matches!(result, Err(NetworkError::ProtocolViolation(_))));

    // feature map the kernel cannot cover
    let result = net.forward(HashMap::from([(
        "in".to_string(),
        vec![Cube::zeros((1, 1, 1))],
    )]));
    assert!(matches!(result, Err(NetworkError::ShapeMismatch(_))));
}
