use crate::cube::{Cube, Vec3i};
use crate::error::NetworkError;
use crate::network::filter::{
    cubes_from_bytes, filters_to_bytes, reals_from_bytes, reals_to_bytes,
};
use crate::network::{Bias, Filter};
use approx::assert_abs_diff_eq;

#[test]
fn test_zero_eta_is_identity() {
    let size = Vec3i::new(2, 2, 2);
    let mut filter = Filter::new(size, 0.0, 0.9, 0.5);
    filter.set_weights(Cube::from_shape_fn(size.to_dim(), |(x, y, z)| {
        (x + y + z) as f64
    }));
    let before = filter.weights().clone();

    filter.update(&Cube::ones(size.to_dim()));
    assert_eq!(filter.weights(), &before);

    let mut bias = Bias::new(0.0, 0.9, 0.5);
    bias.set_value(1.5);
    bias.update(42.0);
    assert_abs_diff_eq!(bias.value(), 1.5, epsilon = 1e-12);
}

#[test]
fn test_plain_sgd_step() {
    // with mu = 0 and lambda = 0 the update is W <- W - eta * dW
    let size = Vec3i::new(2, 1, 1);
    let mut filter = Filter::new(size, 0.1, 0.0, 0.0);
    filter.set_weights(Cube::ones(size.to_dim()));

    let gradient = Cube::from_shape_fn(size.to_dim(), |(x, _, _)| (x + 1) as f64);
    filter.update(&gradient);

    assert_abs_diff_eq!(filter.weights()[[0, 0, 0]], 1.0 - 0.1, epsilon = 1e-12);
    assert_abs_diff_eq!(filter.weights()[[1, 0, 0]], 1.0 - 0.2, epsilon = 1e-12);
}

#[test]
fn test_momentum_accumulates() {
    // two identical steps: V1 = -eta*g, W1 = W0 + V1, V2 = mu*V1 - eta*g, W2 = W1 + V2
    let size = Vec3i::new(1, 1, 1);
    let mut filter = Filter::new(size, 0.1, 0.5, 0.0);
    let gradient = Cube::ones(size.to_dim());

    filter.update(&gradient);
    assert_abs_diff_eq!(filter.weights()[[0, 0, 0]], -0.1, epsilon = 1e-12);

    filter.update(&gradient);
    // V2 = 0.5 * -0.1 - 0.1 = -0.15, W2 = -0.1 - 0.15 = -0.25
    assert_abs_diff_eq!(filter.weights()[[0, 0, 0]], -0.25, epsilon = 1e-12);
}

#[test]
fn test_weight_decay_pulls_toward_zero() {
    let size = Vec3i::new(1, 1, 1);
    let mut filter = Filter::new(size, 0.1, 0.0, 0.5);
    filter.set_weights(Cube::from_elem(size.to_dim(), 2.0));

    // zero gradient: V = -eta * lambda * W = -0.1, W = 1.9
    filter.update(&Cube::zeros(size.to_dim()));
    assert_abs_diff_eq!(filter.weights()[[0, 0, 0]], 1.9, epsilon = 1e-12);
}

#[test]
fn test_bias_update_matches_filter_rule() {
    let mut bias = Bias::new(0.1, 0.5, 0.0);
    bias.update(1.0);
    assert_abs_diff_eq!(bias.value(), -0.1, epsilon = 1e-12);
    bias.update(1.0);
    assert_abs_diff_eq!(bias.value(), -0.25, epsilon = 1e-12);
}

#[test]
fn test_hyperparameters_take_effect_on_next_update() {
    let mut bias = Bias::new(0.1, 0.0, 0.0);
    bias.update(1.0);
    assert_abs_diff_eq!(bias.value(), -0.1, epsilon = 1e-12);

    bias.set_eta(1.0);
    bias.update(1.0);
    assert_abs_diff_eq!(bias.value(), -1.1, epsilon = 1e-12);
}

#[test]
fn test_real_blob_roundtrip() {
    let values = vec![0.0, -1.5, 3.25, f64::MIN_POSITIVE, 1e300];
    let bytes = reals_to_bytes(values.iter().copied());
    assert_eq!(bytes.len(), values.len() * 8);

    let decoded = reals_from_bytes(&bytes, values.len()).unwrap();
    assert_eq!(decoded, values);
}

#[test]
fn test_filter_blob_roundtrip() {
    let size = Vec3i::new(2, 2, 2);
    let mut filters = Vec::new();
    for k in 0..3 {
        let mut filter = Filter::new(size, 0.1, 0.0, 0.0);
        filter.set_weights(Cube::from_shape_fn(size.to_dim(), |(x, y, z)| {
            (k * 8 + x * 4 + y * 2 + z) as f64
        }));
        filters.push(filter);
    }

    let bytes = filters_to_bytes(&filters);
    let cubes = cubes_from_bytes(&bytes, 3, size).unwrap();
    for (filter, cube) in filters.iter().zip(&cubes) {
        assert_eq!(filter.weights(), cube);
    }
}

#[test]
fn test_blob_length_is_validated() {
    let bytes = vec![0u8; 24];
    assert!(matches!(
        reals_from_bytes(&bytes, 4),
        Err(NetworkError::Config(_))
    ));
    assert!(matches!(
        cubes_from_bytes(&bytes, 1, Vec3i::new(2, 2, 2)),
        Err(NetworkError::Config(_))
    ));
}
