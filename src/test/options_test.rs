use crate::cube::Vec3i;
use crate::error::NetworkError;
use crate::options::{OptionValue, Options};

#[test]
fn test_typed_accessors() {
    let record = Options::new()
        .with_str("name", "conv1")
        .with_uint("size", 3)
        .with_real("eta", 0.05)
        .with_vec3("stride", Vec3i::new(2, 2, 1))
        .with_bytes("filters", vec![1, 2, 3]);

    assert_eq!(record.require_str("name").unwrap(), "conv1");
    assert_eq!(record.require_usize("size").unwrap(), 3);
    assert_eq!(record.require_real("eta").unwrap(), 0.05);
    assert_eq!(record.require_vec3("stride").unwrap(), Vec3i::new(2, 2, 1));
    assert_eq!(record.require_bytes("filters").unwrap(), &[1, 2, 3]);
    assert!(record.contains("eta"));
    assert!(!record.contains("momentum"));
}

#[test]
fn test_missing_and_mistyped_keys() {
    let record = Options::new().with_str("name", "n").with_uint("size", 1);

    assert!(matches!(
        record.require_str("type"),
        Err(NetworkError::Config(_))
    ));
    // present but holding the wrong type
    assert!(matches!(
        record.require_vec3("name"),
        Err(NetworkError::Config(_))
    ));
    assert!(matches!(
        record.require_bytes("size"),
        Err(NetworkError::Config(_))
    ));
}

#[test]
fn test_optional_defaults() {
    let record = Options::new().with_real("eta", 0.2);
    assert_eq!(record.optional_real("eta", 0.1).unwrap(), 0.2);
    assert_eq!(record.optional_real("momentum", 0.0).unwrap(), 0.0);
    assert_eq!(
        record.optional_vec3("stride", Vec3i::ONE).unwrap(),
        Vec3i::ONE
    );
}

#[test]
fn test_integer_widens_to_real() {
    let record = Options::new().with_uint("eta", 1);
    assert_eq!(record.require_real("eta").unwrap(), 1.0);
}

#[test]
fn test_vec3_from_text() {
    let record = Options::new().with_str("stride", "2, 1,3");
    assert_eq!(record.require_vec3("stride").unwrap(), Vec3i::new(2, 1, 3));

    let bad = Options::new().with_str("stride", "2,1");
    assert!(matches!(
        bad.require_vec3("stride"),
        Err(NetworkError::Config(_))
    ));
}

#[test]
fn test_push_overwrites_in_place() {
    let mut record = Options::new()
        .with_str("name", "n")
        .with_real("eta", 0.1)
        .with_uint("size", 1);
    record.push("eta", OptionValue::Real(0.5));

    assert_eq!(record.require_real("eta").unwrap(), 0.5);
    // key order is stable under overwrite, so serialized forms stay comparable
    let a = serde_json::to_string(&record).unwrap();
    let expected = serde_json::to_string(
        &Options::new()
            .with_str("name", "n")
            .with_real("eta", 0.5)
            .with_uint("size", 1),
    )
    .unwrap();
    assert_eq!(a, expected);
}

#[test]
fn test_serde_roundtrip() {
    let record = Options::new()
        .with_str("name", "pool1")
        .with_str("type", "max_filter")
        .with_vec3("size", Vec3i::new(2, 2, 2))
        .with_bytes("blob", vec![0, 255, 7]);

    let json = serde_json::to_string(&record).unwrap();
    let decoded: Options = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, record);
}
