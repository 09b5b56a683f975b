/// Error types that can occur while constructing or running a network
///
/// # Variants
///
/// - `Config` - a construction record is malformed: unknown node or edge type,
///   missing or mistyped option, duplicate name, or a reference to a node group
///   that does not exist
/// - `ShapeMismatch` - a kernel would produce a non-positive output shape, or the
///   geometry passes found conflicting stride/field-of-view values on a revisited
///   node group
/// - `ProtocolViolation` - the accumulation protocol was broken at runtime, which
///   indicates a graph-construction bug; the current pass is aborted and the
///   network state is undefined
#[derive(Debug, Clone, PartialEq)]
pub enum NetworkError {
    Config(String),
    ShapeMismatch(String),
    ProtocolViolation(String),
}

impl std::fmt::Display for NetworkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkError::Config(msg) => write!(f, "Configuration error: {}", msg),
            NetworkError::ShapeMismatch(msg) => write!(f, "Shape mismatch: {}", msg),
            NetworkError::ProtocolViolation(msg) => {
                write!(f, "Propagation protocol violation: {}", msg)
            }
        }
    }
}

impl std::error::Error for NetworkError {}

/// Error types that can occur while persisting a network description
///
/// A network round-trips through its `NetworkSpec` as a JSON file; these are
/// the two ways that trip can fail.
///
/// # Variants
///
/// - `Io` - the description file could not be created, read, or written
/// - `Json` - the description could not be encoded as JSON, or the file does
///   not hold a valid JSON network description
#[derive(Debug)]
pub enum IoError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl std::fmt::Display for IoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IoError::Io(e) => write!(f, "network description file error: {}", e),
            IoError::Json(e) => write!(f, "network description JSON error: {}", e),
        }
    }
}

impl std::error::Error for IoError {}
