use crate::cube::Vec3i;
use crate::error::NetworkError;
use serde::{Deserialize, Serialize};

/// A typed value held by an option record.
///
/// # Variants
///
/// - `Str` - a string (names, type tags, function and initializer names)
/// - `UInt` - an unsigned integer (channel counts)
/// - `Real` - a floating-point number (hyperparameters)
/// - `Vec3` - a componentwise integer 3-vector (kernel windows, strides)
/// - `Bytes` - an opaque byte string (persisted parameter blobs)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OptionValue {
    Str(String),
    UInt(u64),
    Real(f64),
    Vec3(Vec3i),
    Bytes(Vec<u8>),
}

/// An ordered, string-keyed record of typed option values.
///
/// Construction of a network takes one `Options` record per node group and one
/// per edge group. Records preserve insertion order; [`push`](Options::push)
/// overwrites an existing key in place, so a record that is echoed back by
/// serialization keeps a stable key order.
///
/// # Examples
/// ```rust
/// use voxelflow::options::Options;
/// use voxelflow::cube::Vec3i;
///
/// let record = Options::new()
///     .with_str("name", "conv1")
///     .with_str("type", "conv")
///     .with_str("input", "in")
///     .with_str("output", "mid")
///     .with_vec3("size", Vec3i::new(3, 3, 3));
///
/// assert_eq!(record.require_str("name").unwrap(), "conv1");
/// assert_eq!(record.optional_real("eta", 0.1).unwrap(), 0.1);
/// ```
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options {
    entries: Vec<(String, OptionValue)>,
}

impl Options {
    /// Creates an empty record.
    pub fn new() -> Self {
        Options {
            entries: Vec::new(),
        }
    }

    /// Sets a key, overwriting in place when it already exists.
    pub fn push(&mut self, key: &str, value: OptionValue) {
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value;
        } else {
            self.entries.push((key.to_string(), value));
        }
    }

    pub fn with(mut self, key: &str, value: OptionValue) -> Self {
        self.push(key, value);
        self
    }

    pub fn with_str(self, key: &str, value: &str) -> Self {
        self.with(key, OptionValue::Str(value.to_string()))
    }

    pub fn with_uint(self, key: &str, value: u64) -> Self {
        self.with(key, OptionValue::UInt(value))
    }

    pub fn with_real(self, key: &str, value: f64) -> Self {
        self.with(key, OptionValue::Real(value))
    }

    pub fn with_vec3(self, key: &str, value: Vec3i) -> Self {
        self.with(key, OptionValue::Vec3(value))
    }

    pub fn with_bytes(self, key: &str, value: Vec<u8>) -> Self {
        self.with(key, OptionValue::Bytes(value))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    pub fn get(&self, key: &str) -> Option<&OptionValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Requires a string value.
    ///
    /// # Returns
    ///
    /// - `Ok(&str)` - The value
    /// - `Err(NetworkError::Config)` - If the key is absent or not a string
    pub fn require_str(&self, key: &str) -> Result<&str, NetworkError> {
        match self.get(key) {
            Some(OptionValue::Str(s)) => Ok(s),
            Some(_) => Err(self.type_error(key, "a string")),
            None => Err(self.missing(key)),
        }
    }

    /// Requires an unsigned integer value.
    pub fn require_usize(&self, key: &str) -> Result<usize, NetworkError> {
        match self.get(key) {
            Some(OptionValue::UInt(n)) => Ok(*n as usize),
            Some(_) => Err(self.type_error(key, "an unsigned integer")),
            None => Err(self.missing(key)),
        }
    }

    /// Requires a real value; unsigned integers are accepted and widened.
    pub fn require_real(&self, key: &str) -> Result<f64, NetworkError> {
        match self.get(key) {
            Some(OptionValue::Real(v)) => Ok(*v),
            Some(OptionValue::UInt(n)) => Ok(*n as f64),
            Some(_) => Err(self.type_error(key, "a real number")),
            None => Err(self.missing(key)),
        }
    }

    /// Requires a 3-vector value; the textual `"x,y,z"` form is accepted.
    pub fn require_vec3(&self, key: &str) -> Result<Vec3i, NetworkError> {
        match self.get(key) {
            Some(OptionValue::Vec3(v)) => Ok(*v),
            Some(OptionValue::Str(s)) => s.parse::<Vec3i>().map_err(|e| {
                NetworkError::Config(format!("option `{}` is not a 3-vector: {}", key, e))
            }),
            Some(_) => Err(self.type_error(key, "a 3-vector")),
            None => Err(self.missing(key)),
        }
    }

    /// Requires a byte-string value.
    pub fn require_bytes(&self, key: &str) -> Result<&[u8], NetworkError> {
        match self.get(key) {
            Some(OptionValue::Bytes(b)) => Ok(b),
            Some(_) => Err(self.type_error(key, "a byte string")),
            None => Err(self.missing(key)),
        }
    }

    /// Reads a real value, falling back to `default` when the key is absent.
    pub fn optional_real(&self, key: &str, default: f64) -> Result<f64, NetworkError> {
        if self.contains(key) {
            self.require_real(key)
        } else {
            Ok(default)
        }
    }

    /// Reads a 3-vector value, falling back to `default` when the key is absent.
    pub fn optional_vec3(&self, key: &str, default: Vec3i) -> Result<Vec3i, NetworkError> {
        if self.contains(key) {
            self.require_vec3(key)
        } else {
            Ok(default)
        }
    }

    fn missing(&self, key: &str) -> NetworkError {
        let name = self
            .get("name")
            .and_then(|v| match v {
                OptionValue::Str(s) => Some(s.as_str()),
                _ => None,
            })
            .unwrap_or("<unnamed>");
        NetworkError::Config(format!(
            "record `{}` is missing required option `{}`",
            name, key
        ))
    }

    fn type_error(&self, key: &str, expected: &str) -> NetworkError {
        NetworkError::Config(format!("option `{}` is not {}", key, expected))
    }
}
