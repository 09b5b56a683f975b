pub use crate::convolution::{
    convolve_sparse, convolve_sparse_flipped, convolve_sparse_inverse, sparse_output_size,
};
pub use crate::cube::{Cube, SharedCube, Vec3i};
pub use crate::error::{IoError, NetworkError};
pub use crate::init::Initializer;
pub use crate::network::{Bias, Filter, Network, NetworkSpec};
pub use crate::options::{OptionValue, Options};
pub use crate::pooling::{max_pool_backprop, max_pool_sparse};
pub use crate::transfer::TransferFunction;
