use crate::convolution::sparse_output_size;
use crate::cube::{Cube, Vec3i};
use crate::error::NetworkError;
use ndarray::{Array3, Axis, Zip};

/// Threshold for deciding between parallel and sequential execution.
/// When the number of output cells reaches this threshold, the outer output
/// axis is processed in parallel.
const POOLING_PARALLEL_THRESHOLD: usize = 4096;

/// Sparse 3D max pooling.
///
/// Scans a `window` over the input with the given tap spacing and keeps the
/// maximum of each window. The output shape is
/// `shape(I) - (window - 1) * stride`, the same relation the sparse
/// convolution obeys. Alongside the pooled values an argmax cube of the same
/// shape is produced, holding for every output cell the linear (row-major)
/// index of the selected input element.
///
/// Ties are broken toward the first element scanned, i.e. the
/// lexicographically smallest `(a, b, c)` window offset.
///
/// # Parameters
///
/// - `input` - The input feature map
/// - `window` - Size of the pooling window
/// - `stride` - Spacing between window taps in input space
///
/// # Returns
///
/// - `Ok((Cube, Array3<usize>))` - The pooled values and the argmax cube
/// - `Err(NetworkError::ShapeMismatch)` - If the window does not fit the input
pub fn max_pool_sparse(
    input: &Cube,
    window: Vec3i,
    stride: Vec3i,
) -> Result<(Cube, Array3<usize>), NetworkError> {
    let isz = Vec3i::of(input);
    let osz = sparse_output_size(isz, window, stride)?;

    let cell = |x: usize, y: usize, z: usize| {
        let mut best = f64::NEG_INFINITY;
        let mut best_index = 0;
        for a in 0..window.x {
            for b in 0..window.y {
                for c in 0..window.z {
                    let (ix, iy, iz) = (x + a * stride.x, y + b * stride.y, z + c * stride.z);
                    let v = input[[ix, iy, iz]];
                    // strict comparison keeps the first maximum scanned
                    if v > best {
                        best = v;
                        best_index = isz.linear_index(ix, iy, iz);
                    }
                }
            }
        }
        (best, best_index)
    };

    let mut values = Cube::zeros(osz.to_dim());
    let mut indices = Array3::<usize>::zeros(osz.to_dim());
    if osz.volume() >= POOLING_PARALLEL_THRESHOLD {
        Zip::indexed(values.axis_iter_mut(Axis(0)))
            .and(indices.axis_iter_mut(Axis(0)))
            .par_for_each(|x, mut value_plane, mut index_plane| {
                for y in 0..osz.y {
                    for z in 0..osz.z {
                        let (v, i) = cell(x, y, z);
                        value_plane[[y, z]] = v;
                        index_plane[[y, z]] = i;
                    }
                }
            });
    } else {
        for x in 0..osz.x {
            for y in 0..osz.y {
                for z in 0..osz.z {
                    let (v, i) = cell(x, y, z);
                    values[[x, y, z]] = v;
                    indices[[x, y, z]] = i;
                }
            }
        }
    }

    Ok((values, indices))
}

/// Backpropagation through a max pooling operation.
///
/// Produces a gradient of shape `input_size` that is zero everywhere except at
/// the argmax locations, where the corresponding output gradients are added.
/// Several output cells may select the same input element; their gradients
/// accumulate, so the scatter runs sequentially.
///
/// # Parameters
///
/// - `input_size` - Shape of the forward input
/// - `grad_output` - The gradient of the pooled output
/// - `indices` - The argmax cube recorded by the forward pass
///
/// # Returns
///
/// - `Ok(Cube)` - The input gradient
/// - `Err(NetworkError::ShapeMismatch)` - If `grad_output` and `indices` disagree in shape
/// - `Err(NetworkError::ProtocolViolation)` - If an argmax index falls outside `input_size`
pub fn max_pool_backprop(
    input_size: Vec3i,
    grad_output: &Cube,
    indices: &Array3<usize>,
) -> Result<Cube, NetworkError> {
    if grad_output.dim() != indices.dim() {
        return Err(NetworkError::ShapeMismatch(format!(
            "gradient shape {} does not match argmax shape {}",
            Vec3i::of(grad_output),
            Vec3i::from(indices.dim())
        )));
    }

    let mut grad_input = Cube::zeros(input_size.to_dim());
    for (&index, &g) in indices.iter().zip(grad_output.iter()) {
        if index >= input_size.volume() {
            return Err(NetworkError::ProtocolViolation(format!(
                "argmax index {} outside input of shape {}",
                index, input_size
            )));
        }
        let (x, y, z) = input_size.from_linear_index(index);
        grad_input[[x, y, z]] += g;
    }

    Ok(grad_input)
}
