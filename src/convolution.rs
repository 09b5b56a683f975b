use crate::cube::{Cube, Vec3i};
use crate::error::NetworkError;
use ndarray::Axis;
use rayon::prelude::*;

/// Threshold for deciding between parallel and sequential execution.
/// When the number of output cells reaches this threshold, the outer output
/// axis is processed in parallel.
const CONVOLUTION_PARALLEL_THRESHOLD: usize = 4096;

/// Output shape of a sparse window scan: `input - (window - 1) * stride`,
/// componentwise.
///
/// This is the shape produced by both the sparse convolution and the sparse
/// max-pooling kernels.
///
/// # Parameters
///
/// - `input` - Shape of the input cube
/// - `window` - Shape of the scanning window (kernel size)
/// - `stride` - Spacing between window taps in input space (dilation)
///
/// # Returns
///
/// - `Ok(Vec3i)` - The output shape, positive in every component
/// - `Err(NetworkError::ShapeMismatch)` - If any component would be zero or
///   negative, or any input component is zero
pub fn sparse_output_size(
    input: Vec3i,
    window: Vec3i,
    stride: Vec3i,
) -> Result<Vec3i, NetworkError> {
    if input.volume() == 0 || window.volume() == 0 || stride.volume() == 0 {
        return Err(NetworkError::ShapeMismatch(format!(
            "degenerate geometry: input {}, window {}, stride {}",
            input, window, stride
        )));
    }
    let reach = (window - Vec3i::ONE) * stride;
    if reach.x >= input.x || reach.y >= input.y || reach.z >= input.z {
        return Err(NetworkError::ShapeMismatch(format!(
            "window {} at stride {} does not fit input {}",
            window, stride, input
        )));
    }
    Ok(input - reach)
}

/// Sparse 3D convolution (cross-correlation with dilation).
///
/// Computes `O[x,y,z] = sum over (a,b,c) of I[x + a*sx, y + b*sy, z + c*sz] * W[a,b,c]`
/// where `(sx, sy, sz)` is the sparsity stride. With stride `(1,1,1)` this is
/// conventional dense cross-correlation. The output shape is
/// `shape(I) - (shape(W) - 1) * stride`.
///
/// # Parameters
///
/// - `input` - The input feature map
/// - `weights` - The convolution kernel
/// - `stride` - Spacing between kernel taps in input space
///
/// # Returns
///
/// - `Ok(Cube)` - The convolved feature map
/// - `Err(NetworkError::ShapeMismatch)` - If the kernel does not fit the input
pub fn convolve_sparse(input: &Cube, weights: &Cube, stride: Vec3i) -> Result<Cube, NetworkError> {
    let wsz = Vec3i::of(weights);
    let osz = sparse_output_size(Vec3i::of(input), wsz, stride)?;

    let cell = |x: usize, y: usize, z: usize| {
        let mut sum = 0.0;
        for a in 0..wsz.x {
            for b in 0..wsz.y {
                for c in 0..wsz.z {
                    sum += input[[x + a * stride.x, y + b * stride.y, z + c * stride.z]]
                        * weights[[a, b, c]];
                }
            }
        }
        sum
    };

    let mut output = Cube::zeros(osz.to_dim());
    if osz.volume() >= CONVOLUTION_PARALLEL_THRESHOLD {
        output
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(x, mut plane)| {
                for y in 0..osz.y {
                    for z in 0..osz.z {
                        plane[[y, z]] = cell(x, y, z);
                    }
                }
            });
    } else {
        for x in 0..osz.x {
            for y in 0..osz.y {
                for z in 0..osz.z {
                    output[[x, y, z]] = cell(x, y, z);
                }
            }
        }
    }

    Ok(output)
}

/// Weight gradient of a sparse convolution.
///
/// Given the input of a forward convolution and the gradient of its output,
/// computes the gradient with respect to the kernel:
/// `dW[a,b,c] = sum over (x,y,z) of I[x + a*sx, y + b*sy, z + c*sz] * dO[x,y,z]`.
/// The kernel shape is recovered from the two operand shapes and the stride.
///
/// # Parameters
///
/// - `input` - The input cube of the matching forward pass
/// - `grad_output` - The gradient of the forward output
/// - `stride` - The stride used on the forward pass
///
/// # Returns
///
/// - `Ok(Cube)` - The kernel gradient, shaped like the forward kernel
/// - `Err(NetworkError::ShapeMismatch)` - If no kernel shape is consistent with
///   the operands at this stride
pub fn convolve_sparse_flipped(
    input: &Cube,
    grad_output: &Cube,
    stride: Vec3i,
) -> Result<Cube, NetworkError> {
    let isz = Vec3i::of(input);
    let osz = Vec3i::of(grad_output);
    let wsz = implied_window(isz, osz, stride)?;

    let cell = |a: usize, b: usize, c: usize| {
        let mut sum = 0.0;
        for x in 0..osz.x {
            for y in 0..osz.y {
                for z in 0..osz.z {
                    sum += input[[x + a * stride.x, y + b * stride.y, z + c * stride.z]]
                        * grad_output[[x, y, z]];
                }
            }
        }
        sum
    };

    let mut grad_weights = Cube::zeros(wsz.to_dim());
    if osz.volume() >= CONVOLUTION_PARALLEL_THRESHOLD {
        grad_weights
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(a, mut plane)| {
                for b in 0..wsz.y {
                    for c in 0..wsz.z {
                        plane[[b, c]] = cell(a, b, c);
                    }
                }
            });
    } else {
        for a in 0..wsz.x {
            for b in 0..wsz.y {
                for c in 0..wsz.z {
                    grad_weights[[a, b, c]] = cell(a, b, c);
                }
            }
        }
    }

    Ok(grad_weights)
}

/// Input gradient of a sparse convolution.
///
/// Given the gradient of a forward output and the forward kernel, computes the
/// gradient with respect to the forward input:
/// `dI[p,q,r] = sum over (a,b,c) of W[a,b,c] * dO[p - a*sx, q - b*sy, r - c*sz]`,
/// with out-of-range taps omitted. The result has the forward input's shape,
/// `shape(dO) + (shape(W) - 1) * stride`.
///
/// # Parameters
///
/// - `grad_output` - The gradient of the forward output
/// - `weights` - The forward kernel
/// - `stride` - The stride used on the forward pass
///
/// # Returns
///
/// - `Ok(Cube)` - The input gradient
/// - `Err(NetworkError::ShapeMismatch)` - If the operand shapes are degenerate
pub fn convolve_sparse_inverse(
    grad_output: &Cube,
    weights: &Cube,
    stride: Vec3i,
) -> Result<Cube, NetworkError> {
    let osz = Vec3i::of(grad_output);
    let wsz = Vec3i::of(weights);
    if osz.volume() == 0 || wsz.volume() == 0 || stride.volume() == 0 {
        return Err(NetworkError::ShapeMismatch(format!(
            "degenerate geometry: output {}, window {}, stride {}",
            osz, wsz, stride
        )));
    }
    let isz = (wsz - Vec3i::ONE) * stride + osz;

    let cell = |p: usize, q: usize, r: usize| {
        let mut sum = 0.0;
        for a in 0..wsz.x {
            for b in 0..wsz.y {
                for c in 0..wsz.z {
                    let (ax, by, cz) = (a * stride.x, b * stride.y, c * stride.z);
                    if p >= ax && q >= by && r >= cz {
                        let (x, y, z) = (p - ax, q - by, r - cz);
                        if x < osz.x && y < osz.y && z < osz.z {
                            sum += weights[[a, b, c]] * grad_output[[x, y, z]];
                        }
                    }
                }
            }
        }
        sum
    };

    let mut grad_input = Cube::zeros(isz.to_dim());
    if isz.volume() >= CONVOLUTION_PARALLEL_THRESHOLD {
        grad_input
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .enumerate()
            .for_each(|(p, mut plane)| {
                for q in 0..isz.y {
                    for r in 0..isz.z {
                        plane[[q, r]] = cell(p, q, r);
                    }
                }
            });
    } else {
        for p in 0..isz.x {
            for q in 0..isz.y {
                for r in 0..isz.z {
                    grad_input[[p, q, r]] = cell(p, q, r);
                }
            }
        }
    }

    Ok(grad_input)
}

/// Kernel shape consistent with an input/output shape pair at a given stride.
fn implied_window(input: Vec3i, output: Vec3i, stride: Vec3i) -> Result<Vec3i, NetworkError> {
    if output.volume() == 0 || stride.volume() == 0 {
        return Err(NetworkError::ShapeMismatch(format!(
            "degenerate geometry: output {}, stride {}",
            output, stride
        )));
    }
    let fits = |i: usize, o: usize, s: usize| -> Option<usize> {
        let span = i.checked_sub(o)?;
        (span % s == 0).then(|| span / s + 1)
    };
    match (
        fits(input.x, output.x, stride.x),
        fits(input.y, output.y, stride.y),
        fits(input.z, output.z, stride.z),
    ) {
        (Some(x), Some(y), Some(z)) => Ok(Vec3i::new(x, y, z)),
        _ => Err(NetworkError::ShapeMismatch(format!(
            "no kernel maps input {} to output {} at stride {}",
            input, output, stride
        ))),
    }
}
