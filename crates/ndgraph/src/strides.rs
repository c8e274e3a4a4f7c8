//! Stride computation utilities.
//!
//! Uses row-major (C) order to match numpy's default memory layout. Strides are
//! counted in elements, not bytes.

/// Compute row-major strides from shape.
///
/// For shape [d0, d1, d2, ...], returns strides [d1*d2*..., d2*..., ..., 1].
///
/// # Examples
///
/// ```
/// use ndgraph::strides::compute_strides;
///
/// assert_eq!(compute_strides(&[3, 4, 5]), vec![20, 5, 1]);
/// assert_eq!(compute_strides(&[2, 3]), vec![3, 1]);
/// assert_eq!(compute_strides(&[5]), vec![1]);
/// assert_eq!(compute_strides(&[]), Vec::<usize>::new());
/// ```
pub fn compute_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![0; shape.len()];
    let mut stride = 1;

    for (s, &dim) in strides.iter_mut().zip(shape.iter()).rev() {
        *s = stride;
        stride *= dim;
    }

    strides
}

/// Convert linear index to cartesian indices using row-major order.
///
/// Writes into `out`, which must have the same length as `shape`.
pub fn linear_to_cartesian_into(mut linear: usize, shape: &[usize], out: &mut [usize]) {
    for (idx, &dim) in out.iter_mut().zip(shape.iter()).rev() {
        if dim == 0 {
            *idx = 0;
            continue;
        }
        *idx = linear % dim;
        linear /= dim;
    }
}
