//! CPU versions of the dilated convolution.

use super::{validate, DilatedGeometry, Filter, Matrix};
use crate::error::Result;

/// The filter spread over its `K_eff × K_eff` receptive field: tap `t`
/// sits at `((t / √N) * d, (t % √N) * d)` and every other cell is zero.
pub fn expanded_kernel(filter: &Filter, geometry: &DilatedGeometry) -> Vec<i32> {
    let dim = geometry.effective_dim;
    let mut kernel = vec![0; dim * dim];
    for (t, &tap) in filter.taps().iter().enumerate() {
        let k = t / geometry.side * geometry.dilation;
        let m = t % geometry.side * geometry.dilation;
        kernel[k * dim + m] = tap;
    }
    kernel
}

/// Exhaustive convolution: correlates the matrix with the full expanded
/// kernel, visiting the zero cells between taps as well.
pub fn convolve_reference(matrix: &Matrix, filter: &Filter, dilation: u32) -> Result<Matrix> {
    let geometry = validate(filter, dilation)?;
    let kernel = expanded_kernel(filter, &geometry);
    let dim = geometry.effective_dim as isize;
    let offset = geometry.offset as isize;

    let mut out = Vec::with_capacity(matrix.rows() * matrix.cols());
    for r in 0..matrix.rows() as isize {
        for c in 0..matrix.cols() as isize {
            let mut sum = 0i32;
            for k in 0..dim {
                for m in 0..dim {
                    if let Some(v) = matrix.get(r + k - offset, c + m - offset) {
                        let w = kernel[(k * dim + m) as usize];
                        sum = sum.wrapping_add(w.wrapping_mul(v));
                    }
                }
            }
            out.push(sum);
        }
    }
    Matrix::new(matrix.rows(), matrix.cols(), out)
}

/// Convolution that only visits the `N` real taps of the filter.
pub fn convolve_strided(matrix: &Matrix, filter: &Filter, dilation: u32) -> Result<Matrix> {
    let geometry = validate(filter, dilation)?;
    let displacements: Vec<(isize, isize)> = (0..filter.len())
        .map(|t| geometry.tap_displacement(t))
        .collect();

    let mut out = Vec::with_capacity(matrix.rows() * matrix.cols());
    for r in 0..matrix.rows() as isize {
        for c in 0..matrix.cols() as isize {
            let sum = filter
                .taps()
                .iter()
                .zip(&displacements)
                .filter_map(|(&w, &(dr, dc))| matrix.get(r + dr, c + dc).map(|v| w.wrapping_mul(v)))
                .fold(0i32, i32::wrapping_add);
            out.push(sum);
        }
    }
    Matrix::new(matrix.rows(), matrix.cols(), out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Matrix {
        Matrix::from_rows(&[[1, 2, 3], [4, 5, 6], [7, 8, 9]]).unwrap()
    }

    #[test]
    fn identity_filter_returns_input() {
        let m = sample();
        let f = Filter::new(vec![0, 0, 0, 0, 1, 0, 0, 0, 0]).unwrap();
        assert_eq!(convolve_reference(&m, &f, 1).unwrap(), m);
        assert_eq!(convolve_strided(&m, &f, 1).unwrap(), m);
    }

    #[test]
    fn box_filter_sums_neighbourhood() {
        let m = sample();
        let f = Filter::new(vec![1; 9]).unwrap();
        let expected = Matrix::from_rows(&[[12, 21, 16], [27, 45, 33], [24, 39, 28]]).unwrap();
        assert_eq!(convolve_strided(&m, &f, 1).unwrap(), expected);
        assert_eq!(convolve_reference(&m, &f, 1).unwrap(), expected);
    }

    #[test]
    fn dilation_two_reaches_corners_only() {
        // With d = 2 a 3x3 filter anchored at the centre of a 3x3 matrix
        // touches only the four corners and the centre itself.
        let m = sample();
        let f = Filter::new(vec![1; 9]).unwrap();
        let out = convolve_strided(&m, &f, 2).unwrap();
        assert_eq!(out.get(1, 1), Some(5));
        assert_eq!(out.get(0, 0), Some(1 + 3 + 7 + 9));
        assert_eq!(out, convolve_reference(&m, &f, 2).unwrap());
    }

    #[test]
    fn single_tap_scales() {
        let m = sample();
        let f = Filter::new(vec![3]).unwrap();
        let out = convolve_strided(&m, &f, 5).unwrap();
        let expected: Vec<i32> = m.as_slice().iter().map(|v| v * 3).collect();
        assert_eq!(out.as_slice(), expected.as_slice());
    }

    #[test]
    fn expanded_kernel_places_taps_on_stride() {
        let f = Filter::new(vec![1, 2, 3, 4]).unwrap();
        let g = DilatedGeometry::new(2, 3).unwrap();
        assert_eq!(g.effective_dim, 4);
        let k = expanded_kernel(&f, &g);
        assert_eq!(k, vec![1, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 3, 0, 0, 4]);
    }

    #[test]
    fn zero_dilation_is_an_error() {
        let f = Filter::new(vec![1]).unwrap();
        assert!(convolve_strided(&sample(), &f, 0).is_err());
        assert!(convolve_reference(&sample(), &f, 0).is_err());
    }

    #[test]
    fn overflow_wraps() {
        let m = Matrix::new(1, 2, vec![i32::MAX, 1]).unwrap();
        let f = Filter::new(vec![1; 9]).unwrap();
        let out = convolve_strided(&m, &f, 1).unwrap();
        assert_eq!(out.as_slice(), &[i32::MIN, i32::MIN]);
        assert_eq!(out, convolve_reference(&m, &f, 1).unwrap());
    }
}
