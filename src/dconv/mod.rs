//! Dilated 2-D convolution.
//!
//! For an R×C matrix, a √N×√N filter and a dilation `d`, every output
//! cell is
//!
//! ```text
//! out[r][c] = Σ_t filter[t] * in[r - offset + (t / √N) * d][c - offset + (t % √N) * d]
//! ```
//!
//! where `offset = K_eff / 2` and `K_eff = (d - 1)(√N - 1) + √N` is the
//! side of the receptive field.  Taps that land outside the matrix
//! contribute nothing.  Arithmetic is 32-bit and wraps on overflow on
//! both the CPU and the GPU paths.
//!
//! [`convolve_reference`] and [`convolve_strided`] are the CPU versions,
//! [`convolve_gpu`] the accelerated one.  All three produce identical
//! output for every valid input.

mod gpu;
mod reference;

pub use gpu::{conv_block_side, convolve_gpu, CONV_BLOCK_SIDE, CONV_FALLBACK_BLOCK_SIDE};
pub use reference::{convolve_reference, convolve_strided, expanded_kernel};

use crate::error::{KernelError, Result};

/// Row-major matrix of `i32`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<i32>,
}

impl Matrix {
    /// Wrap `data` as a `rows × cols` matrix.
    pub fn new(rows: usize, cols: usize, data: Vec<i32>) -> Result<Self> {
        if rows == 0 || cols == 0 {
            return Err(KernelError::invalid(format!(
                "matrix dimensions must be positive, got {rows}x{cols}"
            )));
        }
        let expected = rows.checked_mul(cols).ok_or_else(|| {
            KernelError::invalid(format!("matrix dimensions {rows}x{cols} overflow"))
        })?;
        if data.len() != expected {
            return Err(KernelError::invalid(format!(
                "{rows}x{cols} matrix needs {expected} values, got {}",
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Build a matrix from equally long rows.
    pub fn from_rows<R: AsRef<[i32]>>(rows: &[R]) -> Result<Self> {
        let cols = rows.first().map_or(0, |r| r.as_ref().len());
        if let Some(bad) = rows.iter().position(|r| r.as_ref().len() != cols) {
            return Err(KernelError::invalid(format!(
                "row {bad} has {} values, expected {cols}",
                rows[bad].as_ref().len()
            )));
        }
        let data = rows.iter().flat_map(|r| r.as_ref().iter().copied()).collect();
        Self::new(rows.len(), cols, data)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.data
    }

    /// Value at (`r`, `c`), or `None` outside the matrix.
    pub fn get(&self, r: isize, c: isize) -> Option<i32> {
        if r < 0 || c < 0 {
            return None;
        }
        let (r, c) = (r as usize, c as usize);
        if r >= self.rows || c >= self.cols {
            return None;
        }
        Some(self.data[r * self.cols + c])
    }
}

/// A square filter of `side × side` taps stored row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    side: usize,
    taps: Vec<i32>,
}

impl Filter {
    /// Interpret `taps` as a square kernel.  The length must be a
    /// non-zero perfect square.
    pub fn new(taps: Vec<i32>) -> Result<Self> {
        let side = exact_sqrt(taps.len()).ok_or_else(|| {
            KernelError::invalid(format!(
                "filter length {} is not a non-zero perfect square",
                taps.len()
            ))
        })?;
        Ok(Self { side, taps })
    }

    /// A filter with a single 1 on the centre tap.  `side` must be odd.
    pub fn centered_identity(side: usize) -> Result<Self> {
        if side % 2 == 0 {
            return Err(KernelError::invalid(format!(
                "identity filter needs an odd side, got {side}"
            )));
        }
        let mut taps = vec![0; side * side];
        taps[(side / 2) * side + side / 2] = 1;
        Self::new(taps)
    }

    pub fn side(&self) -> usize {
        self.side
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    pub fn taps(&self) -> &[i32] {
        &self.taps
    }
}

/// Receptive-field geometry shared by every convolution path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DilatedGeometry {
    pub side: usize,
    pub dilation: usize,
    /// `K_eff`, the side of the dilated receptive field.
    pub effective_dim: usize,
    /// Distance from the receptive field's top-left corner to its anchor.
    pub offset: usize,
}

impl DilatedGeometry {
    pub fn new(side: usize, dilation: usize) -> Result<Self> {
        if side == 0 {
            return Err(KernelError::invalid("filter side must be positive"));
        }
        if dilation == 0 {
            return Err(KernelError::invalid("dilation must be at least 1"));
        }
        let effective_dim = (dilation - 1) * (side - 1) + side;
        Ok(Self {
            side,
            dilation,
            effective_dim,
            offset: effective_dim / 2,
        })
    }

    /// Row and column displacement of tap `t` relative to the output cell.
    pub fn tap_displacement(&self, t: usize) -> (isize, isize) {
        let row = (t / self.side * self.dilation) as isize - self.offset as isize;
        let col = (t % self.side * self.dilation) as isize - self.offset as isize;
        (row, col)
    }
}

/// Geometry for a convolution call.  The dilation is used as an `i32`
/// by the GPU kernel, so larger values are rejected on every path.
pub(crate) fn validate(filter: &Filter, dilation: u32) -> Result<DilatedGeometry> {
    if dilation > i32::MAX as u32 {
        return Err(KernelError::invalid(format!(
            "dilation {dilation} exceeds the largest supported value {}",
            i32::MAX
        )));
    }
    DilatedGeometry::new(filter.side(), dilation as usize)
}

fn exact_sqrt(n: usize) -> Option<usize> {
    if n == 0 {
        return None;
    }
    let mut root = (n as f64).sqrt() as usize;
    while root * root > n {
        root -= 1;
    }
    while (root + 1) * (root + 1) <= n {
        root += 1;
    }
    (root * root == n).then_some(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_squares_are_accepted() {
        assert_eq!(Filter::new(vec![7]).unwrap().side(), 1);
        assert_eq!(Filter::new(vec![0; 9]).unwrap().side(), 3);
        assert_eq!(Filter::new(vec![0; 144]).unwrap().side(), 12);
    }

    #[test]
    fn non_square_filters_are_rejected() {
        for len in [0, 2, 8, 10, 15] {
            let err = Filter::new(vec![1; len]).unwrap_err();
            assert!(matches!(err, KernelError::InvalidArgument(_)), "len {len}");
        }
    }

    #[test]
    fn matrix_shape_is_checked() {
        assert!(Matrix::new(0, 3, vec![]).is_err());
        assert!(Matrix::new(3, 0, vec![]).is_err());
        assert!(Matrix::new(2, 2, vec![1, 2, 3]).is_err());
        assert!(Matrix::from_rows(&[vec![1, 2], vec![3]]).is_err());
        let m = Matrix::from_rows(&[[1, 2, 3], [4, 5, 6]]).unwrap();
        assert_eq!((m.rows(), m.cols()), (2, 3));
    }

    #[test]
    fn get_is_none_outside() {
        let m = Matrix::from_rows(&[[1, 2], [3, 4]]).unwrap();
        assert_eq!(m.get(1, 0), Some(3));
        assert_eq!(m.get(-1, 0), None);
        assert_eq!(m.get(0, 2), None);
        assert_eq!(m.get(2, 1), None);
    }

    #[test]
    fn effective_dim_matches_formula() {
        let g = DilatedGeometry::new(3, 1).unwrap();
        assert_eq!((g.effective_dim, g.offset), (3, 1));
        let g = DilatedGeometry::new(3, 2).unwrap();
        assert_eq!((g.effective_dim, g.offset), (5, 2));
        let g = DilatedGeometry::new(4, 3).unwrap();
        assert_eq!((g.effective_dim, g.offset), (10, 5));
        let g = DilatedGeometry::new(1, 7).unwrap();
        assert_eq!((g.effective_dim, g.offset), (1, 0));
    }

    #[test]
    fn zero_dilation_is_rejected() {
        assert!(DilatedGeometry::new(3, 0).is_err());
    }

    #[test]
    fn dilation_above_i32_range_is_rejected() {
        // A single tap keeps K_eff at 1, so only the dilation itself is too large.
        let f = Filter::new(vec![1]).unwrap();
        assert_eq!(validate(&f, i32::MAX as u32).unwrap().effective_dim, 1);
        for d in [i32::MAX as u32 + 1, 3_000_000_000, u32::MAX] {
            assert!(matches!(validate(&f, d), Err(KernelError::InvalidArgument(_))), "d {d}");
        }
    }

    #[test]
    fn centre_tap_has_no_displacement() {
        for d in 1..6 {
            let g = DilatedGeometry::new(5, d).unwrap();
            assert_eq!(g.tap_displacement(12), (0, 0));
            assert_eq!(g.tap_displacement(0), (-2 * d as isize, -2 * d as isize));
        }
    }

    #[test]
    fn identity_filter_needs_odd_side() {
        assert!(Filter::centered_identity(4).is_err());
        let f = Filter::centered_identity(3).unwrap();
        assert_eq!(f.taps(), &[0, 0, 0, 0, 1, 0, 0, 0, 0]);
    }
}
