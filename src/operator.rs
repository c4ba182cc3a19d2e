use core::fmt;
use core::ops::Range;

use faer_core::mul::matmul;
use faer_core::{mat, Mat, Parallelism};

/// Linear forward model mapping coefficients to predicted measurements.
///
/// `apply_adjoint` must be the true adjoint of `apply` (the transpose for a
/// real matrix); the line-search majorizer bound relies on it. Implementations
/// must be stateless and side-effect free so that independent solves can share
/// an operator across threads.
pub trait LinearOperator {
    /// Measurement-space dimension.
    fn nrows(&self) -> usize;
    /// Coefficient-space dimension.
    fn ncols(&self) -> usize;
    /// Forward application: `out = A v`, with `v.len() == ncols()` and
    /// `out.len() == nrows()`.
    fn apply(&self, v: &[f64], out: &mut [f64]);
    /// Adjoint application: `out = A^T v`, with `v.len() == nrows()` and
    /// `out.len() == ncols()`.
    fn apply_adjoint(&self, v: &[f64], out: &mut [f64]);
}

/// Errors while constructing an operator.
#[derive(Debug, Clone)]
pub enum OperatorError {
    /// The matrix has zero rows or columns.
    EmptyMatrix { nrows: usize, ncols: usize },
    /// The flat element buffer does not match nrows * ncols.
    ElementCount { expected: usize, actual: usize },
    /// col_ptrs length is not ncols + 1.
    ColPtrLen { expected: usize, actual: usize },
    /// col_ptrs[0] is not 0.
    ColPtrStart { value: usize },
    /// col_ptrs is not non-decreasing.
    ColPtrNotMonotonic { col: usize, prev: usize, next: usize },
    /// col_ptrs[ncols] does not match row_indices length.
    ColPtrOutOfBounds { last: usize, row_indices_len: usize },
    /// A row index is >= nrows.
    RowIndexOutOfBounds { col: usize, row: usize, nrows: usize },
    /// Row indices in a column are not sorted.
    RowIndexNotSorted { col: usize, prev: usize, next: usize },
    /// values length does not match row_indices length.
    ValueCount { expected: usize, actual: usize },
}

impl fmt::Display for OperatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyMatrix { nrows, ncols } => {
                write!(f, "matrix has empty dimensions: nrows={nrows}, ncols={ncols}")
            }
            Self::ElementCount { expected, actual } => {
                write!(f, "element count {actual} does not match expected {expected}")
            }
            Self::ColPtrLen { expected, actual } => {
                write!(f, "col_ptrs length {actual} does not match expected {expected}")
            }
            Self::ColPtrStart { value } => {
                write!(f, "col_ptrs must start at 0 (got {value})")
            }
            Self::ColPtrNotMonotonic { col, prev, next } => {
                write!(f, "col_ptrs not monotonic at col {col}: {prev} > {next}")
            }
            Self::ColPtrOutOfBounds {
                last,
                row_indices_len,
            } => {
                write!(
                    f,
                    "col_ptrs end {last} exceeds row_indices length {row_indices_len}"
                )
            }
            Self::RowIndexOutOfBounds { col, row, nrows } => {
                write!(f, "row index {row} in col {col} exceeds nrows {nrows}")
            }
            Self::RowIndexNotSorted { col, prev, next } => {
                write!(f, "row indices not sorted in col {col}: {prev} > {next}")
            }
            Self::ValueCount { expected, actual } => {
                write!(f, "values length {actual} does not match expected {expected}")
            }
        }
    }
}

impl std::error::Error for OperatorError {}

/// Dense measurement operator backed by a column-major matrix.
///
/// The adjoint is the transpose of the same storage. Matrix-vector products go
/// through faer and may be internally parallel; the solver loop itself stays
/// strictly sequential either way.
pub struct DenseOperator {
    matrix: Mat<f64>,
    parallelism: Parallelism,
}

impl DenseOperator {
    /// Wrap an owned matrix.
    pub fn new(matrix: Mat<f64>, parallelism: Parallelism) -> Result<Self, OperatorError> {
        if matrix.nrows() == 0 || matrix.ncols() == 0 {
            return Err(OperatorError::EmptyMatrix {
                nrows: matrix.nrows(),
                ncols: matrix.ncols(),
            });
        }
        Ok(Self {
            matrix,
            parallelism,
        })
    }

    /// Build from a row-major element buffer of length `nrows * ncols`.
    pub fn from_row_major(
        nrows: usize,
        ncols: usize,
        elements: &[f64],
        parallelism: Parallelism,
    ) -> Result<Self, OperatorError> {
        let expected = nrows * ncols;
        if elements.len() != expected {
            return Err(OperatorError::ElementCount {
                expected,
                actual: elements.len(),
            });
        }
        let matrix = Mat::from_fn(nrows, ncols, |i, j| elements[i * ncols + j]);
        Self::new(matrix, parallelism)
    }

    /// The wrapped matrix.
    pub fn matrix(&self) -> &Mat<f64> {
        &self.matrix
    }
}

impl LinearOperator for DenseOperator {
    fn nrows(&self) -> usize {
        self.matrix.nrows()
    }

    fn ncols(&self) -> usize {
        self.matrix.ncols()
    }

    fn apply(&self, v: &[f64], out: &mut [f64]) {
        let rhs = mat::from_column_major_slice::<f64>(v, v.len(), 1);
        let acc = mat::from_column_major_slice_mut::<f64>(out, out.len(), 1);
        matmul(acc, self.matrix.as_ref(), rhs, None, 1.0, self.parallelism);
    }

    fn apply_adjoint(&self, v: &[f64], out: &mut [f64]) {
        let rhs = mat::from_column_major_slice::<f64>(v, v.len(), 1);
        let acc = mat::from_column_major_slice_mut::<f64>(out, out.len(), 1);
        matmul(
            acc,
            self.matrix.as_ref().transpose(),
            rhs,
            None,
            1.0,
            self.parallelism,
        );
    }
}

/// Sparse measurement operator in compressed sparse column (CSC) form.
///
/// Indices are zero-based; each column's row indices must be sorted. Both the
/// forward product and its adjoint walk the same storage, so the adjoint is
/// exact by construction.
#[derive(Debug, Clone)]
pub struct CscOperator {
    nrows: usize,
    ncols: usize,
    col_ptrs: Vec<usize>,
    row_indices: Vec<usize>,
    values: Vec<f64>,
}

impl CscOperator {
    /// Creates a validated CSC operator.
    ///
    /// Requirements:
    /// - `col_ptrs.len() == ncols + 1`
    /// - `col_ptrs` is non-decreasing and starts at `0`
    /// - `col_ptrs[ncols] == row_indices.len() == values.len()`
    /// - row indices are sorted and `< nrows` within each column
    pub fn new(
        nrows: usize,
        ncols: usize,
        col_ptrs: Vec<usize>,
        row_indices: Vec<usize>,
        values: Vec<f64>,
    ) -> Result<Self, OperatorError> {
        if nrows == 0 || ncols == 0 {
            return Err(OperatorError::EmptyMatrix { nrows, ncols });
        }
        let expected = ncols + 1;
        if col_ptrs.len() != expected {
            return Err(OperatorError::ColPtrLen {
                expected,
                actual: col_ptrs.len(),
            });
        }
        if col_ptrs.first().copied().unwrap_or(0) != 0 {
            return Err(OperatorError::ColPtrStart { value: col_ptrs[0] });
        }
        for col in 0..ncols {
            let prev = col_ptrs[col];
            let next = col_ptrs[col + 1];
            if prev > next {
                return Err(OperatorError::ColPtrNotMonotonic { col, prev, next });
            }
        }
        let last = col_ptrs[ncols];
        if last != row_indices.len() {
            return Err(OperatorError::ColPtrOutOfBounds {
                last,
                row_indices_len: row_indices.len(),
            });
        }
        if values.len() != row_indices.len() {
            return Err(OperatorError::ValueCount {
                expected: row_indices.len(),
                actual: values.len(),
            });
        }

        for col in 0..ncols {
            let start = col_ptrs[col];
            let end = col_ptrs[col + 1];
            if start == end {
                continue;
            }
            let mut prev = row_indices[start];
            if prev >= nrows {
                return Err(OperatorError::RowIndexOutOfBounds {
                    col,
                    row: prev,
                    nrows,
                });
            }
            for &row in &row_indices[start + 1..end] {
                if prev >= row {
                    return Err(OperatorError::RowIndexNotSorted {
                        col,
                        prev,
                        next: row,
                    });
                }
                if row >= nrows {
                    return Err(OperatorError::RowIndexOutOfBounds { col, row, nrows });
                }
                prev = row;
            }
        }

        Ok(Self {
            nrows,
            ncols,
            col_ptrs,
            row_indices,
            values,
        })
    }

    /// Number of non-zeros.
    pub fn nnz(&self) -> usize {
        self.row_indices.len()
    }

    fn col_range(&self, col: usize) -> Range<usize> {
        self.col_ptrs[col]..self.col_ptrs[col + 1]
    }
}

impl LinearOperator for CscOperator {
    fn nrows(&self) -> usize {
        self.nrows
    }

    fn ncols(&self) -> usize {
        self.ncols
    }

    fn apply(&self, v: &[f64], out: &mut [f64]) {
        out.fill(0.0);
        for col in 0..self.ncols {
            let vc = v[col];
            if vc == 0.0 {
                continue;
            }
            for idx in self.col_range(col) {
                out[self.row_indices[idx]] += self.values[idx] * vc;
            }
        }
    }

    fn apply_adjoint(&self, v: &[f64], out: &mut [f64]) {
        for col in 0..self.ncols {
            let mut sum = 0.0;
            for idx in self.col_range(col) {
                sum += self.values[idx] * v[self.row_indices[idx]];
            }
            out[col] = sum;
        }
    }
}

/// Matrix-free operator built from a forward and an adjoint closure.
///
/// The caller is responsible for the closures actually being adjoint to each
/// other; nothing here can check it.
pub struct FnOperator<F, G> {
    nrows: usize,
    ncols: usize,
    forward: F,
    adjoint: G,
}

impl<F, G> FnOperator<F, G>
where
    F: Fn(&[f64], &mut [f64]),
    G: Fn(&[f64], &mut [f64]),
{
    pub fn new(nrows: usize, ncols: usize, forward: F, adjoint: G) -> Self {
        Self {
            nrows,
            ncols,
            forward,
            adjoint,
        }
    }
}

impl<F, G> LinearOperator for FnOperator<F, G>
where
    F: Fn(&[f64], &mut [f64]),
    G: Fn(&[f64], &mut [f64]),
{
    fn nrows(&self) -> usize {
        self.nrows
    }

    fn ncols(&self) -> usize {
        self.ncols
    }

    fn apply(&self, v: &[f64], out: &mut [f64]) {
        (self.forward)(v, out);
    }

    fn apply_adjoint(&self, v: &[f64], out: &mut [f64]) {
        (self.adjoint)(v, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dense_and_csc_agree() {
        // [1 0 2]
        // [0 3 0]
        let dense = DenseOperator::from_row_major(
            2,
            3,
            &[1.0, 0.0, 2.0, 0.0, 3.0, 0.0],
            Parallelism::None,
        )
        .unwrap();
        let csc = CscOperator::new(
            2,
            3,
            vec![0, 1, 2, 3],
            vec![0, 1, 0],
            vec![1.0, 3.0, 2.0],
        )
        .unwrap();

        let v = [1.0, -2.0, 0.5];
        let mut out_dense = [0.0; 2];
        let mut out_csc = [0.0; 2];
        dense.apply(&v, &mut out_dense);
        csc.apply(&v, &mut out_csc);
        for (a, b) in out_dense.iter().zip(out_csc.iter()) {
            assert!((a - b).abs() < 1e-14);
        }

        let r = [2.0, -1.0];
        let mut adj_dense = [0.0; 3];
        let mut adj_csc = [0.0; 3];
        dense.apply_adjoint(&r, &mut adj_dense);
        csc.apply_adjoint(&r, &mut adj_csc);
        for (a, b) in adj_dense.iter().zip(adj_csc.iter()) {
            assert!((a - b).abs() < 1e-14);
        }
    }

    #[test]
    fn csc_rejects_bad_pattern() {
        assert!(matches!(
            CscOperator::new(2, 2, vec![0, 1], vec![0], vec![1.0]),
            Err(OperatorError::ColPtrLen { .. })
        ));
        assert!(matches!(
            CscOperator::new(2, 2, vec![0, 2, 2], vec![1, 0], vec![1.0, 1.0]),
            Err(OperatorError::RowIndexNotSorted { .. })
        ));
        assert!(matches!(
            CscOperator::new(2, 2, vec![0, 1, 2], vec![0, 2], vec![1.0, 1.0]),
            Err(OperatorError::RowIndexOutOfBounds { .. })
        ));
        assert!(matches!(
            CscOperator::new(2, 2, vec![0, 1, 2], vec![0, 1], vec![1.0]),
            Err(OperatorError::ValueCount { .. })
        ));
    }
}
