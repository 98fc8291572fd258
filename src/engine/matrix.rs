//! Row-major f64 matrix used for keys, values, and queries.
//!
//! Client payloads arrive as nested arrays of numbers; they are converted
//! into a `Matrix` exactly once at the API boundary, which is where all
//! shape validation happens. Past that point every row is guaranteed to
//! have the same width.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatrixError {
    #[error("matrix has no rows")]
    Empty,

    #[error("ragged rows: row {row} has {got} elements, expected {expected}")]
    RaggedRow {
        row: usize,
        got: usize,
        expected: usize,
    },
}

/// A dense row-major matrix of f64 values.
///
/// Rows are token positions (for keys/values) or query positions; columns
/// are vector components. All engine arithmetic runs in f64 regardless of
/// the precision the client sent, which keeps the softmax numerically
/// stable for large dot products.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Build a matrix from nested rows, validating that every row has the
    /// same width. Fails on zero rows or ragged input.
    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self, MatrixError> {
        let n_rows = rows.len();
        if n_rows == 0 {
            return Err(MatrixError::Empty);
        }

        let cols = rows[0].len();
        let mut data = Vec::with_capacity(n_rows * cols);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != cols {
                return Err(MatrixError::RaggedRow {
                    row: i,
                    got: row.len(),
                    expected: cols,
                });
            }
            data.extend_from_slice(row);
        }

        Ok(Self {
            rows: n_rows,
            cols,
            data,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Borrow row `i` as a slice of length `cols`.
    pub fn row(&self, i: usize) -> &[f64] {
        let start = i * self.cols;
        &self.data[start..start + self.cols]
    }

    /// Gather a subset of rows, in the order given by `indices`.
    pub fn gather(&self, indices: &[usize]) -> Matrix {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        Matrix {
            rows: indices.len(),
            cols: self.cols,
            data,
        }
    }

    /// Serialized size in bytes at f64 width.
    pub fn byte_size(&self) -> usize {
        self.data.len() * std::mem::size_of::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rows_valid() {
        let m = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(m.rows(), 2);
        assert_eq!(m.cols(), 2);
        assert_eq!(m.row(1), &[3.0, 4.0]);
    }

    #[test]
    fn test_from_rows_empty() {
        assert_eq!(Matrix::from_rows(vec![]), Err(MatrixError::Empty));
    }

    #[test]
    fn test_from_rows_ragged() {
        let err = Matrix::from_rows(vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert_eq!(
            err,
            MatrixError::RaggedRow {
                row: 1,
                got: 1,
                expected: 2
            }
        );
    }

    #[test]
    fn test_gather_preserves_order() {
        let m = Matrix::from_rows(vec![
            vec![0.0, 0.0],
            vec![1.0, 1.0],
            vec![2.0, 2.0],
            vec![3.0, 3.0],
        ])
        .unwrap();

        let sub = m.gather(&[0, 2, 3]);
        assert_eq!(sub.rows(), 3);
        assert_eq!(sub.row(0), &[0.0, 0.0]);
        assert_eq!(sub.row(1), &[2.0, 2.0]);
        assert_eq!(sub.row(2), &[3.0, 3.0]);
    }

    #[test]
    fn test_byte_size() {
        let m = Matrix::from_rows(vec![vec![1.0; 4]; 3]).unwrap();
        assert_eq!(m.byte_size(), 3 * 4 * 8);
    }
}
