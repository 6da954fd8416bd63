use crate::error::{DepnnError, Result};

/// Dense row-major `f32` matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct Matrix {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f32>,
}

impl Matrix {
    pub fn zeros(r: usize, c: usize) -> Self {
        Matrix {
            rows: r,
            cols: c,
            data: vec![0.0; r * c],
        }
    }

    pub fn from_vec(r: usize, c: usize, v: Vec<f32>) -> Self {
        assert_eq!(v.len(), r * c);
        Matrix {
            rows: r,
            cols: c,
            data: v,
        }
    }

    /// Single-row matrix holding `v`.
    pub fn row_vector(v: Vec<f32>) -> Self {
        let cols = v.len();
        Matrix::from_vec(1, cols, v)
    }

    pub fn get(&self, r: usize, c: usize) -> f32 {
        self.data[r * self.cols + c]
    }

    pub fn set(&mut self, r: usize, c: usize, v: f32) {
        self.data[r * self.cols + c] = v;
    }

    pub fn row(&self, r: usize) -> &[f32] {
        &self.data[r * self.cols..(r + 1) * self.cols]
    }

    pub fn rows_iter(&self) -> impl Iterator<Item = &[f32]> {
        // zero-width matrices still yield `rows` empty rows
        (0..self.rows).map(move |r| self.row(r))
    }

    /// Reinterpret the data with a new shape, keeping row-major order.
    pub fn reshape(self, rows: usize, cols: usize) -> Result<Matrix> {
        if rows * cols != self.data.len() {
            return Err(DepnnError::config(format!(
                "cannot reshape {}x{} into {rows}x{cols}",
                self.rows, self.cols
            )));
        }
        Ok(Matrix {
            rows,
            cols,
            data: self.data,
        })
    }

    pub fn matmul(a: &Matrix, b: &Matrix) -> Matrix {
        assert_eq!(a.cols, b.rows);
        let mut out = vec![0.0; a.rows * b.cols];
        for i in 0..a.rows {
            let a_row = &a.data[i * a.cols..(i + 1) * a.cols];
            for k in 0..a.cols {
                let a_val = a_row[k];
                let b_row = &b.data[k * b.cols..(k + 1) * b.cols];
                for j in 0..b.cols {
                    out[i * b.cols + j] += a_val * b_row[j];
                }
            }
        }
        Matrix::from_vec(a.rows, b.cols, out)
    }

    pub fn transpose(&self) -> Matrix {
        let mut v = vec![0.0; self.rows * self.cols];
        for i in 0..self.rows {
            for j in 0..self.cols {
                v[j * self.rows + i] = self.get(i, j);
            }
        }
        Matrix::from_vec(self.cols, self.rows, v)
    }

    /// Add `bias` to every row in place.
    pub fn add_row_vector(&mut self, bias: &[f32]) {
        assert_eq!(self.cols, bias.len());
        for row in self.data.chunks_mut(self.cols.max(1)) {
            for (v, b) in row.iter_mut().zip(bias) {
                *v += b;
            }
        }
    }

    pub fn relu_inplace(&mut self) {
        for v in self.data.iter_mut() {
            *v = relu(*v);
        }
    }

    /// Row-wise softmax: exponentiate, then divide by the row sum.
    ///
    /// No max subtraction is done, so large logits overflow to `inf` and the
    /// row becomes NaN. Use [`Matrix::softmax_stabilized_inplace`] when exact
    /// parity with previously trained models is not needed.
    pub fn softmax_inplace(&mut self) {
        let cols = self.cols.max(1);
        for row in self.data.chunks_mut(cols) {
            let mut sum = 0.0;
            for v in row.iter_mut() {
                *v = v.exp();
                sum += *v;
            }
            for v in row.iter_mut() {
                *v /= sum;
            }
        }
    }

    pub fn softmax_stabilized_inplace(&mut self) {
        let cols = self.cols.max(1);
        for row in self.data.chunks_mut(cols) {
            let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
            let mut sum = 0.0;
            for v in row.iter_mut() {
                *v = (*v - max).exp();
                sum += *v;
            }
            for v in row.iter_mut() {
                *v /= sum;
            }
        }
    }

    /// Index of the largest entry of every row.
    pub fn argmax_rows(&self) -> Vec<usize> {
        self.rows_iter().map(argmax).collect()
    }

    /// Shift every column to zero mean and scale it to unit variance.
    ///
    /// Uses the sample standard deviation and adds `1e-5` to the divisor, so
    /// constant columns become all zeros.
    pub fn normalize_columns(&mut self) {
        if self.rows == 0 {
            return;
        }
        let n = self.rows as f32;
        for c in 0..self.cols {
            let mean = (0..self.rows).map(|r| self.get(r, c)).sum::<f32>() / n;
            let var = if self.rows > 1 {
                (0..self.rows)
                    .map(|r| {
                        let d = self.get(r, c) - mean;
                        d * d
                    })
                    .sum::<f32>()
                    / (n - 1.0)
            } else {
                0.0
            };
            let std = var.sqrt() + 1e-5;
            for r in 0..self.rows {
                let v = (self.get(r, c) - mean) / std;
                self.set(r, c, v);
            }
        }
    }
}

pub fn relu(z: f32) -> f32 {
    if z > 0.0 {
        z
    } else {
        0.0
    }
}

/// Position of the maximum value; ties go to the lowest index.
pub fn argmax(v: &[f32]) -> usize {
    let mut best = 0usize;
    let mut best_val = f32::NEG_INFINITY;
    for (i, &x) in v.iter().enumerate() {
        if x > best_val {
            best_val = x;
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reshape_keeps_row_major_order() {
        let m = Matrix::row_vector(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let r = m.reshape(2, 3).unwrap();
        assert_eq!(r.row(0), &[1.0, 2.0, 3.0]);
        assert_eq!(r.row(1), &[4.0, 5.0, 6.0]);
        assert!(r.reshape(4, 2).is_err());
    }

    #[test]
    fn transpose_swaps_axes() {
        let m = Matrix::from_vec(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let t = m.transpose();
        assert_eq!((t.rows, t.cols), (3, 2));
        assert_eq!(t.data, vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn relu_clamps_negatives() {
        for z in [-3.5f32, -0.0, 0.0, 1e-7, 2.0] {
            let out = relu(z);
            assert!(out >= 0.0);
            if z > 0.0 {
                assert_eq!(out, z);
            } else {
                assert_eq!(out, 0.0);
            }
        }
    }

    #[test]
    fn exact_softmax_overflows_where_stabilized_does_not() {
        let mut exact = Matrix::row_vector(vec![1000.0, 0.0]);
        let mut stable = exact.clone();
        exact.softmax_inplace();
        stable.softmax_stabilized_inplace();
        assert!(exact.data[0].is_nan());
        assert!((stable.data[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn argmax_prefers_lowest_index_on_tie() {
        assert_eq!(argmax(&[0.5, 0.5]), 0);
        assert_eq!(argmax(&[0.1, 0.7, 0.7]), 1);
    }

    #[test]
    fn normalize_columns_centres_data() {
        let mut m = Matrix::from_vec(3, 2, vec![1.0, 5.0, 2.0, 5.0, 3.0, 5.0]);
        m.normalize_columns();
        let mean0: f32 = (0..3).map(|r| m.get(r, 0)).sum::<f32>() / 3.0;
        assert!(mean0.abs() < 1e-6);
        assert!((m.get(2, 0) - 1.0).abs() < 1e-4);
        for r in 0..3 {
            assert_eq!(m.get(r, 1), 0.0);
        }
    }
}
