//! Two-layer feed-forward scorer loaded from a flat coefficient blob.
//!
//! Blob layout, all values little-endian `f32`:
//!
//! ```text
//! [ W_h : HIDDEN*INPUT ][ b_h : HIDDEN ][ W_out : OUTPUT*HIDDEN ][ b_out : OUTPUT ]
//! ```
//!
//! `W_h` is stored as a row-major HIDDEN x INPUT matrix and `W_out` as
//! OUTPUT x HIDDEN; both are transposed on load so that a batch multiplies
//! from the left (`input * W_h`). Biases become single rows.

use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{DepnnError, Result};
use crate::math::Matrix;

const VALUE_BYTES: usize = std::mem::size_of::<f32>();

/// Layer sizes of the network and the blob segments they imply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlobLayout {
    pub input: usize,
    pub hidden: usize,
    pub output: usize,
}

impl BlobLayout {
    pub fn new(input: usize, hidden: usize, output: usize) -> Result<Self> {
        if input == 0 || hidden == 0 || output == 0 {
            return Err(DepnnError::config(format!(
                "layer sizes must be positive, got {input}/{hidden}/{output}"
            )));
        }
        Ok(Self {
            input,
            hidden,
            output,
        })
    }

    /// Total number of values in a blob for this layout.
    pub fn len(&self) -> usize {
        self.hidden * self.input + self.hidden + self.hidden * self.output + self.output
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn segments(&self) -> [std::ops::Range<usize>; 4] {
        let w_h = 0..self.hidden * self.input;
        let b_h = w_h.end..w_h.end + self.hidden;
        let w_out = b_h.end..b_h.end + self.hidden * self.output;
        let b_out = w_out.end..w_out.end + self.output;
        [w_h, b_h, w_out, b_out]
    }
}

/// How output rows are normalised.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoftmaxMode {
    /// `exp(z) / sum(exp(z))` without subtracting the row maximum. Overflows
    /// to NaN for large logits.
    #[default]
    Exact,
    /// Subtracts the row maximum before exponentiating.
    Stabilized,
}

/// Read a coefficient blob written by [`write_blob`].
pub fn read_blob<P: AsRef<Path>>(path: P) -> Result<Vec<f32>> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    if bytes.len() % VALUE_BYTES != 0 {
        return Err(DepnnError::format(format!(
            "{}: {} bytes is not a whole number of f32 values",
            path.display(),
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(VALUE_BYTES)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

pub fn write_blob<P: AsRef<Path>>(path: P, values: &[f32]) -> Result<()> {
    let mut bytes = Vec::with_capacity(values.len() * VALUE_BYTES);
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    fs::write(path.as_ref(), bytes)?;
    info!(
        "Saved {} coefficients to {}",
        values.len(),
        path.as_ref().display()
    );
    Ok(())
}

/// Inference-only network: dense + ReLU, then dense + softmax.
#[derive(Clone, Debug)]
pub struct Network {
    layout: BlobLayout,
    /// INPUT x HIDDEN
    w_h: Matrix,
    b_h: Vec<f32>,
    /// HIDDEN x OUTPUT
    w_out: Matrix,
    b_out: Vec<f32>,
    softmax: SoftmaxMode,
}

impl Network {
    pub fn from_blob(blob: &[f32], layout: BlobLayout) -> Result<Self> {
        if blob.len() != layout.len() {
            return Err(DepnnError::format(format!(
                "coefficient blob has {} values, layout {}x{}x{} needs {}",
                blob.len(),
                layout.input,
                layout.hidden,
                layout.output,
                layout.len()
            )));
        }
        let [w_h, b_h, w_out, b_out] = layout.segments();
        let segment = |r: std::ops::Range<usize>| Matrix::row_vector(blob[r].to_vec());

        let w_h = segment(w_h)
            .reshape(layout.hidden, layout.input)?
            .transpose();
        let b_h = segment(b_h).reshape(layout.hidden, 1)?.transpose();
        let w_out = segment(w_out)
            .reshape(layout.output, layout.hidden)?
            .transpose();
        let b_out = segment(b_out).reshape(1, layout.output)?;

        Ok(Self {
            layout,
            w_h,
            b_h: b_h.data,
            w_out,
            b_out: b_out.data,
            softmax: SoftmaxMode::Exact,
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P, layout: BlobLayout) -> Result<Self> {
        let blob = read_blob(path.as_ref())?;
        let net = Self::from_blob(&blob, layout)?;
        info!(
            "Loaded network {}x{}x{} from {}",
            layout.input,
            layout.hidden,
            layout.output,
            path.as_ref().display()
        );
        Ok(net)
    }

    pub fn with_softmax(mut self, mode: SoftmaxMode) -> Self {
        self.softmax = mode;
        self
    }

    pub fn layout(&self) -> BlobLayout {
        self.layout
    }

    /// Serialise back into blob order; inverse of [`Network::from_blob`].
    pub fn to_blob(&self) -> Vec<f32> {
        let mut blob = Vec::with_capacity(self.layout.len());
        blob.extend_from_slice(&self.w_h.transpose().data);
        blob.extend_from_slice(&self.b_h);
        blob.extend_from_slice(&self.w_out.transpose().data);
        blob.extend_from_slice(&self.b_out);
        blob
    }

    /// Class probabilities for every input row.
    pub fn forward(&self, inputs: &Matrix) -> Result<Matrix> {
        if inputs.cols != self.layout.input {
            return Err(DepnnError::config(format!(
                "input rows have {} columns, network expects {}",
                inputs.cols, self.layout.input
            )));
        }
        self.forward_precomputed(Matrix::matmul(inputs, &self.w_h))
    }

    /// Like [`Network::forward`] for inputs already multiplied by the hidden
    /// weights (`inputs * W_h`). The caller must have used this network's
    /// weights, e.g. via [`Network::hidden_weight_block`].
    pub fn forward_precomputed(&self, mut partial: Matrix) -> Result<Matrix> {
        if partial.cols != self.layout.hidden {
            return Err(DepnnError::config(format!(
                "precomputed rows have {} columns, hidden layer has {}",
                partial.cols, self.layout.hidden
            )));
        }
        partial.add_row_vector(&self.b_h);
        partial.relu_inplace();
        let mut out = Matrix::matmul(&partial, &self.w_out);
        out.add_row_vector(&self.b_out);
        match self.softmax {
            SoftmaxMode::Exact => out.softmax_inplace(),
            SoftmaxMode::Stabilized => out.softmax_stabilized_inplace(),
        }
        if out.data.iter().any(|v| !v.is_finite()) {
            warn!("non-finite class probabilities; logits overflowed the exact softmax");
        }
        Ok(out)
    }

    /// Most probable class per row, lowest index on ties.
    pub fn predict_class(&self, inputs: &Matrix) -> Result<Vec<usize>> {
        Ok(self.forward(inputs)?.argmax_rows())
    }

    /// Rows `[slot * size, (slot + 1) * size)` of the INPUT x HIDDEN weights,
    /// i.e. the weights applied to one input block.
    pub fn hidden_weight_block(&self, slot: usize, size: usize) -> Result<Matrix> {
        let (start, end) = match slot.checked_mul(size) {
            Some(start) => match start.checked_add(size) {
                Some(end) if end <= self.w_h.rows => (start, end),
                _ => return Err(self.block_out_of_range(slot, size)),
            },
            None => return Err(self.block_out_of_range(slot, size)),
        };
        let cols = self.w_h.cols;
        Ok(Matrix::from_vec(
            size,
            cols,
            self.w_h.data[start * cols..end * cols].to_vec(),
        ))
    }

    fn block_out_of_range(&self, slot: usize, size: usize) -> DepnnError {
        DepnnError::config(format!(
            "block {slot} of size {size} exceeds {} input rows",
            self.w_h.rows
        ))
    }

    /// Contribution of one input block to the hidden pre-activation.
    /// Summing this over all blocks of a row gives `row * W_h`.
    pub fn precompute_slot(&self, slot: usize, block: &[f32]) -> Result<Vec<f32>> {
        let weights = self.hidden_weight_block(slot, block.len())?;
        let row = Matrix::row_vector(block.to_vec());
        Ok(Matrix::matmul(&row, &weights).data)
    }
}
