//! Building blocks shared by every HARHN component
//!
//! - `Linear` - fully connected layer applied row-wise to a batch
//! - `BatchNorm1d` - per-feature normalization using batch statistics
//! - element-wise activations and a row-wise softmax

use ndarray::{Array, Array1, Array2, Array3, ArrayView2, ArrayView3, Axis, Dimension};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{HarhnError, Result};

/// Fully connected layer: `y = x · Wᵀ + b`
///
/// Weights are stored as `[out_features, in_features]` and initialized from
/// `U(-1/√in, 1/√in)`, biases from the same range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Linear {
    /// Weight matrix [out_features, in_features]
    pub weights: Array2<f64>,
    /// Optional bias [out_features]
    pub bias: Option<Array1<f64>>,
}

impl Linear {
    /// Create a new layer
    ///
    /// # Arguments
    /// * `in_features` - Width of each input row
    /// * `out_features` - Width of each output row
    /// * `bias` - Whether the layer carries a learned bias
    /// * `rng` - Source of randomness for initialization
    pub fn new<R: Rng>(in_features: usize, out_features: usize, bias: bool, rng: &mut R) -> Self {
        let limit = 1.0 / (in_features.max(1) as f64).sqrt();
        let dist = Uniform::new_inclusive(-limit, limit);

        let weights = Array2::random_using((out_features, in_features), dist, rng);
        let bias = bias.then(|| Array1::random_using(out_features, dist, rng));

        Self { weights, bias }
    }

    /// Replace the bias with a constant vector
    pub fn with_constant_bias(mut self, value: f64) -> Self {
        self.bias = Some(Array1::from_elem(self.out_features(), value));
        self
    }

    /// Input width
    pub fn in_features(&self) -> usize {
        self.weights.ncols()
    }

    /// Output width
    pub fn out_features(&self) -> usize {
        self.weights.nrows()
    }

    /// Forward pass for a batch [batch, in_features] -> [batch, out_features]
    pub fn forward(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.in_features() {
            return Err(HarhnError::shape(
                "linear input",
                &[x.nrows(), self.in_features()],
                x.shape(),
            ));
        }

        let mut out = x.dot(&self.weights.t());
        if let Some(bias) = &self.bias {
            out += bias;
        }
        Ok(out)
    }

    /// Forward pass over the last axis of [batch, time, in_features]
    pub fn forward_3d(&self, x: ArrayView3<f64>) -> Result<Array3<f64>> {
        let (batch, steps, features) = x.dim();
        let flat = Array2::from_shape_vec((batch * steps, features), x.iter().copied().collect())?;
        let out = self.forward(flat.view())?;
        Ok(out.into_shape((batch, steps, self.out_features()))?)
    }

    /// Number of learned parameters
    pub fn num_params(&self) -> usize {
        self.weights.len() + self.bias.as_ref().map_or(0, |b| b.len())
    }
}

/// Batch normalization over the batch axis of [batch, features]
///
/// Statistics are always taken from the current batch (biased variance), so
/// every call normalizes independently of previous calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchNorm1d {
    /// Scale parameter (gamma)
    pub gamma: Array1<f64>,
    /// Shift parameter (beta)
    pub beta: Array1<f64>,
    /// Small constant for numerical stability
    pub eps: f64,
}

impl BatchNorm1d {
    /// Create a new layer with identity affine parameters
    pub fn new(num_features: usize) -> Self {
        Self {
            gamma: Array1::ones(num_features),
            beta: Array1::zeros(num_features),
            eps: defaults::BATCH_NORM_EPS,
        }
    }

    /// Normalize each feature column using the batch mean and variance
    pub fn forward(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.gamma.len() {
            return Err(HarhnError::shape(
                "batch norm input",
                &[x.nrows(), self.gamma.len()],
                x.shape(),
            ));
        }
        // Batch statistics need at least two rows
        if x.nrows() < 2 {
            return Err(HarhnError::InsufficientData(format!(
                "batch normalization needs more than one sample per feature, got {}",
                x.nrows()
            )));
        }

        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| HarhnError::shape("batch norm input", &[1, self.gamma.len()], x.shape()))?;
        let std = x.var_axis(Axis(0), 0.0).mapv(|v| (v + self.eps).sqrt());

        let normalized = (&x - &mean) / &std;
        Ok(normalized * &self.gamma + &self.beta)
    }

    /// Number of learned parameters
    pub fn num_params(&self) -> usize {
        self.gamma.len() + self.beta.len()
    }
}

/// Logistic sigmoid, element-wise
pub fn sigmoid<D: Dimension>(x: &Array<f64, D>) -> Array<f64, D> {
    x.mapv(|v| 1.0 / (1.0 + (-v).exp()))
}

/// Hyperbolic tangent, element-wise
pub fn tanh<D: Dimension>(x: &Array<f64, D>) -> Array<f64, D> {
    x.mapv(f64::tanh)
}

/// Rectified linear unit, element-wise
pub fn relu<D: Dimension>(x: &Array<f64, D>) -> Array<f64, D> {
    x.mapv(|v| v.max(0.0))
}

/// Softmax along each row of [batch, n]
pub fn softmax_rows(x: &Array2<f64>) -> Array2<f64> {
    let mut out = x.clone();
    for mut row in out.rows_mut() {
        let max_val = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        row.mapv_inplace(|v| (v - max_val).exp());
        let sum = row.sum();
        row /= sum;
    }
    out
}
