//! Convolutional feature extractor
//!
//! Each block is `Conv1d -> ReLU -> AdaptiveMaxPool1d(T)` along the time
//! axis. The pooling step pins the output back to exactly `T` timesteps
//! whatever the padding arithmetic produced. Blocks are stacked and the
//! final channels are projected to the encoder input width.

use ndarray::{s, Array1, Array2, Array3, ArrayView2, ArrayView3};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::layers::{relu, Linear};
use crate::error::{HarhnError, Result};

/// Padding on each side of a stride-1 convolution, `(kernel - 1) / 2`
///
/// Even kernels lose one step; the adaptive pool restores the length.
pub fn same_padding(kernel_size: usize) -> usize {
    kernel_size.saturating_sub(1) / 2
}

/// Adaptive max pooling over the last axis of [channels, len_in]
///
/// Output bin `i` covers `[⌊i·L/n⌋, ⌈(i+1)·L/n⌉)`, so bins may overlap when
/// upsampling.
pub fn adaptive_max_pool1d(x: ArrayView2<f64>, output_len: usize) -> Array2<f64> {
    let (channels, input_len) = x.dim();
    let mut out = Array2::zeros((channels, output_len));

    for i in 0..output_len {
        let start = i * input_len / output_len;
        let end = ((i + 1) * input_len + output_len - 1) / output_len;
        let window = x.slice(s![.., start..end]);
        for (c, row) in window.outer_iter().enumerate() {
            out[[c, i]] = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        }
    }

    out
}

/// 1-D convolution over [channels, time]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conv1d {
    /// Kernel weights [out_channels, in_channels, kernel_size]
    weights: Array3<f64>,
    /// Bias [out_channels]
    bias: Array1<f64>,
    /// Zero padding on each side
    padding: usize,
}

impl Conv1d {
    /// Create a new convolution with `U(-1/√(in·k), 1/√(in·k))` initialization
    pub fn new<R: Rng>(
        in_channels: usize,
        out_channels: usize,
        kernel_size: usize,
        padding: usize,
        rng: &mut R,
    ) -> Self {
        let limit = 1.0 / ((in_channels * kernel_size).max(1) as f64).sqrt();
        let dist = Uniform::new_inclusive(-limit, limit);

        Self {
            weights: Array3::random_using((out_channels, in_channels, kernel_size), dist, rng),
            bias: Array1::random_using(out_channels, dist, rng),
            padding,
        }
    }

    /// Input channel count
    pub fn in_channels(&self) -> usize {
        self.weights.shape()[1]
    }

    /// Output channel count
    pub fn out_channels(&self) -> usize {
        self.weights.shape()[0]
    }

    /// Kernel size
    pub fn kernel_size(&self) -> usize {
        self.weights.shape()[2]
    }

    /// Output length for a given input length, `None` if the kernel does not fit
    pub fn output_length(&self, input_len: usize) -> Option<usize> {
        (input_len + 2 * self.padding + 1).checked_sub(self.kernel_size())
    }

    /// Forward pass [in_channels, len] -> [out_channels, len_out]
    pub fn forward(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let (channels, len) = x.dim();
        let out_len = self
            .output_length(len)
            .filter(|&n| n > 0)
            .ok_or_else(|| HarhnError::shape("conv1d length", &[self.kernel_size()], &[len]))?;
        if channels != self.in_channels() {
            return Err(HarhnError::shape(
                "conv1d channels",
                &[self.in_channels(), len],
                x.shape(),
            ));
        }

        let mut padded = Array2::zeros((channels, len + 2 * self.padding));
        padded
            .slice_mut(s![.., self.padding..self.padding + len])
            .assign(&x);

        let k = self.kernel_size();
        let mut out = Array2::zeros((self.out_channels(), out_len));
        for t in 0..out_len {
            let window = padded.slice(s![.., t..t + k]);
            for (o, kernel) in self.weights.outer_iter().enumerate() {
                out[[o, t]] = (&kernel * &window).sum() + self.bias[o];
            }
        }

        Ok(out)
    }

    /// Number of learned parameters
    pub fn num_params(&self) -> usize {
        self.weights.len() + self.bias.len()
    }
}

/// One convolution block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvBlock {
    conv: Conv1d,
    timesteps: usize,
}

impl ConvBlock {
    /// Create a block for a fixed lookback window
    pub fn new<R: Rng>(
        timesteps: usize,
        in_channels: usize,
        n_filters: usize,
        filter_size: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if timesteps == 0 || filter_size == 0 || in_channels == 0 || n_filters == 0 {
            return Err(HarhnError::InvalidConfig(format!(
                "conv block needs positive sizes, got timesteps={}, in_channels={}, n_filters={}, filter_size={}",
                timesteps, in_channels, n_filters, filter_size
            )));
        }

        let padding = same_padding(filter_size);
        let conv = Conv1d::new(in_channels, n_filters, filter_size, padding, rng);
        if conv.output_length(timesteps).unwrap_or(0) == 0 {
            return Err(HarhnError::InvalidConfig(format!(
                "filter_size {} does not fit a lookback of {}",
                filter_size, timesteps
            )));
        }

        Ok(Self { conv, timesteps })
    }

    /// Forward pass [batch, T, in_channels] -> [batch, T, n_filters]
    pub fn forward(&self, x: ArrayView3<f64>) -> Result<Array3<f64>> {
        let (batch, steps, _) = x.dim();
        if steps != self.timesteps {
            return Err(HarhnError::shape(
                "conv block input",
                &[batch, self.timesteps, self.conv.in_channels()],
                x.shape(),
            ));
        }

        let mut out = Array3::zeros((batch, self.timesteps, self.conv.out_channels()));
        for (sample, mut target) in x.outer_iter().zip(out.outer_iter_mut()) {
            // [T, C] -> [C, T] for the convolution, back again for the output
            let activated = relu(&self.conv.forward(sample.t())?);
            let pooled = adaptive_max_pool1d(activated.view(), self.timesteps);
            target.assign(&pooled.t());
        }

        Ok(out)
    }

    /// Number of learned parameters
    pub fn num_params(&self) -> usize {
        self.conv.num_params()
    }
}

/// Stack of convolution blocks followed by a projection to the encoder width
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvFeatureExtractor {
    blocks: Vec<ConvBlock>,
    projection: Linear,
}

impl ConvFeatureExtractor {
    /// Create a new extractor
    ///
    /// # Arguments
    /// * `n_conv_layers` - Number of blocks, at least one
    /// * `timesteps` - Lookback window length
    /// * `in_feats` - Raw input feature count
    /// * `n_filters` - Filters per block
    /// * `filter_size` - Kernel size
    /// * `output_size` - Width of the projected features
    pub fn new<R: Rng>(
        n_conv_layers: usize,
        timesteps: usize,
        in_feats: usize,
        n_filters: usize,
        filter_size: usize,
        output_size: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if n_conv_layers == 0 {
            return Err(HarhnError::InvalidConfig(
                "n_conv_layers must be a positive integer, got 0".to_string(),
            ));
        }

        let blocks = (0..n_conv_layers)
            .map(|i| {
                let in_channels = if i == 0 { in_feats } else { n_filters };
                ConvBlock::new(timesteps, in_channels, n_filters, filter_size, rng)
            })
            .collect::<Result<Vec<_>>>()?;
        let projection = Linear::new(n_filters, output_size, true, rng);

        debug!(
            blocks = blocks.len(),
            padding = same_padding(filter_size),
            "Created convolutional feature extractor"
        );

        Ok(Self { blocks, projection })
    }

    /// Number of stacked blocks
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Forward pass [batch, T, in_feats] -> [batch, T, output_size]
    pub fn forward(&self, x: ArrayView3<f64>) -> Result<Array3<f64>> {
        let mut features = x.to_owned();
        for block in &self.blocks {
            features = block.forward(features.view())?;
        }
        self.projection.forward_3d(features.view())
    }

    /// Number of learned parameters
    pub fn num_params(&self) -> usize {
        self.blocks.iter().map(ConvBlock::num_params).sum::<usize>() + self.projection.num_params()
    }
}
