//! Recurrent highway network encoder
//!
//! Unrolls a [`RecurrentHighwayCell`] over the lookback window, starting from
//! a zero state, and keeps every depth's state for the decoder.

use ndarray::{s, Array2, Array3, Array4, ArrayView2, ArrayView3, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::cell::RecurrentHighwayCell;
use super::config::RhnConfig;
use super::layers::BatchNorm1d;
use crate::error::{HarhnError, Result};

/// Per-timestep normalization applied before each cell step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StepNormalization {
    /// Inputs and state are passed through unchanged
    Identity,
    /// Inputs and state are normalized over the batch, independently
    Batch {
        /// Normalization of the timestep input
        inputs: BatchNorm1d,
        /// Normalization of the running state
        state: BatchNorm1d,
    },
}

impl StepNormalization {
    fn from_config(config: &RhnConfig) -> Self {
        if config.use_batch_norm {
            StepNormalization::Batch {
                inputs: BatchNorm1d::new(config.in_feats),
                state: BatchNorm1d::new(config.n_units),
            }
        } else {
            StepNormalization::Identity
        }
    }

    fn apply(&self, x: ArrayView2<f64>, s: Array2<f64>) -> Result<(Array2<f64>, Array2<f64>)> {
        match self {
            StepNormalization::Identity => Ok((x.to_owned(), s)),
            StepNormalization::Batch { inputs, state } => {
                Ok((inputs.forward(x)?, state.forward(s.view())?))
            }
        }
    }

    fn num_params(&self) -> usize {
        match self {
            StepNormalization::Identity => 0,
            StepNormalization::Batch { inputs, state } => inputs.num_params() + state.num_params(),
        }
    }
}

/// Encoder output
#[derive(Debug, Clone)]
pub struct EncoderOutput {
    /// Final state of every timestep [batch, T, n_units]
    pub states: Array3<f64>,
    /// State of every depth at every timestep [batch, n_units, T, rec_depth]
    pub depth_states: Array4<f64>,
}

/// Recurrent highway network over a sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrentHighwayNetwork {
    config: RhnConfig,
    cell: RecurrentHighwayCell,
    normalization: StepNormalization,
}

impl RecurrentHighwayNetwork {
    /// Create a new network
    pub fn new<R: Rng>(config: RhnConfig, rng: &mut R) -> Result<Self> {
        let cell = RecurrentHighwayCell::new(&config, rng)?;
        let normalization = StepNormalization::from_config(&config);

        debug!(
            batch_norm = config.use_batch_norm,
            params = cell.num_params() + normalization.num_params(),
            "Created recurrent highway network"
        );

        Ok(Self {
            config,
            cell,
            normalization,
        })
    }

    /// Network configuration
    pub fn config(&self) -> &RhnConfig {
        &self.config
    }

    /// Underlying cell
    pub fn cell(&self) -> &RecurrentHighwayCell {
        &self.cell
    }

    /// Run the network over a sequence
    ///
    /// # Arguments
    /// * `x` - Input sequence [batch, T, in_feats]
    pub fn forward(&self, x: ArrayView3<f64>) -> Result<EncoderOutput> {
        let (batch, steps, features) = x.dim();
        if features != self.config.in_feats {
            return Err(HarhnError::shape(
                "encoder input",
                &[batch, steps, self.config.in_feats],
                x.shape(),
            ));
        }

        let units = self.config.n_units;
        let depth = self.config.rec_depth;

        let mut states = Array3::zeros((batch, steps, units));
        let mut depth_states = Array4::zeros((batch, units, steps, depth));
        let mut s = self.cell.init_state(batch);

        for t in 0..steps {
            let (x_t, s_in) = self.normalization.apply(x.index_axis(Axis(1), t), s)?;
            let out = self.cell.forward(x_t.view(), s_in.view())?;

            states.index_axis_mut(Axis(1), t).assign(&out.state);
            for (d, state_d) in out.depth_states.axis_iter(Axis(0)).enumerate() {
                depth_states.slice_mut(s![.., .., t, d]).assign(&state_d);
            }
            s = out.state;
        }

        trace!(batch = batch, steps = steps, depth = depth, "Encoded sequence");

        Ok(EncoderOutput {
            states,
            depth_states,
        })
    }

    /// Number of learned parameters
    pub fn num_params(&self) -> usize {
        self.cell.num_params() + self.normalization.num_params()
    }
}
