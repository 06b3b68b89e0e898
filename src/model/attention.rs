//! Hierarchical temporal attention decoder
//!
//! At every decoder step the current state `s` attends over all encoder
//! timesteps separately at each recurrence depth `k`:
//!
//! e_k = v_k · tanh(T_k · s + U_k · H_k)
//! α_k = softmax_T(e_k)
//! d_k = Σ_T α_k ⊙ H_k
//!
//! The per-depth contexts are concatenated into `d_t`, combined with the
//! observed target `y_t` and fed to the decoder cell. The prediction
//! reads out the last state and the last context through separate
//! projections.

use ndarray::{concatenate, s, Array2, Array3, Array4, ArrayView2, ArrayView3, ArrayView4, Axis};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::cell::RecurrentHighwayCell;
use super::config::HarhnConfig;
use super::layers::{softmax_rows, tanh, Linear};
use crate::error::{HarhnError, Result};

/// Additive attention over the encoder states of one depth
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepthAttention {
    /// Decoder state projection, no bias [n_units_enc, n_units_dec]
    t_k: Linear,
    /// Encoder state projection [n_units_enc, n_units_enc]
    u_k: Linear,
    /// Score projection [1, n_units_enc]
    v_k: Linear,
}

impl DepthAttention {
    /// Create attention parameters for one depth
    pub fn new<R: Rng>(n_units_enc: usize, n_units_dec: usize, rng: &mut R) -> Self {
        Self {
            t_k: Linear::new(n_units_dec, n_units_enc, false, rng),
            u_k: Linear::new(n_units_enc, n_units_enc, true, rng),
            v_k: Linear::new(n_units_enc, 1, true, rng),
        }
    }

    /// Project the encoder states of this depth, `U_k · H_k`
    ///
    /// Independent of the decoder state, so it is computed once per forward
    /// pass. `h_k` is [batch, T, n_units_enc].
    pub fn keys(&self, h_k: ArrayView3<f64>) -> Result<Array3<f64>> {
        self.u_k.forward_3d(h_k)
    }

    /// Attend over the encoder timesteps
    ///
    /// # Arguments
    /// * `h_k` - Encoder states of this depth [batch, T, n_units_enc]
    /// * `keys` - Output of [`DepthAttention::keys`] for `h_k`
    /// * `s` - Decoder state [batch, n_units_dec]
    ///
    /// # Returns
    /// * `(context, weights)` - [batch, n_units_enc] and [batch, T]
    pub fn attend(
        &self,
        h_k: ArrayView3<f64>,
        keys: &Array3<f64>,
        s: ArrayView2<f64>,
    ) -> Result<(Array2<f64>, Array2<f64>)> {
        let query = self.t_k.forward(s)?;
        if query.nrows() != keys.shape()[0] {
            return Err(HarhnError::shape(
                "attention query",
                &[keys.shape()[0], self.t_k.in_features()],
                s.shape(),
            ));
        }

        // Broadcast the query across every encoder timestep
        let energy = tanh(&(keys + &query.insert_axis(Axis(1))));
        let scores = self.v_k.forward_3d(energy.view())?.index_axis_move(Axis(2), 0);
        let weights = softmax_rows(&scores);

        let mut context = Array2::zeros((h_k.shape()[0], h_k.shape()[2]));
        for ((alpha, states), mut row) in weights
            .outer_iter()
            .zip(h_k.outer_iter())
            .zip(context.outer_iter_mut())
        {
            row.assign(&alpha.dot(&states));
        }

        Ok((context, weights))
    }

    /// Number of learned parameters
    pub fn num_params(&self) -> usize {
        self.t_k.num_params() + self.u_k.num_params() + self.v_k.num_params()
    }
}

/// Decoder output
#[derive(Debug, Clone)]
pub struct DecoderOutput {
    /// Prediction [batch, target_feats]
    pub prediction: Array2<f64>,
    /// Attention weights [decoder_step, depth, batch, encoder_step]
    pub attention: Array4<f64>,
}

/// Attention-driven recurrent highway decoder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalAttentionDecoder {
    lookback: usize,
    n_units_enc: usize,
    n_units_dec: usize,
    rec_depth: usize,
    target_feats: usize,
    /// One attention module per recurrence depth
    depth_attention: Vec<DepthAttention>,
    /// Decoder recurrence
    cell: RecurrentHighwayCell,
    /// Target path into the cell, no bias
    w_tilda: Linear,
    /// Context path into the cell
    v_tilda: Linear,
    /// State path of the prediction
    w: Linear,
    /// Context path of the prediction
    v: Linear,
}

impl TemporalAttentionDecoder {
    /// Create a decoder from the model configuration
    pub fn new<R: Rng>(config: &HarhnConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;

        let depth_attention = (0..config.rec_depth)
            .map(|_| DepthAttention::new(config.n_units_enc, config.n_units_dec, rng))
            .collect();
        let cell = RecurrentHighwayCell::new(&config.decoder_config(), rng)?;

        let context_width = config.context_width();
        let decoder = Self {
            lookback: config.lookback,
            n_units_enc: config.n_units_enc,
            n_units_dec: config.n_units_dec,
            rec_depth: config.rec_depth,
            target_feats: config.target_feats,
            depth_attention,
            cell,
            w_tilda: Linear::new(config.target_feats, config.target_feats, false, rng),
            v_tilda: Linear::new(context_width, config.target_feats, true, rng),
            w: Linear::new(config.n_units_dec, config.target_feats, true, rng),
            v: Linear::new(context_width, config.target_feats, true, rng),
        };

        debug!(
            depths = decoder.rec_depth,
            context_width = context_width,
            params = decoder.num_params(),
            "Created temporal attention decoder"
        );

        Ok(decoder)
    }

    /// Decoder cell
    pub fn cell(&self) -> &RecurrentHighwayCell {
        &self.cell
    }

    /// Decode a prediction
    ///
    /// # Arguments
    /// * `depth_states` - Encoder states [batch, n_units_enc, T, rec_depth]
    /// * `y` - Observed target history [batch, T, target_feats]
    pub fn forward(&self, depth_states: ArrayView4<f64>, y: ArrayView3<f64>) -> Result<Array2<f64>> {
        self.decode(depth_states, y, None)
    }

    /// Decode a prediction and keep every attention distribution
    pub fn forward_with_attention(
        &self,
        depth_states: ArrayView4<f64>,
        y: ArrayView3<f64>,
    ) -> Result<DecoderOutput> {
        let batch = depth_states.shape()[0];
        let mut attention = Array4::zeros((self.lookback, self.rec_depth, batch, self.lookback));
        let prediction = self.decode(depth_states, y, Some(&mut attention))?;
        Ok(DecoderOutput {
            prediction,
            attention,
        })
    }

    fn decode(
        &self,
        depth_states: ArrayView4<f64>,
        y: ArrayView3<f64>,
        mut attention: Option<&mut Array4<f64>>,
    ) -> Result<Array2<f64>> {
        let batch = depth_states.shape()[0];
        let expected = [batch, self.n_units_enc, self.lookback, self.rec_depth];
        if depth_states.shape() != expected {
            return Err(HarhnError::shape("decoder encoder states", &expected, depth_states.shape()));
        }
        let expected = [batch, self.lookback, self.target_feats];
        if y.shape() != expected {
            return Err(HarhnError::shape("decoder target history", &expected, y.shape()));
        }

        // H_k as [batch, T, n_units_enc] and U_k · H_k, once per depth
        let encoded: Vec<(Array3<f64>, Array3<f64>)> = self
            .depth_attention
            .par_iter()
            .enumerate()
            .map(|(k, module)| -> Result<(Array3<f64>, Array3<f64>)> {
                let h_k = depth_states
                    .index_axis(Axis(3), k)
                    .permuted_axes([0, 2, 1])
                    .as_standard_layout()
                    .into_owned();
                let keys = module.keys(h_k.view())?;
                Ok((h_k, keys))
            })
            .collect::<Result<_>>()?;

        let mut s = self.cell.init_state(batch);
        let mut context = Array2::zeros((batch, self.rec_depth * self.n_units_enc));

        for t in 0..self.lookback {
            let per_depth: Vec<(Array2<f64>, Array2<f64>)> = self
                .depth_attention
                .par_iter()
                .zip(encoded.par_iter())
                .map(|(module, (h_k, keys))| module.attend(h_k.view(), keys, s.view()))
                .collect::<Result<_>>()?;

            let contexts: Vec<ArrayView2<f64>> = per_depth.iter().map(|(d_k, _)| d_k.view()).collect();
            context = concatenate(Axis(1), &contexts)?;

            if let Some(attention) = attention.as_deref_mut() {
                for (k, (_, alpha_k)) in per_depth.iter().enumerate() {
                    attention.slice_mut(s![t, k, .., ..]).assign(alpha_k);
                }
            }

            let y_tilda = self.w_tilda.forward(y.index_axis(Axis(1), t))? + self.v_tilda.forward(context.view())?;
            s = self.cell.forward(y_tilda.view(), s.view())?.state;
        }

        let prediction = self.w.forward(s.view())? + self.v.forward(context.view())?;
        trace!(batch = batch, steps = self.lookback, "Decoded prediction");

        Ok(prediction)
    }

    /// Number of learned parameters
    pub fn num_params(&self) -> usize {
        self.depth_attention
            .iter()
            .map(DepthAttention::num_params)
            .sum::<usize>()
            + self.cell.num_params()
            + self.w_tilda.num_params()
            + self.v_tilda.num_params()
            + self.w.num_params()
            + self.v.num_params()
    }
}
