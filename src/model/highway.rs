//! Highway state gating (HSG)
//!
//! Blends the last recurrence depth `s_l` with the cell's incoming state
//! `s_prev`:
//!
//! g = σ(W_R · s_prev + W_F · s_l + b_F)
//! s' = g ⊙ s_prev + (1 - g) ⊙ s_l

use ndarray::{Array2, ArrayView2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::layers::{sigmoid, Linear};
use crate::defaults;
use crate::error::{HarhnError, Result};

/// Gated blend between two states of equal width
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HighwayGate {
    /// Recurrent path, no bias [n_units, n_units]
    w_r: Linear,
    /// Current-layer path [n_units, n_units]
    w_f: Linear,
}

impl HighwayGate {
    /// Create a new gate
    ///
    /// With `init_gates_closed` the bias of `W_F` starts at
    /// `CLOSED_GATE_BIAS`, so `g` starts near zero.
    pub fn new<R: Rng>(n_units: usize, init_gates_closed: bool, rng: &mut R) -> Self {
        let w_r = Linear::new(n_units, n_units, false, rng);
        let mut w_f = Linear::new(n_units, n_units, true, rng);
        if init_gates_closed {
            w_f = w_f.with_constant_bias(defaults::CLOSED_GATE_BIAS);
        }
        Self { w_r, w_f }
    }

    /// Gate values in [0, 1], one per unit
    pub fn gate(&self, s_l: ArrayView2<f64>, s_prev: ArrayView2<f64>) -> Result<Array2<f64>> {
        if s_l.dim() != s_prev.dim() {
            return Err(HarhnError::shape("highway gate", s_prev.shape(), s_l.shape()));
        }
        let pre = self.w_r.forward(s_prev)? + self.w_f.forward(s_l)?;
        Ok(sigmoid(&pre))
    }

    /// Blend `s_l` with `s_prev`
    pub fn forward(&self, s_l: ArrayView2<f64>, s_prev: ArrayView2<f64>) -> Result<Array2<f64>> {
        let g = self.gate(s_l, s_prev)?;
        let carry = g.mapv(|v| 1.0 - v);
        Ok(&g * &s_prev + &carry * &s_l)
    }

    /// Number of learned parameters
    pub fn num_params(&self) -> usize {
        self.w_r.num_params() + self.w_f.num_params()
    }
}
