//! Recurrent highway cell
//!
//! One call advances the state by one timestep through `rec_depth`
//! sequential micro-layers. Depth 0 sees the input `x`, deeper layers only
//! see the running state:
//!
//! h = tanh(W_H · x + R_H[d] · s)
//! t = σ(W_T · x + R_T[d] · s)
//! s = h ⊙ t + c ⊙ s
//!
//! where the carry gate `c` is either `1 - t` (coupled) or its own learned
//! gate. Every depth's state is kept for the decoder's attention.

use ndarray::{Array2, Array3, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::RhnConfig;
use super::highway::HighwayGate;
use super::layers::{sigmoid, tanh, Linear};
use crate::defaults;
use crate::error::{HarhnError, Result};

/// How the carry gate is produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CarryGate {
    /// `c = 1 - t`, no parameters of its own
    Coupled,
    /// `c = σ(W_C · x + R_C[d] · s)`
    Learned {
        /// Input path, used at depth 0 only
        w_c: Linear,
        /// One recurrent layer per depth
        r_c: Vec<Linear>,
    },
}

impl CarryGate {
    fn learned<R: Rng>(config: &RhnConfig, rng: &mut R) -> Self {
        let w_c = Linear::new(config.in_feats, config.n_units, false, rng);
        let r_c = (0..config.rec_depth)
            .map(|_| {
                let layer = Linear::new(config.n_units, config.n_units, true, rng);
                if config.init_gates_closed {
                    layer.with_constant_bias(defaults::CLOSED_GATE_BIAS)
                } else {
                    layer
                }
            })
            .collect();
        CarryGate::Learned { w_c, r_c }
    }

    /// Carry values for one depth
    ///
    /// `x` is `Some` only at depth 0.
    fn carry(
        &self,
        depth: usize,
        x: Option<ArrayView2<f64>>,
        s: ArrayView2<f64>,
        transform: &Array2<f64>,
    ) -> Result<Array2<f64>> {
        match self {
            CarryGate::Coupled => Ok(transform.mapv(|t| 1.0 - t)),
            CarryGate::Learned { w_c, r_c } => {
                let mut pre = r_c[depth].forward(s)?;
                if let Some(x) = x {
                    pre += &w_c.forward(x)?;
                }
                Ok(sigmoid(&pre))
            }
        }
    }

    /// Whether the carry gate is derived from the transform gate
    pub fn is_coupled(&self) -> bool {
        matches!(self, CarryGate::Coupled)
    }

    fn num_params(&self) -> usize {
        match self {
            CarryGate::Coupled => 0,
            CarryGate::Learned { w_c, r_c } => {
                w_c.num_params() + r_c.iter().map(Linear::num_params).sum::<usize>()
            }
        }
    }
}

/// Result of one cell step
#[derive(Debug, Clone)]
pub struct CellOutput {
    /// Final state [batch, n_units]
    pub state: Array2<f64>,
    /// State after every depth [rec_depth, batch, n_units]
    pub depth_states: Array3<f64>,
}

/// Gate values recorded during a traced step, one entry per depth
#[derive(Debug, Clone, Default)]
pub struct GateTrace {
    /// Transform gates [batch, n_units]
    pub transform: Vec<Array2<f64>>,
    /// Carry gates [batch, n_units]
    pub carry: Vec<Array2<f64>>,
}

/// Recurrent highway cell
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecurrentHighwayCell {
    in_feats: usize,
    n_units: usize,
    rec_depth: usize,
    w_h: Linear,
    w_t: Linear,
    r_h: Vec<Linear>,
    r_t: Vec<Linear>,
    carry: CarryGate,
    hsg: Option<HighwayGate>,
}

impl RecurrentHighwayCell {
    /// Create a new cell
    pub fn new<R: Rng>(config: &RhnConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;

        let w_h = Linear::new(config.in_feats, config.n_units, false, rng);
        let w_t = Linear::new(config.in_feats, config.n_units, false, rng);

        let r_h = (0..config.rec_depth)
            .map(|_| Linear::new(config.n_units, config.n_units, true, rng))
            .collect();
        let r_t = (0..config.rec_depth)
            .map(|_| {
                let layer = Linear::new(config.n_units, config.n_units, true, rng);
                if config.init_gates_closed {
                    layer.with_constant_bias(defaults::CLOSED_GATE_BIAS)
                } else {
                    layer
                }
            })
            .collect();

        let carry = if config.couple_gates {
            CarryGate::Coupled
        } else {
            CarryGate::learned(config, rng)
        };

        let hsg = config
            .use_hsg
            .then(|| HighwayGate::new(config.n_units, config.init_gates_closed, rng));

        let cell = Self {
            in_feats: config.in_feats,
            n_units: config.n_units,
            rec_depth: config.rec_depth,
            w_h,
            w_t,
            r_h,
            r_t,
            carry,
            hsg,
        };

        debug!(
            in_feats = cell.in_feats,
            n_units = cell.n_units,
            rec_depth = cell.rec_depth,
            coupled = cell.carry.is_coupled(),
            hsg = cell.hsg.is_some(),
            params = cell.num_params(),
            "Created recurrent highway cell"
        );

        Ok(cell)
    }

    /// Input width
    pub fn in_feats(&self) -> usize {
        self.in_feats
    }

    /// State width
    pub fn n_units(&self) -> usize {
        self.n_units
    }

    /// Number of micro-layers per step
    pub fn rec_depth(&self) -> usize {
        self.rec_depth
    }

    /// Carry gate strategy
    pub fn carry_gate(&self) -> &CarryGate {
        &self.carry
    }

    /// Whether highway state gating is applied to the last depth
    pub fn uses_hsg(&self) -> bool {
        self.hsg.is_some()
    }

    /// Zero state for a batch
    pub fn init_state(&self, batch_size: usize) -> Array2<f64> {
        Array2::zeros((batch_size, self.n_units))
    }

    /// Advance the state by one timestep
    ///
    /// # Arguments
    /// * `x` - Input [batch, in_feats]
    /// * `s` - Incoming state [batch, n_units]
    pub fn forward(&self, x: ArrayView2<f64>, s: ArrayView2<f64>) -> Result<CellOutput> {
        self.step(x, s, None)
    }

    /// Advance the state by one timestep and record every gate value
    pub fn forward_traced(
        &self,
        x: ArrayView2<f64>,
        s: ArrayView2<f64>,
    ) -> Result<(CellOutput, GateTrace)> {
        let mut trace = GateTrace {
            transform: Vec::with_capacity(self.rec_depth),
            carry: Vec::with_capacity(self.rec_depth),
        };
        let output = self.step(x, s, Some(&mut trace))?;
        Ok((output, trace))
    }

    fn step(
        &self,
        x: ArrayView2<f64>,
        s_prev: ArrayView2<f64>,
        mut trace: Option<&mut GateTrace>,
    ) -> Result<CellOutput> {
        let batch = x.nrows();
        if x.ncols() != self.in_feats {
            return Err(HarhnError::shape("cell input", &[batch, self.in_feats], x.shape()));
        }
        if s_prev.dim() != (batch, self.n_units) {
            return Err(HarhnError::shape("cell state", &[batch, self.n_units], s_prev.shape()));
        }

        let mut s = s_prev.to_owned();
        let mut depth_states = Array3::zeros((self.rec_depth, batch, self.n_units));

        for depth in 0..self.rec_depth {
            let (h_pre, t_pre) = if depth == 0 {
                (
                    self.w_h.forward(x)? + self.r_h[0].forward(s.view())?,
                    self.w_t.forward(x)? + self.r_t[0].forward(s.view())?,
                )
            } else {
                (
                    self.r_h[depth].forward(s.view())?,
                    self.r_t[depth].forward(s.view())?,
                )
            };

            let h = tanh(&h_pre);
            let t = sigmoid(&t_pre);
            let x_in = (depth == 0).then_some(x);
            let c = self.carry.carry(depth, x_in, s.view(), &t)?;

            s = &h * &t + &c * &s;
            depth_states.index_axis_mut(Axis(0), depth).assign(&s);

            if let Some(trace) = trace.as_deref_mut() {
                trace.transform.push(t);
                trace.carry.push(c);
            }
        }

        if let Some(hsg) = &self.hsg {
            s = hsg.forward(s.view(), s_prev)?;
            depth_states
                .index_axis_mut(Axis(0), self.rec_depth - 1)
                .assign(&s);
        }

        Ok(CellOutput {
            state: s,
            depth_states,
        })
    }

    /// Number of learned parameters
    pub fn num_params(&self) -> usize {
        self.w_h.num_params()
            + self.w_t.num_params()
            + self.r_h.iter().map(Linear::num_params).sum::<usize>()
            + self.r_t.iter().map(Linear::num_params).sum::<usize>()
            + self.carry.num_params()
            + self.hsg.as_ref().map_or(0, HighwayGate::num_params)
    }
}
