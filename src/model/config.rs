//! Configuration of the HARHN model and its recurrent highway networks

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{HarhnError, Result};

/// Configuration of a single recurrent highway network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RhnConfig {
    /// Width of each timestep's input
    pub in_feats: usize,
    /// Width of the recurrent state
    pub n_units: usize,
    /// Number of micro-layers applied per timestep
    pub rec_depth: usize,
    /// Derive the carry gate as `1 - transform`
    pub couple_gates: bool,
    /// Blend the last depth with the incoming state through a highway gate
    pub use_hsg: bool,
    /// Start every gate bias at `CLOSED_GATE_BIAS`
    pub init_gates_closed: bool,
    /// Normalize inputs and state over the batch before every timestep
    pub use_batch_norm: bool,
}

impl RhnConfig {
    /// Create a configuration with the default gate options
    pub fn new(in_feats: usize, n_units: usize, rec_depth: usize) -> Self {
        Self {
            in_feats,
            n_units,
            rec_depth,
            couple_gates: true,
            use_hsg: false,
            init_gates_closed: false,
            use_batch_norm: false,
        }
    }

    /// Learn an independent carry gate
    pub fn decoupled(mut self) -> Self {
        self.couple_gates = false;
        self
    }

    /// Enable highway state gating on the last depth
    pub fn with_hsg(mut self) -> Self {
        self.use_hsg = true;
        self
    }

    /// Initialize gate biases to the closed position
    pub fn with_closed_gates(mut self) -> Self {
        self.init_gates_closed = true;
        self
    }

    /// Enable per-timestep batch normalization
    pub fn with_batch_norm(mut self) -> Self {
        self.use_batch_norm = true;
        self
    }

    /// Reject configurations that cannot build a network
    pub fn validate(&self) -> Result<()> {
        positive("rec_depth", self.rec_depth)?;
        positive("in_feats", self.in_feats)?;
        positive("n_units", self.n_units)?;
        Ok(())
    }
}

/// Configuration of the full HARHN forecaster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarhnConfig {
    /// Number of stacked convolution blocks
    pub n_conv_layers: usize,
    /// Lookback window length (T)
    pub lookback: usize,
    /// Number of raw input features
    pub in_feats: usize,
    /// Number of target features
    pub target_feats: usize,
    /// Encoder state width
    pub n_units_enc: usize,
    /// Decoder state width
    pub n_units_dec: usize,
    /// Width of the projection between convolutions and encoder
    pub enc_input_size: usize,
    /// Recurrence depth of both encoder and decoder cells
    pub rec_depth: usize,
    /// Filters per convolution block
    pub n_filters: usize,
    /// Convolution kernel size
    pub filter_size: usize,
    /// Derive carry gates as `1 - transform`
    pub couple_gates: bool,
    /// Highway state gating on the last depth
    pub use_hsg: bool,
    /// Start gate biases in the closed position
    pub init_gates_closed: bool,
    /// Batch normalization inside the encoder
    pub use_batch_norm: bool,
    /// Random seed for parameter initialization
    pub seed: Option<u64>,
}

impl Default for HarhnConfig {
    fn default() -> Self {
        Self {
            n_conv_layers: defaults::N_CONV_LAYERS,
            lookback: defaults::LOOKBACK,
            in_feats: defaults::IN_FEATS,
            target_feats: defaults::TARGET_FEATS,
            n_units_enc: defaults::N_UNITS_ENC,
            n_units_dec: defaults::N_UNITS_DEC,
            enc_input_size: defaults::ENC_INPUT_SIZE,
            rec_depth: defaults::REC_DEPTH,
            n_filters: defaults::N_FILTERS,
            filter_size: defaults::FILTER_SIZE,
            couple_gates: true,
            use_hsg: false,
            init_gates_closed: false,
            use_batch_norm: false,
            seed: None,
        }
    }
}

impl HarhnConfig {
    /// Create a configuration for the given data shape
    ///
    /// # Arguments
    /// * `n_conv_layers` - Number of convolution blocks
    /// * `lookback` - Lookback window length
    /// * `in_feats` - Raw input feature count
    /// * `target_feats` - Target feature count
    pub fn new(n_conv_layers: usize, lookback: usize, in_feats: usize, target_feats: usize) -> Self {
        Self {
            n_conv_layers,
            lookback,
            in_feats,
            target_feats,
            ..Default::default()
        }
    }

    /// Set encoder and decoder state widths
    pub fn with_units(mut self, n_units_enc: usize, n_units_dec: usize) -> Self {
        self.n_units_enc = n_units_enc;
        self.n_units_dec = n_units_dec;
        self
    }

    /// Set the recurrence depth
    pub fn with_rec_depth(mut self, rec_depth: usize) -> Self {
        self.rec_depth = rec_depth;
        self
    }

    /// Set the convolution filter count and kernel size
    pub fn with_filters(mut self, n_filters: usize, filter_size: usize) -> Self {
        self.n_filters = n_filters;
        self.filter_size = filter_size;
        self
    }

    /// Set the encoder input projection width
    pub fn with_enc_input_size(mut self, enc_input_size: usize) -> Self {
        self.enc_input_size = enc_input_size;
        self
    }

    /// Choose between coupled and independent carry gates
    pub fn with_coupled_gates(mut self, couple_gates: bool) -> Self {
        self.couple_gates = couple_gates;
        self
    }

    /// Toggle highway state gating
    pub fn with_hsg(mut self, use_hsg: bool) -> Self {
        self.use_hsg = use_hsg;
        self
    }

    /// Toggle closed gate bias initialization
    pub fn with_closed_gates(mut self, init_gates_closed: bool) -> Self {
        self.init_gates_closed = init_gates_closed;
        self
    }

    /// Toggle encoder batch normalization
    pub fn with_batch_norm(mut self, use_batch_norm: bool) -> Self {
        self.use_batch_norm = use_batch_norm;
        self
    }

    /// Fix the initialization seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Reject configurations that cannot build a model
    pub fn validate(&self) -> Result<()> {
        positive("n_conv_layers", self.n_conv_layers)?;
        positive("rec_depth", self.rec_depth)?;
        positive("lookback", self.lookback)?;
        positive("in_feats", self.in_feats)?;
        positive("target_feats", self.target_feats)?;
        positive("n_units_enc", self.n_units_enc)?;
        positive("n_units_dec", self.n_units_dec)?;
        positive("enc_input_size", self.enc_input_size)?;
        positive("n_filters", self.n_filters)?;
        positive("filter_size", self.filter_size)?;
        Ok(())
    }

    /// Recurrent highway network settings for the encoder
    pub fn encoder_config(&self) -> RhnConfig {
        RhnConfig {
            in_feats: self.enc_input_size,
            n_units: self.n_units_enc,
            rec_depth: self.rec_depth,
            couple_gates: self.couple_gates,
            use_hsg: self.use_hsg,
            init_gates_closed: self.init_gates_closed,
            use_batch_norm: self.use_batch_norm,
        }
    }

    /// Recurrent highway cell settings for the decoder
    ///
    /// The decoder feeds the combined target/context projection, so its
    /// input width is `target_feats`. It never normalizes.
    pub fn decoder_config(&self) -> RhnConfig {
        RhnConfig {
            in_feats: self.target_feats,
            n_units: self.n_units_dec,
            rec_depth: self.rec_depth,
            couple_gates: self.couple_gates,
            use_hsg: self.use_hsg,
            init_gates_closed: self.init_gates_closed,
            use_batch_norm: false,
        }
    }

    /// Width of the fused context vector (all depths concatenated)
    pub fn context_width(&self) -> usize {
        self.rec_depth * self.n_units_enc
    }
}

fn positive(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(HarhnError::InvalidConfig(format!(
            "{} must be a positive integer, got {}",
            name, value
        )));
    }
    Ok(())
}
