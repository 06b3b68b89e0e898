//! # HARHN
//!
//! Hierarchical attention-based recurrent highway network for multivariate
//! time-series forecasting.
//!
//! The raw lookback window passes through stacked 1-D convolution blocks, a
//! linear projection and a recurrent highway network encoder. A decoder built
//! from the same kind of recurrent highway cell attends over the encoder
//! states of every recurrence depth and predicts the next step of the target.
//!
//! ## Modules
//!
//! - `model` - Layers, recurrent highway cells and the full forecaster
//! - `data` - Lagged window preparation from a time x feature table
//! - `utils` - Configuration files, logging and error metrics
//! - `error` - Error type shared by the crate
//!
//! ## Example
//!
//! ```rust,no_run
//! use harhn::{HarhnConfig, HarhnModel};
//! use ndarray::Array3;
//!
//! let config = HarhnConfig::new(3, 15, 7, 1).with_seed(42);
//! let model = HarhnModel::new(config)?;
//!
//! let x = Array3::<f64>::zeros((8, 15, 7));
//! let y = Array3::<f64>::zeros((8, 15, 1));
//! let prediction = model.forward(&x, &y)?;
//! assert_eq!(prediction.shape(), &[8, 1]);
//! # Ok::<(), harhn::HarhnError>(())
//! ```

pub mod data;
pub mod error;
pub mod model;
pub mod utils;

pub use data::{prepare_windows, WindowConfig, Windows};
pub use error::{HarhnError, Result};
pub use model::{
    CarryGate, Forecast, HarhnConfig, HarhnModel, HighwayGate, RecurrentHighwayCell,
    RecurrentHighwayNetwork, RhnConfig, TemporalAttentionDecoder,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default hyperparameters
pub mod defaults {
    /// Stacked convolution blocks
    pub const N_CONV_LAYERS: usize = 3;

    /// Lookback window length
    pub const LOOKBACK: usize = 15;

    /// Raw input features
    pub const IN_FEATS: usize = 7;

    /// Target features
    pub const TARGET_FEATS: usize = 1;

    /// Encoder state width
    pub const N_UNITS_ENC: usize = 64;

    /// Decoder state width
    pub const N_UNITS_DEC: usize = 64;

    /// Width of the projection feeding the encoder
    pub const ENC_INPUT_SIZE: usize = 32;

    /// Micro-layers per recurrent step
    pub const REC_DEPTH: usize = 3;

    /// Filters per convolution block
    pub const N_FILTERS: usize = 32;

    /// Convolution kernel size
    pub const FILTER_SIZE: usize = 5;

    /// Gate bias used when gates start closed
    pub const CLOSED_GATE_BIAS: f64 = -2.5;

    /// Added to the batch variance before normalizing
    pub const BATCH_NORM_EPS: f64 = 1e-5;
}
