//! # HARHN model
//!
//! Building blocks from the leaves up:
//!
//! - `layers` - Linear maps, batch normalization and activations
//! - `highway` - Highway state gate blending two states
//! - `cell` - Recurrent highway cell with per-depth states
//! - `encoder` - Recurrent highway network over a sequence
//! - `conv` - Convolution blocks with adaptive max pooling
//! - `attention` - Per-depth temporal attention decoder
//! - `harhn` - The assembled forecaster
//!
//! ```rust,no_run
//! use harhn::model::{HarhnConfig, HarhnModel};
//!
//! let config = HarhnConfig::default()
//!     .with_rec_depth(2)
//!     .with_hsg(true)
//!     .with_seed(7);
//! let model = HarhnModel::new(config)?;
//! println!("{} parameters", model.num_params());
//! # Ok::<(), harhn::HarhnError>(())
//! ```

pub mod attention;
pub mod cell;
pub mod config;
pub mod conv;
pub mod encoder;
pub mod harhn;
pub mod highway;
pub mod layers;

pub use attention::{DecoderOutput, DepthAttention, TemporalAttentionDecoder};
pub use cell::{CarryGate, CellOutput, GateTrace, RecurrentHighwayCell};
pub use config::{HarhnConfig, RhnConfig};
pub use conv::{ConvBlock, ConvFeatureExtractor};
pub use encoder::{EncoderOutput, RecurrentHighwayNetwork, StepNormalization};
pub use harhn::{Forecast, HarhnModel};
pub use highway::HighwayGate;
pub use layers::{BatchNorm1d, Linear};
