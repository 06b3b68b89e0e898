//! Utility module
//!
//! This module provides:
//! - Configuration management
//! - Logging setup
//! - Forecast error metrics

mod config;
mod logging;
mod metrics;

pub use config::{AppConfig, LoggingConfig};
pub use logging::{setup_logging, verbosity_level};
pub use metrics::{mae, mse, r2_score, rmse};
