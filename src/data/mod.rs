//! # Data preparation
//!
//! Turns a time x feature table into the `x`, `y` and target arrays the
//! forecaster consumes, and generates synthetic tables for demos and tests.

mod synthetic;
mod windows;

pub use synthetic::{synthetic_series, SyntheticConfig};
pub use windows::{prepare_windows, WindowConfig, Windows, PREDICTION_HORIZON};
