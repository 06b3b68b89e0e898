//! Synthetic multivariate series
//!
//! Input columns are noisy sinusoids with distinct periods and phases. The
//! target, stored in the last column, is a weighted sum of the inputs from the
//! previous row plus noise, so it can be forecast from the lookback window.

use ndarray::{Array1, Array2};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::error::{HarhnError, Result};

/// Shape and noise of a generated series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    /// Number of rows (timesteps)
    pub rows: usize,
    /// Standard deviation of the additive noise
    pub noise_std: f64,
    /// Seed of the generator
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            rows: 200,
            noise_std: 0.05,
            seed: 42,
        }
    }
}

/// Generate a series with `in_feats` input columns followed by the target
///
/// # Returns
/// Table [rows, in_feats + 1]
pub fn synthetic_series<R: Rng>(
    rows: usize,
    in_feats: usize,
    noise_std: f64,
    rng: &mut R,
) -> Result<Array2<f64>> {
    if !(noise_std >= 0.0 && noise_std.is_finite()) {
        return Err(HarhnError::InvalidConfig(format!(
            "noise_std must be a finite non-negative number, got {}",
            noise_std
        )));
    }
    let noise = Normal::new(0.0, noise_std).map_err(|e| {
        HarhnError::InvalidConfig(format!("noise_std {} rejected: {}", noise_std, e))
    })?;

    let periods: Vec<f64> = (0..in_feats).map(|i| 8.0 + 5.0 * i as f64).collect();
    let phases: Vec<f64> = (0..in_feats).map(|_| rng.gen_range(0.0..2.0 * PI)).collect();
    let weights: Vec<f64> = (0..in_feats).map(|_| rng.gen_range(-1.0..1.0)).collect();

    let mut table = Array2::random_using((rows, in_feats + 1), noise, rng);

    for r in 0..rows {
        for i in 0..in_feats {
            table[[r, i]] += (2.0 * PI * r as f64 / periods[i] + phases[i]).sin();
        }
    }

    let target: Array1<f64> = (0..rows)
        .map(|r| {
            let prev = r.saturating_sub(1);
            (0..in_feats).map(|i| weights[i] * table[[prev, i]]).sum::<f64>()
        })
        .collect();
    let mut target_col = table.column_mut(in_feats);
    target_col += &target;

    Ok(table)
}
