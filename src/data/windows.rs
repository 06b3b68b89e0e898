//! Lagged lookback windows
//!
//! Every row `r` of a time x feature table becomes one sample holding the
//! previous `lookback` rows of each input column, the same history of the
//! target column, and the target value one step ahead. Gaps opened by the
//! lag are filled from the next observed value; the gap left at the end by
//! the one-step lead is filled from the last observed value. The first
//! `lookback` rows only ever see filled values and are dropped.

use ndarray::{s, Array1, Array2, Array3, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HarhnError, Result};

/// Steps between the last lookback row and the predicted value
pub const PREDICTION_HORIZON: usize = 1;

/// Which column of the table is forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct WindowConfig {
    /// Target column index, the last column when unset
    pub target_column: Option<usize>,
}

impl WindowConfig {
    /// Forecast the given column
    pub fn with_target_column(mut self, column: usize) -> Self {
        self.target_column = Some(column);
        self
    }

    /// Resolve the target column for a table with `n_cols` columns
    pub fn target_index(&self, n_cols: usize) -> usize {
        self.target_column.unwrap_or_else(|| n_cols.saturating_sub(1))
    }

    /// Window a table with this configuration
    pub fn windows(&self, table: &Array2<f64>, lookback: usize) -> Result<Windows> {
        prepare_windows(table, lookback, self.target_index(table.ncols()))
    }
}

/// Model-ready samples cut from a table
#[derive(Debug, Clone)]
pub struct Windows {
    /// Input history [samples, lookback, n_cols - 1]
    pub x: Array3<f64>,
    /// Target history [samples, lookback, 1]
    pub y: Array3<f64>,
    /// Value to predict for every sample [samples]
    pub target: Array1<f64>,
}

impl Windows {
    /// Number of samples
    pub fn len(&self) -> usize {
        self.target.len()
    }

    /// Whether there are no samples
    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }

    /// Samples `start..end` as a new set of windows
    pub fn slice(&self, start: usize, end: usize) -> Windows {
        let end = end.min(self.len());
        let start = start.min(end);
        Windows {
            x: self.x.slice(s![start..end, .., ..]).to_owned(),
            y: self.y.slice(s![start..end, .., ..]).to_owned(),
            target: self.target.slice(s![start..end]).to_owned(),
        }
    }
}

/// Cut a table into lagged lookback windows
///
/// # Arguments
/// * `table` - Observations [time, features], `NaN` marks a missing value
/// * `lookback` - Rows of history per sample
/// * `target_col` - Column to forecast; all other columns are inputs
///
/// # Returns
/// `rows - lookback` samples
pub fn prepare_windows(table: &Array2<f64>, lookback: usize, target_col: usize) -> Result<Windows> {
    let (rows, cols) = table.dim();

    if lookback == 0 {
        return Err(HarhnError::InvalidConfig(
            "lookback must be a positive integer, got 0".to_string(),
        ));
    }
    if target_col >= cols {
        return Err(HarhnError::InvalidConfig(format!(
            "target column {} out of range for a table with {} columns",
            target_col, cols
        )));
    }
    if cols < 2 {
        return Err(HarhnError::InvalidConfig(
            "table needs at least one input column besides the target".to_string(),
        ));
    }
    if rows <= lookback {
        return Err(HarhnError::InsufficientData(format!(
            "{} rows cannot fill a lookback of {}",
            rows, lookback
        )));
    }

    let samples = rows - lookback;
    let input_cols: Vec<usize> = (0..cols).filter(|&c| c != target_col).collect();

    let mut x = Array3::zeros((samples, lookback, input_cols.len()));
    let mut y = Array3::zeros((samples, lookback, 1));

    for j in 0..lookback {
        let lag = lookback - j - 1;
        for (i, &col) in input_cols.iter().enumerate() {
            let lagged = backfill(&shift(table.column(col), lag as isize));
            x.slice_mut(s![.., j, i]).assign(&lagged.slice(s![lookback..]));
        }
        let lagged = backfill(&shift(table.column(target_col), lag as isize));
        y.slice_mut(s![.., j, 0]).assign(&lagged.slice(s![lookback..]));
    }

    let lead = forward_fill(&shift(table.column(target_col), -(PREDICTION_HORIZON as isize)));
    let target = lead.slice(s![lookback..]).to_owned();

    debug!(
        rows = rows,
        samples = samples,
        lookback = lookback,
        inputs = input_cols.len(),
        "Prepared windows"
    );

    Ok(Windows { x, y, target })
}

/// Move values `periods` rows later (earlier when negative), opening `NaN` gaps
fn shift(values: ArrayView1<f64>, periods: isize) -> Array1<f64> {
    let n = values.len();
    let mut out = Array1::from_elem(n, f64::NAN);
    let offset = periods.unsigned_abs().min(n);

    if periods >= 0 {
        out.slice_mut(s![offset..]).assign(&values.slice(s![..n - offset]));
    } else {
        out.slice_mut(s![..n - offset]).assign(&values.slice(s![offset..]));
    }
    out
}

/// Replace every `NaN` with the next observed value
fn backfill(values: &Array1<f64>) -> Array1<f64> {
    let mut out = values.clone();
    let mut next = f64::NAN;
    for v in out.iter_mut().rev() {
        if v.is_nan() {
            *v = next;
        } else {
            next = *v;
        }
    }
    out
}

/// Replace every `NaN` with the last observed value
fn forward_fill(values: &Array1<f64>) -> Array1<f64> {
    let mut out = values.clone();
    let mut last = f64::NAN;
    for v in out.iter_mut() {
        if v.is_nan() {
            *v = last;
        } else {
            last = *v;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array};

    /// Column 0 counts rows, column 1 is ten times the row, target last
    fn ramp_table(rows: usize) -> Array2<f64> {
        let mut table = Array2::zeros((rows, 3));
        for r in 0..rows {
            table[[r, 0]] = r as f64;
            table[[r, 1]] = 10.0 * r as f64;
            table[[r, 2]] = 100.0 + r as f64;
        }
        table
    }

    #[test]
    fn test_shift() {
        let v = array![1.0, 2.0, 3.0, 4.0];
        let lagged = shift(v.view(), 1);
        assert!(lagged[0].is_nan());
        assert_eq!(lagged.slice(s![1..]), array![1.0, 2.0, 3.0]);

        let led = shift(v.view(), -1);
        assert_eq!(led.slice(s![..3]), array![2.0, 3.0, 4.0]);
        assert!(led[3].is_nan());

        assert!(shift(v.view(), 9).iter().all(|x| x.is_nan()));
    }

    #[test]
    fn test_fills() {
        let v = array![f64::NAN, 1.0, f64::NAN, 3.0, f64::NAN];

        let b = backfill(&v);
        assert_eq!(b.slice(s![..4]), array![1.0, 1.0, 3.0, 3.0]);
        assert!(b[4].is_nan());

        let f = forward_fill(&v);
        assert!(f[0].is_nan());
        assert_eq!(f.slice(s![1..]), array![1.0, 1.0, 3.0, 3.0]);
    }

    #[test]
    fn test_window_shapes() {
        let windows = prepare_windows(&ramp_table(20), 5, 2).unwrap();

        assert_eq!(windows.x.shape(), &[15, 5, 2]);
        assert_eq!(windows.y.shape(), &[15, 5, 1]);
        assert_eq!(windows.len(), 15);
    }

    #[test]
    fn test_window_contents() {
        let windows = prepare_windows(&ramp_table(20), 5, 2).unwrap();

        // Sample 0 is row 5: history rows 1..=5, target row 6
        assert_eq!(windows.x.slice(s![0, .., 0]), array![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(windows.x.slice(s![0, .., 1]), array![10.0, 20.0, 30.0, 40.0, 50.0]);
        assert_eq!(windows.y.slice(s![0, .., 0]), array![101.0, 102.0, 103.0, 104.0, 105.0]);
        assert_eq!(windows.target[0], 106.0);

        // The last row has no successor and repeats its own value
        assert_eq!(windows.target[14], 119.0);
        assert_eq!(windows.x[[14, 4, 0]], 19.0);
    }

    #[test]
    fn test_target_column_is_excluded_from_inputs() {
        let windows = prepare_windows(&ramp_table(10), 3, 0).unwrap();

        assert_eq!(windows.y.slice(s![0, .., 0]), array![1.0, 2.0, 3.0]);
        assert_eq!(windows.x.slice(s![0, .., 0]), array![10.0, 20.0, 30.0]);
        assert_eq!(windows.x.slice(s![0, .., 1]), array![101.0, 102.0, 103.0]);
        assert_eq!(windows.target[0], 4.0);
    }

    #[test]
    fn test_missing_values_are_backfilled() {
        let mut table = ramp_table(12);
        table[[6, 0]] = f64::NAN;

        let windows = prepare_windows(&table, 4, 2).unwrap();

        // Row 6 sits at lag 0 of sample 2 and takes row 7's value
        assert_eq!(windows.x[[2, 3, 0]], 7.0);
        assert!(windows.x.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_config_defaults_to_last_column() {
        let table = ramp_table(10);
        let config = WindowConfig::default();

        assert_eq!(config.target_index(3), 2);
        let windows = config.windows(&table, 3).unwrap();
        assert_eq!(windows.target[0], 104.0);

        let config = config.with_target_column(1);
        assert_eq!(config.windows(&table, 3).unwrap().target[0], 40.0);
    }

    #[test]
    fn test_slice() {
        let windows = prepare_windows(&ramp_table(20), 5, 2).unwrap();
        let part = windows.slice(3, 7);

        assert_eq!(part.len(), 4);
        assert_eq!(part.x.shape(), &[4, 5, 2]);
        assert_eq!(part.target[0], windows.target[3]);
        assert!(windows.slice(30, 40).is_empty());
    }

    #[test]
    fn test_rejects_short_or_malformed_tables() {
        let table = ramp_table(5);
        assert!(matches!(
            prepare_windows(&table, 5, 2),
            Err(HarhnError::InsufficientData(_))
        ));
        assert!(prepare_windows(&table, 3, 3).is_err());
        assert!(prepare_windows(&table, 0, 2).is_err());

        let single = Array::from_shape_vec((6, 1), vec![0.0; 6]).unwrap();
        assert!(prepare_windows(&single, 3, 0).is_err());
    }
}
