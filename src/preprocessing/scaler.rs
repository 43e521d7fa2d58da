//! Feature scaling implementations

use crate::error::{ForecastError, Result};
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Type of scaler to use
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ScalerType {
    /// Standard scaling (z-score normalization): (x - mean) / std
    Standard,
    /// Robust scaling using median and IQR
    Robust,
}

/// Parameters for a fitted column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct ScalerParams {
    center: f64, // mean or median
    scale: f64,  // std or IQR
}

/// Column-wise feature scaler.
///
/// The scaler remembers the names and order of the columns it was fitted
/// on; [`Scaler::assert_columns`] checks an inference-time schema against
/// them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scaler {
    scaler_type: ScalerType,
    columns: Vec<String>,
    params: Vec<ScalerParams>,
    is_fitted: bool,
}

impl Scaler {
    /// Create a new scaler
    pub fn new(scaler_type: ScalerType) -> Self {
        Self {
            scaler_type,
            columns: Vec::new(),
            params: Vec::new(),
            is_fitted: false,
        }
    }

    pub fn scaler_type(&self) -> ScalerType {
        self.scaler_type
    }

    /// Column names in fitted order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_fitted(&self) -> bool {
        self.is_fitted
    }

    /// Fit the scaler to a matrix whose columns are named by `columns`.
    /// Non-finite cells are treated as 0.
    pub fn fit(&mut self, x: &Array2<f64>, columns: &[&str]) -> Result<&mut Self> {
        if x.ncols() != columns.len() {
            return Err(ForecastError::FeatureShapeMismatch {
                expected: format!("{} columns", columns.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }
        if x.nrows() == 0 {
            return Err(ForecastError::DataError("cannot fit scaler on empty matrix".into()));
        }

        self.params = x
            .axis_iter(Axis(1))
            .map(|col| self.compute_params(col))
            .collect();
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self.is_fitted = true;
        Ok(self)
    }

    /// Transform a matrix with the fitted parameters
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(ForecastError::ModelNotFitted);
        }
        if x.ncols() != self.params.len() {
            return Err(ForecastError::FeatureShapeMismatch {
                expected: format!("{} columns", self.params.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }

        let mut out = x.mapv(|v| if v.is_finite() { v } else { 0.0 });
        for (mut col, p) in out.axis_iter_mut(Axis(1)).zip(self.params.iter()) {
            col.mapv_inplace(|v| (v - p.center) / p.scale);
        }
        Ok(out)
    }

    /// Fit and transform in one step
    pub fn fit_transform(&mut self, x: &Array2<f64>, columns: &[&str]) -> Result<Array2<f64>> {
        self.fit(x, columns)?;
        self.transform(x)
    }

    /// Inverse transform the data
    pub fn inverse_transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted {
            return Err(ForecastError::ModelNotFitted);
        }
        if x.ncols() != self.params.len() {
            return Err(ForecastError::FeatureShapeMismatch {
                expected: format!("{} columns", self.params.len()),
                actual: format!("{} columns", x.ncols()),
            });
        }

        let mut out = x.clone();
        for (mut col, p) in out.axis_iter_mut(Axis(1)).zip(self.params.iter()) {
            col.mapv_inplace(|v| v * p.scale + p.center);
        }
        Ok(out)
    }

    /// Check that `expected` names exactly the fitted columns, in order
    pub fn assert_columns(&self, expected: &[&str]) -> Result<()> {
        if !self.is_fitted {
            return Err(ForecastError::ModelNotFitted);
        }
        if self.columns.len() != expected.len() {
            return Err(ForecastError::FeatureShapeMismatch {
                expected: format!("{} columns", expected.len()),
                actual: format!("{} fitted columns", self.columns.len()),
            });
        }
        for (position, (fitted, want)) in self.columns.iter().zip(expected.iter()).enumerate() {
            if fitted != want {
                return Err(ForecastError::ColumnOrderMismatch {
                    position,
                    expected: want.to_string(),
                    actual: fitted.clone(),
                });
            }
        }
        Ok(())
    }

    fn compute_params(&self, col: ArrayView1<f64>) -> ScalerParams {
        let values: Vec<f64> = col.iter().map(|&v| if v.is_finite() { v } else { 0.0 }).collect();

        match self.scaler_type {
            ScalerType::Standard => {
                let n = values.len() as f64;
                let mean = values.iter().sum::<f64>() / n;
                let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                let std = var.sqrt();
                ScalerParams {
                    center: mean,
                    scale: if std == 0.0 { 1.0 } else { std },
                }
            }
            ScalerType::Robust => {
                let mut sorted = values;
                sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let median = quantile_linear(&sorted, 0.5);
                let iqr = quantile_linear(&sorted, 0.75) - quantile_linear(&sorted, 0.25);
                ScalerParams {
                    center: median,
                    scale: if iqr == 0.0 { 1.0 } else { iqr },
                }
            }
        }
    }
}

/// Quantile with linear interpolation between closest ranks
fn quantile_linear(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_robust_scaler_median_iqr() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let mut scaler = Scaler::new(ScalerType::Robust);
        let result = scaler.fit_transform(&x, &["a"]).unwrap();

        // median 3, q1 2, q3 4 -> iqr 2
        assert!((result[[2, 0]] - 0.0).abs() < 1e-12);
        assert!((result[[0, 0]] + 1.0).abs() < 1e-12);
        assert!((result[[4, 0]] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_robust_scaler_constant_column() {
        let x = array![[7.0, 1.0], [7.0, 2.0], [7.0, 3.0]];
        let mut scaler = Scaler::new(ScalerType::Robust);
        let result = scaler.fit_transform(&x, &["const", "b"]).unwrap();
        for v in result.column(0) {
            assert_eq!(*v, 0.0);
        }
    }

    #[test]
    fn test_standard_scaler() {
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let mut scaler = Scaler::new(ScalerType::Standard);
        let result = scaler.fit_transform(&x, &["a"]).unwrap();
        let mean: f64 = result.column(0).sum() / 5.0;
        assert!(mean.abs() < 1e-10);
    }

    #[test]
    fn test_nan_treated_as_zero() {
        let x = array![[f64::NAN], [0.0], [4.0]];
        let mut scaler = Scaler::new(ScalerType::Robust);
        let result = scaler.fit_transform(&x, &["a"]).unwrap();
        assert!(result.iter().all(|v| v.is_finite()));
        assert_eq!(result[[0, 0]], result[[1, 0]]);
    }

    #[test]
    fn test_inverse_transform() {
        let x = array![[1.0, 10.0], [2.0, 30.0], [3.0, 20.0], [9.0, 0.0]];
        let mut scaler = Scaler::new(ScalerType::Robust);
        let scaled = scaler.fit_transform(&x, &["a", "b"]).unwrap();
        let restored = scaler.inverse_transform(&scaled).unwrap();
        for (o, r) in x.iter().zip(restored.iter()) {
            assert!((o - r).abs() < 1e-10);
        }
    }

    #[test]
    fn test_column_checks() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let mut scaler = Scaler::new(ScalerType::Robust);
        scaler.fit(&x, &["a", "b"]).unwrap();

        assert!(scaler.assert_columns(&["a", "b"]).is_ok());
        assert!(matches!(
            scaler.assert_columns(&["b", "a"]),
            Err(ForecastError::ColumnOrderMismatch { position: 0, .. })
        ));
        assert!(matches!(
            scaler.transform(&array![[1.0, 2.0, 3.0]]),
            Err(ForecastError::FeatureShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_unfitted_transform_fails() {
        let scaler = Scaler::new(ScalerType::Robust);
        assert!(matches!(
            scaler.transform(&array![[1.0]]),
            Err(ForecastError::ModelNotFitted)
        ));
    }
}
