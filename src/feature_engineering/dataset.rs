//! Supervised forecast datasets
//!
//! Pairs the temporal features of a country at year T with its neglect score
//! at year T + h.

use super::panel::TemporalFeatureRow;
use super::schema::{N_TEMPORAL_FEATURES, TEMPORAL_FEATURE_COLS};
use crate::error::{ForecastError, Result};
use crate::preprocessing::{Scaler, ScalerType};
use ndarray::{Array1, Array2};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

/// Earliest base year used for training pairs
pub const DEFAULT_MIN_YEAR: i32 = 2015;

/// Feature matrix, targets and (country, year) of each base row
#[derive(Debug, Clone)]
pub struct ForecastDataset {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    pub meta: Vec<(String, i32)>,
}

impl ForecastDataset {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }

    pub fn n_countries(&self) -> usize {
        self.meta.iter().map(|(c, _)| c.as_str()).collect::<BTreeSet<_>>().len()
    }

    /// Base year of every row, used as the ordering key for time-series CV
    pub fn years(&self) -> Vec<i32> {
        self.meta.iter().map(|(_, y)| *y).collect()
    }
}

/// Stack rows into an (n × 23) matrix in schema order; non-finite cells become 0
pub fn feature_matrix(rows: &[&TemporalFeatureRow]) -> Array2<f64> {
    let mut x = Array2::zeros((rows.len(), N_TEMPORAL_FEATURES));
    for (i, row) in rows.iter().enumerate() {
        for (j, v) in row.to_vector().iter().enumerate() {
            x[[i, j]] = if v.is_finite() { *v } else { 0.0 };
        }
    }
    x
}

/// Build (X at T, y at T + `horizon_years`) pairs.
///
/// Base rows are restricted to `year >= min_year`. Targets are looked up in
/// the full table, so a base row near `min_year` may still use a target from
/// any later year. Base rows without a target are dropped.
pub fn build_temporal_forecast_dataset(
    rows: &[TemporalFeatureRow],
    horizon_years: i32,
    min_year: i32,
) -> ForecastDataset {
    let targets: HashMap<(&str, i32), f64> = rows
        .iter()
        .map(|r| ((r.country_iso3(), r.year()), r.panel.neglect_score))
        .collect();

    let mut base = Vec::new();
    let mut y = Vec::new();
    let mut meta = Vec::new();
    for row in rows.iter().filter(|r| r.year() >= min_year) {
        if let Some(&target) = targets.get(&(row.country_iso3(), row.year() + horizon_years)) {
            base.push(row);
            y.push(if target.is_finite() { target } else { 0.0 });
            meta.push((row.country_iso3().to_string(), row.year()));
        }
    }

    debug!(
        horizon_years,
        min_year,
        pairs = y.len(),
        "Built temporal forecast dataset"
    );

    ForecastDataset {
        x: feature_matrix(&base),
        y: Array1::from(y),
        meta,
    }
}

/// Fit a robust scaler over the temporal features of every row.
///
/// Returns the fitted scaler and the scaled matrix.
pub fn fit_temporal_scaler(rows: &[TemporalFeatureRow]) -> Result<(Scaler, Array2<f64>)> {
    fit_temporal_scaler_with(rows, ScalerType::Robust)
}

/// As [`fit_temporal_scaler`] with an explicit scaler type
pub fn fit_temporal_scaler_with(
    rows: &[TemporalFeatureRow],
    scaler_type: ScalerType,
) -> Result<(Scaler, Array2<f64>)> {
    if rows.is_empty() {
        return Err(ForecastError::DataError(
            "cannot fit temporal scaler on an empty panel".to_string(),
        ));
    }
    let refs: Vec<&TemporalFeatureRow> = rows.iter().collect();
    let x = feature_matrix(&refs);
    let mut scaler = Scaler::new(scaler_type);
    let scaled = scaler.fit_transform(&x, &TEMPORAL_FEATURE_COLS)?;
    Ok((scaler, scaled))
}
