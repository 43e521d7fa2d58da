//! CV-weighted ensemble blending

use crate::error::{ForecastError, Result};
use crate::training::{BaseModel, HorizonCvStats};
use ndarray::Array1;
use std::collections::BTreeMap;

/// Lower bound of the score scale
pub const SCORE_MIN: f64 = 0.0;
/// Upper bound of the score scale
pub const SCORE_MAX: f64 = 100.0;
/// Floor of the blend weight sum
pub const MIN_WEIGHT_SUM: f64 = 1e-9;

/// Clip a score into [0, 100]
pub fn clip_score(v: f64) -> f64 {
    v.clamp(SCORE_MIN, SCORE_MAX)
}

/// Blend weight of each model: its mean CV R², floored at 0.
/// Models without CV stats weigh 0.
pub fn blend_weights(cv: &HorizonCvStats, base_keys: &[BaseModel]) -> Vec<f64> {
    base_keys
        .iter()
        .map(|k| cv.get(k).map_or(0.0, |s| s.mean.max(0.0)))
        .collect()
}

/// Weighted average of scalar predictions, clipped to [0, 100]
pub fn blend_scalar(preds: &[f64], weights: &[f64]) -> f64 {
    let total = weights.iter().sum::<f64>().max(MIN_WEIGHT_SUM);
    let blended = preds.iter().zip(weights).map(|(p, w)| p * w).sum::<f64>() / total;
    clip_score(blended)
}

/// CV-R²-weighted average of per-model prediction vectors, clipped to [0, 100].
///
/// When every weight is 0 the blend is 0.
pub fn weighted_average_ensemble(
    predictions: &BTreeMap<BaseModel, Array1<f64>>,
    cv: &HorizonCvStats,
    base_keys: &[BaseModel],
) -> Result<Array1<f64>> {
    let columns = collect_columns(predictions, base_keys)?;
    let weights = blend_weights(cv, base_keys);
    let total = weights.iter().sum::<f64>().max(MIN_WEIGHT_SUM);

    let n = columns.first().map_or(0, |c| c.len());
    let mut blended = Array1::<f64>::zeros(n);
    for (col, w) in columns.iter().zip(&weights) {
        blended.scaled_add(*w, *col);
    }
    Ok((blended / total).mapv(clip_score))
}

/// Per-row population standard deviation across base-model predictions.
/// Lower values mean the models agree.
pub fn compute_agreement(
    predictions: &BTreeMap<BaseModel, Array1<f64>>,
    keys: &[BaseModel],
) -> Result<Array1<f64>> {
    let columns = collect_columns(predictions, keys)?;
    let n = columns.first().map_or(0, |c| c.len());
    let k = columns.len() as f64;

    Ok(Array1::from_shape_fn(n, |i| {
        let mean = columns.iter().map(|c| c[i]).sum::<f64>() / k;
        (columns.iter().map(|c| (c[i] - mean).powi(2)).sum::<f64>() / k).sqrt()
    }))
}

fn collect_columns<'a>(
    predictions: &'a BTreeMap<BaseModel, Array1<f64>>,
    keys: &[BaseModel],
) -> Result<Vec<&'a Array1<f64>>> {
    if keys.is_empty() {
        return Err(ForecastError::ValidationError("no base models to blend".to_string()));
    }
    let columns: Vec<&Array1<f64>> = keys
        .iter()
        .map(|k| {
            predictions
                .get(k)
                .ok_or_else(|| ForecastError::FeatureNotFound(format!("predictions for {}", k)))
        })
        .collect::<Result<_>>()?;

    let n = columns[0].len();
    if let Some(bad) = columns.iter().find(|c| c.len() != n) {
        return Err(ForecastError::FeatureShapeMismatch {
            expected: format!("{} predictions", n),
            actual: format!("{} predictions", bad.len()),
        });
    }
    Ok(columns)
}
