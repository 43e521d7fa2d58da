//! Recursive multi-step projection

use super::horizon::Horizon;
use super::state::{round_to, ProjectionState};
use crate::ensemble::{blend_scalar, blend_weights, clip_score};
use crate::error::{ForecastError, Result};
use crate::feature_engineering::{SnapshotRow, N_TEMPORAL_FEATURES, TEMPORAL_FEATURE_COLS};
use crate::preprocessing::Scaler;
use crate::training::{BaseModel, HorizonCvStats, HorizonModelSet};
use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Cumulative years covered by the longest trained horizon
const MAX_TRAINED_YEARS: f64 = 2.0;

/// Per-model and blended scores of one projected step
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepScores {
    /// Headline score, the LightGBM prediction
    pub neglect_score: f64,
    pub ensemble_score: f64,
    pub lgbm: f64,
    pub rf: f64,
    pub xgb: f64,
    pub gbr: f64,
}

/// One record of a projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionStep {
    /// `q1`, `q2`, ...
    pub step: String,
    pub months_ahead: u32,
    pub horizon_model: Horizon,
    pub scores: StepScores,
    /// State the scores were predicted from, rounded to 4 decimals
    pub state_snapshot: ProjectionState,
}

/// Clipped predictions for a single state
#[derive(Debug, Clone, PartialEq)]
pub struct StepPrediction {
    pub per_model: BTreeMap<BaseModel, f64>,
    pub ensemble: f64,
}

impl StepPrediction {
    pub fn model(&self, model: BaseModel) -> f64 {
        self.per_model.get(&model).copied().unwrap_or(0.0)
    }

    /// Scores rounded to 2 decimals
    pub fn scores(&self) -> StepScores {
        let r = |v: f64| round_to(v, 2);
        StepScores {
            neglect_score: r(self.model(BaseModel::LightGbm)),
            ensemble_score: r(self.ensemble),
            lgbm: r(self.model(BaseModel::LightGbm)),
            rf: r(self.model(BaseModel::RandomForest)),
            xgb: r(self.model(BaseModel::XgBoost)),
            gbr: r(self.model(BaseModel::Gbr)),
        }
    }
}

/// Simulates future quarters by feeding each step's ensemble prediction back
/// into the feature state of the next step.
///
/// Models and scaler are shared read-only; a projector can serve many
/// projections concurrently.
#[derive(Debug, Clone)]
pub struct TemporalProjector {
    models: BTreeMap<Horizon, HorizonModelSet>,
    weights: BTreeMap<Horizon, Vec<f64>>,
    scaler: Arc<Scaler>,
    base_keys: Vec<BaseModel>,
}

impl TemporalProjector {
    /// Fails when a model set is registered under the wrong horizon or the
    /// scaler was fitted on a different column order.
    pub fn new(
        one_year: HorizonModelSet,
        two_year: HorizonModelSet,
        cv: &BTreeMap<Horizon, HorizonCvStats>,
        scaler: Arc<Scaler>,
    ) -> Result<Self> {
        for (set, want) in [(&one_year, Horizon::OneYear), (&two_year, Horizon::TwoYear)] {
            if set.horizon() != want {
                return Err(ForecastError::ValidationError(format!(
                    "model set for {} passed as {}",
                    set.horizon(),
                    want
                )));
            }
        }
        scaler.assert_columns(&TEMPORAL_FEATURE_COLS)?;

        let models = BTreeMap::from([(Horizon::OneYear, one_year), (Horizon::TwoYear, two_year)]);
        let mut projector = Self {
            models,
            weights: BTreeMap::new(),
            scaler,
            base_keys: BaseModel::ALL.to_vec(),
        };
        projector.set_weights(cv);
        Ok(projector)
    }

    /// Restrict the ensemble blend to `keys`
    pub fn with_base_keys(mut self, keys: &[BaseModel], cv: &BTreeMap<Horizon, HorizonCvStats>) -> Result<Self> {
        if keys.is_empty() {
            return Err(ForecastError::InvalidParameter {
                name: "base_keys".into(),
                value: "[]".into(),
                reason: "at least one base model is required".into(),
            });
        }
        self.base_keys = keys.to_vec();
        self.set_weights(cv);
        Ok(self)
    }

    fn set_weights(&mut self, cv: &BTreeMap<Horizon, HorizonCvStats>) {
        let empty = HorizonCvStats::new();
        self.weights = Horizon::ALL
            .iter()
            .map(|h| (*h, blend_weights(cv.get(h).unwrap_or(&empty), &self.base_keys)))
            .collect();
    }

    pub fn base_keys(&self) -> &[BaseModel] {
        &self.base_keys
    }

    /// Blend weight per base key for `horizon`
    pub fn weights(&self, horizon: Horizon) -> &[f64] {
        self.weights.get(&horizon).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Run every model of `horizon` on the scaled state.
    ///
    /// Each prediction is clipped to [0, 100]; a non-finite prediction counts
    /// as 0. The ensemble is the CV-weighted blend of the base keys.
    pub fn predict_from_state(&self, state: &ProjectionState, horizon: Horizon) -> Result<StepPrediction> {
        let set = self
            .models
            .get(&horizon)
            .ok_or_else(|| ForecastError::ValidationError(format!("no model set for {}", horizon)))?;

        let x = Array2::from_shape_vec((1, N_TEMPORAL_FEATURES), state.to_vector().to_vec())?;
        let scaled = self.scaler.transform(&x)?;

        let mut per_model = BTreeMap::new();
        for (key, model) in set.iter() {
            let out = model.predict(&scaled)?;
            if out.len() != 1 {
                return Err(ForecastError::FeatureShapeMismatch {
                    expected: "1 prediction".into(),
                    actual: format!("{} predictions from {}", out.len(), key),
                });
            }
            let raw = out[0];
            if !raw.is_finite() {
                debug!(model = %key, horizon = %horizon, "non-finite prediction set to 0");
            }
            per_model.insert(key, clip_score(if raw.is_finite() { raw } else { 0.0 }));
        }

        let preds: Vec<f64> = self
            .base_keys
            .iter()
            .map(|k| per_model.get(k).copied().unwrap_or(0.0))
            .collect();
        let ensemble = blend_scalar(&preds, self.weights(horizon));

        Ok(StepPrediction { per_model, ensemble })
    }

    /// Project `n_steps` steps of `step_years` each from `initial`
    pub fn project(&self, initial: &ProjectionState, n_steps: usize, step_years: f64) -> Result<Vec<ProjectionStep>> {
        self.run(initial, n_steps, step_years, None)
    }

    /// Same as [`TemporalProjector::project`] for a name-keyed feature map;
    /// missing features default to 0
    pub fn project_features(
        &self,
        initial: &HashMap<String, f64>,
        n_steps: usize,
        step_years: f64,
    ) -> Result<Vec<ProjectionStep>> {
        self.project(&ProjectionState::from_map(initial), n_steps, step_years)
    }

    /// Project like [`TemporalProjector::project`] but stop before the next
    /// step once `cancel` is set, returning the steps completed so far
    pub fn project_with_cancel(
        &self,
        initial: &ProjectionState,
        n_steps: usize,
        step_years: f64,
        cancel: &AtomicBool,
    ) -> Result<Vec<ProjectionStep>> {
        self.run(initial, n_steps, step_years, Some(cancel))
    }

    /// Project every row independently, in parallel.
    ///
    /// Results are keyed by country; a later row for the same country
    /// replaces an earlier one.
    pub fn project_batch(
        &self,
        rows: &[SnapshotRow],
        n_steps: usize,
        step_years: f64,
    ) -> Result<BTreeMap<String, Vec<ProjectionStep>>> {
        let projected = rows
            .par_iter()
            .map(|row| -> Result<(String, Vec<ProjectionStep>)> {
                let steps = self.project_features(&row.features, n_steps, step_years)?;
                Ok((row.country_iso3.clone(), steps))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(projected.into_iter().collect())
    }

    fn run(
        &self,
        initial: &ProjectionState,
        n_steps: usize,
        step_years: f64,
        cancel: Option<&AtomicBool>,
    ) -> Result<Vec<ProjectionStep>> {
        if !(step_years.is_finite() && step_years > 0.0) {
            return Err(ForecastError::InvalidParameter {
                name: "step_years".into(),
                value: step_years.to_string(),
                reason: "must be a positive number".into(),
            });
        }

        let mut state = *initial;
        let mut steps = Vec::with_capacity(n_steps);
        let mut warned = false;

        for i in 1..=n_steps {
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                debug!(completed = steps.len(), "projection cancelled");
                break;
            }

            let cumulative = i as f64 * step_years;
            if cumulative > MAX_TRAINED_YEARS && !warned {
                warn!(step = i, cumulative_years = cumulative, "projecting beyond the two-year horizon");
                warned = true;
            }

            let horizon = Horizon::for_step(i, step_years);
            let prediction = self.predict_from_state(&state, horizon)?;
            steps.push(ProjectionStep {
                step: format!("q{}", i),
                months_ahead: (cumulative * 12.0).round_ties_even() as u32,
                horizon_model: horizon,
                scores: prediction.scores(),
                state_snapshot: state.snapshot(),
            });
            state = state.advance(prediction.ensemble, step_years);
        }

        Ok(steps)
    }
}
