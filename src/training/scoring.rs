//! Current-year neglect scoring
//!
//! Fits the base models on the latest year of the panel, one row per
//! country, and scores every country with the CV-weighted ensemble, the
//! spread between models, a neglect flag and its peer countries.

use super::config::TrainingConfig;
use super::cross_validation::{CrossValidator, CvScore, SplitKeys};
use super::models::Regressor;
use super::peers::{base_feature_matrix, PeerFinder};
use super::registry::{BaseModel, HorizonCvStats, TrainedRegressor};
use crate::ensemble::{clip_score, compute_agreement, weighted_average_ensemble};
use crate::error::{ForecastError, Result};
use crate::feature_engineering::{PanelRow, SeverityBand, BASE_FEATURE_COLS};
use crate::preprocessing::{Scaler, ScalerType};
use crate::projection::round_to;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Ensemble score at or above which a country is flagged as neglected
pub const DEFAULT_NEGLECT_FLAG_THRESHOLD: f64 = 65.0;

/// Per-model current-year scores, rounded to 2 decimals
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelScores {
    pub lgbm: f64,
    pub rf: f64,
    pub xgb: f64,
    pub gbr: f64,
    pub ensemble: f64,
}

/// Current-year score record of one country
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CountryScore {
    pub iso3: String,
    pub year: i32,
    /// Headline score, the LightGBM prediction
    pub neglect_score: f64,
    pub ensemble_score: f64,
    pub model_scores: ModelScores,
    /// Population std of the base-model scores
    pub model_agreement: f64,
    pub fgi_score: f64,
    pub anomaly_severity: SeverityBand,
    /// Rounded ensemble score reaches the flag threshold
    pub neglect_flag: bool,
    pub peer_iso3: Vec<String>,
}

/// Fitted current-year models and the scores they produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentYearScoring {
    pub year: i32,
    /// Standard scaler over the 13 same-year columns
    pub scaler: Scaler,
    pub models: BTreeMap<BaseModel, TrainedRegressor>,
    pub cv: HorizonCvStats,
    pub neglect_flag_threshold: f64,
    /// One record per country, sorted by country code
    pub scores: Vec<CountryScore>,
}

impl CurrentYearScoring {
    /// Fit on the latest year of `panel` and score its countries
    pub fn fit(panel: &[PanelRow], config: &TrainingConfig) -> Result<Self> {
        let year = panel
            .iter()
            .map(|r| r.year)
            .max()
            .ok_or_else(|| ForecastError::TrainingError("empty panel".into()))?;
        let mut current: Vec<PanelRow> = panel.iter().filter(|r| r.year == year).cloned().collect();
        current.sort_by(|a, b| a.country_iso3.cmp(&b.country_iso3));
        if current.len() < 2 {
            return Err(ForecastError::TrainingError(format!(
                "{} has {} countries, current-year scoring needs at least 2",
                year,
                current.len()
            )));
        }
        info!(year, countries = current.len(), "Training current-year scoring models");

        let mut scaler = Scaler::new(ScalerType::Standard);
        let x = scaler.fit_transform(&base_feature_matrix(&current), &BASE_FEATURE_COLS)?;
        let y: Array1<f64> = current
            .iter()
            .map(|r| if r.neglect_score.is_finite() { r.neglect_score } else { 0.0 })
            .collect();

        let groups: Vec<String> = current.iter().map(|r| r.country_iso3.clone()).collect();
        let keys = SplitKeys {
            groups: Some(&groups),
            time: None,
        };
        let validator = CrossValidator::new(config.scoring_cv_strategy).with_random_state(config.random_state);

        let mut models = BTreeMap::new();
        let mut cv = HorizonCvStats::new();
        for model in BaseModel::ALL {
            let scores = validator.cross_val_score(|| model.build(&config.models), &x, &y, keys)?;
            let score = CvScore::from_scores(&scores);
            info!(model = %model, r2_mean = score.mean, r2_std = score.std, "Cross-validated current-year model");

            let mut fitted = model.build(&config.models);
            fitted.fit(&x, &y)?;
            cv.insert(model, score);
            models.insert(model, fitted);
        }

        let mut scoring = Self {
            year,
            scaler,
            models,
            cv,
            neglect_flag_threshold: config.neglect_flag_threshold,
            scores: Vec::new(),
        };
        let peers = PeerFinder::new(config.peer_k)?.find(&current)?;
        scoring.scores = scoring.score_rows(&current, &peers)?;

        let n = scoring.scores.len() as f64;
        let mean = scoring.scores.iter().map(|s| s.ensemble_score).sum::<f64>() / n;
        let std = (scoring.scores.iter().map(|s| (s.ensemble_score - mean).powi(2)).sum::<f64>() / n).sqrt();
        let agreement = scoring.scores.iter().map(|s| s.model_agreement).sum::<f64>() / n;
        info!(ensemble_mean = mean, ensemble_std = std, mean_agreement = agreement, "Scored current year");
        info!(
            threshold = scoring.neglect_flag_threshold,
            flagged = scoring.flagged().count(),
            critical = scoring
                .scores
                .iter()
                .filter(|s| s.anomaly_severity == SeverityBand::Critical)
                .count(),
            "Neglect flags"
        );

        Ok(scoring)
    }

    /// Score rows with the fitted models; `peers` fills each record's peer list
    pub fn score_rows(&self, rows: &[PanelRow], peers: &BTreeMap<String, Vec<String>>) -> Result<Vec<CountryScore>> {
        self.scaler.assert_columns(&BASE_FEATURE_COLS)?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let x = self.scaler.transform(&base_feature_matrix(rows))?;

        let mut preds = BTreeMap::new();
        for model in BaseModel::ALL {
            let fitted = self.models.get(&model).ok_or_else(|| ForecastError::MissingModel {
                horizon: "current".to_string(),
                model: model.key().to_string(),
            })?;
            let raw = fitted.predict(&x)?;
            preds.insert(model, raw.mapv(|v| clip_score(if v.is_finite() { v } else { 0.0 })));
        }
        let ensemble = weighted_average_ensemble(&preds, &self.cv, &BaseModel::ALL)?;
        let agreement = compute_agreement(&preds, &BaseModel::ALL)?;

        Ok(rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let model = |k: BaseModel| round_to(preds[&k][i], 2);
                let ensemble_score = round_to(ensemble[i], 2);
                CountryScore {
                    iso3: row.country_iso3.clone(),
                    year: row.year,
                    neglect_score: model(BaseModel::LightGbm),
                    ensemble_score,
                    model_scores: ModelScores {
                        lgbm: model(BaseModel::LightGbm),
                        rf: model(BaseModel::RandomForest),
                        xgb: model(BaseModel::XgBoost),
                        gbr: model(BaseModel::Gbr),
                        ensemble: ensemble_score,
                    },
                    model_agreement: round_to(agreement[i], 2),
                    fgi_score: round_to(row.fgi_score, 2),
                    anomaly_severity: row.severity(),
                    neglect_flag: ensemble_score >= self.neglect_flag_threshold,
                    peer_iso3: peers.get(&row.country_iso3).cloned().unwrap_or_default(),
                }
            })
            .collect())
    }

    /// Record of one country
    pub fn score(&self, iso3: &str) -> Option<&CountryScore> {
        self.scores.iter().find(|s| s.iso3 == iso3)
    }

    /// Countries whose ensemble score reaches the flag threshold
    pub fn flagged(&self) -> impl Iterator<Item = &CountryScore> {
        self.scores.iter().filter(|s| s.neglect_flag)
    }

    /// Peer list per country
    pub fn peers(&self) -> BTreeMap<&str, &[String]> {
        self.scores.iter().map(|s| (s.iso3.as_str(), s.peer_iso3.as_slice())).collect()
    }

    /// Records sorted by ensemble score, highest first
    pub fn ranked(&self) -> Vec<&CountryScore> {
        let mut ranked: Vec<&CountryScore> = self.scores.iter().collect();
        ranked.sort_by(|a, b| b.ensemble_score.total_cmp(&a.ensemble_score).then(a.iso3.cmp(&b.iso3)));
        debug!(countries = ranked.len(), "Ranked current-year scores");
        ranked
    }
}
