//! Horizon ensemble training and forecast artifacts

use super::config::TrainingConfig;
use super::cross_validation::{CVStrategy, CrossValidator, CvScore, SplitKeys};
use super::models::{ModelMetrics, Regressor};
use super::registry::{BaseModel, HorizonCvStats, HorizonModelSet, TrainedRegressor};
use super::scoring::{CountryScore, CurrentYearScoring};
use crate::ensemble::{compute_agreement, weighted_average_ensemble};
use crate::error::{ForecastError, Result};
use crate::feature_engineering::{
    build_temporal_forecast_dataset, compute_lag_features, fit_temporal_scaler_with, temporal_feature_names,
    PanelRow, TemporalFeatureRow, TEMPORAL_FEATURE_COLS,
};
use crate::preprocessing::Scaler;
use crate::projection::{Horizon, TemporalProjector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Training summary of one horizon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HorizonReport {
    pub horizon: Horizon,
    pub n_pairs: usize,
    pub n_countries: usize,
    /// In-sample fit of the blended ensemble
    pub ensemble_metrics: ModelMetrics,
    /// Mean per-row spread of base-model predictions
    pub mean_agreement: f64,
    pub training_time_secs: f64,
}

/// Everything needed to rebuild a [`TemporalProjector`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastArtifacts {
    /// Column order the scaler and models were fitted on
    pub feature_columns: Vec<String>,
    pub base_keys: Vec<BaseModel>,
    pub scaler: Scaler,
    pub models: BTreeMap<Horizon, BTreeMap<BaseModel, TrainedRegressor>>,
    pub cv: BTreeMap<Horizon, HorizonCvStats>,
    pub reports: BTreeMap<Horizon, HorizonReport>,
    /// Latest-year models, scores and peers
    pub current: CurrentYearScoring,
}

impl ForecastArtifacts {
    /// Save artifacts as JSON
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load artifacts from JSON
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let artifacts: Self = serde_json::from_str(&json)?;
        Ok(artifacts)
    }

    /// Current-year score records, one per country
    pub fn scores(&self) -> &[CountryScore] {
        &self.current.scores
    }

    /// Peer codes of `iso3`, closest first
    pub fn peers_of(&self, iso3: &str) -> Option<&[String]> {
        self.current.score(iso3).map(|s| s.peer_iso3.as_slice())
    }

    /// Model set of one horizon
    pub fn model_set(&self, horizon: Horizon) -> Result<HorizonModelSet> {
        let trained = self.models.get(&horizon).ok_or_else(|| ForecastError::MissingModel {
            horizon: horizon.label().to_string(),
            model: "*".to_string(),
        })?;
        HorizonModelSet::from_trained(horizon, trained)
    }

    /// Projector over the stored models, scaler and CV weights
    pub fn projector(&self) -> Result<TemporalProjector> {
        check_feature_columns(&self.feature_columns)?;
        TemporalProjector::new(
            self.model_set(Horizon::OneYear)?,
            self.model_set(Horizon::TwoYear)?,
            &self.cv,
            Arc::new(self.scaler.clone()),
        )?
        .with_base_keys(&self.base_keys, &self.cv)
    }
}

fn check_feature_columns(columns: &[String]) -> Result<()> {
    if columns.len() != TEMPORAL_FEATURE_COLS.len() {
        return Err(ForecastError::FeatureShapeMismatch {
            expected: format!("{} feature columns", TEMPORAL_FEATURE_COLS.len()),
            actual: format!("{} feature columns", columns.len()),
        });
    }
    match columns.iter().zip(TEMPORAL_FEATURE_COLS).position(|(a, b)| a != b) {
        Some(position) => Err(ForecastError::ColumnOrderMismatch {
            position,
            expected: TEMPORAL_FEATURE_COLS[position].to_string(),
            actual: columns[position].clone(),
        }),
        None => Ok(()),
    }
}

/// Trains one CV-weighted ensemble per forecast horizon
pub struct EnsembleTrainer {
    config: TrainingConfig,
}

impl EnsembleTrainer {
    /// Fails when the configuration is out of range
    pub fn new(config: TrainingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Lag the panel, fit the scaler on every row, cross-validate and fit
    /// every base model for each horizon, then score the latest year
    pub fn train(&self, panel: &[PanelRow]) -> Result<ForecastArtifacts> {
        let rows = compute_lag_features(panel)?;
        let (scaler, _) = fit_temporal_scaler_with(&rows, self.config.scaler_type)?;
        info!(rows = rows.len(), "Fitted temporal scaler");

        let mut models = BTreeMap::new();
        let mut cv = BTreeMap::new();
        let mut reports = BTreeMap::new();
        for horizon in Horizon::ALL {
            let (trained, stats, report) = self.train_horizon(&rows, &scaler, horizon)?;
            models.insert(horizon, trained);
            cv.insert(horizon, stats);
            reports.insert(horizon, report);
        }
        let current = CurrentYearScoring::fit(panel, &self.config)?;

        Ok(ForecastArtifacts {
            feature_columns: temporal_feature_names(),
            base_keys: BaseModel::ALL.to_vec(),
            scaler,
            models,
            cv,
            reports,
            current,
        })
    }

    fn train_horizon(
        &self,
        rows: &[TemporalFeatureRow],
        scaler: &Scaler,
        horizon: Horizon,
    ) -> Result<(BTreeMap<BaseModel, TrainedRegressor>, HorizonCvStats, HorizonReport)> {
        let start = Instant::now();
        let dataset = build_temporal_forecast_dataset(rows, horizon.years(), self.config.min_year);
        let required = min_pairs(self.config.cv_strategy);
        if dataset.len() < required {
            return Err(ForecastError::TrainingError(format!(
                "{} horizon has {} training pairs, {} needed for {} folds",
                horizon,
                dataset.len(),
                required,
                self.config.cv_strategy.n_splits()
            )));
        }
        info!(
            horizon = %horizon,
            pairs = dataset.len(),
            countries = dataset.n_countries(),
            "Training horizon ensemble"
        );

        let x = scaler.transform(&dataset.x)?;
        let y = &dataset.y;
        let groups: Vec<String> = dataset.meta.iter().map(|(c, _)| c.clone()).collect();
        let years = dataset.years();
        let keys = SplitKeys {
            groups: Some(&groups),
            time: Some(&years),
        };
        let validator = CrossValidator::new(self.config.cv_strategy).with_random_state(self.config.random_state);

        let mut trained = BTreeMap::new();
        let mut stats = HorizonCvStats::new();
        let mut in_sample = BTreeMap::new();
        for model in BaseModel::ALL {
            let scores = validator.cross_val_score(|| model.build(&self.config.models), &x, y, keys)?;
            let score = CvScore::from_scores(&scores);
            info!(horizon = %horizon, model = %model, r2_mean = score.mean, r2_std = score.std, "Cross-validated");

            let mut fitted = model.build(&self.config.models);
            fitted.fit(&x, y)?;
            in_sample.insert(model, fitted.predict(&x)?);
            stats.insert(model, score);
            trained.insert(model, fitted);
        }

        let blended = weighted_average_ensemble(&in_sample, &stats, &BaseModel::ALL)?;
        let agreement = compute_agreement(&in_sample, &BaseModel::ALL)?;
        let report = HorizonReport {
            horizon,
            n_pairs: dataset.len(),
            n_countries: dataset.n_countries(),
            ensemble_metrics: ModelMetrics::compute_regression(y, &blended),
            mean_agreement: agreement.mean().unwrap_or(0.0),
            training_time_secs: start.elapsed().as_secs_f64(),
        };
        debug!(
            horizon = %horizon,
            ensemble_r2 = report.ensemble_metrics.r2,
            mean_agreement = report.mean_agreement,
            "In-sample ensemble fit"
        );

        Ok((trained, stats, report))
    }
}

/// Fewest training pairs a CV strategy can split
fn min_pairs(strategy: CVStrategy) -> usize {
    match strategy {
        CVStrategy::TimeSeriesSplit { n_splits } => n_splits + 1,
        other => other.n_splits(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel(countries: &[&str], years: std::ops::RangeInclusive<i32>) -> Vec<PanelRow> {
        let mut rows = Vec::new();
        for (c, iso3) in countries.iter().enumerate() {
            for year in years.clone() {
                let t = (year - 2015) as f64;
                let fgi = 20.0 + 5.0 * c as f64 + 3.0 * t;
                rows.push(PanelRow {
                    fgi_score: fgi,
                    funded_pct: 100.0 - fgi,
                    cbpf_share: 0.1,
                    neglect_score: fgi * 0.8,
                    ..PanelRow::new(*iso3, year)
                });
            }
        }
        rows
    }

    fn small_config() -> TrainingConfig {
        TrainingConfig::new().with_cv_folds(2).with_estimator_scale(0.05)
    }

    #[test]
    fn test_min_pairs() {
        assert_eq!(min_pairs(CVStrategy::TimeSeriesSplit { n_splits: 5 }), 6);
        assert_eq!(min_pairs(CVStrategy::GroupKFold { n_splits: 3 }), 3);
    }

    #[test]
    fn test_too_few_pairs() {
        // one country, two years: one 1yr pair and no 2yr pairs
        let trainer = EnsembleTrainer::new(small_config()).unwrap();
        let err = trainer.train(&panel(&["SDN"], 2019..=2020)).unwrap_err();
        assert!(matches!(err, ForecastError::TrainingError(_)));
    }

    #[test]
    fn test_train_produces_both_horizons() {
        let trainer = EnsembleTrainer::new(small_config()).unwrap();
        let artifacts = trainer.train(&panel(&["SDN", "YEM", "HTI"], 2015..=2021)).unwrap();

        assert_eq!(artifacts.models.len(), 2);
        for h in Horizon::ALL {
            assert_eq!(artifacts.models[&h].len(), 4);
            assert_eq!(artifacts.cv[&h].len(), 4);
        }
        assert_eq!(artifacts.reports[&Horizon::OneYear].n_pairs, 18);
        assert_eq!(artifacts.reports[&Horizon::TwoYear].n_pairs, 15);
        assert_eq!(artifacts.feature_columns, temporal_feature_names());
        assert!(artifacts.projector().is_ok());

        assert_eq!(artifacts.current.year, 2021);
        assert_eq!(artifacts.scores().len(), 3);
        assert_eq!(artifacts.current.cv.len(), 4);
        let mut peers = artifacts.peers_of("SDN").unwrap().to_vec();
        peers.sort();
        assert_eq!(peers, vec!["HTI".to_string(), "YEM".to_string()]);
        assert!(artifacts.peers_of("AFG").is_none());
    }

    #[test]
    fn test_feature_column_check() {
        let mut cols = temporal_feature_names();
        cols.swap(3, 4);
        assert!(matches!(
            check_feature_columns(&cols),
            Err(ForecastError::ColumnOrderMismatch { position: 3, .. })
        ));
        assert!(check_feature_columns(&temporal_feature_names()).is_ok());
    }
}
