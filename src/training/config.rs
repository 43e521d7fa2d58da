//! Training configuration

use super::cross_validation::CVStrategy;
use super::gradient_boosting::GradientBoostingConfig;
use super::lightgbm::LightGBMConfig;
use super::peers::DEFAULT_PEER_K;
use super::random_forest::RandomForestConfig;
use super::scoring::DEFAULT_NEGLECT_FLAG_THRESHOLD;
use super::xgboost::XGBoostConfig;
use crate::error::{ForecastError, Result};
use crate::feature_engineering::DEFAULT_MIN_YEAR;
use crate::preprocessing::ScalerType;
use serde::{Deserialize, Serialize};

/// Hyperparameters of the four base models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ModelParams {
    pub lightgbm: LightGBMConfig,
    pub random_forest: RandomForestConfig,
    pub xgboost: XGBoostConfig,
    pub gradient_boosting: GradientBoostingConfig,
}

impl ModelParams {
    /// Scale every tree count by `factor`, keeping at least one tree
    pub fn scaled(mut self, factor: f64) -> Self {
        let scale = |n: usize| ((n as f64 * factor).round() as usize).max(1);
        self.lightgbm.n_estimators = scale(self.lightgbm.n_estimators);
        self.random_forest.n_estimators = scale(self.random_forest.n_estimators);
        self.xgboost.n_estimators = scale(self.xgboost.n_estimators);
        self.gradient_boosting.n_estimators = scale(self.gradient_boosting.n_estimators);
        self
    }

    /// Use one seed for every model
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.lightgbm.random_state = seed;
        self.random_forest.random_state = seed;
        self.xgboost.random_state = seed;
        self.gradient_boosting.random_state = seed;
        self
    }
}

/// Configuration for ensemble training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Earliest base year of training pairs
    pub min_year: i32,
    /// Cross-validation strategy for horizon models
    pub cv_strategy: CVStrategy,
    /// Scaler fitted over the temporal features
    pub scaler_type: ScalerType,
    /// Base model hyperparameters
    pub models: ModelParams,
    /// Seed for shuffled splits
    pub random_state: u64,
    /// Cross-validation strategy for current-year scoring models
    pub scoring_cv_strategy: CVStrategy,
    /// Peer neighbourhood size, the country itself included
    pub peer_k: usize,
    /// Ensemble score at or above which a country is flagged
    pub neglect_flag_threshold: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_year: DEFAULT_MIN_YEAR,
            cv_strategy: CVStrategy::default(),
            scaler_type: ScalerType::Robust,
            models: ModelParams::default(),
            random_state: 42,
            scoring_cv_strategy: CVStrategy::GroupKFold { n_splits: 5 },
            peer_k: DEFAULT_PEER_K,
            neglect_flag_threshold: DEFAULT_NEGLECT_FLAG_THRESHOLD,
        }
    }
}

impl TrainingConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to set the earliest base year
    pub fn with_min_year(mut self, year: i32) -> Self {
        self.min_year = year;
        self
    }

    /// Builder method to set the CV strategy
    pub fn with_cv_strategy(mut self, strategy: CVStrategy) -> Self {
        self.cv_strategy = strategy;
        self
    }

    /// Builder method to set the number of CV folds of every strategy
    pub fn with_cv_folds(mut self, n: usize) -> Self {
        self.cv_strategy = self.cv_strategy.with_n_splits(n);
        self.scoring_cv_strategy = self.scoring_cv_strategy.with_n_splits(n);
        self
    }

    /// Builder method to set the current-year CV strategy
    pub fn with_scoring_cv_strategy(mut self, strategy: CVStrategy) -> Self {
        self.scoring_cv_strategy = strategy;
        self
    }

    /// Builder method to set the peer neighbourhood size
    pub fn with_peer_k(mut self, k: usize) -> Self {
        self.peer_k = k;
        self
    }

    /// Builder method to set the neglect flag threshold
    pub fn with_neglect_flag_threshold(mut self, threshold: f64) -> Self {
        self.neglect_flag_threshold = threshold;
        self
    }

    /// Builder method to set the scaler type
    pub fn with_scaler(mut self, scaler_type: ScalerType) -> Self {
        self.scaler_type = scaler_type;
        self
    }

    /// Builder method to shrink or grow every tree ensemble
    pub fn with_estimator_scale(mut self, factor: f64) -> Self {
        self.models = self.models.scaled(factor);
        self
    }

    /// Builder method to set one seed for splits and models
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self.models = self.models.with_seed(seed);
        self
    }

    /// Check parameter ranges
    pub fn validate(&self) -> Result<()> {
        let counts = [
            ("cv_folds", self.cv_strategy.n_splits()),
            ("scoring_cv_folds", self.scoring_cv_strategy.n_splits()),
            ("peer_k", self.peer_k),
        ];
        for (name, n) in counts {
            if n < 2 {
                return Err(ForecastError::InvalidParameter {
                    name: name.into(),
                    value: n.to_string(),
                    reason: "must be at least 2".into(),
                });
            }
        }
        if !self.neglect_flag_threshold.is_finite() {
            return Err(ForecastError::InvalidParameter {
                name: "neglect_flag_threshold".into(),
                value: self.neglect_flag_threshold.to_string(),
                reason: "must be finite".into(),
            });
        }
        let rates = [
            ("lightgbm.learning_rate", self.models.lightgbm.learning_rate),
            ("xgboost.learning_rate", self.models.xgboost.learning_rate),
            ("gradient_boosting.learning_rate", self.models.gradient_boosting.learning_rate),
        ];
        for (name, rate) in rates {
            if !(rate > 0.0 && rate <= 1.0) {
                return Err(ForecastError::InvalidParameter {
                    name: name.into(),
                    value: rate.to_string(),
                    reason: "must be in (0, 1]".into(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrainingConfig::default();
        assert_eq!(config.min_year, 2015);
        assert_eq!(config.cv_strategy, CVStrategy::TimeSeriesSplit { n_splits: 5 });
        assert_eq!(config.models.lightgbm.n_estimators, 400);
        assert_eq!(config.models.random_forest.n_estimators, 300);
        assert_eq!(config.scoring_cv_strategy, CVStrategy::GroupKFold { n_splits: 5 });
        assert_eq!(config.peer_k, 6);
        assert_eq!(config.neglect_flag_threshold, 65.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_pattern() {
        let config = TrainingConfig::new()
            .with_min_year(2018)
            .with_cv_folds(3)
            .with_estimator_scale(0.1)
            .with_random_state(7);

        assert_eq!(config.min_year, 2018);
        assert_eq!(config.cv_strategy.n_splits(), 3);
        assert_eq!(config.scoring_cv_strategy.n_splits(), 3);
        assert_eq!(config.models.lightgbm.n_estimators, 40);
        assert_eq!(config.models.gradient_boosting.n_estimators, 30);
        assert_eq!(config.models.xgboost.random_state, 7);
    }

    #[test]
    fn test_validate_rejects_single_fold() {
        let config = TrainingConfig::new().with_cv_folds(1);
        assert!(matches!(config.validate(), Err(ForecastError::InvalidParameter { .. })));
    }

    #[test]
    fn test_validate_rejects_bad_scoring_settings() {
        let config = TrainingConfig::new().with_peer_k(1);
        assert!(matches!(config.validate(), Err(ForecastError::InvalidParameter { .. })));
        let config = TrainingConfig::new().with_neglect_flag_threshold(f64::NAN);
        assert!(matches!(config.validate(), Err(ForecastError::InvalidParameter { .. })));
    }

    #[test]
    fn test_json_round_trip() {
        let config = TrainingConfig::new().with_cv_strategy(CVStrategy::GroupKFold { n_splits: 4 });
        let json = serde_json::to_string(&config).unwrap();
        let back: TrainingConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
