//! Model registry
//!
//! Two-level typed registry: a [`HorizonModelSet`] maps every [`BaseModel`]
//! to a fitted regressor for one [`Horizon`].

use super::config::ModelParams;
use super::cross_validation::CvScore;
use super::gradient_boosting::GradientBoostingRegressor;
use super::lightgbm::LightGBMRegressor;
use super::models::Regressor;
use super::random_forest::RandomForest;
use super::xgboost::XGBoostRegressor;
use crate::error::{ForecastError, Result};
use crate::projection::Horizon;
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// The base learners of the ensemble
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BaseModel {
    #[serde(rename = "LightGBM")]
    LightGbm,
    #[serde(rename = "RandomForest")]
    RandomForest,
    #[serde(rename = "XGBoost")]
    XgBoost,
    #[serde(rename = "GBR")]
    Gbr,
}

impl BaseModel {
    /// All base models in blending order
    pub const ALL: [BaseModel; 4] = [BaseModel::LightGbm, BaseModel::RandomForest, BaseModel::XgBoost, BaseModel::Gbr];

    /// Stable registry key
    pub fn key(self) -> &'static str {
        match self {
            BaseModel::LightGbm => "LightGBM",
            BaseModel::RandomForest => "RandomForest",
            BaseModel::XgBoost => "XGBoost",
            BaseModel::Gbr => "GBR",
        }
    }

    /// Short name used in projection score records
    pub fn short_name(self) -> &'static str {
        match self {
            BaseModel::LightGbm => "lgbm",
            BaseModel::RandomForest => "rf",
            BaseModel::XgBoost => "xgb",
            BaseModel::Gbr => "gbr",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.key() == key)
    }

    /// Unfitted regressor with the configured hyperparameters
    pub fn build(self, params: &ModelParams) -> TrainedRegressor {
        match self {
            BaseModel::LightGbm => TrainedRegressor::LightGbm(LightGBMRegressor::new(params.lightgbm.clone())),
            BaseModel::RandomForest => TrainedRegressor::RandomForest(RandomForest::from_config(&params.random_forest)),
            BaseModel::XgBoost => TrainedRegressor::XgBoost(XGBoostRegressor::new(params.xgboost.clone())),
            BaseModel::Gbr => TrainedRegressor::Gbr(GradientBoostingRegressor::new(params.gradient_boosting.clone())),
        }
    }
}

impl fmt::Display for BaseModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Serializable regressor of any base model type
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "model", content = "state")]
pub enum TrainedRegressor {
    LightGbm(LightGBMRegressor),
    RandomForest(RandomForest),
    XgBoost(XGBoostRegressor),
    Gbr(GradientBoostingRegressor),
}

impl TrainedRegressor {
    pub fn base_model(&self) -> BaseModel {
        match self {
            TrainedRegressor::LightGbm(_) => BaseModel::LightGbm,
            TrainedRegressor::RandomForest(_) => BaseModel::RandomForest,
            TrainedRegressor::XgBoost(_) => BaseModel::XgBoost,
            TrainedRegressor::Gbr(_) => BaseModel::Gbr,
        }
    }

    fn inner(&self) -> &dyn Regressor {
        match self {
            TrainedRegressor::LightGbm(m) => m,
            TrainedRegressor::RandomForest(m) => m,
            TrainedRegressor::XgBoost(m) => m,
            TrainedRegressor::Gbr(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Regressor {
        match self {
            TrainedRegressor::LightGbm(m) => m,
            TrainedRegressor::RandomForest(m) => m,
            TrainedRegressor::XgBoost(m) => m,
            TrainedRegressor::Gbr(m) => m,
        }
    }
}

impl Regressor for TrainedRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.inner_mut().fit(x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        self.inner().predict(x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        self.inner().feature_importances()
    }
}

/// Cross-validated R² per base model for one horizon
pub type HorizonCvStats = BTreeMap<BaseModel, CvScore>;

/// Fitted regressors for every base model of one horizon
#[derive(Clone)]
pub struct HorizonModelSet {
    horizon: Horizon,
    models: BTreeMap<BaseModel, Arc<dyn Regressor>>,
}

impl HorizonModelSet {
    /// Fails with `MissingModel` unless every [`BaseModel`] is present
    pub fn new(horizon: Horizon, models: BTreeMap<BaseModel, Arc<dyn Regressor>>) -> Result<Self> {
        if let Some(missing) = BaseModel::ALL.into_iter().find(|m| !models.contains_key(m)) {
            return Err(ForecastError::MissingModel {
                horizon: horizon.label().to_string(),
                model: missing.key().to_string(),
            });
        }
        Ok(Self { horizon, models })
    }

    /// Build from serializable fitted regressors
    pub fn from_trained(horizon: Horizon, trained: &BTreeMap<BaseModel, TrainedRegressor>) -> Result<Self> {
        let models = trained
            .iter()
            .map(|(k, m)| (*k, Arc::new(m.clone()) as Arc<dyn Regressor>))
            .collect();
        Self::new(horizon, models)
    }

    pub fn horizon(&self) -> Horizon {
        self.horizon
    }

    pub fn get(&self, model: BaseModel) -> Result<&Arc<dyn Regressor>> {
        self.models.get(&model).ok_or_else(|| ForecastError::MissingModel {
            horizon: self.horizon.label().to_string(),
            model: model.key().to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (BaseModel, &Arc<dyn Regressor>)> {
        self.models.iter().map(|(k, m)| (*k, m))
    }
}

impl fmt::Debug for HorizonModelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HorizonModelSet")
            .field("horizon", &self.horizon)
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    struct Constant(f64);

    impl Regressor for Constant {
        fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
            Ok(())
        }

        fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
            Ok(Array1::from_elem(x.nrows(), self.0))
        }
    }

    fn constants(keys: &[BaseModel]) -> BTreeMap<BaseModel, Arc<dyn Regressor>> {
        keys.iter().map(|k| (*k, Arc::new(Constant(1.0)) as Arc<dyn Regressor>)).collect()
    }

    #[test]
    fn test_model_set_requires_every_base_model() {
        let err = HorizonModelSet::new(Horizon::TwoYear, constants(&BaseModel::ALL[..3])).unwrap_err();
        match err {
            ForecastError::MissingModel { horizon, model } => {
                assert_eq!(horizon, "2yr");
                assert_eq!(model, "GBR");
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let set = HorizonModelSet::new(Horizon::OneYear, constants(&BaseModel::ALL)).unwrap();
        assert_eq!(set.iter().count(), 4);
        let pred = set.get(BaseModel::XgBoost).unwrap().predict(&array![[0.0], [0.0]]).unwrap();
        assert_eq!(pred.to_vec(), vec![1.0, 1.0]);
    }

    #[test]
    fn test_keys() {
        for m in BaseModel::ALL {
            assert_eq!(BaseModel::from_key(m.key()), Some(m));
            assert_eq!(serde_json::to_string(&m).unwrap(), format!("\"{}\"", m.key()));
        }
        assert_eq!(BaseModel::from_key("Stacking"), None);
    }

    #[test]
    fn test_build_matches_base_model() {
        let params = ModelParams::default();
        for m in BaseModel::ALL {
            assert_eq!(m.build(&params).base_model(), m);
        }
    }

    #[test]
    fn test_cv_stats_serialize_with_model_keys() {
        let mut stats = HorizonCvStats::new();
        stats.insert(BaseModel::Gbr, CvScore { mean: 0.5, std: 0.1 });
        let json = serde_json::to_string(&stats).unwrap();
        assert_eq!(json, r#"{"GBR":{"mean":0.5,"std":0.1}}"#);
    }
}
