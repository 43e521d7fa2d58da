//! Model training module
//!
//! Provides the horizon ensembles behind the projector:
//! - Native tree learners (CART, Random Forest, GBR, XGBoost, LightGBM)
//! - Cross-validation (K-Fold, Group K-Fold, expanding-window time series)
//! - The typed base-model registry
//! - Per-horizon ensemble training and persisted artifacts
//! - Current-year scoring and peer countries

mod config;
mod models;
mod registry;
mod scoring;
mod trainer;
pub mod cross_validation;
pub mod decision_tree;
pub mod gradient_boosting;
pub mod lightgbm;
pub mod peers;
pub mod random_forest;
pub mod xgboost;

pub use config::{ModelParams, TrainingConfig};
pub use cross_validation::{CVSplit, CVStrategy, CrossValidator, CvScore, SplitKeys};
pub use decision_tree::{DecisionTree, TreeNode};
pub use gradient_boosting::{GradientBoostingConfig, GradientBoostingRegressor};
pub use lightgbm::{LightGBMConfig, LightGBMRegressor};
pub use models::{r2_score, ModelMetrics, Regressor};
pub use peers::{PeerFinder, DEFAULT_PEER_K};
pub use random_forest::{MaxFeatures, RandomForest, RandomForestConfig};
pub use registry::{BaseModel, HorizonCvStats, HorizonModelSet, TrainedRegressor};
pub use scoring::{CountryScore, CurrentYearScoring, ModelScores, DEFAULT_NEGLECT_FLAG_THRESHOLD};
pub use trainer::{EnsembleTrainer, ForecastArtifacts, HorizonReport};
pub use xgboost::{XGBoostConfig, XGBoostRegressor};
