//! Neglect Forecast - temporal projection of humanitarian neglect scores
//!
//! This crate builds lagged temporal features from a (country, year) panel,
//! trains one- and two-year ensembles of tree models, and projects a
//! country's neglect score quarter by quarter, feeding each prediction back
//! into the next quarter's features.
//!
//! # Modules
//!
//! ## Data
//! - [`feature_engineering`] - Feature schema, panel rows, lags, datasets
//! - [`preprocessing`] - Column scaling with a recorded column order
//! - [`utils`] - CSV loading
//!
//! ## Models
//! - [`training`] - Tree learners, cross-validation, ensemble training
//! - [`ensemble`] - CV-weighted blending and model agreement
//! - [`projection`] - Recursive multi-step projection
//!
//! ## Services
//! - [`config`] - Run configuration
//! - [`cli`] - Command-line interface

// Core error handling
pub mod error;
pub mod config;

// Data
pub mod feature_engineering;
pub mod preprocessing;
pub mod utils;

// Models
pub mod training;
pub mod ensemble;
pub mod projection;

// Services
pub mod cli;

pub use error::{ForecastError, Result};

/// Re-export commonly used types
pub mod prelude {
    // Error handling
    pub use crate::error::{ForecastError, Result};

    // Configuration
    pub use crate::config::{ForecastConfig, ProjectionConfig};

    // Features
    pub use crate::feature_engineering::{
        build_temporal_forecast_dataset, compute_lag_features, enrich_snapshot_with_lags, fit_temporal_scaler,
        PanelRow, SnapshotRow, TemporalFeature, TemporalFeatureRow, TEMPORAL_FEATURE_COLS,
    };

    // Training
    pub use crate::training::{
        BaseModel, CountryScore, CurrentYearScoring, EnsembleTrainer, ForecastArtifacts, HorizonModelSet, PeerFinder,
        Regressor, TrainingConfig,
    };

    // Projection
    pub use crate::projection::{Horizon, ProjectionState, ProjectionStep, TemporalProjector};

    // Data loading
    pub use crate::utils::DataLoader;
}
