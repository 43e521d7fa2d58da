//! Temporal feature engineering
//!
//! - Feature schema shared by training and inference
//! - Panel construction and the composite neglect score
//! - Per-country lag, delta and trend features
//! - Supervised forecast datasets and the feature scaler

pub mod builder;
pub mod dataset;
pub mod lags;
pub mod panel;
pub mod schema;

pub use builder::{compute_neglect_scores, ClusterEfficiency, FeatureBuilder, FundingRecord, SeverityBand};
pub use dataset::{
    build_temporal_forecast_dataset, feature_matrix, fit_temporal_scaler, fit_temporal_scaler_with,
    ForecastDataset, DEFAULT_MIN_YEAR,
};
pub use lags::{compute_lag_features, enrich_snapshot_with_lags};
pub use panel::{LagFields, PanelRow, SnapshotRow, TemporalFeatureRow};
pub use schema::{temporal_feature_names, TemporalFeature, BASE_FEATURE_COLS, N_TEMPORAL_FEATURES, TEMPORAL_FEATURE_COLS};
