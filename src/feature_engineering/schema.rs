//! Temporal feature schema
//!
//! The ordered list of the 23 temporal feature columns is declared exactly
//! once here. Panel rows, the scaler, the forecast dataset and the projector
//! all index features through [`TemporalFeature`], so the column order used
//! at training time is the column order used at inference time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of temporal features fed to every forecast model
pub const N_TEMPORAL_FEATURES: usize = 23;

/// One column of the temporal feature vector, in schema order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalFeature {
    FgiScore,
    CmiScore,
    CbpfShare,
    PinPctPop,
    LogReqUsd,
    LogCbpf,
    FundedPct,
    CbpfPerPin,
    ReqPerPin,
    BbrMedianZ,
    BbrMaxZ,
    NClusterAnomalies,
    NClusters,
    FgiScoreLag1,
    FgiScoreLag2,
    FundedPctLag1,
    CbpfShareLag1,
    PinPctPopLag1,
    LogCbpfLag1,
    #[serde(rename = "delta_fgi_1yr")]
    DeltaFgi1yr,
    #[serde(rename = "delta_funded_pct_1yr")]
    DeltaFundedPct1yr,
    #[serde(rename = "delta_pin_pct_1yr")]
    DeltaPinPct1yr,
    #[serde(rename = "trend_fgi_2yr")]
    TrendFgi2yr,
}

impl TemporalFeature {
    /// All features in column order
    pub const ALL: [TemporalFeature; N_TEMPORAL_FEATURES] = [
        TemporalFeature::FgiScore,
        TemporalFeature::CmiScore,
        TemporalFeature::CbpfShare,
        TemporalFeature::PinPctPop,
        TemporalFeature::LogReqUsd,
        TemporalFeature::LogCbpf,
        TemporalFeature::FundedPct,
        TemporalFeature::CbpfPerPin,
        TemporalFeature::ReqPerPin,
        TemporalFeature::BbrMedianZ,
        TemporalFeature::BbrMaxZ,
        TemporalFeature::NClusterAnomalies,
        TemporalFeature::NClusters,
        TemporalFeature::FgiScoreLag1,
        TemporalFeature::FgiScoreLag2,
        TemporalFeature::FundedPctLag1,
        TemporalFeature::CbpfShareLag1,
        TemporalFeature::PinPctPopLag1,
        TemporalFeature::LogCbpfLag1,
        TemporalFeature::DeltaFgi1yr,
        TemporalFeature::DeltaFundedPct1yr,
        TemporalFeature::DeltaPinPct1yr,
        TemporalFeature::TrendFgi2yr,
    ];

    /// Column position of this feature
    pub fn index(self) -> usize {
        self as usize
    }

    /// Column name as it appears in panel tables
    pub fn name(self) -> &'static str {
        TEMPORAL_FEATURE_COLS[self.index()]
    }

    /// Look up a feature by column name
    pub fn from_name(name: &str) -> Option<Self> {
        TEMPORAL_FEATURE_COLS
            .iter()
            .position(|&c| c == name)
            .map(|i| Self::ALL[i])
    }

    /// Whether the feature is one of the 13 same-year base columns
    pub fn is_base(self) -> bool {
        self.index() < BASE_FEATURE_COLS.len()
    }
}

impl fmt::Display for TemporalFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered temporal feature column names
pub const TEMPORAL_FEATURE_COLS: [&str; N_TEMPORAL_FEATURES] = [
    "fgi_score",
    "cmi_score",
    "cbpf_share",
    "pin_pct_pop",
    "log_req_usd",
    "log_cbpf",
    "funded_pct",
    "cbpf_per_pin",
    "req_per_pin",
    "bbr_median_z",
    "bbr_max_z",
    "n_cluster_anomalies",
    "n_clusters",
    "fgi_score_lag1",
    "fgi_score_lag2",
    "funded_pct_lag1",
    "cbpf_share_lag1",
    "pin_pct_pop_lag1",
    "log_cbpf_lag1",
    "delta_fgi_1yr",
    "delta_funded_pct_1yr",
    "delta_pin_pct_1yr",
    "trend_fgi_2yr",
];

/// Same-year feature columns (prefix of [`TEMPORAL_FEATURE_COLS`])
pub const BASE_FEATURE_COLS: [&str; 13] = [
    "fgi_score",
    "cmi_score",
    "cbpf_share",
    "pin_pct_pop",
    "log_req_usd",
    "log_cbpf",
    "funded_pct",
    "cbpf_per_pin",
    "req_per_pin",
    "bbr_median_z",
    "bbr_max_z",
    "n_cluster_anomalies",
    "n_clusters",
];

/// Owned copy of the temporal column names, as recorded by fitted artifacts
pub fn temporal_feature_names() -> Vec<String> {
    TEMPORAL_FEATURE_COLS.iter().map(|s| s.to_string()).collect()
}
