//! Panel row types
//!
//! A [`PanelRow`] is one cleaned (country, year) observation. A
//! [`TemporalFeatureRow`] extends it with lag values; the delta and trend
//! columns are always computed from those lags and are never stored.

use super::builder::SeverityBand;
use super::schema::{TemporalFeature, N_TEMPORAL_FEATURES};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One (country, year) observation of the cleaned panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelRow {
    pub country_iso3: String,
    pub year: i32,
    pub fgi_score: f64,
    pub cmi_score: f64,
    pub cbpf_share: f64,
    pub pin_pct_pop: f64,
    pub log_req_usd: f64,
    pub log_cbpf: f64,
    pub funded_pct: f64,
    pub cbpf_per_pin: f64,
    pub req_per_pin: f64,
    pub bbr_median_z: f64,
    pub bbr_max_z: f64,
    pub n_cluster_anomalies: f64,
    pub n_clusters: f64,
    pub neglect_score: f64,
}

impl PanelRow {
    /// Create an all-zero row for a country and year
    pub fn new(country_iso3: impl Into<String>, year: i32) -> Self {
        Self {
            country_iso3: country_iso3.into(),
            year,
            fgi_score: 0.0,
            cmi_score: 0.0,
            cbpf_share: 0.0,
            pin_pct_pop: 0.0,
            log_req_usd: 0.0,
            log_cbpf: 0.0,
            funded_pct: 0.0,
            cbpf_per_pin: 0.0,
            req_per_pin: 0.0,
            bbr_median_z: 0.0,
            bbr_max_z: 0.0,
            n_cluster_anomalies: 0.0,
            n_clusters: 0.0,
            neglect_score: 0.0,
        }
    }

    /// Anomaly severity band of the funding-gap score
    pub fn severity(&self) -> SeverityBand {
        SeverityBand::from_fgi(self.fgi_score)
    }

    /// Value of a same-year base feature; `None` for lag-derived features
    pub fn base_value(&self, feature: TemporalFeature) -> Option<f64> {
        use TemporalFeature::*;
        let v = match feature {
            FgiScore => self.fgi_score,
            CmiScore => self.cmi_score,
            CbpfShare => self.cbpf_share,
            PinPctPop => self.pin_pct_pop,
            LogReqUsd => self.log_req_usd,
            LogCbpf => self.log_cbpf,
            FundedPct => self.funded_pct,
            CbpfPerPin => self.cbpf_per_pin,
            ReqPerPin => self.req_per_pin,
            BbrMedianZ => self.bbr_median_z,
            BbrMaxZ => self.bbr_max_z,
            NClusterAnomalies => self.n_cluster_anomalies,
            NClusters => self.n_clusters,
            _ => return None,
        };
        Some(v)
    }

    /// Set a same-year base feature. Lag-derived features are ignored.
    pub fn set_base_value(&mut self, feature: TemporalFeature, value: f64) {
        use TemporalFeature::*;
        match feature {
            FgiScore => self.fgi_score = value,
            CmiScore => self.cmi_score = value,
            CbpfShare => self.cbpf_share = value,
            PinPctPop => self.pin_pct_pop = value,
            LogReqUsd => self.log_req_usd = value,
            LogCbpf => self.log_cbpf = value,
            FundedPct => self.funded_pct = value,
            CbpfPerPin => self.cbpf_per_pin = value,
            ReqPerPin => self.req_per_pin = value,
            BbrMedianZ => self.bbr_median_z = value,
            BbrMaxZ => self.bbr_max_z = value,
            NClusterAnomalies => self.n_cluster_anomalies = value,
            NClusters => self.n_clusters = value,
            _ => {}
        }
    }
}

/// Raw lag values of a temporal row
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LagFields {
    pub fgi_score_lag1: f64,
    pub fgi_score_lag2: f64,
    pub funded_pct_lag1: f64,
    pub cbpf_share_lag1: f64,
    pub pin_pct_pop_lag1: f64,
    pub log_cbpf_lag1: f64,
}

impl LagFields {
    /// Cold-start lags: every lag equals the current value (zero delta, flat trend)
    pub fn cold_start(row: &PanelRow) -> Self {
        Self {
            fgi_score_lag1: row.fgi_score,
            fgi_score_lag2: row.fgi_score,
            funded_pct_lag1: row.funded_pct,
            cbpf_share_lag1: row.cbpf_share,
            pin_pct_pop_lag1: row.pin_pct_pop,
            log_cbpf_lag1: row.log_cbpf,
        }
    }

    /// Lags taken from the previous one or two observations of the same country.
    ///
    /// A missing `prev1` falls back to the current row; a missing `prev2`
    /// falls back to the resolved lag-1 value.
    pub fn from_history(current: &PanelRow, prev1: Option<&PanelRow>, prev2: Option<&PanelRow>) -> Self {
        let lag1 = prev1.unwrap_or(current);
        let fgi_score_lag1 = lag1.fgi_score;
        Self {
            fgi_score_lag1,
            fgi_score_lag2: prev2.map(|r| r.fgi_score).unwrap_or(fgi_score_lag1),
            funded_pct_lag1: lag1.funded_pct,
            cbpf_share_lag1: lag1.cbpf_share,
            pin_pct_pop_lag1: lag1.pin_pct_pop,
            log_cbpf_lag1: lag1.log_cbpf,
        }
    }
}

/// Panel row extended with lag, delta and trend features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalFeatureRow {
    pub panel: PanelRow,
    pub lags: LagFields,
}

impl TemporalFeatureRow {
    pub fn new(panel: PanelRow, lags: LagFields) -> Self {
        Self { panel, lags }
    }

    pub fn country_iso3(&self) -> &str {
        &self.panel.country_iso3
    }

    pub fn year(&self) -> i32 {
        self.panel.year
    }

    pub fn delta_fgi_1yr(&self) -> f64 {
        self.panel.fgi_score - self.lags.fgi_score_lag1
    }

    pub fn delta_funded_pct_1yr(&self) -> f64 {
        self.panel.funded_pct - self.lags.funded_pct_lag1
    }

    pub fn delta_pin_pct_1yr(&self) -> f64 {
        self.panel.pin_pct_pop - self.lags.pin_pct_pop_lag1
    }

    pub fn trend_fgi_2yr(&self) -> f64 {
        (self.panel.fgi_score - self.lags.fgi_score_lag2) / 2.0
    }

    /// Value of any temporal feature
    pub fn get(&self, feature: TemporalFeature) -> f64 {
        use TemporalFeature::*;
        match feature {
            FgiScoreLag1 => self.lags.fgi_score_lag1,
            FgiScoreLag2 => self.lags.fgi_score_lag2,
            FundedPctLag1 => self.lags.funded_pct_lag1,
            CbpfShareLag1 => self.lags.cbpf_share_lag1,
            PinPctPopLag1 => self.lags.pin_pct_pop_lag1,
            LogCbpfLag1 => self.lags.log_cbpf_lag1,
            DeltaFgi1yr => self.delta_fgi_1yr(),
            DeltaFundedPct1yr => self.delta_funded_pct_1yr(),
            DeltaPinPct1yr => self.delta_pin_pct_1yr(),
            TrendFgi2yr => self.trend_fgi_2yr(),
            base => self.panel.base_value(base).unwrap_or(0.0),
        }
    }

    /// Feature vector in schema order
    pub fn to_vector(&self) -> [f64; N_TEMPORAL_FEATURES] {
        let mut out = [0.0; N_TEMPORAL_FEATURES];
        for feature in TemporalFeature::ALL {
            out[feature.index()] = self.get(feature);
        }
        out
    }

    /// Flatten into a name-keyed snapshot row
    pub fn to_snapshot_row(&self) -> SnapshotRow {
        let features = TemporalFeature::ALL
            .iter()
            .map(|f| (f.name().to_string(), self.get(*f)))
            .collect();
        SnapshotRow {
            country_iso3: self.panel.country_iso3.clone(),
            features,
        }
    }
}

/// One entity of a batch projection request: a country code plus named features
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRow {
    pub country_iso3: String,
    pub features: HashMap<String, f64>,
}
