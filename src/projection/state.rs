//! Projection state and the feedback transition

use crate::feature_engineering::{TemporalFeature, TemporalFeatureRow, N_TEMPORAL_FEATURES, TEMPORAL_FEATURE_COLS};
use serde::de::{Deserialize, Deserializer};
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Funding movement per unit of neglect pressure per year (percentage points / 100)
pub const SENS_FUNDING: f64 = -0.18;
/// CBPF share movement per unit of neglect pressure per year
pub const SENS_CBPF: f64 = 0.06;
/// People-in-need movement per unit of neglect pressure per year (percentage points / 100)
pub const SENS_PIN: f64 = 0.04;

/// Weight of the funding-implied gap in the next FGI score
const FGI_IMPLIED_WEIGHT: f64 = 0.60;
/// Growth of `log_cbpf` per unit of CBPF share gained
const LOG_CBPF_RATCHET: f64 = 1.5;
const LOG_CBPF_MAX: f64 = 25.0;

/// The 23 temporal features of one entity at one simulated step.
///
/// Values are always finite. The state is never mutated in place;
/// [`ProjectionState::advance`] returns the next state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionState {
    values: [f64; N_TEMPORAL_FEATURES],
}

impl Default for ProjectionState {
    fn default() -> Self {
        Self {
            values: [0.0; N_TEMPORAL_FEATURES],
        }
    }
}

impl ProjectionState {
    /// Build from a name-keyed map. Missing and non-finite features become 0;
    /// keys outside the schema are ignored.
    pub fn from_map(features: &HashMap<String, f64>) -> Self {
        let mut values = [0.0; N_TEMPORAL_FEATURES];
        for feature in TemporalFeature::ALL {
            match features.get(feature.name()) {
                Some(v) if v.is_finite() => values[feature.index()] = *v,
                Some(v) => debug!(feature = feature.name(), value = %v, "non-finite feature set to 0"),
                None => debug!(feature = feature.name(), "missing feature defaulted to 0"),
            }
        }
        Self { values }
    }

    pub fn from_row(row: &TemporalFeatureRow) -> Self {
        Self::from_array(row.to_vector())
    }

    /// Build from a vector in schema order; non-finite values become 0
    pub fn from_array(values: [f64; N_TEMPORAL_FEATURES]) -> Self {
        Self {
            values: values.map(|v| if v.is_finite() { v } else { 0.0 }),
        }
    }

    pub fn get(&self, feature: TemporalFeature) -> f64 {
        self.values[feature.index()]
    }

    /// Value by column name
    pub fn get_by_name(&self, name: &str) -> Option<f64> {
        TemporalFeature::from_name(name).map(|f| self.get(f))
    }

    /// Feature vector in schema order
    pub fn to_vector(&self) -> [f64; N_TEMPORAL_FEATURES] {
        self.values
    }

    pub fn to_map(&self) -> BTreeMap<String, f64> {
        TemporalFeature::ALL
            .iter()
            .map(|f| (f.name().to_string(), self.get(*f)))
            .collect()
    }

    /// Copy with every value rounded to 4 decimals
    pub fn snapshot(&self) -> Self {
        Self {
            values: self.values.map(|v| round_to(v, 4)),
        }
    }

    /// Next state after one step of `step_years` under `predicted_neglect`.
    ///
    /// Neglect pressure lowers funding, raises CBPF share and people in need.
    /// FGI moves toward the funding-implied gap, CMI follows FGI and CBPF
    /// share. Current values rotate into the lag slots and the deltas and
    /// trend are recomputed from them. Every other feature carries over.
    pub fn advance(&self, predicted_neglect: f64, step_years: f64) -> Self {
        use TemporalFeature::*;

        let prev_fgi = self.get(FgiScore);
        let prev_funded = self.get(FundedPct);
        let prev_cbpf = self.get(CbpfShare);
        let prev_pin = self.get(PinPctPop);
        let prev_log_cbpf = self.get(LogCbpf);
        let prev_fgi_lag1 = self.get(FgiScoreLag1);

        let pressure = if predicted_neglect.is_finite() {
            (predicted_neglect / 100.0).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let push = pressure * step_years;

        let funded = (prev_funded + SENS_FUNDING * push * 100.0).clamp(0.0, 100.0);
        let implied_fgi = (1.0 - funded / 100.0) * 100.0;
        let fgi = (FGI_IMPLIED_WEIGHT * implied_fgi + (1.0 - FGI_IMPLIED_WEIGHT) * prev_fgi).clamp(0.0, 100.0);
        let cbpf = (prev_cbpf + SENS_CBPF * push).clamp(0.0, 1.0);
        let cmi = (fgi * (1.0 - cbpf)).clamp(0.0, 100.0);
        let pin = (prev_pin + SENS_PIN * push * 100.0).clamp(0.0, 100.0);
        // only CBPF share gains move log_cbpf
        let log_cbpf = (prev_log_cbpf + (cbpf - prev_cbpf).max(0.0) * LOG_CBPF_RATCHET).clamp(0.0, LOG_CBPF_MAX);

        let mut next = *self;
        let mut set = |f: TemporalFeature, v: f64| next.values[f.index()] = v;
        set(FundedPct, funded);
        set(FgiScore, fgi);
        set(CbpfShare, cbpf);
        set(CmiScore, cmi);
        set(PinPctPop, pin);
        set(LogCbpf, log_cbpf);

        set(FgiScoreLag2, prev_fgi_lag1);
        set(FgiScoreLag1, prev_fgi);
        set(FundedPctLag1, prev_funded);
        set(CbpfShareLag1, prev_cbpf);
        set(PinPctPopLag1, prev_pin);
        set(LogCbpfLag1, prev_log_cbpf);

        set(DeltaFgi1yr, fgi - prev_fgi);
        set(DeltaFundedPct1yr, funded - prev_funded);
        set(DeltaPinPct1yr, pin - prev_pin);
        set(TrendFgi2yr, (fgi - prev_fgi_lag1) / 2.0);
        next
    }
}

impl From<&HashMap<String, f64>> for ProjectionState {
    fn from(features: &HashMap<String, f64>) -> Self {
        Self::from_map(features)
    }
}

/// Serialized as a map in schema order
impl Serialize for ProjectionState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(N_TEMPORAL_FEATURES))?;
        for (name, value) in TEMPORAL_FEATURE_COLS.iter().zip(self.values.iter()) {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ProjectionState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let features = HashMap::<String, f64>::deserialize(deserializer)?;
        Ok(Self::from_map(&features))
    }
}

/// Round to `decimals` places, ties to even on the exact binary value.
///
/// `37.125` rounds to `37.12` while `2.675` (stored just below the tie)
/// rounds to `2.67`.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let precision = decimals.max(0) as usize;
    format!("{:.*}", precision, value).parse().unwrap_or(value)
}
