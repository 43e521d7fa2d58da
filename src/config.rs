//! Run configuration
//!
//! A JSON file may set any subset of the fields; the rest keep their
//! defaults.

use crate::error::{ForecastError, Result};
use crate::training::TrainingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default tracing filter
pub const DEFAULT_LOG_FILTER: &str = "neglect_forecast=info";

/// Projection length and step size
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectionConfig {
    pub n_steps: usize,
    /// Years advanced per step
    pub step_years: f64,
}

impl Default for ProjectionConfig {
    fn default() -> Self {
        Self {
            n_steps: 8,
            step_years: 0.25,
        }
    }
}

impl ProjectionConfig {
    pub fn with_n_steps(mut self, n: usize) -> Self {
        self.n_steps = n;
        self
    }

    pub fn with_step_years(mut self, years: f64) -> Self {
        self.step_years = years;
        self
    }

    /// Cumulative years of the last step
    pub fn total_years(&self) -> f64 {
        self.n_steps as f64 * self.step_years
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.step_years.is_finite() && self.step_years > 0.0) {
            return Err(ForecastError::InvalidParameter {
                name: "step_years".into(),
                value: self.step_years.to_string(),
                reason: "must be a positive number".into(),
            });
        }
        Ok(())
    }
}

/// Training, projection and logging settings of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    pub training: TrainingConfig,
    pub projection: ProjectionConfig,
    /// `tracing` env-filter directive, overridden by `RUST_LOG`
    pub log_filter: String,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            training: TrainingConfig::default(),
            projection: ProjectionConfig::default(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl ForecastConfig {
    /// Read and validate a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)
            .map_err(|e| ForecastError::ConfigError(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.training.validate()?;
        self.projection.validate()
    }
}
