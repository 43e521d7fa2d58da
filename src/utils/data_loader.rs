//! Data loading utilities
//!
//! Reads already-cleaned panel and snapshot tables from CSV into typed rows.

use crate::error::{ForecastError, Result};
use crate::feature_engineering::{compute_neglect_scores, PanelRow, SeverityBand, SnapshotRow, TemporalFeature};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::path::Path;
use tracing::{debug, info};

pub const COUNTRY_COLUMN: &str = "country_iso3";
pub const YEAR_COLUMN: &str = "year";
pub const TARGET_COLUMN: &str = "neglect_score";

/// CSV loader for panel and snapshot tables
pub struct DataLoader {
    /// Rows scanned to infer column types
    infer_schema_length: Option<usize>,
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DataLoader {
    pub fn new() -> Self {
        Self {
            infer_schema_length: Some(100),
        }
    }

    /// Set the number of rows scanned for type inference; `None` scans all
    pub fn with_infer_schema_length(mut self, n: Option<usize>) -> Self {
        self.infer_schema_length = n;
        self
    }

    /// Load a CSV file with a header row
    pub fn load_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| ForecastError::DataError(format!("{}: {}", path.display(), e)))?;

        let df = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(self.infer_schema_length)
            .into_reader_with_file_handle(file)
            .finish()?;
        debug!(path = %path.display(), rows = df.height(), cols = df.width(), "Loaded CSV");
        Ok(df)
    }

    /// Load a panel CSV straight into rows
    pub fn load_panel(&self, path: impl AsRef<Path>) -> Result<Vec<PanelRow>> {
        panel_from_frame(&self.load_csv(path)?)
    }

    /// Load a snapshot CSV straight into rows
    pub fn load_snapshot(&self, path: impl AsRef<Path>) -> Result<Vec<SnapshotRow>> {
        snapshot_from_frame(&self.load_csv(path)?)
    }
}

/// Convert a panel table into rows.
///
/// `country_iso3` and `year` are required. Base feature columns missing from
/// the frame are filled with 0, as are null cells. When the frame has no
/// `neglect_score` column the composite score is computed over the table.
pub fn panel_from_frame(df: &DataFrame) -> Result<Vec<PanelRow>> {
    let countries = string_column(df, COUNTRY_COLUMN)?;
    let years = year_column(df)?;

    let mut rows: Vec<PanelRow> = countries
        .into_iter()
        .zip(years)
        .map(|(c, y)| PanelRow::new(c, y))
        .collect();

    for feature in TemporalFeature::ALL.into_iter().filter(|f| f.is_base()) {
        match optional_f64_column(df, feature.name())? {
            Some(values) => {
                for (row, v) in rows.iter_mut().zip(values) {
                    row.set_base_value(feature, v.filter(|v| v.is_finite()).unwrap_or(0.0));
                }
            }
            None => debug!(column = feature.name(), "panel column missing, filled with 0"),
        }
    }

    match optional_f64_column(df, TARGET_COLUMN)? {
        Some(values) => {
            for (row, v) in rows.iter_mut().zip(values) {
                row.neglect_score = v.filter(|v| v.is_finite()).unwrap_or(0.0);
            }
        }
        None => {
            info!("panel has no {} column, computing composite scores", TARGET_COLUMN);
            compute_neglect_scores(&mut rows);
        }
    }

    Ok(rows)
}

/// Convert a snapshot table into one feature map per row.
///
/// Only temporal feature columns are read; null cells are left out of the
/// map and default to 0 downstream.
pub fn snapshot_from_frame(df: &DataFrame) -> Result<Vec<SnapshotRow>> {
    let countries = string_column(df, COUNTRY_COLUMN)?;
    let mut rows: Vec<SnapshotRow> = countries
        .into_iter()
        .map(|country_iso3| SnapshotRow {
            country_iso3,
            features: HashMap::new(),
        })
        .collect();

    for feature in TemporalFeature::ALL {
        if let Some(values) = optional_f64_column(df, feature.name())? {
            for (row, v) in rows.iter_mut().zip(values) {
                if let Some(v) = v {
                    row.features.insert(feature.name().to_string(), v);
                }
            }
        }
    }
    Ok(rows)
}

fn string_column(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let column = df
        .column(name)
        .map_err(|_| ForecastError::FeatureNotFound(name.to_string()))?;
    let casted = column.cast(&DataType::String)?;
    casted
        .str()?
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            v.map(str::to_string)
                .ok_or_else(|| ForecastError::DataError(format!("null {} in row {}", name, i)))
        })
        .collect()
}

fn year_column(df: &DataFrame) -> Result<Vec<i32>> {
    let column = df
        .column(YEAR_COLUMN)
        .map_err(|_| ForecastError::FeatureNotFound(YEAR_COLUMN.to_string()))?;
    let casted = column.cast(&DataType::Int32)?;
    casted
        .i32()?
        .into_iter()
        .enumerate()
        .map(|(i, v)| v.ok_or_else(|| ForecastError::DataError(format!("null {} in row {}", YEAR_COLUMN, i))))
        .collect()
}

fn optional_f64_column(df: &DataFrame, name: &str) -> Result<Option<Vec<Option<f64>>>> {
    let Ok(column) = df.column(name) else {
        return Ok(None);
    };
    let casted = column.cast(&DataType::Float64)?;
    Ok(Some(casted.f64()?.into_iter().collect()))
}

/// Shape of a loaded panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelSummary {
    pub rows: usize,
    pub countries: usize,
    pub first_year: Option<i32>,
    pub last_year: Option<i32>,
    /// Mean composite neglect score
    pub mean_neglect: f64,
    /// Countries per anomaly severity band in the last year
    pub latest_severity: BTreeMap<SeverityBand, usize>,
}

impl PanelSummary {
    pub fn from_rows(rows: &[PanelRow]) -> Self {
        let countries: BTreeSet<&str> = rows.iter().map(|r| r.country_iso3.as_str()).collect();
        let mean_neglect = if rows.is_empty() {
            0.0
        } else {
            rows.iter().map(|r| r.neglect_score).sum::<f64>() / rows.len() as f64
        };
        let last_year = rows.iter().map(|r| r.year).max();
        let mut latest_severity = BTreeMap::new();
        for row in rows.iter().filter(|r| Some(r.year) == last_year) {
            *latest_severity.entry(row.severity()).or_insert(0) += 1;
        }
        Self {
            rows: rows.len(),
            countries: countries.len(),
            first_year: rows.iter().map(|r| r.year).min(),
            last_year,
            mean_neglect,
            latest_severity,
        }
    }
}
