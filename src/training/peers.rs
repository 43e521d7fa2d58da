//! Peer countries
//!
//! Nearest neighbours by cosine distance over standard-scaled same-year
//! features.

use crate::error::{ForecastError, Result};
use crate::feature_engineering::{PanelRow, TemporalFeature, BASE_FEATURE_COLS};
use crate::preprocessing::{Scaler, ScalerType};
use ndarray::{Array2, ArrayView1};
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

/// Neighbourhood size, the country itself included
pub const DEFAULT_PEER_K: usize = 6;

/// Finds the most similar countries of a single-year cross-section
#[derive(Debug, Clone, Copy)]
pub struct PeerFinder {
    k: usize,
}

impl Default for PeerFinder {
    fn default() -> Self {
        Self { k: DEFAULT_PEER_K }
    }
}

impl PeerFinder {
    /// `k` neighbours per country counting the country itself, so up to
    /// `k - 1` peers are returned
    pub fn new(k: usize) -> Result<Self> {
        if k < 2 {
            return Err(ForecastError::InvalidParameter {
                name: "peer_k".into(),
                value: k.to_string(),
                reason: "must be at least 2".into(),
            });
        }
        Ok(Self { k })
    }

    pub fn k(&self) -> usize {
        self.k
    }

    /// Peer codes per country, closest first.
    ///
    /// Features are standard-scaled first so cosine distance is not dominated
    /// by large columns. A later row for the same country replaces an
    /// earlier one.
    pub fn find(&self, rows: &[PanelRow]) -> Result<BTreeMap<String, Vec<String>>> {
        if rows.len() < 2 {
            return Ok(rows.iter().map(|r| (r.country_iso3.clone(), Vec::new())).collect());
        }

        let x = base_feature_matrix(rows);
        let mut scaler = Scaler::new(ScalerType::Standard);
        let scaled = scaler.fit_transform(&x, &BASE_FEATURE_COLS)?;

        let neighbours = self.nearest(&scaled);
        debug!(countries = rows.len(), k = self.k, "Computed peer neighbourhoods");

        Ok(rows
            .iter()
            .zip(neighbours)
            .map(|(row, idx)| {
                let peers = idx.into_iter().map(|j| rows[j].country_iso3.clone()).collect();
                (row.country_iso3.clone(), peers)
            })
            .collect())
    }

    /// Row indices of the `k - 1` nearest other rows of every row.
    /// Ties break toward the lower index.
    pub fn nearest(&self, x: &Array2<f64>) -> Vec<Vec<usize>> {
        let n = x.nrows();
        let take = (self.k - 1).min(n.saturating_sub(1));
        (0..n)
            .into_par_iter()
            .map(|i| {
                let row = x.row(i);
                let mut dists: Vec<(f64, usize)> = (0..n)
                    .filter(|&j| j != i)
                    .map(|j| (cosine_distance(row, x.row(j)), j))
                    .collect();
                dists.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
                dists.into_iter().take(take).map(|(_, j)| j).collect()
            })
            .collect()
    }
}

/// Stack the 13 same-year columns of each row; non-finite cells become 0
pub fn base_feature_matrix(rows: &[PanelRow]) -> Array2<f64> {
    let features = &TemporalFeature::ALL[..BASE_FEATURE_COLS.len()];
    Array2::from_shape_fn((rows.len(), features.len()), |(i, j)| {
        let v = rows[i].base_value(features[j]).unwrap_or(0.0);
        if v.is_finite() {
            v
        } else {
            0.0
        }
    })
}

/// `1 - cos(a, b)`; a zero vector is at distance 1 from everything
fn cosine_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (ai, bi) in a.iter().zip(b.iter()) {
        dot += ai * bi;
        norm_a += ai * ai;
        norm_b += bi * bi;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom > 0.0 {
        1.0 - dot / denom
    } else {
        1.0
    }
}
