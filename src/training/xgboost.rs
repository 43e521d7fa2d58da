//! XGBoost-style gradient boosting with second-order approximation
//!
//! - Leaf weights w* = -T_α(G) / (H + λ), with T_α the L1 soft threshold
//! - Split gain 0.5 * [T(GL)²/(HL+λ) + T(GR)²/(HR+λ) - T(G)²/(H+λ)] - γ
//! - Depth-wise growth with exact greedy split search
//! - Minimum child weight constraint

use super::gradient_boosting::sample_fraction;
use super::models::Regressor;
use crate::error::{ForecastError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// XGBoost configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct XGBoostConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_child_weight: f64,
    /// L2 regularization on leaf weights
    pub reg_lambda: f64,
    /// L1 regularization on leaf weights
    pub reg_alpha: f64,
    /// Minimum loss reduction to make a split (gamma)
    pub gamma: f64,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub random_state: u64,
}

impl Default for XGBoostConfig {
    fn default() -> Self {
        Self {
            n_estimators: 400,
            learning_rate: 0.04,
            max_depth: 5,
            min_child_weight: 1.0,
            reg_lambda: 0.1,
            reg_alpha: 0.1,
            gamma: 0.0,
            subsample: 0.8,
            colsample_bytree: 0.8,
            random_state: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum XGBNode {
    Leaf { weight: f64 },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<XGBNode>,
        right: Box<XGBNode>,
    },
}

impl XGBNode {
    fn predict(&self, sample: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                XGBNode::Leaf { weight } => return *weight,
                XGBNode::Split { feature, threshold, left, right } => {
                    node = if sample[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    fn count_splits(&self, counts: &mut [f64]) {
        if let XGBNode::Split { feature, left, right, .. } = self {
            counts[*feature] += 1.0;
            left.count_splits(counts);
            right.count_splits(counts);
        }
    }
}

/// L1 soft threshold of a gradient sum
fn soft_threshold(g: f64, alpha: f64) -> f64 {
    if g > alpha {
        g - alpha
    } else if g < -alpha {
        g + alpha
    } else {
        0.0
    }
}

/// Optimal leaf weight with L1 (alpha) and L2 (lambda) regularization
fn compute_leaf_weight(g_sum: f64, h_sum: f64, lambda: f64, alpha: f64) -> f64 {
    -soft_threshold(g_sum, alpha) / (h_sum + lambda)
}

fn leaf_score(g: f64, h: f64, config: &XGBoostConfig) -> f64 {
    let t = soft_threshold(g, config.reg_alpha);
    t * t / (h + config.reg_lambda)
}

struct TreeBuilder<'a> {
    x: &'a Array2<f64>,
    grad: &'a Array1<f64>,
    hess: &'a Array1<f64>,
    features: &'a [usize],
    config: &'a XGBoostConfig,
}

impl TreeBuilder<'_> {
    fn build(&self, indices: &[usize], depth: usize) -> XGBNode {
        let g_sum: f64 = indices.iter().map(|&i| self.grad[i]).sum();
        let h_sum: f64 = indices.iter().map(|&i| self.hess[i]).sum();
        let leaf = XGBNode::Leaf {
            weight: compute_leaf_weight(g_sum, h_sum, self.config.reg_lambda, self.config.reg_alpha),
        };

        if depth >= self.config.max_depth || indices.len() < 2 || h_sum < self.config.min_child_weight {
            return leaf;
        }

        let best = self
            .features
            .par_iter()
            .filter_map(|&f| self.best_split_for_feature(indices, f, g_sum, h_sum))
            .collect::<Vec<_>>()
            .into_iter()
            .fold(None, |acc: Option<(usize, f64, f64)>, c| match acc {
                Some(a) if a.2 >= c.2 => Some(a),
                _ => Some(c),
            });

        match best {
            Some((feature, threshold, gain)) if gain > self.config.gamma => {
                let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
                    indices.iter().partition(|&&i| self.x[[i, feature]] <= threshold);
                if left_idx.is_empty() || right_idx.is_empty() {
                    return leaf;
                }
                XGBNode::Split {
                    feature,
                    threshold,
                    left: Box::new(self.build(&left_idx, depth + 1)),
                    right: Box::new(self.build(&right_idx, depth + 1)),
                }
            }
            _ => leaf,
        }
    }

    /// Exact greedy search over one feature; returns (feature, threshold, gain)
    fn best_split_for_feature(
        &self,
        indices: &[usize],
        feature: usize,
        g_total: f64,
        h_total: f64,
    ) -> Option<(usize, f64, f64)> {
        let mut sorted: Vec<usize> = indices.to_vec();
        sorted.sort_by(|&a, &b| {
            self.x[[a, feature]]
                .partial_cmp(&self.x[[b, feature]])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let parent = leaf_score(g_total, h_total, self.config);
        let mut g_left = 0.0;
        let mut h_left = 0.0;
        let mut best: Option<(usize, f64, f64)> = None;

        for pos in 0..sorted.len() - 1 {
            let idx = sorted[pos];
            let next = sorted[pos + 1];
            g_left += self.grad[idx];
            h_left += self.hess[idx];

            let v = self.x[[idx, feature]];
            let v_next = self.x[[next, feature]];
            if v_next - v < 1e-12 {
                continue;
            }

            let h_right = h_total - h_left;
            if h_left < self.config.min_child_weight || h_right < self.config.min_child_weight {
                continue;
            }

            let gain = 0.5
                * (leaf_score(g_left, h_left, self.config) + leaf_score(g_total - g_left, h_right, self.config)
                    - parent);
            if best.map_or(true, |b| gain > b.2) {
                best = Some((feature, (v + v_next) / 2.0, gain));
            }
        }
        best
    }
}

/// XGBoost Regressor (squared error loss)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XGBoostRegressor {
    config: XGBoostConfig,
    trees: Vec<XGBNode>,
    base_score: f64,
    n_features: usize,
}

impl XGBoostRegressor {
    pub fn new(config: XGBoostConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            base_score: 0.0,
            n_features: 0,
        }
    }

    pub fn config(&self) -> &XGBoostConfig {
        &self.config
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        if n_samples != y.len() {
            return Err(ForecastError::FeatureShapeMismatch {
                expected: format!("y length = {}", n_samples),
                actual: format!("y length = {}", y.len()),
            });
        }
        if n_samples == 0 {
            return Err(ForecastError::TrainingError("XGBoost needs at least one sample".into()));
        }
        self.n_features = n_features;

        self.base_score = y.mean().unwrap_or(0.0);
        let mut preds = Array1::from_elem(n_samples, self.base_score);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);
        // Squared error: hess is constant
        let hess = Array1::from_elem(n_samples, 1.0);

        self.trees.clear();
        for _ in 0..self.config.n_estimators {
            let grad: Array1<f64> = &preds - y;

            let row_indices = sample_fraction(n_samples, self.config.subsample, &mut rng);
            let col_indices = sample_fraction(n_features, self.config.colsample_bytree, &mut rng);

            let builder = TreeBuilder {
                x,
                grad: &grad,
                hess: &hess,
                features: &col_indices,
                config: &self.config,
            };
            let tree = builder.build(&row_indices, 0);

            for (i, row) in x.rows().into_iter().enumerate() {
                preds[i] += self.config.learning_rate * tree.predict(row);
            }
            self.trees.push(tree);
        }

        Ok(())
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if self.trees.is_empty() {
            return Err(ForecastError::ModelNotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(ForecastError::FeatureShapeMismatch {
                expected: format!("{} features", self.n_features),
                actual: format!("{} features", x.ncols()),
            });
        }
        Ok(x.rows()
            .into_iter()
            .map(|row| {
                self.base_score
                    + self.config.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
            })
            .collect())
    }

    /// Split-count feature importances
    pub fn feature_importances(&self) -> Option<Array1<f64>> {
        if self.n_features == 0 {
            return None;
        }
        let mut counts = vec![0.0f64; self.n_features];
        for tree in &self.trees {
            tree.count_splits(&mut counts);
        }
        let total: f64 = counts.iter().sum();
        if total > 0.0 {
            counts.iter_mut().for_each(|c| *c /= total);
        }
        Some(Array1::from_vec(counts))
    }
}

impl Regressor for XGBoostRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        XGBoostRegressor::fit(self, x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        XGBoostRegressor::predict(self, x)
    }

    fn feature_importances(&self) -> Option<Array1<f64>> {
        XGBoostRegressor::feature_importances(self)
    }
}
