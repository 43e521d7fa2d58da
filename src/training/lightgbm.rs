//! LightGBM-style gradient boosting with leaf-wise tree growth
//!
//! - Leaf-wise (best-first) growth bounded by `max_leaves` and `max_depth`
//! - Optional Gradient-based One-Side Sampling (GOSS)
//! - Bagging only when `subsample_freq > 0`, as in LightGBM
//! - Per-tree feature fraction

use super::models::Regressor;
use crate::error::{ForecastError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightGBMConfig {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_leaves: usize,
    pub max_depth: Option<usize>,
    pub min_child_samples: usize,
    pub reg_lambda: f64,
    pub reg_alpha: f64,
    pub subsample: f64,
    /// Re-draw the bagging sample every `subsample_freq` rounds; 0 disables bagging
    pub subsample_freq: usize,
    pub colsample_bytree: f64,
    /// GOSS (top_rate, other_rate); `None` disables GOSS
    pub goss: Option<(f64, f64)>,
    pub random_state: u64,
}

impl Default for LightGBMConfig {
    fn default() -> Self {
        Self {
            n_estimators: 400,
            learning_rate: 0.04,
            max_leaves: 24,
            max_depth: Some(5),
            min_child_samples: 20,
            reg_lambda: 0.1,
            reg_alpha: 0.1,
            subsample: 0.8,
            subsample_freq: 0,
            colsample_bytree: 0.8,
            goss: None,
            random_state: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum LGBNode {
    Leaf { value: f64 },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<LGBNode>,
        right: Box<LGBNode>,
    },
}

impl LGBNode {
    fn predict(&self, sample: ArrayView1<f64>) -> f64 {
        let mut node = self;
        loop {
            match node {
                LGBNode::Leaf { value } => return *value,
                LGBNode::Split { feature, threshold, left, right } => {
                    node = if sample[*feature] <= *threshold { left } else { right };
                }
            }
        }
    }

    fn n_leaves(&self) -> usize {
        match self {
            LGBNode::Leaf { .. } => 1,
            LGBNode::Split { left, right, .. } => left.n_leaves() + right.n_leaves(),
        }
    }
}

fn compute_leaf_weight(g: f64, h: f64, lambda: f64, alpha: f64) -> f64 {
    let g_adj = if g.abs() <= alpha { 0.0 } else { g - alpha * g.signum() };
    -g_adj / (h + lambda)
}

fn compute_gain_single(g: f64, h: f64, lambda: f64) -> f64 {
    g * g / (h + lambda)
}

/// Row weights applied to gradients and hessians (GOSS amplification)
struct GradStats<'a> {
    grad: &'a [f64],
    hess: &'a [f64],
}

impl GradStats<'_> {
    fn sums(&self, indices: &[usize]) -> (f64, f64) {
        indices
            .iter()
            .fold((0.0, 0.0), |(g, h), &i| (g + self.grad[i], h + self.hess[i]))
    }
}

struct CandidateSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
    left: Vec<usize>,
    right: Vec<usize>,
}

fn best_split_for_feature(
    x: &Array2<f64>,
    stats: &GradStats,
    indices: &[usize],
    feature: usize,
    config: &LightGBMConfig,
) -> Option<CandidateSplit> {
    let mut sorted: Vec<(usize, f64)> = indices.iter().map(|&i| (i, x[[i, feature]])).collect();
    sorted.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));

    let (total_g, total_h) = stats.sums(indices);
    let base_score = compute_gain_single(total_g, total_h, config.reg_lambda);

    let mut left_g = 0.0;
    let mut left_h = 0.0;
    let mut best: Option<(f64, f64, usize)> = None;

    for i in 0..sorted.len() - 1 {
        left_g += stats.grad[sorted[i].0];
        left_h += stats.hess[sorted[i].0];

        if i + 1 < config.min_child_samples || sorted.len() - i - 1 < config.min_child_samples {
            continue;
        }
        if sorted[i].1 == sorted[i + 1].1 {
            continue;
        }

        let gain = compute_gain_single(left_g, left_h, config.reg_lambda)
            + compute_gain_single(total_g - left_g, total_h - left_h, config.reg_lambda)
            - base_score;

        if best.map_or(true, |b| gain > b.0) {
            best = Some((gain, (sorted[i].1 + sorted[i + 1].1) / 2.0, i + 1));
        }
    }

    let (gain, threshold, pos) = best.filter(|b| b.0 > 0.0)?;
    Some(CandidateSplit {
        feature,
        threshold,
        gain,
        left: sorted[..pos].iter().map(|&(i, _)| i).collect(),
        right: sorted[pos..].iter().map(|&(i, _)| i).collect(),
    })
}

fn best_split(
    x: &Array2<f64>,
    stats: &GradStats,
    indices: &[usize],
    features: &[usize],
    config: &LightGBMConfig,
) -> Option<CandidateSplit> {
    if indices.len() < config.min_child_samples * 2 || indices.len() < 2 {
        return None;
    }
    features
        .par_iter()
        .filter_map(|&f| best_split_for_feature(x, stats, indices, f, config))
        .collect::<Vec<_>>()
        .into_iter()
        .fold(None, |acc: Option<CandidateSplit>, c| match acc {
            Some(a) if a.gain >= c.gain => Some(a),
            _ => Some(c),
        })
}

struct PendingSplit {
    node_id: usize,
    split: CandidateSplit,
}

impl PartialEq for PendingSplit {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for PendingSplit {}
impl PartialOrd for PendingSplit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for PendingSplit {
    // Highest gain first; earlier nodes win ties
    fn cmp(&self, other: &Self) -> Ordering {
        self.split
            .gain
            .partial_cmp(&other.split.gain)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.node_id.cmp(&self.node_id))
    }
}

enum NodeSlot {
    Leaf(Vec<usize>),
    Split { feature: usize, threshold: f64, left: usize, right: usize },
}

/// Build one tree using the leaf-wise (best-first) strategy
fn build_lgb_tree(
    x: &Array2<f64>,
    stats: &GradStats,
    indices: &[usize],
    features: &[usize],
    config: &LightGBMConfig,
) -> LGBNode {
    let max_depth = config.max_depth.unwrap_or(usize::MAX);
    let mut nodes: Vec<NodeSlot> = vec![NodeSlot::Leaf(indices.to_vec())];
    let mut depths: Vec<usize> = vec![0];
    let mut heap: BinaryHeap<PendingSplit> = BinaryHeap::new();

    if max_depth > 0 {
        if let Some(split) = best_split(x, stats, indices, features, config) {
            heap.push(PendingSplit { node_id: 0, split });
        }
    }

    let mut n_leaves = 1usize;
    while n_leaves < config.max_leaves {
        let Some(PendingSplit { node_id, split }) = heap.pop() else {
            break;
        };

        let depth = depths[node_id] + 1;
        let left_id = nodes.len();
        let right_id = left_id + 1;

        for (child_id, child) in [(left_id, &split.left), (right_id, &split.right)] {
            if depth < max_depth {
                if let Some(child_split) = best_split(x, stats, child, features, config) {
                    heap.push(PendingSplit { node_id: child_id, split: child_split });
                }
            }
        }

        nodes.push(NodeSlot::Leaf(split.left));
        nodes.push(NodeSlot::Leaf(split.right));
        depths.push(depth);
        depths.push(depth);
        nodes[node_id] = NodeSlot::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: left_id,
            right: right_id,
        };
        n_leaves += 1;
    }

    fn to_node(nodes: &[NodeSlot], idx: usize, stats: &GradStats, config: &LightGBMConfig) -> LGBNode {
        match &nodes[idx] {
            NodeSlot::Leaf(indices) => {
                let (g, h) = stats.sums(indices);
                LGBNode::Leaf {
                    value: compute_leaf_weight(g, h, config.reg_lambda, config.reg_alpha),
                }
            }
            NodeSlot::Split { feature, threshold, left, right } => LGBNode::Split {
                feature: *feature,
                threshold: *threshold,
                left: Box::new(to_node(nodes, *left, stats, config)),
                right: Box::new(to_node(nodes, *right, stats, config)),
            },
        }
    }
    to_node(&nodes, 0, stats, config)
}

/// GOSS: keep the largest |gradient| rows, sample the rest and return the
/// amplification weight for the sampled small-gradient rows
fn goss_sample(
    gradients: &[f64],
    top_rate: f64,
    other_rate: f64,
    rng: &mut Xoshiro256PlusPlus,
) -> (Vec<usize>, Vec<usize>, f64) {
    let n = gradients.len();
    let n_top = ((n as f64 * top_rate).ceil() as usize).min(n);
    let n_other = (n as f64 * other_rate).ceil() as usize;
    let mut sorted: Vec<usize> = (0..n).collect();
    sorted.sort_by(|&a, &b| {
        gradients[b]
            .abs()
            .partial_cmp(&gradients[a].abs())
            .unwrap_or(Ordering::Equal)
    });
    let top = sorted[..n_top].to_vec();
    let mut rest = sorted[n_top..].to_vec();
    rest.shuffle(rng);
    rest.truncate(n_other);
    let weight = if other_rate > 0.0 { (1.0 - top_rate) / other_rate } else { 1.0 };
    (top, rest, weight)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LightGBMRegressor {
    pub config: LightGBMConfig,
    trees: Vec<LGBNode>,
    base_prediction: f64,
    n_features: usize,
}

impl LightGBMRegressor {
    pub fn new(config: LightGBMConfig) -> Self {
        Self {
            config,
            trees: Vec::new(),
            base_prediction: 0.0,
            n_features: 0,
        }
    }

    pub fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        let n = x.nrows();
        let n_features = x.ncols();
        if n == 0 {
            return Err(ForecastError::TrainingError("Empty dataset".into()));
        }
        if n != y.len() {
            return Err(ForecastError::FeatureShapeMismatch {
                expected: format!("y length = {}", n),
                actual: format!("y length = {}", y.len()),
            });
        }

        self.n_features = n_features;
        self.trees.clear();
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.config.random_state);
        self.base_prediction = y.mean().unwrap_or(0.0);
        let mut predictions = Array1::from_elem(n, self.base_prediction);
        let mut bag: Vec<usize> = (0..n).collect();

        for round in 0..self.config.n_estimators {
            let mut gradients: Vec<f64> = predictions.iter().zip(y.iter()).map(|(&p, &yi)| p - yi).collect();
            let mut hessians: Vec<f64> = vec![1.0; n];

            let indices = match self.config.goss {
                Some((top_rate, other_rate)) => {
                    let (mut top, rest, weight) = goss_sample(&gradients, top_rate, other_rate, &mut rng);
                    for &i in &rest {
                        gradients[i] *= weight;
                        hessians[i] *= weight;
                    }
                    top.extend(rest);
                    top
                }
                None => {
                    let freq = self.config.subsample_freq;
                    if freq > 0 && self.config.subsample < 1.0 && round % freq == 0 {
                        let k = ((n as f64 * self.config.subsample).ceil() as usize).max(1);
                        bag = (0..n).collect();
                        bag.shuffle(&mut rng);
                        bag.truncate(k);
                    }
                    bag.clone()
                }
            };

            let n_selected = ((n_features as f64 * self.config.colsample_bytree).ceil() as usize).clamp(1, n_features.max(1));
            let mut features: Vec<usize> = (0..n_features).collect();
            features.shuffle(&mut rng);
            features.truncate(n_selected);
            features.sort_unstable();

            let stats = GradStats { grad: &gradients, hess: &hessians };
            let tree = build_lgb_tree(x, &stats, &indices, &features, &self.config);
            for (i, row) in x.rows().into_iter().enumerate() {
                predictions[i] += self.config.learning_rate * tree.predict(row);
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
                self.base_prediction
                    + self.config.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
            })
            .collect())
    }

    /// Largest leaf count over all trees
    pub fn max_tree_leaves(&self) -> usize {
        self.trees.iter().map(LGBNode::n_leaves).max().unwrap_or(0)
    }
}

impl Regressor for LightGBMRegressor {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        LightGBMRegressor::fit(self, x, y)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        LightGBMRegressor::predict(self, x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data(n: usize) -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((n, 3), |(i, j)| match j {
            0 => i as f64,
            1 => ((i * 7) % 5) as f64,
            _ => 1.0,
        });
        let y = Array1::from_shape_fn(n, |i| if i < n / 2 { 20.0 } else { 60.0 });
        (x, y)
    }

    #[test]
    fn test_lightgbm_regressor() {
        let (x, y) = step_data(80);
        let mut model = LightGBMRegressor::new(LightGBMConfig {
            n_estimators: 80,
            learning_rate: 0.2,
            min_child_samples: 5,
            colsample_bytree: 1.0,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();
        let preds = model.predict(&x).unwrap();
        assert!((preds[0] - 20.0).abs() < 2.0, "got {}", preds[0]);
        assert!((preds[79] - 60.0).abs() < 2.0, "got {}", preds[79]);
    }

    #[test]
    fn test_leaf_budget_respected() {
        let (x, y) = step_data(120);
        let mut model = LightGBMRegressor::new(LightGBMConfig {
            n_estimators: 5,
            max_leaves: 4,
            max_depth: None,
            min_child_samples: 2,
            ..Default::default()
        });
        model.fit(&x, &y).unwrap();
        assert!(model.max_tree_leaves() <= 4);
    }

    #[test]
    fn test_goss_and_bagging_are_deterministic() {
        let (x, y) = step_data(60);
        for config in [
            LightGBMConfig { n_estimators: 10, min_child_samples: 3, goss: Some((0.2, 0.1)), ..Default::default() },
            LightGBMConfig { n_estimators: 10, min_child_samples: 3, subsample_freq: 1, ..Default::default() },
        ] {
            let mut a = LightGBMRegressor::new(config.clone());
            let mut b = LightGBMRegressor::new(config);
            a.fit(&x, &y).unwrap();
            b.fit(&x, &y).unwrap();
            assert_eq!(a.predict(&x).unwrap(), b.predict(&x).unwrap());
        }
    }

    #[test]
    fn test_small_dataset_falls_back_to_mean() {
        // Fewer rows than 2 * min_child_samples: every tree is a single leaf
        let (x, y) = step_data(10);
        let mut model = LightGBMRegressor::new(LightGBMConfig { n_estimators: 3, ..Default::default() });
        model.fit(&x, &y).unwrap();
        assert_eq!(model.max_tree_leaves(), 1);
        let preds = model.predict(&x).unwrap();
        assert!(preds.iter().all(|p| (p - 40.0).abs() < 1e-9));
    }
}
