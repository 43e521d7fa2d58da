//! Cross-validation splitters and scoring

use super::models::{r2_score, Regressor};
use crate::error::{ForecastError, Result};
use ndarray::{Array1, Array2, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cross-validation strategy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CVStrategy {
    /// K-Fold cross-validation
    KFold { n_splits: usize, shuffle: bool },
    /// Expanding-window split over rows ordered by their time key
    TimeSeriesSplit { n_splits: usize },
    /// Group K-Fold (a country never appears in both train and test)
    GroupKFold { n_splits: usize },
}

impl Default for CVStrategy {
    fn default() -> Self {
        CVStrategy::TimeSeriesSplit { n_splits: 5 }
    }
}

impl CVStrategy {
    pub fn n_splits(&self) -> usize {
        match self {
            CVStrategy::KFold { n_splits, .. }
            | CVStrategy::TimeSeriesSplit { n_splits }
            | CVStrategy::GroupKFold { n_splits } => *n_splits,
        }
    }

    /// Same strategy with a different fold count
    pub fn with_n_splits(self, n: usize) -> Self {
        match self {
            CVStrategy::KFold { shuffle, .. } => CVStrategy::KFold { n_splits: n, shuffle },
            CVStrategy::TimeSeriesSplit { .. } => CVStrategy::TimeSeriesSplit { n_splits: n },
            CVStrategy::GroupKFold { .. } => CVStrategy::GroupKFold { n_splits: n },
        }
    }
}

/// A single train/test split
#[derive(Debug, Clone)]
pub struct CVSplit {
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
    pub fold_idx: usize,
}

/// Row labels a splitter may need
#[derive(Debug, Clone, Copy, Default)]
pub struct SplitKeys<'a> {
    /// Group label per row (country code)
    pub groups: Option<&'a [String]>,
    /// Time key per row (base year)
    pub time: Option<&'a [i32]>,
}

/// Mean and standard deviation of fold scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CvScore {
    pub mean: f64,
    pub std: f64,
}

impl CvScore {
    /// Population statistics of fold scores
    pub fn from_scores(scores: &[f64]) -> Self {
        if scores.is_empty() {
            return Self { mean: 0.0, std: 0.0 };
        }
        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        Self { mean, std: variance.sqrt() }
    }
}

/// Cross-validation splitter
pub struct CrossValidator {
    strategy: CVStrategy,
    random_state: u64,
}

impl CrossValidator {
    /// Create a new cross-validator
    pub fn new(strategy: CVStrategy) -> Self {
        Self {
            strategy,
            random_state: 42,
        }
    }

    /// Set random state for reproducibility
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn strategy(&self) -> CVStrategy {
        self.strategy
    }

    /// Generate train/test splits
    ///
    /// Time-series splits fall back to row order when no time keys are
    /// given; group splits fall back to shuffled K-Fold without groups.
    pub fn split(&self, n_samples: usize, keys: SplitKeys<'_>) -> Result<Vec<CVSplit>> {
        match self.strategy {
            CVStrategy::KFold { n_splits, shuffle } => self.k_fold_split(n_samples, n_splits, shuffle),
            CVStrategy::TimeSeriesSplit { n_splits } => {
                let order = match keys.time {
                    Some(time) => {
                        check_len("time keys", time.len(), n_samples)?;
                        let mut order: Vec<usize> = (0..n_samples).collect();
                        order.sort_by_key(|&i| time[i]);
                        order
                    }
                    None => (0..n_samples).collect(),
                };
                self.time_series_split(&order, n_splits)
            }
            CVStrategy::GroupKFold { n_splits } => match keys.groups {
                Some(groups) => {
                    check_len("groups", groups.len(), n_samples)?;
                    self.group_k_fold_split(groups, n_splits)
                }
                None => self.k_fold_split(n_samples, n_splits, true),
            },
        }
    }

    fn k_fold_split(&self, n_samples: usize, n_splits: usize, shuffle: bool) -> Result<Vec<CVSplit>> {
        if n_splits < 2 {
            return Err(ForecastError::ValidationError("n_splits must be at least 2".to_string()));
        }
        if n_samples < n_splits {
            return Err(ForecastError::ValidationError(format!(
                "n_samples ({}) must be >= n_splits ({})",
                n_samples, n_splits
            )));
        }

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if shuffle {
            let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
            indices.shuffle(&mut rng);
        }

        let base = n_samples / n_splits;
        let remainder = n_samples % n_splits;
        let mut splits = Vec::with_capacity(n_splits);
        let mut current = 0;

        for fold_idx in 0..n_splits {
            let fold_size = if fold_idx < remainder { base + 1 } else { base };
            let test_indices = indices[current..current + fold_size].to_vec();
            let train_indices = indices[..current]
                .iter()
                .chain(indices[current + fold_size..].iter())
                .copied()
                .collect();

            splits.push(CVSplit { train_indices, test_indices, fold_idx });
            current += fold_size;
        }

        Ok(splits)
    }

    /// Expanding window: `n_splits` equal test blocks at the end, the first
    /// training block absorbs the remainder
    fn time_series_split(&self, order: &[usize], n_splits: usize) -> Result<Vec<CVSplit>> {
        let n_samples = order.len();
        if n_splits < 2 {
            return Err(ForecastError::ValidationError("n_splits must be at least 2".to_string()));
        }
        if n_samples < n_splits + 1 {
            return Err(ForecastError::ValidationError(format!(
                "n_samples ({}) must be > n_splits ({}) for a time series split",
                n_samples, n_splits
            )));
        }

        let test_size = n_samples / (n_splits + 1);
        let first_test = n_samples - n_splits * test_size;

        Ok((0..n_splits)
            .map(|fold_idx| {
                let test_start = first_test + fold_idx * test_size;
                CVSplit {
                    train_indices: order[..test_start].to_vec(),
                    test_indices: order[test_start..test_start + test_size].to_vec(),
                    fold_idx,
                }
            })
            .collect())
    }

    /// Largest groups first, each into the currently lightest fold
    fn group_k_fold_split(&self, groups: &[String], n_splits: usize) -> Result<Vec<CVSplit>> {
        let mut sizes: HashMap<&str, usize> = HashMap::new();
        for g in groups {
            *sizes.entry(g.as_str()).or_insert(0) += 1;
        }
        let n_splits = n_splits.min(sizes.len());
        if n_splits < 2 {
            return Err(ForecastError::ValidationError(format!(
                "GroupKFold needs at least 2 groups, got {}",
                sizes.len()
            )));
        }

        let mut by_size: Vec<(&str, usize)> = sizes.into_iter().collect();
        by_size.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

        let mut fold_load = vec![0usize; n_splits];
        let mut group_to_fold: HashMap<&str, usize> = HashMap::new();
        for (group, size) in by_size {
            let lightest = (0..n_splits).min_by_key(|&f| (fold_load[f], f)).unwrap_or(0);
            fold_load[lightest] += size;
            group_to_fold.insert(group, lightest);
        }

        Ok((0..n_splits)
            .map(|fold_idx| {
                let (test_indices, train_indices): (Vec<usize>, Vec<usize>) =
                    (0..groups.len()).partition(|&i| group_to_fold.get(groups[i].as_str()) == Some(&fold_idx));
                CVSplit { train_indices, test_indices, fold_idx }
            })
            .collect())
    }

    /// R² of a freshly built model on every fold
    pub fn cross_val_score<M, F>(
        &self,
        make_model: F,
        x: &Array2<f64>,
        y: &Array1<f64>,
        keys: SplitKeys<'_>,
    ) -> Result<Vec<f64>>
    where
        M: Regressor,
        F: Fn() -> M,
    {
        let splits = self.split(x.nrows(), keys)?;
        splits
            .iter()
            .map(|split| {
                let x_train = x.select(Axis(0), &split.train_indices);
                let y_train = y.select(Axis(0), &split.train_indices);
                let x_test = x.select(Axis(0), &split.test_indices);
                let y_test = y.select(Axis(0), &split.test_indices);

                let mut model = make_model();
                model.fit(&x_train, &y_train)?;
                let pred = model.predict(&x_test)?;
                Ok(r2_score(&y_test, &pred))
            })
            .collect()
    }
}

fn check_len(what: &str, len: usize, n_samples: usize) -> Result<()> {
    if len != n_samples {
        return Err(ForecastError::FeatureShapeMismatch {
            expected: format!("{} {}", n_samples, what),
            actual: format!("{} {}", len, what),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::decision_tree::DecisionTree;

    #[test]
    fn test_k_fold() {
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 5, shuffle: false });
        let splits = cv.split(100, SplitKeys::default()).unwrap();

        assert_eq!(splits.len(), 5);
        for split in &splits {
            assert_eq!(split.test_indices.len(), 20);
            assert_eq!(split.train_indices.len(), 80);
        }

        let mut all_test: Vec<usize> = splits.iter().flat_map(|s| s.test_indices.clone()).collect();
        all_test.sort();
        assert_eq!(all_test, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_time_series_split_block_sizes() {
        let cv = CrossValidator::new(CVStrategy::TimeSeriesSplit { n_splits: 3 });
        let splits = cv.split(10, SplitKeys::default()).unwrap();

        // test_size = 10 / 4 = 2, first training block 4
        let train: Vec<usize> = splits.iter().map(|s| s.train_indices.len()).collect();
        let test: Vec<Vec<usize>> = splits.iter().map(|s| s.test_indices.clone()).collect();
        assert_eq!(train, vec![4, 6, 8]);
        assert_eq!(test, vec![vec![4, 5], vec![6, 7], vec![8, 9]]);
    }

    #[test]
    fn test_time_series_split_orders_by_time_key() {
        let years = vec![2021, 2018, 2020, 2019];
        let cv = CrossValidator::new(CVStrategy::TimeSeriesSplit { n_splits: 3 });
        let splits = cv.split(4, SplitKeys { groups: None, time: Some(&years) }).unwrap();

        assert_eq!(splits[0].train_indices, vec![1]);
        assert_eq!(splits[0].test_indices, vec![3]);
        assert_eq!(splits[2].train_indices, vec![1, 3, 2]);
        assert_eq!(splits[2].test_indices, vec![0]);
    }

    #[test]
    fn test_time_series_split_too_few_samples() {
        let cv = CrossValidator::new(CVStrategy::TimeSeriesSplit { n_splits: 5 });
        assert!(cv.split(5, SplitKeys::default()).is_err());
    }

    #[test]
    fn test_group_k_fold_keeps_groups_together() {
        let groups: Vec<String> = ["AFG", "AFG", "AFG", "SOM", "SOM", "YEM", "HTI"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let cv = CrossValidator::new(CVStrategy::GroupKFold { n_splits: 3 });
        let splits = cv.split(7, SplitKeys { groups: Some(&groups), time: None }).unwrap();
        assert_eq!(splits.len(), 3);

        for split in &splits {
            for &t in &split.test_indices {
                assert!(split.train_indices.iter().all(|&r| groups[r] != groups[t]));
            }
        }
        // Largest group alone in the first fold
        assert_eq!(splits[0].test_indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_group_k_fold_caps_folds_at_group_count() {
        let groups: Vec<String> = vec!["A".into(), "B".into(), "A".into()];
        let cv = CrossValidator::new(CVStrategy::GroupKFold { n_splits: 5 });
        let splits = cv.split(3, SplitKeys { groups: Some(&groups), time: None }).unwrap();
        assert_eq!(splits.len(), 2);
    }

    #[test]
    fn test_cross_val_score() {
        let x = Array2::from_shape_fn((30, 1), |(i, _)| i as f64);
        let y = Array1::from_shape_fn(30, |i| (i / 10) as f64);
        let cv = CrossValidator::new(CVStrategy::KFold { n_splits: 3, shuffle: true });
        let scores = cv
            .cross_val_score(|| DecisionTree::new_regressor().with_max_depth(3), &x, &y, SplitKeys::default())
            .unwrap();
        assert_eq!(scores.len(), 3);
        assert!(CvScore::from_scores(&scores).mean > 0.8);
    }

    #[test]
    fn test_cv_score_stats() {
        let s = CvScore::from_scores(&[0.5, 0.7]);
        assert!((s.mean - 0.6).abs() < 1e-12);
        assert!((s.std - 0.1).abs() < 1e-12);
    }
}
