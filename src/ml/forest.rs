//! Random forest: bagged CART trees with per-split feature subsampling.
//!
//! Trees are fitted in parallel with `rayon`; each tree draws from its own RNG
//! derived from the forest seed, so the result does not depend on scheduling.

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::tree::{self, RegressionTree, TreeParams};
use super::{check_matrix, Classifier, FitError};

/// Features considered at each split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MaxFeatures {
    /// `max(1, floor(sqrt(d)))`
    Sqrt,
    All,
    Count(usize),
}

impl MaxFeatures {
    fn resolve(self, d: usize) -> usize {
        match self {
            Self::Sqrt => ((d as f64).sqrt().floor() as usize).max(1),
            Self::All => d,
            Self::Count(k) => k.clamp(1, d),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            max_depth: None,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestModel {
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl RandomForestModel {
    /// Fit the forest.
    ///
    /// # Errors
    /// `InvalidParams` for zero trees or a zero leaf size; matrix errors from
    /// input validation.
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, u8>,
        params: &ForestParams,
        seed: u64,
    ) -> Result<Self, FitError> {
        let d = check_matrix(x, y)?;
        if params.n_estimators == 0 {
            return Err(FitError::InvalidParams("n_estimators must be > 0".into()));
        }
        if params.min_samples_leaf == 0 {
            return Err(FitError::InvalidParams("min_samples_leaf must be > 0".into()));
        }

        let n = x.nrows();
        let grad = y.mapv(|label| -f64::from(label));
        let hess = Array1::<f64>::ones(n);
        let features: Vec<usize> = (0..d).collect();
        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_child_weight: params.min_samples_leaf as f64,
            lambda: 0.0,
            max_features: Some(params.max_features.resolve(d)),
        };

        let trees: Vec<RegressionTree> = (0..params.n_estimators)
            .into_par_iter()
            .map(|t| {
                let mut rng = ChaCha8Rng::seed_from_u64(tree_seed(seed, t));
                let samples: Vec<usize> = if params.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                tree::grow(x, grad.view(), hess.view(), samples, &features, tree_params, &mut rng)
            })
            .collect();

        let leaves: usize = trees.iter().map(RegressionTree::n_leaves).sum();
        tracing::debug!(
            "Fitted random forest: {} trees, {:.1} leaves/tree",
            trees.len(),
            leaves as f64 / trees.len() as f64
        );

        Ok(Self {
            trees,
            n_features: d,
        })
    }

    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

fn tree_seed(seed: u64, tree: usize) -> u64 {
    seed ^ (tree as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

impl Classifier for RandomForestModel {
    /// Mean of the per-tree positive fractions.
    fn predict_proba(&self, features: ArrayView1<'_, f64>) -> f64 {
        let total: f64 = self.trees.iter().map(|t| t.predict(features)).sum();
        (total / self.trees.len() as f64).clamp(0.0, 1.0)
    }

    fn n_features(&self) -> usize {
        self.n_features
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{array, Array2};

    use super::*;

    fn blobs() -> (Array2<f64>, Array1<u8>) {
        let mut x = Array2::zeros((60, 3));
        let mut y = Array1::zeros(60);
        for (i, mut row) in x.outer_iter_mut().enumerate() {
            let jitter = (i % 7) as f64 * 0.1;
            if i % 2 == 0 {
                row.assign(&array![-1.0 - jitter, 0.5 + jitter, jitter]);
            } else {
                row.assign(&array![1.0 + jitter, -0.5 - jitter, jitter]);
                y[i] = 1;
            }
        }
        (x, y)
    }

    fn small() -> ForestParams {
        ForestParams {
            n_estimators: 25,
            ..ForestParams::default()
        }
    }

    #[test]
    fn test_max_features_resolution() {
        assert_eq!(MaxFeatures::Sqrt.resolve(16), 4);
        assert_eq!(MaxFeatures::Sqrt.resolve(2), 1);
        assert_eq!(MaxFeatures::All.resolve(5), 5);
        assert_eq!(MaxFeatures::Count(9).resolve(5), 5);
    }

    #[test]
    fn test_forest_separates_blobs() {
        let (x, y) = blobs();
        let model = RandomForestModel::fit(x.view(), y.view(), &small(), 42).expect("fit");
        assert_eq!(model.n_trees(), 25);
        assert_eq!(model.n_features(), 3);
        assert!(model.predict_proba(array![1.2, -0.6, 0.1].view()) > 0.9);
        assert!(model.predict_proba(array![-1.2, 0.6, 0.1].view()) < 0.1);
    }

    #[test]
    fn test_forest_is_reproducible() {
        let (x, y) = blobs();
        let a = RandomForestModel::fit(x.view(), y.view(), &small(), 7).expect("fit");
        let b = RandomForestModel::fit(x.view(), y.view(), &small(), 7).expect("fit");
        assert_eq!(a, b);
    }

    #[test]
    fn test_rejects_empty_forest() {
        let (x, y) = blobs();
        let params = ForestParams {
            n_estimators: 0,
            ..ForestParams::default()
        };
        assert!(matches!(
            RandomForestModel::fit(x.view(), y.view(), &params, 1),
            Err(FitError::InvalidParams(_))
        ));
    }
}
