//! Gradient-boosted trees on the logistic loss with second-order leaf
//! weights, row subsampling and per-tree column subsampling.

use ndarray::{Array1, ArrayView1, ArrayView2, Zip};
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::tree::{self, RegressionTree, TreeParams};
use super::{check_matrix, sigmoid, Classifier, FitError};

/// Lower bound on per-sample hessians.
const MIN_HESSIAN: f64 = 1e-16;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// Fraction of rows drawn (without replacement) for each round.
    pub subsample: f64,
    /// Fraction of columns available to each tree.
    pub colsample_bytree: f64,
    /// L2 penalty on leaf weights.
    pub lambda: f64,
    pub min_child_weight: f64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 200,
            max_depth: 5,
            learning_rate: 0.1,
            subsample: 0.8,
            colsample_bytree: 0.8,
            lambda: 1.0,
            min_child_weight: 1.0,
        }
    }
}

impl BoostingParams {
    fn validate(&self) -> Result<(), FitError> {
        let fraction = |v: f64| v > 0.0 && v <= 1.0;
        if self.n_estimators == 0 {
            return Err(FitError::InvalidParams("n_estimators must be > 0".into()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(FitError::InvalidParams(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !fraction(self.subsample) || !fraction(self.colsample_bytree) {
            return Err(FitError::InvalidParams(
                "subsample and colsample_bytree must lie in (0, 1]".into(),
            ));
        }
        if !(self.lambda >= 0.0) || !(self.min_child_weight >= 0.0) {
            return Err(FitError::InvalidParams(
                "lambda and min_child_weight must be non-negative".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedTreesModel {
    /// Log-odds of the training prevalence.
    base_margin: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl BoostedTreesModel {
    /// Fit `n_estimators` rounds.
    ///
    /// # Errors
    /// `InvalidParams` for out-of-range hyperparameters, `NonFinite` if the
    /// margins diverge.
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, u8>,
        params: &BoostingParams,
        seed: u64,
    ) -> Result<Self, FitError> {
        let d = check_matrix(x, y)?;
        params.validate()?;

        let n = x.nrows();
        let positives = y.iter().filter(|&&l| l == 1).count() as f64;
        let prior = (positives / n as f64).clamp(1e-6, 1.0 - 1e-6);
        let base_margin = (prior / (1.0 - prior)).ln();

        let n_rows = ((params.subsample * n as f64).round() as usize).clamp(1, n);
        let n_cols = ((params.colsample_bytree * d as f64).round() as usize).clamp(1, d);
        let tree_params = TreeParams {
            max_depth: Some(params.max_depth),
            min_child_weight: params.min_child_weight,
            lambda: params.lambda,
            max_features: None,
        };

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut margins = Array1::from_elem(n, base_margin);
        let mut grad = Array1::<f64>::zeros(n);
        let mut hess = Array1::<f64>::zeros(n);
        let mut trees = Vec::with_capacity(params.n_estimators);

        for round in 0..params.n_estimators {
            Zip::from(&mut grad)
                .and(&mut hess)
                .and(&margins)
                .and(y)
                .for_each(|g, h, &margin, &label| {
                    let p = sigmoid(margin);
                    *g = p - f64::from(label);
                    *h = (p * (1.0 - p)).max(MIN_HESSIAN);
                });

            let rows = index::sample(&mut rng, n, n_rows).into_vec();
            let mut cols = index::sample(&mut rng, d, n_cols).into_vec();
            cols.sort_unstable();

            let tree = tree::grow(x, grad.view(), hess.view(), rows, &cols, tree_params, &mut rng);
            Zip::from(&mut margins)
                .and(x.rows())
                .for_each(|margin, row| *margin += params.learning_rate * tree.predict(row));
            if margins.iter().any(|m| !m.is_finite()) {
                return Err(FitError::NonFinite(format!("margins diverged at round {round}")));
            }
            trees.push(tree);
        }

        tracing::debug!(
            "Fitted {} boosting rounds (base margin {:.4})",
            trees.len(),
            base_margin
        );

        Ok(Self {
            base_margin,
            learning_rate: params.learning_rate,
            trees,
            n_features: d,
        })
    }

    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn margin(&self, features: ArrayView1<'_, f64>) -> f64 {
        self.base_margin
            + self.learning_rate * self.trees.iter().map(|t| t.predict(features)).sum::<f64>()
    }
}

impl Classifier for BoostedTreesModel {
    fn predict_proba(&self, features: ArrayView1<'_, f64>) -> f64 {
        sigmoid(self.margin(features))
    }

    fn n_features(&self) -> usize {
        self.n_features
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{array, Array2};

    use super::*;

    fn or_shaped() -> (Array2<f64>, Array1<u8>) {
        let x = Array2::from_shape_fn((80, 3), |(i, j)| match j {
            0 => (i % 9) as f64 / 4.0 - 1.0,
            1 => ((i * 7) % 11) as f64 / 5.0 - 1.0,
            _ => 0.0,
        });
        let y = x
            .outer_iter()
            .map(|row| u8::from(row[0] > 0.2 || row[1] > 0.5))
            .collect();
        (x, y)
    }

    fn small() -> BoostingParams {
        BoostingParams {
            n_estimators: 60,
            max_depth: 3,
            learning_rate: 0.3,
            ..BoostingParams::default()
        }
    }

    #[test]
    fn test_boosting_fits_training_data() {
        let (x, y) = or_shaped();
        let model = BoostedTreesModel::fit(x.view(), y.view(), &small(), 42).expect("fit");
        assert_eq!(model.n_trees(), 60);

        let correct = model
            .predict_batch(x.view())
            .iter()
            .zip(&y)
            .filter(|&(&p, &label)| u8::from(p >= 0.5) == label)
            .count();
        assert!(correct as f64 / y.len() as f64 > 0.9, "train accuracy {correct}/80");
    }

    #[test]
    fn test_base_margin_is_prior_log_odds() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![1u8, 0, 0, 0];
        let params = BoostingParams {
            n_estimators: 1,
            ..BoostingParams::default()
        };
        let model = BoostedTreesModel::fit(x.view(), y.view(), &params, 1).expect("fit");
        assert!((model.base_margin - (0.25_f64 / 0.75).ln()).abs() < 1e-12);
    }

    #[test]
    fn test_boosting_is_reproducible() {
        let (x, y) = or_shaped();
        let a = BoostedTreesModel::fit(x.view(), y.view(), &small(), 5).expect("fit");
        let b = BoostedTreesModel::fit(x.view(), y.view(), &small(), 5).expect("fit");
        assert_eq!(a, b);
        assert!(a.trees.iter().all(|t| t.max_feature().map_or(true, |f| f < 3)));
    }

    #[test]
    fn test_rejects_bad_subsample() {
        let (x, y) = or_shaped();
        let params = BoostingParams {
            subsample: 0.0,
            ..BoostingParams::default()
        };
        assert!(matches!(
            BoostedTreesModel::fit(x.view(), y.view(), &params, 1),
            Err(FitError::InvalidParams(_))
        ));
    }
}
