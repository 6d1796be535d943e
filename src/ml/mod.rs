//! Model layer: feature encoding, candidate classifiers, selection and the
//! persisted scoring artifact.
//!
//! - `imputer`: fill values for empty training cells
//! - `encoder`: standardization + age band one-hot
//! - `split`: seeded stratified train/held-out split
//! - `metrics`: ROC AUC and the held-out evaluation report
//! - `logistic`, `forest`, `boosting`: candidate classifier families
//! - `trainer`: fits the roster and selects the winner by held-out AUC
//! - `artifact`: the {encoder, classifier} bundle and its file format
//! - `synthetic`: seeded synthetic cohorts for demos and tests
//!
//! Encoded rows travel as `ndarray` matrices (one row per record) and labels
//! as `Array1<u8>`.

pub mod artifact;
pub mod boosting;
pub mod encoder;
pub mod forest;
pub mod imputer;
pub mod logistic;
pub mod metrics;
pub mod split;
pub mod synthetic;
pub mod trainer;
mod tree;

use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

pub use artifact::{ArtifactLoadError, ArtifactSaveError, ScoringArtifact, TrainingMetadata};
pub use boosting::{BoostedTreesModel, BoostingParams};
pub use encoder::FeatureEncoder;
pub use forest::{ForestParams, MaxFeatures, RandomForestModel};
pub use imputer::ColumnImputer;
pub use logistic::{LogisticModel, LogisticParams};
pub use metrics::{roc_auc, ConfusionMatrix, EvaluationReport};
pub use trainer::{
    default_roster, Candidate, CandidateSpec, LeaderboardEntry, ModelTrainer, TrainerConfig,
    TrainingError, TrainingOutcome,
};

/// Numerical failures while fitting a classifier.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FitError {
    #[error("Training matrix is empty")]
    Empty,

    #[error("Got {rows} rows but {labels} labels")]
    LabelCount { rows: usize, labels: usize },

    #[error("Non-finite value during fitting: {0}")]
    NonFinite(String),

    #[error("Singular system: {0}")]
    Singular(String),

    #[error("Invalid hyperparameter: {0}")]
    InvalidParams(String),
}

/// A fitted binary classifier producing positive-class probabilities.
pub trait Classifier: Send + Sync {
    /// Probability of the positive class for one encoded feature vector.
    fn predict_proba(&self, features: ArrayView1<'_, f64>) -> f64;

    /// Width of the feature vectors the model was fitted on.
    fn n_features(&self) -> usize;

    /// Probabilities for every row of `x`.
    fn predict_batch(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        x.outer_iter().map(|row| self.predict_proba(row)).collect()
    }
}

/// Any fitted candidate, in serializable form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FittedModel {
    Logistic(LogisticModel),
    RandomForest(RandomForestModel),
    BoostedTrees(BoostedTreesModel),
}

impl FittedModel {
    /// Family name for logs.
    #[must_use]
    pub fn family(&self) -> &'static str {
        match self {
            Self::Logistic(_) => "logistic_regression",
            Self::RandomForest(_) => "random_forest",
            Self::BoostedTrees(_) => "gradient_boosting",
        }
    }
}

impl Classifier for FittedModel {
    fn predict_proba(&self, features: ArrayView1<'_, f64>) -> f64 {
        match self {
            Self::Logistic(m) => m.predict_proba(features),
            Self::RandomForest(m) => m.predict_proba(features),
            Self::BoostedTrees(m) => m.predict_proba(features),
        }
    }

    fn n_features(&self) -> usize {
        match self {
            Self::Logistic(m) => m.n_features(),
            Self::RandomForest(m) => m.n_features(),
            Self::BoostedTrees(m) => m.n_features(),
        }
    }
}

/// Numerically stable logistic function.
#[must_use]
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

/// Check that `x` is a non-empty finite matrix with one label per row.
///
/// Returns the number of columns.
pub(crate) fn check_matrix(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, u8>,
) -> Result<usize, FitError> {
    let (rows, cols) = x.dim();
    if rows == 0 || cols == 0 {
        return Err(FitError::Empty);
    }
    if rows != y.len() {
        return Err(FitError::LabelCount {
            rows,
            labels: y.len(),
        });
    }
    if let Some(row) = x
        .outer_iter()
        .position(|values| values.iter().any(|v| !v.is_finite()))
    {
        return Err(FitError::NonFinite(format!("input row {row}")));
    }
    Ok(cols)
}

#[cfg(test)]
mod tests {
    use ndarray::{array, Array2};

    use super::*;

    #[test]
    fn test_sigmoid_is_stable() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-12);
        assert!(sigmoid(-800.0) >= 0.0);
        assert!(sigmoid(800.0) <= 1.0);
        assert!((sigmoid(2.0) + sigmoid(-2.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_check_matrix() {
        assert_eq!(check_matrix(array![[1.0, 2.0]].view(), array![1u8].view()), Ok(2));
        assert_eq!(
            check_matrix(Array2::<f64>::zeros((0, 3)).view(), Array1::<u8>::zeros(0).view()),
            Err(FitError::Empty)
        );
        assert!(matches!(
            check_matrix(array![[1.0, 2.0], [1.0, 3.0]].view(), array![0u8].view()),
            Err(FitError::LabelCount { rows: 2, labels: 1 })
        ));
        assert!(matches!(
            check_matrix(array![[0.0], [f64::NAN]].view(), array![0u8, 1].view()),
            Err(FitError::NonFinite(_))
        ));
    }
}
