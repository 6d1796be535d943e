//! Explainer port: per-feature attributions for one scored instance.

use ndarray::ArrayView1;

use crate::ml::ScoringArtifact;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExplainError {
    #[error("Artifact has no background sample")]
    EmptyBackground,

    #[error("Instance has {got} features, expected {expected}")]
    Width { expected: usize, got: usize },

    #[error("Invalid explainer setting: {0}")]
    InvalidSetting(String),
}

/// Contribution of one encoded feature to a prediction.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Attribution {
    pub feature: String,
    pub value: f64,
}

/// Attributions for one instance.
///
/// `base_value + sum(attributions) == prediction` up to sampling noise for
/// approximate explainers; exactly for efficient ones.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Explanation {
    /// Mean model output over the background sample
    pub base_value: f64,
    /// Model output for the instance
    pub prediction: f64,
    /// One entry per encoded feature, in encoder output order
    pub attributions: Vec<Attribution>,
}

/// Post-hoc explainer over the artifact's probability function and its
/// stored background sample.
pub trait Explainer: Send + Sync {
    /// Explain one encoded instance.
    ///
    /// # Errors
    /// Returns `ExplainError` if the instance or background is unusable.
    fn explain(
        &self,
        artifact: &ScoringArtifact,
        instance: ArrayView1<'_, f64>,
    ) -> Result<Explanation, ExplainError>;
}
