//! Sampling Shapley explainer.
//!
//! Monte-Carlo estimate of Shapley values over random feature orderings. For
//! each ordering and each background row the instance's features are switched
//! in one at a time, starting from the background row, and each switch's
//! change in model output is credited to that feature. Every walk ends at
//! `f(x)`, so the attributions always sum to `f(x) - mean f(background)`.

use ndarray::{Array1, ArrayView1};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::ml::ScoringArtifact;
use crate::ports::{Attribution, ExplainError, Explainer, Explanation};

/// Permutation-sampling Shapley explainer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingShapley {
    /// Orderings sampled per background row
    pub n_permutations: usize,
    pub seed: u64,
}

impl Default for SamplingShapley {
    fn default() -> Self {
        Self {
            n_permutations: 16,
            seed: 42,
        }
    }
}

impl SamplingShapley {
    #[must_use]
    pub fn new(n_permutations: usize, seed: u64) -> Self {
        Self {
            n_permutations,
            seed,
        }
    }

    /// Credit of each feature along one ordering from `start` to `instance`.
    fn walk(
        artifact: &ScoringArtifact,
        start: ArrayView1<'_, f64>,
        instance: ArrayView1<'_, f64>,
        order: &[usize],
        credit: &mut Array1<f64>,
    ) {
        let mut z = start.to_owned();
        let mut prev = artifact.predict_encoded(z.view());
        for &j in order {
            z[j] = instance[j];
            let cur = artifact.predict_encoded(z.view());
            credit[j] += cur - prev;
            prev = cur;
        }
    }
}

impl Explainer for SamplingShapley {
    fn explain(
        &self,
        artifact: &ScoringArtifact,
        instance: ArrayView1<'_, f64>,
    ) -> Result<Explanation, ExplainError> {
        if self.n_permutations == 0 {
            return Err(ExplainError::InvalidSetting(
                "n_permutations must be > 0".into(),
            ));
        }
        let width = artifact.encoder().n_outputs();
        if instance.len() != width {
            return Err(ExplainError::Width {
                expected: width,
                got: instance.len(),
            });
        }
        let background = artifact.background();
        if background.nrows() == 0 {
            return Err(ExplainError::EmptyBackground);
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let orders: Vec<Vec<usize>> = (0..self.n_permutations)
            .map(|_| {
                let mut order: Vec<usize> = (0..width).collect();
                order.shuffle(&mut rng);
                order
            })
            .collect();

        // per-row partial sums, combined in row order for reproducibility
        let partials: Vec<Array1<f64>> = (0..background.nrows())
            .into_par_iter()
            .map(|i| {
                let mut credit = Array1::zeros(width);
                for order in &orders {
                    Self::walk(artifact, background.row(i), instance, order, &mut credit);
                }
                credit
            })
            .collect();

        let samples = (background.nrows() * orders.len()) as f64;
        let phi = partials
            .iter()
            .fold(Array1::<f64>::zeros(width), |total, credit| total + credit)
            / samples;

        let base_value = background
            .outer_iter()
            .map(|row| artifact.predict_encoded(row))
            .sum::<f64>()
            / background.nrows() as f64;
        let prediction = artifact.predict_encoded(instance);

        tracing::debug!(
            "Explained instance with {} orderings x {} background rows",
            orders.len(),
            background.nrows()
        );

        Ok(Explanation {
            base_value,
            prediction,
            attributions: artifact
                .encoder()
                .output_names()
                .into_iter()
                .zip(&phi)
                .map(|(feature, &value)| Attribution { feature, value })
                .collect(),
        })
    }
}
