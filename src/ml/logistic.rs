//! L2-regularised logistic regression fitted by Newton's method (IRLS).
//!
//! Minimises `C * sum(log_loss) + 0.5 * ||w||^2`; the intercept is not
//! penalised. Each Newton system is symmetric positive definite and is solved
//! by a Cholesky factorisation.

use faer::solvers::SpSolver;
use faer::{Mat, Side};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{check_matrix, sigmoid, Classifier, FitError};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogisticParams {
    /// Inverse regularisation strength.
    pub c: f64,
    pub max_iter: usize,
    /// Stop once the largest Newton step component falls below this.
    pub tol: f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 200,
            tol: 1e-8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub weights: Array1<f64>,
    pub intercept: f64,
}

impl LogisticModel {
    /// Fit on encoded rows and 0/1 labels.
    ///
    /// # Errors
    /// `InvalidParams` for a non-positive `c`, `Singular` if the Newton system
    /// is not positive definite, `NonFinite` if the iterate diverges.
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, u8>,
        params: &LogisticParams,
    ) -> Result<Self, FitError> {
        let d = check_matrix(x, y)?;
        if !(params.c > 0.0 && params.c.is_finite()) {
            return Err(FitError::InvalidParams(format!(
                "C must be positive, got {}",
                params.c
            )));
        }
        let alpha = 1.0 / params.c;
        let mut design = Array2::<f64>::ones((x.nrows(), d + 1));
        design.slice_mut(s![.., ..d]).assign(&x);
        let targets = y.mapv(f64::from);
        let mut theta = Array1::<f64>::zeros(d + 1);

        for iteration in 0..params.max_iter {
            let p = design.dot(&theta).mapv(sigmoid);
            let w = p.mapv(|p| p * (1.0 - p));

            let mut grad = design.t().dot(&(&p - &targets));
            let mut hess = (&design.t() * &w).dot(&design);
            for j in 0..d {
                grad[j] += alpha * theta[j];
                hess[[j, j]] += alpha;
            }
            // keeps the intercept row positive definite on separable data
            hess[[d, d]] += 1e-10;

            let step = newton_step(&hess, &grad)?;

            // backtracking: halve the Newton step until the objective does not increase
            let current = objective(&design, y, &theta, alpha);
            let mut scale = 1.0;
            let mut candidate = &theta - &step;
            for _ in 0..30 {
                if objective(&design, y, &candidate, alpha) <= current {
                    break;
                }
                scale *= 0.5;
                candidate = &theta - &(&step * scale);
            }
            if candidate.iter().any(|v| !v.is_finite()) {
                return Err(FitError::NonFinite(format!(
                    "coefficients diverged at iteration {iteration}"
                )));
            }
            theta = candidate;

            let max_step = step.iter().fold(0.0_f64, |m, s| m.max((scale * s).abs()));
            if max_step < params.tol {
                tracing::debug!("Logistic regression converged after {} iterations", iteration + 1);
                break;
            }
        }

        Ok(Self {
            weights: theta.slice(s![..d]).to_owned(),
            intercept: theta[d],
        })
    }
}

impl Classifier for LogisticModel {
    fn predict_proba(&self, features: ArrayView1<'_, f64>) -> f64 {
        sigmoid(self.weights.dot(&features) + self.intercept)
    }

    fn n_features(&self) -> usize {
        self.weights.len()
    }
}

/// Solve `hess * step = grad` through a Cholesky factorisation.
fn newton_step(hess: &Array2<f64>, grad: &Array1<f64>) -> Result<Array1<f64>, FitError> {
    let n = grad.len();
    let h = Mat::<f64>::from_fn(n, n, |i, j| hess[[i, j]]);
    let g = Mat::<f64>::from_fn(n, 1, |i, _| grad[i]);
    let llt = h
        .cholesky(Side::Lower)
        .map_err(|_| FitError::Singular("Newton system is not positive definite".into()))?;
    let step = llt.solve(&g);
    Ok(Array1::from_shape_fn(n, |i| step.read(i, 0)))
}

/// Penalised negative log-likelihood scaled by `1 / C`.
///
/// `design` carries the intercept column last; `theta[d]` is not penalised.
fn objective(design: &Array2<f64>, y: ArrayView1<'_, u8>, theta: &Array1<f64>, alpha: f64) -> f64 {
    let d = theta.len() - 1;
    let loss: f64 = design
        .dot(theta)
        .iter()
        .zip(y)
        .map(|(&z, &label)| if label == 1 { softplus(-z) } else { softplus(z) })
        .sum();
    let penalty = theta.slice(s![..d]).mapv(|w| w * w).sum();
    loss + 0.5 * alpha * penalty
}

/// `ln(1 + e^t)` without overflow.
fn softplus(t: f64) -> f64 {
    t.max(0.0) + (-t.abs()).exp().ln_1p()
}
