//! Held-out metrics.

use serde::{Deserialize, Serialize};

/// Area under the ROC curve via the rank-sum (Mann-Whitney) statistic.
///
/// Tied scores share their average rank. Returns `None` when the inputs differ
/// in length, a score is not finite, or either class is absent.
#[must_use]
pub fn roc_auc(labels: &[u8], scores: &[f64]) -> Option<f64> {
    if labels.len() != scores.len() || scores.iter().any(|s| !s.is_finite()) {
        return None;
    }
    let n_pos = labels.iter().filter(|&&l| l == 1).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum_pos = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // ranks start+1 ..= end share their mean
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        let positives = order[start..end].iter().filter(|&&i| labels[i] == 1).count();
        rank_sum_pos += avg_rank * positives as f64;
        start = end;
    }

    let n_pos_f = n_pos as f64;
    Some((rank_sum_pos - n_pos_f * (n_pos_f + 1.0) / 2.0) / (n_pos_f * n_neg as f64))
}

/// Counts at a fixed decision threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_negative: usize,
    pub false_positive: usize,
    pub false_negative: usize,
    pub true_positive: usize,
}

impl ConfusionMatrix {
    /// Tally predictions `score >= threshold` against labels.
    #[must_use]
    pub fn tally(labels: &[u8], scores: &[f64], threshold: f64) -> Self {
        let mut m = Self::default();
        for (&label, &score) in labels.iter().zip(scores) {
            match (label == 1, score >= threshold) {
                (false, false) => m.true_negative += 1,
                (false, true) => m.false_positive += 1,
                (true, false) => m.false_negative += 1,
                (true, true) => m.true_positive += 1,
            }
        }
        m
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.true_negative + self.false_positive + self.false_negative + self.true_positive
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Classification report of one model on the held-out split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub threshold: f64,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub roc_auc: f64,
    pub confusion: ConfusionMatrix,
}

impl EvaluationReport {
    /// Compute the report; `None` under the same conditions as [`roc_auc`].
    ///
    /// Zero denominators yield 0.0 rather than NaN.
    #[must_use]
    pub fn compute(labels: &[u8], scores: &[f64], threshold: f64) -> Option<Self> {
        let auc = roc_auc(labels, scores)?;
        let confusion = ConfusionMatrix::tally(labels, scores, threshold);

        let precision = ratio(
            confusion.true_positive,
            confusion.true_positive + confusion.false_positive,
        );
        let recall = ratio(
            confusion.true_positive,
            confusion.true_positive + confusion.false_negative,
        );
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Some(Self {
            threshold,
            accuracy: ratio(
                confusion.true_positive + confusion.true_negative,
                confusion.total(),
            ),
            precision,
            recall,
            f1,
            roc_auc: auc,
            confusion,
        })
    }
}
