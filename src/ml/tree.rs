//! Greedy regression tree over per-sample gradient statistics.
//!
//! A node's score is `G^2 / (H + lambda)` and its leaf value `-G / (H + lambda)`.
//! With `g = -y`, `h = 1`, `lambda = 0` this is the squared-error CART used by
//! the forest (leaf = mean label); with logistic gradients it is the
//! second-order tree used by boosting.

use ndarray::{ArrayView1, ArrayView2};
use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Smallest gain accepted for a split.
const MIN_GAIN: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    /// Route a row to its leaf; rows with `x[feature] <= threshold` go left.
    #[must_use]
    pub fn predict(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes[idx] {
                Node::Leaf { value } => return value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[feature] <= threshold { left } else { right };
                }
            }
        }
    }

    #[must_use]
    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    /// Largest feature index referenced by a split, if any.
    #[cfg(test)]
    pub(crate) fn max_feature(&self) -> Option<usize> {
        self.nodes
            .iter()
            .filter_map(|n| match n {
                Node::Split { feature, .. } => Some(*feature),
                Node::Leaf { .. } => None,
            })
            .max()
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub max_depth: Option<usize>,
    /// Minimum hessian sum in each child.
    pub min_child_weight: f64,
    pub lambda: f64,
    /// Features drawn at each split; `None` uses every allowed feature.
    pub max_features: Option<usize>,
}

struct Builder<'a, R> {
    x: ArrayView2<'a, f64>,
    grad: ArrayView1<'a, f64>,
    hess: ArrayView1<'a, f64>,
    features: &'a [usize],
    params: TreeParams,
    rng: &'a mut R,
    nodes: Vec<Node>,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Grow one tree on `samples` (indices into `x`, repeats allowed), splitting
/// only on `features`.
pub(crate) fn grow<R: Rng>(
    x: ArrayView2<'_, f64>,
    grad: ArrayView1<'_, f64>,
    hess: ArrayView1<'_, f64>,
    mut samples: Vec<usize>,
    features: &[usize],
    params: TreeParams,
    rng: &mut R,
) -> RegressionTree {
    let mut builder = Builder {
        x: x.view(),
        grad: grad.view(),
        hess: hess.view(),
        features,
        params,
        rng,
        nodes: Vec::new(),
    };
    builder.build(&mut samples, 0);
    RegressionTree {
        nodes: builder.nodes,
    }
}

impl<R: Rng> Builder<'_, R> {
    fn build(&mut self, samples: &mut [usize], depth: usize) -> usize {
        let (g, h) = samples.iter().fold((0.0, 0.0), |(g, h), &i| {
            (g + self.grad[i], h + self.hess[i])
        });
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: -g / (h + self.params.lambda),
        });

        let depth_allows = self.params.max_depth.map_or(true, |max| depth < max);
        if !depth_allows || samples.len() < 2 {
            return idx;
        }
        let Some(best) = self.best_split(samples, g, h) else {
            return idx;
        };

        let mut mid = 0;
        for k in 0..samples.len() {
            if self.x[[samples[k], best.feature]] <= best.threshold {
                samples.swap(mid, k);
                mid += 1;
            }
        }
        let (left_samples, right_samples) = samples.split_at_mut(mid);
        let left = self.build(left_samples, depth + 1);
        let right = self.build(right_samples, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        idx
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        match self.params.max_features {
            Some(m) if m < self.features.len() => {
                let mut picked: Vec<usize> = index::sample(self.rng, self.features.len(), m)
                    .into_iter()
                    .map(|k| self.features[k])
                    .collect();
                picked.sort_unstable();
                picked
            }
            _ => self.features.to_vec(),
        }
    }

    fn best_split(&mut self, samples: &[usize], g: f64, h: f64) -> Option<BestSplit> {
        let lambda = self.params.lambda;
        let parent_score = g * g / (h + lambda);
        let mut best: Option<BestSplit> = None;
        let mut order = samples.to_vec();

        for feature in self.candidate_features() {
            let column = self.x.column(feature);
            order.sort_by(|&a, &b| column[a].total_cmp(&column[b]));

            let (mut gl, mut hl) = (0.0, 0.0);
            for k in 0..order.len() - 1 {
                let i = order[k];
                gl += self.grad[i];
                hl += self.hess[i];

                let value = column[i];
                let next = column[order[k + 1]];
                if next <= value {
                    continue;
                }
                let (gr, hr) = (g - gl, h - hl);
                if hl < self.params.min_child_weight || hr < self.params.min_child_weight {
                    continue;
                }

                let gain = gl * gl / (hl + lambda) + gr * gr / (hr + lambda) - parent_score;
                if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    let mut threshold = value + (next - value) / 2.0;
                    if threshold >= next {
                        threshold = value;
                    }
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        gain,
                    });
                }
            }
        }
        best
    }
}
