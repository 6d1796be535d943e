//! Model selection: fit every roster candidate on the training split, score it
//! on the held-out split by ROC AUC and keep the best.
//!
//! Selection is deterministic: the strictly highest AUC wins and a tie keeps
//! the candidate that appears first in the roster.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::seq::index;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::artifact::{ScoringArtifact, TrainingMetadata};
use super::boosting::{BoostedTreesModel, BoostingParams};
use super::forest::{ForestParams, RandomForestModel};
use super::logistic::{LogisticModel, LogisticParams};
use super::metrics::{roc_auc, EvaluationReport};
use super::split::stratified_split;
use super::{Classifier, ColumnImputer, FeatureEncoder, FitError, FittedModel};
use crate::domain::{EncodingError, LabeledRecord, FEATURE_NAMES};

/// Decision cut used for the held-out evaluation report.
pub const REPORT_THRESHOLD: f64 = 0.5;

#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("Training data is empty")]
    EmptyDataset,

    #[error("Record {id} has label {label}; labels must be 0 or 1")]
    InvalidLabel { id: i64, label: u8 },

    #[error("Training data contains a single class ({found}); need both 0 and 1")]
    SingleClass { found: u8 },

    #[error("Held-out split does not contain both classes")]
    HeldOutSingleClass,

    #[error("Invalid trainer configuration: {0}")]
    Config(String),

    #[error("Candidate {candidate} failed to fit: {source}")]
    Candidate {
        candidate: String,
        #[source]
        source: FitError,
    },

    #[error("ROC AUC is undefined for candidate {candidate}")]
    UndefinedMetric { candidate: String },

    #[error("Encoding failed: {0}")]
    Encoding(#[from] EncodingError),
}

/// Classifier family and its fixed hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CandidateSpec {
    Logistic(LogisticParams),
    RandomForest(ForestParams),
    GradientBoosting(BoostingParams),
}

/// One named roster entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub spec: CandidateSpec,
}

impl Candidate {
    #[must_use]
    pub fn new(name: impl Into<String>, spec: CandidateSpec) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }

    /// Fit this candidate on encoded rows.
    ///
    /// # Errors
    /// Propagates the family's `FitError`.
    pub fn fit(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, u8>,
        seed: u64,
    ) -> Result<FittedModel, FitError> {
        Ok(match &self.spec {
            CandidateSpec::Logistic(p) => FittedModel::Logistic(LogisticModel::fit(x, y, p)?),
            CandidateSpec::RandomForest(p) => {
                FittedModel::RandomForest(RandomForestModel::fit(x, y, p, seed)?)
            }
            CandidateSpec::GradientBoosting(p) => {
                FittedModel::BoostedTrees(BoostedTreesModel::fit(x, y, p, seed)?)
            }
        })
    }
}

/// The fixed roster: `log_reg`, `random_forest`, `xgboost`.
#[must_use]
pub fn default_roster() -> Vec<Candidate> {
    vec![
        Candidate::new("log_reg", CandidateSpec::Logistic(LogisticParams::default())),
        Candidate::new(
            "random_forest",
            CandidateSpec::RandomForest(ForestParams::default()),
        ),
        Candidate::new(
            "xgboost",
            CandidateSpec::GradientBoosting(BoostingParams::default()),
        ),
    ]
}

#[derive(Debug, Clone)]
pub struct TrainerConfig {
    /// Held-out fraction, in (0, 1)
    pub test_size: f64,
    pub seed: u64,
    /// Candidates in priority order
    pub roster: Vec<Candidate>,
    /// Encoded training rows kept for the explainer
    pub background_size: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 42,
            roster: default_roster(),
            background_size: 100,
        }
    }
}

/// Held-out AUC of one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub name: String,
    pub auc: f64,
}

#[derive(Debug)]
pub struct TrainingOutcome {
    pub artifact: ScoringArtifact,
    /// Every candidate, in roster order
    pub leaderboard: Vec<LeaderboardEntry>,
}

pub struct ModelTrainer {
    config: TrainerConfig,
}

impl ModelTrainer {
    #[must_use]
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    /// Run the full selection procedure.
    ///
    /// # Errors
    /// Returns `TrainingError` for unusable data or configuration, or naming
    /// the first candidate that fails to fit. No partial result is produced.
    pub fn train(&self, data: &[LabeledRecord]) -> Result<TrainingOutcome, TrainingError> {
        let config = &self.config;
        if config.roster.is_empty() {
            return Err(TrainingError::Config("roster is empty".into()));
        }
        if !(config.test_size > 0.0 && config.test_size < 1.0) {
            return Err(TrainingError::Config(format!(
                "test_size must lie in (0, 1), got {}",
                config.test_size
            )));
        }
        check_labels(data)?;

        let labels: Vec<u8> = data.iter().map(|r| r.label).collect();
        let split = stratified_split(&labels, config.test_size, config.seed);
        let y_train: Array1<u8> = split.train.iter().map(|&i| labels[i]).collect();
        let y_test: Vec<u8> = split.test.iter().map(|&i| labels[i]).collect();
        if !(y_test.contains(&0) && y_test.contains(&1)) {
            return Err(TrainingError::HeldOutSingleClass);
        }

        tracing::info!(
            "Training on {} rows, evaluating on {} held-out rows (seed {})",
            split.train.len(),
            split.test.len(),
            config.seed
        );

        let train_rows: Vec<LabeledRecord> = split.train.iter().map(|&i| data[i]).collect();
        let test_rows: Vec<LabeledRecord> = split.test.iter().map(|&i| data[i]).collect();
        let imputer = ColumnImputer::fit(&train_rows)?;
        let (train_records, filled_train) = imputer.fill_all(&train_rows)?;
        let (test_records, filled_test) = imputer.fill_all(&test_rows)?;
        if filled_train + filled_test > 0 {
            tracing::info!(
                "Imputed {} empty cells ({} training, {} held-out)",
                filled_train + filled_test,
                filled_train,
                filled_test
            );
        }

        let encoder = FeatureEncoder::fit(&train_records)?;
        let x_train = encoder.transform_batch(&train_records)?;
        let x_test = encoder.transform_batch(&test_records)?;

        let mut leaderboard = Vec::with_capacity(config.roster.len());
        let mut best: Option<(FittedModel, f64, usize)> = None;

        for (position, candidate) in config.roster.iter().enumerate() {
            let model = candidate
                .fit(x_train.view(), y_train.view(), config.seed)
                .map_err(|source| TrainingError::Candidate {
                    candidate: candidate.name.clone(),
                    source,
                })?;
            let scores = model.predict_batch(x_test.view()).to_vec();
            let auc = roc_auc(&y_test, &scores).ok_or_else(|| TrainingError::UndefinedMetric {
                candidate: candidate.name.clone(),
            })?;

            tracing::info!("Candidate {} held-out AUC {:.4}", candidate.name, auc);
            leaderboard.push(LeaderboardEntry {
                name: candidate.name.clone(),
                auc,
            });

            if best.as_ref().map_or(true, |(_, best_auc, _)| auc > *best_auc) {
                best = Some((model, auc, position));
            }
        }

        let (model, best_auc, position) =
            best.ok_or_else(|| TrainingError::Config("roster is empty".into()))?;
        let model_name = config.roster[position].name.clone();

        let scores = model.predict_batch(x_test.view()).to_vec();
        let evaluation = EvaluationReport::compute(&y_test, &scores, REPORT_THRESHOLD)
            .ok_or_else(|| TrainingError::UndefinedMetric {
                candidate: model_name.clone(),
            })?;

        tracing::info!(
            "Selected {} ({}) with AUC {:.4}; accuracy {:.3}, F1 {:.3}",
            model_name,
            model.family(),
            best_auc,
            evaluation.accuracy,
            evaluation.f1
        );

        let background = background_sample(x_train.view(), config.background_size, config.seed);
        let metadata = TrainingMetadata {
            model_name,
            best_auc,
            leaderboard: leaderboard.clone(),
            evaluation,
            n_train: split.train.len(),
            n_test: split.test.len(),
            held_out_ids: split.test.iter().map(|&i| data[i].id).collect(),
            seed: config.seed,
            trained_at: chrono::Utc::now(),
            feature_schema: FEATURE_NAMES.iter().map(|s| (*s).to_string()).collect(),
            imputer,
        };

        Ok(TrainingOutcome {
            artifact: ScoringArtifact::new(encoder, model, metadata, background),
            leaderboard,
        })
    }
}

fn check_labels(data: &[LabeledRecord]) -> Result<(), TrainingError> {
    let first = data.first().ok_or(TrainingError::EmptyDataset)?;
    if let Some(bad) = data.iter().find(|r| r.label > 1) {
        return Err(TrainingError::InvalidLabel {
            id: bad.id,
            label: bad.label,
        });
    }
    if data.iter().all(|r| r.label == first.label) {
        return Err(TrainingError::SingleClass { found: first.label });
    }
    Ok(())
}

/// Seeded subset of encoded training rows, in training order.
fn background_sample(x_train: ArrayView2<'_, f64>, size: usize, seed: u64) -> Array2<f64> {
    if x_train.nrows() <= size {
        return x_train.to_owned();
    }
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut picked = index::sample(&mut rng, x_train.nrows(), size).into_vec();
    picked.sort_unstable();
    x_train.select(Axis(0), &picked)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::ml::synthetic::generate_cohort;

    /// AUC by explicit pair counting, independent of the rank-sum code.
    fn pairwise_auc(labels: &[u8], scores: &[f64]) -> f64 {
        let mut wins = 0.0;
        let mut pairs = 0.0;
        for (i, &li) in labels.iter().enumerate() {
            for (j, &lj) in labels.iter().enumerate() {
                if li == 1 && lj == 0 {
                    pairs += 1.0;
                    if scores[i] > scores[j] {
                        wins += 1.0;
                    } else if scores[i] == scores[j] {
                        wins += 0.5;
                    }
                }
            }
        }
        wins / pairs
    }

    fn fast_roster() -> Vec<Candidate> {
        vec![
            Candidate::new("log_reg", CandidateSpec::Logistic(LogisticParams::default())),
            Candidate::new(
                "random_forest",
                CandidateSpec::RandomForest(ForestParams {
                    n_estimators: 40,
                    ..ForestParams::default()
                }),
            ),
            Candidate::new(
                "xgboost",
                CandidateSpec::GradientBoosting(BoostingParams {
                    n_estimators: 40,
                    ..BoostingParams::default()
                }),
            ),
        ]
    }

    #[test]
    fn test_default_roster_order() {
        let names: Vec<String> = default_roster().into_iter().map(|c| c.name).collect();
        assert_eq!(names, ["log_reg", "random_forest", "xgboost"]);
    }

    #[test]
    fn test_selects_max_auc_candidate() {
        let cohort = generate_cohort(200, 7);
        let config = TrainerConfig {
            roster: fast_roster(),
            ..TrainerConfig::default()
        };
        let outcome = ModelTrainer::new(config).train(&cohort).expect("train");
        let artifact = &outcome.artifact;
        let metadata = artifact.metadata();

        assert_eq!(outcome.leaderboard.len(), 3);
        let max_auc = outcome
            .leaderboard
            .iter()
            .map(|e| e.auc)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(artifact.best_auc(), max_auc);
        let winner = outcome
            .leaderboard
            .iter()
            .find(|e| e.auc == max_auc)
            .expect("winner");
        assert_eq!(artifact.model_name(), winner.name);
        assert!(artifact.best_auc() > 0.75, "{:?}", outcome.leaderboard);

        // recompute the winner's AUC from the held-out ids
        let by_id: HashMap<i64, &LabeledRecord> = cohort.iter().map(|r| (r.id, r)).collect();
        let (labels, scores): (Vec<u8>, Vec<f64>) = metadata
            .held_out_ids
            .iter()
            .map(|id| {
                let row = by_id[id];
                let record = row.record().expect("complete row");
                (row.label, artifact.predict(&record).expect("predict"))
            })
            .unzip();
        assert_eq!(metadata.n_test, 40);
        assert_eq!(metadata.n_train, 160);
        assert!((pairwise_auc(&labels, &scores) - artifact.best_auc()).abs() < 1e-12);
        assert_eq!(metadata.evaluation.confusion.total(), 40);
        assert_eq!(artifact.background().dim(), (100, artifact.encoder().n_outputs()));
    }

    #[test]
    fn test_tie_keeps_first_in_roster() {
        let cohort = generate_cohort(60, 1);
        let params = LogisticParams::default();
        let config = TrainerConfig {
            roster: vec![
                Candidate::new("first", CandidateSpec::Logistic(params)),
                Candidate::new("second", CandidateSpec::Logistic(params)),
            ],
            ..TrainerConfig::default()
        };
        let outcome = ModelTrainer::new(config).train(&cohort).expect("train");
        assert_eq!(outcome.leaderboard[0].auc, outcome.leaderboard[1].auc);
        assert_eq!(outcome.artifact.model_name(), "first");
    }

    #[test]
    fn test_single_class_fails() {
        let mut cohort = generate_cohort(20, 2);
        for row in &mut cohort {
            row.label = 1;
        }
        assert!(matches!(
            ModelTrainer::new(TrainerConfig::default()).train(&cohort),
            Err(TrainingError::SingleClass { found: 1 })
        ));
        assert!(matches!(
            ModelTrainer::new(TrainerConfig::default()).train(&[]),
            Err(TrainingError::EmptyDataset)
        ));
    }

    #[test]
    fn test_held_out_single_class() {
        let mut cohort = generate_cohort(40, 2);
        for row in &mut cohort {
            row.label = 0;
        }
        cohort[5].label = 1;
        assert!(matches!(
            ModelTrainer::new(TrainerConfig::default()).train(&cohort),
            Err(TrainingError::HeldOutSingleClass)
        ));
    }

    #[test]
    fn test_missing_cells_are_imputed_from_training_split() {
        let mut cohort = generate_cohort(80, 6);
        cohort[2].values[4] = None;
        cohort[9].values[0] = None;
        cohort[9].values[11] = None;
        let config = TrainerConfig {
            roster: vec![Candidate::new(
                "log_reg",
                CandidateSpec::Logistic(LogisticParams::default()),
            )],
            ..TrainerConfig::default()
        };
        let outcome = ModelTrainer::new(config).train(&cohort).expect("Should train with gaps");
        let metadata = outcome.artifact.metadata();

        let held_out: Vec<i64> = metadata.held_out_ids.clone();
        let train_rows: Vec<LabeledRecord> = cohort
            .iter()
            .filter(|row| !held_out.contains(&row.id))
            .copied()
            .collect();
        assert_eq!(
            metadata.imputer,
            ColumnImputer::fit(&train_rows).expect("Should fit on training rows")
        );
        assert!(outcome.artifact.best_auc().is_finite());
    }

    #[test]
    fn test_unobserved_column_fails() {
        let mut cohort = generate_cohort(30, 3);
        for row in &mut cohort {
            row.values[12] = None;
        }
        assert!(matches!(
            ModelTrainer::new(TrainerConfig::default()).train(&cohort),
            Err(TrainingError::Encoding(EncodingError::Unobserved("thal")))
        ));
    }

    #[test]
    fn test_invalid_label_fails() {
        let mut cohort = generate_cohort(20, 2);
        cohort[3].label = 2;
        let id = cohort[3].id;
        match ModelTrainer::new(TrainerConfig::default()).train(&cohort) {
            Err(TrainingError::InvalidLabel { id: got, label: 2 }) => assert_eq!(got, id),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_failing_candidate_is_named() {
        let cohort = generate_cohort(40, 4);
        let config = TrainerConfig {
            roster: vec![
                Candidate::new("log_reg", CandidateSpec::Logistic(LogisticParams::default())),
                Candidate::new(
                    "broken",
                    CandidateSpec::Logistic(LogisticParams {
                        c: -1.0,
                        ..LogisticParams::default()
                    }),
                ),
            ],
            ..TrainerConfig::default()
        };
        match ModelTrainer::new(config).train(&cohort) {
            Err(TrainingError::Candidate { candidate, .. }) => assert_eq!(candidate, "broken"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_bad_test_size() {
        let cohort = generate_cohort(20, 2);
        let config = TrainerConfig {
            test_size: 1.0,
            ..TrainerConfig::default()
        };
        assert!(matches!(
            ModelTrainer::new(config).train(&cohort),
            Err(TrainingError::Config(_))
        ));
    }
}
