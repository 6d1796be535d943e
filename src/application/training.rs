//! Training service: load labeled rows, select a model, persist the artifact.

use std::path::Path;
use std::sync::Arc;

use crate::adapters::StorageError;
use crate::ml::{ModelTrainer, TrainerConfig, TrainingOutcome};
use crate::ports::TrainingSource;
use crate::HdpError;

/// Offline model-selection job.
pub struct TrainingService<T>
where
    T: TrainingSource,
{
    source: Arc<T>,
    trainer: ModelTrainer,
}

impl<T> TrainingService<T>
where
    T: TrainingSource,
    T::Error: Into<StorageError>,
{
    pub fn new(source: Arc<T>, config: TrainerConfig) -> Self {
        Self {
            source,
            trainer: ModelTrainer::new(config),
        }
    }

    /// Train from the source and write the winning artifact to `path`.
    ///
    /// Nothing is written unless training succeeds.
    ///
    /// # Errors
    /// Returns error if the source cannot be read, training fails or the
    /// artifact cannot be saved.
    pub fn train_and_save(&self, path: &Path) -> Result<TrainingOutcome, HdpError> {
        tracing::info!("Starting training run...");
        let records = self
            .source
            .load_labeled_records()
            .map_err(|e| HdpError::Storage(e.into()))?;

        let outcome = self.trainer.train(&records)?;
        outcome.artifact.save(path)?;

        tracing::info!(
            "Training run complete: {} selected out of {} candidates",
            outcome.artifact.model_name(),
            outcome.leaderboard.len()
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::SqliteStorage;
    use crate::ml::synthetic::generate_cohort;
    use crate::ml::{
        Candidate, CandidateSpec, ForestParams, LogisticParams, ScoringArtifact, TrainingError,
    };

    fn config() -> TrainerConfig {
        TrainerConfig {
            roster: vec![
                Candidate::new("log_reg", CandidateSpec::Logistic(LogisticParams::default())),
                Candidate::new(
                    "random_forest",
                    CandidateSpec::RandomForest(ForestParams {
                        n_estimators: 30,
                        ..ForestParams::default()
                    }),
                ),
            ],
            ..TrainerConfig::default()
        }
    }

    #[test]
    fn test_train_and_save_round_trip() {
        let storage = Arc::new(SqliteStorage::in_memory().expect("Should create db"));
        storage
            .insert_labeled_records(&generate_cohort(100, 5))
            .expect("Should insert");

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("best_model.bin");
        let outcome = TrainingService::new(storage, config())
            .train_and_save(&path)
            .expect("Should train");

        let loaded = ScoringArtifact::load(&path).expect("Should load");
        assert_eq!(loaded.model_name(), outcome.artifact.model_name());
        assert_eq!(loaded.metadata().leaderboard, outcome.leaderboard);
        let patient = generate_cohort(4, 50)[3].record().expect("complete row");
        assert_eq!(
            loaded.predict(&patient).expect("predict"),
            outcome.artifact.predict(&patient).expect("predict")
        );
    }

    #[test]
    fn test_failed_training_writes_nothing() {
        let storage = Arc::new(SqliteStorage::in_memory().expect("Should create db"));
        let mut cohort = generate_cohort(30, 5);
        for row in &mut cohort {
            row.label = 0;
        }
        storage.insert_labeled_records(&cohort).expect("Should insert");

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("best_model.bin");
        let result = TrainingService::new(storage, config()).train_and_save(&path);
        assert!(matches!(
            result,
            Err(HdpError::Training(TrainingError::SingleClass { found: 0 }))
        ));
        assert!(!path.exists());
    }

    #[test]
    fn test_empty_source_fails() {
        let storage = Arc::new(SqliteStorage::in_memory().expect("Should create db"));
        let dir = tempfile::tempdir().expect("tempdir");
        let result =
            TrainingService::new(storage, config()).train_and_save(&dir.path().join("m.bin"));
        assert!(matches!(
            result,
            Err(HdpError::Training(TrainingError::EmptyDataset))
        ));
    }
}
