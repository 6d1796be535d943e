//! The scoring artifact: fitted encoder + winning classifier, persisted as one
//! checksummed file and loaded read-only at serving time.
//!
//! ## File layout
//!
//! ```text
//! b"HDPMODEL" | bincode(Envelope { version, schema, checksum, payload })
//! ```
//!
//! `payload` is the bincode encoding of [`ScoringArtifact`] and `checksum`
//! its lowercase hex SHA-256. `schema` is the raw feature order the encoder
//! was fitted on; loading refuses a file whose schema differs from
//! [`FEATURE_NAMES`].

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::metrics::EvaluationReport;
use super::trainer::LeaderboardEntry;
use super::{Classifier, ColumnImputer, FeatureEncoder, FittedModel};
use crate::domain::{EncodingError, PatientRecord, FEATURE_NAMES};

const MAGIC: &[u8; 8] = b"HDPMODEL";

/// Bumped whenever the payload layout changes.
pub const FORMAT_VERSION: u32 = 2;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactLoadError {
    #[error("Model artifact not found: {0}")]
    Missing(PathBuf),

    #[error("Failed to read model artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model artifact is corrupt: {0}")]
    Corrupt(String),

    #[error("Model artifact is incompatible: {0}")]
    Incompatible(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactSaveError {
    #[error("Failed to write model artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize model artifact: {0}")]
    Serialization(String),
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    version: u32,
    schema: Vec<String>,
    checksum: String,
    payload: Vec<u8>,
}

/// Facts about the training run, stored next to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    /// Roster name of the winning candidate
    pub model_name: String,
    /// Held-out ROC AUC of the winner
    pub best_auc: f64,
    /// Every candidate in roster order
    pub leaderboard: Vec<LeaderboardEntry>,
    /// Winner's held-out report at the 0.5 cut
    pub evaluation: EvaluationReport,
    pub n_train: usize,
    pub n_test: usize,
    /// Identifiers of the held-out rows
    pub held_out_ids: Vec<i64>,
    pub seed: u64,
    pub trained_at: chrono::DateTime<chrono::Utc>,
    pub feature_schema: Vec<String>,
    /// Fill values learned for empty training cells
    pub imputer: ColumnImputer,
}

/// Immutable {encoder, classifier} bundle.
///
/// Every method takes `&self`; share one instance across threads via `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringArtifact {
    encoder: FeatureEncoder,
    model: FittedModel,
    metadata: TrainingMetadata,
    /// Encoded training rows used as the explainer baseline.
    background: Array2<f64>,
}

impl ScoringArtifact {
    #[must_use]
    pub fn new(
        encoder: FeatureEncoder,
        model: FittedModel,
        metadata: TrainingMetadata,
        background: Array2<f64>,
    ) -> Self {
        Self {
            encoder,
            model,
            metadata,
            background,
        }
    }

    /// Positive-class probability for one raw record.
    ///
    /// # Errors
    /// Propagates `EncodingError` from the encoder.
    pub fn predict(&self, record: &PatientRecord) -> Result<f64, EncodingError> {
        let features = self.encoder.transform(record)?;
        Ok(self.predict_encoded(features.view()))
    }

    /// Positive-class probability for an already encoded vector.
    #[must_use]
    pub fn predict_encoded(&self, features: ArrayView1<'_, f64>) -> f64 {
        self.model.predict_proba(features).clamp(0.0, 1.0)
    }

    #[must_use]
    pub fn encoder(&self) -> &FeatureEncoder {
        &self.encoder
    }

    #[must_use]
    pub fn model(&self) -> &FittedModel {
        &self.model
    }

    #[must_use]
    pub fn metadata(&self) -> &TrainingMetadata {
        &self.metadata
    }

    #[must_use]
    pub fn background(&self) -> ArrayView2<'_, f64> {
        self.background.view()
    }

    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.metadata.model_name
    }

    #[must_use]
    pub fn best_auc(&self) -> f64 {
        self.metadata.best_auc
    }

    /// Write the artifact to `path`.
    ///
    /// The bytes go to a sibling temp file which is then renamed over `path`,
    /// so readers never observe a partial file.
    ///
    /// # Errors
    /// Returns `ArtifactSaveError` on serialization or I/O failure.
    pub fn save(&self, path: &Path) -> Result<(), ArtifactSaveError> {
        let payload =
            bincode::serialize(self).map_err(|e| ArtifactSaveError::Serialization(e.to_string()))?;
        let schema = FEATURE_NAMES.iter().map(|s| (*s).to_string()).collect();
        write_envelope(path, schema, payload)?;

        tracing::info!(
            "Saved model artifact to {:?} (model={}, auc={:.4})",
            path,
            self.metadata.model_name,
            self.metadata.best_auc
        );
        Ok(())
    }

    /// Read and verify an artifact.
    ///
    /// # Errors
    /// - `Missing` if there is no file at `path`
    /// - `Corrupt` for a bad header, checksum or payload
    /// - `Incompatible` for a different format version or feature schema, or
    ///   an encoder whose width does not match the classifier
    pub fn load(path: &Path) -> Result<Self, ArtifactLoadError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ArtifactLoadError::Missing(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };

        let body = bytes
            .strip_prefix(MAGIC.as_slice())
            .ok_or_else(|| ArtifactLoadError::Corrupt("missing file header".into()))?;
        let envelope: Envelope = bincode::deserialize(body)
            .map_err(|e| ArtifactLoadError::Corrupt(format!("unreadable envelope: {e}")))?;

        if envelope.version != FORMAT_VERSION {
            return Err(ArtifactLoadError::Incompatible(format!(
                "format version {} (expected {FORMAT_VERSION})",
                envelope.version
            )));
        }
        if envelope.schema.len() != FEATURE_NAMES.len()
            || envelope.schema.iter().zip(FEATURE_NAMES).any(|(a, b)| a != b)
        {
            return Err(ArtifactLoadError::Incompatible(format!(
                "feature schema {:?} does not match {:?}",
                envelope.schema, FEATURE_NAMES
            )));
        }
        if checksum(&envelope.payload) != envelope.checksum {
            return Err(ArtifactLoadError::Corrupt("checksum mismatch".into()));
        }

        let artifact: Self = bincode::deserialize(&envelope.payload)
            .map_err(|e| ArtifactLoadError::Corrupt(format!("unreadable payload: {e}")))?;
        artifact.check_shapes()?;

        tracing::info!(
            "Loaded model artifact from {:?} (model={}, auc={:.4}, n_features={})",
            path,
            artifact.metadata.model_name,
            artifact.metadata.best_auc,
            artifact.encoder.n_outputs()
        );
        Ok(artifact)
    }

    fn check_shapes(&self) -> Result<(), ArtifactLoadError> {
        if self.encoder.n_inputs() != FEATURE_NAMES.len() {
            return Err(ArtifactLoadError::Incompatible(format!(
                "encoder expects {} raw fields, got {}",
                self.encoder.n_inputs(),
                FEATURE_NAMES.len()
            )));
        }
        let width = self.encoder.n_outputs();
        if self.model.n_features() != width {
            return Err(ArtifactLoadError::Incompatible(format!(
                "encoder emits {width} features but classifier expects {}",
                self.model.n_features()
            )));
        }
        if self.background.ncols() != width {
            return Err(ArtifactLoadError::Incompatible(
                "background sample width does not match encoder".into(),
            ));
        }
        Ok(())
    }
}

fn checksum(payload: &[u8]) -> String {
    format!("{:x}", Sha256::digest(payload))
}

fn write_envelope(
    path: &Path,
    schema: Vec<String>,
    payload: Vec<u8>,
) -> Result<(), ArtifactSaveError> {
    let envelope = Envelope {
        version: FORMAT_VERSION,
        schema,
        checksum: checksum(&payload),
        payload,
    };
    let body = bincode::serialize(&envelope)
        .map_err(|e| ArtifactSaveError::Serialization(e.to_string()))?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(MAGIC)?;
        file.write_all(&body)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result.map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ndarray::Array1;

    use super::*;
    use crate::domain::LabeledRecord;
    use crate::ml::synthetic::generate_cohort;
    use crate::ml::{LogisticModel, LogisticParams, ModelTrainer, TrainerConfig};
    use crate::ml::{Candidate, CandidateSpec};

    fn small_artifact() -> ScoringArtifact {
        let cohort: Vec<LabeledRecord> = generate_cohort(80, 3);
        let config = TrainerConfig {
            roster: vec![Candidate::new(
                "log_reg",
                CandidateSpec::Logistic(LogisticParams::default()),
            )],
            ..TrainerConfig::default()
        };
        ModelTrainer::new(config)
            .train(&cohort)
            .expect("train")
            .artifact
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("best_model.bin");
        let artifact = small_artifact();
        artifact.save(&path).expect("save");

        let loaded = ScoringArtifact::load(&path).expect("load");
        assert_eq!(loaded, artifact);
        for labeled in generate_cohort(20, 99) {
            let record = labeled.record().expect("complete row");
            assert_eq!(
                loaded.predict(&record).expect("predict"),
                artifact.predict(&record).expect("predict")
            );
        }
        assert!(!dir.path().join("nested").join(".best_model.bin.tmp").exists());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = ScoringArtifact::load(&dir.path().join("nope.bin"));
        assert!(matches!(result, Err(ArtifactLoadError::Missing(_))));
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("model.bin");

        fs::write(&path, b"definitely not a model").expect("write");
        assert!(matches!(
            ScoringArtifact::load(&path),
            Err(ArtifactLoadError::Corrupt(_))
        ));

        small_artifact().save(&path).expect("save");
        let mut bytes = fs::read(&path).expect("read");
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, &bytes).expect("write");
        assert!(matches!(
            ScoringArtifact::load(&path),
            Err(ArtifactLoadError::Corrupt(_))
        ));
    }

    #[test]
    fn test_schema_mismatch_is_incompatible() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("model.bin");
        let payload = bincode::serialize(&small_artifact()).expect("serialize");

        let mut schema: Vec<String> = FEATURE_NAMES.iter().map(|s| (*s).to_string()).collect();
        schema.swap(0, 1);
        write_envelope(&path, schema, payload.clone()).expect("write");
        assert!(matches!(
            ScoringArtifact::load(&path),
            Err(ArtifactLoadError::Incompatible(_))
        ));

        let short: Vec<String> = FEATURE_NAMES[..12].iter().map(|s| (*s).to_string()).collect();
        write_envelope(&path, short, payload).expect("write");
        assert!(matches!(
            ScoringArtifact::load(&path),
            Err(ArtifactLoadError::Incompatible(_))
        ));
    }

    #[test]
    fn test_width_mismatch_is_incompatible() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("model.bin");
        let mut artifact = small_artifact();
        artifact.model = FittedModel::Logistic(LogisticModel {
            weights: Array1::zeros(3),
            intercept: 0.0,
        });
        artifact.save(&path).expect("save");
        assert!(matches!(
            ScoringArtifact::load(&path),
            Err(ArtifactLoadError::Incompatible(_))
        ));
    }

    #[test]
    fn test_concurrent_predict_is_idempotent() {
        let artifact = Arc::new(small_artifact());
        let patient = generate_cohort(1, 11)[0].record().expect("complete row");
        let expected = artifact.predict(&patient).expect("predict");
        assert!((0.0..=1.0).contains(&expected));

        std::thread::scope(|s| {
            for _ in 0..4 {
                let artifact = Arc::clone(&artifact);
                s.spawn(move || {
                    for _ in 0..50 {
                        assert_eq!(artifact.predict(&patient).expect("predict"), expected);
                    }
                });
            }
        });
    }
}
