//! Inference service: Orchestrates scoring of one patient record.
//!
//! This service coordinates:
//! - Encoding and scoring with the loaded artifact
//! - Risk tiering
//! - Rule-based recommendations
//! - Appending the prediction to the log

use std::sync::Arc;

use crate::adapters::StorageError;
use crate::domain::{PatientRecord, PredictionRecord, RecommendationEngine, RiskThresholds};
use crate::ml::ScoringArtifact;
use crate::ports::{Explainer, Explanation, LogAppendError, PredictionLog, PredictionPage};
use crate::HdpError;

/// Result of one inference request.
#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    /// The logged (or attempted) prediction
    pub prediction: PredictionRecord,
    /// Ordered advisory strings
    pub recommendations: Vec<String>,
    /// Set when the prediction could not be appended to the log
    pub log_error: Option<LogAppendError>,
}

/// Service for scoring patient records against a loaded artifact.
///
/// The artifact is shared read-only; any number of requests may run
/// concurrently through one service.
pub struct InferenceService<L>
where
    L: PredictionLog,
{
    artifact: Arc<ScoringArtifact>,
    log: Arc<L>,
    thresholds: RiskThresholds,
    engine: RecommendationEngine,
}

impl<L> InferenceService<L>
where
    L: PredictionLog,
{
    /// Create a service with the default thresholds and rule table.
    pub fn new(artifact: Arc<ScoringArtifact>, log: Arc<L>) -> Self {
        Self {
            artifact,
            log,
            thresholds: RiskThresholds::default(),
            engine: RecommendationEngine::default(),
        }
    }

    #[must_use]
    pub fn with_thresholds(mut self, thresholds: RiskThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    #[must_use]
    pub fn with_engine(mut self, engine: RecommendationEngine) -> Self {
        self.engine = engine;
        self
    }

    #[must_use]
    pub fn artifact(&self) -> &ScoringArtifact {
        &self.artifact
    }

    /// Score one record.
    ///
    /// Performs the full pipeline:
    /// 1. Encode and predict
    /// 2. Classify the probability into a tier
    /// 3. Build recommendations
    /// 4. Append to the prediction log
    ///
    /// A failed append is logged and reported in `log_error`; it never
    /// prevents the assessment from being returned.
    ///
    /// # Errors
    /// Returns `HdpError::Encoding` if the record cannot be encoded.
    pub fn run_inference(&self, record: PatientRecord) -> Result<Assessment, HdpError> {
        tracing::debug!("Step 1: Scoring record with {}", self.artifact.model_name());
        let probability = self.artifact.predict(&record)?;

        tracing::debug!("Step 2: Classifying probability");
        let risk_level = self.thresholds.classify(probability);

        tracing::debug!("Step 3: Building recommendations");
        let recommendations = self.engine.recommend(&record, risk_level);

        let prediction = PredictionRecord::new(record, risk_level, probability);

        tracing::debug!("Step 4: Appending prediction to log");
        let log_error = match self.log.append(&prediction) {
            Ok(()) => None,
            Err(e) => {
                tracing::warn!("Failed to log prediction {}: {}", prediction.id, e);
                Some(LogAppendError {
                    id: prediction.id.clone(),
                    reason: e.to_string(),
                })
            }
        };

        tracing::info!(
            "Inference complete: probability={:.3}, risk={}, recommendations={}",
            probability,
            risk_level,
            recommendations.len()
        );

        Ok(Assessment {
            prediction,
            recommendations,
            log_error,
        })
    }

    /// Attributions for one record against the artifact's background sample.
    ///
    /// # Errors
    /// Returns error if the record cannot be encoded or explained.
    pub fn explain<E: Explainer>(
        &self,
        explainer: &E,
        record: &PatientRecord,
    ) -> Result<Explanation, HdpError> {
        let features = self.artifact.encoder().transform(record)?;
        Ok(explainer.explain(&self.artifact, features.view())?)
    }
}

impl<L> InferenceService<L>
where
    L: PredictionLog,
    L::Error: Into<StorageError>,
{
    /// Logged predictions, newest first.
    ///
    /// # Errors
    /// Returns error if the log cannot be read.
    pub fn history(&self, offset: usize, limit: usize) -> Result<PredictionPage, HdpError> {
        self.log
            .load_paginated(offset, limit)
            .map_err(|e| HdpError::Storage(e.into()))
    }

    /// Number of logged predictions.
    ///
    /// # Errors
    /// Returns error if the log cannot be read.
    pub fn logged_count(&self) -> Result<usize, HdpError> {
        self.log.count().map_err(|e| HdpError::Storage(e.into()))
    }
}
