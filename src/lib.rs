//! # HDP
//!
//! Heart disease risk prediction: offline model selection over tabular
//! clinical features, and online scoring of one patient record into a risk
//! tier with rule-based recommendations.
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core clinical types, risk tiers and recommendation rules
//! - `ml`: Feature encoder, candidate classifiers, trainer and artifact
//! - `ports`: Trait definitions for storage and explainers
//! - `adapters`: Concrete implementations (SQLite, sampling Shapley)
//! - `application`: Use cases orchestrating domain, model and ports
//! - `config`: Environment-driven runtime settings

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ml;
pub mod ports;

pub use domain::{PatientRecord, PredictionRecord, RiskLevel};
pub use ml::ScoringArtifact;

/// Result type for HDP operations
pub type Result<T> = std::result::Result<T, HdpError>;

/// Main error type for HDP
#[derive(Debug, thiserror::Error)]
pub enum HdpError {
    #[error("Encoding failed: {0}")]
    Encoding(#[from] domain::EncodingError),

    #[error("Training failed: {0}")]
    Training(#[from] ml::TrainingError),

    #[error("Could not load model: {0}")]
    ArtifactLoad(#[from] ml::ArtifactLoadError),

    #[error("Could not save model: {0}")]
    ArtifactSave(#[from] ml::ArtifactSaveError),

    #[error("Storage operation failed: {0}")]
    Storage(#[from] adapters::StorageError),

    #[error("Explanation failed: {0}")]
    Explain(#[from] ports::ExplainError),

    #[error("Invalid patient data: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
