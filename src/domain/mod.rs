//! Domain layer: Core clinical types and rules.
//!
//! Pure Rust types with no I/O. Everything here is deterministic and
//! serializable.

mod diagnosis;
mod patient;
mod recommendation;

pub use diagnosis::{classify, PredictionRecord, RiskLevel, RiskThresholds};
pub use patient::{
    compute_age_band, AgeBand, ClinicalField, EncodingError, LabeledRecord, PatientRecord,
    FEATURE_NAMES,
};
pub use recommendation::{
    default_rules, Direction, RecommendationEngine, Rule, HIGH_RISK_ADVISORY, NO_ABNORMALITIES,
};
