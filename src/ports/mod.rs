//! Ports layer: Trait definitions for external operations.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the application and external systems (storage, explainers).

mod explainer;
mod storage;

pub use explainer::{Attribution, ExplainError, Explainer, Explanation};
pub use storage::{LogAppendError, PredictionLog, PredictionPage, TrainingSource};
