//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement
//! the core use cases of the application.

mod inference;
mod training;

pub use inference::{Assessment, InferenceService};
pub use training::TrainingService;
