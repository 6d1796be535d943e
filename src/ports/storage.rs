//! Storage ports: the append-only prediction log and the labeled training
//! table.
//!
//! These traits abstract the storage backend (SQLite) from the application
//! logic.

use crate::domain::{LabeledRecord, PredictionRecord};

/// A page of logged predictions with pagination metadata.
#[derive(Debug, Clone)]
pub struct PredictionPage {
    /// Predictions in this page, newest first
    pub items: Vec<PredictionRecord>,
    /// Total count of all logged predictions
    pub total_count: usize,
    /// Current page offset
    pub offset: usize,
    /// Page size limit
    pub limit: usize,
    /// Whether there are more pages
    pub has_more: bool,
}

impl PredictionPage {
    #[must_use]
    pub fn new(
        items: Vec<PredictionRecord>,
        total_count: usize,
        offset: usize,
        limit: usize,
    ) -> Self {
        let has_more = offset + items.len() < total_count;
        Self {
            items,
            total_count,
            offset,
            limit,
            has_more,
        }
    }

    /// Get the next page offset.
    #[must_use]
    pub fn next_offset(&self) -> Option<usize> {
        if self.has_more {
            Some(self.offset + self.limit)
        } else {
            None
        }
    }

    /// Get the previous page offset.
    #[must_use]
    pub fn prev_offset(&self) -> Option<usize> {
        if self.offset > 0 {
            Some(self.offset.saturating_sub(self.limit))
        } else {
            None
        }
    }
}

/// A prediction that could not be written to the log.
///
/// Reported to the caller alongside the assessment; never fatal.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed to log prediction {id}: {reason}")]
pub struct LogAppendError {
    pub id: String,
    pub reason: String,
}

/// Append-only sink of scored predictions.
///
/// Records are never updated or deleted through this trait.
pub trait PredictionLog: Send + Sync {
    /// Error type for log operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Append one prediction.
    ///
    /// # Errors
    /// Returns error if the write fails.
    fn append(&self, record: &PredictionRecord) -> Result<(), Self::Error>;

    /// Load up to `limit` predictions, newest first.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn load_recent(&self, limit: usize) -> Result<Vec<PredictionRecord>, Self::Error>;

    /// Load predictions with pagination, newest first.
    ///
    /// # Arguments
    /// * `offset` - Starting position (0-indexed)
    /// * `limit` - Maximum number of items to return
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn load_paginated(&self, offset: usize, limit: usize)
        -> Result<PredictionPage, Self::Error>;

    /// Get the total count of logged predictions.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn count(&self) -> Result<usize, Self::Error>;
}

/// Source of labeled rows for training.
pub trait TrainingSource: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load every labeled row, ordered by id.
    ///
    /// Implementations validate the source schema first and fail naming any
    /// missing column.
    ///
    /// # Errors
    /// Returns error if the schema is invalid or the read fails.
    fn load_labeled_records(&self) -> Result<Vec<LabeledRecord>, Self::Error>;
}
