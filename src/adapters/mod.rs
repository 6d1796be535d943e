//! Adapters layer: Concrete implementations of ports.
//!
//! - `sqlite`: SQLite prediction log and training table
//! - `shapley`: sampling Shapley explainer

pub mod shapley;
pub mod sqlite;

// Re-export storage error for lib.rs
pub use sqlite::StorageError;
