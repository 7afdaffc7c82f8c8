//! Store error types

use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Store-specific error types
///
/// Losing the last-writer-wins race is not an error; it surfaces as
/// [`crate::WriteOutcome::Superseded`].
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Edge not found: {0}")]
    EdgeNotFound(String),

    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    #[error("Validation error: {0}")]
    Validation(#[from] tangle_core::limits::ValidationError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
