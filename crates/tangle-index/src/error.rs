//! Index error types

use crate::op::DocumentId;
use thiserror::Error;

/// Result type alias for index operations
pub type IndexResult<T> = std::result::Result<T, IndexError>;

/// One document that could not be indexed after retries were exhausted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFailure {
    pub document_id: DocumentId,
    pub reason: String,
}

/// Index-specific error types.
///
/// Indexing failures are isolated per document and never fail the entity or
/// edge write that produced them; the index is a derived, best-effort view.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Partial batch failure: {} document(s) rejected", failures.len())]
    PartialBatchFailure { failures: Vec<IndexFailure> },

    #[error("Gateway timeout: {} document(s) affected", document_ids.len())]
    GatewayTimeout { document_ids: Vec<DocumentId> },

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}
