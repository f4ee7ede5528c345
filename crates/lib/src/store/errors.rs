//! Error types for the document store interface.

use thiserror::Error;

/// Errors surfaced by [`DocumentStore`](super::DocumentStore)
/// implementations.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum StoreError {
    /// Document not found by id.
    #[error("Document not found: {id}")]
    NotFound { id: String },

    /// Revision tag did not match the stored document.
    #[error("Document update conflict: {id}")]
    Conflict { id: String },

    /// Query referenced a design document or view that does not exist.
    #[error("Unknown view: {view}")]
    ViewNotFound { view: String },

    /// Adapter-specific failure (connection, protocol, corruption).
    #[error("Document store failure: {reason}")]
    Backend { reason: String },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// HTTP status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            StoreError::NotFound { .. } | StoreError::ViewNotFound { .. } => 404,
            StoreError::Conflict { .. } => 409,
            StoreError::Backend { .. } => 500,
        }
    }
}
