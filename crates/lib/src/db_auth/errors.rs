//! Error types for per-user database provisioning and the DB auth store.

use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DbAuthError {
    #[error("Database not found: {name}")]
    DatabaseNotFound { name: String },

    #[error("Auth key not found: {key}")]
    KeyNotFound { key: String },

    /// Server-specific failure (connection, protocol).
    #[error("Database server failure: {reason}")]
    Backend { reason: String },
}

impl DbAuthError {
    pub fn backend(reason: impl Into<String>) -> Self {
        DbAuthError::Backend {
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DbAuthError::DatabaseNotFound { .. } | DbAuthError::KeyNotFound { .. }
        )
    }

    /// HTTP status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            DbAuthError::DatabaseNotFound { .. } | DbAuthError::KeyNotFound { .. } => 404,
            DbAuthError::Backend { .. } => 500,
        }
    }
}
