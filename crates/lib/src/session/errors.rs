//! Error types for the session store.

use thiserror::Error;

#[non_exhaustive]
#[derive(Debug, Error)]
pub enum SessionError {
    /// Token missing, expired, or password mismatch.
    #[error("Unauthorized")]
    Unauthorized,

    /// No token stored under the given key.
    #[error("Session token not found: {key}")]
    NotFound { key: String },

    /// Adapter-specific failure (I/O, connection, corruption).
    #[error("Session store failure: {reason}")]
    Backend { reason: String },
}

impl SessionError {
    pub fn backend(reason: impl Into<String>) -> Self {
        SessionError::Backend {
            reason: reason.into(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, SessionError::Unauthorized)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::NotFound { .. })
    }

    /// HTTP status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            SessionError::Unauthorized => 401,
            SessionError::NotFound { .. } => 404,
            SessionError::Backend { .. } => 500,
        }
    }
}
