//! Warden: a user & session core for document stores with per-user
//! databases.
//!
//! ## Core concepts
//!
//! * **User documents (`user::UserDoc`)**: one document per account,
//!   mutated under optimistic concurrency through a pluggable
//!   [`store::DocumentStore`].
//! * **Sessions (`session::SessionStore`)**: token records and
//!   short-lived named keys in a pluggable KV (memory, file, Redis).
//! * **Per-user databases (`db_auth::DbAuth`)**: provisioning,
//!   security documents, and per-session credentials in the backing
//!   database's own auth store.
//! * **The service (`user::UserService`)**: orchestrates account
//!   lifecycle, credential validation, session issuance/revocation,
//!   and activity auditing over the three stores.
//! * **Strategies (`strategies`)**: thin adapters binding local and
//!   bearer authentication to the service.
//!
//! HTTP routing, OAuth handshakes, SMTP delivery, and configuration
//! loading are external collaborators consumed behind small traits.

pub mod clock;
pub mod config;
pub mod constants;
pub mod db_auth;
pub mod design_docs;
pub mod events;
pub mod mailer;
pub mod session;
pub mod store;
pub mod strategies;
pub mod user;
pub mod util;
pub mod validate;

pub use clock::{Clock, SystemClock};
#[cfg(any(test, feature = "testing"))]
pub use clock::FixedClock;
pub use config::Config;
pub use user::UserService;

use serde::Serialize;

/// Result type used throughout the Warden library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Warden library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Structured errors from the user service
    #[error(transparent)]
    User(#[from] user::errors::UserError),

    /// Structured errors from the session store
    #[error(transparent)]
    Session(#[from] session::SessionError),

    /// Structured errors from DB provisioning and the DB auth store
    #[error(transparent)]
    DbAuth(#[from] db_auth::DbAuthError),

    /// Structured errors from the document store
    #[error(transparent)]
    Store(#[from] store::StoreError),

    /// Validation failures with per-field messages
    #[error(transparent)]
    Validation(#[from] validate::ValidationError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

/// Wire shape of an error response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub key: String,
    pub message: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_errors: Option<std::collections::BTreeMap<String, Vec<String>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked: Option<bool>,
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        409 => "Conflict",
        _ => "Internal Server Error",
    }
}

impl Error {
    /// Stable wire key for this error.
    pub fn key(&self) -> String {
        match self {
            Error::User(e) => e.key(),
            Error::Session(e) => match e {
                session::SessionError::Unauthorized => "unauthorized".to_string(),
                session::SessionError::NotFound { .. } => "invalid_token".to_string(),
                session::SessionError::Backend { .. } => "internal_error".to_string(),
            },
            Error::Validation(e) => e.key().to_string(),
            Error::Store(store::StoreError::NotFound { .. }) => "not_found".to_string(),
            Error::Store(store::StoreError::Conflict { .. }) => "conflict".to_string(),
            _ => "internal_error".to_string(),
        }
    }

    /// HTTP status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            Error::User(e) => e.status(),
            Error::Session(e) => e.status(),
            Error::DbAuth(e) => e.status(),
            Error::Store(e) => e.status(),
            Error::Validation(e) => e.status(),
            Error::Io(_) | Error::Serialize(_) | Error::InvalidOperation(_) => 500,
        }
    }

    /// The serializable error body:
    /// `{error, key, message, status, validationErrors?, locked?}`.
    pub fn to_body(&self) -> ErrorBody {
        let status = self.status();
        ErrorBody {
            error: reason_phrase(status).to_string(),
            key: self.key(),
            message: self.to_string(),
            status,
            validation_errors: match self {
                Error::Validation(e) => Some(e.errors.clone()),
                _ => None,
            },
            locked: match self {
                Error::User(e) if e.is_locked() => Some(true),
                _ => None,
            },
        }
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::User(e) => e.is_not_found(),
            Error::Session(e) => e.is_not_found(),
            Error::DbAuth(e) => e.is_not_found(),
            Error::Store(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error indicates failed authentication.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == 401
    }

    /// Check if this error indicates a conflict (revision mismatch or
    /// an identity already in use).
    pub fn is_conflict(&self) -> bool {
        self.status() == 409
    }
}
