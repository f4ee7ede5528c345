//! Constants used throughout the Warden library.
//!
//! Central definitions for reserved document fields, view names, and
//! store key prefixes.

/// Document type discriminator value for user documents.
pub const USER_TYPE: &str = "user";

/// Serialized name of the document type field.
pub const TYPE_FIELD: &str = "type";

/// Provider name for password-based accounts.
pub const LOCAL_PROVIDER: &str = "local";

/// Design document holding the authentication views.
pub const AUTH_DESIGN_DOC: &str = "auth";

/// View resolving a session key to its user document.
pub const SESSION_VIEW: &str = "session";

/// View resolving a hashed forgot-password token to its user document.
pub const PASSWORD_RESET_VIEW: &str = "passwordReset";

/// View resolving an email-confirmation token to its user document.
pub const VERIFY_EMAIL_VIEW: &str = "verifyEmail";

/// View indexing the email field when `local.email_username` is set.
pub const EMAIL_USERNAME_VIEW: &str = "emailUsername";

/// Session-store key prefix for invite codes.
pub const INVITE_CODE_PREFIX: &str = "invite_code:";

/// Bounded retry count for optimistic-concurrency conflicts on user
/// document writes.
pub const WRITE_RETRIES: usize = 3;
