//! Error types for the user system
//!
//! Every public operation rejects with one of these variants; `key()`
//! and `status()` expose the stable wire identifiers existing clients
//! match on, while the Display impl carries the human message.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UserError {
    #[error("Invalid username or password")]
    FailedLogin,

    #[error("Account is temporarily locked")]
    SoftLocked,

    #[error("Captcha required while the account is locked")]
    MissingCaptcha,

    #[error("You must confirm your email address before logging in")]
    EmailUnconfirmed,

    #[error("Maximum failed login attempts exceeded. Your account has been locked for {lockout_seconds} seconds")]
    Locked { lockout_seconds: u64 },

    #[error("This {provider} account is already linked to another user")]
    ProviderInUse { provider: String },

    #[error("Another {provider} account is already linked to this user")]
    ProviderConflict { provider: String },

    #[error("Email address is already in use")]
    EmailInUse,

    #[error("The email address on this account is already in use by another user")]
    EmailInUseLink,

    #[error("Registration requires a valid invite code")]
    MissingInviteCode,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Invalid email verification token")]
    InvalidVerifyToken,

    #[error("You must supply your current password in order to change it")]
    MissingCurrentPassword,

    #[error("The current password you supplied is incorrect")]
    InvalidCurrentPassword,

    #[error("You cannot set your only login credential to null!")]
    OnlyLoginCredential,

    #[error("Password has not been set on this account")]
    PasswordNotSet,

    #[error("You can't unlink your only provider!")]
    UnlinkOnlyProvider,

    #[error("You can't unlink local login")]
    UnlinkLocal,

    #[error("You must specify a provider to unlink")]
    MissingProviderToUnlink,

    #[error("User not found: {login}")]
    UsernameNotFound { login: String },

    #[error("Provider not found: {provider}")]
    ProviderNotFound { provider: String },

    #[error("Password hashing failed: {reason}")]
    HashingFailed { reason: String },
}

impl UserError {
    /// Stable wire key for this error.
    ///
    /// `missing_current_passowrd` is misspelled on purpose: existing
    /// clients match on it.
    pub fn key(&self) -> String {
        match self {
            UserError::FailedLogin => "failed_login".into(),
            UserError::SoftLocked => "soft_locked".into(),
            UserError::MissingCaptcha => "missing_captcha".into(),
            UserError::EmailUnconfirmed => "email_unconfirmed".into(),
            UserError::Locked { .. } => "locked".into(),
            UserError::ProviderInUse { provider } => format!("inuse_{provider}"),
            UserError::ProviderConflict { provider } => format!("conflict_{provider}"),
            UserError::EmailInUse => "inuse_email".into(),
            UserError::EmailInUseLink => "inuse_email_link".into(),
            UserError::MissingInviteCode => "missing_invite_code".into(),
            UserError::InvalidToken => "invalid_token".into(),
            UserError::ExpiredToken => "expired_token".into(),
            UserError::InvalidVerifyToken => "invalidToken".into(),
            UserError::MissingCurrentPassword => "missing_current_passowrd".into(),
            UserError::InvalidCurrentPassword => "invalid_current_password".into(),
            UserError::OnlyLoginCredential => "only_login_credential".into(),
            UserError::PasswordNotSet => "password_not_set".into(),
            UserError::UnlinkOnlyProvider => "unlink_only_provider".into(),
            UserError::UnlinkLocal => "unlink_local".into(),
            UserError::MissingProviderToUnlink => "missing_provider_to_unlink".into(),
            UserError::UsernameNotFound { .. } => "username_not_found".into(),
            UserError::ProviderNotFound { .. } => "provider_not_found".into(),
            UserError::HashingFailed { .. } => "internal_error".into(),
        }
    }

    /// HTTP status code for this error.
    pub fn status(&self) -> u16 {
        match self {
            UserError::FailedLogin
            | UserError::SoftLocked
            | UserError::MissingCaptcha
            | UserError::EmailUnconfirmed
            | UserError::Locked { .. } => 401,
            UserError::ProviderInUse { .. }
            | UserError::ProviderConflict { .. }
            | UserError::EmailInUse
            | UserError::EmailInUseLink => 409,
            UserError::UsernameNotFound { .. } | UserError::ProviderNotFound { .. } => 404,
            UserError::HashingFailed { .. } => 500,
            _ => 400,
        }
    }

    /// Whether the account is locked out (surfaces as `locked` in the
    /// wire error body).
    pub fn is_locked(&self) -> bool {
        matches!(self, UserError::Locked { .. } | UserError::SoftLocked)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            UserError::UsernameNotFound { .. } | UserError::ProviderNotFound { .. }
        )
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == 401
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == 409
    }
}
