//! Authentication strategies.
//!
//! Thin adapters binding local (password) and bearer (token)
//! authentication to the user service. Authentication *state* — wrong
//! password, locked account, unconfirmed email — is expressed as a
//! rejected [`AuthOutcome`], not an `Err`; errors are reserved for
//! infrastructure failures.

use crate::{
    Result,
    constants::LOCAL_PROVIDER,
    session::SessionView,
    user::{RequestInfo, UserDoc, UserService, errors::UserError},
    util,
};

/// A rejected authentication attempt.
#[derive(Debug, Clone)]
pub struct AuthFailure {
    pub key: String,
    pub message: String,
    pub locked: bool,
}

impl From<UserError> for AuthFailure {
    fn from(error: UserError) -> Self {
        Self {
            key: error.key(),
            message: error.to_string(),
            locked: error.is_locked(),
        }
    }
}

/// Outcome of a local (password) authentication attempt.
#[derive(Debug)]
pub enum AuthOutcome {
    Authenticated(Box<UserDoc>),
    Rejected(AuthFailure),
}

/// Outcome of a bearer (token) authentication attempt.
#[derive(Debug)]
pub enum BearerOutcome {
    Authenticated(SessionView),
    Rejected(AuthFailure),
}

/// Authenticate a `"<key>:<password>"` bearer credential.
pub async fn bearer(service: &UserService, credentials: &str) -> Result<BearerOutcome> {
    let Some((key, password)) = credentials.split_once(':') else {
        return Ok(BearerOutcome::Rejected(AuthFailure {
            key: "invalid_token".to_string(),
            message: "invalid token".to_string(),
            locked: false,
        }));
    };

    match service.confirm_session(key, password).await {
        Ok(view) => Ok(BearerOutcome::Authenticated(view)),
        Err(e) if e.is_unauthorized() => Ok(BearerOutcome::Rejected(AuthFailure {
            key: e.key(),
            message: e.to_string(),
            locked: false,
        })),
        Err(e) => Err(e),
    }
}

/// Authenticate a login/password pair against the local provider.
pub async fn local(
    service: &UserService,
    login: &str,
    password: &str,
    req: &RequestInfo,
) -> Result<AuthOutcome> {
    let rejected = |error: UserError| Ok(AuthOutcome::Rejected(error.into()));

    let Some(user) = service.get(login).await? else {
        return rejected(UserError::FailedLogin);
    };

    let config = service.config();
    let now = service.clock().now_millis();

    if let Some(local_auth) = &user.local {
        if local_auth.locked_until.is_some_and(|until| until > now) {
            if !config.security.soft_lock {
                return rejected(UserError::SoftLocked);
            }
            if !req.captcha_passed {
                return rejected(UserError::MissingCaptcha);
            }
        }
    }

    let Some(local_auth) = &user.local else {
        return rejected(UserError::FailedLogin);
    };
    if local_auth.derived_key.is_empty() {
        return rejected(UserError::FailedLogin);
    }

    match util::verify_password(password, &local_auth.derived_key) {
        Ok(()) => {
            if config.local.require_email_confirm && user.email.is_none() {
                return rejected(UserError::EmailUnconfirmed);
            }
            tracing::debug!(user_id = %user.id, provider = LOCAL_PROVIDER, "authenticated");
            Ok(AuthOutcome::Authenticated(Box::new(user)))
        }
        Err(_) => {
            let locked = service.handle_failed_login(&user.id, req).await?;
            if locked {
                rejected(UserError::Locked {
                    lockout_seconds: config.security.lockout_time,
                })
            } else {
                rejected(UserError::FailedLogin)
            }
        }
    }
}
