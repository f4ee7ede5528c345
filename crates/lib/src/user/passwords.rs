//! Password reset flows, credential changes, and identity updates.

use serde_json::{Map, Value, json};
use tracing::info;

use super::{
    UserService,
    errors::UserError,
    sessions::LogoutOp,
    types::{ForgotPassword, LocalAuth, RequestInfo, UnverifiedEmail, UserDoc},
};
use crate::{
    Result,
    constants::{AUTH_DESIGN_DOC, LOCAL_PROVIDER, PASSWORD_RESET_VIEW, VERIFY_EMAIL_VIEW},
    events::AuthEvent,
    util,
    validate::{NoCustomValidators, Rule, Schema, ValidationError},
};

fn password_rules(schema: &mut Schema, field: &str) {
    schema.rule(field, Rule::Presence);
    schema.rule(
        field,
        Rule::Length {
            minimum: 6,
            message: None,
        },
    );
    schema.rule("confirmPassword", Rule::Presence);
    schema.rule(
        "confirmPassword",
        Rule::Matches {
            field: field.to_string(),
        },
    );
}

impl UserService {
    /// Issue a forgot-password token and mail it. Only the digest is
    /// persisted.
    pub async fn forgot_password(&self, email: &str, req: &RequestInfo) -> Result<()> {
        let user = self.require(email).await?;

        let token = util::url_safe_uuid();
        let hashed = util::hash_token(&token);
        let now = self.now();
        let expires = now + self.config().security.token_life * 1000;
        let ip = req.ip.clone();

        let doc = self
            .update_with_retry(&user.id, |doc| {
                doc.forgot_password = Some(ForgotPassword {
                    token: hashed.clone(),
                    issued: now,
                    expires,
                });
                self.push_activity(doc, "forgot password", LOCAL_PROVIDER, ip.as_deref());
                Ok(())
            })
            .await?;

        let to = doc
            .email
            .clone()
            .or_else(|| doc.unverified_email.as_ref().map(|u| u.email.clone()))
            .unwrap_or_else(|| email.to_string());
        self.mailer()
            .send_email(
                "forgotPassword",
                &to,
                &json!({"token": token, "user_id": doc.id}),
            )
            .await?;

        self.emit(AuthEvent::ForgotPassword {
            user_id: doc.id.clone(),
        });
        Ok(())
    }

    /// Redeem a forgot-password token: `{token, password,
    /// confirmPassword}`.
    ///
    /// Resetting a password proves control of the email account, so the
    /// `local` provider is (re-)enabled and every session is revoked.
    pub async fn reset_password(
        &self,
        form: Map<String, Value>,
        req: &RequestInfo,
    ) -> Result<UserDoc> {
        let mut schema = Schema::new();
        for field in ["token", "password", "confirmPassword"] {
            schema.whitelist_field(field);
        }
        schema.rule("token", Rule::Presence);
        password_rules(&mut schema, "password");
        let fields = schema.process(form, &NoCustomValidators).await?;

        let token = fields.get("token").and_then(Value::as_str).unwrap_or("");
        let password = fields.get("password").and_then(Value::as_str).unwrap_or("");

        let mut rows = self
            .store()
            .query_view(AUTH_DESIGN_DOC, PASSWORD_RESET_VIEW, &util::hash_token(token))
            .await?;
        let mut doc = rows.drain(..).next().ok_or(UserError::InvalidToken)?;

        let pending = doc
            .forgot_password
            .as_ref()
            .ok_or(UserError::InvalidToken)?;
        if pending.expires < self.now() {
            return Err(UserError::ExpiredToken.into());
        }

        let (derived_key, salt) = util::hash_password(password)?;

        self.logout_user_sessions(&mut doc, LogoutOp::All, None)
            .await?;

        let ip = req.ip.clone();
        let doc = self
            .update_with_retry(&doc.id, |doc| {
                match &mut doc.local {
                    Some(local) => {
                        local.salt = salt.clone();
                        local.derived_key = derived_key.clone();
                    }
                    None => {
                        doc.local = Some(LocalAuth {
                            salt: salt.clone(),
                            derived_key: derived_key.clone(),
                            failed_login_attempts: None,
                            locked_until: None,
                        });
                    }
                }
                doc.ensure_local_provider();
                doc.session.clear();
                doc.forgot_password = None;
                self.push_activity(doc, "reset password", LOCAL_PROVIDER, ip.as_deref());
                Ok(())
            })
            .await?;

        info!(user_id = %doc.id, "password reset");
        self.emit(AuthEvent::PasswordReset {
            user_id: doc.id.clone(),
        });
        Ok(doc)
    }

    /// Alternative reset flow for callers that verified the token
    /// elsewhere: `{username, password, confirmPassword}`.
    pub async fn reset_password2(
        &self,
        form: Map<String, Value>,
        req: &RequestInfo,
    ) -> Result<UserDoc> {
        let mut schema = Schema::new();
        for field in ["username", "password", "confirmPassword"] {
            schema.whitelist_field(field);
        }
        schema.rule("username", Rule::Presence);
        password_rules(&mut schema, "password");
        let fields = schema.process(form, &NoCustomValidators).await?;

        let username = fields.get("username").and_then(Value::as_str).unwrap_or("");
        let password = fields.get("password").and_then(Value::as_str).unwrap_or("");

        let user = self.require(username).await?;
        self.change_password(&user.id, password, req).await
    }

    /// Change the password of an authenticated user:
    /// `{currentPassword?, newPassword, confirmPassword}`.
    ///
    /// When a password is already set the current one is required and
    /// verified. Other sessions of the user are revoked afterwards.
    pub async fn change_password_secure(
        &self,
        user_id: &str,
        form: Map<String, Value>,
        req: &RequestInfo,
    ) -> Result<UserDoc> {
        let mut schema = Schema::new();
        for field in ["currentPassword", "newPassword", "confirmPassword"] {
            schema.whitelist_field(field);
        }
        password_rules(&mut schema, "newPassword");
        let fields = schema.process(form, &NoCustomValidators).await?;

        let doc = self.store().get(user_id).await?;
        if let Some(local) = &doc.local {
            let current = fields
                .get("currentPassword")
                .and_then(Value::as_str)
                .unwrap_or("");
            if current.is_empty() {
                return Err(UserError::MissingCurrentPassword.into());
            }
            util::verify_password(current, &local.derived_key)
                .map_err(|_| UserError::InvalidCurrentPassword)?;
        }

        let new_password = fields
            .get("newPassword")
            .and_then(Value::as_str)
            .unwrap_or("");
        let doc = self.change_password(user_id, new_password, req).await?;

        if let Some(key) = &req.session_key {
            self.logout_others(key).await?;
        }
        Ok(doc)
    }

    /// Overwrite the stored password hash and enable local login.
    pub async fn change_password(
        &self,
        user_id: &str,
        new_password: &str,
        req: &RequestInfo,
    ) -> Result<UserDoc> {
        let (derived_key, salt) = util::hash_password(new_password)?;
        let ip = req.ip.clone();

        let doc = self
            .update_with_retry(user_id, |doc| {
                match &mut doc.local {
                    Some(local) => {
                        local.salt = salt.clone();
                        local.derived_key = derived_key.clone();
                    }
                    None => {
                        doc.local = Some(LocalAuth {
                            salt: salt.clone(),
                            derived_key: derived_key.clone(),
                            failed_login_attempts: None,
                            locked_until: None,
                        });
                    }
                }
                doc.ensure_local_provider();
                self.push_activity(doc, "changed password", LOCAL_PROVIDER, ip.as_deref());
                Ok(())
            })
            .await?;

        self.emit(AuthEvent::PasswordChange {
            user_id: doc.id.clone(),
        });
        Ok(doc)
    }

    /// Redeem an email confirmation token, promoting the unverified
    /// address.
    pub async fn verify_email(&self, token: &str, req: &RequestInfo) -> Result<UserDoc> {
        let mut rows = self
            .store()
            .query_view(AUTH_DESIGN_DOC, VERIFY_EMAIL_VIEW, token)
            .await?;
        let user = rows.drain(..).next().ok_or(UserError::InvalidVerifyToken)?;

        let ip = req.ip.clone();
        let doc = self
            .update_with_retry(&user.id, |doc| {
                if let Some(unverified) = doc.unverified_email.take() {
                    doc.email = Some(unverified.email);
                }
                self.push_activity(doc, "verified email", LOCAL_PROVIDER, ip.as_deref());
                Ok(())
            })
            .await?;

        self.emit(AuthEvent::EmailVerified {
            user_id: doc.id.clone(),
        });
        Ok(doc)
    }

    /// Change (or clear) the email address.
    pub async fn change_email(
        &self,
        user_id: &str,
        new_email: &str,
        req: &RequestInfo,
    ) -> Result<UserDoc> {
        let doc = self.store().get(user_id).await?;
        if doc.local.is_none() {
            return Err(UserError::PasswordNotSet.into());
        }

        let new_email = new_email.trim().to_lowercase();
        let ip = req.ip.clone();

        if new_email.is_empty() {
            if self.is_last_login_credential(&doc, "email") {
                return Err(UserError::OnlyLoginCredential.into());
            }
            let doc = self
                .update_with_retry(user_id, |doc| {
                    doc.email = None;
                    doc.unverified_email = None;
                    self.push_activity(doc, "changed email", LOCAL_PROVIDER, ip.as_deref());
                    Ok(())
                })
                .await?;
            self.emit(AuthEvent::EmailChanged {
                user_id: doc.id.clone(),
            });
            return Ok(doc);
        }

        if let Some(message) =
            crate::validate::CustomValidators::validate(self, "email", &new_email).await
        {
            let mut failed = ValidationError::new();
            failed.add("email", message);
            return Err(failed.into());
        }

        let confirm = self.config().local.send_confirm_email;
        let token = util::url_safe_uuid();
        let email = new_email.clone();
        let doc = self
            .update_with_retry(user_id, |doc| {
                if confirm {
                    doc.unverified_email = Some(UnverifiedEmail {
                        email: email.clone(),
                        token: token.clone(),
                    });
                } else {
                    doc.email = Some(email.clone());
                }
                self.push_activity(doc, "changed email", LOCAL_PROVIDER, ip.as_deref());
                Ok(())
            })
            .await?;

        if confirm {
            self.mailer()
                .send_email(
                    "confirmEmail",
                    &new_email,
                    &json!({"token": token, "user_id": doc.id}),
                )
                .await?;
        }

        self.emit(AuthEvent::EmailChanged {
            user_id: doc.id.clone(),
        });
        Ok(doc)
    }

    /// Change (or clear) the phone number.
    pub async fn change_phone(
        &self,
        user_id: &str,
        new_phone: &str,
        req: &RequestInfo,
    ) -> Result<UserDoc> {
        let doc = self.store().get(user_id).await?;
        if doc.local.is_none() {
            return Err(UserError::PasswordNotSet.into());
        }

        let new_phone = new_phone.trim().to_string();
        let ip = req.ip.clone();

        if new_phone.is_empty() {
            if self.is_last_login_credential(&doc, "phone") {
                return Err(UserError::OnlyLoginCredential.into());
            }
        } else if let Some(message) =
            crate::validate::CustomValidators::validate(self, "phone", &new_phone).await
        {
            let mut failed = ValidationError::new();
            failed.add("phone", message);
            return Err(failed.into());
        }

        let phone = (!new_phone.is_empty()).then_some(new_phone);
        let doc = self
            .update_with_retry(user_id, |doc| {
                doc.phone = phone.clone();
                self.push_activity(doc, "changed phone", LOCAL_PROVIDER, ip.as_deref());
                Ok(())
            })
            .await?;

        self.emit(AuthEvent::PhoneChanged {
            user_id: doc.id.clone(),
        });
        Ok(doc)
    }
}
