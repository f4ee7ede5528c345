//! Session issuance, refresh, and revocation.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::{
    UserService,
    types::{RequestInfo, SessionRef, UserDoc},
};
use crate::{
    Result,
    constants::{AUTH_DESIGN_DOC, LOCAL_PROVIDER, SESSION_VIEW},
    events::AuthEvent,
    session::SessionToken,
    util,
};

/// Scope of a bulk session revocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutOp {
    /// Every session.
    All,
    /// Every session except the current one.
    Other,
    /// Only sessions past their expiry.
    Expired,
}

/// Whose sessions to revoke.
#[derive(Debug, Clone, Copy)]
pub enum LogoutTarget<'a> {
    User(&'a str),
    Session(&'a str),
}

/// The payload returned to a freshly authenticated client.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub password: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_phone: Option<String>,
    pub roles: Vec<String>,
    pub issued: u64,
    pub expires: u64,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<Value>,
    /// Logical name → credentialed database URL.
    #[serde(rename = "userDBs")]
    pub user_dbs: BTreeMap<String, String>,
}

impl UserService {
    /// Mint a token record: server-generated on Cloudant-style
    /// backends, locally generated elsewhere.
    pub(crate) async fn generate_session(
        &self,
        user_id: &str,
        provider: &str,
        roles: Vec<String>,
    ) -> Result<SessionToken> {
        let (key, password) = match self.db_auth().generate_api_key().await? {
            Some(pair) => pair,
            None => (util::session_id(), util::url_safe_uuid()),
        };
        let issued = self.now();
        Ok(SessionToken {
            user_id: user_id.to_string(),
            key,
            password,
            issued,
            expires: issued + self.config().security.session_life * 1000,
            provider: provider.to_string(),
            roles,
        })
    }

    /// Issue a session for an authenticated user.
    ///
    /// The token exists in the session store and is authorized in the
    /// DB auth store before it appears on the user document; the
    /// document is persisted last.
    pub async fn create_session(
        &self,
        user_id: &str,
        provider: &str,
        req: &RequestInfo,
    ) -> Result<SessionResponse> {
        let user = self.store().get(user_id).await?;
        let token = self
            .generate_session(&user.id, provider, user.roles.clone())
            .await?;

        self.sessions().store_token(&token).await?;
        self.db_auth()
            .store_key(
                &user.id,
                &token.key,
                &token.password,
                token.expires,
                &token.roles,
            )
            .await?;
        self.db_auth()
            .authorize_user_sessions(&user.id, &user.personal_dbs, &token.key, &token.roles)
            .await?;

        // Garbage-collect expired sessions: store deletions complete
        // before the document is persisted.
        let now = self.now();
        let mut stale = user.clone();
        self.logout_user_sessions(&mut stale, LogoutOp::Expired, None)
            .await?;

        let provider_name = provider.to_string();
        let ip = req.ip.clone();
        let session_ref = SessionRef {
            issued: token.issued,
            expires: token.expires,
            provider: provider_name.clone(),
            ip: ip.clone(),
        };
        let key = token.key.clone();
        let doc = self
            .update_with_retry(user_id, |doc| {
                doc.session.insert(key.clone(), session_ref.clone());
                if provider_name == LOCAL_PROVIDER {
                    if let Some(local) = &mut doc.local {
                        local.failed_login_attempts = Some(0);
                        local.locked_until = None;
                    }
                }
                self.push_activity(doc, "login", &provider_name, ip.as_deref());
                for expired in util::expired_sessions(doc, now) {
                    doc.session.remove(&expired);
                }
                Ok(())
            })
            .await?;

        info!(user_id = %doc.id, provider, "session created");
        self.emit(AuthEvent::Login {
            user_id: doc.id.clone(),
            provider: provider.to_string(),
        });

        Ok(self.build_session_response(&doc, &token, req))
    }

    fn build_session_response(
        &self,
        doc: &UserDoc,
        token: &SessionToken,
        req: &RequestInfo,
    ) -> SessionResponse {
        let public = self.config().public_db_url();
        let mut user_dbs = BTreeMap::new();
        for (physical, db) in &doc.personal_dbs {
            user_dbs.insert(
                db.name.clone(),
                util::session_db_url(&public, physical, &token.key, &token.password),
            );
        }

        SessionResponse {
            token: token.key.clone(),
            password: token.password.clone(),
            user_id: doc.id.clone(),
            user_email: doc.email.clone(),
            user_phone: doc.phone.clone(),
            roles: doc.roles.clone(),
            issued: token.issued,
            expires: token.expires,
            provider: token.provider.clone(),
            ip: req.ip.clone(),
            profile: self.map_profile(doc),
            user_dbs,
        }
    }

    /// Synthesize the response profile: for each mapped field the
    /// declared providers are consulted in order and the first profile
    /// carrying the field wins.
    pub(crate) fn map_profile(&self, doc: &UserDoc) -> Option<Value> {
        let mut profile = match &doc.profile {
            Some(Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        };

        for field in &self.config().session.profile_mapping {
            for provider in &field.providers {
                let value = doc
                    .oauth
                    .get(provider)
                    .and_then(|account| account.profile.get(&field.name));
                if let Some(value) = value {
                    profile.insert(field.name.clone(), value.clone());
                    break;
                }
            }
        }

        if profile.is_empty() {
            None
        } else {
            Some(Value::Object(profile))
        }
    }

    /// Count a failed local login and lock the account once the
    /// configured threshold is crossed. Returns whether the account is
    /// now locked. No-op when `security.max_failed_logins` is unset.
    pub async fn handle_failed_login(&self, user_id: &str, req: &RequestInfo) -> Result<bool> {
        let Some(max) = self.config().security.max_failed_logins else {
            return Ok(false);
        };
        let lockout_millis = self.config().security.lockout_time * 1000;
        let now = self.now();
        let ip = req.ip.clone();

        let doc = self
            .update_with_retry(user_id, |doc| {
                if let Some(local) = &mut doc.local {
                    let attempts = local.failed_login_attempts.unwrap_or(0) + 1;
                    local.failed_login_attempts = Some(attempts);
                    if attempts > max {
                        local.locked_until = Some(now + lockout_millis);
                    }
                }
                self.push_activity(doc, "failed login", LOCAL_PROVIDER, ip.as_deref());
                Ok(())
            })
            .await?;

        let locked = doc
            .local
            .as_ref()
            .and_then(|local| local.locked_until)
            .is_some_and(|until| until > now);
        if locked {
            debug!(user_id, "account locked after failed logins");
        }
        Ok(locked)
    }

    /// Extend a session's lifetime by `security.session_life` from now.
    pub async fn refresh_session(&self, key: &str) -> Result<SessionToken> {
        let mut token = self.sessions().fetch_token(key).await?;
        let now = self.now();
        token.issued = now;
        token.expires = now + self.config().security.session_life * 1000;
        self.sessions().store_token(&token).await?;

        let mut stale = self.store().get(&token.user_id).await?;
        self.logout_user_sessions(&mut stale, LogoutOp::Expired, None)
            .await?;

        let key_name = key.to_string();
        let (issued, expires) = (token.issued, token.expires);
        self.update_with_retry(&token.user_id, |doc| {
            if let Some(session) = doc.session.get_mut(&key_name) {
                session.issued = issued;
                session.expires = expires;
            }
            for expired in util::expired_sessions(doc, now) {
                doc.session.remove(&expired);
            }
            Ok(())
        })
        .await?;

        self.emit(AuthEvent::Refresh {
            user_id: token.user_id.clone(),
            key: key.to_string(),
        });
        Ok(token)
    }

    /// Resolve the user document owning a session key.
    pub async fn find_by_session(&self, session_id: &str) -> Result<Option<UserDoc>> {
        let mut rows = self
            .store()
            .query_view(AUTH_DESIGN_DOC, SESSION_VIEW, session_id)
            .await?;
        Ok(rows.drain(..).next())
    }

    /// Revoke every session of a user, resolved by id or by one of
    /// their session keys.
    pub async fn logout_user(&self, target: LogoutTarget<'_>) -> Result<()> {
        let mut doc = match target {
            LogoutTarget::User(user_id) => self.store().get(user_id).await?,
            LogoutTarget::Session(session_id) => self
                .find_by_session(session_id)
                .await?
                .ok_or(crate::session::SessionError::Unauthorized)?,
        };

        self.logout_user_sessions(&mut doc, LogoutOp::All, None)
            .await?;

        let user_id = doc.id.clone();
        self.update_with_retry(&user_id, |doc| {
            doc.session.clear();
            self.push_activity(doc, "logout", "all", None);
            Ok(())
        })
        .await?;

        info!(user_id = %user_id, "logged out all sessions");
        self.emit(AuthEvent::Logout {
            user_id: user_id.clone(),
        });
        self.emit(AuthEvent::LogoutAll { user_id });
        Ok(())
    }

    /// Revoke a single session. Unknown sessions are cleaned out of the
    /// stores without failing.
    pub async fn logout_session(&self, session_id: &str) -> Result<()> {
        let keys = vec![session_id.to_string()];

        let Some(doc) = self.find_by_session(session_id).await? else {
            // No owning document; clear the stores regardless.
            let (_, _) = tokio::try_join!(
                self.sessions().delete_tokens(&keys),
                self.db_auth().remove_keys(&keys),
            )?;
            return Ok(());
        };

        let mut doc = doc;
        let now = self.now();
        let had_session = doc.session.contains_key(session_id);
        let had_expired = !util::expired_sessions(&doc, now).is_empty();

        tokio::try_join!(
            self.sessions().delete_tokens(&keys),
            self.db_auth().remove_keys(&keys),
            self.db_auth().deauthorize_user(&doc, &keys),
        )?;
        self.logout_user_sessions(&mut doc, LogoutOp::Expired, None)
            .await?;

        if had_session || had_expired {
            let session_name = session_id.to_string();
            let user_id = doc.id.clone();
            self.update_with_retry(&user_id, |doc| {
                doc.session.remove(&session_name);
                for expired in util::expired_sessions(doc, now) {
                    doc.session.remove(&expired);
                }
                Ok(())
            })
            .await?;
        }

        self.emit(AuthEvent::Logout {
            user_id: doc.id.clone(),
        });
        Ok(())
    }

    /// Revoke every session except the given one.
    pub async fn logout_others(&self, session_id: &str) -> Result<()> {
        let Some(mut doc) = self.find_by_session(session_id).await? else {
            return Err(crate::session::SessionError::Unauthorized.into());
        };

        let revoked = self
            .logout_user_sessions(&mut doc, LogoutOp::Other, Some(session_id))
            .await?;

        if !revoked.is_empty() {
            let user_id = doc.id.clone();
            let keep = session_id.to_string();
            let now = self.now();
            self.update_with_retry(&user_id, |doc| {
                let keys: Vec<String> = doc
                    .session
                    .keys()
                    .filter(|k| **k != keep)
                    .cloned()
                    .collect();
                for key in keys {
                    doc.session.remove(&key);
                }
                for expired in util::expired_sessions(doc, now) {
                    doc.session.remove(&expired);
                }
                Ok(())
            })
            .await?;
        }
        Ok(())
    }

    /// Revoke a selection of a user's sessions: delete their tokens,
    /// DB auth credentials, and database authorizations in parallel,
    /// then prune the in-memory document. Persisting is the caller's
    /// responsibility.
    pub async fn logout_user_sessions(
        &self,
        doc: &mut UserDoc,
        op: LogoutOp,
        current_session: Option<&str>,
    ) -> Result<Vec<String>> {
        let now = self.now();
        let keys: Vec<String> = match op {
            LogoutOp::All => util::sessions_of(doc),
            LogoutOp::Other => util::sessions_of(doc)
                .into_iter()
                .filter(|k| Some(k.as_str()) != current_session)
                .collect(),
            LogoutOp::Expired => util::expired_sessions(doc, now),
        };

        if !keys.is_empty() {
            tokio::try_join!(
                self.sessions().delete_tokens(&keys),
                self.db_auth().remove_keys(&keys),
                self.db_auth().deauthorize_user(doc, &keys),
            )?;
        }

        match op {
            LogoutOp::All => doc.session.clear(),
            LogoutOp::Other | LogoutOp::Expired => {
                for key in &keys {
                    doc.session.remove(key);
                }
            }
        }
        Ok(keys)
    }
}
