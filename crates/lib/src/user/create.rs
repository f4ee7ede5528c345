//! Account creation and federated identity management.

use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::info;

use super::{
    LoginType, UserService,
    errors::UserError,
    transform::run_pipeline,
    types::{LocalAuth, PersonalDb, ProviderAccount, RequestInfo, SignUpInfo, UnverifiedEmail, UserDoc},
};
use crate::{
    Result,
    config::DbType,
    constants::{AUTH_DESIGN_DOC, INVITE_CODE_PREFIX, LOCAL_PROVIDER},
    events::AuthEvent,
    util,
};

impl UserService {
    /// Register a local account.
    ///
    /// The form is validated against the merged user model; the login
    /// value is duplicated into its detected identity field so one form
    /// field serves username, email, and phone registration.
    pub async fn create(&self, mut form: Map<String, Value>, req: &RequestInfo) -> Result<UserDoc> {
        let username_field = self.config().local.username_field.clone();
        let password_field = self.config().local.password_field.clone();

        let login = form
            .get(&username_field)
            .and_then(Value::as_str)
            .map(str::to_string);
        let detected = match &login {
            Some(login) => {
                let detected = self.login_type(login);
                form.insert(
                    detected.field().to_string(),
                    Value::String(login.clone()),
                );
                detected
            }
            None => LoginType::Username,
        };

        let mut fields = self.user_model().process(form, self).await?;

        // Invite gate: runs only after validation so a rejected form
        // never burns a code.
        let mut adopted_id = None;
        if self.config().security.invite_only_registration {
            let code = fields
                .get("inviteCode")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| req.query.get("inviteCode").cloned());
            adopted_id = self.consume_invite(code.as_deref()).await?;
        }
        fields.remove("inviteCode");

        let renamed_id = fields
            .remove("_id")
            .and_then(|v| v.as_str().map(str::to_string));
        let id = adopted_id
            .or(renamed_id)
            .unwrap_or_else(util::uuid32);

        let password = fields
            .remove(&password_field)
            .and_then(|v| v.as_str().map(str::to_string));
        fields.remove("confirmPassword");

        let mut doc = UserDoc::new(id);
        doc.username = take_string(&mut fields, "username");
        doc.email = take_string(&mut fields, "email");
        doc.phone = take_string(&mut fields, "phone");
        // A custom login field was already duplicated into its
        // detected identity field above.
        fields.remove(&username_field);
        if detected != LoginType::Username {
            // The username form field carried an email or phone; the
            // duplicate is the canonical copy.
            doc.username = None;
        }
        doc.extra = fields;

        if self.config().local.send_confirm_email {
            if let Some(email) = doc.email.take() {
                doc.unverified_email = Some(UnverifiedEmail {
                    email,
                    token: util::url_safe_uuid(),
                });
            }
        }

        if let Some(password) = &password {
            let (derived_key, salt) = util::hash_password(password)?;
            doc.local = Some(LocalAuth {
                salt,
                derived_key,
                failed_login_attempts: None,
                locked_until: None,
            });
            doc.ensure_local_provider();
        }

        doc.roles = self.config().security.default_roles.clone();
        doc.sign_up = Some(SignUpInfo {
            provider: LOCAL_PROVIDER.to_string(),
            timestamp: self.clock().now_rfc3339(),
            ip: req.ip.clone(),
        });

        self.provision_default_dbs(&mut doc).await?;
        self.push_activity(&mut doc, "signup", LOCAL_PROVIDER, req.ip.as_deref());

        let mut doc = run_pipeline(self.on_create_transforms(), doc, req).await?;
        self.store().put(&mut doc).await?;

        if let Some(unverified) = &doc.unverified_email {
            self.mailer()
                .send_email(
                    "confirmEmail",
                    &unverified.email,
                    &serde_json::json!({
                        "token": unverified.token,
                        "user_id": doc.id,
                    }),
                )
                .await?;
        }

        info!(user_id = %doc.id, "user created");
        self.emit(AuthEvent::Signup {
            user_id: doc.id.clone(),
            provider: LOCAL_PROVIDER.to_string(),
        });
        Ok(doc)
    }

    /// Authenticate (or register) a user from a normalized federated
    /// `{provider, auth, profile}` triple.
    pub async fn social_auth(
        &self,
        provider: &str,
        auth: Value,
        mut profile: Value,
        req: &RequestInfo,
    ) -> Result<UserDoc> {
        strip_raw(&mut profile);
        let profile_id = profile_id(&profile)?;

        let mut rows = self
            .store()
            .query_view(AUTH_DESIGN_DOC, provider, &profile_id)
            .await?;

        if let Some(existing) = rows.drain(..).next() {
            let mut doc = existing;
            doc.oauth.insert(
                provider.to_string(),
                ProviderAccount {
                    auth,
                    profile,
                },
            );
            self.push_activity(&mut doc, "login", provider, req.ip.as_deref());
            let doc = run_pipeline(self.on_link_transforms(), doc, req).await?;
            return self.persist_replacement(doc).await;
        }

        // New account via a federated identity.
        let mut adopted_id = None;
        if self.config().security.invite_only_registration {
            let code = req.query.get("inviteCode").cloned();
            adopted_id = self.consume_invite(code.as_deref()).await?;
        }

        let email = profile
            .get("emails")
            .and_then(|e| e.get(0))
            .and_then(|e| e.get("value"))
            .and_then(Value::as_str)
            .map(str::to_lowercase);
        if let Some(email) = &email {
            if self.value_in_use("email", email).await? {
                return Err(UserError::EmailInUseLink.into());
            }
        }

        let id = match adopted_id {
            Some(id) => id,
            None if self.config().local.uuid_as_id => util::uuid32(),
            None => {
                let base = base_username(&profile, email.as_deref(), &profile_id);
                self.generate_username(&base).await?
            }
        };

        let mut doc = UserDoc::new(id);
        doc.email = email;
        doc.providers = vec![provider.to_string()];
        doc.oauth.insert(
            provider.to_string(),
            ProviderAccount { auth, profile },
        );
        doc.roles = self.config().security.default_roles.clone();
        doc.sign_up = Some(SignUpInfo {
            provider: provider.to_string(),
            timestamp: self.clock().now_rfc3339(),
            ip: req.ip.clone(),
        });

        self.provision_default_dbs(&mut doc).await?;
        self.push_activity(&mut doc, "signup", provider, req.ip.as_deref());

        let mut doc = run_pipeline(self.on_create_transforms(), doc, req).await?;
        self.store().put(&mut doc).await?;

        info!(user_id = %doc.id, provider, "user created via provider");
        self.emit(AuthEvent::Signup {
            user_id: doc.id.clone(),
            provider: provider.to_string(),
        });
        Ok(doc)
    }

    /// Link a federated identity to an existing account.
    pub async fn link_social(
        &self,
        user_id: &str,
        provider: &str,
        auth: Value,
        mut profile: Value,
        req: &RequestInfo,
    ) -> Result<UserDoc> {
        strip_raw(&mut profile);
        let profile_id = profile_id(&profile)?;

        let rows = self
            .store()
            .query_view(AUTH_DESIGN_DOC, provider, &profile_id)
            .await?;
        if rows.iter().any(|doc| doc.id != user_id) {
            return Err(UserError::ProviderInUse {
                provider: provider.to_string(),
            }
            .into());
        }

        let doc = self.store().get(user_id).await?;
        if let Some(linked) = doc.oauth.get(provider) {
            let linked_id = linked.profile.get("id").and_then(Value::as_str);
            if linked_id != Some(profile_id.as_str()) {
                return Err(UserError::ProviderConflict {
                    provider: provider.to_string(),
                }
                .into());
            }
        }

        if let Some(email) = profile
            .get("emails")
            .and_then(|e| e.get(0))
            .and_then(|e| e.get("value"))
            .and_then(Value::as_str)
        {
            if self
                .value_in_use_by_other("email", &email.to_lowercase(), user_id)
                .await?
            {
                return Err(UserError::EmailInUse.into());
            }
        }

        let mut doc = doc;
        doc.oauth.insert(
            provider.to_string(),
            ProviderAccount { auth, profile },
        );
        doc.add_provider(provider);
        self.push_activity(&mut doc, "link", provider, req.ip.as_deref());
        let doc = run_pipeline(self.on_link_transforms(), doc, req).await?;
        self.persist_replacement(doc).await
    }

    /// Detach a federated identity.
    ///
    /// The last provider can never be removed and local (password)
    /// login cannot be unlinked.
    pub async fn unlink(&self, user_id: &str, provider: &str) -> Result<UserDoc> {
        if provider.is_empty() {
            return Err(UserError::MissingProviderToUnlink.into());
        }

        let doc = self.store().get(user_id).await?;
        if doc.providers.len() < 2 {
            return Err(UserError::UnlinkOnlyProvider.into());
        }
        if provider == LOCAL_PROVIDER {
            return Err(UserError::UnlinkLocal.into());
        }
        if !doc.has_provider(provider) {
            return Err(UserError::ProviderNotFound {
                provider: provider.to_string(),
            }
            .into());
        }

        let provider = provider.to_string();
        self.update_with_retry(user_id, |doc| {
            doc.oauth.remove(&provider);
            doc.remove_provider(&provider);
            Ok(())
        })
        .await
    }

    /// Find the lowest free `base`, `base1`, `base2`, … id using the
    /// lexicographic range `[base, base + U+FFFF]`.
    pub(crate) async fn generate_username(&self, base: &str) -> Result<String> {
        let end = format!("{base}\u{ffff}");
        let existing: HashSet<String> = self
            .store()
            .all_docs_range(base, &end)
            .await?
            .into_iter()
            .collect();

        if !existing.contains(base) {
            return Ok(base.to_string());
        }
        let mut n = 1u64;
        loop {
            let candidate = format!("{base}{n}");
            if !existing.contains(&candidate) {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    /// Read and delete the invite key for a code. A 32-character stored
    /// value is an id reservation and is adopted as the new `_id`.
    pub(crate) async fn consume_invite(&self, code: Option<&str>) -> Result<Option<String>> {
        let code = match code {
            Some(code) if !code.is_empty() => code,
            _ => return Err(UserError::MissingInviteCode.into()),
        };

        let name = format!("{INVITE_CODE_PREFIX}{code}");
        let value = self
            .sessions()
            .get_key(&name)
            .await?
            .ok_or(UserError::MissingInviteCode)?;
        self.sessions().delete_keys(&[name]).await?;

        Ok((value.len() == 32).then_some(value))
    }

    /// Provision every database listed under `user_dbs.default_dbs`
    /// and record them on the document.
    pub(crate) async fn provision_default_dbs(&self, doc: &mut UserDoc) -> Result<()> {
        let defaults = self.config().user_dbs.default_dbs.clone();
        let wanted = defaults
            .private
            .iter()
            .map(|name| (name.clone(), DbType::Private))
            .chain(
                defaults
                    .shared
                    .iter()
                    .map(|name| (name.clone(), DbType::Shared)),
            );

        for (logical, type_default) in wanted {
            let resolved = self.db_auth().get_db_config(&logical, type_default);
            let physical = self
                .db_auth()
                .add_user_db(
                    doc,
                    &logical,
                    &resolved.design_docs,
                    resolved.db_type,
                    &resolved.admin_roles,
                    &resolved.member_roles,
                )
                .await?;
            doc.personal_dbs.insert(
                physical,
                PersonalDb {
                    name: logical,
                    db_type: resolved.db_type,
                    permissions: None,
                    admin_roles: None,
                    member_roles: None,
                },
            );
        }
        Ok(())
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    fields
        .remove(key)
        .and_then(|v| v.as_str().map(str::to_string))
}

fn strip_raw(profile: &mut Value) {
    if let Some(map) = profile.as_object_mut() {
        map.remove("_raw");
    }
}

fn profile_id(profile: &Value) -> Result<String> {
    profile
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            crate::Error::store_backend("provider profile is missing an id")
        })
}

/// Derive the base username for a federated signup: profile username,
/// then email local part, then display name with spaces stripped, then
/// the provider profile id.
fn base_username(profile: &Value, email: Option<&str>, profile_id: &str) -> String {
    if let Some(username) = profile.get("username").and_then(Value::as_str) {
        return username.to_lowercase();
    }
    if let Some(email) = email {
        if let Some((local, _)) = email.split_once('@') {
            return local.to_lowercase();
        }
    }
    if let Some(name) = profile.get("displayName").and_then(Value::as_str) {
        let stripped: String = name.chars().filter(|c| !c.is_whitespace()).collect();
        if !stripped.is_empty() {
            return stripped.to_lowercase();
        }
    }
    profile_id.to_lowercase()
}
