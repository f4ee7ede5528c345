//! User service: account lifecycle, sessions, and auditing.
//!
//! # Architecture
//!
//! [`UserService`] orchestrates the collaborators behind small traits:
//! the document store (user documents + views), the session store
//! (token records, invite codes), DB auth (per-user databases and
//! credentials), the mailer, and an injected event emitter. Every
//! public operation is an async pipeline over those stores; user
//! documents are mutated read-modify-write with bounded retry on
//! revision conflicts.

pub mod activity;
pub mod create;
pub mod dbs;
pub mod errors;
pub mod passwords;
pub mod sessions;
pub mod transform;
pub mod types;

pub use errors::UserError;
pub use sessions::{LogoutOp, LogoutTarget, SessionResponse};
pub use transform::{UserTransform, transform};
pub use types::{
    ActivityEntry, ForgotPassword, LocalAuth, PersonalDb, ProviderAccount, RequestInfo,
    SessionRef, SignUpInfo, UnverifiedEmail, UserDoc,
};

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;

use crate::{
    Error, Result,
    clock::Clock,
    config::{Config, UsernameKey},
    constants::{AUTH_DESIGN_DOC, EMAIL_USERNAME_VIEW, WRITE_RETRIES},
    db_auth::DbAuth,
    design_docs::auth_design_doc,
    events::{AuthEvent, EventEmitter, EventHook},
    mailer::Mailer,
    session::{SessionStore, SessionView},
    store::DocumentStore,
    validate::{CustomValidators, Rule, Sanitizer, Schema},
};

const EMAIL_REGEX: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";
const PHONE_REGEX: &str = r"^\+?[0-9][0-9 \-().]{6,18}$";
const USERNAME_REGEX: &str = r"^[a-zA-Z0-9_@.+-]{3,}$";

/// Which identity field a login string resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginType {
    Email,
    Phone,
    Username,
}

impl LoginType {
    pub fn field(&self) -> &'static str {
        match self {
            LoginType::Email => "email",
            LoginType::Phone => "phone",
            LoginType::Username => "username",
        }
    }
}

/// The user & session core.
pub struct UserService {
    config: Arc<Config>,
    store: Arc<dyn DocumentStore>,
    sessions: SessionStore,
    db_auth: DbAuth,
    mailer: Arc<dyn Mailer>,
    events: EventEmitter,
    clock: Arc<dyn Clock>,
    email_regex: Regex,
    phone_regex: Regex,
    username_regex: Regex,
    on_create: Vec<UserTransform>,
    on_link: Vec<UserTransform>,
}

impl UserService {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn DocumentStore>,
        sessions: SessionStore,
        db_auth: DbAuth,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let phone_pattern = config
            .local
            .phone_regexp
            .clone()
            .unwrap_or_else(|| PHONE_REGEX.to_string());

        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                Error::InvalidOperation(format!("invalid identity pattern {pattern:?}: {e}"))
            })
        };

        Ok(Self {
            email_regex: compile(EMAIL_REGEX)?,
            phone_regex: compile(&phone_pattern)?,
            username_regex: compile(USERNAME_REGEX)?,
            config,
            store,
            sessions,
            db_auth,
            mailer,
            events: EventEmitter::new(),
            clock,
            on_create: Vec::new(),
            on_link: Vec::new(),
        })
    }

    // === Collaborator access ===

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn db_auth(&self) -> &DbAuth {
        &self.db_auth
    }

    pub(crate) fn mailer(&self) -> &Arc<dyn Mailer> {
        &self.mailer
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    // === Registration ===

    /// Subscribe to lifecycle events.
    pub fn add_event_hook(&mut self, hook: Arc<dyn EventHook>) {
        self.events.add_hook(hook);
    }

    pub(crate) fn emit(&self, event: AuthEvent) {
        self.events.emit(&event);
    }

    /// Register a transformation run on every new account.
    pub fn register_on_create(&mut self, t: UserTransform) {
        self.on_create.push(t);
    }

    /// Register a transformation run on every federated link.
    pub fn register_on_link(&mut self, t: UserTransform) {
        self.on_link.push(t);
    }

    pub(crate) fn on_create_transforms(&self) -> &[UserTransform] {
        &self.on_create
    }

    pub(crate) fn on_link_transforms(&self) -> &[UserTransform] {
        &self.on_link
    }

    /// Install the `auth` design document into the document store.
    pub async fn install_design_docs(&self) -> Result<()> {
        self.store.put_design_doc(&auth_design_doc(&self.config)).await
    }

    // === Login resolution ===

    /// Detect which identity field a login string targets: the enabled
    /// username keys are consulted in order, matching the email and
    /// phone formats; anything else is a plain username.
    pub fn login_type(&self, login: &str) -> LoginType {
        for key in &self.config.local.username_keys {
            match key {
                UsernameKey::Email if self.email_regex.is_match(login) => {
                    return LoginType::Email;
                }
                UsernameKey::Phone if self.phone_regex.is_match(login) => {
                    return LoginType::Phone;
                }
                _ => {}
            }
        }
        LoginType::Username
    }

    /// Look up a user by any enabled login key.
    pub async fn get(&self, login: &str) -> Result<Option<UserDoc>> {
        let login_type = self.login_type(login);
        let mut views: Vec<&str> = Vec::new();

        if login_type == LoginType::Email && self.config.local.email_username {
            views.push(EMAIL_USERNAME_VIEW);
        }
        let detected = login_type.field();
        let enabled = self.config.username_fields();
        if enabled.contains(&detected) {
            views.push(detected);
        } else {
            views.extend(&enabled);
        }

        for view in views {
            let mut rows = self.store.query_view(AUTH_DESIGN_DOC, view, login).await?;
            if let Some(doc) = rows.drain(..).next() {
                return Ok(Some(doc));
            }
        }
        Ok(None)
    }

    /// Look up a user, erroring with `username_not_found` when absent.
    pub(crate) async fn require(&self, login: &str) -> Result<UserDoc> {
        self.get(login).await?.ok_or_else(|| {
            UserError::UsernameNotFound {
                login: login.to_string(),
            }
            .into()
        })
    }

    /// Confirm a bearer `key:password` pair against the session store.
    pub async fn confirm_session(&self, key: &str, password: &str) -> Result<SessionView> {
        self.sessions.confirm_token(key, password).await
    }

    /// Gracefully shut down the session store.
    pub async fn quit(&self) -> Result<()> {
        self.sessions.quit().await
    }

    // === Document writes ===

    /// Read-modify-write with bounded retry on revision conflicts.
    ///
    /// The closure must be a pure document mutation: it may run more
    /// than once. Side effects on other stores belong outside it.
    pub(crate) async fn update_with_retry<F>(&self, user_id: &str, mut mutate: F) -> Result<UserDoc>
    where
        F: FnMut(&mut UserDoc) -> Result<()>,
    {
        let mut attempt = 0;
        loop {
            let mut doc = self.store.get(user_id).await?;
            mutate(&mut doc)?;
            match self.store.put(&mut doc).await {
                Ok(()) => return Ok(doc),
                Err(e) if e.is_conflict() && attempt + 1 < WRITE_RETRIES => {
                    attempt += 1;
                    debug!(user_id, attempt, "revision conflict, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Persist a transformed document, preserving the freshest revision
    /// on conflict retries.
    pub(crate) async fn persist_replacement(&self, transformed: UserDoc) -> Result<UserDoc> {
        let id = transformed.id.clone();
        self.update_with_retry(&id, |doc| {
            let rev = doc.rev.clone();
            *doc = transformed.clone();
            doc.rev = rev;
            Ok(())
        })
        .await
    }

    // === Invariants ===

    /// Whether clearing `field` would null-out the last populated
    /// enabled login key.
    pub(crate) fn is_last_login_credential(&self, doc: &UserDoc, field: &str) -> bool {
        !self
            .config
            .username_fields()
            .iter()
            .filter(|f| **f != field)
            .any(|f| doc.login_field(f).is_some())
    }

    // === Base user model ===

    /// The base validation schema for local registration, merged with
    /// the application's `user_model` additions.
    pub(crate) fn user_model(&self) -> Schema {
        let mut schema = Schema::new();
        let username_field = self.config.local.username_field.clone();
        let password_field = self.config.local.password_field.clone();

        for field in [
            username_field.as_str(),
            password_field.as_str(),
            "confirmPassword",
            "username",
            "email",
            "phone",
            "inviteCode",
        ] {
            schema.whitelist_field(field);
        }

        schema.sanitizer("username", Sanitizer::Trim);
        schema.sanitizer("username", Sanitizer::ToLowerCase);
        schema.sanitizer("email", Sanitizer::Trim);
        schema.sanitizer("email", Sanitizer::ToLowerCase);
        schema.sanitizer("phone", Sanitizer::Trim);

        schema.rule(&username_field, Rule::Presence);
        schema.rule(&password_field, Rule::Presence);
        schema.rule(
            &password_field,
            Rule::Length {
                minimum: 6,
                message: None,
            },
        );
        schema.rule("confirmPassword", Rule::Presence);
        schema.rule(
            "confirmPassword",
            Rule::Matches {
                field: password_field.clone(),
            },
        );

        for key in &self.config.local.username_keys {
            let field = key.field();
            schema.rule(
                field,
                Rule::Custom {
                    name: field.to_string(),
                },
            );
        }
        if self.config.local.email_username
            && !self.config.username_fields().contains(&"email")
        {
            schema.rule(
                "email",
                Rule::Custom {
                    name: "email".to_string(),
                },
            );
        }

        if !self.config.local.uuid_as_id {
            schema
                .rename
                .insert(username_field, "_id".to_string());
        }

        if let Some(model) = &self.config.user_model {
            schema.merge_config(model);
        }
        schema
    }

    // === Uniqueness ===

    /// Whether any user indexes the given value under the view.
    pub(crate) async fn value_in_use(&self, view: &str, value: &str) -> Result<bool> {
        let rows = self.store.query_view(AUTH_DESIGN_DOC, view, value).await?;
        Ok(!rows.is_empty())
    }

    /// Users other than `user_id` indexing the value under the view.
    pub(crate) async fn value_in_use_by_other(
        &self,
        view: &str,
        value: &str,
        user_id: &str,
    ) -> Result<bool> {
        let rows = self.store.query_view(AUTH_DESIGN_DOC, view, value).await?;
        Ok(rows.iter().any(|doc| doc.id != user_id))
    }

    pub(crate) fn email_format_ok(&self, value: &str) -> bool {
        self.email_regex.is_match(value)
    }

    pub(crate) fn phone_format_ok(&self, value: &str) -> bool {
        self.phone_regex.is_match(value)
    }
}

#[async_trait]
impl CustomValidators for UserService {
    async fn validate(&self, name: &str, value: &str) -> Option<String> {
        let check = async {
            match name {
                "email" => {
                    if !self.email_format_ok(value) {
                        return Ok(Some("is not a valid email address".to_string()));
                    }
                    if self.value_in_use("email", value).await? {
                        return Ok(Some("already in use".to_string()));
                    }
                    Ok::<_, Error>(None)
                }
                "phone" => {
                    if !self.phone_format_ok(value) {
                        return Ok(Some("is not a valid phone number".to_string()));
                    }
                    if self.value_in_use("phone", value).await? {
                        return Ok(Some("already in use".to_string()));
                    }
                    Ok(None)
                }
                "username" => {
                    if !self.username_regex.is_match(value) {
                        return Ok(Some("contains invalid characters".to_string()));
                    }
                    if self.value_in_use("username", value).await? {
                        return Ok(Some("already in use".to_string()));
                    }
                    Ok(None)
                }
                other => Ok(Some(format!("unknown validator: {other}"))),
            }
        };

        match check.await {
            Ok(outcome) => outcome,
            // A store failure must not pass validation silently.
            Err(e) => Some(format!("could not be validated: {e}")),
        }
    }
}
