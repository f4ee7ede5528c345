//! Configuration for the user & session core.
//!
//! The configuration is a plain serde tree: loading it from a file,
//! environment, or CLI is the embedding application's concern. Every
//! section has a `Default` carrying the documented defaults, so a
//! `Config::default()` is a working in-memory setup.
//!
//! # Example
//!
//! ```
//! use warden::config::Config;
//!
//! let mut config = Config::default();
//! config.security.max_failed_logins = Some(3);
//! config.security.lockout_time = 60;
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::design_docs::DesignDoc;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub security: SecurityConfig,
    pub local: LocalConfig,
    pub session: SessionConfig,
    pub db_server: DbServerConfig,
    pub user_dbs: UserDbsConfig,
    pub mailer: MailerConfig,
    /// Email templates keyed by template name (`confirmEmail`,
    /// `forgotPassword`, ...).
    pub emails: BTreeMap<String, EmailTemplate>,
    /// Application additions to the base user model.
    pub user_model: Option<ModelConfig>,
    /// Federated provider settings. The handshake configuration inside
    /// each entry is consumed by the external OAuth layer; the core only
    /// reads the names to index provider views.
    pub providers: BTreeMap<String, serde_json::Value>,
    pub test_mode: TestModeConfig,
}

/// Security and session lifetime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecurityConfig {
    /// Roles assigned to newly created users.
    pub default_roles: Vec<String>,
    /// Maximum number of activity entries kept on a user document.
    /// `None` disables activity logging.
    pub user_activity_log_size: Option<usize>,
    /// Require a stored invite code for local registration.
    pub invite_only_registration: bool,
    /// Failed local logins tolerated before the account locks.
    /// `None` disables lockout tracking.
    pub max_failed_logins: Option<u32>,
    /// Lockout duration in seconds once the threshold is crossed.
    pub lockout_time: u64,
    /// When locked, allow login attempts that passed a captcha.
    pub soft_lock: bool,
    /// Lifetime in seconds of forgot-password tokens.
    pub token_life: u64,
    /// Lifetime in seconds of session tokens.
    pub session_life: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            default_roles: vec!["user".to_string()],
            user_activity_log_size: None,
            invite_only_registration: false,
            max_failed_logins: None,
            lockout_time: 600,
            soft_lock: false,
            token_life: 86_400,
            session_life: 86_400,
        }
    }
}

/// Identity field usable as a login key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsernameKey {
    Username,
    Email,
    Phone,
}

impl UsernameKey {
    /// Document field name the key maps to.
    pub fn field(&self) -> &'static str {
        match self {
            UsernameKey::Username => "username",
            UsernameKey::Email => "email",
            UsernameKey::Phone => "phone",
        }
    }
}

/// Local (password) account settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LocalConfig {
    /// Index the email field as a login name even when `email` is not
    /// in `username_keys`.
    pub email_username: bool,
    /// Identity fields accepted as login identifiers, in detection order.
    pub username_keys: Vec<UsernameKey>,
    /// Form field carrying the login identifier.
    pub username_field: String,
    /// Form field carrying the password.
    pub password_field: String,
    /// Park new addresses in `unverifiedEmail` and send a confirmation
    /// mail instead of writing `email` directly.
    pub send_confirm_email: bool,
    /// Refuse local login until the email address is confirmed.
    pub require_email_confirm: bool,
    /// Assign fresh 32-hex ids instead of renaming the username into
    /// the document id.
    pub uuid_as_id: bool,
    /// Override for the phone number format.
    pub phone_regexp: Option<String>,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            email_username: false,
            username_keys: vec![UsernameKey::Username],
            username_field: "username".to_string(),
            password_field: "password".to_string(),
            send_confirm_email: false,
            require_email_confirm: false,
            uuid_as_id: false,
            phone_regexp: None,
        }
    }
}

/// Session store selection and response profile mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    pub adapter: AdapterKind,
    pub file: FileAdapterConfig,
    pub redis: RedisConfig,
    /// Profile fields synthesized into session responses. Declaration
    /// order is the provider precedence order.
    pub profile_mapping: Vec<ProfileField>,
}

/// Which session adapter to instantiate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    #[default]
    Memory,
    File,
    Redis,
}

/// File adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FileAdapterConfig {
    /// Directory holding one JSON file per stored key.
    pub sessions_root: PathBuf,
}

impl Default for FileAdapterConfig {
    fn default() -> Self {
        Self {
            sessions_root: PathBuf::from("./.sessions"),
        }
    }
}

/// Redis adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RedisConfig {
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1/".to_string(),
        }
    }
}

/// One synthesized profile field: the first listed provider whose
/// profile carries `name` wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileField {
    pub name: String,
    pub providers: Vec<String>,
}

/// Connection settings for the backing database server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DbServerConfig {
    pub protocol: String,
    pub host: String,
    pub user: String,
    pub password: String,
    /// Base URL handed to clients in session responses. Falls back to
    /// `protocol://host` when unset.
    pub public_url: Option<String>,
    /// Field name design documents use as the type discriminator.
    pub type_field: String,
    /// The server manages per-session API keys itself (Cloudant-style).
    pub cloudant: bool,
}

impl Default for DbServerConfig {
    fn default() -> Self {
        Self {
            protocol: "http://".to_string(),
            host: "localhost:5984".to_string(),
            user: String::new(),
            password: String::new(),
            public_url: None,
            type_field: "type".to_string(),
            cloudant: false,
        }
    }
}

/// Security roles applied to provisioned databases.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SecurityRoles {
    pub admins: Vec<String>,
    pub members: Vec<String>,
}

/// Per-database model: merged from `_default` and the logical name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DbModelConfig {
    #[serde(rename = "type")]
    pub db_type: Option<DbType>,
    pub permissions: Option<Vec<String>>,
    pub design_docs: Vec<String>,
    pub admin_roles: Vec<String>,
    pub member_roles: Vec<String>,
}

/// Personal database kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    Private,
    Shared,
}

/// Databases provisioned for every new user.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DefaultDbs {
    pub private: Vec<String>,
    pub shared: Vec<String>,
}

/// Per-user database provisioning settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserDbsConfig {
    /// Roles always present on provisioned database security documents.
    pub default_security_roles: SecurityRoles,
    /// Per-database models; the `_default` entry applies to all.
    pub model: BTreeMap<String, DbModelConfig>,
    pub default_dbs: DefaultDbs,
    /// Prefix of private database physical names.
    pub private_prefix: String,
    /// Directory of `.json` design documents referenced by db models.
    pub design_doc_dir: Option<PathBuf>,
    /// Design documents registered in memory, keyed by name. Entries
    /// loaded from `design_doc_dir` are merged in at startup.
    pub design_docs: BTreeMap<String, DesignDoc>,
}

impl Default for UserDbsConfig {
    fn default() -> Self {
        Self {
            default_security_roles: SecurityRoles::default(),
            model: BTreeMap::new(),
            default_dbs: DefaultDbs::default(),
            private_prefix: "userdb".to_string(),
            design_doc_dir: None,
            design_docs: BTreeMap::new(),
        }
    }
}

/// Outbound mail settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MailerConfig {
    pub from_email: String,
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            from_email: "noreply@example.com".to_string(),
        }
    }
}

/// One email template registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailTemplate {
    pub subject: String,
    pub template: String,
    #[serde(default = "default_email_format")]
    pub format: String,
}

fn default_email_format() -> String {
    "text".to_string()
}

/// Application additions to the base user model (validator schema).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ModelConfig {
    /// Additional whitelisted fields.
    pub whitelist: Vec<String>,
    /// Additional per-field sanitizers.
    pub sanitize: BTreeMap<String, Vec<String>>,
    /// Additional per-field validation rules.
    pub validate: BTreeMap<String, Vec<crate::validate::Rule>>,
    /// Fields injected verbatim after validation.
    #[serde(rename = "static")]
    pub static_fields: BTreeMap<String, serde_json::Value>,
    /// Field renames applied after validation.
    pub rename: BTreeMap<String, String>,
}

/// Test-mode switches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TestModeConfig {
    /// The mailer reports success without sending anything.
    pub no_email: bool,
}

impl Config {
    /// Fields enabled as login identifiers, in detection order.
    pub fn username_fields(&self) -> Vec<&'static str> {
        self.local.username_keys.iter().map(|k| k.field()).collect()
    }

    /// Effective model config for a logical database name: `_default`
    /// overlaid with the named entry.
    pub fn db_model(&self, logical_name: &str) -> DbModelConfig {
        let mut merged = self
            .user_dbs
            .model
            .get("_default")
            .cloned()
            .unwrap_or_default();
        if let Some(named) = self.user_dbs.model.get(logical_name) {
            if named.db_type.is_some() {
                merged.db_type = named.db_type;
            }
            if named.permissions.is_some() {
                merged.permissions = named.permissions.clone();
            }
            if !named.design_docs.is_empty() {
                merged.design_docs = named.design_docs.clone();
            }
            if !named.admin_roles.is_empty() {
                merged.admin_roles = named.admin_roles.clone();
            }
            if !named.member_roles.is_empty() {
                merged.member_roles = named.member_roles.clone();
            }
        }
        merged
    }

    /// Base URL for client-facing database links.
    pub fn public_db_url(&self) -> String {
        self.db_server
            .public_url
            .clone()
            .unwrap_or_else(|| format!("{}{}", self.db_server.protocol, self.db_server.host))
    }
}
