//! Core data types for the user system
//!
//! The [`UserDoc`] is the unit of persistence: one document per account,
//! stored in the document store under `_id` with an opaque revision tag
//! for optimistic concurrency. Serialized field names follow the wire
//! conventions of the document store (camelCase, `_id`/`_rev`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::DbType,
    constants::{LOCAL_PROVIDER, USER_TYPE},
};

/// A user account document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDoc {
    /// Document id: a 32-hex identifier or the chosen username key value.
    #[serde(rename = "_id")]
    pub id: String,

    /// Revision tag assigned by the store. `None` until first persisted.
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,

    /// Type discriminator, always `"user"`.
    #[serde(rename = "type")]
    pub doc_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    /// Present while an email-confirm flow is in progress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unverified_email: Option<UnverifiedEmail>,

    /// Ordered-unique list of linked providers; never empty after
    /// creation. Contains `"local"` iff a password exists.
    #[serde(default)]
    pub providers: Vec<String>,

    /// Federated accounts keyed by provider name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub oauth: BTreeMap<String, ProviderAccount>,

    /// Password credentials and lockout state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local: Option<LocalAuth>,

    #[serde(default)]
    pub roles: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_up: Option<SignUpInfo>,

    /// Active sessions keyed by token key.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub session: BTreeMap<String, SessionRef>,

    /// Provisioned databases keyed by physical name; `name` holds the
    /// logical (prefix-stripped) name.
    #[serde(
        rename = "personalDBs",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub personal_dbs: BTreeMap<String, PersonalDb>,

    /// Audit log, newest first, capped by configuration.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub activity: Vec<ActivityEntry>,

    /// Pending password reset; the token is stored hashed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forgot_password: Option<ForgotPassword>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Value>,

    /// Application fields admitted by the merged user model (whitelist
    /// and `static` injection). Kept verbatim on the document.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl UserDoc {
    /// Create an empty user document with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            rev: None,
            doc_type: USER_TYPE.to_string(),
            email: None,
            phone: None,
            username: None,
            unverified_email: None,
            providers: Vec::new(),
            oauth: BTreeMap::new(),
            local: None,
            roles: Vec::new(),
            sign_up: None,
            session: BTreeMap::new(),
            personal_dbs: BTreeMap::new(),
            activity: Vec::new(),
            forgot_password: None,
            profile: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn has_provider(&self, provider: &str) -> bool {
        self.providers.iter().any(|p| p == provider)
    }

    /// Append a provider, preserving order and uniqueness.
    pub fn add_provider(&mut self, provider: &str) {
        if !self.has_provider(provider) {
            self.providers.push(provider.to_string());
        }
    }

    pub fn remove_provider(&mut self, provider: &str) {
        self.providers.retain(|p| p != provider);
    }

    /// Ensure `"local"` is listed; used whenever a password is set.
    pub fn ensure_local_provider(&mut self) {
        self.add_provider(LOCAL_PROVIDER);
    }

    /// Value of a login field by document field name.
    pub fn login_field(&self, field: &str) -> Option<&str> {
        match field {
            "username" => self.username.as_deref(),
            "email" => self.email.as_deref(),
            "phone" => self.phone.as_deref(),
            _ => None,
        }
    }
}

/// Password credentials and lockout counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalAuth {
    /// Salt string used for key derivation (base64, PHC compatible).
    pub salt: String,
    /// Argon2id hash in PHC string format.
    pub derived_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_login_attempts: Option<u32>,
    /// Unix millis until which local logins are refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<u64>,
}

/// A federated `{auth, profile}` pair as delivered by the OAuth layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderAccount {
    pub auth: Value,
    pub profile: Value,
}

/// Email address awaiting confirmation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnverifiedEmail {
    pub email: String,
    pub token: String,
}

/// Registration metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpInfo {
    pub provider: String,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

/// One active session as recorded on the user document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRef {
    /// Unix millis.
    pub issued: u64,
    /// Unix millis.
    pub expires: u64,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

/// One provisioned database as recorded on the user document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalDb {
    /// Logical name (prefix-stripped).
    pub name: String,
    #[serde(rename = "type")]
    pub db_type: DbType,
    /// Persisted only when explicitly supplied; otherwise resolved from
    /// configuration at session time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_roles: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_roles: Option<Vec<String>>,
}

/// One audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    /// RFC3339 timestamp.
    pub timestamp: String,
    pub action: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

/// Pending password-reset state. Only the token digest is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPassword {
    /// SHA-256 hex digest of the emailed token.
    pub token: String,
    /// Unix millis.
    pub issued: u64,
    /// Unix millis.
    pub expires: u64,
}

/// Request context handed in by the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub ip: Option<String>,
    pub host: Option<String>,
    pub protocol: Option<String>,
    pub query: BTreeMap<String, String>,
    /// Session key of the authenticated caller, when present.
    pub session_key: Option<String>,
    /// Whether the request body carried a passed captcha challenge.
    pub captcha_passed: bool,
}

impl RequestInfo {
    pub fn with_ip(ip: impl Into<String>) -> Self {
        Self {
            ip: Some(ip.into()),
            ..Default::default()
        }
    }
}
