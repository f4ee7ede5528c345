//! Per-user database provisioning and the DB auth store.
//!
//! `DbAuth` owns the lifecycle of per-user databases (private and
//! shared), their security documents, and the per-session credentials
//! the backing database recognises for authorization.

pub mod errors;
mod server;

pub use errors::DbAuthError;
pub use server::{AuthKeyRecord, DatabaseServer, MemoryServer, SecurityDoc, SecurityMembers};

use std::collections::BTreeMap;
use std::sync::Arc;

use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::{
    Result,
    config::{Config, DbType},
    user::{PersonalDb, UserDoc},
};

/// Iterations of the at-rest digest for session passwords. Session
/// passwords are random 128-bit secrets, not human passwords.
const KEY_HASH_ITERATIONS: u32 = 1000;

/// Resolved provisioning settings for one logical database.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub name: String,
    pub db_type: DbType,
    pub permissions: Option<Vec<String>>,
    pub admin_roles: Vec<String>,
    pub member_roles: Vec<String>,
    pub design_docs: Vec<String>,
}

/// Hash a session password for storage in the auth database:
/// iterated SHA-256 over `salt || password`.
fn hash_session_password(salt: &str, password: &str) -> String {
    let mut digest = Sha256::new()
        .chain_update(salt.as_bytes())
        .chain_update(password.as_bytes())
        .finalize();
    for _ in 1..KEY_HASH_ITERATIONS {
        digest = Sha256::digest(digest);
    }
    hex::encode(digest)
}

/// Provisioning and credential management over a [`DatabaseServer`].
#[derive(Clone)]
pub struct DbAuth {
    server: Arc<dyn DatabaseServer>,
    config: Arc<Config>,
}

impl DbAuth {
    pub fn new(server: Arc<dyn DatabaseServer>, config: Arc<Config>) -> Self {
        Self { server, config }
    }

    pub fn server(&self) -> &Arc<dyn DatabaseServer> {
        &self.server
    }

    /// Resolve the provisioning settings for a logical database:
    /// `user_dbs.model._default` overlaid with the named model.
    pub fn get_db_config(&self, logical_name: &str, type_default: DbType) -> DbConfig {
        let model = self.config.db_model(logical_name);
        DbConfig {
            name: logical_name.to_string(),
            db_type: model.db_type.unwrap_or(type_default),
            permissions: model.permissions,
            admin_roles: model.admin_roles,
            member_roles: model.member_roles,
            design_docs: model.design_docs,
        }
    }

    /// Physical name of a user's database.
    pub fn physical_name(&self, user_id: &str, logical_name: &str, db_type: DbType) -> String {
        match db_type {
            DbType::Private => format!(
                "{}_{}${}",
                self.config.user_dbs.private_prefix, logical_name, user_id
            ),
            DbType::Shared => logical_name.to_string(),
        }
    }

    /// Provision one database for a user and return its physical name.
    ///
    /// Private databases get their security document rewritten on every
    /// call; shared databases are initialized only when first created.
    pub async fn add_user_db(
        &self,
        user: &UserDoc,
        logical_name: &str,
        design_docs: &[String],
        db_type: DbType,
        admin_roles: &[String],
        member_roles: &[String],
    ) -> Result<String> {
        let physical = self.physical_name(&user.id, logical_name, db_type);
        let created = self.server.create_db(&physical).await?;

        if db_type == DbType::Private || created {
            let defaults = &self.config.user_dbs.default_security_roles;
            let mut security = if created {
                SecurityDoc::default()
            } else {
                self.server.get_security(&physical).await?
            };
            for role in defaults.admins.iter().chain(admin_roles) {
                if !security.admins.roles.contains(role) {
                    security.admins.roles.push(role.clone());
                }
            }
            for role in defaults.members.iter().chain(member_roles) {
                if !security.members.roles.contains(role) {
                    security.members.roles.push(role.clone());
                }
            }
            self.server.put_security(&physical, &security).await?;
        }

        for name in design_docs {
            match self.config.user_dbs.design_docs.get(name) {
                Some(doc) => self.server.insert_design_doc(&physical, doc).await?,
                None => warn!(design_doc = %name, db = %physical, "unknown design doc, skipping"),
            }
        }

        Ok(physical)
    }

    /// Write a session credential to the DB auth store. The password is
    /// hashed at rest.
    pub async fn store_key(
        &self,
        user_id: &str,
        key: &str,
        password: &str,
        expires: u64,
        roles: &[String],
    ) -> Result<()> {
        let mut salt_bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt_bytes);
        let salt = hex::encode(salt_bytes);

        let record = AuthKeyRecord {
            key: key.to_string(),
            user_id: user_id.to_string(),
            derived_key: hash_session_password(&salt, password),
            salt,
            expires,
            roles: roles.to_vec(),
        };
        self.server.store_auth_key(&record).await
    }

    /// Verify a session password against a stored credential record.
    pub fn verify_key(record: &AuthKeyRecord, password: &str) -> bool {
        hash_session_password(&record.salt, password) == record.derived_key
    }

    /// Grant a key membership in every listed database.
    pub async fn authorize_user_sessions(
        &self,
        user_id: &str,
        personal_dbs: &BTreeMap<String, PersonalDb>,
        key: &str,
        _roles: &[String],
    ) -> Result<()> {
        for physical in personal_dbs.keys() {
            let mut security = self.server.get_security(physical).await?;
            if security.members.add_name(key) {
                self.server.put_security(physical, &security).await?;
            }
        }
        tracing::debug!(user_id, key, "authorized session key");
        Ok(())
    }

    /// Revoke key membership across all of a user's databases.
    pub async fn deauthorize_user(&self, user: &UserDoc, keys: &[String]) -> Result<()> {
        for physical in user.personal_dbs.keys() {
            let mut security = self.server.get_security(physical).await?;
            if security.members.remove_names(keys) > 0 {
                self.server.put_security(physical, &security).await?;
            }
        }
        Ok(())
    }

    /// Delete credentials from the DB auth store.
    pub async fn remove_keys(&self, keys: &[String]) -> Result<usize> {
        self.server.remove_auth_keys(keys).await
    }

    /// Destroy a database.
    pub async fn remove_db(&self, physical_name: &str) -> Result<()> {
        self.server.destroy_db(physical_name).await
    }

    /// Sweep credentials whose expiry has passed.
    pub async fn remove_expired_keys(&self, now: u64) -> Result<usize> {
        let expired = self.server.expired_auth_keys(now).await?;
        if expired.is_empty() {
            return Ok(0);
        }
        self.server.remove_auth_keys(&expired).await
    }

    /// Mint a session credential on the server when it supports it
    /// (Cloudant-style API keys). `None` means generate locally.
    pub async fn generate_api_key(&self) -> Result<Option<(String, String)>> {
        if !self.config.db_server.cloudant {
            return Ok(None);
        }
        self.server.generate_api_key().await
    }
}
