//! Database server interface.
//!
//! The admin surface of the backing database: database lifecycle,
//! security documents, and its credential (auth) database. The memory
//! implementation backs the test suite.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::errors::DbAuthError;
use crate::{Result, design_docs::DesignDoc};

/// A database security document: `{admins, members}`, each naming
/// individual credentials and roles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityDoc {
    #[serde(default)]
    pub admins: SecurityMembers,
    #[serde(default)]
    pub members: SecurityMembers,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecurityMembers {
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl SecurityMembers {
    /// Add a name, preserving order and uniqueness.
    pub fn add_name(&mut self, name: &str) -> bool {
        if self.names.iter().any(|n| n == name) {
            false
        } else {
            self.names.push(name.to_string());
            true
        }
    }

    pub fn remove_names(&mut self, names: &[String]) -> usize {
        let before = self.names.len();
        self.names.retain(|n| !names.contains(n));
        before - self.names.len()
    }
}

/// One credential record in the DB auth store. The session password is
/// hashed at rest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthKeyRecord {
    /// Credential name; equals the session token key.
    pub key: String,
    pub user_id: String,
    /// Hex salt for the at-rest password digest.
    pub salt: String,
    /// Iterated digest of the session password.
    pub derived_key: String,
    /// Unix millis.
    pub expires: u64,
    pub roles: Vec<String>,
}

/// Admin surface of the backing database server.
#[async_trait]
pub trait DatabaseServer: Send + Sync {
    /// Create a database. Returns `false` if it already existed.
    async fn create_db(&self, name: &str) -> Result<bool>;

    /// Destroy a database and everything in it.
    async fn destroy_db(&self, name: &str) -> Result<()>;

    async fn db_exists(&self, name: &str) -> Result<bool>;

    async fn get_security(&self, db: &str) -> Result<SecurityDoc>;

    async fn put_security(&self, db: &str, doc: &SecurityDoc) -> Result<()>;

    /// Install a design document into a database.
    async fn insert_design_doc(&self, db: &str, doc: &DesignDoc) -> Result<()>;

    /// Write a credential record the server recognises for authorization.
    async fn store_auth_key(&self, record: &AuthKeyRecord) -> Result<()>;

    /// Delete credential records; returns how many existed.
    async fn remove_auth_keys(&self, keys: &[String]) -> Result<usize>;

    /// Keys of credential records past their expiry.
    async fn expired_auth_keys(&self, now: u64) -> Result<Vec<String>>;

    /// Ask the server to mint an API key pair (Cloudant-style).
    /// Servers that cannot return `None`; callers then generate the
    /// credential locally.
    async fn generate_api_key(&self) -> Result<Option<(String, String)>> {
        Ok(None)
    }
}

#[derive(Debug, Default, Clone)]
struct DbState {
    security: SecurityDoc,
    design_docs: Vec<String>,
}

/// In-memory database server for tests and development.
#[derive(Default)]
pub struct MemoryServer {
    dbs: RwLock<HashMap<String, DbState>>,
    auth_keys: RwLock<HashMap<String, AuthKeyRecord>>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a credential record (test observability).
    pub async fn auth_key(&self, key: &str) -> Option<AuthKeyRecord> {
        self.auth_keys.read().await.get(key).cloned()
    }

    /// Design doc names installed into a database (test observability).
    pub async fn design_docs_of(&self, db: &str) -> Vec<String> {
        self.dbs
            .read()
            .await
            .get(db)
            .map(|state| state.design_docs.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DatabaseServer for MemoryServer {
    async fn create_db(&self, name: &str) -> Result<bool> {
        let mut dbs = self.dbs.write().await;
        if dbs.contains_key(name) {
            Ok(false)
        } else {
            dbs.insert(name.to_string(), DbState::default());
            Ok(true)
        }
    }

    async fn destroy_db(&self, name: &str) -> Result<()> {
        let mut dbs = self.dbs.write().await;
        dbs.remove(name)
            .map(|_| ())
            .ok_or_else(|| DbAuthError::DatabaseNotFound {
                name: name.to_string(),
            }.into())
    }

    async fn db_exists(&self, name: &str) -> Result<bool> {
        Ok(self.dbs.read().await.contains_key(name))
    }

    async fn get_security(&self, db: &str) -> Result<SecurityDoc> {
        let dbs = self.dbs.read().await;
        dbs.get(db)
            .map(|state| state.security.clone())
            .ok_or_else(|| DbAuthError::DatabaseNotFound {
                name: db.to_string(),
            }.into())
    }

    async fn put_security(&self, db: &str, doc: &SecurityDoc) -> Result<()> {
        let mut dbs = self.dbs.write().await;
        match dbs.get_mut(db) {
            Some(state) => {
                state.security = doc.clone();
                Ok(())
            }
            None => Err(DbAuthError::DatabaseNotFound {
                name: db.to_string(),
            }
            .into()),
        }
    }

    async fn insert_design_doc(&self, db: &str, doc: &DesignDoc) -> Result<()> {
        let mut dbs = self.dbs.write().await;
        match dbs.get_mut(db) {
            Some(state) => {
                if !state.design_docs.contains(&doc.name) {
                    state.design_docs.push(doc.name.clone());
                }
                Ok(())
            }
            None => Err(DbAuthError::DatabaseNotFound {
                name: db.to_string(),
            }
            .into()),
        }
    }

    async fn store_auth_key(&self, record: &AuthKeyRecord) -> Result<()> {
        self.auth_keys
            .write()
            .await
            .insert(record.key.clone(), record.clone());
        Ok(())
    }

    async fn remove_auth_keys(&self, keys: &[String]) -> Result<usize> {
        let mut auth_keys = self.auth_keys.write().await;
        Ok(keys
            .iter()
            .filter(|k| auth_keys.remove(*k).is_some())
            .count())
    }

    async fn expired_auth_keys(&self, now: u64) -> Result<Vec<String>> {
        let auth_keys = self.auth_keys.read().await;
        Ok(auth_keys
            .values()
            .filter(|r| r.expires <= now)
            .map(|r| r.key.clone())
            .collect())
    }
}
