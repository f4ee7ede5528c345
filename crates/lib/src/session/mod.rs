//! Session token store.
//!
//! A pluggable KV holding session token records and short-lived named
//! keys (e.g. invite codes). Adapters must be behaviorally
//! indistinguishable: TTLs are enforced by the adapter and expired
//! entries are never returned.
//!
//! [`SessionStore`] wraps an adapter and implements token confirmation
//! once, so the password-match and expiry semantics cannot drift between
//! adapters.

pub mod errors;
mod file;
mod memory;
#[cfg(feature = "redis")]
mod redis_adapter;

pub use errors::SessionError;
pub use file::FileAdapter;
pub use memory::MemoryAdapter;
#[cfg(feature = "redis")]
pub use redis_adapter::RedisAdapter;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    Result,
    clock::Clock,
    config::{AdapterKind, Config},
};

/// A session token record as held by the session store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    /// Id of the owning user document.
    #[serde(rename = "_id")]
    pub user_id: String,
    /// Token key; doubles as the credential-store username.
    pub key: String,
    /// Session password. Stored once here; the only shared secret
    /// exchanged with the database auth store.
    pub password: String,
    /// Unix millis.
    pub issued: u64,
    /// Unix millis.
    pub expires: u64,
    pub provider: String,
    pub roles: Vec<String>,
}

/// Minimal authenticated view returned by `confirm_token`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    #[serde(rename = "_id")]
    pub user_id: String,
    pub key: String,
    pub roles: Vec<String>,
}

/// Pluggable KV backend for session tokens and named keys.
#[async_trait]
pub trait SessionAdapter: Send + Sync {
    /// Persist a token record. The record's own `expires` is its TTL.
    async fn store_token(&self, token: &SessionToken) -> Result<()>;

    /// Fetch a token by key. Expired or missing tokens return `None`.
    async fn fetch_token(&self, key: &str) -> Result<Option<SessionToken>>;

    /// Delete tokens; returns how many existed.
    async fn delete_tokens(&self, keys: &[String]) -> Result<usize>;

    /// Store a named key with a TTL in seconds.
    async fn store_key(&self, name: &str, ttl_secs: u64, value: &str) -> Result<()>;

    /// Fetch a named key. Expired or missing keys return `None`.
    async fn get_key(&self, name: &str) -> Result<Option<String>>;

    /// Delete named keys; returns how many existed.
    async fn delete_keys(&self, names: &[String]) -> Result<usize>;

    /// Remove entries whose TTL has passed. Adapters with native TTL
    /// (Redis) have nothing to do.
    async fn remove_expired(&self) -> Result<usize> {
        Ok(0)
    }

    /// Graceful shutdown.
    async fn quit(&self) -> Result<()> {
        Ok(())
    }
}

/// The session store: an adapter plus the shared confirmation logic.
#[derive(Clone)]
pub struct SessionStore {
    adapter: Arc<dyn SessionAdapter>,
    clock: Arc<dyn Clock>,
}

impl SessionStore {
    pub fn new(adapter: Arc<dyn SessionAdapter>, clock: Arc<dyn Clock>) -> Self {
        Self { adapter, clock }
    }

    /// Instantiate the adapter selected by `session.adapter`.
    ///
    /// Rejects `AdapterKind::Redis` unless the `redis` feature is
    /// enabled.
    pub fn from_config(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let adapter: Arc<dyn SessionAdapter> = match config.session.adapter {
            AdapterKind::Memory => Arc::new(MemoryAdapter::new(clock.clone())),
            AdapterKind::File => Arc::new(FileAdapter::new(
                config.session.file.sessions_root.clone(),
                clock.clone(),
            )),
            #[cfg(feature = "redis")]
            AdapterKind::Redis => Arc::new(RedisAdapter::connect(&config.session.redis.url)?),
            #[cfg(not(feature = "redis"))]
            AdapterKind::Redis => {
                return Err(SessionError::backend(
                    "redis adapter requires the `redis` feature",
                )
                .into());
            }
        };
        Ok(Self::new(adapter, clock))
    }

    pub async fn store_token(&self, token: &SessionToken) -> Result<()> {
        self.adapter.store_token(token).await
    }

    pub async fn fetch_token(&self, key: &str) -> Result<SessionToken> {
        self.adapter
            .fetch_token(key)
            .await?
            .ok_or_else(|| SessionError::NotFound {
                key: key.to_string(),
            }.into())
    }

    pub async fn delete_tokens(&self, keys: &[String]) -> Result<usize> {
        self.adapter.delete_tokens(keys).await
    }

    /// Confirm a `key:password` pair against the stored token.
    ///
    /// Succeeds iff the record exists, has not expired, and the
    /// password matches; anything else is [`SessionError::Unauthorized`].
    pub async fn confirm_token(&self, key: &str, password: &str) -> Result<SessionView> {
        let token = self
            .adapter
            .fetch_token(key)
            .await?
            .ok_or(SessionError::Unauthorized)?;

        if token.expires <= self.clock.now_millis() || token.password != password {
            return Err(SessionError::Unauthorized.into());
        }

        Ok(SessionView {
            user_id: token.user_id,
            key: token.key,
            roles: token.roles,
        })
    }

    pub async fn store_key(&self, name: &str, ttl_secs: u64, value: &str) -> Result<()> {
        self.adapter.store_key(name, ttl_secs, value).await
    }

    pub async fn get_key(&self, name: &str) -> Result<Option<String>> {
        self.adapter.get_key(name).await
    }

    pub async fn delete_keys(&self, names: &[String]) -> Result<usize> {
        self.adapter.delete_keys(names).await
    }

    /// Sweep entries whose TTL has passed.
    pub async fn remove_expired(&self) -> Result<usize> {
        self.adapter.remove_expired().await
    }

    /// Gracefully shut down the underlying adapter.
    pub async fn quit(&self) -> Result<()> {
        self.adapter.quit().await
    }
}
