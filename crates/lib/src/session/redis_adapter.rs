//! Redis session adapter.
//!
//! TTLs are delegated to Redis (`SET … EX`), so expired entries vanish
//! without a sweep. Tokens and named keys live under distinct prefixes.

use async_trait::async_trait;
use redis::AsyncCommands;

use super::{SessionAdapter, SessionError, SessionToken};
use crate::Result;

const TOKEN_PREFIX: &str = "token:";
const KEY_PREFIX: &str = "key:";

/// Session adapter over a Redis server.
pub struct RedisAdapter {
    client: redis::Client,
}

impl RedisAdapter {
    /// Create an adapter for the given Redis URL
    /// (e.g. `redis://127.0.0.1/`).
    pub fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| SessionError::backend(format!("redis: {e}")))?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| SessionError::backend(format!("redis: {e}")).into())
    }

    async fn set_with_ttl(&self, key: String, value: String, ttl_secs: u64) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_secs.max(1))
            .await
            .map_err(|e| SessionError::backend(format!("redis: {e}")))?;
        Ok(())
    }

    async fn get_string(&self, key: String) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        conn.get(key)
            .await
            .map_err(|e| SessionError::backend(format!("redis: {e}")).into())
    }

    async fn delete(&self, keys: Vec<String>) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let deleted: usize = conn
            .del(keys)
            .await
            .map_err(|e| SessionError::backend(format!("redis: {e}")))?;
        Ok(deleted)
    }
}

#[async_trait]
impl SessionAdapter for RedisAdapter {
    async fn store_token(&self, token: &SessionToken) -> Result<()> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let ttl_secs = token.expires.saturating_sub(now) / 1000;
        let value = serde_json::to_string(token)?;
        self.set_with_ttl(format!("{TOKEN_PREFIX}{}", token.key), value, ttl_secs)
            .await
    }

    async fn fetch_token(&self, key: &str) -> Result<Option<SessionToken>> {
        match self.get_string(format!("{TOKEN_PREFIX}{key}")).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn delete_tokens(&self, keys: &[String]) -> Result<usize> {
        self.delete(keys.iter().map(|k| format!("{TOKEN_PREFIX}{k}")).collect())
            .await
    }

    async fn store_key(&self, name: &str, ttl_secs: u64, value: &str) -> Result<()> {
        self.set_with_ttl(format!("{KEY_PREFIX}{name}"), value.to_string(), ttl_secs)
            .await
    }

    async fn get_key(&self, name: &str) -> Result<Option<String>> {
        self.get_string(format!("{KEY_PREFIX}{name}")).await
    }

    async fn delete_keys(&self, names: &[String]) -> Result<usize> {
        self.delete(names.iter().map(|n| format!("{KEY_PREFIX}{n}")).collect())
            .await
    }
}
