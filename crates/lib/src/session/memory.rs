//! In-memory session adapter.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{SessionAdapter, SessionToken};
use crate::{Result, clock::Clock};

/// A stored entry: the serialized value and its absolute expiry.
#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: u64,
}

/// Session adapter over a `RwLock`'d map. The default for tests and
/// single-process deployments.
pub struct MemoryAdapter {
    tokens: RwLock<HashMap<String, Entry>>,
    keys: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryAdapter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            keys: RwLock::new(HashMap::new()),
            clock,
        }
    }
}

#[async_trait]
impl SessionAdapter for MemoryAdapter {
    async fn store_token(&self, token: &SessionToken) -> Result<()> {
        let value = serde_json::to_string(token)?;
        self.tokens.write().await.insert(
            token.key.clone(),
            Entry {
                value,
                expires_at: token.expires,
            },
        );
        Ok(())
    }

    async fn fetch_token(&self, key: &str) -> Result<Option<SessionToken>> {
        let tokens = self.tokens.read().await;
        match tokens.get(key) {
            Some(entry) if entry.expires_at > self.clock.now_millis() => {
                Ok(Some(serde_json::from_str(&entry.value)?))
            }
            _ => Ok(None),
        }
    }

    async fn delete_tokens(&self, keys: &[String]) -> Result<usize> {
        let mut tokens = self.tokens.write().await;
        Ok(keys.iter().filter(|k| tokens.remove(*k).is_some()).count())
    }

    async fn store_key(&self, name: &str, ttl_secs: u64, value: &str) -> Result<()> {
        let expires_at = self.clock.now_millis() + ttl_secs * 1000;
        self.keys.write().await.insert(
            name.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn get_key(&self, name: &str) -> Result<Option<String>> {
        let keys = self.keys.read().await;
        match keys.get(name) {
            Some(entry) if entry.expires_at > self.clock.now_millis() => {
                Ok(Some(entry.value.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_keys(&self, names: &[String]) -> Result<usize> {
        let mut keys = self.keys.write().await;
        Ok(names.iter().filter(|n| keys.remove(*n).is_some()).count())
    }

    async fn remove_expired(&self) -> Result<usize> {
        let now = self.clock.now_millis();
        let mut removed = 0;
        for map in [&self.tokens, &self.keys] {
            let mut map = map.write().await;
            let before = map.len();
            map.retain(|_, entry| entry.expires_at > now);
            removed += before - map.len();
        }
        Ok(removed)
    }
}
