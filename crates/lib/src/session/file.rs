//! File-backed session adapter.
//!
//! One JSON file per stored entry under `session.file.sessions_root`.
//! File names are the hex encoding of the logical key, which keeps
//! arbitrary key characters out of the filesystem.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;

use super::{SessionAdapter, SessionError, SessionToken};
use crate::{Result, clock::Clock};

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileEntry {
    value: String,
    expires_at: u64,
}

/// Session adapter persisting entries as JSON files.
pub struct FileAdapter {
    root: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FileAdapter {
    pub fn new(root: PathBuf, clock: Arc<dyn Clock>) -> Self {
        Self { root, clock }
    }

    fn path_for(&self, namespace: &str, key: &str) -> PathBuf {
        self.root
            .join(format!("{namespace}-{}.json", hex::encode(key)))
    }

    async fn write_entry(&self, path: PathBuf, entry: &FileEntry) -> Result<()> {
        fs::create_dir_all(&self.root).await?;
        let raw = serde_json::to_string(entry)?;
        fs::write(path, raw).await?;
        Ok(())
    }

    async fn read_entry(&self, path: PathBuf) -> Result<Option<FileEntry>> {
        match fs::read_to_string(&path).await {
            Ok(raw) => {
                let entry: FileEntry = serde_json::from_str(&raw)
                    .map_err(|e| SessionError::backend(format!("corrupt session file: {e}")))?;
                if entry.expires_at > self.clock.now_millis() {
                    Ok(Some(entry))
                } else {
                    let _ = fs::remove_file(&path).await;
                    Ok(None)
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_paths(&self, namespace: &str, keys: &[String]) -> Result<usize> {
        let mut deleted = 0;
        for key in keys {
            match fs::remove_file(self.path_for(namespace, key)).await {
                Ok(()) => deleted += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(deleted)
    }
}

#[async_trait]
impl SessionAdapter for FileAdapter {
    async fn store_token(&self, token: &SessionToken) -> Result<()> {
        let entry = FileEntry {
            value: serde_json::to_string(token)?,
            expires_at: token.expires,
        };
        self.write_entry(self.path_for("token", &token.key), &entry)
            .await
    }

    async fn fetch_token(&self, key: &str) -> Result<Option<SessionToken>> {
        match self.read_entry(self.path_for("token", key)).await? {
            Some(entry) => Ok(Some(serde_json::from_str(&entry.value)?)),
            None => Ok(None),
        }
    }

    async fn delete_tokens(&self, keys: &[String]) -> Result<usize> {
        self.delete_paths("token", keys).await
    }

    async fn store_key(&self, name: &str, ttl_secs: u64, value: &str) -> Result<()> {
        let entry = FileEntry {
            value: value.to_string(),
            expires_at: self.clock.now_millis() + ttl_secs * 1000,
        };
        self.write_entry(self.path_for("key", name), &entry).await
    }

    async fn get_key(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .read_entry(self.path_for("key", name))
            .await?
            .map(|entry| entry.value))
    }

    async fn delete_keys(&self, names: &[String]) -> Result<usize> {
        self.delete_paths("key", names).await
    }

    async fn remove_expired(&self) -> Result<usize> {
        let now = self.clock.now_millis();
        let mut removed = 0;

        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        while let Some(dirent) = dir.next_entry().await? {
            let path = dirent.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(raw) = fs::read_to_string(&path).await else {
                continue;
            };
            let Ok(entry) = serde_json::from_str::<FileEntry>(&raw) else {
                continue;
            };
            if entry.expires_at <= now {
                fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
