//! In-memory document store.
//!
//! Suitable for testing and development. Documents are kept as JSON
//! values so view evaluation walks the same wire shape a real document
//! store would index.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::{DocumentStore, StoreError};
use crate::{Result, design_docs::DesignDoc, design_docs::ViewDef, user::UserDoc};

#[derive(Default)]
struct Inner {
    /// id -> (revision counter, serialized document)
    docs: BTreeMap<String, (u64, Value)>,
    design_docs: BTreeMap<String, DesignDoc>,
}

/// A simple in-memory document store over a `RwLock`'d map.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.inner.read().await.docs.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.docs.is_empty()
    }

    fn format_rev(counter: u64) -> String {
        format!("{counter}-{}", crate::util::uuid32())
    }

    fn decode(id: &str, json: &Value) -> Result<UserDoc> {
        serde_json::from_value(json.clone()).map_err(|e| {
            StoreError::Backend {
                reason: format!("corrupt document {id}: {e}"),
            }
            .into()
        })
    }
}

/// Resolve a dotted field path inside a JSON document.
fn path_value<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Whether a view definition emits the given key for a document.
fn view_emits(def: &ViewDef, doc: &Value, key: &str) -> bool {
    match def {
        ViewDef::Field { paths } => paths.iter().any(|path| {
            path_value(doc, path).and_then(Value::as_str) == Some(key)
        }),
        ViewDef::SessionKeys => doc
            .get("session")
            .and_then(Value::as_object)
            .is_some_and(|sessions| sessions.contains_key(key)),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<UserDoc> {
        let inner = self.inner.read().await;
        match inner.docs.get(id) {
            Some((_, json)) => Self::decode(id, json),
            None => Err(StoreError::NotFound { id: id.to_string() }.into()),
        }
    }

    async fn put(&self, doc: &mut UserDoc) -> Result<()> {
        let mut inner = self.inner.write().await;
        let counter = match (inner.docs.get(&doc.id), &doc.rev) {
            (None, None) => 1,
            (Some((counter, json)), Some(rev)) => {
                let stored_rev = json.get("_rev").and_then(Value::as_str);
                if stored_rev != Some(rev.as_str()) {
                    return Err(StoreError::Conflict {
                        id: doc.id.clone(),
                    }
                    .into());
                }
                counter + 1
            }
            _ => {
                return Err(StoreError::Conflict {
                    id: doc.id.clone(),
                }
                .into());
            }
        };

        doc.rev = Some(Self::format_rev(counter));
        let json = serde_json::to_value(&*doc)?;
        inner.docs.insert(doc.id.clone(), (counter, json));
        Ok(())
    }

    async fn remove(&self, id: &str, rev: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let rev_matches = match inner.docs.get(id) {
            Some((_, json)) => json.get("_rev").and_then(Value::as_str) == Some(rev),
            None => return Err(StoreError::NotFound { id: id.to_string() }.into()),
        };
        if !rev_matches {
            return Err(StoreError::Conflict { id: id.to_string() }.into());
        }
        inner.docs.remove(id);
        Ok(())
    }

    async fn query_view(&self, ddoc: &str, view: &str, key: &str) -> Result<Vec<UserDoc>> {
        let inner = self.inner.read().await;
        let design = inner
            .design_docs
            .get(ddoc)
            .ok_or_else(|| StoreError::ViewNotFound {
                view: format!("{ddoc}/{view}"),
            })?;
        let def = design
            .views
            .get(view)
            .ok_or_else(|| StoreError::ViewNotFound {
                view: format!("{ddoc}/{view}"),
            })?
            .clone();
        let filter = design.doc_filter.clone();

        let mut rows = Vec::new();
        for (id, (_, json)) in &inner.docs {
            if let Some((field, value)) = &filter {
                if json.get(field).and_then(Value::as_str) != Some(value) {
                    continue;
                }
            }
            if view_emits(&def, json, key) {
                rows.push(Self::decode(id, json)?);
            }
        }
        Ok(rows)
    }

    async fn all_docs_range(&self, start: &str, end: &str) -> Result<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner
            .docs
            .range(start.to_string()..=end.to_string())
            .map(|(id, _)| id.clone())
            .collect())
    }

    async fn put_design_doc(&self, doc: &DesignDoc) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.design_docs.insert(doc.name.clone(), doc.clone());
        Ok(())
    }
}
