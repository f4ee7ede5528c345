//! Document store interface.
//!
//! The core never talks to the backing database directly; it consumes
//! this small trait. Implementations must provide optimistic concurrency
//! via revision tags and answer `ddoc/view` queries over the typed view
//! definitions in [`crate::design_docs`].
//!
//! The [`MemoryStore`] implementation backs the test suite and small
//! deployments; a CouchDB-compatible implementation lives with the
//! embedding application.

pub mod errors;
mod memory;

pub use errors::StoreError;
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::{Error, Result, design_docs::DesignDoc, user::UserDoc};

/// Storage abstraction for user documents.
///
/// All implementations must be `Send + Sync`; every method is a
/// suspension point and no locks may be held across calls.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document by id.
    async fn get(&self, id: &str) -> Result<UserDoc>;

    /// Fetch a document by id, mapping a missing document to `None`.
    async fn try_get(&self, id: &str) -> Result<Option<UserDoc>> {
        match self.get(id).await {
            Ok(doc) => Ok(Some(doc)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Persist a document.
    ///
    /// A new document must carry `rev: None`; an update must carry the
    /// revision tag it was read with. On success the document's `rev`
    /// is replaced with the newly assigned tag. A mismatched revision
    /// rejects with [`StoreError::Conflict`].
    async fn put(&self, doc: &mut UserDoc) -> Result<()>;

    /// Delete a document at the given revision.
    async fn remove(&self, id: &str, rev: &str) -> Result<()>;

    /// Query a view by exact key, returning matching documents.
    ///
    /// `view` is the `ddoc/view` pair, e.g. `("auth", "email")`.
    async fn query_view(&self, ddoc: &str, view: &str, key: &str) -> Result<Vec<UserDoc>>;

    /// Ids of all documents in the lexicographic range `[start, end]`.
    async fn all_docs_range(&self, start: &str, end: &str) -> Result<Vec<String>>;

    /// Install or replace a design document.
    async fn put_design_doc(&self, doc: &DesignDoc) -> Result<()>;
}

impl Error {
    /// Convenience constructor for adapter failures.
    pub fn store_backend(reason: impl Into<String>) -> Self {
        Error::Store(StoreError::Backend {
            reason: reason.into(),
        })
    }
}
