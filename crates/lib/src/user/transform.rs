//! User document transformation pipelines.
//!
//! Applications can register `on_create` / `on_link` transformations
//! that adjust a user document before it is persisted. The pipeline is
//! a sequential async fold: each transformation receives the document
//! returned by the previous one and must return the updated document.
//! A transformation error aborts the pipeline and propagates unchanged.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::types::{RequestInfo, UserDoc};
use crate::Result;

/// Future returned by a transformation.
pub type TransformFuture = Pin<Box<dyn Future<Output = Result<UserDoc>> + Send>>;

/// One registered transformation. The signature forces every
/// transformation to return the updated document (or a future thereof);
/// other shapes do not typecheck.
pub type UserTransform = Arc<dyn Fn(UserDoc, RequestInfo) -> TransformFuture + Send + Sync>;

/// Wrap an async closure as a [`UserTransform`].
pub fn transform<F, Fut>(f: F) -> UserTransform
where
    F: Fn(UserDoc, RequestInfo) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<UserDoc>> + Send + 'static,
{
    Arc::new(move |doc, req| Box::pin(f(doc, req)))
}

/// Run a pipeline over a document, folding left to right.
pub async fn run_pipeline(
    transforms: &[UserTransform],
    mut doc: UserDoc,
    req: &RequestInfo,
) -> Result<UserDoc> {
    for t in transforms {
        doc = t(doc, req.clone()).await?;
    }
    Ok(doc)
}
