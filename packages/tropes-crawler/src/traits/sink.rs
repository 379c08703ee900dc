//! Dataset sink: the persistence boundary for works.

use async_trait::async_trait;

use crate::error::SinkResult;
use crate::types::work::Work;

/// Append/update-only store of works, keyed by work URL.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Store a new work. Fails with `AlreadyExists` if its identity is taken.
    async fn append(&self, work: &Work) -> SinkResult<()>;

    /// Replace the work stored under `identity`. Fails with `NotFound`.
    async fn update(&self, identity: &str, work: &Work) -> SinkResult<()>;

    /// Works whose media type matches `category`, in insertion order.
    async fn list_by_category(&self, category: &str) -> SinkResult<Vec<Work>>;

    /// A single work by identity.
    async fn get(&self, identity: &str) -> SinkResult<Option<Work>>;

    /// Append, or update when the identity already exists.
    async fn upsert(&self, work: &Work) -> SinkResult<()> {
        if self.get(work.url()).await?.is_some() {
            self.update(work.url(), work).await
        } else {
            self.append(work).await
        }
    }
}
