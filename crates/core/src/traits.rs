use crate::{IndexedEntry, ScoredEntry, ServiceError};
use async_trait::async_trait;

/// Shared semantic index. Implementations must tolerate concurrent inserts
/// interleaved with queries.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Appends entries; all entries of one call become visible together.
    async fn insert(&self, entries: Vec<IndexedEntry>) -> Result<(), ServiceError>;

    /// Up to `k` entries by descending cosine similarity, earlier inserts first on ties.
    /// An empty index yields an empty result.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredEntry>, ServiceError>;

    async fn len(&self) -> Result<usize, ServiceError>;

    /// Drops every entry.
    async fn reset(&self) -> Result<(), ServiceError>;
}
