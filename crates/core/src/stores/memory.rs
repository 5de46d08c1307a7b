use crate::store::{cosine_similarity, rank_hits};
use crate::traits::VectorIndex;
use crate::{IndexedEntry, ScoredEntry, ServiceError};
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Brute-force cosine index held in process memory. Contents live for the run.
pub struct InMemoryVectorIndex {
    dimensions: usize,
    entries: RwLock<Vec<IndexedEntry>>,
}

impl InMemoryVectorIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            entries: RwLock::new(Vec::new()),
        }
    }

    fn check_dimensions(&self, found: usize) -> Result<(), ServiceError> {
        if found != self.dimensions {
            return Err(ServiceError::Request(format!(
                "vector dimension {found} does not match index dimension {}",
                self.dimensions
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn insert(&self, entries: Vec<IndexedEntry>) -> Result<(), ServiceError> {
        for entry in &entries {
            self.check_dimensions(entry.vector.len())?;
        }
        if entries.is_empty() {
            return Ok(());
        }

        self.entries.write().await.extend(entries);
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredEntry>, ServiceError> {
        let entries = self.entries.read().await;
        if entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        self.check_dimensions(vector.len())?;

        let hits = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| {
                (
                    position as u64,
                    ScoredEntry {
                        score: cosine_similarity(vector, &entry.vector),
                        entry: entry.clone(),
                    },
                )
            })
            .collect();

        Ok(rank_hits(hits, k))
    }

    async fn len(&self) -> Result<usize, ServiceError> {
        Ok(self.entries.read().await.len())
    }

    async fn reset(&self) -> Result<(), ServiceError> {
        self.entries.write().await.clear();
        Ok(())
    }
}
