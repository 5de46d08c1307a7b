use crate::store::rank_hits;
use crate::traits::VectorIndex;
use crate::{IndexedEntry, ScoredEntry, ServiceError, TextSegment};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::info;

/// Vector index backed by a Qdrant collection using cosine distance.
pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
    sequence: AtomicU64,
}

impl QdrantStore {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        vector_size: usize,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            client: Client::builder().timeout(timeout).build()?,
            vector_size,
            sequence: AtomicU64::new(0),
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    /// Creates the collection when it does not exist yet.
    pub async fn ensure_collection(&self) -> Result<(), ServiceError> {
        let response = self.client.get(self.collection_url()).send().await?;
        if response.status().is_success() {
            let parsed: Value = response.json().await?;
            let size = parsed
                .pointer("/result/config/params/vectors/size")
                .and_then(Value::as_u64)
                .unwrap_or(self.vector_size as u64);
            if size as usize != self.vector_size {
                return Err(ServiceError::Request(format!(
                    "collection {} has vector size {} but embeddings have {}",
                    self.collection, size, self.vector_size
                )));
            }
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(status_error(response.status()));
        }

        let response = self
            .client
            .put(self.collection_url())
            .json(&json!({
                "vectors": { "size": self.vector_size, "distance": "Cosine" }
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(status_error(response.status()));
        }

        info!(collection = %self.collection, vector_size = self.vector_size, "created qdrant collection");
        Ok(())
    }
}

fn status_error(status: StatusCode) -> ServiceError {
    ServiceError::Status {
        backend: "qdrant".to_string(),
        status,
        details: String::new(),
    }
}

fn point_payload(entry: &IndexedEntry, inserted_at: i64, sequence: u64) -> Value {
    json!({
        "document_id": entry.segment.document_id,
        "segment_sequence": entry.segment.sequence,
        "text": entry.segment.text,
        "filename": entry.filename,
        "inserted_at": inserted_at,
        "insert_sequence": sequence,
    })
}

fn hit_from_point(hit: &Value) -> Option<(u64, i64, ScoredEntry)> {
    let payload = hit.pointer("/payload")?;
    let text = |key: &str| {
        payload
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    let vector = hit
        .pointer("/vector")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_f64)
                .map(|value| value as f32)
                .collect()
        })
        .unwrap_or_default();

    let entry = IndexedEntry {
        vector,
        segment: TextSegment {
            document_id: text("document_id"),
            sequence: payload.get("segment_sequence").and_then(Value::as_u64)? as usize,
            text: text("text"),
        },
        filename: text("filename"),
    };

    Some((
        payload.get("insert_sequence").and_then(Value::as_u64).unwrap_or_default(),
        payload.get("inserted_at").and_then(Value::as_i64).unwrap_or_default(),
        ScoredEntry {
            entry,
            score: hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32,
        },
    ))
}

/// Qdrant breaks score ties arbitrarily, so searches fetch extra candidates
/// and the earliest inserted entries win the cut to `k`.
fn search_limit(k: usize) -> usize {
    k.saturating_mul(4).max(k.saturating_add(16))
}

/// Re-rank ties by insert time, then the per-process sequence.
fn rank_points(points: &[Value], k: usize) -> Vec<ScoredEntry> {
    let mut parsed: Vec<(u64, i64, ScoredEntry)> = points.iter().filter_map(hit_from_point).collect();
    parsed.sort_by_key(|(sequence, inserted_at, _)| (*inserted_at, *sequence));
    let hits = parsed
        .into_iter()
        .enumerate()
        .map(|(position, (_, _, hit))| (position as u64, hit))
        .collect();
    rank_hits(hits, k)
}

#[async_trait]
impl VectorIndex for QdrantStore {
    async fn insert(&self, entries: Vec<IndexedEntry>) -> Result<(), ServiceError> {
        let inserted_at = Utc::now().timestamp_micros();
        let points = entries
            .iter()
            .map(|entry| {
                if entry.vector.len() != self.vector_size {
                    return Err(ServiceError::Request(format!(
                        "embedding dimension {} != {}",
                        entry.vector.len(),
                        self.vector_size
                    )));
                }

                let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
                Ok(json!({
                    "id": uuid::Uuid::new_v4().to_string(),
                    "vector": entry.vector,
                    "payload": point_payload(entry, inserted_at, sequence),
                }))
            })
            .collect::<Result<Vec<_>, ServiceError>>()?;

        if points.is_empty() {
            return Ok(());
        }

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response.status()));
        }

        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<ScoredEntry>, ServiceError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if vector.len() != self.vector_size {
            return Err(ServiceError::Request(format!(
                "query vector dim {} is not {}",
                vector.len(),
                self.vector_size
            )));
        }

        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&json!({
                "vector": vector,
                "limit": search_limit(k),
                "with_payload": true,
                "with_vector": true,
            }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(status_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        let points = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(rank_points(&points, k))
    }

    async fn len(&self) -> Result<usize, ServiceError> {
        let response = self
            .client
            .post(format!("{}/points/count", self.collection_url()))
            .json(&json!({ "exact": true }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }
        if !response.status().is_success() {
            return Err(status_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        Ok(parsed
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .unwrap_or_default() as usize)
    }

    async fn reset(&self) -> Result<(), ServiceError> {
        let response = self.client.delete(self.collection_url()).send().await?;
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(status_error(response.status()));
        }
        self.ensure_collection().await
    }
}
