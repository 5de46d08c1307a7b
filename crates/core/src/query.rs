use crate::embeddings::EmbeddingClient;
use crate::error::{QueryError, ServiceError};
use crate::generation::GenerativeBackend;
use crate::models::{IngestionOptions, QueryAnswer, ScoredEntry, SupportingSegment};
use crate::retry::RetryPolicy;
use crate::traits::VectorIndex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Answers questions from indexed segments only.
///
/// When nothing clears the similarity floor the generative backend is never
/// called and the fixed no-grounding answer is returned instead.
pub struct QueryEngine {
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn GenerativeBackend>,
    retry: RetryPolicy,
    top_k: usize,
    min_similarity: f32,
}

impl QueryEngine {
    pub fn new(
        options: &IngestionOptions,
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn GenerativeBackend>,
    ) -> Self {
        Self {
            embedder,
            index,
            generator,
            retry: RetryPolicy::from(options),
            top_k: options.top_k.max(1),
            min_similarity: options.min_similarity,
        }
    }

    pub async fn answer(&self, question: &str) -> Result<QueryAnswer, QueryError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(QueryError::EmptyQuestion);
        }
        let started = Instant::now();

        let vector = self.embed_question(question).await?;
        let index = &self.index;
        let vector = &vector;
        let top_k = self.top_k;
        let hits = self
            .retry
            .run("index_query", move || index.query(vector, top_k))
            .await
            .map_err(QueryError::VectorIndex)?;
        let hits: Vec<ScoredEntry> = hits
            .into_iter()
            .filter(|hit| hit.score > self.min_similarity)
            .collect();
        debug!(question, hits = hits.len(), "retrieved supporting segments");

        if hits.is_empty() {
            info!(question, "no grounding found");
            return Ok(QueryAnswer::without_grounding(question));
        }

        let context: Vec<String> = hits
            .iter()
            .map(|hit| hit.entry.segment.text.clone())
            .collect();
        let generator = &self.generator;
        let context_ref = &context;
        let answer = self
            .retry
            .run("answer_grounded", move || {
                generator.answer_grounded(question, context_ref)
            })
            .await
            .map_err(QueryError::QueryService)?;

        info!(
            question,
            sources = hits.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "answered question"
        );

        Ok(QueryAnswer {
            question: question.to_string(),
            answer: answer.trim().to_string(),
            grounded: true,
            sources: hits.iter().map(SupportingSegment::from).collect(),
        })
    }

    async fn embed_question(&self, question: &str) -> Result<Vec<f32>, QueryError> {
        let embedder = &self.embedder;
        let texts = vec![question.to_string()];
        let texts = &texts;
        let mut vectors = self
            .retry
            .run("embed_question", move || embedder.embed(texts))
            .await
            .map_err(QueryError::QueryService)?;

        match vectors.pop() {
            Some(vector) if vectors.is_empty() => Ok(vector),
            _ => Err(QueryError::QueryService(ServiceError::BackendResponse {
                backend: "embeddings".to_string(),
                details: "expected exactly one vector for the question".to_string(),
            })),
        }
    }
}
