use crate::batch::BatchCoordinator;
use crate::embeddings::EmbeddingClient;
use crate::error::{IngestError, QueryError, ServiceError};
use crate::generation::GenerativeBackend;
use crate::ingest::IngestionPipeline;
use crate::loader::DocumentLoader;
use crate::models::{BatchResult, Document, DocumentReport, IngestionOptions, QueryAnswer};
use crate::query::QueryEngine;
use crate::traits::VectorIndex;
use std::sync::Arc;
use tracing::info;

/// External collaborators shared by ingestion and querying.
#[derive(Clone)]
pub struct EngineBackends {
    pub loader: Arc<dyn DocumentLoader>,
    pub embedder: Arc<dyn EmbeddingClient>,
    pub index: Arc<dyn VectorIndex>,
    pub generator: Arc<dyn GenerativeBackend>,
}

/// Ingestion and question answering over one shared vector index.
pub struct ResumeEngine {
    options: IngestionOptions,
    pipeline: Arc<IngestionPipeline>,
    query: QueryEngine,
    index: Arc<dyn VectorIndex>,
}

impl ResumeEngine {
    pub fn new(options: IngestionOptions, backends: EngineBackends) -> Result<Self, IngestError> {
        if backends.embedder.dimensions() == 0 {
            return Err(IngestError::InvalidArgument(
                "embedding dimensions must be positive".to_string(),
            ));
        }

        let pipeline = IngestionPipeline::new(
            &options,
            Arc::clone(&backends.loader),
            Arc::clone(&backends.embedder),
            Arc::clone(&backends.index),
            Arc::clone(&backends.generator),
        )?;
        let query = QueryEngine::new(
            &options,
            backends.embedder,
            Arc::clone(&backends.index),
            backends.generator,
        );

        info!(
            chunk_max_chars = options.chunk_max_chars,
            chunk_overlap_chars = options.chunk_overlap_chars,
            top_k = options.top_k,
            "resume engine ready"
        );

        Ok(Self {
            options,
            pipeline: Arc::new(pipeline),
            query,
            index: backends.index,
        })
    }

    pub fn options(&self) -> &IngestionOptions {
        &self.options
    }

    pub async fn ingest_one(&self, document: Document) -> DocumentReport {
        self.pipeline.ingest(document).await
    }

    /// Rejects uploads larger than `max_batch_documents` before any work starts.
    pub fn admit_batch(&self, documents: &[Document]) -> Result<(), IngestError> {
        if documents.len() > self.options.max_batch_documents {
            return Err(IngestError::InvalidArgument(format!(
                "batch of {} documents exceeds the limit of {}",
                documents.len(),
                self.options.max_batch_documents
            )));
        }
        Ok(())
    }

    /// `None` falls back to the configured default concurrency.
    pub async fn ingest_batch(
        &self,
        documents: Vec<Document>,
        concurrency_limit: Option<usize>,
    ) -> BatchResult {
        let limit = concurrency_limit.unwrap_or(self.options.default_concurrency);
        BatchCoordinator::new(Arc::clone(&self.pipeline), limit)
            .run(documents)
            .await
    }

    pub async fn query(&self, question: &str) -> Result<QueryAnswer, QueryError> {
        self.query.answer(question).await
    }

    pub async fn indexed_segments(&self) -> Result<usize, ServiceError> {
        self.index.len().await
    }

    pub async fn reset_index(&self) -> Result<(), ServiceError> {
        self.index.reset().await?;
        info!("vector index reset");
        Ok(())
    }
}
