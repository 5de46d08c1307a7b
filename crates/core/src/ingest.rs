use crate::chunking::{ChunkingConfig, TextChunker};
use crate::embeddings::EmbeddingClient;
use crate::error::{IngestError, ServiceError};
use crate::generation::GenerativeBackend;
use crate::loader::DocumentLoader;
use crate::models::{
    Document, DocumentOutcome, DocumentReport, FailureDescriptor, IndexedEntry,
    IngestionOptions, PipelineStage, TextSegment, NO_EXTRACTABLE_TEXT,
};
use crate::retry::RetryPolicy;
use crate::structured::StructuredExtractor;
use crate::traits::VectorIndex;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

type StageResult<T> = Result<T, (PipelineStage, IngestError)>;

/// Load → chunk → embed → index → extract for a single document.
///
/// Index entries written in the index step stay in place when extraction fails,
/// so the document remains queryable.
pub struct IngestionPipeline {
    loader: Arc<dyn DocumentLoader>,
    chunker: TextChunker,
    embedder: Arc<dyn EmbeddingClient>,
    index: Arc<dyn VectorIndex>,
    extractor: StructuredExtractor,
    retry: RetryPolicy,
}

impl IngestionPipeline {
    pub fn new(
        options: &IngestionOptions,
        loader: Arc<dyn DocumentLoader>,
        embedder: Arc<dyn EmbeddingClient>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn GenerativeBackend>,
    ) -> Result<Self, IngestError> {
        let chunker = TextChunker::new(ChunkingConfig::try_from(options)?);
        let retry = RetryPolicy::from(options);

        Ok(Self {
            loader,
            chunker,
            embedder,
            index,
            extractor: StructuredExtractor::new(generator, retry)?,
            retry,
        })
    }

    /// Never fails: every problem is folded into the report.
    pub async fn ingest(&self, document: Document) -> DocumentReport {
        let started = Instant::now();
        let mut report = DocumentReport {
            document_id: document.document_id.clone(),
            filename: document.filename.clone(),
            checksum: document.checksum(),
            segments_indexed: 0,
            outcome: DocumentOutcome::Incomplete {
                reason: NO_EXTRACTABLE_TEXT.to_string(),
            },
        };

        report.outcome = match self.run(document, &mut report.segments_indexed).await {
            Ok(outcome) => outcome,
            Err((stage, error)) => {
                warn!(
                    document_id = %report.document_id,
                    filename = %report.filename,
                    stage = ?stage,
                    segments_indexed = report.segments_indexed,
                    error = %error,
                    "document ingestion failed"
                );
                DocumentOutcome::Failed(FailureDescriptor::from_error(stage, &error))
            }
        };

        info!(
            document_id = %report.document_id,
            filename = %report.filename,
            segments_indexed = report.segments_indexed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "document processed"
        );
        report
    }

    async fn run(
        &self,
        document: Document,
        segments_indexed: &mut usize,
    ) -> StageResult<DocumentOutcome> {
        let document_id = document.document_id.clone();
        let filename = document.filename.clone();

        let text = self
            .load(document)
            .await
            .map_err(|error| (PipelineStage::Load, error))?;
        if text.trim().is_empty() {
            info!(document_id = %document_id, filename = %filename, "no extractable text");
            return Ok(DocumentOutcome::Incomplete {
                reason: NO_EXTRACTABLE_TEXT.to_string(),
            });
        }

        let segments = self.chunker.split(&document_id, &text);
        debug!(document_id = %document_id, segments = segments.len(), "text chunked");

        let vectors = self
            .embed(&segments)
            .await
            .map_err(|error| (PipelineStage::Embed, error))?;

        let entries: Vec<IndexedEntry> = segments
            .into_iter()
            .zip(vectors)
            .map(|(segment, vector)| IndexedEntry {
                vector,
                segment,
                filename: filename.clone(),
            })
            .collect();
        let count = entries.len();
        self.store(entries)
            .await
            .map_err(|error| (PipelineStage::Index, error))?;
        *segments_indexed = count;

        let record = self
            .extractor
            .extract(&text)
            .await
            .map_err(|error| (PipelineStage::Extract, error))?;

        Ok(DocumentOutcome::Extracted(record))
    }

    async fn load(&self, document: Document) -> Result<String, IngestError> {
        let loader = Arc::clone(&self.loader);
        tokio::task::spawn_blocking(move || loader.load(&document))
            .await
            .map_err(|error| IngestError::TaskFailed(error.to_string()))?
    }

    async fn embed(&self, segments: &[TextSegment]) -> Result<Vec<Vec<f32>>, IngestError> {
        let texts: Vec<String> = segments.iter().map(|segment| segment.text.clone()).collect();
        let embedder = &self.embedder;
        let texts = &texts;
        let vectors = self
            .retry
            .run("embed", move || embedder.embed(texts))
            .await
            .map_err(IngestError::EmbeddingService)?;

        if vectors.len() != segments.len() {
            return Err(IngestError::EmbeddingService(ServiceError::BackendResponse {
                backend: "embeddings".to_string(),
                details: format!(
                    "returned {} vectors for {} segments",
                    vectors.len(),
                    segments.len()
                ),
            }));
        }

        let dimensions = self.embedder.dimensions();
        if let Some(vector) = vectors.iter().find(|vector| vector.len() != dimensions) {
            return Err(IngestError::EmbeddingService(ServiceError::BackendResponse {
                backend: "embeddings".to_string(),
                details: format!("vector dimension {} != {}", vector.len(), dimensions),
            }));
        }

        Ok(vectors)
    }

    async fn store(&self, entries: Vec<IndexedEntry>) -> Result<(), IngestError> {
        let index = &self.index;
        let entries = &entries;
        self.retry
            .run("index_insert", move || index.insert(entries.clone()))
            .await
            .map_err(IngestError::VectorIndex)
    }
}
