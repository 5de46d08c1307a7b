pub mod batch;
pub mod chunking;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod generation;
pub mod ingest;
pub mod loader;
pub mod models;
pub mod prompt;
pub mod query;
pub mod retry;
pub mod store;
pub mod stores;
pub mod structured;
pub mod traits;

#[cfg(test)]
mod testing;

pub use batch::{BatchCoordinator, InFlightGauge};
pub use chunking::{normalize_whitespace, ChunkingConfig, TextChunker};
pub use embeddings::{
    CharacterNgramEmbedder, EmbeddingClient, HttpEmbeddingClient, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use engine::{EngineBackends, ResumeEngine};
pub use error::{IngestError, QueryError, ServiceError};
pub use generation::{ChatCompletionsBackend, GenerativeBackend};
pub use ingest::IngestionPipeline;
pub use loader::{collect_documents, read_document, DocumentKind, DocumentLoader, FileTypeLoader};
pub use models::{
    BatchResult, Document, DocumentOutcome, DocumentReport, EducationEntry, ErrorKind,
    ExperienceEntry, FailureDescriptor, IndexedEntry, IngestionOptions, PipelineStage,
    QueryAnswer, ScoredEntry, StructuredRecord, SupportingSegment, TextSegment,
    NO_EXTRACTABLE_TEXT, NO_GROUNDING_ANSWER,
};
pub use query::QueryEngine;
pub use retry::RetryPolicy;
pub use stores::{InMemoryVectorIndex, QdrantStore};
pub use structured::StructuredExtractor;
pub use traits::VectorIndex;
