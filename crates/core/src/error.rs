use crate::models::ErrorKind;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unreadable document {filename}: {details}")]
    UnreadableDocument { filename: String, details: String },

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("embedding service error: {0}")]
    EmbeddingService(#[source] ServiceError),

    #[error("vector index error: {0}")]
    VectorIndex(#[source] ServiceError),

    #[error("extraction service error: {0}")]
    ExtractionService(#[source] ServiceError),

    #[error("extraction output violates record schema: {0}")]
    ExtractionSchemaViolation(String),

    #[error("pipeline task failed: {0}")]
    TaskFailed(String),
}

impl IngestError {
    pub fn unreadable(filename: impl Into<String>, details: impl ToString) -> Self {
        Self::UnreadableDocument {
            filename: filename.into(),
            details: details.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::UnreadableDocument { .. } => ErrorKind::UnreadableDocument,
            Self::InvalidChunkConfig(_) => ErrorKind::InvalidChunkConfig,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::EmbeddingService(_) => ErrorKind::EmbeddingServiceError,
            Self::VectorIndex(_) => ErrorKind::VectorIndexError,
            Self::ExtractionService(_) => ErrorKind::ExtractionServiceError,
            Self::ExtractionSchemaViolation(_) => ErrorKind::ExtractionSchemaViolation,
            Self::RegexError(_) | Self::TaskFailed(_) => ErrorKind::Internal,
        }
    }

    /// Whether resubmitting the same document could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::EmbeddingService(source)
            | Self::VectorIndex(source)
            | Self::ExtractionService(source) => source.is_retryable(),
            _ => false,
        }
    }
}

/// Failure talking to an upstream collaborator (embedding, generation, vector store).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("{backend} returned status {status}: {details}")]
    Status {
        backend: String,
        status: StatusCode,
        details: String,
    },

    #[error("{operation} timed out after {timeout_ms} ms")]
    Timeout { operation: String, timeout_ms: u128 },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("request rejected: {0}")]
    Request(String),

    #[error("upstream unavailable: {0}")]
    Unavailable(String),
}

impl ServiceError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Unavailable(_) => true,
            Self::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::Http(error) => {
                error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
            }
            Self::BackendResponse { .. } => true,
            Self::Url(_) | Self::Serialization(_) | Self::Request(_) => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("question is empty")]
    EmptyQuestion,

    #[error("query service error: {0}")]
    QueryService(#[source] ServiceError),

    #[error("vector index error: {0}")]
    VectorIndex(#[source] ServiceError),
}

impl QueryError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::EmptyQuestion => false,
            Self::QueryService(source) | Self::VectorIndex(source) => source.is_retryable(),
        }
    }
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
