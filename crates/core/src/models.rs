use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::time::Duration;

pub const NO_GROUNDING_ANSWER: &str =
    "No relevant information was found in the ingested documents to answer this question.";

pub const NO_EXTRACTABLE_TEXT: &str = "no extractable text";

/// Raw input handed to the pipeline. Consumed by text extraction.
#[derive(Debug, Clone)]
pub struct Document {
    pub document_id: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), filename, bytes)
    }

    pub fn with_id(
        document_id: impl Into<String>,
        filename: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            filename: filename.into(),
            bytes,
        }
    }

    pub fn checksum(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytes);
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TextSegment {
    pub document_id: String,
    pub sequence: usize,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexedEntry {
    pub vector: Vec<f32>,
    pub segment: TextSegment,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredEntry {
    pub entry: IndexedEntry,
    pub score: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperienceEntry {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ExperienceEntry {
    pub fn is_blank(&self) -> bool {
        [&self.role, &self.company, &self.duration, &self.description]
            .iter()
            .all(|field| field.as_deref().map_or(true, |value| value.trim().is_empty()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EducationEntry {
    #[serde(default)]
    pub degree: Option<String>,
    #[serde(default)]
    pub institution: Option<String>,
    #[serde(default)]
    pub year: Option<String>,
}

impl EducationEntry {
    pub fn is_blank(&self) -> bool {
        [&self.degree, &self.institution, &self.year]
            .iter()
            .all(|field| field.as_deref().map_or(true, |value| value.trim().is_empty()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StructuredRecord {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub summary: Option<String>,
    pub skills: BTreeSet<String>,
    pub experience: Vec<ExperienceEntry>,
    pub education: Vec<EducationEntry>,
}

impl StructuredRecord {
    pub fn has_skill(&self, skill: &str) -> bool {
        self.skills
            .iter()
            .any(|known| known.eq_ignore_ascii_case(skill))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnreadableDocument,
    InvalidChunkConfig,
    InvalidArgument,
    EmbeddingServiceError,
    VectorIndexError,
    ExtractionServiceError,
    ExtractionSchemaViolation,
    Internal,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Load,
    Embed,
    Index,
    Extract,
    Schedule,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureDescriptor {
    pub kind: ErrorKind,
    pub stage: PipelineStage,
    pub message: String,
    pub retryable: bool,
}

impl FailureDescriptor {
    pub fn from_error(stage: PipelineStage, error: &crate::IngestError) -> Self {
        Self {
            kind: error.kind(),
            stage,
            message: error.to_string(),
            retryable: error.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentOutcome {
    Extracted(StructuredRecord),
    Incomplete { reason: String },
    Failed(FailureDescriptor),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentReport {
    pub document_id: String,
    pub filename: String,
    pub checksum: String,
    pub segments_indexed: usize,
    pub outcome: DocumentOutcome,
}

impl DocumentReport {
    pub fn record(&self) -> Option<&StructuredRecord> {
        match &self.outcome {
            DocumentOutcome::Extracted(record) => Some(record),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&FailureDescriptor> {
        match &self.outcome {
            DocumentOutcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure().is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    pub concurrency_limit: usize,
    pub peak_in_flight: usize,
    pub entries: Vec<DocumentReport>,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, document_id: &str) -> Option<&DocumentReport> {
        self.entries
            .iter()
            .find(|entry| entry.document_id == document_id)
    }

    pub fn failed(&self) -> impl Iterator<Item = &DocumentReport> {
        self.entries.iter().filter(|entry| entry.is_failed())
    }

    pub fn extracted(&self) -> impl Iterator<Item = &DocumentReport> {
        self.entries.iter().filter(|entry| entry.record().is_some())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupportingSegment {
    pub document_id: String,
    pub filename: String,
    pub sequence: usize,
    pub score: f32,
    pub text: String,
}

impl From<&ScoredEntry> for SupportingSegment {
    fn from(value: &ScoredEntry) -> Self {
        Self {
            document_id: value.entry.segment.document_id.clone(),
            filename: value.entry.filename.clone(),
            sequence: value.entry.segment.sequence,
            score: value.score,
            text: value.entry.segment.text.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryAnswer {
    pub question: String,
    pub answer: String,
    pub grounded: bool,
    pub sources: Vec<SupportingSegment>,
}

impl QueryAnswer {
    pub fn without_grounding(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: NO_GROUNDING_ANSWER.to_string(),
            grounded: false,
            sources: Vec::new(),
        }
    }
}

/// Process-wide knobs, fixed once the engine is built.
#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_max_chars: usize,
    pub chunk_overlap_chars: usize,
    pub default_concurrency: usize,
    /// Upper bound on documents accepted in one upload.
    pub max_batch_documents: usize,
    pub top_k: usize,
    pub min_similarity: f32,
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub call_timeout: Duration,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_max_chars: 1_000,
            chunk_overlap_chars: 200,
            default_concurrency: 5,
            max_batch_documents: 100,
            top_k: 4,
            min_similarity: 0.0,
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
            call_timeout: Duration::from_secs(60),
        }
    }
}
