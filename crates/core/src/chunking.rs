use crate::error::IngestError;
use crate::models::{IngestionOptions, TextSegment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl ChunkingConfig {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Result<Self, IngestError> {
        if max_chars == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if overlap_chars >= max_chars {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {overlap_chars} must be smaller than chunk size {max_chars}"
            )));
        }
        Ok(Self {
            max_chars,
            overlap_chars,
        })
    }

    fn stride(&self) -> usize {
        self.max_chars - self.overlap_chars
    }
}

impl TryFrom<&IngestionOptions> for ChunkingConfig {
    type Error = IngestError;

    fn try_from(value: &IngestionOptions) -> Result<Self, Self::Error> {
        Self::new(value.chunk_max_chars, value.chunk_overlap_chars)
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Fixed-window splitter over Unicode scalar values.
///
/// Consecutive segments share exactly `overlap_chars` characters, so dropping
/// that prefix from every segment after the first gives back the input.
#[derive(Debug, Clone, Copy)]
pub struct TextChunker {
    config: ChunkingConfig,
}

impl TextChunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    pub fn split(&self, document_id: &str, text: &str) -> Vec<TextSegment> {
        let chars: Vec<char> = text.chars().collect();
        let mut segments = Vec::new();
        if chars.is_empty() {
            return segments;
        }

        let mut start = 0;
        loop {
            let end = (start + self.config.max_chars).min(chars.len());
            segments.push(TextSegment {
                document_id: document_id.to_string(),
                sequence: segments.len(),
                text: chars[start..end].iter().collect(),
            });
            if end == chars.len() {
                break;
            }
            start += self.config.stride();
        }

        segments
    }
}
