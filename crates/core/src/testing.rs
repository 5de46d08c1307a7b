//! Deterministic doubles for the external collaborators.

use crate::embeddings::EmbeddingClient;
use crate::error::ServiceError;
use crate::generation::GenerativeBackend;
use crate::models::IngestionOptions;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const VOCABULARY: [&str; 10] = [
    "python",
    "aws",
    "rust",
    "java",
    "kubernetes",
    "engineer",
    "experience",
    "years",
    "gardening",
    "recipe",
];

const KNOWN_SKILLS: [&str; 5] = ["Python", "AWS", "Rust", "Java", "Kubernetes"];

pub fn quick_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
        call_timeout: Duration::from_secs(2),
    }
}

pub fn test_options() -> IngestionOptions {
    IngestionOptions {
        chunk_max_chars: 40,
        chunk_overlap_chars: 10,
        max_attempts: 3,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
        call_timeout: Duration::from_secs(2),
        ..IngestionOptions::default()
    }
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_lowercase())
}

/// Bag-of-words over a fixed vocabulary; unrelated texts are orthogonal.
#[derive(Default)]
pub struct KeywordEmbedder {
    calls: AtomicUsize,
    failures_left: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn failing_first(failures: usize) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(failures),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; VOCABULARY.len()];
        for token in tokens(text) {
            if let Some(position) = VOCABULARY.iter().position(|word| *word == token) {
                vector[position] += 1.0;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingClient for KeywordEmbedder {
    fn dimensions(&self) -> usize {
        VOCABULARY.len()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ServiceError::Unavailable("embedding service warming up".to_string()));
        }
        Ok(texts.iter().map(|text| Self::vector(text)).collect())
    }
}

/// Replays queued extraction replies and records correction feedback.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, ServiceError>>>,
    corrections: Mutex<Vec<String>>,
    extract_calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn with_replies(replies: Vec<Result<String, ServiceError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            corrections: Mutex::new(Vec::new()),
            extract_calls: AtomicUsize::new(0),
        }
    }

    pub fn extract_calls(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }

    pub fn corrections(&self) -> Vec<String> {
        self.corrections.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    async fn extract_structured(
        &self,
        _text: &str,
        _schema: &Value,
        correction: Option<&str>,
    ) -> Result<String, ServiceError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(feedback) = correction {
            self.corrections.lock().unwrap().push(feedback.to_string());
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ServiceError::Request("script exhausted".to_string())))
    }

    async fn answer_grounded(
        &self,
        _question: &str,
        _context: &[String],
    ) -> Result<String, ServiceError> {
        Err(ServiceError::Request("not scripted".to_string()))
    }
}

/// Reads the name before the first comma and picks known skills out of the text.
/// Texts containing `MALFORMED` always get an unusable reply.
#[derive(Default)]
pub struct ResumeBackend {
    delay: Duration,
    extract_calls: AtomicUsize,
    answer_calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ResumeBackend {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn extract_calls(&self) -> usize {
        self.extract_calls.load(Ordering::SeqCst)
    }

    pub fn answer_calls(&self) -> usize {
        self.answer_calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeBackend for ResumeBackend {
    async fn extract_structured(
        &self,
        text: &str,
        _schema: &Value,
        _correction: Option<&str>,
    ) -> Result<String, ServiceError> {
        self.extract_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if text.contains("MALFORMED") {
            return Ok("Sorry, I cannot read this resume.".to_string());
        }

        let name = text.split(',').next().unwrap_or_default().trim().to_string();
        let email = format!("{}@example.com", name.to_lowercase().replace(' ', "."));
        let words: Vec<String> = tokens(text).collect();
        let skills: Vec<&str> = KNOWN_SKILLS
            .iter()
            .copied()
            .filter(|skill| words.contains(&skill.to_lowercase()))
            .collect();

        Ok(json!({
            "name": name,
            "email": email,
            "skills": skills,
            "experience": null,
        })
        .to_string())
    }

    async fn answer_grounded(
        &self,
        question: &str,
        context: &[String],
    ) -> Result<String, ServiceError> {
        self.answer_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!(
            "Q: {question} A: based on {} passage(s): {}",
            context.len(),
            context.join(" | ")
        ))
    }
}
