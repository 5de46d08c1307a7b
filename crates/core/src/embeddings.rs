use crate::error::ServiceError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Maps texts to vectors of one fixed dimension, preserving input order.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError>;
}

#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

fn fnv1a(feature: &str) -> u64 {
    feature.bytes().fold(FNV_OFFSET, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME)
    })
}

impl CharacterNgramEmbedder {
    /// Hashes every word plus its boundary-marked trigrams into the vector, then
    /// L2-normalizes. Punctuation separates words, so "AWS," and "aws" agree.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let buckets = vector.len() as u64;

        let words = text
            .split(|c: char| !c.is_alphanumeric() && c != '+' && c != '#')
            .filter(|word| !word.is_empty())
            .map(str::to_lowercase);

        for word in words {
            vector[(fnv1a(&word) % buckets) as usize] += 1.0;

            let marked: Vec<char> = format!("^{word}$").chars().collect();
            for window in marked.windows(3) {
                let trigram: String = window.iter().collect();
                vector[(fnv1a(&trigram) % buckets) as usize] += 0.5;
            }
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vector.iter_mut().for_each(|value| *value /= magnitude);
        }

        vector
    }
}

#[async_trait]
impl EmbeddingClient for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

/// Client for OpenAI-compatible `/embeddings` endpoints (OpenAI, Ollama, vLLM).
#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    dimensions: usize,
}

impl HttpEmbeddingClient {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        dimensions: usize,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(ServiceError::Request("missing embedding model name".to_string()));
        }
        let endpoint = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))?
            .join("embeddings")?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            model,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            dimensions,
        })
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let details = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ServiceError::Status {
                backend: "embeddings".to_string(),
                status,
                details,
            });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        order_embeddings(parsed, texts.len(), self.dimensions)
    }
}

fn order_embeddings(
    mut parsed: EmbeddingResponse,
    expected: usize,
    dimensions: usize,
) -> Result<Vec<Vec<f32>>, ServiceError> {
    parsed.data.sort_by_key(|entry| entry.index);
    if parsed.data.len() != expected {
        return Err(ServiceError::BackendResponse {
            backend: "embeddings".to_string(),
            details: format!(
                "returned {} embeddings for {} inputs",
                parsed.data.len(),
                expected
            ),
        });
    }

    parsed
        .data
        .into_iter()
        .map(|entry| {
            if entry.embedding.len() == dimensions {
                Ok(entry.embedding)
            } else {
                Err(ServiceError::BackendResponse {
                    backend: "embeddings".to_string(),
                    details: format!(
                        "embedding dimension {} != {}",
                        entry.embedding.len(),
                        dimensions
                    ),
                })
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::cosine_similarity;

    #[test]
    fn resumes_sharing_skills_are_closer_than_unrelated_text() {
        let embedder = CharacterNgramEmbedder::default();
        let jane = embedder.embed_text("Jane Doe, Python and AWS engineer, 5 years experience");
        let john = embedder.embed_text("John Roe: AWS Lambda and Python developer");
        let recipe = embedder.embed_text("Slow-cooked tomato sauce with basil and garlic");

        let related = cosine_similarity(&jane, &john);
        let unrelated = cosine_similarity(&jane, &recipe);
        assert!(related > unrelated, "related={related} unrelated={unrelated}");
    }

    #[test]
    fn case_and_punctuation_do_not_change_the_vector() {
        let embedder = CharacterNgramEmbedder { dimensions: 64 };
        let plain = embedder.embed_text("rust kubernetes c++");
        let noisy = embedder.embed_text("Rust, KUBERNETES; C++!");
        assert_eq!(plain.len(), 64);
        assert_eq!(plain, noisy);

        let norm: f32 = plain.iter().map(|value| value * value).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(embedder.embed_text("  ...  ").iter().all(|value| *value == 0.0));
    }

    #[tokio::test]
    async fn batch_and_single_calls_agree() {
        let embedder = CharacterNgramEmbedder::default();
        let texts = vec!["Rust".to_string(), "Kubernetes operator".to_string()];
        let batch = embedder.embed(&texts).await.unwrap();
        let single = embedder.embed(&texts[1..]).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1], single[0]);
    }

    #[test]
    fn http_responses_are_reordered_by_index() {
        let parsed = EmbeddingResponse {
            data: vec![
                EmbeddingData {
                    embedding: vec![2.0, 2.0],
                    index: 1,
                },
                EmbeddingData {
                    embedding: vec![1.0, 1.0],
                    index: 0,
                },
            ],
        };
        let ordered = order_embeddings(parsed, 2, 2).unwrap();
        assert_eq!(ordered, vec![vec![1.0, 1.0], vec![2.0, 2.0]]);
    }

    #[test]
    fn http_responses_with_wrong_shape_are_rejected() {
        let parsed = EmbeddingResponse {
            data: vec![EmbeddingData {
                embedding: vec![1.0],
                index: 0,
            }],
        };
        assert!(order_embeddings(parsed, 1, 3).is_err());

        let missing = EmbeddingResponse { data: Vec::new() };
        assert!(order_embeddings(missing, 1, 3).is_err());
    }

    #[test]
    fn endpoint_is_joined_onto_base_url() {
        let client = HttpEmbeddingClient::new(
            "http://localhost:11434/v1",
            "nomic-embed-text",
            None,
            768,
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(client.endpoint.as_str(), "http://localhost:11434/v1/embeddings");
    }
}
