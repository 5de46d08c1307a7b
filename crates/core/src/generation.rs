use crate::error::ServiceError;
use crate::prompt::{
    extraction_prompt, grounded_answer_prompt, EXTRACTION_SYSTEM_PROMPT, GROUNDED_SYSTEM_PROMPT,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Generative model capabilities used by extraction and question answering.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Returns the model's raw reply, expected to be JSON matching `schema`.
    /// `correction` carries the validation error of a previous reply.
    async fn extract_structured(
        &self,
        text: &str,
        schema: &Value,
        correction: Option<&str>,
    ) -> Result<String, ServiceError>;

    async fn answer_grounded(
        &self,
        question: &str,
        context: &[String],
    ) -> Result<String, ServiceError>;
}

/// Chat-completions client for OpenAI-compatible servers.
#[derive(Debug, Clone)]
pub struct ChatCompletionsBackend {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    temperature: f32,
}

impl ChatCompletionsBackend {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, ServiceError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(ServiceError::Request("missing generative model name".to_string()));
        }
        let endpoint = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))?
            .join("chat/completions")?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            model,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            temperature: 0.0,
        })
    }

    async fn complete(
        &self,
        system: &str,
        user: &str,
        json_mode: bool,
    ) -> Result<String, ServiceError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
            response_format: json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&body);
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
                backend: "chat-completions".to_string(),
                status,
                details,
            });
        }

        let parsed: ChatResponse = response.json().await?;
        first_message(parsed)
    }
}

#[async_trait]
impl GenerativeBackend for ChatCompletionsBackend {
    async fn extract_structured(
        &self,
        text: &str,
        schema: &Value,
        correction: Option<&str>,
    ) -> Result<String, ServiceError> {
        let prompt = extraction_prompt(text, schema, correction);
        self.complete(EXTRACTION_SYSTEM_PROMPT, &prompt, true).await
    }

    async fn answer_grounded(
        &self,
        question: &str,
        context: &[String],
    ) -> Result<String, ServiceError> {
        let prompt = grounded_answer_prompt(question, context);
        self.complete(GROUNDED_SYSTEM_PROMPT, &prompt, false).await
    }
}

fn first_message(parsed: ChatResponse) -> Result<String, ServiceError> {
    let content = parsed
        .choices
        .into_iter()
        .find_map(|choice| choice.message.content)
        .unwrap_or_default();

    if content.trim().is_empty() {
        return Err(ServiceError::BackendResponse {
            backend: "chat-completions".to_string(),
            details: "response had no message content".to_string(),
        });
    }

    Ok(content)
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}
