use crate::error::IngestError;
use crate::generation::GenerativeBackend;
use crate::models::{EducationEntry, ExperienceEntry, StructuredRecord};
use crate::retry::RetryPolicy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use serde_with::{serde_as, DefaultOnNull};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// JSON schema handed to the generative backend.
pub fn record_schema() -> Value {
    let text = json!({"type": ["string", "null"]});
    json!({
        "type": "object",
        "required": ["name", "email"],
        "properties": {
            "name": {"type": "string", "description": "Candidate's full name"},
            "email": {"type": "string", "description": "Email address"},
            "phone": text,
            "summary": text,
            "skills": {
                "type": "array",
                "items": {"type": "string"},
                "description": "Technical skills, tools and languages"
            },
            "experience": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "role": text,
                        "company": text,
                        "duration": text,
                        "description": text
                    }
                }
            },
            "education": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "degree": text,
                        "institution": text,
                        "year": text
                    }
                }
            }
        }
    })
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(default, alias = "full_name")]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    skills: Vec<String>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    experience: Vec<ExperienceEntry>,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    education: Vec<EducationEntry>,
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Coerces model replies into records, or explains why they cannot be.
#[derive(Debug, Clone)]
pub struct RecordValidator {
    email: Regex,
}

impl RecordValidator {
    pub fn new() -> Result<Self, IngestError> {
        Ok(Self {
            email: Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$")?,
        })
    }

    pub fn parse(&self, raw: &str) -> Result<StructuredRecord, String> {
        let parsed: RawRecord = serde_json::from_str(strip_code_fence(raw))
            .map_err(|error| format!("reply is not a valid record object: {error}"))?;

        let name = non_blank(parsed.name)
            .ok_or_else(|| "field `name` is missing or empty".to_string())?;
        let email = non_blank(parsed.email)
            .ok_or_else(|| "field `email` is missing or empty".to_string())?;
        if !self.email.is_match(&email) {
            return Err(format!("field `email` is not an email address: {email}"));
        }

        let skills: BTreeSet<String> = parsed
            .skills
            .into_iter()
            .map(|skill| skill.trim().to_string())
            .filter(|skill| !skill.is_empty())
            .collect();

        Ok(StructuredRecord {
            name,
            email,
            phone: non_blank(parsed.phone),
            summary: non_blank(parsed.summary),
            skills,
            experience: parsed
                .experience
                .into_iter()
                .filter(|entry| !entry.is_blank())
                .collect(),
            education: parsed
                .education
                .into_iter()
                .filter(|entry| !entry.is_blank())
                .collect(),
        })
    }
}

pub struct StructuredExtractor {
    backend: Arc<dyn GenerativeBackend>,
    retry: RetryPolicy,
    schema: Value,
    validator: RecordValidator,
}

impl StructuredExtractor {
    pub fn new(backend: Arc<dyn GenerativeBackend>, retry: RetryPolicy) -> Result<Self, IngestError> {
        Ok(Self {
            backend,
            retry,
            schema: record_schema(),
            validator: RecordValidator::new()?,
        })
    }

    /// One extraction call plus at most one correction call.
    pub async fn extract(&self, text: &str) -> Result<StructuredRecord, IngestError> {
        let first = self.call(text, None).await?;
        let violation = match self.validator.parse(&first) {
            Ok(record) => return Ok(record),
            Err(violation) => violation,
        };

        warn!(violation = %violation, "extraction reply rejected, requesting correction");
        let second = self.call(text, Some(&violation)).await?;
        self.validator
            .parse(&second)
            .map_err(IngestError::ExtractionSchemaViolation)
    }

    async fn call(&self, text: &str, correction: Option<&str>) -> Result<String, IngestError> {
        let backend = &self.backend;
        let schema = &self.schema;
        debug!(chars = text.len(), correction = correction.is_some(), "calling extractor");
        self.retry
            .run("extract_structured", move || {
                backend.extract_structured(text, schema, correction)
            })
            .await
            .map_err(IngestError::ExtractionService)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::testing::{quick_retry, ScriptedBackend};

    fn parse_record(raw: &str) -> Result<StructuredRecord, String> {
        RecordValidator::new().unwrap().parse(raw)
    }

    #[test]
    fn fenced_json_with_aliases_and_nulls_is_accepted() {
        let raw = r#"```json
        {"full_name": " Jane Doe ", "email": "jane@example.com", "skills": null,
         "experience": [{"role": "Engineer", "company": "Acme"}, {}], "education": null}
        ```"#;
        let record = parse_record(raw).unwrap();
        assert_eq!(record.name, "Jane Doe");
        assert!(record.skills.is_empty());
        assert_eq!(record.experience.len(), 1);
        assert!(record.education.is_empty());
        assert_eq!(record.phone, None);
    }

    #[test]
    fn missing_required_fields_are_violations() {
        assert!(parse_record(r#"{"name": "Jane"}"#).unwrap_err().contains("email"));
        assert!(parse_record(r#"{"email": "a@b.io"}"#).unwrap_err().contains("name"));
        assert!(parse_record(r#"{"name": "Jane", "email": "not-an-email"}"#).is_err());
        assert!(parse_record("I could not find a resume").is_err());
    }

    #[test]
    fn schema_requires_name_and_email() {
        let schema = record_schema();
        assert_eq!(schema["required"], json!(["name", "email"]));
    }

    #[tokio::test]
    async fn one_correction_attempt_is_made() {
        let backend = Arc::new(ScriptedBackend::with_replies(vec![
            Ok(r#"{"name": "Jane Doe"}"#.to_string()),
            Ok(r#"{"name": "Jane Doe", "email": "jane@example.com", "skills": ["Rust"]}"#.to_string()),
        ]));
        let extractor = StructuredExtractor::new(backend.clone(), quick_retry()).unwrap();

        let record = extractor.extract("Jane Doe, Rust").await.unwrap();
        assert!(record.has_skill("rust"));
        assert_eq!(backend.extract_calls(), 2);
        assert_eq!(backend.corrections(), vec!["field `email` is missing or empty".to_string()]);
    }

    #[tokio::test]
    async fn second_violation_is_terminal() {
        let backend = Arc::new(ScriptedBackend::with_replies(vec![
            Ok("not json".to_string()),
            Ok("still not json".to_string()),
            Ok(r#"{"name": "never", "email": "used@example.com"}"#.to_string()),
        ]));
        let extractor = StructuredExtractor::new(backend.clone(), quick_retry()).unwrap();

        let error = extractor.extract("text").await.unwrap_err();
        assert!(matches!(error, IngestError::ExtractionSchemaViolation(_)));
        assert_eq!(backend.extract_calls(), 2);
    }

    #[tokio::test]
    async fn upstream_outages_are_retried_then_surfaced() {
        let backend = Arc::new(ScriptedBackend::with_replies(vec![
            Err(ServiceError::Unavailable("503".to_string())),
            Ok(r#"{"name": "Jane Doe", "email": "jane@example.com"}"#.to_string()),
        ]));
        let extractor = StructuredExtractor::new(backend.clone(), quick_retry()).unwrap();
        assert!(extractor.extract("text").await.is_ok());

        let down = Arc::new(ScriptedBackend::with_replies(
            (0..3)
                .map(|_| Err(ServiceError::Unavailable("503".to_string())))
                .collect(),
        ));
        let extractor = StructuredExtractor::new(down.clone(), quick_retry()).unwrap();
        let error = extractor.extract("text").await.unwrap_err();
        assert!(matches!(error, IngestError::ExtractionService(_)));
        assert!(error.is_retryable());
        assert_eq!(down.extract_calls(), 3);
    }
}
