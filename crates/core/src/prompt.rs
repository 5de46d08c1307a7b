//! Prompt templates for record extraction and grounded answering.

use serde_json::Value;

pub const EXTRACTION_SYSTEM_PROMPT: &str = "You are an expert resume parser. Extract structured information from the resume text and reply with a single JSON object that conforms to the provided JSON schema. Use null for unknown scalar fields and empty arrays for unknown lists. Do not add commentary.";

pub const GROUNDED_SYSTEM_PROMPT: &str = "You answer questions about candidate resumes using ONLY the numbered context passages provided. If the context does not contain the answer, say that the information is not available in the provided documents. Cite passages as [n].";

pub fn extraction_prompt(text: &str, schema: &Value, correction: Option<&str>) -> String {
    let schema = serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string());
    let mut prompt = format!("JSON SCHEMA:\n{schema}\n\nRESUME TEXT:\n{text}\n");

    if let Some(feedback) = correction {
        prompt.push_str(&format!(
            "\nYour previous reply could not be used: {feedback}\nReturn corrected JSON only, with non-empty \"name\" and a valid \"email\".\n"
        ));
    }

    prompt
}

/// Numbered passages, most similar first.
pub fn build_context(passages: &[String]) -> String {
    passages
        .iter()
        .enumerate()
        .map(|(index, passage)| format!("[{}] {}", index + 1, passage.trim()))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

pub fn grounded_answer_prompt(question: &str, context: &[String]) -> String {
    format!(
        "CONTEXT FROM RESUMES:\n{}\n\nQUESTION: {}\n\nAnswer using only the context above:",
        build_context(context),
        question.trim()
    )
}
