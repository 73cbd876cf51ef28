use serde::{Deserialize, Serialize};

use crate::types::Turn;

/// The fixed system instruction sent with every session.
pub const SYSTEM_INSTRUCTION: &str = r#"You are Spurify Code, a world-class senior software engineer and coding assistant.
Your goal is to help users write, debug, explain, and optimize code with high precision.

Guidelines:
1. Provide clear, concise, and correct code solutions.
2. Use modern best practices for all languages (e.g., ES6+ for JS, React 18+ hooks, Python 3.10+).
3. When explaining, be pedagogical but don't over-explain if the user is technical.
4. Format your answers using Markdown. Use code blocks with language identifiers.
5. If the solution requires multiple files, clearly indicate the file structure.
6. Be friendly, professional, and efficient.
7. If a user asks a non-technical question, politely answer it but gently steer back to coding/tech topics if appropriate.
"#;

/// System instruction payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInstruction {
    /// The instruction text, as parts.
    pub parts: Vec<crate::types::Part>,
}

impl SystemInstruction {
    /// Create a single-part instruction.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            parts: vec![crate::types::Part::text(text)],
        }
    }
}

/// Reasoning configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThinkingConfig {
    /// Token budget for reasoning.
    pub thinking_budget: u32,
}

/// Generation parameters.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Reasoning configuration, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<ThinkingConfig>,
}

/// Body of a `streamGenerateContent` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    /// The conversation so far, ending with the new user turn.
    pub contents: Vec<Turn>,

    /// System instruction, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<SystemInstruction>,

    /// Generation parameters, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

impl GenerateContentRequest {
    /// Build a request body.
    pub fn new(contents: Vec<Turn>, system: Option<&str>, thinking_budget: Option<u32>) -> Self {
        Self {
            contents,
            system_instruction: system.map(SystemInstruction::new),
            generation_config: thinking_budget.map(|thinking_budget| GenerationConfig {
                thinking_config: Some(ThinkingConfig { thinking_budget }),
            }),
        }
    }
}

/// One candidate reply within a streamed chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    /// Content generated so far for this chunk.
    #[serde(default)]
    pub content: Option<Turn>,

    /// Why generation stopped, on the final chunk.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// A single streamed chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    /// Candidate replies; the first one is used.
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    /// Reply text in this chunk, excluding reasoning parts.
    pub fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|candidate| candidate.content.as_ref())
            .map(Turn::text)
            .unwrap_or_default()
    }
}

/// Error body returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// HTTP-like status code.
    #[serde(default)]
    pub code: Option<u16>,

    /// Human-readable description.
    #[serde(default)]
    pub message: Option<String>,

    /// Symbolic status, e.g. `INVALID_ARGUMENT`.
    #[serde(default)]
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_with_thinking_budget() {
        let request = GenerateContentRequest::new(vec![Turn::user("hi")], Some("sys"), Some(1024));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json["generationConfig"]["thinkingConfig"]["thinkingBudget"],
            1024
        );
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "sys");
        assert_eq!(json["contents"][0]["role"], "user");
    }

    #[test]
    fn request_without_thinking_budget_omits_config() {
        let request = GenerateContentRequest::new(vec![Turn::user("hi")], None, None);
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("generationConfig").is_none());
        assert!(json.get("systemInstruction").is_none());
    }

    #[test]
    fn response_text_from_first_candidate() {
        let json = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hel"},{"text":"lo"}]}}],"usageMetadata":{"promptTokenCount":3}}"#;
        let response: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.text(), "Hello");
    }

    #[test]
    fn response_without_content_is_empty() {
        let json = r#"{"candidates":[{"finishReason":"STOP"}]}"#;
        let response: GenerateContentResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.text(), "");
    }
}
