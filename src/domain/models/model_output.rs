//! Reasoning model request and output.

use serde::{Deserialize, Serialize};

use super::phase::InvestigationPhase;
use super::turn::{CaseId, TurnId};

/// A prompt assembled for the reasoning model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRequest {
    pub case_id: CaseId,
    pub turn: TurnId,
    pub phase: InvestigationPhase,
    /// Instructions, including the structured output contract
    pub system_prompt: String,
    /// Conversation context and the new turn
    pub prompt: String,
    /// Estimated prompt token count
    pub estimated_tokens: usize,
}

/// Raw model output: free text plus optional structured fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelOutput {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Value>,
}

/// Structured payload found in a model output.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredPayload {
    /// No structured content at all
    Absent,
    /// A JSON value to extract records from
    Present(serde_json::Value),
    /// Structured content was announced but could not be parsed
    Unparseable(String),
}

impl ModelOutput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            structured: None,
        }
    }

    pub fn structured(text: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            text: text.into(),
            structured: Some(value),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.structured.is_none()
    }

    /// The structured payload: the explicit structured field if the model
    /// supports it, otherwise the first fenced ```json block in the text.
    pub fn structured_payload(&self) -> StructuredPayload {
        if let Some(value) = &self.structured {
            return StructuredPayload::Present(value.clone());
        }
        match fenced_json_block(&self.text) {
            None => StructuredPayload::Absent,
            Some(block) => match serde_json::from_str(block) {
                Ok(value) => StructuredPayload::Present(value),
                Err(e) => StructuredPayload::Unparseable(e.to_string()),
            },
        }
    }

    /// Text with any fenced json block removed, for logging as the assistant
    /// turn.
    pub fn prose(&self) -> String {
        match self.text.find("```json") {
            Some(start) => {
                let after = &self.text[start + 7..];
                let rest = after.find("```").map_or("", |end| &after[end + 3..]);
                format!("{}{}", &self.text[..start], rest).trim().to_string()
            }
            None => self.text.trim().to_string(),
        }
    }
}

/// Contents of the first ```json fenced block, if any.
fn fenced_json_block(text: &str) -> Option<&str> {
    let start = text.find("```json")? + 7;
    let after = &text[start..];
    let end = after.find("```")?;
    Some(after[..end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_explicit_structured_wins() {
        let output = ModelOutput::structured("```json\n{\"a\": 1}\n```", json!({"b": 2}));
        assert_eq!(output.structured_payload(), StructuredPayload::Present(json!({"b": 2})));
    }

    #[test]
    fn test_fenced_block_is_parsed() {
        let output = ModelOutput::text(
            "Looks like a pool issue.\n```json\n{\"problem_statement\": \"slow checkout\"}\n```\nThanks",
        );
        assert_eq!(
            output.structured_payload(),
            StructuredPayload::Present(json!({"problem_statement": "slow checkout"}))
        );
        assert_eq!(output.prose(), "Looks like a pool issue.\n\nThanks");
    }

    #[test]
    fn test_broken_fenced_block_is_unparseable() {
        let output = ModelOutput::text("```json\n{\"hypotheses\": [\n```");
        assert!(matches!(output.structured_payload(), StructuredPayload::Unparseable(_)));
    }

    #[test]
    fn test_plain_text_has_no_payload() {
        let output = ModelOutput::text("Can you share the error log?");
        assert_eq!(output.structured_payload(), StructuredPayload::Absent);
        assert!(!output.is_empty());
        assert!(ModelOutput::empty().is_empty());
    }
}
